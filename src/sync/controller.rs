//! Synchronization between the local stores and the remote backend.
//!
//! The controller is the only place that issues backend calls for the
//! stores and the only owner of the busy flags. It never mutates store
//! internals; everything goes through the stores' public operations.
//!
//! # Protocols
//!
//! - **Loads** are single-flight. A message load is keyed by the session
//!   and the selection generation at issue time; on completion the result
//!   is applied only if that selection is still current. Messages written
//!   locally after the load went out are kept behind the loaded list.
//! - **Sends** append a pending user message first and never roll it back;
//!   a failed send adds an assistant-role notice instead.
//! - **Regenerates** may run for several messages at once but never twice
//!   for the same message, and land only in the selection they started in.
//! - **Renames** are edited locally and reach the store only after the
//!   server confirmed them.
//! - **Deletes** need a request followed by a confirmation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::ChatConfig;
use crate::context::ChatContext;
use crate::error::{ChatError, RemoteError};
use crate::model::{LocalIds, Message, MessageId, MessageStatus, Role, Session, SessionId};
use crate::remote::ChatBackend;
use crate::sync::flight::{Busy, FlightGuard, SingleFlight};
use crate::sync::generation::Ticket;

/// How a load ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The result was written to the store; carries the item count.
    Applied(usize),
    /// The result arrived for a selection or revision that is gone.
    Discarded,
    /// An identical load was already in flight; nothing was issued.
    Suppressed,
    /// The backend failed; the store keeps what it had.
    Failed(RemoteError),
}

/// How a send ended. Either way the user's message stays in the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Replied(Message),
    Failed(RemoteError),
}

/// Title edit in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleEdit {
    pub session_id: SessionId,
    pub title: String,
    /// Title before editing started.
    pub original: String,
}

/// Snapshot of every in-flight operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub loading_sessions: bool,
    pub loading_messages: bool,
    pub creating: bool,
    pub sending: bool,
    pub saving: bool,
    pub deleting: bool,
    pub uploading: bool,
    pub regenerating: Vec<MessageId>,
}

#[derive(Debug, Clone)]
pub struct SyncController {
    inner: Arc<SyncInner>,
}

#[derive(Debug)]
struct SyncInner {
    backend: Arc<dyn ChatBackend>,
    context: ChatContext,
    chat: ChatConfig,
    ids: LocalIds,
    busy: SingleFlight<Busy>,
    message_loads: SingleFlight<(SessionId, Ticket)>,
    regenerating: SingleFlight<(SessionId, MessageId)>,
    edit: Mutex<Option<TitleEdit>>,
    pending_delete: Mutex<Option<Session>>,
}

impl SyncController {
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>, context: ChatContext, chat: ChatConfig) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                backend,
                context,
                chat,
                ids: LocalIds::new(),
                busy: SingleFlight::new(),
                message_loads: SingleFlight::new(),
                regenerating: SingleFlight::new(),
                edit: Mutex::new(None),
                pending_delete: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn context(&self) -> &ChatContext {
        &self.inner.context
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.inner.backend
    }

    #[must_use]
    pub fn chat_config(&self) -> &ChatConfig {
        &self.inner.chat
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        let busy = &self.inner.busy;
        SyncStatus {
            loading_sessions: busy.is_active(&Busy::LoadingSessions),
            loading_messages: !self.inner.message_loads.active().is_empty(),
            creating: busy.is_active(&Busy::CreatingSession),
            sending: busy.is_active(&Busy::Sending),
            saving: busy.is_active(&Busy::SavingTitle),
            deleting: busy.is_active(&Busy::Deleting),
            uploading: busy.is_active(&Busy::Uploading),
            regenerating: self
                .inner
                .regenerating
                .active()
                .into_iter()
                .map(|(_, id)| id)
                .collect(),
        }
    }

    /// Claim a busy flag for an operation driven from outside the
    /// controller. The flag is released when the guard drops.
    pub(crate) fn begin(&self, flag: Busy) -> Result<FlightGuard<Busy>, ChatError> {
        self.inner.busy.try_begin(flag).ok_or(ChatError::Busy)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// Fetch the session list and replace the local collection.
    pub async fn load_sessions(&self) -> LoadOutcome {
        let Some(_guard) = self.inner.busy.try_begin(Busy::LoadingSessions) else {
            tracing::debug!(name: "sync.sessions.suppressed", "Session list already loading");
            return LoadOutcome::Suppressed;
        };
        let sessions = self.inner.context.sessions();
        let revision = sessions.revision();

        match self.inner.backend.fetch_sessions().await {
            Ok(list) => {
                let count = list.len();
                if sessions.replace_all(revision, list) {
                    tracing::debug!(name: "sync.sessions.applied", count, "Session list loaded");
                    LoadOutcome::Applied(count)
                } else {
                    tracing::debug!(
                        name: "sync.sessions.discarded",
                        "Session list changed locally while loading"
                    );
                    LoadOutcome::Discarded
                }
            }
            Err(e) => {
                tracing::warn!(name: "sync.sessions.failed", error = %e, "Failed to load sessions");
                LoadOutcome::Failed(e)
            }
        }
    }

    /// Fetch the messages of `session_id` into the message store.
    ///
    /// Only loads the current session. The result is discarded if the
    /// selection changed while the request was in flight. Sends and notices
    /// added in the meantime stay after the loaded list.
    pub async fn load_messages(&self, session_id: &SessionId) -> LoadOutcome {
        let sessions = self.inner.context.sessions();
        let selection = sessions.selection();
        if selection.session_id.as_ref() != Some(session_id) {
            tracing::debug!(
                name: "sync.messages.not_current",
                session_id = %session_id,
                "Skipping message load for a session that is not selected"
            );
            return LoadOutcome::Discarded;
        }
        let key = (session_id.clone(), selection.ticket);
        let Some(_guard) = self.inner.message_loads.try_begin(key) else {
            tracing::debug!(
                name: "sync.messages.suppressed",
                session_id = %session_id,
                "Messages already loading"
            );
            return LoadOutcome::Suppressed;
        };
        let store = self.inner.context.messages();
        let issued = store.revision();

        match self.inner.backend.fetch_messages(session_id).await {
            Ok(messages) => {
                let count = messages.len();
                if sessions.is_current(&selection)
                    && store.replace_loaded(session_id, messages, issued)
                {
                    LoadOutcome::Applied(count)
                } else {
                    tracing::debug!(
                        name: "sync.messages.discarded",
                        session_id = %session_id,
                        "Selection changed while loading; result dropped"
                    );
                    LoadOutcome::Discarded
                }
            }
            Err(e) => {
                tracing::warn!(
                    name: "sync.messages.failed",
                    session_id = %session_id,
                    error = %e,
                    "Failed to load messages"
                );
                LoadOutcome::Failed(e)
            }
        }
    }

    /// Load messages that must reflect writes the server took after any
    /// load already in flight was answered.
    ///
    /// Where [`load_messages`](Self::load_messages) would be suppressed, this
    /// waits for the running load to settle and then issues its own.
    pub async fn refresh_messages(&self, session_id: &SessionId) -> LoadOutcome {
        loop {
            let ticket = self.inner.context.sessions().selection().ticket;
            match self.load_messages(session_id).await {
                LoadOutcome::Suppressed => {
                    tracing::debug!(
                        name: "sync.messages.refresh_waiting",
                        session_id = %session_id,
                        "Waiting for the running load before reloading"
                    );
                    self.inner
                        .message_loads
                        .settled(&(session_id.clone(), ticket))
                        .await;
                }
                outcome => return outcome,
            }
        }
    }

    /// Fetch the signed-in user into the context. Failures keep the old value.
    pub async fn load_user(&self) {
        match self.inner.backend.current_user().await {
            Ok(user) => self.inner.context.set_user(user),
            Err(e) => {
                tracing::warn!(name: "sync.user.failed", error = %e, "Failed to load user profile");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────

    /// Select a session and load its messages.
    pub async fn select_session(&self, id: &SessionId) -> Result<LoadOutcome, ChatError> {
        self.inner.context.sessions().set_current(Some(id))?;
        Ok(self.load_messages(id).await)
    }

    /// Deselect; the message store empties.
    pub fn clear_selection(&self) {
        // Selecting "none" cannot miss.
        let _ = self.inner.context.sessions().set_current(None);
    }

    /// Create a session on the server and make it current.
    ///
    /// A new session has no messages, so none are fetched.
    pub async fn create_session(&self, title: &str) -> Result<Session, ChatError> {
        let _guard = self.begin(Busy::CreatingSession)?;
        match self.inner.backend.create_session(title).await {
            Ok(session) => {
                tracing::info!(
                    name: "sync.session.created",
                    session_id = %session.id,
                    "Session created"
                );
                self.inner.context.sessions().insert(session.clone());
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(name: "sync.session.create_failed", error = %e, "Failed to create session");
                Err(e.into())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────

    /// Send a user message to the current session.
    ///
    /// Blank content is rejected without touching anything. Otherwise the
    /// message is appended as pending and the input draft cleared before
    /// the request goes out.
    pub async fn send_message(&self, content: &str) -> Result<SendOutcome, ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::validation("message must not be empty"));
        }
        let session_id = self
            .inner
            .context
            .sessions()
            .current_id()
            .ok_or(ChatError::NoSession)?;
        let _guard = self.begin(Busy::Sending)?;

        let messages = self.inner.context.messages();
        let placeholder = Message::pending_user(self.inner.ids.next(), session_id.clone(), content);
        let placeholder_id = placeholder.id.clone();
        messages.append(placeholder.clone());
        self.inner.context.clear_draft();

        match self.inner.backend.send_message(content, &session_id).await {
            Ok(reply) => {
                // Without the user's turn in view the reply waits for the next load.
                if messages.replace_by_id(
                    &placeholder_id,
                    placeholder.with_status(MessageStatus::Confirmed),
                ) {
                    messages.append(reply.clone());
                }
                self.inner.context.sessions().touch(&session_id);
                Ok(SendOutcome::Replied(reply))
            }
            Err(e) => {
                tracing::warn!(
                    name: "sync.send.failed",
                    session_id = %session_id,
                    error = %e,
                    "Failed to send message"
                );
                if messages
                    .replace_by_id(&placeholder_id, placeholder.with_status(MessageStatus::Failed))
                {
                    self.append_notice(&session_id, &self.inner.chat.send_error_text);
                }
                Ok(SendOutcome::Failed(e))
            }
        }
    }

    /// Ask the server for a new version of an assistant message.
    ///
    /// Returns `Ok(None)` when the message is gone, either before the call
    /// or by the time the reply arrives. A reply that lands after the user
    /// switched sessions is dropped even if the new session has a message
    /// with the same id. On failure the original content is left as it was.
    pub async fn regenerate_message(&self, id: &MessageId) -> Result<Option<Message>, ChatError> {
        let sessions = self.inner.context.sessions();
        let selection = sessions.selection();
        let messages = self.inner.context.messages();
        let Some(original) = messages.get(id) else {
            return Ok(None);
        };
        if original.role != Role::Assistant {
            return Err(ChatError::validation("only assistant messages can be regenerated"));
        }
        let Some(remote_id) = id.remote() else {
            return Err(ChatError::validation("message is not confirmed by the server yet"));
        };
        let key = (original.session_id.clone(), id.clone());
        let Some(_guard) = self.inner.regenerating.try_begin(key) else {
            return Err(ChatError::Busy);
        };

        match self
            .inner
            .backend
            .regenerate_message(&original.session_id, remote_id)
            .await
        {
            Ok(reply) => {
                if sessions.is_current(&selection) && messages.replace_by_id(id, reply.clone()) {
                    sessions.touch(&original.session_id);
                    Ok(Some(reply))
                } else {
                    tracing::debug!(
                        name: "sync.regenerate.superseded",
                        message_id = %id,
                        "Regenerated message no longer loaded"
                    );
                    Ok(None)
                }
            }
            Err(e) => {
                tracing::warn!(
                    name: "sync.regenerate.failed",
                    message_id = %id,
                    error = %e,
                    "Failed to regenerate message"
                );
                Err(e.into())
            }
        }
    }

    /// Append a client-side assistant notice to `session_id`, if loaded.
    pub(crate) fn append_notice(&self, session_id: &SessionId, text: &str) -> bool {
        let notice = Message::notice(self.inner.ids.next(), session_id.clone(), text);
        self.inner.context.messages().append(notice)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Rename
    // ─────────────────────────────────────────────────────────────────────

    /// Start editing a session title. Replaces any edit in progress.
    pub fn begin_rename(&self, id: &SessionId) -> Result<TitleEdit, ChatError> {
        let session = self
            .inner
            .context
            .sessions()
            .get(id)
            .ok_or(ChatError::NotFound)?;
        let edit = TitleEdit {
            session_id: session.id,
            title: session.title.clone(),
            original: session.title,
        };
        *lock(&self.inner.edit) = Some(edit.clone());
        Ok(edit)
    }

    /// Update the title being edited. Ignored when nothing is being edited.
    pub fn edit_title(&self, title: impl Into<String>) {
        if let Some(edit) = lock(&self.inner.edit).as_mut() {
            edit.title = title.into();
        }
    }

    pub fn cancel_rename(&self) {
        lock(&self.inner.edit).take();
    }

    #[must_use]
    pub fn editing(&self) -> Option<TitleEdit> {
        lock(&self.inner.edit).clone()
    }

    /// Commit the edited title.
    ///
    /// A blank title ends the edit with the original title untouched and no
    /// network call. An unchanged title ends the edit without a call. On
    /// success the store takes the server's copy of the session; on failure
    /// the edit ends and the stored title stays what it was.
    pub async fn commit_rename(&self) -> Result<Option<Session>, ChatError> {
        let Some(edit) = self.editing() else {
            return Ok(None);
        };
        let title = edit.title.trim().to_string();
        if title.is_empty() {
            self.finish_edit(&edit.session_id);
            return Err(ChatError::validation("session title must not be empty"));
        }
        if title == edit.original {
            self.finish_edit(&edit.session_id);
            return Ok(self.inner.context.sessions().get(&edit.session_id));
        }
        let _guard = self.begin(Busy::SavingTitle)?;

        let result = self
            .inner
            .backend
            .rename_session(&edit.session_id, &title)
            .await;
        self.finish_edit(&edit.session_id);
        match result {
            Ok(confirmed) => {
                if self.inner.context.sessions().reconcile(confirmed.clone()) {
                    Ok(Some(confirmed))
                } else {
                    Ok(None)
                }
            }
            Err(e) => {
                tracing::warn!(
                    name: "sync.rename.failed",
                    session_id = %edit.session_id,
                    error = %e,
                    "Failed to rename session"
                );
                Err(e.into())
            }
        }
    }

    /// Drop the edit state if it still belongs to `session_id`.
    fn finish_edit(&self, session_id: &SessionId) {
        let mut edit = lock(&self.inner.edit);
        if edit.as_ref().is_some_and(|e| &e.session_id == session_id) {
            *edit = None;
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Delete
    // ─────────────────────────────────────────────────────────────────────

    /// First step of a delete: remember the target for confirmation.
    pub fn request_delete(&self, id: &SessionId) -> Result<Session, ChatError> {
        let session = self
            .inner
            .context
            .sessions()
            .get(id)
            .ok_or(ChatError::NotFound)?;
        *lock(&self.inner.pending_delete) = Some(session.clone());
        Ok(session)
    }

    #[must_use]
    pub fn pending_delete(&self) -> Option<Session> {
        lock(&self.inner.pending_delete).clone()
    }

    pub fn cancel_delete(&self) {
        lock(&self.inner.pending_delete).take();
    }

    /// Second step of a delete: remove the requested session.
    ///
    /// If it was current the view falls back to no selection. On failure
    /// the session stays and the request remains pending.
    pub async fn confirm_delete(&self) -> Result<Option<Session>, ChatError> {
        let target = self
            .pending_delete()
            .ok_or_else(|| ChatError::validation("no delete awaiting confirmation"))?;
        let _guard = self.begin(Busy::Deleting)?;

        match self.inner.backend.delete_session(&target.id).await {
            Ok(()) => {
                tracing::info!(name: "sync.session.deleted", session_id = %target.id, "Session deleted");
                let mut pending = lock(&self.inner.pending_delete);
                if pending.as_ref().is_some_and(|s| s.id == target.id) {
                    *pending = None;
                }
                drop(pending);
                self.finish_edit(&target.id);
                Ok(self.inner.context.sessions().remove(&target.id))
            }
            Err(e) => {
                tracing::warn!(
                    name: "sync.session.delete_failed",
                    session_id = %target.id,
                    error = %e,
                    "Failed to delete session"
                );
                Err(e.into())
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
