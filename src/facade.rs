//! Operation surface for the presentation layer.
//!
//! The UI calls only [`InteractionFacade`]. Each operation is safe to
//! trigger twice: while its busy flag is set a repeat call returns
//! [`ChatError::Busy`] without side effects. Remote failures never escape as
//! anything but values: reads report them in a [`LoadOutcome`], sends and
//! uploads in their outcome, other writes as `Err` for the UI to alert on.

use std::sync::Arc;

use crate::clipboard::{Clipboard, Osc52Clipboard, SystemClipboard};
use crate::config::ChatConfig;
use crate::context::ChatContext;
use crate::error::ChatError;
use crate::model::{Message, MessageId, ReportFile, Session, SessionId};
use crate::remote::ChatBackend;
use crate::sync::{LoadOutcome, SendOutcome, SyncController, SyncStatus, TitleEdit};
use crate::upload::{UploadCoordinator, UploadOutcome};

/// Which clipboard path accepted a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMethod {
    Clipboard,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct InteractionFacade {
    sync: SyncController,
    uploads: UploadCoordinator,
    clipboard: Arc<dyn Clipboard>,
    fallback: Arc<dyn Clipboard>,
}

impl InteractionFacade {
    /// Build a facade over `backend`, using the system clipboard with an
    /// OSC 52 fallback on stdout.
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>, context: ChatContext, chat: ChatConfig) -> Self {
        let sync = SyncController::new(backend, context, chat);
        Self {
            uploads: UploadCoordinator::new(sync.clone()),
            sync,
            clipboard: Arc::new(SystemClipboard::new()),
            fallback: Arc::new(Osc52Clipboard::stdout()),
        }
    }

    #[must_use]
    pub fn with_clipboards(
        mut self,
        clipboard: Arc<dyn Clipboard>,
        fallback: Arc<dyn Clipboard>,
    ) -> Self {
        self.clipboard = clipboard;
        self.fallback = fallback;
        self
    }

    #[must_use]
    pub fn context(&self) -> &ChatContext {
        self.sync.context()
    }

    #[must_use]
    pub fn sync(&self) -> &SyncController {
        &self.sync
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.sync.status()
    }

    #[must_use]
    pub fn sessions(&self) -> Vec<Session> {
        self.context().sessions().list()
    }

    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.context().sessions().current()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.context().messages().messages()
    }

    /// Load the user and the session list, then optionally open the first
    /// session if nothing is selected yet.
    pub async fn bootstrap(&self) -> LoadOutcome {
        let ((), sessions) = futures::join!(self.sync.load_user(), self.sync.load_sessions());

        let store = self.context().sessions();
        if self.sync.chat_config().auto_select_first && store.current_id().is_none() {
            if let Some(first) = store.list().into_iter().next() {
                if let Err(e) = self.sync.select_session(&first.id).await {
                    tracing::debug!(name: "bootstrap.select.skipped", error = %e, "First session vanished");
                }
            }
        }
        sessions
    }

    pub async fn refresh_sessions(&self) -> LoadOutcome {
        self.sync.load_sessions().await
    }

    // Sessions

    pub async fn create_session(&self) -> Result<Session, ChatError> {
        let title = self.sync.chat_config().new_session_title.clone();
        self.sync.create_session(&title).await
    }

    pub async fn select_session(&self, id: &SessionId) -> Result<LoadOutcome, ChatError> {
        self.sync.select_session(id).await
    }

    pub fn clear_selection(&self) {
        self.sync.clear_selection();
    }

    pub fn begin_rename(&self, id: &SessionId) -> Result<TitleEdit, ChatError> {
        self.sync.begin_rename(id)
    }

    pub fn edit_title(&self, title: impl Into<String>) {
        self.sync.edit_title(title);
    }

    pub fn cancel_rename(&self) {
        self.sync.cancel_rename();
    }

    /// Commit the title being edited (Enter or focus loss).
    pub async fn commit_rename(&self) -> Result<Option<Session>, ChatError> {
        self.sync.commit_rename().await
    }

    /// Edit and commit in one step.
    pub async fn rename_session(
        &self,
        id: &SessionId,
        title: impl Into<String>,
    ) -> Result<Option<Session>, ChatError> {
        self.sync.begin_rename(id)?;
        self.sync.edit_title(title);
        self.sync.commit_rename().await
    }

    /// Ask for confirmation to delete `id`.
    pub fn request_delete(&self, id: &SessionId) -> Result<Session, ChatError> {
        self.sync.request_delete(id)
    }

    pub fn cancel_delete(&self) {
        self.sync.cancel_delete();
    }

    /// Delete the session whose deletion was requested.
    pub async fn delete_session(&self) -> Result<Option<Session>, ChatError> {
        self.sync.confirm_delete().await
    }

    // Messages

    pub fn set_draft(&self, text: impl Into<String>) {
        self.context().set_draft(text);
    }

    pub async fn send_message(&self, content: &str) -> Result<SendOutcome, ChatError> {
        self.sync.send_message(content).await
    }

    /// Send whatever is in the input draft.
    pub async fn send_draft(&self) -> Result<SendOutcome, ChatError> {
        let draft = self.context().draft();
        self.sync.send_message(&draft).await
    }

    pub async fn regenerate_message(&self, id: &MessageId) -> Result<Option<Message>, ChatError> {
        self.sync.regenerate_message(id).await
    }

    /// Copy text, falling back to the secondary path when the clipboard
    /// refuses.
    pub async fn copy_to_clipboard(&self, text: &str) -> Result<CopyMethod, ChatError> {
        let primary = match self.clipboard.write_text(text).await {
            Ok(()) => return Ok(CopyMethod::Clipboard),
            Err(e) => e,
        };
        tracing::debug!(
            name: "clipboard.fallback",
            clipboard = self.clipboard.name(),
            error = %primary,
            "Clipboard unavailable, using fallback"
        );
        match self.fallback.write_text(text).await {
            Ok(()) => Ok(CopyMethod::Fallback),
            Err(e) => {
                tracing::warn!(name: "clipboard.failed", error = %e, "Copy failed");
                Err(ChatError::Clipboard(format!("{primary}; fallback: {e}")))
            }
        }
    }

    /// Copy the content of a loaded message.
    pub async fn copy_message(&self, id: &MessageId) -> Result<CopyMethod, ChatError> {
        let message = self.context().messages().get(id).ok_or(ChatError::NotFound)?;
        self.copy_to_clipboard(&message.content).await
    }

    /// Upload a report into the current session, or into a new one.
    pub async fn upload_report(&self, file: &ReportFile) -> Result<UploadOutcome, ChatError> {
        let current = self.context().sessions().current_id();
        self.uploads.upload_report(file, current.as_ref()).await
    }

    // Preferences

    /// Flip and persist the sidebar state; returns the new state.
    pub async fn toggle_sidebar(&self) -> bool {
        let collapsed = !self.context().sidebar_collapsed().await;
        if let Err(e) = self.context().set_sidebar_collapsed(collapsed).await {
            tracing::warn!(name: "prefs.save.failed", error = %e, "Failed to save sidebar state");
        }
        collapsed
    }
}
