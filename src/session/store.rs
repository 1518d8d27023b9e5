//! Session collection and the current-session pointer.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use super::MessageStore;
use crate::error::ChatError;
use crate::model::{Session, SessionId};
use crate::sync::generation::{Generation, Ticket};

/// Current-session pointer captured together with its generation.
///
/// Every change of the current session advances the generation, so a
/// `Selection` taken before an await can be checked afterwards with
/// [`SessionStore::is_current`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub session_id: Option<SessionId>,
    pub ticket: Ticket,
}

/// Thread-safe store for the user's sessions.
///
/// Owns the ordered collection (most recently created first) and the
/// current-session pointer. It also owns the binding of the
/// [`MessageStore`]: whenever the current session changes the message
/// sequence is emptied and rebound.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    state: RwLock<SessionState>,
    /// Advances on every change of the current pointer.
    selection: Generation,
    /// Advances on every local mutation of the collection.
    revision: Generation,
    messages: MessageStore,
}

#[derive(Debug, Default)]
struct SessionState {
    sessions: Vec<Session>,
    current: Option<SessionId>,
}

impl SessionStore {
    /// Create an empty store that drives `messages`.
    #[must_use]
    pub fn new(messages: MessageStore) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                state: RwLock::new(SessionState::default()),
                selection: Generation::new(),
                revision: Generation::new(),
                messages,
            }),
        }
    }

    /// The message store bound to the current session.
    #[must_use]
    pub fn messages(&self) -> &MessageStore {
        &self.inner.messages
    }

    /// Sessions, most recently created first.
    #[must_use]
    pub fn list(&self) -> Vec<Session> {
        self.read().sessions.clone()
    }

    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.read().sessions.iter().find(|s| &s.id == id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &SessionId) -> bool {
        self.read().sessions.iter().any(|s| &s.id == id)
    }

    #[must_use]
    pub fn current(&self) -> Option<Session> {
        let state = self.read();
        let id = state.current.as_ref()?;
        state.sessions.iter().find(|s| &s.id == id).cloned()
    }

    #[must_use]
    pub fn current_id(&self) -> Option<SessionId> {
        self.read().current.clone()
    }

    #[must_use]
    pub fn selection(&self) -> Selection {
        let state = self.read();
        Selection {
            session_id: state.current.clone(),
            ticket: self.inner.selection.ticket(),
        }
    }

    /// Whether `selection` still describes the current session.
    #[must_use]
    pub fn is_current(&self, selection: &Selection) -> bool {
        self.inner.selection.is_current(selection.ticket)
    }

    /// Ticket for the collection's local revision.
    #[must_use]
    pub fn revision(&self) -> Ticket {
        self.inner.revision.ticket()
    }

    /// Select the current session, or none.
    ///
    /// Selecting a session the store does not contain changes nothing and
    /// reports [`ChatError::NotFound`]. Re-selecting the current session
    /// keeps the loaded messages.
    pub fn set_current(&self, id: Option<&SessionId>) -> Result<Selection, ChatError> {
        let mut state = self.write();
        if let Some(id) = id {
            if !state.sessions.iter().any(|s| &s.id == id) {
                return Err(ChatError::NotFound);
            }
        }
        if state.current.as_ref() != id {
            self.switch_to(&mut state, id.cloned());
        }
        Ok(Selection {
            session_id: state.current.clone(),
            ticket: self.inner.selection.ticket(),
        })
    }

    /// Prepend a newly created session and make it current.
    pub fn insert(&self, session: Session) -> Selection {
        let mut state = self.write();
        state.sessions.retain(|s| s.id != session.id);
        let id = session.id.clone();
        state.sessions.insert(0, session);
        self.inner.revision.advance();
        self.switch_to(&mut state, Some(id));
        Selection {
            session_id: state.current.clone(),
            ticket: self.inner.selection.ticket(),
        }
    }

    /// Set a session's title locally and bump its `updated_at`.
    ///
    /// Empty or whitespace-only titles are rejected. Callers commit the
    /// title remotely first.
    pub fn rename(&self, id: &SessionId, title: &str) -> Result<Session, ChatError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::validation("session title must not be empty"));
        }
        let mut state = self.write();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or(ChatError::NotFound)?;
        session.title = title.to_string();
        session.updated_at = Utc::now();
        let renamed = session.clone();
        self.inner.revision.advance();
        Ok(renamed)
    }

    /// Replace a session with the server-confirmed object.
    ///
    /// The whole entry is replaced, not merged. Returns `false` if the
    /// session is gone.
    pub fn reconcile(&self, session: Session) -> bool {
        let mut state = self.write();
        match state.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(slot) => {
                *slot = session;
                self.inner.revision.advance();
                true
            }
            None => false,
        }
    }

    /// Record message activity on a session.
    pub fn touch(&self, id: &SessionId) {
        let mut state = self.write();
        if let Some(session) = state.sessions.iter_mut().find(|s| &s.id == id) {
            session.updated_at = Utc::now();
        }
    }

    /// Remove a session. Removing the current one clears the pointer and
    /// empties the message store; no other session is selected instead.
    pub fn remove(&self, id: &SessionId) -> Option<Session> {
        let mut state = self.write();
        let index = state.sessions.iter().position(|s| &s.id == id)?;
        let removed = state.sessions.remove(index);
        self.inner.revision.advance();
        if state.current.as_ref() == Some(id) {
            self.switch_to(&mut state, None);
        }
        Some(removed)
    }

    /// Replace the collection with the server's list, if no local mutation
    /// happened since `revision` was taken.
    ///
    /// If the current session is missing from the new list the pointer is
    /// cleared and the message store emptied.
    pub fn replace_all(&self, revision: Ticket, mut sessions: Vec<Session>) -> bool {
        let mut state = self.write();
        if !self.inner.revision.is_current(revision) {
            return false;
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let current_survives = state
            .current
            .as_ref()
            .is_none_or(|id| sessions.iter().any(|s| &s.id == id));
        state.sessions = sessions;
        if !current_survives {
            self.switch_to(&mut state, None);
        }
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn switch_to(&self, state: &mut SessionState, id: Option<SessionId>) {
        state.current.clone_from(&id);
        self.inner.selection.advance();
        self.inner.messages.bind(id);
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(MessageStore::new())
    }
}
