//! Message sequence for the currently loaded session.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::model::{Message, MessageId, MessageStatus, SessionId};
use crate::sync::generation::{Generation, Ticket};

/// Ordered messages of whichever session is current.
///
/// The store is bound to one session at a time by the
/// [`SessionStore`](super::SessionStore); rebinding empties it. Order is
/// insertion order: the latest [`replace_all`](Self::replace_all) followed by
/// every later append or in-place replacement. Nothing is ever re-sorted.
///
/// Every write advances a revision. A load captures it with
/// [`revision`](Self::revision) when issued and lands through
/// [`replace_loaded`](Self::replace_loaded), which keeps whatever was written
/// locally after that point.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    inner: Arc<RwLock<MessageState>>,
}

#[derive(Debug, Default)]
struct MessageState {
    session: Option<SessionId>,
    entries: Vec<Entry>,
    revision: Generation,
}

#[derive(Debug)]
struct Entry {
    message: Message,
    written: Ticket,
}

impl MessageState {
    fn entry(&self, message: Message) -> Entry {
        Entry {
            message,
            written: self.revision.advance(),
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.revision.advance();
    }
}

impl MessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Session the sequence belongs to.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.read().session.clone()
    }

    /// Current write revision.
    #[must_use]
    pub fn revision(&self) -> Ticket {
        self.read().revision.ticket()
    }

    /// Bind to a (possibly absent) session, dropping whatever was loaded.
    pub(crate) fn bind(&self, session: Option<SessionId>) {
        let mut state = self.write();
        state.session = session;
        state.clear();
    }

    /// Replace the whole sequence with an authoritative list.
    ///
    /// Returns `false` without touching anything when `session_id` is not
    /// the bound session: the response arrived after the user moved on.
    pub fn replace_all(&self, session_id: &SessionId, messages: Vec<Message>) -> bool {
        let mut state = self.write();
        if state.session.as_ref() != Some(session_id) {
            return false;
        }
        let entries = messages.into_iter().map(|m| state.entry(m)).collect();
        state.entries = entries;
        true
    }

    /// Apply a list fetched at revision `issued`.
    ///
    /// Like [`replace_all`](Self::replace_all), except entries the list
    /// cannot know about survive after it: anything written after `issued`
    /// and any message still waiting for the server. Survivors keep their
    /// relative order; an id the list already carries is not repeated.
    pub fn replace_loaded(
        &self,
        session_id: &SessionId,
        messages: Vec<Message>,
        issued: Ticket,
    ) -> bool {
        let mut state = self.write();
        if state.session.as_ref() != Some(session_id) {
            return false;
        }
        let listed: HashSet<MessageId> = messages.iter().map(|m| m.id.clone()).collect();
        let kept: Vec<Entry> = std::mem::take(&mut state.entries)
            .into_iter()
            .filter(|e| e.written > issued || e.message.status == MessageStatus::Pending)
            .filter(|e| !listed.contains(&e.message.id))
            .collect();
        if !kept.is_empty() {
            tracing::debug!(
                name: "messages.load.merged",
                session_id = %session_id,
                kept = kept.len(),
                "Kept local writes newer than the loaded list"
            );
        }
        let mut entries: Vec<Entry> = messages.into_iter().map(|m| state.entry(m)).collect();
        entries.extend(kept);
        state.entries = entries;
        true
    }

    /// Append to the end of the sequence.
    ///
    /// Messages for a session other than the bound one are dropped; the
    /// server copy shows up on that session's next load.
    pub fn append(&self, message: Message) -> bool {
        let mut state = self.write();
        if state.session.as_ref() != Some(&message.session_id) {
            tracing::debug!(
                name: "messages.append.dropped",
                message_id = %message.id,
                session_id = %message.session_id,
                "Append for a session that is no longer loaded"
            );
            return false;
        }
        let entry = state.entry(message);
        state.entries.push(entry);
        true
    }

    /// Swap the entry with `id` for `message`, keeping its position.
    ///
    /// A missing id is a no-op: a reload has already superseded it. So is a
    /// replacement belonging to another session, since ids are only unique
    /// within one session.
    pub fn replace_by_id(&self, id: &MessageId, message: Message) -> bool {
        let mut state = self.write();
        if state.session.as_ref() != Some(&message.session_id) {
            tracing::debug!(
                name: "messages.replace.dropped",
                message_id = %id,
                session_id = %message.session_id,
                "Replacement for a session that is no longer loaded"
            );
            return false;
        }
        let Some(index) = state.entries.iter().position(|e| &e.message.id == id) else {
            return false;
        };
        let entry = state.entry(message);
        state.entries[index] = entry;
        true
    }

    /// Empty the sequence, keeping the binding.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Snapshot of the visible sequence.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.read()
            .entries
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<Message> {
        self.read()
            .entries
            .iter()
            .find(|e| &e.message.id == id)
            .map(|e| e.message.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, MessageState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MessageState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
