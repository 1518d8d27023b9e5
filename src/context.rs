//! Application-shell state handed to the facade.
//!
//! Everything the chat core reads or writes that is not owned by the
//! backend lives here: the stores, the input draft, the signed-in user and
//! the preference collaborator. The shell builds one context and injects it.

use std::sync::{Arc, PoisonError, RwLock};

use crate::model::User;
use crate::prefs::{MemoryPreferences, PreferenceError, PreferenceStore};
use crate::session::{MessageStore, SessionStore};

/// Preference key for the collapsed state of the session sidebar.
pub const SIDEBAR_COLLAPSED_KEY: &str = "sidebar_collapsed";

#[derive(Debug, Clone)]
pub struct ChatContext {
    sessions: SessionStore,
    draft: Arc<RwLock<String>>,
    user: Arc<RwLock<Option<User>>>,
    prefs: Arc<dyn PreferenceStore>,
}

impl ChatContext {
    #[must_use]
    pub fn new(prefs: Arc<dyn PreferenceStore>) -> Self {
        Self {
            sessions: SessionStore::new(MessageStore::new()),
            draft: Arc::new(RwLock::new(String::new())),
            user: Arc::new(RwLock::new(None)),
            prefs,
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn messages(&self) -> &MessageStore {
        self.sessions.messages()
    }

    /// Text currently in the input box.
    #[must_use]
    pub fn draft(&self) -> String {
        self.draft.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        *self.draft.write().unwrap_or_else(PoisonError::into_inner) = text.into();
    }

    pub(crate) fn clear_draft(&self) {
        self.draft
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.user.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn set_user(&self, user: Option<User>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }

    /// Persisted sidebar state; unreadable preferences count as expanded.
    pub async fn sidebar_collapsed(&self) -> bool {
        match self.prefs.load(SIDEBAR_COLLAPSED_KEY).await {
            Ok(value) => value.is_some_and(|v| v == "true"),
            Err(e) => {
                tracing::warn!(
                    name: "prefs.load.failed",
                    key = SIDEBAR_COLLAPSED_KEY,
                    error = %e,
                    "Failed to load preference"
                );
                false
            }
        }
    }

    pub async fn set_sidebar_collapsed(&self, collapsed: bool) -> Result<(), PreferenceError> {
        self.prefs
            .save(SIDEBAR_COLLAPSED_KEY, if collapsed { "true" } else { "false" })
            .await
    }
}

impl Default for ChatContext {
    fn default() -> Self {
        Self::new(Arc::new(MemoryPreferences::new()))
    }
}
