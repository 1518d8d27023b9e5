//! Session and message state.
//!
//! This module holds the in-memory view of the user's sessions and of the
//! messages of the session being viewed. Both stores are cheap to clone and
//! share state; all mutation goes through their methods.
//!
//! # Architecture
//!
//! - [`SessionStore`]: ordered sessions plus the current-session pointer
//! - [`MessageStore`]: message sequence bound to the current session
//!
//! # Example
//!
//! ```rust
//! use chat_sync::model::{Message, Session, SessionId};
//! use chat_sync::session::SessionStore;
//! use chrono::Utc;
//!
//! let store = SessionStore::default();
//! store.insert(Session {
//!     id: SessionId::from(1),
//!     title: "New chat".to_string(),
//!     created_at: Utc::now(),
//!     updated_at: Utc::now(),
//! });
//! store.messages().append(Message::pending_user(1, SessionId::from(1), "Hello!"));
//!
//! assert_eq!(store.messages().len(), 1);
//! ```

mod messages;
mod store;

pub use messages::MessageStore;
pub use store::{Selection, SessionStore};
