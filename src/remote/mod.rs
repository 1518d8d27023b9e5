//! Remote collaborator contract.
//!
//! The sync layer treats the server as a set of opaque remote procedure
//! calls. [`ChatBackend`] is that contract; [`HttpBackend`] implements it
//! over the REST API. Every call either succeeds or fails with a
//! [`RemoteError`]; status codes are not interpreted beyond that.

mod http;

pub use http::{BackendSettings, HttpBackend};

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::model::{Message, RemoteId, ReportFile, Session, SessionId, UploadReceipt, User};

/// Operations the chat core needs from the server.
#[async_trait]
pub trait ChatBackend: Send + Sync + std::fmt::Debug {
    /// All sessions owned by the user.
    async fn fetch_sessions(&self) -> Result<Vec<Session>, RemoteError>;

    async fn create_session(&self, title: &str) -> Result<Session, RemoteError>;

    /// Persist a new title; returns the server's copy of the session.
    async fn rename_session(&self, id: &SessionId, title: &str) -> Result<Session, RemoteError>;

    async fn delete_session(&self, id: &SessionId) -> Result<(), RemoteError>;

    /// Messages of one session in the server's order.
    async fn fetch_messages(&self, session_id: &SessionId) -> Result<Vec<Message>, RemoteError>;

    /// Send a user turn; returns the assistant's reply.
    async fn send_message(
        &self,
        content: &str,
        session_id: &SessionId,
    ) -> Result<Message, RemoteError>;

    /// Produce a new reply in place of an assistant message.
    async fn regenerate_message(
        &self,
        session_id: &SessionId,
        id: &RemoteId,
    ) -> Result<Message, RemoteError>;

    /// Hand a document to the server, which turns it into conversation
    /// turns. Without a session id the server picks the target session.
    async fn upload_report(
        &self,
        file: &ReportFile,
        session_id: Option<&SessionId>,
    ) -> Result<UploadReceipt, RemoteError>;

    /// Identity of the signed-in user, if any.
    async fn current_user(&self) -> Result<Option<User>, RemoteError>;
}
