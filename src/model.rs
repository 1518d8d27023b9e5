//! Domain types shared by the stores, the sync layer and the backend.
//!
//! Identifiers assigned by the server are opaque: the wire format may carry
//! them as numbers or strings, and [`RemoteId`] accepts both. Messages that
//! the client authored but the server has not yet confirmed carry a
//! [`MessageId::Local`] placeholder instead.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An identifier assigned by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    /// Integer key (the common case for SQL-backed servers).
    Int(i64),
    /// Any other opaque string key.
    Text(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RemoteId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for RemoteId {
    fn from(value: &str) -> Self {
        value
            .parse::<i64>()
            .map_or_else(|_| Self::Text(value.to_string()), Self::Int)
    }
}

/// Identifier of a persisted chat session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub RemoteId);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<RemoteId> for SessionId {
    fn from(value: RemoteId) -> Self {
        Self(value)
    }
}

impl From<i64> for SessionId {
    fn from(value: i64) -> Self {
        Self(RemoteId::Int(value))
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(RemoteId::from(value))
    }
}

/// Identifier of a message within its session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageId {
    /// Client-generated placeholder for a message the server has not confirmed.
    Local(u64),
    /// Definitive id assigned by the server.
    Remote(RemoteId),
}

impl MessageId {
    /// The server-assigned id, if this is not a placeholder.
    #[must_use]
    pub fn remote(&self) -> Option<&RemoteId> {
        match self {
            Self::Local(_) => None,
            Self::Remote(id) => Some(id),
        }
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(n) => write!(f, "local-{n}"),
            Self::Remote(id) => id.fmt(f),
        }
    }
}

impl From<RemoteId> for MessageId {
    fn from(value: RemoteId) -> Self {
        Self::Remote(value)
    }
}

/// A titled conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        })
    }
}

/// Where a message stands relative to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    /// Appended optimistically, awaiting the server.
    Pending,
    /// Known to the server.
    #[default]
    Confirmed,
    /// The request carrying this message failed.
    Failed,
    /// Synthetic client-side notice (e.g. an error reply); never sent.
    Notice,
}

/// One turn in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    /// A user-authored message that has not reached the server yet.
    #[must_use]
    pub fn pending_user(id: u64, session_id: SessionId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::Local(id),
            session_id,
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            status: MessageStatus::Pending,
        }
    }

    /// A client-side assistant notice, used in place of a reply that failed.
    #[must_use]
    pub fn notice(id: u64, session_id: SessionId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::Local(id),
            session_id,
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
            status: MessageStatus::Notice,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }
}

/// The signed-in user, as reported by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: RemoteId,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Document kinds accepted for report upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Pdf,
    Docx,
}

impl ReportKind {
    pub const PDF_MIME: &'static str = "application/pdf";
    pub const DOCX_MIME: &'static str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

    /// Map a MIME type to an accepted kind.
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.split(';').next().map(str::trim) {
            Some(Self::PDF_MIME) => Some(Self::Pdf),
            Some(Self::DOCX_MIME) => Some(Self::Docx),
            _ => None,
        }
    }

    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Pdf => Self::PDF_MIME,
            Self::Docx => Self::DOCX_MIME,
        }
    }
}

/// A document selected for upload.
#[derive(Debug, Clone)]
pub struct ReportFile {
    pub file_name: String,
    /// Content type declared by whoever picked the file, if any.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ReportFile {
    #[must_use]
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    /// Read a file from disk; the content type is left to extension sniffing.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        Ok(Self::new(file_name, None, bytes))
    }

    /// Resolve the document kind.
    ///
    /// A declared content type wins; without one the extension decides.
    #[must_use]
    pub fn kind(&self) -> Option<ReportKind> {
        if let Some(declared) = self.content_type.as_deref().filter(|s| !s.is_empty()) {
            return ReportKind::from_mime(declared);
        }
        mime_guess::from_path(&self.file_name)
            .iter()
            .find_map(|mime| ReportKind::from_mime(mime.essence_str()))
    }
}

/// Result of a successful report upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Session the server attached the report turns to.
    pub session_id: SessionId,
    /// The assistant's analysis message, when the server returns it.
    pub message: Option<Message>,
}

/// Generator for placeholder message ids.
///
/// Ids are client timestamps in milliseconds, bumped when two are issued in
/// the same millisecond so they stay strictly increasing.
#[derive(Debug, Default)]
pub struct LocalIds {
    last: AtomicU64,
}

impl LocalIds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_id_accepts_numbers_and_strings() {
        let n: RemoteId = serde_json::from_str("42").unwrap();
        assert_eq!(n, RemoteId::Int(42));
        let s: RemoteId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(s, RemoteId::Text("abc".to_string()));
        assert_eq!(RemoteId::from("17"), RemoteId::Int(17));
    }

    #[test]
    fn test_local_ids_strictly_increase() {
        let ids = LocalIds::new();
        let a = ids.next();
        let b = ids.next();
        let c = ids.next();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_report_kind_prefers_declared_type() {
        let pdf = ReportFile::new("scan.docx", Some("application/pdf".into()), vec![]);
        assert_eq!(pdf.kind(), Some(ReportKind::Pdf));

        let image = ReportFile::new("scan.pdf", Some("image/png".into()), vec![]);
        assert_eq!(image.kind(), None);
    }

    #[test]
    fn test_report_kind_from_extension() {
        let docx = ReportFile::new("labs.docx", None, vec![]);
        assert_eq!(docx.kind(), Some(ReportKind::Docx));

        let txt = ReportFile::new("notes.txt", None, vec![]);
        assert_eq!(txt.kind(), None);
    }
}
