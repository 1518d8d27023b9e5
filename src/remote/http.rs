//! REST implementation of [`ChatBackend`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use url::Url;

use super::ChatBackend;
use crate::error::RemoteError;
use crate::model::{
    Message, MessageId, MessageStatus, RemoteId, ReportFile, Role, Session, SessionId,
    UploadReceipt, User,
};

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// API root, e.g. `http://localhost:8000/api`.
    pub base_url: String,
    /// Bearer token issued by the authentication flow.
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

/// Chat backend speaking the server's JSON API.
#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
    on_unauthorized: Option<UnauthorizedHook>,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl HttpBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, RemoteError> {
        let base = Url::parse(settings.base_url.trim_end_matches('/'))
            .map_err(|e| RemoteError::new(format!("invalid base url: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::new(format!(
                "base url cannot carry paths: {}",
                settings.base_url
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            http,
            base,
            token: settings.token.filter(|t| !t.trim().is_empty()),
            on_unauthorized: None,
        })
    }

    /// Run `hook` whenever the server answers 401.
    ///
    /// Session expiry belongs to the authentication layer; the call that
    /// hit it still fails normally.
    #[must_use]
    pub fn with_unauthorized_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_unauthorized = Some(Arc::new(hook));
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let rb = self.http.request(method, url);
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    async fn send(&self, rb: RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = rb.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(name: "backend.unauthorized", "Server rejected credentials");
            if let Some(hook) = &self.on_unauthorized {
                hook();
            }
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError {
            detail: error_detail(&body),
            status: Some(status.as_u16()),
        })
    }

    async fn json<T: DeserializeOwned>(&self, rb: RequestBuilder) -> Result<T, RemoteError> {
        let response = self.send(rb).await?;
        Ok(response.json().await?)
    }
}

/// Pull a readable message out of an error body.
///
/// `{"detail": "..."}` yields the string; structured details are kept as
/// JSON; any other non-empty body is returned verbatim.
fn error_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => match value.get("detail") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(trimmed.to_string()),
        },
        Err(_) => Some(trimmed.to_string()),
    }
}

/// Accept RFC 3339 as well as the naive ISO timestamps the server emits,
/// reading the latter as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| parse_timestamp(&raw).map_err(serde::de::Error::custom))
        .transpose()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp {raw:?}: {e}"))
}

#[derive(Debug, Deserialize)]
struct SessionDto {
    id: RemoteId,
    title: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    updated_at: Option<DateTime<Utc>>,
}

impl From<SessionDto> for Session {
    fn from(dto: SessionDto) -> Self {
        Self {
            id: SessionId(dto.id),
            title: dto.title,
            created_at: dto.created_at,
            updated_at: dto.updated_at.unwrap_or(dto.created_at),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageDto {
    id: RemoteId,
    role: Role,
    content: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    created_at: DateTime<Utc>,
}

impl MessageDto {
    fn into_message(self, session_id: SessionId) -> Message {
        Message {
            id: MessageId::Remote(self.id),
            session_id,
            role: self.role,
            content: self.content,
            created_at: self.created_at,
            status: MessageStatus::Confirmed,
        }
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn fetch_sessions(&self) -> Result<Vec<Session>, RemoteError> {
        let url = self.endpoint(&["chat", "sessions"]);
        let sessions: Vec<SessionDto> = self.json(self.request(Method::GET, url)).await?;
        Ok(sessions.into_iter().map(Session::from).collect())
    }

    async fn create_session(&self, title: &str) -> Result<Session, RemoteError> {
        let url = self.endpoint(&["chat", "sessions"]);
        let rb = self
            .request(Method::POST, url)
            .json(&serde_json::json!({ "title": title }));
        let session: SessionDto = self.json(rb).await?;
        Ok(session.into())
    }

    async fn rename_session(&self, id: &SessionId, title: &str) -> Result<Session, RemoteError> {
        let id = id.to_string();
        let url = self.endpoint(&["chat", "sessions", &id]);
        let rb = self
            .request(Method::PUT, url)
            .json(&serde_json::json!({ "title": title }));
        let session: SessionDto = self.json(rb).await?;
        Ok(session.into())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), RemoteError> {
        let id = id.to_string();
        let url = self.endpoint(&["chat", "sessions", &id]);
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn fetch_messages(&self, session_id: &SessionId) -> Result<Vec<Message>, RemoteError> {
        let id = session_id.to_string();
        let url = self.endpoint(&["chat", "sessions", &id, "messages"]);
        let messages: Vec<MessageDto> = self.json(self.request(Method::GET, url)).await?;
        Ok(messages
            .into_iter()
            .map(|m| m.into_message(session_id.clone()))
            .collect())
    }

    async fn send_message(
        &self,
        content: &str,
        session_id: &SessionId,
    ) -> Result<Message, RemoteError> {
        let url = self.endpoint(&["chat", "messages"]);
        let rb = self.request(Method::POST, url).json(&serde_json::json!({
            "content": content,
            "session_id": session_id,
        }));
        let reply: MessageDto = self.json(rb).await?;
        Ok(reply.into_message(session_id.clone()))
    }

    async fn regenerate_message(
        &self,
        session_id: &SessionId,
        id: &RemoteId,
    ) -> Result<Message, RemoteError> {
        let id = id.to_string();
        let url = self.endpoint(&["chat", "messages", &id, "regenerate"]);
        let reply: MessageDto = self.json(self.request(Method::POST, url)).await?;
        Ok(reply.into_message(session_id.clone()))
    }

    async fn upload_report(
        &self,
        file: &ReportFile,
        session_id: Option<&SessionId>,
    ) -> Result<UploadReceipt, RemoteError> {
        let session_id = session_id
            .cloned()
            .ok_or_else(|| RemoteError::new("report upload needs a target session"))?;

        let mime = file
            .kind()
            .map(|k| k.mime_type())
            .ok_or_else(|| RemoteError::new("unsupported report type"))?;
        let part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut url = self.endpoint(&["reports", "upload"]);
        url.query_pairs_mut()
            .append_pair("session_id", &session_id.to_string());

        let analysis: MessageDto = self
            .json(self.request(Method::POST, url).multipart(form))
            .await?;
        Ok(UploadReceipt {
            message: Some(analysis.into_message(session_id.clone())),
            session_id,
        })
    }

    async fn current_user(&self) -> Result<Option<User>, RemoteError> {
        let url = self.endpoint(&["users", "me"]);
        let response = self.send(self.request(Method::GET, url)).await;
        match response {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(RemoteError {
                status: Some(404), ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
