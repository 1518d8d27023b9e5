//! Scripted in-memory backend for integration tests.
//!
//! Individual calls can be held open with [`MockBackend::hold`] and let go
//! with [`MockBackend::release`], which makes interleavings reproducible on
//! the current-thread test runtime.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chat_sync::clipboard::{Clipboard, ClipboardError};
use chat_sync::config::ChatConfig;
use chat_sync::model::{
    Message, MessageId, MessageStatus, RemoteId, ReportFile, Role, Session, SessionId,
    UploadReceipt, User,
};
use chat_sync::remote::ChatBackend;
use chat_sync::{ChatContext, InteractionFacade, RemoteError};
use chrono::{Duration, Utc};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchSessions,
    CreateSession(String),
    RenameSession(SessionId, String),
    DeleteSession(SessionId),
    FetchMessages(SessionId),
    SendMessage(SessionId, String),
    Regenerate(RemoteId),
    Upload(Option<SessionId>, String),
    CurrentUser,
}

#[derive(Debug, Default)]
struct MockState {
    sessions: Vec<Session>,
    messages: HashMap<SessionId, Vec<Message>>,
    next_id: i64,
    calls: Vec<Call>,
    failing: HashSet<String>,
    reply: Option<String>,
    user: Option<User>,
    answer_at_issue: bool,
}

#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
}

pub fn session(id: i64, title: &str) -> Session {
    // Higher ids are newer, like server-assigned keys.
    let created = Utc::now() - Duration::minutes(100 - id);
    Session {
        id: SessionId::from(id),
        title: title.to_string(),
        created_at: created,
        updated_at: created,
    }
}

pub fn remote_message(session: i64, id: i64, role: Role, content: &str) -> Message {
    Message {
        id: MessageId::Remote(RemoteId::Int(id)),
        session_id: SessionId::from(session),
        role,
        content: content.to_string(),
        created_at: Utc::now(),
        status: MessageStatus::Confirmed,
    }
}

pub fn contents(messages: &[Message]) -> Vec<(Role, String)> {
    messages
        .iter()
        .map(|m| (m.role, m.content.clone()))
        .collect()
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        backend.state.lock().unwrap().next_id = 1000;
        Arc::new(backend)
    }

    /// Seed a session with server-side messages.
    pub fn seed(&self, session: Session, messages: Vec<Message>) {
        let mut state = self.state.lock().unwrap();
        state.messages.insert(session.id.clone(), messages);
        state.sessions.push(session);
    }

    pub fn set_user(&self, user: User) {
        self.state.lock().unwrap().user = Some(user);
    }

    /// Reply text for the next sends; defaults to echoing the content.
    pub fn reply_with(&self, text: &str) {
        self.state.lock().unwrap().reply = Some(text.to_string());
    }

    /// Make every call of `op` fail until [`recover`](Self::recover).
    pub fn fail(&self, op: &str) {
        self.state.lock().unwrap().failing.insert(op.to_string());
    }

    pub fn recover(&self, op: &str) {
        self.state.lock().unwrap().failing.remove(op);
    }

    /// Answer message fetches with the log as it was when the request
    /// arrived, even if the call is held while other writes land.
    pub fn answer_at_issue(&self) {
        self.state.lock().unwrap().answer_at_issue = true;
    }

    /// Park the next call reaching `key` until released.
    pub fn hold(&self, key: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(key.to_string(), Arc::new(Notify::new()));
    }

    pub fn release(&self, key: &str) {
        if let Some(gate) = self.gates.lock().unwrap().remove(key) {
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    async fn enter(&self, call: Call, key: &str, op: &str) -> Result<(), RemoteError> {
        self.state.lock().unwrap().calls.push(call);
        let gate = self.gates.lock().unwrap().get(key).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.state.lock().unwrap().failing.contains(op) {
            return Err(RemoteError::new(format!("{op} failed")).with_status(500));
        }
        Ok(())
    }

    fn next_id(state: &mut MockState) -> i64 {
        state.next_id += 1;
        state.next_id
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn fetch_sessions(&self) -> Result<Vec<Session>, RemoteError> {
        self.enter(Call::FetchSessions, "fetch_sessions", "fetch_sessions")
            .await?;
        Ok(self.state.lock().unwrap().sessions.clone())
    }

    async fn create_session(&self, title: &str) -> Result<Session, RemoteError> {
        self.enter(Call::CreateSession(title.to_string()), "create", "create")
            .await?;
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state);
        let now = Utc::now();
        let created = Session {
            id: SessionId::from(id),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.sessions.push(created.clone());
        state.messages.insert(created.id.clone(), Vec::new());
        Ok(created)
    }

    async fn rename_session(&self, id: &SessionId, title: &str) -> Result<Session, RemoteError> {
        self.enter(
            Call::RenameSession(id.clone(), title.to_string()),
            "rename",
            "rename",
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| RemoteError::new("session not found").with_status(404))?;
        session.title = title.to_string();
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), RemoteError> {
        self.enter(Call::DeleteSession(id.clone()), "delete", "delete")
            .await?;
        let mut state = self.state.lock().unwrap();
        state.sessions.retain(|s| &s.id != id);
        state.messages.remove(id);
        Ok(())
    }

    async fn fetch_messages(&self, session_id: &SessionId) -> Result<Vec<Message>, RemoteError> {
        let key = format!("fetch_messages:{session_id}");
        let at_issue = {
            let state = self.state.lock().unwrap();
            state
                .answer_at_issue
                .then(|| state.messages.get(session_id).cloned())
        };
        self.enter(Call::FetchMessages(session_id.clone()), &key, "fetch_messages")
            .await?;
        let log = match at_issue {
            Some(log) => log,
            None => self.state.lock().unwrap().messages.get(session_id).cloned(),
        };
        log.ok_or_else(|| RemoteError::new("session not found").with_status(404))
    }

    async fn send_message(
        &self,
        content: &str,
        session_id: &SessionId,
    ) -> Result<Message, RemoteError> {
        self.enter(
            Call::SendMessage(session_id.clone(), content.to_string()),
            "send",
            "send",
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        let user_id = Self::next_id(&mut state);
        let reply_id = Self::next_id(&mut state);
        let reply_text = state
            .reply
            .clone()
            .unwrap_or_else(|| format!("echo: {content}"));
        let session = match session_id {
            SessionId(RemoteId::Int(n)) => *n,
            SessionId(RemoteId::Text(_)) => 0,
        };
        let user = remote_message(session, user_id, Role::User, content);
        let reply = remote_message(session, reply_id, Role::Assistant, &reply_text);
        let log = state.messages.entry(session_id.clone()).or_default();
        log.push(user);
        log.push(reply.clone());
        Ok(reply)
    }

    async fn regenerate_message(
        &self,
        session_id: &SessionId,
        id: &RemoteId,
    ) -> Result<Message, RemoteError> {
        let key = format!("regenerate:{id}");
        self.enter(Call::Regenerate(id.clone()), &key, "regenerate")
            .await?;
        let mut state = self.state.lock().unwrap();
        let target = MessageId::Remote(id.clone());
        let message = state
            .messages
            .get_mut(session_id)
            .and_then(|log| log.iter_mut().find(|m| m.id == target))
            .ok_or_else(|| RemoteError::new("message not found").with_status(404))?;
        message.content = format!("regenerated {id} in {session_id}");
        Ok(message.clone())
    }

    async fn upload_report(
        &self,
        file: &ReportFile,
        session_id: Option<&SessionId>,
    ) -> Result<UploadReceipt, RemoteError> {
        self.enter(
            Call::Upload(session_id.cloned(), file.file_name.clone()),
            "upload",
            "upload",
        )
        .await?;
        let session_id = session_id
            .cloned()
            .ok_or_else(|| RemoteError::new("no session"))?;
        let mut state = self.state.lock().unwrap();
        let session = match &session_id {
            SessionId(RemoteId::Int(n)) => *n,
            SessionId(RemoteId::Text(_)) => 0,
        };
        let upload_id = Self::next_id(&mut state);
        let analysis_id = Self::next_id(&mut state);
        let upload = remote_message(
            session,
            upload_id,
            Role::User,
            &format!("Uploaded report: {}", file.file_name),
        );
        let analysis = remote_message(
            session,
            analysis_id,
            Role::Assistant,
            &format!("Analysis of {}", file.file_name),
        );
        let log = state.messages.entry(session_id.clone()).or_default();
        log.push(upload);
        log.push(analysis.clone());
        Ok(UploadReceipt {
            session_id,
            message: Some(analysis),
        })
    }

    async fn current_user(&self) -> Result<Option<User>, RemoteError> {
        self.enter(Call::CurrentUser, "user", "user").await?;
        Ok(self.state.lock().unwrap().user.clone())
    }
}

/// Clipboard that records writes, or refuses them.
#[derive(Debug, Default)]
pub struct RecordingClipboard {
    pub refuse: bool,
    pub written: Mutex<Vec<String>>,
}

impl RecordingClipboard {
    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            refuse: true,
            written: Mutex::new(Vec::new()),
        })
    }

    pub fn accepting() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Clipboard for RecordingClipboard {
    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        if self.refuse {
            return Err(ClipboardError::Unavailable("refused".to_string()));
        }
        self.written.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub fn facade(backend: &Arc<MockBackend>) -> InteractionFacade {
    facade_with(backend, ChatConfig::default())
}

pub fn facade_with(backend: &Arc<MockBackend>, chat: ChatConfig) -> InteractionFacade {
    let backend: Arc<dyn ChatBackend> = Arc::clone(backend) as Arc<dyn ChatBackend>;
    InteractionFacade::new(backend, ChatContext::default(), chat).with_clipboards(
        RecordingClipboard::accepting(),
        RecordingClipboard::accepting(),
    )
}

/// Let spawned tasks run until they park on a gate or finish.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
