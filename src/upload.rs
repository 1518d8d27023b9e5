//! Report upload.
//!
//! Attaching a document either adds turns to the current session or, with
//! nothing selected, creates a session for it first. The server produces
//! the resulting conversation turns; the client reloads rather than
//! synthesizing them.

use crate::error::{ChatError, RemoteError};
use crate::model::{ReportFile, SessionId};
use crate::sync::{Busy, LoadOutcome, SyncController};

/// How an upload ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded {
        session_id: SessionId,
        /// Whether the upload created `session_id`.
        created_session: bool,
        /// Result of reloading the session's messages.
        reload: LoadOutcome,
    },
    /// The upload failed; an assistant notice was appended where possible.
    Failed(RemoteError),
}

#[derive(Debug, Clone)]
pub struct UploadCoordinator {
    sync: SyncController,
}

impl UploadCoordinator {
    #[must_use]
    pub fn new(sync: SyncController) -> Self {
        Self { sync }
    }

    /// Upload `file` to `session_id`, or to a new session when `None`.
    ///
    /// Only PDF and DOCX documents are accepted; anything else is rejected
    /// before a session is created or any request is made.
    pub async fn upload_report(
        &self,
        file: &ReportFile,
        session_id: Option<&SessionId>,
    ) -> Result<UploadOutcome, ChatError> {
        let Some(kind) = file.kind() else {
            return Err(ChatError::validation(format!(
                "{} is not a PDF or DOCX document",
                file.file_name
            )));
        };
        let _guard = self.sync.begin(Busy::Uploading)?;

        let (target, created_session) = match session_id {
            Some(id) => (id.clone(), false),
            None => {
                let title = self.sync.chat_config().report_session_title.clone();
                match self.sync.create_session(&title).await {
                    Ok(session) => (session.id, true),
                    Err(ChatError::Remote(e)) => return Ok(UploadOutcome::Failed(e)),
                    Err(e) => return Err(e),
                }
            }
        };

        tracing::info!(
            name: "upload.started",
            file = %file.file_name,
            kind = ?kind,
            session_id = %target,
            created_session,
            "Uploading report"
        );

        match self.sync.backend().upload_report(file, Some(&target)).await {
            Ok(receipt) => {
                // A load issued before the upload cannot contain its turns.
                let reload = self.sync.refresh_messages(&receipt.session_id).await;
                if created_session {
                    self.sync.load_sessions().await;
                }
                Ok(UploadOutcome::Uploaded {
                    session_id: receipt.session_id,
                    created_session,
                    reload,
                })
            }
            Err(e) => {
                tracing::warn!(
                    name: "upload.failed",
                    file = %file.file_name,
                    session_id = %target,
                    error = %e,
                    "Report upload failed"
                );
                let text = self.sync.chat_config().upload_error_text.clone();
                self.sync.append_notice(&target, &text);
                Ok(UploadOutcome::Failed(e))
            }
        }
    }
}
