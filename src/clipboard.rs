//! Clipboard collaborators.
//!
//! [`SystemClipboard`] sets the platform clipboard through `arboard`. Where
//! there is none to reach (a headless host, a remote shell),
//! [`Osc52Clipboard`] asks the terminal to set it through an OSC 52 escape
//! sequence instead.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

#[derive(Debug, thiserror::Error)]
pub enum ClipboardError {
    #[error("no clipboard available: {0}")]
    Unavailable(String),

    #[error("system clipboard failed: {0}")]
    System(#[from] arboard::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Something that can receive copied text.
#[async_trait]
pub trait Clipboard: Send + Sync + std::fmt::Debug {
    async fn write_text(&self, text: &str) -> Result<(), ClipboardError>;

    /// Name for logging.
    fn name(&self) -> &'static str;
}

/// The platform clipboard.
///
/// `arboard` talks to the display server synchronously, so each write runs
/// on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Clipboard for SystemClipboard {
    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let text = text.to_string();
        let written = tokio::task::spawn_blocking(move || {
            let mut clipboard = arboard::Clipboard::new()?;
            clipboard.set_text(text)
        })
        .await
        .map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
        Ok(written?)
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

/// Fallback that emits an OSC 52 "set clipboard" sequence to a terminal.
#[derive(Debug)]
pub struct Osc52Clipboard<W> {
    out: Mutex<W>,
}

impl<W> Osc52Clipboard<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Consume the clipboard and return its writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Osc52Clipboard<std::io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

/// Escape sequence that sets the system clipboard to `text`.
#[must_use]
pub fn osc52_sequence(text: &str) -> String {
    format!("\x1b]52;c;{}\x07", STANDARD.encode(text))
}

#[async_trait]
impl<W> Clipboard for Osc52Clipboard<W>
where
    W: Write + Send + std::fmt::Debug,
{
    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(osc52_sequence(text).as_bytes())?;
        out.flush()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "osc52"
    }
}
