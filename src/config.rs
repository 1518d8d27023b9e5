use std::time::Duration;

use clap::Args;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::remote::BackendSettings;

/// Configuration flags shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Config file path
    #[arg(short, long, env = "CHAT_SYNC_CONFIG", global = true)]
    pub config: Option<String>,

    /// API root of the chat server
    #[arg(long, env = "CHAT_SYNC_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Bearer token for the chat server
    #[arg(long, env = "CHAT_SYNC_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, env = "CHAT_SYNC_TIMEOUT_SECS", global = true)]
    pub timeout_secs: Option<u64>,

    /// Preferences file
    #[arg(long, env = "CHAT_SYNC_PREFERENCES", global = true)]
    pub preferences: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub chat: ChatConfig,
    #[serde(default)]
    pub preferences: PreferencesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl BackendConfig {
    #[must_use]
    pub fn settings(&self) -> BackendSettings {
        BackendSettings {
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// User-facing texts and behaviour switches of the chat core.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Title given to sessions created with "new chat".
    pub new_session_title: String,
    /// Title given to sessions created implicitly by a report upload.
    pub report_session_title: String,
    /// Assistant notice appended when sending fails.
    pub send_error_text: String,
    /// Assistant notice appended when an upload fails.
    pub upload_error_text: String,
    /// Select the first session after the initial list load.
    pub auto_select_first: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            new_session_title: "New chat".to_string(),
            report_session_title: "Report analysis".to_string(),
            send_error_text: "Sorry, something went wrong while sending your message.".to_string(),
            upload_error_text: "Sorry, the report upload failed. Please try again.".to_string(),
            auto_select_first: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PreferencesConfig {
    #[serde(default)]
    pub path: Option<String>,
}

impl AppConfig {
    /// Build the configuration.
    ///
    /// Priority: CLI flag (or its env var) > `CHAT_SYNC__*` env vars >
    /// config file > defaults.
    pub fn load(args: &ConfigArgs) -> Result<Self, config::ConfigError> {
        let chat = ChatConfig::default();
        let mut builder = Config::builder()
            .set_default("backend.base_url", "http://localhost:8000/api")?
            .set_default("backend.timeout_secs", 60)?
            .set_default("chat.new_session_title", chat.new_session_title)?
            .set_default("chat.report_session_title", chat.report_session_title)?
            .set_default("chat.send_error_text", chat.send_error_text)?
            .set_default("chat.upload_error_text", chat.upload_error_text)?
            .set_default("chat.auto_select_first", chat.auto_select_first)?;

        if let Some(path) = &args.config {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // E.g. CHAT_SYNC__BACKEND__BASE_URL=http://host/api
        builder = builder.add_source(
            Environment::with_prefix("CHAT_SYNC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(url) = &args.base_url {
            builder = builder.set_override("backend.base_url", url.as_str())?;
        }
        if let Some(token) = &args.token {
            builder = builder.set_override("backend.token", token.as_str())?;
        }
        if let Some(secs) = args.timeout_secs {
            builder = builder.set_override("backend.timeout_secs", secs)?;
        }
        if let Some(path) = &args.preferences {
            builder = builder.set_override("preferences.path", path.as_str())?;
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_settings_conversion() {
        let backend = BackendConfig {
            base_url: "http://example.test/api".to_string(),
            token: Some("t".to_string()),
            timeout_secs: 5,
        };
        let settings = backend.settings();
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(settings.token.as_deref(), Some("t"));
    }
}
