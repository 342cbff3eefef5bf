use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the coordinator itself: where the processing service lives
/// and the timings that drive reconnects, cancellation and reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinatorConfig {
    #[serde(default = "default_service_url")]
    pub service_url: String,

    /// Explicit progress channel base URL. Derived from `service_url` when absent.
    #[serde(default)]
    pub progress_url: Option<String>,

    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    #[serde(default = "default_cancel_ack_timeout_ms")]
    pub cancel_ack_timeout_ms: u64,

    #[serde(default = "default_reset_delay_ms")]
    pub reset_delay_ms: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub download_dir: Option<PathBuf>,

    #[serde(default = "default_archive_name")]
    pub archive_name: String,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_service_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_reconnect_backoff_ms() -> u64 {
    3000
}

fn default_cancel_ack_timeout_ms() -> u64 {
    30_000
}

fn default_reset_delay_ms() -> u64 {
    1500
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_archive_name() -> String {
    "redacted_documents.zip".to_string()
}

fn default_event_capacity() -> usize {
    100
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            progress_url: None,
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            cancel_ack_timeout_ms: default_cancel_ack_timeout_ms(),
            reset_delay_ms: default_reset_delay_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            download_dir: None,
            archive_name: default_archive_name(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl CoordinatorConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn cancel_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_ack_timeout_ms)
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    /// Progress channel URL for a session, e.g. `ws://127.0.0.1:8000/ws/<id>`.
    pub fn progress_url_for(&self, session_id: &str) -> String {
        let base = match &self.progress_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let service = self.service_url.trim_end_matches('/');
                if let Some(rest) = service.strip_prefix("https://") {
                    format!("wss://{}/ws", rest)
                } else if let Some(rest) = service.strip_prefix("http://") {
                    format!("ws://{}/ws", rest)
                } else {
                    format!("{}/ws", service)
                }
            }
        };
        format!("{}/{}", base, session_id)
    }

    /// Destination for downloaded artifacts.
    pub fn resolved_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Document held by the remote configuration store (`/api/config`).
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default)]
    pub words: Vec<String>,
    #[serde(default)]
    pub passwords: Vec<String>,
    #[serde(default)]
    pub email_settings: EmailSettings,
    #[serde(default)]
    pub general_settings: GeneralSettings,
}

impl fmt::Debug for AppSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppSettings")
            .field("words", &self.words)
            .field("passwords", &format_args!("[{} hidden]", self.passwords.len()))
            .field("email_settings", &self.email_settings)
            .field("general_settings", &self.general_settings)
            .finish()
    }
}

impl AppSettings {
    /// Appends a saved password unless it is already known.
    /// Returns true when the list changed.
    pub fn remember_password(&mut self, password: &str) -> bool {
        if password.is_empty() || self.passwords.iter().any(|p| p == password) {
            return false;
        }
        self.passwords.push(password.to_string());
        true
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailSettings {
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub sender_email: String,
    #[serde(default)]
    pub sender_password: String,
    #[serde(default)]
    pub default_recipient: String,
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            smtp_server: String::new(),
            smtp_port: default_smtp_port(),
            sender_email: String::new(),
            sender_password: String::new(),
            default_recipient: String::new(),
        }
    }
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("sender_email", &self.sender_email)
            .field("sender_password", &"****")
            .field("default_recipient", &self.default_recipient)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSettings {
    #[serde(default)]
    pub save_path: Option<String>,
    #[serde(default)]
    pub remember_passwords: bool,
}
