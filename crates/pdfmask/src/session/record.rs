use std::fmt;
use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::registry::FileRegistry;

/// Opaque identifier assigned when a file is submitted.
pub type FileId = String;

/// Lifecycle state of a single submitted document.
///
/// `Checking` is the initial state while the encryption check is in flight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Checking,
    Pending,
    Encrypted,
    Decrypted,
    Uploading,
    Processing,
    Done,
    Error,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Checking => write!(f, "checking"),
            FileStatus::Pending => write!(f, "pending"),
            FileStatus::Encrypted => write!(f, "encrypted"),
            FileStatus::Decrypted => write!(f, "decrypted"),
            FileStatus::Uploading => write!(f, "uploading"),
            FileStatus::Processing => write!(f, "processing"),
            FileStatus::Done => write!(f, "done"),
            FileStatus::Error => write!(f, "error"),
        }
    }
}

impl FileStatus {
    /// Edges of the per-file state machine.
    pub fn can_transition(self, to: FileStatus) -> bool {
        use FileStatus::*;
        matches!(
            (self, to),
            (Checking, Pending)
                | (Checking, Encrypted)
                | (Checking, Error)
                | (Encrypted, Decrypted)
                | (Decrypted, Pending)
                | (Decrypted, Uploading)
                | (Pending, Uploading)
                | (Uploading, Processing)
                | (Uploading, Done)
                | (Uploading, Error)
                | (Processing, Done)
                | (Processing, Error)
        )
    }

    /// Ready to be picked by the batch controller.
    pub fn is_eligible(self) -> bool {
        matches!(self, FileStatus::Pending | FileStatus::Decrypted)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Done | FileStatus::Error)
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, FileStatus::Uploading | FileStatus::Processing)
    }
}

/// Session-wide state, independent of (but constrained by) file states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GlobalStatus {
    #[default]
    Idle,
    Processing,
    Done,
    Cancelling,
}

impl fmt::Display for GlobalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlobalStatus::Idle => write!(f, "idle"),
            GlobalStatus::Processing => write!(f, "processing"),
            GlobalStatus::Done => write!(f, "done"),
            GlobalStatus::Cancelling => write!(f, "cancelling"),
        }
    }
}

/// Where the processing service left a redacted artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutputLocation {
    #[serde(alias = "temp_dir")]
    pub output_directory: String,
    #[serde(alias = "filename")]
    pub output_filename: String,
    /// Folder the service copied the batch into, when a save path is configured.
    #[serde(default, alias = "save_directory", skip_serializing_if = "Option::is_none")]
    pub save_directory: Option<String>,
}

/// One submitted document.
///
/// Fields are only mutated through [`FileRegistry`], which keeps `output`
/// set exactly when the status is `Done` and `error` set exactly when it is
/// `Error`.
#[derive(Debug)]
pub struct FileRecord {
    pub(super) id: FileId,
    pub(super) name: String,
    pub(super) content: Arc<[u8]>,
    pub(super) status: FileStatus,
    pub(super) password: Option<SecretString>,
    pub(super) output: Option<OutputLocation>,
    pub(super) error: Option<String>,
}

impl FileRecord {
    pub(super) fn new(name: String, content: Vec<u8>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            content: Arc::from(content),
            status: FileStatus::Checking,
            password: None,
            output: None,
            error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the document bytes; cheap to hand to an in-flight request.
    pub fn content(&self) -> Arc<[u8]> {
        Arc::clone(&self.content)
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    pub fn output(&self) -> Option<&OutputLocation> {
        self.output.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// The one outstanding interactive password prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCredentialRequest {
    pub file_id: FileId,
    pub last_error: Option<String>,
}

impl PendingCredentialRequest {
    pub fn new(file_id: &str) -> Self {
        Self {
            file_id: file_id.to_string(),
            last_error: None,
        }
    }
}

/// One application launch/reconnect cycle.
#[derive(Debug)]
pub struct Session {
    pub session_id: String,
    pub registry: FileRegistry,
    pub global_status: GlobalStatus,
    /// Set per processing run, not per session.
    pub batch_id: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn with_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            registry: FileRegistry::new(),
            global_status: GlobalStatus::Idle,
            batch_id: None,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
