use std::fmt;
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;

use crate::channel::ProgressEvent;
use crate::config::AppSettings;
use crate::service::types::{EmailRequest, EncryptionCheck, ProcessRequest, UploadFile};
use crate::session::{FileId, FileStatus, OutputLocation, PendingCredentialRequest};

/// A document handed over by the user.
pub struct SubmittedFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl SubmittedFile {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }
}

impl fmt::Debug for SubmittedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmittedFile")
            .field("name", &self.name)
            .field("bytes", &self.content.len())
            .finish()
    }
}

/// Who supplied the password for a decrypt attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptAttempt {
    /// A saved credential returned by the encryption check.
    Auto,
    /// Typed into the credential prompt.
    Interactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    Download,
    Archive,
    Reveal,
    Email,
}

impl fmt::Display for DeliveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryKind::Download => write!(f, "download"),
            DeliveryKind::Archive => write!(f, "archive"),
            DeliveryKind::Reveal => write!(f, "reveal"),
            DeliveryKind::Email => write!(f, "email"),
        }
    }
}

/// Everything that can happen to a session: user actions, results of
/// external calls, progress channel events and timers.
#[derive(Debug)]
pub enum Message {
    SettingsLoaded(AppSettings),
    FilesSubmitted(Vec<SubmittedFile>),
    CheckFinished {
        file_id: FileId,
        result: Result<EncryptionCheck, String>,
    },
    DecryptFinished {
        file_id: FileId,
        attempt: DecryptAttempt,
        password: SecretString,
        result: Result<Vec<u8>, String>,
    },
    /// Answer to the outstanding credential prompt.
    PasswordSubmitted(SecretString),
    PromptDismissed,
    RemoveFile(FileId),
    SetWords(Vec<String>),
    AddWord(String),
    RemoveWord(String),
    StartBatch,
    /// The in-flight file's bytes were fully sent.
    UploadFinished {
        file_id: FileId,
    },
    ProcessFinished {
        file_id: FileId,
        result: Result<OutputLocation, String>,
    },
    CancelRequested,
    CancelTimeout {
        generation: u64,
    },
    Channel(ProgressEvent),
    DownloadRequested,
    RevealRequested,
    EmailRequested {
        /// Falls back to the configured default recipient.
        recipient: Option<String>,
        subject: String,
        body: String,
        /// Required when the batch produced more than one artifact.
        attachment_path: Option<String>,
    },
    DeliveryFinished {
        kind: DeliveryKind,
        /// Where the artifact ended up, when that is meaningful.
        result: Result<Option<String>, String>,
    },
    Reset,
    ResetElapsed {
        generation: u64,
    },
}

/// Side effects requested by the coordinator. The driver executes them and
/// reports back with the matching [`Message`].
#[derive(Debug)]
pub enum Command {
    CheckEncryption {
        file_id: FileId,
        file: UploadFile,
    },
    Decrypt {
        file_id: FileId,
        file: UploadFile,
        password: SecretString,
        attempt: DecryptAttempt,
    },
    Process {
        file_id: FileId,
        request: ProcessRequest,
    },
    Cancel {
        session_id: String,
    },
    StartCancelTimer {
        generation: u64,
        after: Duration,
    },
    Download {
        output: OutputLocation,
    },
    Archive {
        outputs: Vec<OutputLocation>,
        file_name: String,
    },
    Reveal {
        path: String,
    },
    SendEmail(EmailRequest),
    SaveSettings(AppSettings),
    ScheduleReset {
        generation: u64,
        after: Duration,
    },
    Emit(SessionEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Notifications for whoever presents the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    PromptOpened {
        request: PendingCredentialRequest,
        file_name: String,
    },
    /// The open prompt stays up with an error to show.
    PasswordRejected {
        file_id: FileId,
        error: String,
    },
    PromptClosed {
        file_id: FileId,
    },
    BatchStarted {
        batch_id: String,
        total: usize,
    },
    FileFinished {
        file_id: FileId,
        status: FileStatus,
    },
    BatchFinished {
        summary: String,
    },
    CancelAcknowledged {
        timed_out: bool,
    },
    OutputDelivered {
        kind: DeliveryKind,
        location: Option<String>,
    },
    SessionReset,
    Notice {
        level: NoticeLevel,
        message: String,
    },
}

impl SessionEvent {
    pub fn info(message: impl Into<String>) -> Self {
        SessionEvent::Notice {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        SessionEvent::Notice {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        SessionEvent::Notice {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}
