//! Request and response shapes exchanged with the processing service.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::session::OutputLocation;

/// A document as sent to the service.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content: Arc<[u8]>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content: Arc<[u8]>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }
}

/// Result of the encryption check.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionCheck {
    pub encrypted: bool,
    /// A saved credential that opened the document, if any.
    #[serde(default, alias = "auto_password")]
    pub auto_password: Option<String>,
}

/// One redaction request: a single file within a batch.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub file: UploadFile,
    pub words: Vec<String>,
    pub session_id: String,
    pub batch_id: String,
}

impl ProcessRequest {
    /// Terms as the service expects them: comma-joined, blanks dropped.
    pub fn joined_words(&self) -> String {
        self.words
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveRequest<'a> {
    pub files: &'a [OutputLocation],
}

#[derive(Debug, Clone, Serialize)]
pub struct RevealRequest<'a> {
    pub path: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachment_path: String,
}

/// `{error: "..."}` as returned by the service on a handled failure.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

/// Signals the moment a file's bytes have been handed to the transport.
///
/// Dropping it without calling [`UploadNotifier::notify`] simply means no
/// upload-complete signal is delivered.
#[derive(Debug, Default)]
pub struct UploadNotifier(Option<oneshot::Sender<()>>);

impl UploadNotifier {
    pub fn new(sender: oneshot::Sender<()>) -> Self {
        Self(Some(sender))
    }

    pub fn noop() -> Self {
        Self(None)
    }

    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(tx), rx)
    }

    pub fn notify(mut self) {
        if let Some(sender) = self.0.take() {
            let _ = sender.send(());
        }
    }
}
