use serde::Serialize;

use crate::session::{
    FileId, FileRecord, FileStatus, GlobalStatus, OutputLocation, PendingCredentialRequest,
};

/// Immutable view of a session, published after every update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub global_status: GlobalStatus,
    pub batch_id: Option<String>,
    pub words: Vec<String>,
    pub files: Vec<FileSummary>,
    pub prompt: Option<PendingCredentialRequest>,
    pub progress: Option<ProgressDisplay>,
    pub batch: Option<BatchCounts>,
    /// Summary of the most recently finished batch.
    pub summary: Option<String>,
    pub can_start: bool,
    pub can_deliver: bool,
    pub save_location: Option<String>,
}

impl SessionSnapshot {
    pub fn file(&self, id: &str) -> Option<&FileSummary> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn status_of(&self, id: &str) -> Option<FileStatus> {
        self.file(id).map(|f| f.status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: FileId,
    pub name: String,
    pub size: usize,
    pub status: FileStatus,
    pub has_password: bool,
    pub output: Option<OutputLocation>,
    pub error: Option<String>,
}

impl From<&FileRecord> for FileSummary {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id().to_string(),
            name: record.name().to_string(),
            size: record.size(),
            status: record.status(),
            has_password: record.password().is_some(),
            output: record.output().cloned(),
            error: record.error().map(str::to_string),
        }
    }
}

/// Progress of the file currently in flight, as last reported by the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDisplay {
    pub file_id: FileId,
    pub percentage: u8,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCounts {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
}

impl BatchCounts {
    pub fn summary(&self, cancelled: bool) -> String {
        let mut text = format!("Redacted {} of {} file(s)", self.done, self.total);
        if self.failed > 0 {
            text.push_str(&format!(", {} failed", self.failed));
        }
        if cancelled {
            text.push_str(" (cancelled)");
        }
        text
    }
}
