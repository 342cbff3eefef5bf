use secrecy::SecretString;

use crate::error::TransitionError;

use super::record::{FileId, FileRecord, FileStatus, OutputLocation};

/// Ordered set of submitted files. Insertion order is processing order.
#[derive(Debug, Default)]
pub struct FileRegistry {
    records: Vec<FileRecord>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly submitted document in the `Checking` state.
    pub fn add(&mut self, name: impl Into<String>, content: Vec<u8>) -> FileId {
        let record = FileRecord::new(name.into(), content);
        let id = record.id.clone();
        self.records.push(record);
        id
    }

    pub fn get(&self, id: &str) -> Option<&FileRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    pub fn any(&self, status: FileStatus) -> bool {
        self.records.iter().any(|r| r.status == status)
    }

    pub fn has_eligible(&self) -> bool {
        self.records.iter().any(|r| r.status.is_eligible())
    }

    pub fn in_flight(&self) -> Option<&FileRecord> {
        self.records.iter().find(|r| r.status.is_in_flight())
    }

    /// First record the batch controller may pick, in insertion order.
    pub fn next_eligible(&self) -> Option<&FileRecord> {
        self.records.iter().find(|r| r.status.is_eligible())
    }

    /// First `Encrypted` record, in insertion order, not rejected by `skip`.
    pub fn next_encrypted<F>(&self, mut skip: F) -> Option<&FileRecord>
    where
        F: FnMut(&FileRecord) -> bool,
    {
        self.records
            .iter()
            .find(|r| r.status == FileStatus::Encrypted && !skip(r))
    }

    /// Outputs of every `Done` record, in insertion order.
    pub fn outputs(&self) -> Vec<OutputLocation> {
        self.records
            .iter()
            .filter_map(|r| r.output.clone())
            .collect()
    }

    pub fn remove(&mut self, id: &str) -> Option<FileRecord> {
        let pos = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(pos))
    }

    /// Drops every record, releasing their content.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn mark_pending(&mut self, id: &str) -> Result<(), TransitionError> {
        self.transition(id, FileStatus::Pending).map(|_| ())
    }

    pub fn mark_encrypted(&mut self, id: &str) -> Result<(), TransitionError> {
        self.transition(id, FileStatus::Encrypted).map(|_| ())
    }

    /// Replaces the content with its decrypted form and remembers the password.
    pub fn mark_decrypted(
        &mut self,
        id: &str,
        content: Vec<u8>,
        password: SecretString,
    ) -> Result<(), TransitionError> {
        let record = self.transition(id, FileStatus::Decrypted)?;
        record.content = content.into();
        record.password = Some(password);
        Ok(())
    }

    pub fn mark_uploading(&mut self, id: &str) -> Result<(), TransitionError> {
        self.transition(id, FileStatus::Uploading).map(|_| ())
    }

    pub fn mark_processing(&mut self, id: &str) -> Result<(), TransitionError> {
        self.transition(id, FileStatus::Processing).map(|_| ())
    }

    pub fn mark_done(&mut self, id: &str, output: OutputLocation) -> Result<(), TransitionError> {
        let record = self.transition(id, FileStatus::Done)?;
        record.output = Some(output);
        Ok(())
    }

    pub fn mark_failed(
        &mut self,
        id: &str,
        error: impl Into<String>,
    ) -> Result<(), TransitionError> {
        let record = self.transition(id, FileStatus::Error)?;
        record.error = Some(error.into());
        Ok(())
    }

    fn transition(&mut self, id: &str, to: FileStatus) -> Result<&mut FileRecord, TransitionError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| TransitionError::UnknownFile(id.to_string()))?;

        if !record.status.can_transition(to) {
            return Err(TransitionError::Illegal {
                id: id.to_string(),
                from: record.status,
                to,
            });
        }

        record.status = to;
        Ok(record)
    }
}
