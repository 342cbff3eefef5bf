use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::message::{Command, Message, SessionEvent};
use super::snapshot::{BatchCounts, FileSummary, ProgressDisplay, SessionSnapshot};
use crate::config::{AppSettings, CoordinatorConfig};
use crate::error::TransitionError;
use crate::session::{FileId, FileStatus, GlobalStatus, PendingCredentialRequest, Session};

/// Bookkeeping for one processing run.
#[derive(Debug)]
pub(super) struct BatchRun {
    pub(super) batch_id: String,
    /// Records still to be issued, in registry order.
    pub(super) queue: VecDeque<FileId>,
    pub(super) words: Vec<String>,
    pub(super) current: Option<FileId>,
    pub(super) counts: BatchCounts,
}

/// Reducer owning one [`Session`].
///
/// `update` applies a [`Message`] and returns the [`Command`]s the driver
/// must execute. It never blocks and never performs I/O, so the whole state
/// machine can be exercised without a runtime.
#[derive(Debug)]
pub struct Coordinator {
    pub(super) session: Session,
    pub(super) words: Vec<String>,
    pub(super) default_words: Vec<String>,
    pub(super) settings: AppSettings,

    pub(super) prompt: Option<PendingCredentialRequest>,
    /// Records with a saved-credential decrypt in flight; never prompted for.
    pub(super) auto_attempts: HashSet<FileId>,
    /// Record with an interactive decrypt in flight.
    pub(super) decrypting: Option<FileId>,

    pub(super) batch: Option<BatchRun>,
    pub(super) cancel_requested: bool,
    pub(super) cancel_generation: u64,
    pub(super) progress: Option<ProgressDisplay>,
    pub(super) summary: Option<String>,

    pub(super) save_location: Option<String>,
    pub(super) delivering: bool,
    pub(super) reset_generation: u64,

    pub(super) archive_name: String,
    pub(super) cancel_ack_timeout: Duration,
    pub(super) reset_delay: Duration,
}

impl Coordinator {
    pub fn new(session: Session, config: &CoordinatorConfig) -> Self {
        Self {
            session,
            words: Vec::new(),
            default_words: Vec::new(),
            settings: AppSettings::default(),
            prompt: None,
            auto_attempts: HashSet::new(),
            decrypting: None,
            batch: None,
            cancel_requested: false,
            cancel_generation: 0,
            progress: None,
            summary: None,
            save_location: None,
            delivering: false,
            reset_generation: 0,
            archive_name: config.archive_name.clone(),
            cancel_ack_timeout: config.cancel_ack_timeout(),
            reset_delay: config.reset_delay(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn prompt(&self) -> Option<&PendingCredentialRequest> {
        self.prompt.as_ref()
    }

    pub fn global_status(&self) -> GlobalStatus {
        self.session.global_status
    }

    pub fn update(&mut self, message: Message) -> Vec<Command> {
        match message {
            Message::SettingsLoaded(settings) => self.on_settings_loaded(settings),
            Message::FilesSubmitted(files) => self.on_files_submitted(files),
            Message::CheckFinished { file_id, result } => self.on_check_finished(&file_id, result),
            Message::DecryptFinished {
                file_id,
                attempt,
                password,
                result,
            } => self.on_decrypt_finished(&file_id, attempt, password, result),
            Message::PasswordSubmitted(password) => self.on_password_submitted(password),
            Message::PromptDismissed => self.on_prompt_dismissed(),
            Message::RemoveFile(file_id) => self.on_remove_file(&file_id),
            Message::SetWords(words) => {
                self.words = normalize_words(words);
                Vec::new()
            }
            Message::AddWord(word) => {
                self.add_word(&word);
                Vec::new()
            }
            Message::RemoveWord(word) => {
                let word = word.trim().to_lowercase();
                self.words.retain(|w| w.to_lowercase() != word);
                Vec::new()
            }
            Message::StartBatch => self.on_start_batch(),
            Message::UploadFinished { file_id } => self.on_upload_finished(&file_id),
            Message::ProcessFinished { file_id, result } => {
                self.on_process_finished(&file_id, result)
            }
            Message::CancelRequested => self.on_cancel_requested(),
            Message::CancelTimeout { generation } => self.on_cancel_timeout(generation),
            Message::Channel(event) => self.on_channel_event(event),
            Message::DownloadRequested => self.on_download_requested(),
            Message::RevealRequested => self.on_reveal_requested(),
            Message::EmailRequested {
                recipient,
                subject,
                body,
                attachment_path,
            } => self.on_email_requested(recipient, subject, body, attachment_path),
            Message::DeliveryFinished { kind, result } => self.on_delivery_finished(kind, result),
            Message::Reset => self.on_reset(),
            Message::ResetElapsed { generation } => {
                if generation != self.reset_generation {
                    debug!(generation, "Ignoring superseded reset timer");
                    return Vec::new();
                }
                self.on_reset()
            }
        }
    }

    /// Whether a batch may be launched right now.
    ///
    /// Requires an eligible record, at least one term, nothing encrypted or
    /// still being checked, an idle session and no request in flight.
    pub fn can_start(&self) -> bool {
        let registry = &self.session.registry;
        !registry.is_empty()
            && registry.has_eligible()
            && !self.words.is_empty()
            && !registry.any(FileStatus::Encrypted)
            && !registry.any(FileStatus::Checking)
            && registry.in_flight().is_none()
            && self.session.global_status == GlobalStatus::Idle
            && self.batch.is_none()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session.session_id.clone(),
            global_status: self.session.global_status,
            batch_id: self.session.batch_id.clone(),
            words: self.words.clone(),
            files: self.session.registry.iter().map(FileSummary::from).collect(),
            prompt: self.prompt.clone(),
            progress: self.progress.clone(),
            batch: self.batch.as_ref().map(|b| b.counts),
            summary: self.summary.clone(),
            can_start: self.can_start(),
            can_deliver: self.can_deliver(),
            save_location: self.save_location.clone(),
        }
    }

    fn on_settings_loaded(&mut self, settings: AppSettings) -> Vec<Command> {
        self.default_words = normalize_words(settings.words.clone());
        if self.words.is_empty() {
            self.words = self.default_words.clone();
        }
        info!(
            terms = self.default_words.len(),
            saved_passwords = settings.passwords.len(),
            "Settings loaded"
        );
        self.settings = settings;
        Vec::new()
    }

    fn add_word(&mut self, word: &str) {
        let word = word.trim();
        if word.is_empty() {
            return;
        }
        let lowered = word.to_lowercase();
        if self.words.iter().any(|w| w.to_lowercase() == lowered) {
            return;
        }
        self.words.push(word.to_string());
    }

    fn on_remove_file(&mut self, file_id: &str) -> Vec<Command> {
        let Some(record) = self.session.registry.get(file_id) else {
            return Vec::new();
        };
        if record.status().is_in_flight() {
            return vec![Command::Emit(SessionEvent::warning(
                "A file cannot be removed while it is being processed",
            ))];
        }

        self.session.registry.remove(file_id);
        self.auto_attempts.remove(file_id);
        if self.decrypting.as_deref() == Some(file_id) {
            self.decrypting = None;
        }

        let mut commands = Vec::new();
        if self.prompt.as_ref().is_some_and(|p| p.file_id == file_id) {
            self.prompt = None;
            commands.push(Command::Emit(SessionEvent::PromptClosed {
                file_id: file_id.to_string(),
            }));
            commands.extend(self.open_next_prompt());
        }
        commands
    }

    fn on_reset(&mut self) -> Vec<Command> {
        if self.session.registry.in_flight().is_some() {
            return vec![Command::Emit(SessionEvent::warning(
                "Cannot reset while a file is being processed",
            ))];
        }

        info!(files = self.session.registry.len(), "Resetting session");

        let mut commands = Vec::new();
        if let Some(prompt) = self.prompt.take() {
            commands.push(Command::Emit(SessionEvent::PromptClosed {
                file_id: prompt.file_id,
            }));
        }

        self.session.registry.clear();
        self.session.global_status = GlobalStatus::Idle;
        self.session.batch_id = None;
        self.words = self.default_words.clone();
        self.auto_attempts.clear();
        self.decrypting = None;
        self.batch = None;
        self.cancel_requested = false;
        self.cancel_generation += 1;
        self.progress = None;
        self.summary = None;
        self.save_location = None;
        self.delivering = false;
        self.reset_generation += 1;

        commands.push(Command::Emit(SessionEvent::SessionReset));
        commands
    }

    /// Logs a rejected transition. Results for records that moved on or were
    /// removed are expected and harmless.
    pub(super) fn log_transition(&self, result: Result<(), TransitionError>) -> bool {
        match result {
            Ok(()) => true,
            Err(TransitionError::UnknownFile(id)) => {
                debug!(file_id = %id, "Result for a removed file ignored");
                false
            }
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }
}

/// Trims terms, drops blanks and case-insensitive duplicates; keeps order.
pub fn normalize_words(words: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    words
        .into_iter()
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty() && seen.insert(w.to_lowercase()))
        .collect()
}
