//! Encryption Resolver: encryption check, silent unlock with a saved
//! credential, and the one-at-a-time interactive prompt queue.

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use super::message::{Command, DecryptAttempt, SessionEvent, SubmittedFile};
use super::state::Coordinator;
use crate::sanitize::redact_filename;
use crate::service::types::{EncryptionCheck, UploadFile};
use crate::session::{FileStatus, GlobalStatus, PendingCredentialRequest};

impl Coordinator {
    pub(super) fn on_files_submitted(&mut self, files: Vec<SubmittedFile>) -> Vec<Command> {
        match self.session.global_status {
            GlobalStatus::Done => {
                return vec![Command::Emit(SessionEvent::warning(
                    "Download or reset the finished batch before adding files",
                ))];
            }
            // The batch queue is fixed at start, a late file would never run.
            _ if self.batch.is_some() => {
                return vec![Command::Emit(SessionEvent::warning(
                    "Wait for the current batch to finish before adding files",
                ))];
            }
            _ => {}
        }

        let mut commands = Vec::with_capacity(files.len());
        for file in files {
            let name = file.name;
            let file_id = self.session.registry.add(name.clone(), file.content);
            let Some(record) = self.session.registry.get(&file_id) else {
                continue;
            };
            debug!(file_id = %file_id, name = %redact_filename(&name), "File submitted");
            commands.push(Command::CheckEncryption {
                file: UploadFile::new(name, record.content()),
                file_id,
            });
        }
        commands
    }

    pub(super) fn on_check_finished(
        &mut self,
        file_id: &str,
        result: Result<EncryptionCheck, String>,
    ) -> Vec<Command> {
        let check = match result {
            Ok(check) => check,
            Err(e) => {
                debug!(file_id, "Encryption check failed: {}", e);
                let marked = self.session.registry.mark_failed(file_id, e);
                self.log_transition(marked);
                return Vec::new();
            }
        };

        if !check.encrypted {
            let marked = self.session.registry.mark_pending(file_id);
            self.log_transition(marked);
            return Vec::new();
        }

        let marked = self.session.registry.mark_encrypted(file_id);
        if !self.log_transition(marked) {
            return Vec::new();
        }

        match check.auto_password.filter(|p| !p.is_empty()) {
            Some(password) => {
                let Some(record) = self.session.registry.get(file_id) else {
                    return Vec::new();
                };
                debug!(file_id, "Trying saved credential");
                self.auto_attempts.insert(file_id.to_string());
                vec![Command::Decrypt {
                    file_id: file_id.to_string(),
                    file: UploadFile::new(record.name(), record.content()),
                    password: SecretString::from(password),
                    attempt: DecryptAttempt::Auto,
                }]
            }
            None => self.open_next_prompt(),
        }
    }

    pub(super) fn on_password_submitted(&mut self, password: SecretString) -> Vec<Command> {
        let Some(prompt) = self.prompt.as_mut() else {
            debug!("Password submitted with no prompt open");
            return Vec::new();
        };
        if self.decrypting.is_some() {
            return Vec::new();
        }

        if password.expose_secret().is_empty() {
            return vec![reject(prompt, "Enter a password".to_string())];
        }

        let file_id = prompt.file_id.clone();
        let Some(record) = self.session.registry.get(&file_id) else {
            return Vec::new();
        };
        if record.status() != FileStatus::Encrypted {
            return Vec::new();
        }

        self.decrypting = Some(file_id.clone());
        vec![Command::Decrypt {
            file: UploadFile::new(record.name(), record.content()),
            file_id,
            password,
            attempt: DecryptAttempt::Interactive,
        }]
    }

    pub(super) fn on_decrypt_finished(
        &mut self,
        file_id: &str,
        attempt: DecryptAttempt,
        password: SecretString,
        result: Result<Vec<u8>, String>,
    ) -> Vec<Command> {
        match attempt {
            DecryptAttempt::Auto => {
                self.auto_attempts.remove(file_id);
            }
            DecryptAttempt::Interactive => {
                if self.decrypting.as_deref() == Some(file_id) {
                    self.decrypting = None;
                }
            }
        }

        let content = match result {
            Ok(content) => content,
            Err(e) => return self.on_decrypt_failed(file_id, attempt, e),
        };

        let remembered = match attempt {
            DecryptAttempt::Interactive if self.settings.general_settings.remember_passwords => {
                Some(password.expose_secret().to_string())
            }
            _ => None,
        };

        let marked = self.session.registry.mark_decrypted(file_id, content, password);
        if !self.log_transition(marked) {
            return Vec::new();
        }

        let mut commands = Vec::new();
        match attempt {
            DecryptAttempt::Auto => {
                // Silent unlock is indistinguishable from an unencrypted file.
                let marked = self.session.registry.mark_pending(file_id);
                self.log_transition(marked);
                info!(file_id, "Unlocked with saved credential");
            }
            DecryptAttempt::Interactive => {
                info!(file_id, "Unlocked with entered password");
                if let Some(password) = remembered {
                    if self.settings.remember_password(&password) {
                        commands.push(Command::SaveSettings(self.settings.clone()));
                    }
                }
            }
        }

        if self.prompt.as_ref().is_some_and(|p| p.file_id == file_id) {
            self.prompt = None;
            commands.push(Command::Emit(SessionEvent::PromptClosed {
                file_id: file_id.to_string(),
            }));
        }
        commands.extend(self.open_next_prompt());
        commands
    }

    fn on_decrypt_failed(
        &mut self,
        file_id: &str,
        attempt: DecryptAttempt,
        error: String,
    ) -> Vec<Command> {
        if self.session.registry.get(file_id).is_none() {
            return Vec::new();
        }

        match attempt {
            DecryptAttempt::Auto => {
                // Saved credential no longer works; fall back to asking.
                debug!(file_id, "Saved credential rejected: {}", error);
                self.open_next_prompt()
            }
            DecryptAttempt::Interactive => {
                let Some(prompt) = self.prompt.as_mut().filter(|p| p.file_id == file_id) else {
                    return Vec::new();
                };
                vec![reject(prompt, error)]
            }
        }
    }

    pub(super) fn on_prompt_dismissed(&mut self) -> Vec<Command> {
        let Some(prompt) = self.prompt.take() else {
            return Vec::new();
        };
        if self.decrypting.as_deref() == Some(prompt.file_id.as_str()) {
            self.decrypting = None;
        }

        // An encrypted record would block every batch, so it goes.
        self.session.registry.remove(&prompt.file_id);
        debug!(file_id = %prompt.file_id, "Prompt dismissed, file removed");

        let mut commands = vec![Command::Emit(SessionEvent::PromptClosed {
            file_id: prompt.file_id,
        })];
        commands.extend(self.open_next_prompt());
        commands
    }

    /// Opens a prompt for the first unresolved encrypted record, in registry
    /// order, unless one is already open.
    pub(super) fn open_next_prompt(&mut self) -> Vec<Command> {
        if self.prompt.is_some() {
            return Vec::new();
        }

        let auto_attempts = &self.auto_attempts;
        let Some(record) = self
            .session
            .registry
            .next_encrypted(|r| auto_attempts.contains(r.id()))
        else {
            return Vec::new();
        };

        let request = PendingCredentialRequest::new(record.id());
        self.prompt = Some(request.clone());
        self.prompt_event(request).into_iter().collect()
    }

    fn prompt_event(&self, request: PendingCredentialRequest) -> Option<Command> {
        let file_name = self.session.registry.get(&request.file_id)?.name().to_string();
        Some(Command::Emit(SessionEvent::PromptOpened { request, file_name }))
    }
}

fn reject(prompt: &mut PendingCredentialRequest, error: String) -> Command {
    prompt.last_error = Some(error.clone());
    Command::Emit(SessionEvent::PasswordRejected {
        file_id: prompt.file_id.clone(),
        error,
    })
}
