//! Builders for scripting the in-memory processing service.

#![allow(dead_code)]

use pdfmask::config::CoordinatorConfig;

use super::harness::Script;

/// Coordinator settings with timings short enough for tests.
pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        reconnect_backoff_ms: 20,
        cancel_ack_timeout_ms: 300,
        reset_delay_ms: 50,
        ..CoordinatorConfig::default()
    }
}

/// Builder for creating `Script` instances.
pub struct ScriptBuilder {
    script: Script,
}

impl ScriptBuilder {
    /// Plain files, no saved terms, cancel acknowledged on the channel.
    pub fn new() -> Self {
        let mut script = Script::default();
        script.ack_cancel = true;
        Self { script }
    }

    /// Default redaction terms held by the configuration store.
    pub fn words(mut self, words: &[&str]) -> Self {
        self.script.settings.words = words.iter().map(|w| w.to_string()).collect();
        self
    }

    /// Marks a file as encrypted with the given password.
    pub fn encrypted(mut self, file: &str, password: &str) -> Self {
        self.script
            .passwords
            .insert(file.to_string(), password.to_string());
        self
    }

    /// Reports a saved credential for a file marked with `encrypted`.
    pub fn saved_password(mut self, file: &str, password: &str) -> Self {
        self.script
            .auto_passwords
            .insert(file.to_string(), password.to_string());
        self
    }

    pub fn check_fails(mut self, file: &str, error: &str) -> Self {
        self.script
            .check_failures
            .insert(file.to_string(), error.to_string());
        self
    }

    pub fn process_fails(mut self, file: &str, error: &str) -> Self {
        self.script
            .process_failures
            .insert(file.to_string(), error.to_string());
        self
    }

    /// Processing of `file` blocks until released by the test.
    pub fn hold(mut self, file: &str) -> Self {
        self.script.held.insert(file.to_string());
        self
    }

    pub fn without_cancel_ack(mut self) -> Self {
        self.script.ack_cancel = false;
        self
    }

    pub fn remember_passwords(mut self) -> Self {
        self.script.settings.general_settings.remember_passwords = true;
        self
    }

    pub fn default_recipient(mut self, recipient: &str) -> Self {
        self.script.settings.email_settings.default_recipient = recipient.to_string();
        self
    }

    pub fn save_directory(mut self, directory: &str) -> Self {
        self.script.save_directory = Some(directory.to_string());
        self
    }

    pub fn reveal_fails(mut self, error: &str) -> Self {
        self.script.reveal_failure = Some(error.to_string());
        self
    }

    pub fn build(self) -> Script {
        self.script
    }
}

impl Default for ScriptBuilder {
    fn default() -> Self {
        Self::new()
    }
}
