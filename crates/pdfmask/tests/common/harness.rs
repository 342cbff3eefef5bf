//! Test harness for driving a full session without a network.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{broadcast, Notify};

use pdfmask::config::{AppSettings, CoordinatorConfig};
use pdfmask::coordinator::{Message, SessionSnapshot, SubmittedFile};
use pdfmask::driver::{OutputSink, SessionDriver, SessionHandle, SessionNotification};
use pdfmask::error::{OutputError, ServiceError};
use pdfmask::service::types::{
    EmailRequest, EncryptionCheck, ProcessRequest, UploadFile, UploadNotifier,
};
use pdfmask::service::ProcessingService;
use pdfmask::session::{OutputLocation, Session};
use pdfmask::MemoryConnector;

use super::builders::fast_config;

/// One observed call against the scripted service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Health,
    Check(String),
    Decrypt { file: String, password: String },
    Process { file: String, words: String, session_id: String, batch_id: String },
    Cancel(String),
    Download(String),
    Archive(Vec<String>),
    ReadConfig,
    WriteConfig { passwords: Vec<String> },
    Reveal(String),
    Email { recipient: String, attachment: String },
}

/// Per-file behavior, keyed by file name.
#[derive(Debug, Default, Clone)]
pub struct Script {
    pub settings: AppSettings,
    pub check_failures: HashMap<String, String>,
    /// Correct password per encrypted file.
    pub passwords: HashMap<String, String>,
    /// Saved credential the check reports per encrypted file.
    pub auto_passwords: HashMap<String, String>,
    pub process_failures: HashMap<String, String>,
    /// Files whose processing waits for `ScriptedService::release`.
    pub held: HashSet<String>,
    /// Whether cancel pushes the acknowledgement marker on the channel.
    pub ack_cancel: bool,
    pub save_directory: Option<String>,
    pub reveal_failure: Option<String>,
}

pub struct ScriptedService {
    script: Script,
    channel: MemoryConnector,
    calls: Mutex<Vec<Call>>,
    release: Notify,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedService {
    pub fn new(script: Script, channel: MemoryConnector) -> Self {
        Self {
            script,
            channel,
            calls: Mutex::new(Vec::new()),
            release: Notify::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Names of processed files, in the order the requests were issued.
    pub fn processed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Process { file, .. } => Some(file),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| matches(c)).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Lets one held process request finish.
    pub fn release(&self) {
        self.release.notify_one();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_result(&self, name: &str) -> Result<EncryptionCheck, ServiceError> {
        if let Some(error) = self.script.check_failures.get(name) {
            return Err(ServiceError::Reported(error.clone()));
        }
        Ok(EncryptionCheck {
            encrypted: self.script.passwords.contains_key(name),
            auto_password: self.script.auto_passwords.get(name).cloned(),
        })
    }
}

#[async_trait]
impl ProcessingService for ScriptedService {
    async fn health(&self) -> Result<(), ServiceError> {
        self.record(Call::Health);
        Ok(())
    }

    async fn check_encryption(&self, file: &UploadFile) -> Result<EncryptionCheck, ServiceError> {
        self.record(Call::Check(file.name.clone()));
        self.check_result(&file.name)
    }

    async fn decrypt(
        &self,
        file: &UploadFile,
        password: &SecretString,
    ) -> Result<Vec<u8>, ServiceError> {
        self.record(Call::Decrypt {
            file: file.name.clone(),
            password: password.expose_secret().to_string(),
        });
        match self.script.passwords.get(&file.name) {
            Some(expected) if expected == password.expose_secret() => {
                let mut content = b"decrypted:".to_vec();
                content.extend_from_slice(&file.content);
                Ok(content)
            }
            _ => Err(ServiceError::Reported("Incorrect password".to_string())),
        }
    }

    async fn process(
        &self,
        request: ProcessRequest,
        uploaded: UploadNotifier,
    ) -> Result<OutputLocation, ServiceError> {
        let name = request.file.name.clone();
        self.record(Call::Process {
            file: name.clone(),
            words: request.joined_words(),
            session_id: request.session_id.clone(),
            batch_id: request.batch_id.clone(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        uploaded.notify();
        self.channel.push_progress(50, &format!("Redacting {}", name));

        if self.script.held.contains(&name) {
            self.release.notified().await;
        }
        self.channel.push_progress(100, "Done");
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.script.process_failures.get(&name) {
            return Err(ServiceError::Reported(error.clone()));
        }
        Ok(OutputLocation {
            output_directory: format!("/tmp/{}", request.batch_id),
            output_filename: format!("redacted_{}", name),
            save_directory: self.script.save_directory.clone(),
        })
    }

    async fn cancel(&self, session_id: &str) -> Result<(), ServiceError> {
        self.record(Call::Cancel(session_id.to_string()));
        if self.script.ack_cancel {
            self.channel.push_cancelled();
        }
        Ok(())
    }

    async fn download(&self, location: &OutputLocation) -> Result<Vec<u8>, ServiceError> {
        self.record(Call::Download(location.output_filename.clone()));
        Ok(format!("%PDF {}", location.output_filename).into_bytes())
    }

    async fn archive(&self, files: &[OutputLocation]) -> Result<Vec<u8>, ServiceError> {
        self.record(Call::Archive(
            files.iter().map(|f| f.output_filename.clone()).collect(),
        ));
        Ok(b"PK\x03\x04".to_vec())
    }

    async fn read_config(&self) -> Result<AppSettings, ServiceError> {
        self.record(Call::ReadConfig);
        Ok(self.script.settings.clone())
    }

    async fn write_config(&self, settings: &AppSettings) -> Result<(), ServiceError> {
        self.record(Call::WriteConfig {
            passwords: settings.passwords.clone(),
        });
        Ok(())
    }

    async fn reveal_folder(&self, path: &str) -> Result<(), ServiceError> {
        self.record(Call::Reveal(path.to_string()));
        match &self.script.reveal_failure {
            Some(error) => Err(ServiceError::Reported(error.clone())),
            None => Ok(()),
        }
    }

    async fn send_email(&self, email: &EmailRequest) -> Result<(), ServiceError> {
        self.record(Call::Email {
            recipient: email.recipient.clone(),
            attachment: email.attachment_path.clone(),
        });
        Ok(())
    }
}

/// Output sink that keeps saved artifacts in memory.
#[derive(Default)]
pub struct MemorySink {
    saved: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn saved(&self) -> Vec<(String, Vec<u8>)> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn save(&self, file_name: &str, content: Vec<u8>) -> Result<PathBuf, OutputError> {
        self.saved
            .lock()
            .unwrap()
            .push((file_name.to_string(), content));
        Ok(PathBuf::from("/memory").join(file_name))
    }
}

/// A running session wired to in-memory collaborators.
pub struct TestSession {
    pub handle: SessionHandle,
    pub service: Arc<ScriptedService>,
    pub channel: MemoryConnector,
    pub sink: Arc<MemorySink>,
    pub events: broadcast::Receiver<SessionNotification>,
}

impl TestSession {
    pub async fn start(script: Script) -> Self {
        Self::start_with_config(script, fast_config()).await
    }

    pub async fn start_with_config(script: Script, config: CoordinatorConfig) -> Self {
        let channel = MemoryConnector::new();
        let service = Arc::new(ScriptedService::new(script, channel.clone()));
        let sink = Arc::new(MemorySink::default());

        let handle = SessionDriver::spawn(
            Session::with_id("test-session"),
            &config,
            service.clone(),
            Arc::new(channel.clone()),
            sink.clone(),
        );
        let events = handle.subscribe();

        let session = Self {
            handle,
            service,
            channel,
            sink,
            events,
        };
        session.wait_until_ready().await;
        session
    }

    /// Waits for the progress channel and the settings read.
    async fn wait_until_ready(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.channel.connections() == 0
                || self.service.count(|c| *c == Call::ReadConfig) == 0
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            // Let the settings message reach the loop.
            tokio::time::sleep(Duration::from_millis(20)).await;
        })
        .await
        .expect("session did not become ready");
    }

    pub fn send(&self, message: Message) {
        self.handle.send(message).expect("driver stopped");
    }

    /// Submits files and returns their ids once all of them are registered.
    pub async fn submit(&self, names: &[&str]) -> Vec<String> {
        let before = self.handle.snapshot().files.len();
        let files = names
            .iter()
            .map(|name| SubmittedFile::new(*name, format!("%PDF {}", name).into_bytes()))
            .collect();
        self.send(Message::FilesSubmitted(files));

        let snapshot = self
            .wait_for(|s| s.files.len() >= before + names.len())
            .await;
        snapshot.files[before..]
            .iter()
            .map(|f| f.id.clone())
            .collect()
    }

    pub async fn wait_for<F>(&self, predicate: F) -> SessionSnapshot
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), self.handle.wait_for(predicate))
            .await
            .expect("timed out waiting for session state")
            .expect("driver stopped")
    }

    /// Waits for a published event matching `predicate`.
    pub async fn expect_event<F>(&mut self, mut predicate: F) -> SessionNotification
    where
        F: FnMut(&SessionNotification) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match self.events.recv().await {
                    Ok(notification) if predicate(&notification) => return notification,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }
}
