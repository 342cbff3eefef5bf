use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, info_span, warn, Instrument};

use super::handle::SessionNotification;
use super::sink::OutputSink;
use crate::coordinator::{Command, DeliveryKind, Message, SessionEvent};
use crate::service::types::{ProcessRequest, UploadNotifier};
use crate::service::ProcessingService;
use crate::session::{FileId, OutputLocation};

/// Runs [`Command`]s on tokio tasks and reports results back as [`Message`]s.
pub(super) struct Executor {
    service: Arc<dyn ProcessingService>,
    sink: Arc<dyn OutputSink>,
    messages: mpsc::UnboundedSender<Message>,
    events: Arc<broadcast::Sender<SessionNotification>>,
}

impl Executor {
    pub(super) fn new(
        service: Arc<dyn ProcessingService>,
        sink: Arc<dyn OutputSink>,
        messages: mpsc::UnboundedSender<Message>,
        events: Arc<broadcast::Sender<SessionNotification>>,
    ) -> Self {
        Self {
            service,
            sink,
            messages,
            events,
        }
    }

    /// Loads the remote settings and checks service health once at startup.
    pub(super) fn bootstrap(&self) {
        let service = Arc::clone(&self.service);
        let messages = self.messages.clone();
        tokio::spawn(async move {
            match service.health().await {
                Ok(()) => info!("Processing service is up"),
                Err(e) => warn!("Processing service health check failed: {}", e),
            }
            match service.read_config().await {
                Ok(settings) => {
                    let _ = messages.send(Message::SettingsLoaded(settings));
                }
                Err(e) => warn!("Failed to load settings, starting without defaults: {}", e),
            }
        });
    }

    pub(super) fn execute(&self, command: Command) {
        match command {
            Command::Emit(event) => self.emit(event),
            Command::CheckEncryption { file_id, file } => {
                let service = Arc::clone(&self.service);
                self.spawn(async move {
                    let result = service
                        .check_encryption(&file)
                        .await
                        .map_err(|e| e.to_string());
                    Some(Message::CheckFinished { file_id, result })
                });
            }
            Command::Decrypt {
                file_id,
                file,
                password,
                attempt,
            } => {
                let service = Arc::clone(&self.service);
                self.spawn(async move {
                    let result = service
                        .decrypt(&file, &password)
                        .await
                        .map_err(|e| e.to_string());
                    Some(Message::DecryptFinished {
                        file_id,
                        attempt,
                        password,
                        result,
                    })
                });
            }
            Command::Process { file_id, request } => self.process(file_id, request),
            Command::Cancel { session_id } => {
                let service = Arc::clone(&self.service);
                self.spawn(async move {
                    // Best effort; the acknowledgement arrives on the channel.
                    if let Err(e) = service.cancel(&session_id).await {
                        warn!("Cancel request failed: {}", e);
                    }
                    None
                });
            }
            Command::StartCancelTimer { generation, after } => {
                self.after(after, Message::CancelTimeout { generation });
            }
            Command::ScheduleReset { generation, after } => {
                self.after(after, Message::ResetElapsed { generation });
            }
            Command::Download { output } => self.download(output),
            Command::Archive { outputs, file_name } => self.archive(outputs, file_name),
            Command::Reveal { path } => {
                let service = Arc::clone(&self.service);
                self.spawn(async move {
                    let outcome = service.reveal_folder(&path).await;
                    let result = outcome.map(|()| Some(path)).map_err(|e| e.to_string());
                    Some(Message::DeliveryFinished {
                        kind: DeliveryKind::Reveal,
                        result,
                    })
                });
            }
            Command::SendEmail(request) => {
                let service = Arc::clone(&self.service);
                self.spawn(async move {
                    let result = service
                        .send_email(&request)
                        .await
                        .map(|()| Some(request.recipient.clone()))
                        .map_err(|e| e.to_string());
                    Some(Message::DeliveryFinished {
                        kind: DeliveryKind::Email,
                        result,
                    })
                });
            }
            Command::SaveSettings(settings) => {
                let service = Arc::clone(&self.service);
                self.spawn(async move {
                    match service.write_config(&settings).await {
                        Ok(()) => debug!("Settings saved"),
                        Err(e) => warn!("Failed to save settings: {}", e),
                    }
                    None
                });
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(SessionNotification {
            timestamp: Utc::now(),
            event,
        });
    }

    /// Runs `task` and feeds its message, if any, back into the loop.
    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = Option<Message>> + Send + 'static,
    {
        let messages = self.messages.clone();
        tokio::spawn(async move {
            if let Some(message) = task.await {
                // The loop is gone when the session shut down.
                let _ = messages.send(message);
            }
        });
    }

    fn after(&self, delay: Duration, message: Message) {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            Some(message)
        });
    }

    fn process(&self, file_id: FileId, request: ProcessRequest) {
        let service = Arc::clone(&self.service);
        let messages = self.messages.clone();
        let span = info_span!("process_file", file_id = %file_id, batch_id = %request.batch_id);

        self.spawn(
            async move {
                let (notifier, uploaded) = UploadNotifier::channel();
                let mut process = service.process(request, notifier);

                let result = tokio::select! {
                    biased;
                    signal = uploaded => {
                        if signal.is_ok() {
                            debug!("Upload complete");
                            let _ = messages.send(Message::UploadFinished {
                                file_id: file_id.clone(),
                            });
                        }
                        process.await
                    }
                    result = &mut process => result,
                };

                match &result {
                    Ok(_) => info!("File processed"),
                    Err(e) => warn!("File failed: {}", e),
                }
                Some(Message::ProcessFinished {
                    file_id,
                    result: result.map_err(|e| e.to_string()),
                })
            }
            .instrument(span),
        );
    }

    fn download(&self, output: OutputLocation) {
        let service = Arc::clone(&self.service);
        let sink = Arc::clone(&self.sink);
        self.spawn(async move {
            let result = match service.download(&output).await {
                Ok(content) => sink
                    .save(&output.output_filename, content)
                    .await
                    .map(|path| Some(path.display().to_string()))
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            Some(Message::DeliveryFinished {
                kind: DeliveryKind::Download,
                result,
            })
        });
    }

    fn archive(&self, outputs: Vec<OutputLocation>, file_name: String) {
        let service = Arc::clone(&self.service);
        let sink = Arc::clone(&self.sink);
        self.spawn(async move {
            let result = match service.archive(&outputs).await {
                Ok(content) => sink
                    .save(&file_name, content)
                    .await
                    .map(|path| Some(path.display().to_string()))
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            Some(Message::DeliveryFinished {
                kind: DeliveryKind::Archive,
                result,
            })
        });
    }
}
