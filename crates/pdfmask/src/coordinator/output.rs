//! Output Assembler: single download, archive, folder reveal and email,
//! followed by a delayed reset of the session.

use std::path::Path;

use tracing::{info, warn};

use super::message::{Command, DeliveryKind, SessionEvent};
use super::state::Coordinator;
use crate::service::types::EmailRequest;
use crate::session::FileStatus;

impl Coordinator {
    /// Whether the finished batch has artifacts that can be delivered.
    pub fn can_deliver(&self) -> bool {
        self.batch.is_none()
            && !self.delivering
            && self.session.registry.in_flight().is_none()
            && self.session.registry.any(FileStatus::Done)
    }

    pub(super) fn on_download_requested(&mut self) -> Vec<Command> {
        if !self.can_deliver() {
            return Vec::new();
        }

        let mut outputs = self.session.registry.outputs();
        self.delivering = true;
        if outputs.len() == 1 {
            let output = outputs.remove(0);
            info!(file = %output.output_filename, "Downloading redacted file");
            vec![Command::Download { output }]
        } else {
            info!(files = outputs.len(), "Requesting archive");
            vec![Command::Archive {
                outputs,
                file_name: self.archive_name.clone(),
            }]
        }
    }

    pub(super) fn on_reveal_requested(&mut self) -> Vec<Command> {
        if !self.can_deliver() {
            return Vec::new();
        }
        let Some(path) = self.save_location.clone() else {
            return vec![Command::Emit(SessionEvent::warning(
                "No save location recorded for this batch",
            ))];
        };
        self.delivering = true;
        vec![Command::Reveal { path }]
    }

    pub(super) fn on_email_requested(
        &mut self,
        recipient: Option<String>,
        subject: String,
        body: String,
        attachment_path: Option<String>,
    ) -> Vec<Command> {
        if !self.can_deliver() {
            return Vec::new();
        }

        let recipient = recipient
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.settings.email_settings.default_recipient.clone());
        if recipient.is_empty() {
            return vec![Command::Emit(SessionEvent::warning(
                "No recipient given and no default recipient configured",
            ))];
        }

        // The service attaches every file when given a directory.
        let attachment_path = match attachment_path.or_else(|| self.save_location.clone()) {
            Some(path) => path,
            None => match self.session.registry.outputs().as_slice() {
                [only] => Path::new(&only.output_directory)
                    .join(&only.output_filename)
                    .to_string_lossy()
                    .into_owned(),
                _ => {
                    return vec![Command::Emit(SessionEvent::warning(
                        "No save location recorded for this batch",
                    ))]
                }
            },
        };

        self.delivering = true;
        vec![Command::SendEmail(EmailRequest {
            recipient,
            subject,
            body,
            attachment_path,
        })]
    }

    pub(super) fn on_delivery_finished(
        &mut self,
        kind: DeliveryKind,
        result: Result<Option<String>, String>,
    ) -> Vec<Command> {
        self.delivering = false;

        match result {
            Ok(location) => {
                info!(%kind, location = ?location, "Output delivered");
                self.reset_generation += 1;
                vec![
                    Command::Emit(SessionEvent::OutputDelivered { kind, location }),
                    Command::ScheduleReset {
                        generation: self.reset_generation,
                        after: self.reset_delay,
                    },
                ]
            }
            Err(e) => {
                warn!(%kind, "Delivery failed: {}", e);
                vec![Command::Emit(SessionEvent::error(format!(
                    "{} failed: {}",
                    kind, e
                )))]
            }
        }
    }
}
