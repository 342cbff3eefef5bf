//! Batch Controller: strictly sequential processing of the eligible records,
//! cooperative cancellation and the channel-driven progress display.

use std::collections::VecDeque;

use tracing::{debug, info, info_span, warn};

use super::message::{Command, SessionEvent};
use super::snapshot::{BatchCounts, ProgressDisplay};
use super::state::{BatchRun, Coordinator};
use crate::channel::ProgressEvent;
use crate::sanitize::{describe_terms, redact_filename};
use crate::service::types::{ProcessRequest, UploadFile};
use crate::session::{FileStatus, GlobalStatus, OutputLocation};

impl Coordinator {
    pub(super) fn on_start_batch(&mut self) -> Vec<Command> {
        if !self.can_start() {
            debug!(status = %self.session.global_status, "Start ignored, preconditions not met");
            return Vec::new();
        }

        let batch_id = uuid::Uuid::new_v4().simple().to_string();
        let queue: VecDeque<_> = self
            .session
            .registry
            .iter()
            .filter(|r| r.status().is_eligible())
            .map(|r| r.id().to_string())
            .collect();
        let total = queue.len();

        let _span = info_span!("batch", batch_id = %batch_id).entered();
        info!(files = total, terms = %describe_terms(&self.words), "Starting batch");

        self.session.batch_id = Some(batch_id.clone());
        self.session.global_status = GlobalStatus::Processing;
        self.cancel_requested = false;
        self.summary = None;
        // A reset scheduled by an earlier delivery must not clear this run.
        self.reset_generation += 1;
        self.batch = Some(BatchRun {
            batch_id: batch_id.clone(),
            queue,
            words: self.words.clone(),
            current: None,
            counts: BatchCounts {
                total,
                ..BatchCounts::default()
            },
        });

        let mut commands = vec![Command::Emit(SessionEvent::BatchStarted { batch_id, total })];
        commands.extend(self.advance_batch());
        commands
    }

    /// Issues the next queued record, or finishes the batch.
    fn advance_batch(&mut self) -> Vec<Command> {
        if self.cancel_requested {
            return self.finish_batch();
        }

        let session_id = self.session.session_id.clone();
        let Some(batch) = self.batch.as_mut() else {
            return Vec::new();
        };

        while let Some(file_id) = batch.queue.pop_front() {
            let Some(record) = self.session.registry.get(&file_id) else {
                continue;
            };
            // Records that failed or were removed since the batch started are skipped.
            if !record.status().is_eligible() {
                continue;
            }

            let request = ProcessRequest {
                file: UploadFile::new(record.name(), record.content()),
                words: batch.words.clone(),
                session_id,
                batch_id: batch.batch_id.clone(),
            };
            debug!(
                batch_id = %batch.batch_id,
                file_id = %file_id,
                name = %redact_filename(record.name()),
                "Issuing process request"
            );

            if let Err(e) = self.session.registry.mark_uploading(&file_id) {
                warn!("{}", e);
                return Vec::new();
            }
            batch.current = Some(file_id.clone());
            self.progress = Some(ProgressDisplay {
                file_id: file_id.clone(),
                percentage: 0,
                message: "Uploading".to_string(),
            });
            return vec![Command::Process { file_id, request }];
        }

        self.finish_batch()
    }

    fn finish_batch(&mut self) -> Vec<Command> {
        let Some(batch) = self.batch.take() else {
            return Vec::new();
        };

        let cancelled = self.cancel_requested;
        self.cancel_requested = false;
        self.progress = None;

        // A pending cancel keeps the session in `Cancelling` until it is
        // acknowledged or times out.
        if self.session.global_status == GlobalStatus::Processing {
            self.session.global_status = GlobalStatus::Done;
        }

        let summary = batch.counts.summary(cancelled);
        info!(batch_id = %batch.batch_id, "{}", summary);
        self.summary = Some(summary.clone());

        vec![Command::Emit(SessionEvent::BatchFinished { summary })]
    }

    pub(super) fn on_upload_finished(&mut self, file_id: &str) -> Vec<Command> {
        let in_flight = self
            .session
            .registry
            .get(file_id)
            .is_some_and(|r| r.status() == FileStatus::Uploading);
        if in_flight {
            let marked = self.session.registry.mark_processing(file_id);
            self.log_transition(marked);
        }
        Vec::new()
    }

    pub(super) fn on_process_finished(
        &mut self,
        file_id: &str,
        result: Result<OutputLocation, String>,
    ) -> Vec<Command> {
        let Some(batch) = self.batch.as_mut() else {
            warn!(file_id, "Process result with no batch running");
            return Vec::new();
        };
        if batch.current.as_deref() != Some(file_id) {
            warn!(file_id, "Process result for a file that is not in flight");
            return Vec::new();
        }
        batch.current = None;

        // The result decides the outcome, even after a cancel was requested.
        let status = match result {
            Ok(output) => {
                let location = output
                    .save_directory
                    .clone()
                    .unwrap_or_else(|| output.output_directory.clone());
                match self.session.registry.mark_done(file_id, output) {
                    Ok(()) => {
                        batch.counts.done += 1;
                        self.save_location = Some(location);
                        FileStatus::Done
                    }
                    Err(e) => {
                        warn!("{}", e);
                        FileStatus::Error
                    }
                }
            }
            Err(e) => {
                warn!(file_id, "Processing failed: {}", e);
                batch.counts.failed += 1;
                if let Err(e) = self.session.registry.mark_failed(file_id, e) {
                    warn!("{}", e);
                }
                FileStatus::Error
            }
        };

        let mut commands = vec![Command::Emit(SessionEvent::FileFinished {
            file_id: file_id.to_string(),
            status,
        })];
        commands.extend(self.advance_batch());
        commands
    }

    pub(super) fn on_cancel_requested(&mut self) -> Vec<Command> {
        if self.session.global_status != GlobalStatus::Processing {
            debug!(status = %self.session.global_status, "Cancel ignored");
            return Vec::new();
        }

        info!(batch_id = ?self.session.batch_id, "Cancelling batch");
        self.session.global_status = GlobalStatus::Cancelling;
        self.cancel_requested = true;
        self.cancel_generation += 1;

        vec![
            Command::Cancel {
                session_id: self.session.session_id.clone(),
            },
            Command::StartCancelTimer {
                generation: self.cancel_generation,
                after: self.cancel_ack_timeout,
            },
        ]
    }

    pub(super) fn on_cancel_timeout(&mut self, generation: u64) -> Vec<Command> {
        if generation != self.cancel_generation
            || self.session.global_status != GlobalStatus::Cancelling
        {
            return Vec::new();
        }

        warn!("Cancel was not acknowledged in time, returning to idle");
        self.cancel_acknowledged(true)
    }

    pub(super) fn on_channel_event(&mut self, event: ProgressEvent) -> Vec<Command> {
        match event {
            ProgressEvent::Cancelled => {
                if self.session.global_status != GlobalStatus::Cancelling {
                    debug!("Stray cancellation marker ignored");
                    return Vec::new();
                }
                info!("Cancel acknowledged");
                self.cancel_acknowledged(false)
            }
            ProgressEvent::Update {
                percentage,
                message,
            } => {
                let active = matches!(
                    self.session.global_status,
                    GlobalStatus::Processing | GlobalStatus::Cancelling
                );
                let current = self.batch.as_ref().and_then(|b| b.current.clone());
                match current {
                    Some(file_id) if active => {
                        let previous = self
                            .progress
                            .as_ref()
                            .filter(|p| p.file_id == file_id)
                            .map_or(0, |p| p.percentage);
                        self.progress = Some(ProgressDisplay {
                            file_id,
                            percentage: percentage.unwrap_or(previous),
                            message,
                        });
                    }
                    _ => debug!("Progress event with nothing in flight ignored"),
                }
                Vec::new()
            }
        }
    }

    fn cancel_acknowledged(&mut self, timed_out: bool) -> Vec<Command> {
        self.session.global_status = GlobalStatus::Idle;
        self.progress = None;
        self.cancel_generation += 1;
        vec![Command::Emit(SessionEvent::CancelAcknowledged { timed_out })]
    }
}
