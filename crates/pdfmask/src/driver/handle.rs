use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::executor::Executor;
use super::sink::OutputSink;
use crate::channel::{ChannelConnector, ProgressChannel, ProgressEvent};
use crate::config::CoordinatorConfig;
use crate::coordinator::{Coordinator, Message, SessionEvent, SessionSnapshot};
use crate::error::{PdfmaskError, Result};
use crate::service::ProcessingService;
use crate::session::Session;

/// A [`SessionEvent`] stamped with the time it was published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionNotification {
    pub timestamp: DateTime<Utc>,
    pub event: SessionEvent,
}

/// Owns the coordinator and the progress channel for one session and runs
/// the message loop.
pub struct SessionDriver {
    coordinator: Coordinator,
    channel: ProgressChannel,
    progress: broadcast::Receiver<ProgressEvent>,
    inbox: mpsc::UnboundedReceiver<Message>,
    executor: Executor,
    snapshots: watch::Sender<SessionSnapshot>,
    shutdown: oneshot::Receiver<()>,
}

impl SessionDriver {
    /// Opens the progress channel, starts the message loop on the current
    /// runtime and kicks off the settings read and health check.
    pub fn spawn(
        session: Session,
        config: &CoordinatorConfig,
        service: Arc<dyn ProcessingService>,
        connector: Arc<dyn ChannelConnector>,
        sink: Arc<dyn OutputSink>,
    ) -> SessionHandle {
        let channel = ProgressChannel::open(
            connector,
            config.progress_url_for(&session.session_id),
            config.reconnect_backoff(),
            config.event_capacity,
        );
        let progress = channel.subscribe();

        let coordinator = Coordinator::new(session, config);
        let session_id = coordinator.session_id().to_string();
        let (messages, inbox) = mpsc::unbounded_channel();
        let (snapshots, snapshot_rx) = watch::channel(coordinator.snapshot());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let events = Arc::new(events);
        let (shutdown_tx, shutdown) = oneshot::channel();

        let executor = Executor::new(service, sink, messages.clone(), Arc::clone(&events));
        let driver = SessionDriver {
            coordinator,
            channel,
            progress,
            inbox,
            executor,
            snapshots,
            shutdown,
        };

        info!(session_id = %session_id, "Session started");
        let task = tokio::spawn(driver.run());

        SessionHandle {
            session_id,
            messages,
            snapshots: snapshot_rx,
            events,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    async fn run(mut self) {
        self.executor.bootstrap();

        loop {
            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(message) => self.handle(message),
                    None => break,
                },
                event = self.progress.recv() => match event {
                    Ok(event) => self.handle(Message::Channel(event)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Progress events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = &mut self.shutdown => break,
            }
        }

        self.channel.close().await;
        debug!(session_id = %self.coordinator.session_id(), "Session stopped");
    }

    fn handle(&mut self, message: Message) {
        for command in self.coordinator.update(message) {
            self.executor.execute(command);
        }

        let snapshot = self.coordinator.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}

/// Client side of a running session.
///
/// Dropping the handle stops the session.
pub struct SessionHandle {
    session_id: String,
    messages: mpsc::UnboundedSender<Message>,
    snapshots: watch::Receiver<SessionSnapshot>,
    events: Arc<broadcast::Sender<SessionNotification>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Queues a message for the coordinator.
    pub fn send(&self, message: Message) -> Result<()> {
        self.messages
            .send(message)
            .map_err(|_| PdfmaskError::DriverStopped)
    }

    /// Latest published state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.events.subscribe()
    }

    /// Waits until a published snapshot satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| PdfmaskError::DriverStopped)?;
        Ok(snapshot.clone())
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the message loop and closes the progress channel.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let task = &mut self.task;
        if let Err(e) = task.await {
            warn!("Session task ended abnormally: {}", e);
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
