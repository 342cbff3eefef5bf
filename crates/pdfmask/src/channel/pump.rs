use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::connector::ChannelConnector;
use super::events::{parse_frame, ProgressEvent};
use crate::sanitize;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Live handle to the session's progress channel.
///
/// A background task keeps one connection open, reconnecting after a fixed
/// backoff whenever it drops. Decoded events fan out to every subscriber.
/// Dropping the handle stops the task.
pub struct ProgressChannel {
    sender: Arc<broadcast::Sender<ProgressEvent>>,
    connected: watch::Receiver<bool>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProgressChannel {
    /// Spawns the connection task. Must be called inside a tokio runtime.
    pub fn open(
        connector: Arc<dyn ChannelConnector>,
        url: String,
        backoff: Duration,
        capacity: usize,
    ) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let sender = Arc::new(sender);
        let (connected_tx, connected) = watch::channel(false);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run(
            connector,
            url,
            backoff,
            Arc::clone(&sender),
            connected_tx,
            shutdown_rx,
        ));

        Self {
            sender,
            connected,
            shutdown,
            task,
        }
    }

    /// Creates a new subscriber. Events sent before subscribing are not seen.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Watch for connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Stops reconnecting and waits for the current connection to close.
    pub async fn close(mut self) {
        let _ = self.shutdown.send(true);
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut self.task).await.is_err() {
            warn!("Progress channel did not stop in time, aborting");
        }
    }
}

impl Drop for ProgressChannel {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        self.task.abort();
    }
}

async fn run(
    connector: Arc<dyn ChannelConnector>,
    url: String,
    backoff: Duration,
    sender: Arc<broadcast::Sender<ProgressEvent>>,
    connected: watch::Sender<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let endpoint = sanitize::fingerprint(&url);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let attempt = tokio::select! {
            result = connector.connect(&url) => Some(result),
            _ = shutdown.changed() => None,
        };

        match attempt {
            None => break,
            Some(Ok(mut frames)) => {
                let _ = connected.send(true);
                info!("Progress channel {} connected", endpoint);

                loop {
                    let frame = tokio::select! {
                        frame = frames.next() => frame,
                        _ = shutdown.changed() => None,
                    };

                    match frame {
                        Some(Ok(text)) => match parse_frame(&text) {
                            Ok(event) => {
                                // No subscribers is fine
                                let _ = sender.send(event);
                            }
                            Err(e) => warn!("Ignoring progress frame: {}", e),
                        },
                        Some(Err(e)) => {
                            warn!("Progress channel {} failed: {}", endpoint, e);
                            break;
                        }
                        None => break,
                    }
                }

                let _ = connected.send(false);
                debug!("Progress channel {} disconnected", endpoint);
            }
            Some(Err(e)) => {
                debug!("Progress channel connect failed: {}", e);
            }
        }

        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.changed() => break,
        }
    }

    let _ = connected.send(false);
    debug!("Progress channel {} stopped", endpoint);
}
