use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;
use tokio::sync::broadcast;

use super::connector::{ChannelConnector, FrameStream};
use crate::error::ChannelError;

#[derive(Debug, Clone)]
enum Frame {
    Text(String),
    Hangup,
}

/// In-process connector for hosts that embed the processing service
/// directly, and for tests.
///
/// Every successful `connect` gets its own live view of the frames pushed
/// after it connected. Nothing is buffered for connections that do not exist yet.
#[derive(Clone)]
pub struct MemoryConnector {
    frames: Arc<broadcast::Sender<Frame>>,
    attempts: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        let (frames, _) = broadcast::channel(256);
        Self {
            frames: Arc::new(frames),
            attempts: Arc::new(AtomicUsize::new(0)),
            failures_left: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pushes a raw text frame to every open connection.
    /// Returns the number of connections that received it.
    pub fn push(&self, text: impl Into<String>) -> usize {
        self.frames.send(Frame::Text(text.into())).unwrap_or(0)
    }

    pub fn push_progress(&self, percentage: u8, message: &str) -> usize {
        self.push(serde_json::json!({ "percentage": percentage, "message": message }).to_string())
    }

    pub fn push_cancelled(&self) -> usize {
        self.push(r#"{"message":"Cancelled"}"#)
    }

    /// Drops every open connection.
    pub fn hang_up(&self) {
        let _ = self.frames.send(Frame::Hangup);
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.frames.receiver_count()
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelConnector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<FrameStream, ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ChannelError::Connect {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let receiver = self.frames.subscribe();
        let frames = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(Frame::Text(text)) => return Some((Ok(text), receiver)),
                    Ok(Frame::Hangup) => return None,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(frames.boxed())
    }
}
