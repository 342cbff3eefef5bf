use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Payload message that acknowledges a cancel request.
pub const CANCELLED_MARKER: &str = "Cancelled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Fine-grained progress for the file currently in flight.
    /// `percentage` of 100 conventionally means that file finished.
    Update {
        percentage: Option<u8>,
        message: String,
    },
    /// The service acknowledged a cancel request.
    Cancelled,
}

impl ProgressEvent {
    pub fn update(percentage: u8, message: &str) -> Self {
        ProgressEvent::Update {
            percentage: Some(percentage.min(100)),
            message: message.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProgressEvent::Cancelled)
    }
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    percentage: Option<f64>,
    #[serde(default)]
    message: Option<String>,
}

/// Decodes one text frame from the channel.
pub fn parse_frame(text: &str) -> Result<ProgressEvent, ChannelError> {
    let raw: RawFrame = serde_json::from_str(text)
        .map_err(|e| ChannelError::Protocol(format!("invalid progress frame: {}", e)))?;

    let message = raw.message.unwrap_or_default();
    if message == CANCELLED_MARKER {
        return Ok(ProgressEvent::Cancelled);
    }

    if raw.percentage.is_none() && message.is_empty() {
        return Err(ChannelError::Protocol(
            "progress frame has neither percentage nor message".to_string(),
        ));
    }

    let percentage = raw
        .percentage
        .filter(|p| p.is_finite())
        .map(|p| p.clamp(0.0, 100.0).round() as u8);

    Ok(ProgressEvent::Update {
        percentage,
        message,
    })
}
