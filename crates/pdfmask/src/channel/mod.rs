//! Progress Channel: a push connection keyed by session id that streams
//! per-file progress and the cancellation acknowledgement.
//!
//! Events are observational only. The channel reconnects on its own after a
//! fixed backoff and does not replay anything missed while disconnected.

pub mod connector;
pub mod events;
pub mod memory;
pub mod pump;

pub use connector::{ChannelConnector, FrameStream, WebSocketConnector};
pub use events::{parse_frame, ProgressEvent, CANCELLED_MARKER};
pub use memory::MemoryConnector;
pub use pump::ProgressChannel;
