//! Async runtime around the [`Coordinator`](crate::coordinator::Coordinator).

mod executor;
pub mod handle;
pub mod sink;

pub use handle::{SessionDriver, SessionHandle, SessionNotification};
pub use sink::{DirectorySink, OutputSink};
