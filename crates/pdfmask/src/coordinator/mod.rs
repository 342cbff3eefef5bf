//! Session coordinator.
//!
//! A single reducer consumes [`Message`]s (user actions, service results,
//! channel events, timers) and answers with [`Command`]s for the driver to
//! execute. All per-file and session state lives here.

mod batch;
pub mod message;
mod output;
mod resolver;
pub mod snapshot;
mod state;

pub use message::{
    Command, DecryptAttempt, DeliveryKind, Message, NoticeLevel, SessionEvent, SubmittedFile,
};
pub use snapshot::{BatchCounts, FileSummary, ProgressDisplay, SessionSnapshot};
pub use state::{normalize_words, Coordinator};
