pub mod channel;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod sanitize;
pub mod service;
pub mod session;
pub mod telemetry;

pub use channel::{
    ChannelConnector, MemoryConnector, ProgressChannel, ProgressEvent, WebSocketConnector,
};
pub use config::{load_config, load_or_default, save_config, AppSettings, CoordinatorConfig};
pub use coordinator::{
    Command, Coordinator, Message, SessionEvent, SessionSnapshot, SubmittedFile,
};
pub use driver::{DirectorySink, OutputSink, SessionDriver, SessionHandle, SessionNotification};
pub use error::{
    ChannelError, ConfigError, OutputError, PdfmaskError, Result, ServiceError, TransitionError,
};
pub use service::{HttpService, ProcessingService};
pub use session::{FileStatus, GlobalStatus, Session};
pub use telemetry::init_logging;
