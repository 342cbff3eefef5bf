//! Session data model: the files under management and their lifecycle.

pub mod record;
pub mod registry;

pub use record::{
    FileId, FileRecord, FileStatus, GlobalStatus, OutputLocation, PendingCredentialRequest,
    Session,
};
pub use registry::FileRegistry;
