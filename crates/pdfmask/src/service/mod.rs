//! Seam to the external processing service (check, decrypt, redact, archive,
//! configuration store, folder reveal and email dispatch).

pub mod http;
pub mod types;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::config::AppSettings;
use crate::error::ServiceError;
use crate::session::OutputLocation;

pub use http::HttpService;
pub use types::{
    EmailRequest, EncryptionCheck, ProcessRequest, UploadFile, UploadNotifier,
};

#[async_trait]
pub trait ProcessingService: Send + Sync {
    async fn health(&self) -> Result<(), ServiceError>;

    async fn check_encryption(&self, file: &UploadFile) -> Result<EncryptionCheck, ServiceError>;

    /// Returns the decrypted document bytes.
    async fn decrypt(
        &self,
        file: &UploadFile,
        password: &SecretString,
    ) -> Result<Vec<u8>, ServiceError>;

    /// Redacts one file. Resolves only once the service has finished with it.
    async fn process(
        &self,
        request: ProcessRequest,
        uploaded: UploadNotifier,
    ) -> Result<OutputLocation, ServiceError>;

    async fn cancel(&self, session_id: &str) -> Result<(), ServiceError>;

    async fn download(&self, location: &OutputLocation) -> Result<Vec<u8>, ServiceError>;

    /// Builds a zip archive of the given outputs and returns its bytes.
    async fn archive(&self, files: &[OutputLocation]) -> Result<Vec<u8>, ServiceError>;

    async fn read_config(&self) -> Result<AppSettings, ServiceError>;

    async fn write_config(&self, settings: &AppSettings) -> Result<(), ServiceError>;

    async fn reveal_folder(&self, path: &str) -> Result<(), ServiceError>;

    async fn send_email(&self, email: &EmailRequest) -> Result<(), ServiceError>;
}
