use std::path::PathBuf;
use thiserror::Error;

use crate::session::FileStatus;

#[derive(Error, Debug)]
pub enum PdfmaskError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Progress channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Session driver stopped")]
    DriverStopped,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Failures talking to the external processing service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Request to '{endpoint}' failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("'{endpoint}' returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The service answered with a structured `{error: ...}` payload.
    #[error("{0}")]
    Reported(String),

    #[error("Unexpected response from '{endpoint}': {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("Invalid service URL: {0}")]
    InvalidUrl(String),
}

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Failed to connect progress channel at '{url}': {reason}")]
    Connect { url: String, reason: String },

    #[error("Progress channel protocol error: {0}")]
    Protocol(String),
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A FileRecord was asked to move along an edge the state machine does not have.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Unknown file id '{0}'")]
    UnknownFile(String),

    #[error("File '{id}' cannot move from {from} to {to}")]
    Illegal {
        id: String,
        from: FileStatus,
        to: FileStatus,
    },
}

pub type Result<T> = std::result::Result<T, PdfmaskError>;
