//! Error types for the UDP endpoint table

use crate::types::Status;
use thiserror::Error;

/// Result type alias for this library
pub type Result<T> = std::result::Result<T, EndpointError>;

/// Error types that can occur while enumerating UDP endpoints
#[derive(Error, Debug)]
pub enum EndpointError {
    /// No data source exists for this platform
    #[error("Not implemented on this platform: {0}")]
    NotImplemented(String),

    /// The data source exists but could not be queried right now
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Scratch memory for the scan could not be obtained
    #[error("Out of memory: {0}")]
    NoMemory(String),

    /// IO error when reading system files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error when a system call fails
    #[error("System call failed: {0}")]
    SysCall(String),
}

impl EndpointError {
    /// Call-level status reported for this error
    pub fn status(&self) -> Status {
        match self {
            EndpointError::NotImplemented(_) => Status::NotImplemented,
            EndpointError::NoMemory(_) => Status::NoMemory,
            EndpointError::NotSupported(_)
            | EndpointError::Io(_)
            | EndpointError::SysCall(_) => Status::NotSupported,
        }
    }
}

impl From<std::collections::TryReserveError> for EndpointError {
    fn from(err: std::collections::TryReserveError) -> Self {
        EndpointError::NoMemory(err.to_string())
    }
}
