//! Error types for bucketfs operations

use std::io;
use thiserror::Error;

/// Result type alias for filesystem operations
pub type FsResult<T> = Result<T, FsError>;

/// Errors that can occur while emulating a filesystem over object storage
#[derive(Error, Debug)]
pub enum FsError {
    /// Object not found in bucket
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Malformed constructor or path argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Bucket still holds objects and cannot be deleted
    #[error("Bucket not empty: {0}")]
    BucketNotEmpty(String),

    /// Multipart upload would exceed the part-count ceiling
    #[error("Unable to create part number {part_number}: the maximum part number is {max_parts}")]
    MaxPartsExceeded { part_number: i32, max_parts: i32 },

    /// First failure of a fanned-out batch operation
    #[error("{operation} failed on {key}: {source}")]
    AggregateFailure {
        operation: &'static str,
        key: String,
        source: Box<FsError>,
    },

    /// Storage service error, passed through uninterpreted
    #[error("Storage service error ({code}): {message}")]
    Service { code: String, message: String },

    /// Transport failure talking to the storage service
    #[error("Network error: {0}")]
    Network(String),

    /// Storage service returned a response this crate cannot use
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A spawned sub-operation panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),

    /// Local I/O error while reading a source stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid or unreadable configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl FsError {
    /// Check if this error indicates the object was not found
    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound { .. } => true,
            FsError::AggregateFailure { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Storage error code, when the error originated from the service
    pub fn code(&self) -> Option<&str> {
        match self {
            FsError::NotFound { .. } => Some("NoSuchKey"),
            FsError::BucketNotEmpty(_) => Some("BucketNotEmpty"),
            FsError::Service { code, .. } => Some(code),
            FsError::AggregateFailure { source, .. } => source.code(),
            _ => None,
        }
    }

    /// Failure of a spawned task to deliver its result
    pub(crate) fn task(error: tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            FsError::Task("task was cancelled".to_string())
        } else {
            FsError::Task(format!("task panicked: {}", error))
        }
    }

    /// Wrap a sub-operation failure as the result of a fan-out
    pub(crate) fn aggregate(operation: &'static str, key: impl Into<String>, source: FsError) -> Self {
        FsError::AggregateFailure {
            operation,
            key: key.into(),
            source: Box::new(source),
        }
    }
}

/// Convert AWS SDK errors to FsError
#[cfg(feature = "s3-native")]
impl<E> From<aws_sdk_s3::error::SdkError<E>> for FsError
where
    E: aws_sdk_s3::error::ProvideErrorMetadata + std::error::Error + 'static,
{
    fn from(error: aws_sdk_s3::error::SdkError<E>) -> Self {
        use aws_sdk_s3::error::{DisplayErrorContext, SdkError};

        match &error {
            SdkError::ServiceError(service) => {
                let err = service.err();
                let code = err.code().unwrap_or("Unknown").to_string();
                let message = err
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| DisplayErrorContext(&error).to_string());
                match code.as_str() {
                    "BucketNotEmpty" => FsError::BucketNotEmpty(message),
                    _ => FsError::Service { code, message },
                }
            }
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => {
                FsError::Network(DisplayErrorContext(&error).to_string())
            }
            _ => FsError::Protocol(DisplayErrorContext(&error).to_string()),
        }
    }
}
