//! Contracts for external collaborators: blob storage and a metrics sink.
//!
//! Neither is implemented here. Hosts plug in their own backends; the core
//! only relies on the behavior documented on each trait.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Read;
use std::time::Duration;

/// Blob storage failures.
#[derive(Debug)]
pub enum BlobError {
    /// No blob stored at the path.
    NotFound(String),
    /// Local read/write failure.
    Io(std::io::Error),
    /// Backend-specific failure (network, credentials, signing).
    Backend(String),
}

impl Display for BlobError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "blob not found: {path}"),
            Self::Io(err) => write!(f, "blob io failure: {err}"),
            Self::Backend(message) => write!(f, "blob backend failure: {message}"),
        }
    }
}

impl Error for BlobError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::NotFound(_) | Self::Backend(_) => None,
        }
    }
}

impl From<std::io::Error> for BlobError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Object storage for attachment bytes.
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` at `path`, replacing any previous blob.
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError>;
    /// Opens a streaming reader over the blob at `path`.
    fn read_stream(&self, path: &str) -> Result<Box<dyn Read + Send>, BlobError>;
    fn delete(&self, path: &str) -> Result<(), BlobError>;
    /// Returns a URL granting read access to `path` for `expiry`.
    fn temporary_url(&self, path: &str, expiry: Duration) -> Result<String, BlobError>;
}

/// Metrics sink failure. Never surfaced to API callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError(pub String);

impl Display for SinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "metrics sink failure: {}", self.0)
    }
}

impl Error for SinkError {}

/// Fire-and-forget key/value sink (cache or metrics backend).
pub trait MetricsSink: Send + Sync {
    fn set(&self, key: &str, value: &str) -> Result<(), SinkError>;
    fn increment(&self, key: &str) -> Result<(), SinkError>;
}

/// Sink that drops every write.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn set(&self, _key: &str, _value: &str) -> Result<(), SinkError> {
        Ok(())
    }

    fn increment(&self, _key: &str) -> Result<(), SinkError> {
        Ok(())
    }
}
