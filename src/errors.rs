// SPDX-License-Identifier: GPL-3.0-only

//! Error types for devices, adapters and configuration

use crate::driver::types::{Capability, State};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using DriverError
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors produced by the device layer and by capture adapters
///
/// Adapters return the adapter-side variants; the device wrapper hands them
/// back to the caller untouched so they can be compared against the value the
/// adapter produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// A state-gated operation was called in the wrong state
    #[error("{operation} is not allowed while the device is {state}")]
    InvalidState {
        operation: &'static str,
        state: State,
    },
    /// The adapter behind the device does not implement this capability
    #[error("capability not supported: {0}")]
    CapabilityUnsupported(Capability),
    /// A device with this label is already registered
    #[error("a device labelled {0:?} is already registered")]
    DuplicateLabel(String),
    /// Capture device not found
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    /// Adapter failed to open its capture session
    #[error("failed to open device: {0}")]
    OpenFailed(String),
    /// Adapter failed to start or continue recording
    #[error("recording failed: {0}")]
    RecordFailed(String),
    /// Requested properties are not supported by the adapter
    #[error("format not supported: {0}")]
    FormatNotSupported(String),
    /// I/O error reported by the platform
    #[error("I/O error: {0}")]
    Io(String),
    /// The source was closed; no more frames or samples will be produced
    #[error("end of stream")]
    EndOfStream,
    /// Other adapter errors
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of a [`DriverError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised by the device wrapper; the adapter was not invoked
    InvalidState,
    /// Raised when an optional capability is missing
    CapabilityUnsupported,
    /// Raised by the device registry
    Registry,
    /// Produced by an adapter and propagated verbatim
    Adapter,
}

impl DriverError {
    /// Build an [`DriverError::InvalidState`] for an operation
    pub fn invalid_state(operation: &'static str, state: State) -> Self {
        DriverError::InvalidState { operation, state }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::InvalidState { .. } => ErrorKind::InvalidState,
            DriverError::CapabilityUnsupported(_) => ErrorKind::CapabilityUnsupported,
            DriverError::DuplicateLabel(_) => ErrorKind::Registry,
            _ => ErrorKind::Adapter,
        }
    }

    /// True for [`DriverError::EndOfStream`]
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, DriverError::EndOfStream)
    }
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        DriverError::Io(err.to_string())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no configuration directory available on this system")]
    NoConfigDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            DriverError::invalid_state("video_record", State::Closed).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            DriverError::CapabilityUnsupported(Capability::AvailabilityProbe).kind(),
            ErrorKind::CapabilityUnsupported
        );
        assert_eq!(
            DriverError::DuplicateLabel("cam".into()).kind(),
            ErrorKind::Registry
        );
        assert_eq!(
            DriverError::RecordFailed("boom".into()).kind(),
            ErrorKind::Adapter
        );
        assert_eq!(DriverError::EndOfStream.kind(), ErrorKind::Adapter);
    }

    #[test]
    fn test_display_messages() {
        let err = DriverError::invalid_state("audio_record", State::Closed);
        assert_eq!(
            err.to_string(),
            "audio_record is not allowed while the device is closed"
        );
        assert_eq!(
            DriverError::CapabilityUnsupported(Capability::VideoRecord).to_string(),
            "capability not supported: video record"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing node");
        let err: DriverError = io.into();
        assert!(matches!(err, DriverError::Io(ref msg) if msg.contains("missing node")));
    }
}
