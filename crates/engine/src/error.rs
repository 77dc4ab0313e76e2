//! Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Every failure an engine can surface
//! to the orchestrator is classified into one of these kinds; raw host faults
//! never leave this crate unclassified.

use crate::host::HostFault;
use crate::kind::EngineKind;
use crate::loader::LoadFailures;
use derive_more::{Display, Error};

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq)]
pub enum ErrorKind {
    /// The user (or a policy) refused camera access.
    #[display("camera permission denied")]
    PermissionDenied,
    /// No video input device exists.
    #[display("no camera found")]
    NoCameraFound,
    /// The camera exists but could not be opened, usually because another
    /// application holds it. Acquisition timeouts land here too.
    #[display("camera is in use or unreadable")]
    CameraInUse,
    /// Neither the advanced nor the basic constraint set could be satisfied.
    #[display("camera constraints not supported")]
    UnsupportedConstraints,
    /// Every candidate source for the decoder library failed.
    #[display("decoder library failed to load: {_0}")]
    LibraryLoadFailed(#[error(not(source))] LoadFailures),
    /// The engine cannot run in this environment.
    #[display("engine unavailable: {_0}")]
    Unavailable(#[error(not(source))] EngineKind),
    /// The target surface to bind the camera to does not exist.
    #[display("surface not found: {_0}")]
    SurfaceNotFound(#[error(not(source))] String),
    /// The operation requires a successful `initialize` first.
    #[display("engine not initialized")]
    NotInitialized,
    /// The engine was disposed and can never be used again.
    #[display("engine disposed")]
    Disposed,
    /// Too many consecutive decode errors; the scan loop halted.
    #[display("decoding failed repeatedly")]
    DecodeFailed,
    /// An unclassified failure reported by the host or decoder.
    #[display("{_0}")]
    UnknownEngineError(#[error(not(source))] String),
    /// An engine identifier that does not name any known engine.
    #[display("unknown engine: {_0}")]
    UnknownEngine(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CameraInUse | Self::LibraryLoadFailed(_) | Self::DecodeFailed)
    }

    /// Classify a host fault raised while acquiring or using the camera.
    pub fn from_camera_fault(fault: &HostFault) -> Self {
        match fault {
            HostFault::NotAllowed | HostFault::Security => Self::PermissionDenied,
            HostFault::NotFound => Self::NoCameraFound,
            HostFault::NotReadable | HostFault::Timeout => Self::CameraInUse,
            HostFault::Overconstrained | HostFault::NotSupported => Self::UnsupportedConstraints,
            HostFault::Other(message) => Self::UnknownEngineError(message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(HostFault::NotAllowed, ErrorKind::PermissionDenied)]
    #[case(HostFault::Security, ErrorKind::PermissionDenied)]
    #[case(HostFault::NotFound, ErrorKind::NoCameraFound)]
    #[case(HostFault::NotReadable, ErrorKind::CameraInUse)]
    #[case(HostFault::Timeout, ErrorKind::CameraInUse)]
    #[case(HostFault::Overconstrained, ErrorKind::UnsupportedConstraints)]
    #[case(HostFault::Other("boom".into()), ErrorKind::UnknownEngineError("boom".into()))]
    fn classify_camera_fault(#[case] fault: HostFault, #[case] expected: ErrorKind) {
        assert_eq!(ErrorKind::from_camera_fault(&fault), expected);
    }

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::PermissionDenied.to_string(), "camera permission denied");
        assert_eq!(ErrorKind::Unavailable(EngineKind::Wasm).to_string(), "engine unavailable: wasm");
        assert_eq!(ErrorKind::UnknownEngineError("weird".into()).to_string(), "weird");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::CameraInUse.is_retryable());
        assert!(!ErrorKind::PermissionDenied.is_retryable());
        assert!(!ErrorKind::Disposed.is_retryable());
    }
}
