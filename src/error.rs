//! Controller Error Types
//!
//! Engine and orchestrator errors are raised into [`ErrorKind::Engine`] and
//! [`ErrorKind::Factory`], keeping their `Exn` frames as children in the
//! error tree.

use derive_more::{Display, Error};
use megascan_engine::error::{Error as EngineError, ErrorKind as EngineErrorKind};
use megascan_factory::error::{Error as FactoryError, ErrorKind as FactoryErrorKind};

/// A controller error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why the scanner could not be activated or started.
///
/// ### Environment Errors
/// - [`ErrorKind::HttpsRequired`]
/// - [`ErrorKind::CameraUnsupported`]
/// - [`ErrorKind::DesktopNoCamera`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Engine`]
/// - [`ErrorKind::Factory`]
#[derive(Debug, Display, Error, Clone, PartialEq)]
pub enum ErrorKind {
    /// Camera access needs a secure context.
    #[display("HTTPS required for camera access")]
    HttpsRequired,
    /// The host has no media capture API.
    #[display("camera access is not supported")]
    CameraUnsupported,
    /// A desktop machine without any video input.
    #[display("no camera available on this desktop device")]
    DesktopNoCamera,
    #[display("{_0}")]
    Engine(#[error(not(source))] EngineErrorKind),
    #[display("{_0}")]
    Factory(#[error(not(source))] FactoryErrorKind),
}

impl ErrorKind {
    /// Raise an engine error, preserving its frame as a child.
    #[track_caller]
    pub fn engine(err: EngineError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Engine(inner))
    }

    /// Raise an orchestrator error, preserving its frame as a child.
    #[track_caller]
    pub fn factory(err: FactoryError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Factory(inner))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Engine(kind) => kind.is_retryable(),
            Self::Factory(kind) => kind.is_retryable(),
            Self::HttpsRequired | Self::CameraUnsupported | Self::DesktopNoCamera => false,
        }
    }

    /// The engine failure behind this error, looking through the orchestrator.
    pub fn engine_cause(&self) -> Option<&EngineErrorKind> {
        match self {
            Self::Engine(kind) => Some(kind),
            Self::Factory(kind) => kind.engine_cause(),
            _ => None,
        }
    }
}
