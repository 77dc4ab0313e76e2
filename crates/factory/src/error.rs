//! Orchestrator error types.
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.
//! Engine failures are raised into [`ErrorKind::Engine`], so the original
//! engine error stays in the tree below it.

use derive_more::{Display, Error};
use megascan_engine::EngineKind;
use megascan_engine::error::ErrorKind as EngineErrorKind;

/// An orchestrator error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies why the orchestrator could not provide an engine.
///
/// ### Selection Errors
/// - [`ErrorKind::Unregistered`]
/// - [`ErrorKind::AllEnginesExhausted`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Engine`]
/// - [`ErrorKind::Store`] - logged by the orchestrator itself, only ever
///   returned by [`KeyValueStore`](crate::KeyValueStore) implementations.
#[derive(Debug, Display, Error, Clone, PartialEq)]
pub enum ErrorKind {
    /// The registry has no constructor for the selected engine.
    #[display("no engine registered for {_0}")]
    Unregistered(#[error(not(source))] EngineKind),
    /// The selected engine and every fallback after it failed.
    #[display("all scanning engines failed; original error: {cause}")]
    AllEnginesExhausted {
        /// Engines whose initialization was attempted, in order.
        #[error(not(source))]
        attempted: Vec<EngineKind>,
        /// Why the first engine failed.
        #[error(not(source))]
        cause: EngineErrorKind,
    },
    /// A single engine operation failed and no fallback applied.
    #[display("{_0}")]
    Engine(#[error(not(source))] EngineErrorKind),
    #[display("key-value store failure: {_0}")]
    Store(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Engine(kind) => kind.is_retryable(),
            Self::AllEnginesExhausted { cause, .. } => cause.is_retryable(),
            Self::Unregistered(_) | Self::Store(_) => false,
        }
    }

    /// The engine error at the root of this failure, if any.
    pub fn engine_cause(&self) -> Option<&EngineErrorKind> {
        match self {
            Self::Engine(kind) | Self::AllEnginesExhausted { cause: kind, .. } => Some(kind),
            Self::Unregistered(_) | Self::Store(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_mentions_the_original_cause() {
        let kind = ErrorKind::AllEnginesExhausted {
            attempted: vec![EngineKind::Native, EngineKind::Script],
            cause: EngineErrorKind::CameraInUse,
        };
        assert_eq!(kind.to_string(), "all scanning engines failed; original error: camera is in use or unreadable");
        assert_eq!(kind.engine_cause(), Some(&EngineErrorKind::CameraInUse));
        assert!(kind.is_retryable());
    }

    #[test]
    fn engine_errors_display_transparently() {
        let kind = ErrorKind::Engine(EngineErrorKind::PermissionDenied);
        assert_eq!(kind.to_string(), "camera permission denied");
        assert!(!kind.is_retryable());
        assert_eq!(ErrorKind::Unregistered(EngineKind::Wasm).to_string(), "no engine registered for wasm");
    }
}
