//! The engine contract and the built-in adapters.
//!
//! An engine wraps exactly one scanning backend and owns its camera stream
//! and decoder handle exclusively. Every engine goes through the same
//! lifecycle:
//!
//! ```text
//! Uninitialized → Initializing → Ready → Scanning → (Stopped | Failed) → Disposed
//! ```
//!
//! A disposed engine is never reused; whoever needs that backend again must
//! construct a fresh instance.

mod native;
mod script;
mod shared;
mod wasm;

pub use self::native::NativeEngine;
pub use self::script::ScriptEngine;
pub use self::wasm::WasmEngine;
use crate::error::{ErrorKind, Result};
use crate::kind::EngineKind;
use crate::loader::LoadReport;
use crate::settings::ScanOptions;
use async_trait::async_trait;
use derive_more::Display;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineLifecycle {
    #[default]
    #[display("uninitialized")]
    Uninitialized,
    #[display("initializing")]
    Initializing,
    #[display("ready")]
    Ready,
    #[display("scanning")]
    Scanning,
    #[display("stopped")]
    Stopped,
    #[display("failed")]
    Failed,
    #[display("disposed")]
    Disposed,
}

impl EngineLifecycle {
    /// Ready or scanning: the engine holds a live camera stream.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Ready | Self::Scanning)
    }
}

/// A successfully decoded symbol. Produced at most once per scan session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub raw_value: String,
    pub format: String,
    pub engine: EngineKind,
    /// Time between `start` and the decode.
    pub scan_duration: Duration,
    /// Backend-specific trust in the decode, from 0 to 1.
    pub confidence: f32,
}

/// Running counters of one engine instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStats {
    pub scans_attempted: u64,
    pub successful_scans: u64,
    /// Exponential moving average over successful scans.
    pub average_scan_time: Duration,
    pub initialization_time: Duration,
    pub library_load_time: Duration,
}

impl EngineStats {
    pub(crate) fn record_success(&mut self, elapsed: Duration) {
        self.successful_scans += 1;
        self.average_scan_time = match self.successful_scans {
            1 => elapsed,
            _ => self.average_scan_time.mul_f64(0.9) + elapsed.mul_f64(0.1),
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineCapabilities {
    pub requires_library: bool,
    pub requires_secure_context: bool,
    /// Formats negotiated at initialization; empty before that.
    pub formats: Vec<String>,
    pub confidence: f32,
}

/// Read-only snapshot of an engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineInfo {
    pub display_name: String,
    pub kind: EngineKind,
    pub capabilities: EngineCapabilities,
    pub lifecycle: EngineLifecycle,
    pub stats: EngineStats,
    /// How the decoder library was obtained, for engines that need one.
    pub library: Option<LoadReport>,
}

/// Receives the outcome of a scan session.
///
/// Exactly one of the two methods is called per session, and never after
/// the session was stopped.
pub trait ScanObserver: Send + Sync {
    fn on_success(&self, result: ScanResult);
    /// The decode loop halted after too many consecutive errors.
    fn on_error(&self, error: ErrorKind);
}

/// Uniform contract every scanning backend implements.
///
/// The orchestrator only ever talks to engines through this trait, so a new
/// backend is pluggable by implementing it and registering a constructor.
///
/// # Lifecycle
/// - [`initialize`](Self::initialize) acquires the camera (advanced
///   constraints first, basic ones on rejection), binds it to the surface
///   and prepares the decoder, loading its library if needed.
/// - [`start`](Self::start) begins the decode loop. Calling it while already
///   scanning is a no-op.
/// - [`stop`](Self::stop) is idempotent and never fails.
/// - [`dispose`](Self::dispose) stops and makes the engine permanently
///   unusable.
///
/// # Examples
///
/// ```
/// use megascan_engine::{EngineHandle, ScanEngine, ScanOptions, error::Result};
///
/// async fn warm_up(engine: &EngineHandle, surface: &str) -> Result<bool> {
///     if !engine.check_available().await {
///         return Ok(false);
///     }
///     engine.initialize(surface, &ScanOptions::default()).await?;
///     Ok(engine.lifecycle().is_live())
/// }
/// ```
#[async_trait]
pub trait ScanEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Whether this backend can run here. Never fails; any probe error
    /// reads as unavailable.
    async fn check_available(&self) -> bool;

    /// Acquire the camera, bind it to `surface` and prepare the decoder.
    ///
    /// Re-initializing a live engine on the same surface is a no-op.
    async fn initialize(&self, surface: &str, options: &ScanOptions) -> Result<()>;

    /// Begin decoding. The observer is told about the outcome exactly once.
    async fn start(&self, observer: Arc<dyn ScanObserver>) -> Result<()>;

    /// Halt decoding, release camera tracks and detach from the surface.
    async fn stop(&self);

    /// Stop, then release every handle. The engine cannot be used again.
    async fn dispose(&self) -> Result<()>;

    fn describe(&self) -> EngineInfo;

    fn lifecycle(&self) -> EngineLifecycle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_starts_at_first_sample() {
        let mut stats = EngineStats::default();
        stats.record_success(Duration::from_millis(200));
        assert_eq!(stats.average_scan_time, Duration::from_millis(200));
        stats.record_success(Duration::from_millis(300));
        assert!((stats.average_scan_time.as_secs_f64() - 0.210).abs() < 1e-6);
    }
}
