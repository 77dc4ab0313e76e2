pub mod camera;
mod engine;
pub mod error;
pub mod host;
mod kind;
pub mod loader;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod settings;

pub use crate::engine::{
    EngineCapabilities, EngineInfo, EngineLifecycle, EngineStats, NativeEngine, ScanEngine, ScanObserver, ScanResult,
    ScriptEngine, WasmEngine,
};
pub use crate::kind::EngineKind;
pub use crate::settings::{
    CameraSettings, DecodeSettings, EngineSettings, LibraryEngineSettings, LibrarySettings, PREFERRED_FORMATS,
    ScanOptions,
};
use std::sync::Arc;

pub type EngineHandle = Arc<dyn ScanEngine>;
