//! Multi-engine barcode and QR scanning.
//!
//! [`ScannerController`] is the application-facing entry point: it handles
//! camera permission and reports progress through [`ScannerEvents`], while
//! the [`EngineOrchestrator`] behind it picks between the native detection
//! API, a WebAssembly decoder and a pure-script decoder, falling back from
//! one to the next when an engine fails to start.

mod controller;
mod device;
pub mod error;
mod events;
mod messages;

pub use crate::controller::{ControllerStats, ControllerStatus, ScannerController};
pub use crate::device::DeviceClass;
pub use crate::events::ScannerEvents;
pub use crate::messages::user_message;
pub use megascan_config::Config;
pub use megascan_detect::{CapabilityDetector, CapabilityReport};
pub use megascan_engine::host::{Host, PermissionState};
pub use megascan_engine::{EngineHandle, EngineInfo, EngineKind, ScanOptions, ScanResult};
pub use megascan_factory::{EngineOrchestrator, KeyValueStore, MemoryStore};
