//! Tunable engine settings.
//!
//! All timings are stored as milliseconds so they read naturally in
//! configuration files; accessors convert them to [`Duration`]s.

use crate::host::ConnectionQuality;
use crate::loader::{Provider, RegionPreference};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Symbol formats every engine is asked to recognise, in the browser
/// detection API's naming.
pub const PREFERRED_FORMATS: [&str; 7] = ["code_128", "code_39", "ean_13", "ean_8", "upc_a", "upc_e", "qr_code"];

/// Per-call options for [`ScanEngine::initialize`](crate::ScanEngine::initialize).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Formats to decode; the engine narrows this to what it supports.
    pub formats: Vec<String>,
    /// Try the advanced constraint set before the basic one.
    pub advanced_constraints: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            formats: PREFERRED_FORMATS.iter().map(|f| f.to_string()).collect(),
            advanced_constraints: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Upper bound for a single `open` call, per constraint tier.
    pub acquire_timeout_ms: u64,
}

impl CameraSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self { acquire_timeout_ms: 10_000 }
    }
}

/// Decode loop tuning shared by every engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeSettings {
    /// Delay between two decode attempts.
    pub scan_interval_ms: u64,
    /// Consecutive decode errors tolerated before the loop halts.
    pub error_threshold: u32,
}

impl DecodeSettings {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self { scan_interval_ms: 100, error_threshold: 5 }
    }
}

/// How a decoder library is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySettings {
    /// Candidate script URLs, highest priority first.
    pub sources: Vec<String>,
    /// Global symbol the library defines once evaluated.
    pub global_symbol: String,
    pub timeout_ms: u64,
    pub retry_delay_ms: u64,
    /// How many times to poll for the global symbol after a load.
    pub availability_checks: u32,
    pub availability_interval_ms: u64,
    /// Providers moved to the front when bandwidth is scarce.
    pub lean_providers: Vec<Provider>,
    pub lean_limit: usize,
    /// Connection quality (or worse) that triggers the lean candidate list.
    /// Save-data always does.
    pub lean_at: ConnectionQuality,
    /// Candidate limit for connections that are slow but not lean.
    pub slow_limit: Option<usize>,
    /// Providers moved to the front per time zone region; first match wins.
    pub regions: Vec<RegionPreference>,
}

impl LibrarySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn availability_interval(&self) -> Duration {
        Duration::from_millis(self.availability_interval_ms)
    }

    /// ZXing browser build, compiled to WebAssembly.
    pub fn zxing() -> Self {
        Self {
            sources: vec![
                "https://cdn.jsdelivr.net/npm/@zxing/browser@0.1.5/umd/zxing-browser.min.js".into(),
                "https://unpkg.com/@zxing/browser@0.1.5/umd/zxing-browser.min.js".into(),
                "https://cdn.jsdelivr.net/npm/@zxing/browser@0.1.4/umd/zxing-browser.min.js".into(),
                "https://unpkg.com/@zxing/browser@0.1.4/umd/zxing-browser.min.js".into(),
                "https://cdnjs.cloudflare.com/ajax/libs/zxing-browser/0.1.4/zxing-browser.min.js".into(),
                "https://cdn.jsdelivr.net/npm/@zxing/browser@0.1.3/umd/zxing-browser.min.js".into(),
            ],
            global_symbol: "ZXing".into(),
            timeout_ms: 15_000,
            retry_delay_ms: 500,
            availability_checks: 30,
            availability_interval_ms: 100,
            lean_providers: vec![Provider::Jsdelivr, Provider::Unpkg],
            lean_limit: 4,
            lean_at: ConnectionQuality::Slow,
            slow_limit: None,
            regions: vec![
                RegionPreference::new("Europe", [Provider::Jsdelivr, Provider::Unpkg]),
                RegionPreference::new("America", [Provider::Unpkg, Provider::Jsdelivr]),
            ],
        }
    }

    /// html5-qrcode, a pure-script decoder.
    pub fn html5_qrcode() -> Self {
        Self {
            sources: vec![
                "https://cdn.jsdelivr.net/npm/html5-qrcode@2.3.8/minified/html5-qrcode.min.js".into(),
                "https://unpkg.com/html5-qrcode@2.3.8/minified/html5-qrcode.min.js".into(),
                "https://cdn.jsdelivr.net/npm/html5-qrcode@2.3.7/minified/html5-qrcode.min.js".into(),
                "https://unpkg.com/html5-qrcode@2.3.7/minified/html5-qrcode.min.js".into(),
                "https://cdnjs.cloudflare.com/ajax/libs/html5-qrcode/2.3.8/html5-qrcode.min.js".into(),
                "https://cdnjs.cloudflare.com/ajax/libs/html5-qrcode/2.3.7/html5-qrcode.min.js".into(),
                "https://cdn.jsdelivr.net/npm/html5-qrcode@2.3.4/minified/html5-qrcode.min.js".into(),
                "https://unpkg.com/html5-qrcode@2.3.4/minified/html5-qrcode.min.js".into(),
            ],
            global_symbol: "Html5Qrcode".into(),
            timeout_ms: 20_000,
            retry_delay_ms: 800,
            availability_checks: 30,
            availability_interval_ms: 100,
            lean_providers: vec![Provider::Jsdelivr, Provider::Unpkg],
            lean_limit: 4,
            lean_at: ConnectionQuality::VerySlow,
            slow_limit: Some(6),
            regions: vec![
                RegionPreference::new("Europe", [Provider::Jsdelivr, Provider::Cdnjs, Provider::Unpkg]),
                RegionPreference::new("America", [Provider::Unpkg, Provider::Jsdelivr, Provider::Cdnjs]),
                RegionPreference::new("Asia", [Provider::Jsdelivr, Provider::Unpkg, Provider::Cdnjs]),
            ],
        }
    }
}

/// Settings for an engine that loads its decoder from a library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEngineSettings {
    #[serde(default)]
    pub decode: DecodeSettings,
    pub library: LibrarySettings,
}

/// Settings for every built-in engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub camera: CameraSettings,
    pub native: DecodeSettings,
    pub wasm: LibraryEngineSettings,
    pub script: LibraryEngineSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            camera: CameraSettings::default(),
            native: DecodeSettings::default(),
            wasm: LibraryEngineSettings { decode: DecodeSettings::default(), library: LibrarySettings::zxing() },
            script: LibraryEngineSettings { decode: DecodeSettings::default(), library: LibrarySettings::html5_qrcode() },
        }
    }
}
