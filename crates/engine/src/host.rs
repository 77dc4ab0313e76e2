//! Host environment abstractions.
//!
//! Everything the scanning core needs from the browser (or whatever embeds
//! it) is reached through the traits in this module: platform facts, the
//! camera, the view surfaces, script injection and the vendor decoders. The
//! core never probes ambient globals itself; the embedder hands a [`Host`]
//! to whoever needs one.

use async_trait::async_trait;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Failure reported by a host facility, mirroring the exception names the
/// browser media and permission APIs raise.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum HostFault {
    #[display("NotAllowedError")]
    NotAllowed,
    #[display("NotFoundError")]
    NotFound,
    #[display("NotReadableError")]
    NotReadable,
    #[display("OverconstrainedError")]
    Overconstrained,
    #[display("NotSupportedError")]
    NotSupported,
    #[display("SecurityError")]
    Security,
    #[display("TimeoutError")]
    Timeout,
    #[display("{_0}")]
    Other(#[error(not(source))] String),
}

pub type HostResult<T> = std::result::Result<T, HostFault>;

/// Camera permission as seen by the application.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    #[default]
    #[display("unknown")]
    Unknown,
    #[display("prompt")]
    Prompt,
    #[display("granted")]
    Granted,
    #[display("denied")]
    Denied,
    /// Pre-classified before prompting: a desktop machine with no camera.
    #[display("desktop_no_camera")]
    DesktopNoCamera,
}

/// Network quality bucket derived from the connection's effective type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionQuality {
    #[default]
    Fast,
    Slow,
    VerySlow,
}

/// Network information exposed by the host, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Effective connection type (`slow-2g`, `2g`, `3g`, `4g`).
    pub effective_type: Option<String>,
    /// The user asked for reduced data usage.
    pub save_data: bool,
}

impl ConnectionInfo {
    pub fn quality(&self) -> ConnectionQuality {
        match self.effective_type.as_deref() {
            Some("slow-2g") => ConnectionQuality::VerySlow,
            Some("2g") => ConnectionQuality::Slow,
            _ => ConnectionQuality::Fast,
        }
    }
}

/// Static facts about the host platform.
///
/// Optional values are `None` when the host does not expose them.
pub trait Platform: Send + Sync {
    fn is_secure_context(&self) -> bool;
    /// Hostname of the page; loopback hosts are treated as secure.
    fn hostname(&self) -> String;
    /// Attempt to compile and instantiate a trivial WebAssembly module.
    fn probe_wasm(&self) -> HostResult<bool>;
    fn hardware_concurrency(&self) -> Option<u32>;
    /// Approximate device memory, in gigabytes.
    fn device_memory(&self) -> Option<f64>;
    fn connection(&self) -> ConnectionInfo;
    /// IANA time zone name, e.g. `Europe/Madrid`.
    fn time_zone(&self) -> Option<String>;
    fn user_agent(&self) -> String;
    /// Platform string, e.g. `Win32` or `Linux x86_64`.
    fn platform(&self) -> String;
    fn max_touch_points(&self) -> u32;
    fn screen_width(&self) -> u32;
}

/// A video input device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDevice {
    pub id: String,
    /// Empty until the user has granted camera permission.
    pub label: String,
}

/// Which way the requested camera should face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    #[default]
    Environment,
    User,
}

/// An ideal value with an optional lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub ideal: u32,
    pub min: Option<u32>,
}

/// Constraint set passed to the host when opening the camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    pub device_id: Option<String>,
    pub facing: FacingMode,
    pub width: Range,
    pub height: Range,
    pub frame_rate: Option<Range>,
    pub continuous_focus: bool,
    pub continuous_exposure: bool,
    pub continuous_white_balance: bool,
}

impl Constraints {
    /// Rear camera at 720p with continuous focus, exposure and white balance.
    pub fn advanced() -> Self {
        Self {
            device_id: None,
            facing: FacingMode::Environment,
            width: Range { ideal: 1280, min: Some(640) },
            height: Range { ideal: 720, min: Some(480) },
            frame_rate: Some(Range { ideal: 30, min: Some(15) }),
            continuous_focus: true,
            continuous_exposure: true,
            continuous_white_balance: true,
        }
    }

    /// Rear camera at an ideal 720p, nothing else.
    pub fn basic() -> Self {
        Self {
            device_id: None,
            facing: FacingMode::Environment,
            width: Range { ideal: 1280, min: None },
            height: Range { ideal: 720, min: None },
            frame_rate: None,
            continuous_focus: false,
            continuous_exposure: false,
            continuous_white_balance: false,
        }
    }

    pub fn with_device(mut self, id: impl Into<String>) -> Self {
        self.device_id = Some(id.into());
        self
    }
}

/// A live camera stream. Stopping releases every track.
pub trait CameraStream: Send + Sync {
    fn id(&self) -> &str;
    fn stop(&self);
}

#[async_trait]
pub trait Camera: Send + Sync {
    /// Whether the media capture API exists at all.
    fn is_supported(&self) -> bool;
    /// Enumerate video inputs.
    async fn devices(&self) -> HostResult<Vec<VideoDevice>>;
    /// Query the permission without prompting. [`HostFault::NotSupported`]
    /// means the host has no permission query API.
    async fn query_permission(&self) -> HostResult<PermissionState>;
    /// Open a stream; may trigger the permission prompt.
    async fn open(&self, constraints: &Constraints) -> HostResult<Box<dyn CameraStream>>;
}

/// View targets a live stream can be bound to.
pub trait Surfaces: Send + Sync {
    fn attach(&self, surface: &str, stream: &dyn CameraStream) -> HostResult<()>;
    fn detach(&self, surface: &str);
}

/// A symbol decoded from a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub raw_value: String,
    pub format: String,
}

/// A vendor decoder bound to nothing but the frames it is asked about.
#[async_trait]
pub trait Decoder: Send + Sync {
    /// Decode the current frame of `surface`. `Ok(None)` means no symbol
    /// was found in this frame.
    async fn decode(&self, surface: &str) -> HostResult<Option<Detection>>;
}

/// The browser's built-in barcode detection API.
#[async_trait]
pub trait NativeDetector: Send + Sync {
    async fn supported_formats(&self) -> HostResult<Vec<String>>;
    fn create(&self, formats: &[String]) -> HostResult<Arc<dyn Decoder>>;
}

/// Dynamic script loading and construction of script-provided decoders.
#[async_trait]
pub trait ScriptHost: Send + Sync {
    /// Inject a script tag and resolve once it loaded or failed.
    async fn inject(&self, url: &str) -> HostResult<()>;
    /// Remove a previously injected script tag, if present.
    fn remove(&self, url: &str);
    fn has_global(&self, symbol: &str) -> bool;
    /// Construct a decoder from the loaded library's global symbol.
    fn instantiate(&self, symbol: &str, formats: &[String]) -> HostResult<Arc<dyn Decoder>>;
}

/// Bundle of host facilities, shared by reference between components.
#[derive(Clone)]
pub struct Host {
    pub platform: Arc<dyn Platform>,
    pub camera: Arc<dyn Camera>,
    pub surfaces: Arc<dyn Surfaces>,
    pub scripts: Arc<dyn ScriptHost>,
    /// `None` when the host has no native detection API.
    pub native: Option<Arc<dyn NativeDetector>>,
}

impl Host {
    /// Secure context, or a loopback page served over plain HTTP.
    pub fn is_secure(&self) -> bool {
        self.platform.is_secure_context()
            || matches!(self.platform.hostname().as_str(), "localhost" | "127.0.0.1" | "::1" | "[::1]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, ConnectionQuality::Fast)]
    #[case(Some("4g"), ConnectionQuality::Fast)]
    #[case(Some("3g"), ConnectionQuality::Fast)]
    #[case(Some("2g"), ConnectionQuality::Slow)]
    #[case(Some("slow-2g"), ConnectionQuality::VerySlow)]
    fn connection_quality(#[case] effective: Option<&str>, #[case] expected: ConnectionQuality) {
        let info = ConnectionInfo { effective_type: effective.map(str::to_string), save_data: false };
        assert_eq!(info.quality(), expected);
    }

    #[test]
    fn advanced_constraints_are_stricter_than_basic() {
        let advanced = Constraints::advanced();
        let basic = Constraints::basic();
        assert_eq!(advanced.facing, basic.facing);
        assert_eq!(advanced.width.min, Some(640));
        assert!(basic.frame_rate.is_none());
        assert!(advanced.continuous_focus && !basic.continuous_focus);
    }
}
