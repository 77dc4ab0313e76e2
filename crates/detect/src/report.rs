use crate::browser::BrowserInfo;
use derive_more::Display;
use megascan_engine::host::{ConnectionQuality, PermissionState};
use megascan_engine::{EngineKind, PREFERRED_FORMATS};
use serde::{Deserialize, Serialize};

/// Coarse estimate of how much decoding work the device can sustain.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    #[display("low")]
    Low,
    #[default]
    #[display("medium")]
    Medium,
    #[display("high")]
    High,
}

impl PerformanceTier {
    /// High needs 8 cores and 4 GB, Medium 4 cores and 2 GB. A device that
    /// does not report its memory never clears either bar.
    pub fn estimate(cores: u32, memory_gb: Option<f64>) -> Self {
        match memory_gb {
            Some(memory) if cores >= 8 && memory >= 4.0 => Self::High,
            Some(memory) if cores >= 4 && memory >= 2.0 => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// What the native barcode detection API offers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeSupport {
    pub available: bool,
    pub formats: Vec<String>,
    /// Why the API is unusable, when it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl NativeSupport {
    pub fn supports_preferred_format(&self) -> bool {
        self.formats.iter().any(|format| PREFERRED_FORMATS.contains(&format.as_str()))
    }

    /// Available with at least one preferred format.
    pub fn usable(&self) -> bool {
        self.available && self.supports_preferred_format()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// The media capture API exists and devices could be enumerated.
    pub available: bool,
    pub device_count: usize,
    pub has_rear_camera: bool,
    pub permission: PermissionState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hardware {
    /// Logical cores; 1 when the host does not say.
    pub cores: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_gb: Option<f64>,
    pub connection: ConnectionQuality,
}

/// Snapshot of what the host supports, taken once per session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityReport {
    pub browser: BrowserInfo,
    pub native: NativeSupport,
    pub wasm_supported: bool,
    pub camera: CameraInfo,
    /// Secure context, or a loopback host.
    pub secure_context: bool,
    pub hardware: Hardware,
    pub performance: PerformanceTier,
}

impl CapabilityReport {
    /// Native when usable, then Wasm unless the device is slow, then Script.
    pub fn recommended_engine(&self) -> EngineKind {
        if self.native.usable() {
            EngineKind::Native
        } else if self.wasm_supported && self.performance != PerformanceTier::Low {
            EngineKind::Wasm
        } else {
            EngineKind::Script
        }
    }

    pub fn is_engine_available(&self, kind: EngineKind) -> bool {
        match kind {
            EngineKind::Native => self.native.usable(),
            EngineKind::Wasm => self.wasm_supported,
            EngineKind::Script => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn report(native: &[&str], wasm: bool, performance: PerformanceTier) -> CapabilityReport {
        CapabilityReport {
            native: NativeSupport {
                available: !native.is_empty(),
                formats: native.iter().map(|f| f.to_string()).collect(),
                reason: None,
            },
            wasm_supported: wasm,
            performance,
            ..CapabilityReport::default()
        }
    }

    #[rstest]
    #[case(16, Some(16.0), PerformanceTier::High)]
    #[case(8, Some(4.0), PerformanceTier::High)]
    #[case(8, Some(2.0), PerformanceTier::Medium)]
    #[case(4, Some(2.0), PerformanceTier::Medium)]
    #[case(4, Some(1.0), PerformanceTier::Low)]
    #[case(2, Some(8.0), PerformanceTier::Low)]
    #[case(16, None, PerformanceTier::Low)]
    fn performance_tier(#[case] cores: u32, #[case] memory: Option<f64>, #[case] expected: PerformanceTier) {
        assert_eq!(PerformanceTier::estimate(cores, memory), expected);
    }

    #[rstest]
    #[case(&["ean_13"], true, PerformanceTier::High, EngineKind::Native)]
    #[case(&["ean_13"], false, PerformanceTier::Low, EngineKind::Native)]
    #[case(&["aztec"], true, PerformanceTier::Medium, EngineKind::Wasm)]
    #[case(&[], true, PerformanceTier::High, EngineKind::Wasm)]
    #[case(&[], true, PerformanceTier::Low, EngineKind::Script)]
    #[case(&[], false, PerformanceTier::High, EngineKind::Script)]
    fn recommendation(
        #[case] native: &[&str],
        #[case] wasm: bool,
        #[case] performance: PerformanceTier,
        #[case] expected: EngineKind,
    ) {
        assert_eq!(report(native, wasm, performance).recommended_engine(), expected);
    }

    #[test]
    fn native_is_recommended_only_with_a_preferred_format() {
        for formats in [&[][..], &["aztec", "pdf417"][..], &["qr_code"][..]] {
            let report = report(formats, false, PerformanceTier::High);
            let native = report.recommended_engine() == EngineKind::Native;
            assert_eq!(native, report.native.supports_preferred_format());
        }
    }

    #[rstest]
    #[case(EngineKind::Native, false)]
    #[case(EngineKind::Wasm, false)]
    #[case(EngineKind::Script, true)]
    fn script_is_always_available(#[case] kind: EngineKind, #[case] expected: bool) {
        let report = report(&[], false, PerformanceTier::Low);
        assert_eq!(report.is_engine_available(kind), expected);
    }
}
