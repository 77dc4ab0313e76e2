use crate::browser::BrowserInfo;
use crate::report::{CameraInfo, CapabilityReport, Hardware, NativeSupport, PerformanceTier};
use megascan_engine::EngineKind;
use megascan_engine::host::{Host, HostFault, PermissionState};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::instrument;

/// Probes the host once and memoizes the resulting [`CapabilityReport`].
///
/// Concurrent callers of [`detect`](Self::detect) share a single in-flight
/// detection pass. Detection never fails: a probe that errors degrades its
/// own field to "unavailable" or "unknown".
pub struct CapabilityDetector {
    host: Host,
    report: Mutex<Arc<OnceCell<CapabilityReport>>>,
}

impl CapabilityDetector {
    pub fn new(host: Host) -> Self {
        Self { host, report: Mutex::new(Arc::new(OnceCell::new())) }
    }

    fn cell(&self) -> Arc<OnceCell<CapabilityReport>> {
        Arc::clone(&self.report.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub async fn detect(&self) -> CapabilityReport {
        self.cell().get_or_init(|| self.probe()).await.clone()
    }

    /// Discard the cached report and probe again.
    pub async fn redetect(&self) -> CapabilityReport {
        let cell = Arc::new(OnceCell::new());
        *self.report.lock().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&cell);
        cell.get_or_init(|| self.probe()).await.clone()
    }

    /// The report of a completed detection pass, without probing.
    pub fn cached(&self) -> Option<CapabilityReport> {
        self.cell().get().cloned()
    }

    pub async fn recommended_engine(&self) -> EngineKind {
        self.detect().await.recommended_engine()
    }

    pub async fn is_engine_available(&self, kind: EngineKind) -> bool {
        self.detect().await.is_engine_available(kind)
    }

    #[instrument(skip_all)]
    async fn probe(&self) -> CapabilityReport {
        let platform = &self.host.platform;
        let cores = platform.hardware_concurrency().unwrap_or(1);
        let memory_gb = platform.device_memory();
        let report = CapabilityReport {
            browser: BrowserInfo::from_user_agent(&platform.user_agent()),
            native: self.probe_native().await,
            wasm_supported: platform.probe_wasm().unwrap_or_else(|fault| {
                tracing::debug!(fault = %fault, "wasm probe failed");
                false
            }),
            camera: self.probe_camera().await,
            secure_context: self.host.is_secure(),
            hardware: Hardware { cores, memory_gb, connection: platform.connection().quality() },
            performance: PerformanceTier::estimate(cores, memory_gb),
        };
        tracing::info!(
            native = report.native.usable(),
            wasm = report.wasm_supported,
            cameras = report.camera.device_count,
            secure = report.secure_context,
            performance = %report.performance,
            recommended = %report.recommended_engine(),
            "capabilities detected"
        );
        report
    }

    async fn probe_native(&self) -> NativeSupport {
        let Some(native) = &self.host.native else {
            return NativeSupport { reason: Some("native detection API not available".into()), ..Default::default() };
        };
        match native.supported_formats().await {
            Ok(formats) => NativeSupport { available: true, formats, reason: None },
            Err(fault) => {
                tracing::debug!(fault = %fault, "native format probe failed");
                NativeSupport { reason: Some(format!("format probe failed: {fault}")), ..Default::default() }
            },
        }
    }

    async fn probe_camera(&self) -> CameraInfo {
        let camera = &self.host.camera;
        if !camera.is_supported() {
            return CameraInfo::default();
        }
        let permission = match camera.query_permission().await {
            Ok(permission) => permission,
            Err(HostFault::NotSupported) => PermissionState::Unknown,
            Err(fault) => {
                tracing::debug!(fault = %fault, "camera permission query failed");
                PermissionState::Unknown
            },
        };
        match camera.devices().await {
            Ok(devices) => CameraInfo {
                available: true,
                device_count: devices.len(),
                has_rear_camera: devices.iter().any(|device| {
                    let label = device.label.to_lowercase();
                    label.contains("back") || label.contains("rear")
                }),
                permission,
            },
            Err(fault) => {
                tracing::debug!(fault = %fault, "camera enumeration failed");
                CameraInfo { permission, ..CameraInfo::default() }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use megascan_engine::host::{ConnectionInfo, ConnectionQuality, VideoDevice};
    use megascan_engine::mock::MockHost;

    #[tokio::test]
    async fn detection_is_memoized_until_redetect() {
        let mock = MockHost::default();
        let detector = CapabilityDetector::new(mock.host());
        assert!(detector.cached().is_none());

        let (first, second) = tokio::join!(detector.detect(), detector.detect());
        assert_eq!(first, second);
        assert!(first.wasm_supported);

        mock.platform.set_wasm(Ok(false));
        assert!(detector.detect().await.wasm_supported);
        assert!(!detector.redetect().await.wasm_supported);
        assert_eq!(detector.cached().map(|report| report.wasm_supported), Some(false));
    }

    #[tokio::test]
    async fn failing_probes_degrade_individually() {
        let mock = MockHost::default();
        mock.native.fail_formats(HostFault::Other("boom".into()));
        mock.platform.set_wasm(Err(HostFault::Other("CompileError".into())));
        mock.camera.set_devices(Err(HostFault::Security));
        mock.camera.set_permission(Err(HostFault::NotSupported));
        let detector = CapabilityDetector::new(mock.host());

        let report = detector.detect().await;

        assert!(!report.native.available);
        assert!(report.native.reason.is_some());
        assert!(!report.wasm_supported);
        assert!(!report.camera.available);
        assert_eq!(report.camera.permission, PermissionState::Unknown);
        assert!(report.secure_context);
        assert_eq!(detector.recommended_engine().await, EngineKind::Script);
    }

    #[tokio::test]
    async fn missing_native_api_recommends_wasm() {
        let mock = MockHost::default().without_native();
        let detector = CapabilityDetector::new(mock.host());

        assert!(!detector.is_engine_available(EngineKind::Native).await);
        assert!(detector.is_engine_available(EngineKind::Script).await);
        assert_eq!(detector.recommended_engine().await, EngineKind::Wasm);
    }

    #[tokio::test]
    async fn native_with_one_preferred_format_is_recommended() {
        let mock = MockHost::default().with_native_formats(["ean_13"]);
        let detector = CapabilityDetector::new(mock.host());
        assert_eq!(detector.recommended_engine().await, EngineKind::Native);
    }

    #[tokio::test]
    async fn camera_details() {
        let mock = MockHost::default().with_devices([
            VideoDevice { id: "a".into(), label: "FaceTime HD Camera".into() },
            VideoDevice { id: "b".into(), label: "camera2 0, facing BACK".into() },
        ]);
        let detector = CapabilityDetector::new(mock.host());

        let camera = detector.detect().await.camera;

        assert!(camera.available);
        assert_eq!(camera.device_count, 2);
        assert!(camera.has_rear_camera);
        assert_eq!(camera.permission, PermissionState::Prompt);
    }

    #[tokio::test]
    async fn low_end_device_skips_wasm() {
        let mock = MockHost::default().without_native();
        mock.platform.set_hardware(Some(2), None);
        mock.platform.set_connection(ConnectionInfo { effective_type: Some("2g".into()), save_data: false });
        let detector = CapabilityDetector::new(mock.host());

        let report = detector.detect().await;

        assert_eq!(report.performance, PerformanceTier::Low);
        assert_eq!(report.hardware.connection, ConnectionQuality::Slow);
        assert_eq!(report.recommended_engine(), EngineKind::Script);
    }

    #[tokio::test]
    async fn unknown_core_count_defaults_to_one() {
        let mock = MockHost::default();
        mock.platform.set_hardware(None, Some(8.0));
        let report = CapabilityDetector::new(mock.host()).detect().await;
        assert_eq!(report.hardware.cores, 1);
        assert_eq!(report.performance, PerformanceTier::Low);
    }
}
