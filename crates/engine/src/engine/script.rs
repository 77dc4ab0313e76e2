use super::shared::{EngineCore, Prepared};
use super::{EngineInfo, EngineLifecycle, ScanEngine, ScanObserver};
use crate::camera::constraint_tiers;
use crate::error::{ErrorKind, Result};
use crate::host::{Constraints, Host};
use crate::kind::EngineKind;
use crate::loader;
use crate::settings::{EngineSettings, LibrarySettings, ScanOptions};
use async_trait::async_trait;
use exn::ResultExt;
use std::sync::Arc;

/// Engine backed by a pure-script decoder fetched from a CDN.
///
/// This is the universal fallback: it only needs the camera API, with no
/// secure-context or WebAssembly precondition.
pub struct ScriptEngine {
    core: EngineCore,
    library: LibrarySettings,
}

impl ScriptEngine {
    pub fn new(host: Host, settings: &EngineSettings) -> Self {
        let core = EngineCore::new(EngineKind::Script, host, settings.camera.clone(), settings.script.decode.clone())
            .with_library()
            .with_confidence(0.8);
        Self { core, library: settings.script.library.clone() }
    }

    /// Prefer the last enumerated camera, which is the rear one on most
    /// phones, before the generic facing-mode tiers.
    async fn tiers(&self, options: &ScanOptions) -> Vec<Constraints> {
        let mut tiers = constraint_tiers(options);
        match self.core.host().camera.devices().await {
            Ok(devices) => {
                if let Some(device) = devices.last() {
                    tracing::debug!(device = %device.id, count = devices.len(), "preferring last camera");
                    tiers.insert(0, Constraints::basic().with_device(device.id.clone()));
                }
            },
            Err(fault) => tracing::debug!(fault = %fault, "camera enumeration failed; using generic constraints"),
        }
        tiers
    }
}

#[async_trait]
impl ScanEngine for ScriptEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Script
    }

    async fn check_available(&self) -> bool {
        self.core.host().camera.is_supported()
    }

    async fn initialize(&self, surface: &str, options: &ScanOptions) -> Result<()> {
        if !self.check_available().await {
            exn::bail!(ErrorKind::Unavailable(EngineKind::Script));
        }
        let host = self.core.host().clone();
        let library = self.library.clone();
        let formats = options.formats.clone();
        let prepare = async move {
            let platform = &host.platform;
            let candidates =
                loader::optimize(&library.sources, &platform.connection(), platform.time_zone().as_deref(), &library);
            let report = loader::load(&*host.scripts, &candidates, &library).await?;
            let decoder = host
                .scripts
                .instantiate(&library.global_symbol, &formats)
                .or_raise(|| ErrorKind::UnknownEngineError("decoder construction failed".into()))?;
            Ok(Prepared { decoder, formats, library: Some(report) })
        };
        let tiers = self.tiers(options).await;
        self.core.initialize(surface, tiers, prepare).await
    }

    async fn start(&self, observer: Arc<dyn ScanObserver>) -> Result<()> {
        self.core.start(observer).await
    }

    async fn stop(&self) {
        self.core.stop();
    }

    async fn dispose(&self) -> Result<()> {
        self.core.dispose();
        Ok(())
    }

    fn describe(&self) -> EngineInfo {
        self.core.describe()
    }

    fn lifecycle(&self) -> EngineLifecycle {
        self.core.lifecycle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ConnectionInfo, Detection, HostFault, VideoDevice};
    use crate::mock::{DecodeStep, MockHost, OpenOutcome, RecordingObserver, ScriptBehavior};

    fn engine(mock: &MockHost) -> ScriptEngine {
        ScriptEngine::new(mock.host(), &EngineSettings::default())
    }

    #[tokio::test]
    async fn available_without_secure_context() {
        let mock = MockHost::default();
        mock.platform.set_secure(false);
        mock.platform.set_hostname("scanner.example");
        assert!(engine(&mock).check_available().await);
    }

    #[tokio::test]
    async fn unavailable_without_camera_api() {
        let mock = MockHost::default();
        mock.camera.set_supported(false);
        assert!(!engine(&mock).check_available().await);
    }

    #[tokio::test(start_paused = true)]
    async fn prefers_the_last_camera() {
        let mock = MockHost::default().with_devices([
            VideoDevice { id: "front".into(), label: "Front Camera".into() },
            VideoDevice { id: "rear".into(), label: "Back Camera".into() },
        ]);
        let engine = engine(&mock);

        engine.initialize("scanner", &ScanOptions::default()).await.unwrap();

        assert_eq!(mock.camera.opened(), vec![Constraints::basic().with_device("rear")]);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_generic_constraints_when_device_fails() {
        let mock = MockHost::default().with_devices([VideoDevice { id: "rear".into(), label: String::new() }]);
        mock.camera.push_outcomes([OpenOutcome::Fail(HostFault::Overconstrained)]);
        let engine = engine(&mock);

        engine.initialize("scanner", &ScanOptions::default()).await.unwrap();

        let opened = mock.camera.opened();
        assert_eq!(opened.len(), 2);
        assert_eq!(opened[1], Constraints::advanced());
    }

    #[tokio::test(start_paused = true)]
    async fn very_slow_connection_tries_only_lean_sources() {
        let mock = MockHost::default().with_script_symbol("Html5Qrcode");
        mock.platform.set_connection(ConnectionInfo { effective_type: Some("slow-2g".into()), save_data: false });
        mock.scripts.set_default_behavior(ScriptBehavior::Hang);
        let engine = engine(&mock);

        let err = engine.initialize("scanner", &ScanOptions::default()).await.unwrap_err();

        assert!(matches!(&*err, ErrorKind::LibraryLoadFailed(failures) if failures.0.len() == 4));
        assert_eq!(mock.scripts.removed().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_result_carries_script_confidence() {
        let mock = MockHost::default().with_script_symbol("Html5Qrcode");
        mock.decoder.script([DecodeStep::Found(Detection {
            raw_value: "https://example.com".into(),
            format: "qr_code".into(),
        })]);
        let engine = engine(&mock);
        let observer = Arc::new(RecordingObserver::default());

        engine.initialize("scanner", &ScanOptions::default()).await.unwrap();
        engine.start(observer.clone()).await.unwrap();
        observer.wait().await;

        let results = observer.successes();
        assert_eq!(results[0].engine, EngineKind::Script);
        assert_eq!(results[0].confidence, 0.8);
    }
}
