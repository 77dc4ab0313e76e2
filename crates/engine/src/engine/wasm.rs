use super::shared::{EngineCore, Prepared};
use super::{EngineInfo, EngineLifecycle, ScanEngine, ScanObserver};
use crate::camera::constraint_tiers;
use crate::error::{ErrorKind, Result};
use crate::host::Host;
use crate::kind::EngineKind;
use crate::loader;
use crate::settings::{EngineSettings, LibrarySettings, ScanOptions};
use async_trait::async_trait;
use exn::ResultExt;
use std::sync::Arc;

/// Engine backed by a WebAssembly-compiled decoder fetched from a CDN.
///
/// Requires a secure context, camera support and a working WebAssembly
/// runtime.
pub struct WasmEngine {
    core: EngineCore,
    library: LibrarySettings,
}

impl WasmEngine {
    pub fn new(host: Host, settings: &EngineSettings) -> Self {
        let core = EngineCore::new(EngineKind::Wasm, host, settings.camera.clone(), settings.wasm.decode.clone())
            .with_library()
            .with_secure_context()
            .with_confidence(0.9);
        Self { core, library: settings.wasm.library.clone() }
    }
}

#[async_trait]
impl ScanEngine for WasmEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Wasm
    }

    async fn check_available(&self) -> bool {
        let host = self.core.host();
        if !host.is_secure() {
            tracing::debug!("secure context required for the wasm engine");
            return false;
        }
        if !host.camera.is_supported() {
            return false;
        }
        host.platform.probe_wasm().unwrap_or_else(|fault| {
            tracing::debug!(fault = %fault, "wasm probe failed");
            false
        })
    }

    async fn initialize(&self, surface: &str, options: &ScanOptions) -> Result<()> {
        if !self.check_available().await {
            exn::bail!(ErrorKind::Unavailable(EngineKind::Wasm));
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
        self.core.initialize(surface, constraint_tiers(options), prepare).await
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
    use crate::host::HostFault;
    use crate::loader::Source;
    use crate::mock::{MockHost, ScriptBehavior};

    fn engine(mock: &MockHost) -> WasmEngine {
        WasmEngine::new(mock.host(), &EngineSettings::default())
    }

    #[tokio::test]
    async fn insecure_context_is_unavailable() {
        let mock = MockHost::default();
        mock.platform.set_secure(false);
        mock.platform.set_hostname("scanner.example");
        assert!(!engine(&mock).check_available().await);

        let err = engine(&mock).initialize("scanner", &ScanOptions::default()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Unavailable(EngineKind::Wasm));
    }

    #[tokio::test]
    async fn loopback_counts_as_secure() {
        let mock = MockHost::default();
        mock.platform.set_secure(false);
        mock.platform.set_hostname("localhost");
        assert!(engine(&mock).check_available().await);
    }

    #[tokio::test]
    async fn failing_wasm_probe_is_unavailable() {
        let mock = MockHost::default();
        mock.platform.set_wasm(Err(HostFault::Other("CompileError".into())));
        assert!(!engine(&mock).check_available().await);
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_records_the_library_source() {
        let mock = MockHost::default().with_script_symbol("ZXing");
        let settings = LibrarySettings::zxing();
        mock.scripts.set_behavior(&settings.sources[0], ScriptBehavior::Fail(HostFault::Other("blocked".into())));
        let engine = engine(&mock);

        engine.initialize("scanner", &ScanOptions::default()).await.unwrap();

        let info = engine.describe();
        let library = info.library.unwrap();
        assert_eq!(library.successful_source, Some(Source::new(settings.sources[1].clone())));
        assert_eq!(library.attempts.len(), 2);
        assert_eq!(info.capabilities.confidence, 0.9);
        assert!(info.capabilities.requires_library);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_library_sources_fail_initialization() {
        let mock = MockHost::default().with_script_symbol("ZXing");
        mock.scripts.set_default_behavior(ScriptBehavior::Fail(HostFault::NotFound));
        let engine = engine(&mock);

        let err = engine.initialize("scanner", &ScanOptions::default()).await.unwrap_err();

        let ErrorKind::LibraryLoadFailed(failures) = &*err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(failures.0.len(), 6);
        assert_eq!(engine.lifecycle(), EngineLifecycle::Failed);
        // The camera is never opened when the decoder cannot be prepared.
        assert!(mock.camera.opened().is_empty());
    }
}
