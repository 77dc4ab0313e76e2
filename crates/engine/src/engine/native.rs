use super::shared::{EngineCore, Prepared};
use super::{EngineInfo, EngineLifecycle, ScanEngine, ScanObserver};
use crate::camera::constraint_tiers;
use crate::error::{ErrorKind, Result};
use crate::host::Host;
use crate::kind::EngineKind;
use crate::settings::{EngineSettings, PREFERRED_FORMATS, ScanOptions};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use std::sync::Arc;

/// Engine backed by the browser's built-in barcode detection API.
///
/// Needs no external library; it is available whenever the host exposes a
/// detector that recognises at least one of the preferred formats.
pub struct NativeEngine {
    core: EngineCore,
}

impl NativeEngine {
    pub fn new(host: Host, settings: &EngineSettings) -> Self {
        let core = EngineCore::new(EngineKind::Native, host, settings.camera.clone(), settings.native.clone());
        Self { core }
    }
}

#[async_trait]
impl ScanEngine for NativeEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Native
    }

    async fn check_available(&self) -> bool {
        let Some(native) = &self.core.host().native else {
            return false;
        };
        match native.supported_formats().await {
            Ok(formats) => formats.iter().any(|format| PREFERRED_FORMATS.contains(&format.as_str())),
            Err(fault) => {
                tracing::debug!(fault = %fault, "native format probe failed");
                false
            },
        }
    }

    async fn initialize(&self, surface: &str, options: &ScanOptions) -> Result<()> {
        let native = self.core.host().native.clone();
        let requested = options.formats.clone();
        let prepare = async move {
            let native = native.ok_or_raise(|| ErrorKind::Unavailable(EngineKind::Native))?;
            let supported =
                native.supported_formats().await.or_raise(|| ErrorKind::Unavailable(EngineKind::Native))?;
            let formats: Vec<String> = requested.into_iter().filter(|format| supported.contains(format)).collect();
            if formats.is_empty() {
                exn::bail!(ErrorKind::Unavailable(EngineKind::Native));
            }
            let decoder =
                native.create(&formats).or_raise(|| ErrorKind::UnknownEngineError("detector construction failed".into()))?;
            tracing::debug!(formats = ?formats, "native detector created");
            Ok(Prepared { decoder, formats, library: None })
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
