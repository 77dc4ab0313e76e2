//! State and decode loop shared by every built-in engine.
//!
//! The adapters differ only in how they decide availability and how they
//! prepare a [`Decoder`]; camera ownership, lifecycle bookkeeping and the
//! scan loop all live here.

use super::{EngineCapabilities, EngineInfo, EngineLifecycle, EngineStats, ScanObserver, ScanResult};
use crate::camera;
use crate::error::{ErrorKind, Result};
use crate::host::{CameraStream, Constraints, Decoder, Detection, Host, HostFault, HostResult, Surfaces};
use crate::kind::EngineKind;
use crate::loader::LoadReport;
use crate::settings::{CameraSettings, DecodeSettings};
use async_stream::stream;
use futures::{Stream, StreamExt};
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// What an adapter hands back once its decoder is ready.
pub(crate) struct Prepared {
    pub decoder: Arc<dyn Decoder>,
    pub formats: Vec<String>,
    pub library: Option<LoadReport>,
}

#[derive(Default)]
struct State {
    lifecycle: EngineLifecycle,
    surface: Option<String>,
    tiers: Vec<Constraints>,
    stream: Option<Box<dyn CameraStream>>,
    decoder: Option<Arc<dyn Decoder>>,
    /// Token of the running scan session, if any.
    scan: Option<CancellationToken>,
    formats: Vec<String>,
    library: Option<LoadReport>,
    stats: EngineStats,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cancel the scan session, release the stream and detach, then move to
/// `lifecycle`. Releasing happens at most once per acquired stream.
fn halt(state: &mut State, surfaces: &dyn Surfaces, lifecycle: EngineLifecycle) {
    if let Some(token) = state.scan.take() {
        token.cancel();
    }
    if let Some(stream) = state.stream.take() {
        stream.stop();
        if let Some(surface) = &state.surface {
            surfaces.detach(surface);
        }
    }
    state.lifecycle = lifecycle;
}

pub(crate) struct EngineCore {
    kind: EngineKind,
    host: Host,
    camera: CameraSettings,
    decode: DecodeSettings,
    requires_library: bool,
    requires_secure_context: bool,
    confidence: f32,
    state: Arc<Mutex<State>>,
}

impl EngineCore {
    pub(crate) fn new(kind: EngineKind, host: Host, camera: CameraSettings, decode: DecodeSettings) -> Self {
        Self {
            kind,
            host,
            camera,
            decode,
            requires_library: false,
            requires_secure_context: false,
            confidence: 1.0,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub(crate) fn with_library(mut self) -> Self {
        self.requires_library = true;
        self
    }

    pub(crate) fn with_secure_context(mut self) -> Self {
        self.requires_secure_context = true;
        self
    }

    pub(crate) fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub(crate) fn host(&self) -> &Host {
        &self.host
    }

    pub(crate) fn lifecycle(&self) -> EngineLifecycle {
        lock(&self.state).lifecycle
    }

    /// Run the shared initialization around an adapter's `prepare` step.
    ///
    /// The decoder is prepared before the camera is opened so a slow library
    /// load never holds the camera.
    pub(crate) async fn initialize<F>(&self, surface: &str, tiers: Vec<Constraints>, prepare: F) -> Result<()>
    where
        F: Future<Output = Result<Prepared>> + Send,
    {
        {
            let mut state = lock(&self.state);
            match state.lifecycle {
                EngineLifecycle::Disposed => exn::bail!(ErrorKind::Disposed),
                lifecycle if lifecycle.is_live() && state.surface.as_deref() == Some(surface) => {
                    tracing::debug!(engine = %self.kind, surface, "already initialized");
                    return Ok(());
                },
                _ => {},
            }
            halt(&mut state, &*self.host.surfaces, EngineLifecycle::Initializing);
        }

        let started = Instant::now();
        match self.initialize_inner(surface, tiers, prepare).await {
            Ok(()) => {
                let mut state = lock(&self.state);
                state.lifecycle = EngineLifecycle::Ready;
                state.stats.initialization_time = started.elapsed();
                tracing::info!(engine = %self.kind, surface, elapsed = ?state.stats.initialization_time, "engine initialized");
                Ok(())
            },
            Err(err) => {
                let mut state = lock(&self.state);
                if state.lifecycle != EngineLifecycle::Disposed {
                    state.lifecycle = EngineLifecycle::Failed;
                }
                tracing::warn!(engine = %self.kind, surface, error = ?err, "engine initialization failed");
                Err(err)
            },
        }
    }

    async fn initialize_inner<F>(&self, surface: &str, tiers: Vec<Constraints>, prepare: F) -> Result<()>
    where
        F: Future<Output = Result<Prepared>> + Send,
    {
        let prepared = prepare.await?;
        let stream = self.bind(surface, &tiers).await?;

        let mut state = lock(&self.state);
        if state.lifecycle == EngineLifecycle::Disposed {
            stream.stop();
            self.host.surfaces.detach(surface);
            exn::bail!(ErrorKind::Disposed);
        }
        state.stats.library_load_time = prepared.library.as_ref().map_or(Duration::ZERO, |report| report.load_time);
        state.decoder = Some(prepared.decoder);
        state.formats = prepared.formats;
        state.library = prepared.library;
        state.stream = Some(stream);
        state.surface = Some(surface.to_string());
        state.tiers = tiers;
        Ok(())
    }

    /// Acquire a stream and attach it to `surface`.
    async fn bind(&self, surface: &str, tiers: &[Constraints]) -> Result<Box<dyn CameraStream>> {
        let stream = camera::acquire(&*self.host.camera, tiers, self.camera.acquire_timeout()).await?;
        if let Err(fault) = self.host.surfaces.attach(surface, &*stream) {
            stream.stop();
            exn::bail!(match fault {
                HostFault::NotFound => ErrorKind::SurfaceNotFound(surface.to_string()),
                other => ErrorKind::UnknownEngineError(other.to_string()),
            });
        }
        Ok(stream)
    }

    pub(crate) async fn start(&self, observer: Arc<dyn ScanObserver>) -> Result<()> {
        let rebind = {
            let state = lock(&self.state);
            match state.lifecycle {
                EngineLifecycle::Scanning => {
                    tracing::debug!(engine = %self.kind, "already scanning");
                    return Ok(());
                },
                EngineLifecycle::Disposed => exn::bail!(ErrorKind::Disposed),
                EngineLifecycle::Ready => None,
                EngineLifecycle::Stopped => match &state.surface {
                    Some(surface) => Some((surface.clone(), state.tiers.clone())),
                    None => exn::bail!(ErrorKind::NotInitialized),
                },
                EngineLifecycle::Uninitialized | EngineLifecycle::Initializing | EngineLifecycle::Failed => {
                    exn::bail!(ErrorKind::NotInitialized)
                },
            }
        };

        // The camera was released by `stop`; take it back before scanning.
        let stream = match rebind {
            Some((surface, tiers)) => Some(self.bind(&surface, &tiers).await?),
            None => None,
        };

        let token = CancellationToken::new();
        let scan = {
            let mut state = lock(&self.state);
            if let Some(stream) = stream {
                if state.lifecycle != EngineLifecycle::Stopped {
                    // Disposed or restarted while the camera was reacquired.
                    stream.stop();
                    return match state.lifecycle {
                        EngineLifecycle::Disposed => Err(exn::Exn::from(ErrorKind::Disposed)),
                        _ => Ok(()),
                    };
                }
                state.stream = Some(stream);
            }
            let (Some(decoder), Some(surface)) = (state.decoder.clone(), state.surface.clone()) else {
                exn::bail!(ErrorKind::NotInitialized);
            };
            state.lifecycle = EngineLifecycle::Scanning;
            state.scan = Some(token.clone());
            ScanLoop {
                kind: self.kind,
                confidence: self.confidence,
                settings: self.decode.clone(),
                decoder,
                surface,
                surfaces: Arc::clone(&self.host.surfaces),
                state: Arc::clone(&self.state),
                observer,
                token,
            }
        };
        tracing::info!(engine = %self.kind, "scanning started");
        tokio::spawn(scan.run());
        Ok(())
    }

    pub(crate) fn stop(&self) {
        let mut state = lock(&self.state);
        let next = match state.lifecycle {
            lifecycle if lifecycle.is_live() => EngineLifecycle::Stopped,
            lifecycle => lifecycle,
        };
        if state.stream.is_some() || state.scan.is_some() {
            tracing::debug!(engine = %self.kind, "stopping engine");
        }
        halt(&mut state, &*self.host.surfaces, next);
    }

    pub(crate) fn dispose(&self) {
        let mut state = lock(&self.state);
        halt(&mut state, &*self.host.surfaces, EngineLifecycle::Disposed);
        state.decoder = None;
        state.surface = None;
        state.tiers.clear();
        tracing::debug!(engine = %self.kind, "engine disposed");
    }

    pub(crate) fn describe(&self) -> EngineInfo {
        let state = lock(&self.state);
        EngineInfo {
            display_name: self.kind.display_name().to_string(),
            kind: self.kind,
            capabilities: EngineCapabilities {
                requires_library: self.requires_library,
                requires_secure_context: self.requires_secure_context,
                formats: state.formats.clone(),
                confidence: self.confidence,
            },
            lifecycle: state.lifecycle,
            stats: state.stats.clone(),
            library: state.library.clone(),
        }
    }
}

/// One running scan session.
struct ScanLoop {
    kind: EngineKind,
    confidence: f32,
    settings: DecodeSettings,
    decoder: Arc<dyn Decoder>,
    surface: String,
    surfaces: Arc<dyn Surfaces>,
    state: Arc<Mutex<State>>,
    observer: Arc<dyn ScanObserver>,
    token: CancellationToken,
}

impl ScanLoop {
    async fn run(self) {
        let started = Instant::now();
        let mut attempts = pin!(attempts(
            Arc::clone(&self.decoder),
            self.surface.clone(),
            self.settings.scan_interval(),
            self.token.clone()
        ));
        let mut consecutive_errors = 0;

        while let Some(outcome) = attempts.next().await {
            let mut state = lock(&self.state);
            // `stop` cancels under this lock, so a live token means the
            // session still owns the engine.
            if self.token.is_cancelled() {
                return;
            }
            state.stats.scans_attempted += 1;
            match outcome {
                Ok(Some(detection)) => {
                    let scan_duration = started.elapsed();
                    state.stats.record_success(scan_duration);
                    halt(&mut state, &*self.surfaces, EngineLifecycle::Stopped);
                    drop(state);
                    tracing::info!(engine = %self.kind, format = %detection.format, elapsed = ?scan_duration, "symbol decoded");
                    self.observer.on_success(ScanResult {
                        raw_value: detection.raw_value,
                        format: detection.format,
                        engine: self.kind,
                        scan_duration,
                        confidence: self.confidence,
                    });
                    return;
                },
                Ok(None) => consecutive_errors = 0,
                Err(fault) => {
                    consecutive_errors += 1;
                    tracing::trace!(engine = %self.kind, fault = %fault, consecutive_errors, "decode attempt failed");
                    if consecutive_errors >= self.settings.error_threshold {
                        halt(&mut state, &*self.surfaces, EngineLifecycle::Failed);
                        drop(state);
                        tracing::warn!(engine = %self.kind, consecutive_errors, "decode error threshold reached");
                        self.observer.on_error(ErrorKind::DecodeFailed);
                        return;
                    }
                },
            }
        }
    }
}

/// Sequential decode attempts, one per interval, until cancelled. A result
/// that arrives after cancellation is dropped.
fn attempts(
    decoder: Arc<dyn Decoder>,
    surface: String,
    interval: Duration,
    token: CancellationToken,
) -> impl Stream<Item = HostResult<Option<Detection>>> {
    stream! {
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = tokio::time::sleep(interval) => {},
            }
            let outcome = decoder.decode(&surface).await;
            if token.is_cancelled() {
                break;
            }
            yield outcome;
        }
    }
}
