//! In-memory host and engine doubles for testing.
//!
//! Everything here uses interior mutability so a test can keep a handle to a
//! mock, pass a [`Host`] built from it into the code under test, and then
//! script behaviour or inspect recorded calls through the same handle.
//!
//! The mocks panic on poisoned locks. They are intended for tests, where a
//! panic is the right outcome.

use crate::error::{ErrorKind, Result};
use crate::host::{
    Camera, CameraStream, ConnectionInfo, Constraints, Decoder, Detection, Host, HostFault, HostResult,
    NativeDetector, PermissionState, Platform, ScriptHost, Surfaces, VideoDevice,
};
use crate::{
    EngineCapabilities, EngineInfo, EngineKind, EngineLifecycle, EngineStats, PREFERRED_FORMATS, ScanEngine,
    ScanObserver, ScanOptions, ScanResult,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

struct PlatformState {
    secure: bool,
    hostname: String,
    wasm: HostResult<bool>,
    cores: Option<u32>,
    memory: Option<f64>,
    connection: ConnectionInfo,
    time_zone: Option<String>,
    user_agent: String,
    platform: String,
    touch_points: u32,
    screen_width: u32,
}

/// A desktop Linux machine on a fast connection, by default.
pub struct MockPlatform {
    state: Mutex<PlatformState>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self {
            state: Mutex::new(PlatformState {
                secure: true,
                hostname: "scanner.example".into(),
                wasm: Ok(true),
                cores: Some(8),
                memory: Some(8.0),
                connection: ConnectionInfo::default(),
                time_zone: None,
                user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/126.0 Safari/537.36".into(),
                platform: "Linux x86_64".into(),
                touch_points: 0,
                screen_width: 1920,
            }),
        }
    }
}

impl MockPlatform {
    fn with<R>(&self, f: impl FnOnce(&mut PlatformState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_secure(&self, secure: bool) {
        self.with(|s| s.secure = secure);
    }

    pub fn set_hostname(&self, hostname: impl Into<String>) {
        let hostname = hostname.into();
        self.with(|s| s.hostname = hostname);
    }

    pub fn set_wasm(&self, wasm: HostResult<bool>) {
        self.with(|s| s.wasm = wasm);
    }

    pub fn set_hardware(&self, cores: Option<u32>, memory: Option<f64>) {
        self.with(|s| {
            s.cores = cores;
            s.memory = memory;
        });
    }

    pub fn set_connection(&self, connection: ConnectionInfo) {
        self.with(|s| s.connection = connection);
    }

    pub fn set_time_zone(&self, zone: impl Into<String>) {
        let zone = zone.into();
        self.with(|s| s.time_zone = Some(zone));
    }

    /// Switch to an Android phone with a touch screen.
    pub fn set_mobile(&self) {
        self.with(|s| {
            s.user_agent = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 Mobile Safari/537.36".into();
            s.platform = "Linux armv8l".into();
            s.touch_points = 5;
            s.screen_width = 412;
        });
    }

    pub fn set_touch(&self, touch_points: u32, screen_width: u32) {
        self.with(|s| {
            s.touch_points = touch_points;
            s.screen_width = screen_width;
        });
    }
}

impl Platform for MockPlatform {
    fn is_secure_context(&self) -> bool {
        self.with(|s| s.secure)
    }

    fn hostname(&self) -> String {
        self.with(|s| s.hostname.clone())
    }

    fn probe_wasm(&self) -> HostResult<bool> {
        self.with(|s| s.wasm.clone())
    }

    fn hardware_concurrency(&self) -> Option<u32> {
        self.with(|s| s.cores)
    }

    fn device_memory(&self) -> Option<f64> {
        self.with(|s| s.memory)
    }

    fn connection(&self) -> ConnectionInfo {
        self.with(|s| s.connection.clone())
    }

    fn time_zone(&self) -> Option<String> {
        self.with(|s| s.time_zone.clone())
    }

    fn user_agent(&self) -> String {
        self.with(|s| s.user_agent.clone())
    }

    fn platform(&self) -> String {
        self.with(|s| s.platform.clone())
    }

    fn max_touch_points(&self) -> u32 {
        self.with(|s| s.touch_points)
    }

    fn screen_width(&self) -> u32 {
        self.with(|s| s.screen_width)
    }
}

/// What the next [`Camera::open`] call does.
#[derive(Debug, Clone)]
pub enum OpenOutcome {
    Open,
    Fail(HostFault),
    /// Never resolves; exercises acquisition timeouts.
    Hang,
}

#[derive(Default)]
struct StreamLedger {
    active: AtomicUsize,
    stops: AtomicUsize,
}

struct MockStream {
    id: String,
    stopped: AtomicBool,
    ledger: Arc<StreamLedger>,
}

impl CameraStream for MockStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.ledger.stops.fetch_add(1, Ordering::SeqCst);
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.ledger.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

struct CameraState {
    supported: bool,
    devices: HostResult<Vec<VideoDevice>>,
    permission: HostResult<PermissionState>,
    outcomes: VecDeque<OpenOutcome>,
    opened: Vec<Constraints>,
}

/// A camera that opens successfully unless told otherwise.
///
/// Outcomes queued with [`with_open_outcomes`](Self::with_open_outcomes) are
/// consumed one per `open` call; once the queue is empty every call opens.
pub struct MockCamera {
    state: Mutex<CameraState>,
    ledger: Arc<StreamLedger>,
}

impl Default for MockCamera {
    fn default() -> Self {
        Self {
            state: Mutex::new(CameraState {
                supported: true,
                devices: Ok(vec![VideoDevice { id: "camera-0".into(), label: String::new() }]),
                permission: Ok(PermissionState::Prompt),
                outcomes: VecDeque::new(),
                opened: Vec::new(),
            }),
            ledger: Arc::new(StreamLedger::default()),
        }
    }
}

impl MockCamera {
    pub fn with_open_outcomes(self, outcomes: impl IntoIterator<Item = OpenOutcome>) -> Self {
        self.push_outcomes(outcomes);
        self
    }

    pub fn push_outcomes(&self, outcomes: impl IntoIterator<Item = OpenOutcome>) {
        self.state.lock().unwrap().outcomes.extend(outcomes);
    }

    pub fn set_supported(&self, supported: bool) {
        self.state.lock().unwrap().supported = supported;
    }

    pub fn set_devices(&self, devices: HostResult<Vec<VideoDevice>>) {
        self.state.lock().unwrap().devices = devices;
    }

    pub fn set_permission(&self, permission: HostResult<PermissionState>) {
        self.state.lock().unwrap().permission = permission;
    }

    /// Constraints of every `open` call, in order.
    pub fn opened(&self) -> Vec<Constraints> {
        self.state.lock().unwrap().opened.clone()
    }

    /// Streams opened and not yet stopped.
    pub fn active_streams(&self) -> usize {
        self.ledger.active.load(Ordering::SeqCst)
    }

    /// Total `stop` calls across every stream.
    pub fn stops(&self) -> usize {
        self.ledger.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Camera for MockCamera {
    fn is_supported(&self) -> bool {
        self.state.lock().unwrap().supported
    }

    async fn devices(&self) -> HostResult<Vec<VideoDevice>> {
        self.state.lock().unwrap().devices.clone()
    }

    async fn query_permission(&self) -> HostResult<PermissionState> {
        self.state.lock().unwrap().permission.clone()
    }

    async fn open(&self, constraints: &Constraints) -> HostResult<Box<dyn CameraStream>> {
        let (outcome, index) = {
            let mut state = self.state.lock().unwrap();
            state.opened.push(constraints.clone());
            (state.outcomes.pop_front().unwrap_or(OpenOutcome::Open), state.opened.len())
        };
        match outcome {
            OpenOutcome::Open => {
                self.ledger.active.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(MockStream {
                    id: format!("stream-{index}"),
                    stopped: AtomicBool::new(false),
                    ledger: Arc::clone(&self.ledger),
                }))
            },
            OpenOutcome::Fail(fault) => Err(fault),
            OpenOutcome::Hang => futures::future::pending().await,
        }
    }
}

/// Surfaces that exist unless [`remove`](Self::remove)d.
#[derive(Default)]
pub struct MockSurfaces {
    missing: Mutex<HashSet<String>>,
    attached: Mutex<Vec<String>>,
    detached: Mutex<Vec<String>>,
}

impl MockSurfaces {
    pub fn remove(&self, surface: &str) {
        self.missing.lock().unwrap().insert(surface.to_string());
    }

    pub fn attached(&self) -> Vec<String> {
        self.attached.lock().unwrap().clone()
    }

    pub fn detached(&self) -> Vec<String> {
        self.detached.lock().unwrap().clone()
    }
}

impl Surfaces for MockSurfaces {
    fn attach(&self, surface: &str, _stream: &dyn CameraStream) -> HostResult<()> {
        if self.missing.lock().unwrap().contains(surface) {
            return Err(HostFault::NotFound);
        }
        self.attached.lock().unwrap().push(surface.to_string());
        Ok(())
    }

    fn detach(&self, surface: &str) {
        self.detached.lock().unwrap().push(surface.to_string());
    }
}

/// One scripted decode attempt.
#[derive(Debug, Clone)]
pub enum DecodeStep {
    /// No symbol in this frame.
    Empty,
    /// A transient decode error.
    Fail,
    Found(Detection),
    /// Take `Duration` before resolving to the inner step.
    Slow(Duration, Box<DecodeStep>),
}

/// A decoder that replays scripted steps, then finds nothing forever.
#[derive(Default)]
pub struct MockDecoder {
    steps: Mutex<VecDeque<DecodeStep>>,
    calls: AtomicUsize,
}

impl MockDecoder {
    pub fn script(&self, steps: impl IntoIterator<Item = DecodeStep>) {
        self.steps.lock().unwrap().extend(steps);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Decoder for MockDecoder {
    async fn decode(&self, _surface: &str) -> HostResult<Option<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut step = self.steps.lock().unwrap().pop_front().unwrap_or(DecodeStep::Empty);
        loop {
            match step {
                DecodeStep::Empty => return Ok(None),
                DecodeStep::Fail => return Err(HostFault::Other("decode error".into())),
                DecodeStep::Found(detection) => return Ok(Some(detection)),
                DecodeStep::Slow(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    step = *inner;
                },
            }
        }
    }
}

/// A native detector supporting every preferred format, by default.
pub struct MockNativeDetector {
    formats: Mutex<HostResult<Vec<String>>>,
    create_fault: Mutex<Option<HostFault>>,
    created: Mutex<Vec<Vec<String>>>,
    decoder: Arc<MockDecoder>,
}

impl MockNativeDetector {
    pub fn new(decoder: Arc<MockDecoder>) -> Self {
        Self {
            formats: Mutex::new(Ok(PREFERRED_FORMATS.iter().map(|f| f.to_string()).collect())),
            create_fault: Mutex::new(None),
            created: Mutex::new(Vec::new()),
            decoder,
        }
    }

    pub fn set_formats<S: Into<String>>(&self, formats: impl IntoIterator<Item = S>) {
        *self.formats.lock().unwrap() = Ok(formats.into_iter().map(Into::into).collect());
    }

    pub fn fail_formats(&self, fault: HostFault) {
        *self.formats.lock().unwrap() = Err(fault);
    }

    pub fn fail_create(&self, fault: HostFault) {
        *self.create_fault.lock().unwrap() = Some(fault);
    }

    /// Format lists passed to every `create` call.
    pub fn created(&self) -> Vec<Vec<String>> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl NativeDetector for MockNativeDetector {
    async fn supported_formats(&self) -> HostResult<Vec<String>> {
        self.formats.lock().unwrap().clone()
    }

    fn create(&self, formats: &[String]) -> HostResult<Arc<dyn Decoder>> {
        if let Some(fault) = self.create_fault.lock().unwrap().clone() {
            return Err(fault);
        }
        self.created.lock().unwrap().push(formats.to_vec());
        Ok(Arc::clone(&self.decoder) as Arc<dyn Decoder>)
    }
}

/// How an injected script behaves.
#[derive(Debug, Clone)]
pub enum ScriptBehavior {
    /// Loads and defines the library's global symbol.
    Load,
    Fail(HostFault),
    /// Never finishes loading.
    Hang,
    /// Loads, but the global symbol never appears.
    LoadWithoutSymbol,
}

/// Script host whose scripts load by default.
///
/// A successful load defines the configured symbol, or every symbol when
/// none was configured.
pub struct MockScriptHost {
    provides: Option<String>,
    loaded: AtomicBool,
    default_behavior: Mutex<ScriptBehavior>,
    behaviors: Mutex<HashMap<String, ScriptBehavior>>,
    globals: Mutex<HashSet<String>>,
    injected: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    instantiate_fault: Mutex<Option<HostFault>>,
    decoder: Arc<MockDecoder>,
}

impl Default for MockScriptHost {
    fn default() -> Self {
        Self::with_decoder(Arc::new(MockDecoder::default()))
    }
}

impl MockScriptHost {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self { provides: Some(symbol.into()), ..Self::default() }
    }

    pub fn with_decoder(decoder: Arc<MockDecoder>) -> Self {
        Self {
            provides: None,
            loaded: AtomicBool::new(false),
            default_behavior: Mutex::new(ScriptBehavior::Load),
            behaviors: Mutex::new(HashMap::new()),
            globals: Mutex::new(HashSet::new()),
            injected: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            instantiate_fault: Mutex::new(None),
            decoder,
        }
    }

    pub fn with_behavior(self, url: &str, behavior: ScriptBehavior) -> Self {
        self.set_behavior(url, behavior);
        self
    }

    /// Define `symbol` up front, as if the library had been bundled.
    pub fn with_global(self, symbol: &str) -> Self {
        self.globals.lock().unwrap().insert(symbol.to_string());
        self
    }

    pub fn set_behavior(&self, url: &str, behavior: ScriptBehavior) {
        self.behaviors.lock().unwrap().insert(url.to_string(), behavior);
    }

    pub fn set_default_behavior(&self, behavior: ScriptBehavior) {
        *self.default_behavior.lock().unwrap() = behavior;
    }

    pub fn fail_instantiate(&self, fault: HostFault) {
        *self.instantiate_fault.lock().unwrap() = Some(fault);
    }

    pub fn injected(&self) -> Vec<String> {
        self.injected.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptHost for MockScriptHost {
    async fn inject(&self, url: &str) -> HostResult<()> {
        self.injected.lock().unwrap().push(url.to_string());
        let behavior = match self.behaviors.lock().unwrap().get(url) {
            Some(behavior) => behavior.clone(),
            None => self.default_behavior.lock().unwrap().clone(),
        };
        match behavior {
            ScriptBehavior::Load => {
                self.loaded.store(true, Ordering::SeqCst);
                Ok(())
            },
            ScriptBehavior::LoadWithoutSymbol => Ok(()),
            ScriptBehavior::Fail(fault) => Err(fault),
            ScriptBehavior::Hang => futures::future::pending().await,
        }
    }

    fn remove(&self, url: &str) {
        self.removed.lock().unwrap().push(url.to_string());
    }

    fn has_global(&self, symbol: &str) -> bool {
        if self.globals.lock().unwrap().contains(symbol) {
            return true;
        }
        self.loaded.load(Ordering::SeqCst) && self.provides.as_deref().is_none_or(|provided| provided == symbol)
    }

    fn instantiate(&self, _symbol: &str, _formats: &[String]) -> HostResult<Arc<dyn Decoder>> {
        if let Some(fault) = self.instantiate_fault.lock().unwrap().clone() {
            return Err(fault);
        }
        Ok(Arc::clone(&self.decoder) as Arc<dyn Decoder>)
    }
}

/// Every host facility mocked, sharing one decoder.
pub struct MockHost {
    pub platform: Arc<MockPlatform>,
    pub camera: Arc<MockCamera>,
    pub surfaces: Arc<MockSurfaces>,
    pub scripts: Arc<MockScriptHost>,
    pub native: Arc<MockNativeDetector>,
    pub decoder: Arc<MockDecoder>,
    native_enabled: bool,
}

impl Default for MockHost {
    fn default() -> Self {
        let decoder = Arc::new(MockDecoder::default());
        Self {
            platform: Arc::new(MockPlatform::default()),
            camera: Arc::new(MockCamera::default()),
            surfaces: Arc::new(MockSurfaces::default()),
            scripts: Arc::new(MockScriptHost::with_decoder(Arc::clone(&decoder))),
            native: Arc::new(MockNativeDetector::new(Arc::clone(&decoder))),
            decoder,
            native_enabled: true,
        }
    }
}

impl MockHost {
    pub fn without_native(mut self) -> Self {
        self.native_enabled = false;
        self
    }

    pub fn with_native_formats<S: Into<String>>(self, formats: impl IntoIterator<Item = S>) -> Self {
        self.native.set_formats(formats);
        self
    }

    pub fn with_devices(self, devices: impl IntoIterator<Item = VideoDevice>) -> Self {
        self.camera.set_devices(Ok(devices.into_iter().collect()));
        self
    }

    /// Successful script loads define only `symbol`.
    pub fn with_script_symbol(mut self, symbol: &str) -> Self {
        let scripts = MockScriptHost { provides: Some(symbol.to_string()), ..MockScriptHost::with_decoder(Arc::clone(&self.decoder)) };
        self.scripts = Arc::new(scripts);
        self
    }

    pub fn host(&self) -> Host {
        Host {
            platform: Arc::clone(&self.platform) as Arc<dyn Platform>,
            camera: Arc::clone(&self.camera) as Arc<dyn Camera>,
            surfaces: Arc::clone(&self.surfaces) as Arc<dyn Surfaces>,
            scripts: Arc::clone(&self.scripts) as Arc<dyn ScriptHost>,
            native: self.native_enabled.then(|| Arc::clone(&self.native) as Arc<dyn NativeDetector>),
        }
    }
}

/// Observer that records every outcome and wakes [`wait`](Self::wait)ers.
#[derive(Default)]
pub struct RecordingObserver {
    successes: Mutex<Vec<ScanResult>>,
    errors: Mutex<Vec<ErrorKind>>,
    notify: Notify,
}

impl RecordingObserver {
    /// Resolve once an outcome was recorded.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    pub fn successes(&self) -> Vec<ScanResult> {
        self.successes.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<ErrorKind> {
        self.errors.lock().unwrap().clone()
    }
}

impl ScanObserver for RecordingObserver {
    fn on_success(&self, result: ScanResult) {
        self.successes.lock().unwrap().push(result);
        self.notify.notify_one();
    }

    fn on_error(&self, error: ErrorKind) {
        self.errors.lock().unwrap().push(error);
        self.notify.notify_one();
    }
}

/// Shared, ordered record of calls made on [`MockEngine`]s.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn record(&self, kind: EngineKind, operation: &str) {
        self.0.lock().unwrap().push(format!("{kind}:{operation}"));
    }

    /// Entries formatted as `engine:operation`, e.g. `wasm:initialize`.
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Scripted engine for orchestration tests.
///
/// Available and successfully initializing unless told otherwise.
pub struct MockEngine {
    kind: EngineKind,
    available: AtomicBool,
    init_failures: Mutex<VecDeque<ErrorKind>>,
    dispose_failure: Mutex<Option<ErrorKind>>,
    lifecycle: Mutex<EngineLifecycle>,
    observer: Mutex<Option<Arc<dyn ScanObserver>>>,
    journal: Journal,
}

impl MockEngine {
    pub fn new(kind: EngineKind) -> Self {
        Self {
            kind,
            available: AtomicBool::new(true),
            init_failures: Mutex::new(VecDeque::new()),
            dispose_failure: Mutex::new(None),
            lifecycle: Mutex::new(EngineLifecycle::Uninitialized),
            observer: Mutex::new(None),
            journal: Journal::default(),
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn unavailable(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    /// Fail the next `initialize` call with `error`.
    pub fn failing_initialize(self, error: ErrorKind) -> Self {
        self.init_failures.lock().unwrap().push_back(error);
        self
    }

    pub fn failing_dispose(self, error: ErrorKind) -> Self {
        *self.dispose_failure.lock().unwrap() = Some(error);
        self
    }

    /// Report a decode to the observer of the running session.
    pub fn emit_success(&self, raw_value: &str) {
        let observer = self.finish(EngineLifecycle::Stopped);
        if let Some(observer) = observer {
            observer.on_success(ScanResult {
                raw_value: raw_value.to_string(),
                format: "ean_13".to_string(),
                engine: self.kind,
                scan_duration: Duration::from_millis(250),
                confidence: 1.0,
            });
        }
    }

    /// Report a halted decode loop to the observer of the running session.
    pub fn emit_error(&self, error: ErrorKind) {
        if let Some(observer) = self.finish(EngineLifecycle::Failed) {
            observer.on_error(error);
        }
    }

    fn finish(&self, lifecycle: EngineLifecycle) -> Option<Arc<dyn ScanObserver>> {
        *self.lifecycle.lock().unwrap() = lifecycle;
        self.observer.lock().unwrap().take()
    }
}

#[async_trait]
impl ScanEngine for MockEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    async fn check_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn initialize(&self, _surface: &str, _options: &ScanOptions) -> Result<()> {
        self.journal.record(self.kind, "initialize");
        let mut lifecycle = self.lifecycle.lock().unwrap();
        if *lifecycle == EngineLifecycle::Disposed {
            exn::bail!(ErrorKind::Disposed);
        }
        if let Some(error) = self.init_failures.lock().unwrap().pop_front() {
            *lifecycle = EngineLifecycle::Failed;
            exn::bail!(error);
        }
        if !lifecycle.is_live() {
            *lifecycle = EngineLifecycle::Ready;
        }
        Ok(())
    }

    async fn start(&self, observer: Arc<dyn ScanObserver>) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        match *lifecycle {
            EngineLifecycle::Scanning => return Ok(()),
            EngineLifecycle::Disposed => exn::bail!(ErrorKind::Disposed),
            EngineLifecycle::Ready | EngineLifecycle::Stopped => {},
            _ => exn::bail!(ErrorKind::NotInitialized),
        }
        self.journal.record(self.kind, "start");
        *lifecycle = EngineLifecycle::Scanning;
        *self.observer.lock().unwrap() = Some(observer);
        Ok(())
    }

    async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        if lifecycle.is_live() {
            self.journal.record(self.kind, "stop");
            *lifecycle = EngineLifecycle::Stopped;
        }
        self.observer.lock().unwrap().take();
    }

    async fn dispose(&self) -> Result<()> {
        self.journal.record(self.kind, "dispose");
        *self.lifecycle.lock().unwrap() = EngineLifecycle::Disposed;
        self.observer.lock().unwrap().take();
        match self.dispose_failure.lock().unwrap().take() {
            Some(error) => Err(exn::Exn::from(error)),
            None => Ok(()),
        }
    }

    fn describe(&self) -> EngineInfo {
        EngineInfo {
            display_name: self.kind.display_name().to_string(),
            kind: self.kind,
            capabilities: EngineCapabilities::default(),
            lifecycle: *self.lifecycle.lock().unwrap(),
            stats: EngineStats::default(),
            library: None,
        }
    }

    fn lifecycle(&self) -> EngineLifecycle {
        *self.lifecycle.lock().unwrap()
    }
}
