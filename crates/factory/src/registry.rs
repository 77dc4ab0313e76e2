use megascan_engine::host::Host;
use megascan_engine::{EngineHandle, EngineKind, EngineSettings, NativeEngine, ScriptEngine, WasmEngine};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds a fresh engine instance.
pub type Constructor = Arc<dyn Fn(&Host, &EngineSettings) -> EngineHandle + Send + Sync>;

/// Maps each engine kind to the constructor the orchestrator uses for it.
#[derive(Clone, Default)]
pub struct Registry {
    constructors: BTreeMap<EngineKind, Constructor>,
}

impl Registry {
    /// The three built-in adapters.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register(EngineKind::Native, |host, settings| Arc::new(NativeEngine::new(host.clone(), settings)));
        registry.register(EngineKind::Wasm, |host, settings| Arc::new(WasmEngine::new(host.clone(), settings)));
        registry.register(EngineKind::Script, |host, settings| Arc::new(ScriptEngine::new(host.clone(), settings)));
        registry
    }

    /// Register `constructor` for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: EngineKind, constructor: F) -> &mut Self
    where
        F: Fn(&Host, &EngineSettings) -> EngineHandle + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Arc::new(constructor));
        self
    }

    pub fn contains(&self, kind: EngineKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    /// Registered kinds, in priority order.
    pub fn kinds(&self) -> impl Iterator<Item = EngineKind> + '_ {
        self.constructors.keys().copied()
    }

    pub(crate) fn create(&self, kind: EngineKind, host: &Host, settings: &EngineSettings) -> Option<EngineHandle> {
        self.constructors.get(&kind).map(|constructor| constructor(host, settings))
    }
}
