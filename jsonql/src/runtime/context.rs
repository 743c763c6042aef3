// Mutable execution state threaded through every evaluation call

use crate::config::{ConfigProvider, EngineConfig, MapConfigProvider};
use crate::runtime::rng::RngStore;
use crate::runtime::spill::SpillSettings;
use crate::runtime::values::Value;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// Execution context for one logical evaluation at a time.
///
/// Variable values live in their slots, not here. The context carries the
/// ambient resources nodes need: the configuration provider, keyed random
/// state, spill settings, and the per-statement output store.
pub struct Context {
    provider: Option<Rc<dyn ConfigProvider>>,
    rngs: RngStore,
    spill: SpillSettings,
    outputs: IndexMap<String, Vec<Value>>,
    reset_hooks: Vec<Box<dyn FnMut()>>,
    statements: u64,
}

impl Context {
    /// A context with no configuration provider and default settings.
    pub fn new() -> Self {
        Context {
            provider: None,
            rngs: RngStore::default(),
            spill: SpillSettings::default(),
            outputs: IndexMap::new(),
            reset_hooks: Vec::new(),
            statements: 0,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let mut ctx = Context::new();
        ctx.rngs = RngStore::new(config.engine.rng_seed);
        ctx.spill = config.spill_settings();
        ctx.provider = Some(Rc::new(MapConfigProvider::new(config.conf.clone())));
        ctx
    }

    pub fn with_provider(mut self, provider: Rc<dyn ConfigProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn set_provider(&mut self, provider: Option<Rc<dyn ConfigProvider>>) {
        self.provider = provider;
    }

    /// `None` when no provider is available.
    pub fn config_provider(&self) -> Option<&dyn ConfigProvider> {
        self.provider.as_deref()
    }

    pub fn rngs(&self) -> &RngStore {
        &self.rngs
    }

    pub fn rngs_mut(&mut self) -> &mut RngStore {
        &mut self.rngs
    }

    pub fn spill_settings(&self) -> &SpillSettings {
        &self.spill
    }

    pub fn set_spill_settings(&mut self, settings: SpillSettings) {
        self.spill = settings;
    }

    pub fn write_output(&mut self, target: &str, value: Value) {
        self.outputs.entry(target.to_string()).or_default().push(value);
    }

    pub fn output(&self, target: &str) -> Option<&[Value]> {
        self.outputs.get(target).map(Vec::as_slice)
    }

    pub fn outputs(&self) -> &IndexMap<String, Vec<Value>> {
        &self.outputs
    }

    /// Register a hook run on every [`Context::reset`].
    pub fn on_reset(&mut self, hook: Box<dyn FnMut()>) {
        self.reset_hooks.push(hook);
    }

    /// Number of resets so far, i.e. statements started.
    pub fn statements(&self) -> u64 {
        self.statements
    }

    /// Clear per-statement side effects before the next top-level statement.
    /// Random state survives resets.
    pub fn reset(&mut self) {
        self.outputs.clear();
        for hook in self.reset_hooks.iter_mut() {
            hook();
        }
        self.statements += 1;
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("has_provider", &self.provider.is_some())
            .field("rngs", &self.rngs)
            .field("spill", &self.spill)
            .field("outputs", &self.outputs)
            .field("statements", &self.statements)
            .finish()
    }
}
