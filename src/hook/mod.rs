//! Hook capability table
//!
//! Hooks are named predicates/extractors that filters can reference by name.
//! The table is populated once at startup; configuration referencing a name
//! that is not in the table is rejected at load time.

use indexmap::IndexMap;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub mod archive;
pub mod change_extension;
pub mod featured_image;
pub mod magazine;
pub mod model3d;

/// Free-form parameters handed to a hook from a filter definition
pub type HookContext = serde_json::Map<String, Value>;

/// What a hook produced for one file
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    /// Plain pass/fail
    Gate(bool),
    /// Extracted data; passes iff truthy
    Value(Value),
}

impl HookOutcome {
    pub fn passes(&self) -> bool {
        match self {
            HookOutcome::Gate(pass) => *pass,
            HookOutcome::Value(value) => is_truthy(value),
        }
    }

    /// Data to carry forward into the resolved action.
    ///
    /// Object values contribute their entries; any other truthy value is
    /// stored under the hook's name.
    pub fn annotations(&self, hook_name: &str) -> HookContext {
        match self {
            HookOutcome::Gate(_) => HookContext::new(),
            HookOutcome::Value(Value::Object(map)) => map.clone(),
            HookOutcome::Value(value) if is_truthy(value) => {
                let mut map = HookContext::new();
                map.insert(hook_name.to_string(), value.clone());
                map
            }
            HookOutcome::Value(_) => HookContext::new(),
        }
    }
}

/// JSON truthiness: null, false, zero and empty containers are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Failure inside a hook implementation
#[derive(Debug, Error)]
pub enum HookError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("invalid context: {0}")]
    InvalidContext(String),
}

/// Hook failure observed while matching a file; the filter counts as failed
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("hook '{hook}' is not registered")]
    UnknownHook { hook: String },

    #[error("hook '{hook}' failed for {}: {source}", path.display())]
    HookFailed {
        hook: String,
        path: PathBuf,
        #[source]
        source: HookError,
    },

    #[error("hook '{hook}' panicked for {}", path.display())]
    HookPanicked { hook: String, path: PathBuf },
}

/// A named filter capability
pub trait Hook: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Context values used when a filter does not supply them
    fn defaults(&self) -> HookContext {
        HookContext::new()
    }

    fn invoke(&self, path: &Path, context: &HookContext) -> Result<HookOutcome, HookError>;
}

/// Name → hook mapping, in registration order
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: IndexMap<String, Arc<dyn Hook>>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every hook shipped in this crate
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(magazine::IsMagazine));
        registry.register(Arc::new(model3d::Is3DModel));
        registry.register(Arc::new(featured_image::GetFeaturedImage::default()));
        registry.register(Arc::new(change_extension::ChangeExtension));
        registry
    }

    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        let name = hook.name().to_string();
        if self.hooks.insert(name.clone(), hook).is_some() {
            log::warn!("Hook '{}' registered twice; keeping the latest", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Hook>> {
        self.hooks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Hook>> {
        self.hooks.values()
    }

    /// Invoke `name` with `context` merged over the hook's defaults.
    ///
    /// Errors and panics inside the hook are reported as `ResolutionError`
    /// so the caller can fail the filter without tearing down the daemon.
    pub fn invoke(&self, name: &str, path: &Path, context: &HookContext) -> Result<HookOutcome, ResolutionError> {
        let hook = self.get(name).ok_or_else(|| ResolutionError::UnknownHook {
            hook: name.to_string(),
        })?;

        let mut merged = hook.defaults();
        for (key, value) in context {
            merged.insert(key.clone(), value.clone());
        }

        match panic::catch_unwind(AssertUnwindSafe(|| hook.invoke(path, &merged))) {
            Ok(Ok(outcome)) => {
                log::debug!("Hook '{}' on {}: {:?}", name, path.display(), outcome);
                Ok(outcome)
            }
            Ok(Err(source)) => Err(ResolutionError::HookFailed {
                hook: name.to_string(),
                path: path.to_path_buf(),
                source,
            }),
            Err(_) => Err(ResolutionError::HookPanicked {
                hook: name.to_string(),
                path: path.to_path_buf(),
            }),
        }
    }
}
