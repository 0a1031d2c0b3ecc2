//! `changeExtension`: request a different extension at the destination
//!
//! Always passes. When the file's extension appears in the `extensions`
//! mapping, annotates the action with `new_extension`.

use serde_json::json;
use std::path::Path;

use super::archive::lower_extension;
use super::{Hook, HookContext, HookError, HookOutcome};

pub const NEW_EXTENSION_KEY: &str = "new_extension";

pub struct ChangeExtension;

impl Hook for ChangeExtension {
    fn name(&self) -> &'static str {
        "changeExtension"
    }

    fn description(&self) -> &'static str {
        "Renames the extension at the destination using an `extensions` mapping"
    }

    fn invoke(&self, path: &Path, context: &HookContext) -> Result<HookOutcome, HookError> {
        let Some(mapping) = context.get("extensions") else {
            log::debug!("changeExtension: no extensions mapping provided");
            return Ok(HookOutcome::Gate(true));
        };
        let mapping = mapping
            .as_object()
            .ok_or_else(|| HookError::InvalidContext("extensions must be a mapping".to_string()))?;

        let current = lower_extension(path);
        match mapping.get(&current).and_then(|v| v.as_str()) {
            Some(new_ext) => {
                log::info!("changeExtension: mapping {} -> {}", current, new_ext);
                Ok(HookOutcome::Value(json!({ "new_extension": new_ext })))
            }
            None => {
                log::debug!("changeExtension: no mapping for '{}'", current);
                Ok(HookOutcome::Gate(true))
            }
        }
    }
}
