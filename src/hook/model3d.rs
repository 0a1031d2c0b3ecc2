//! `is3DModel`: archive contains at least one 3D asset

use serde_json::{Value, json};
use std::collections::HashSet;
use std::path::Path;

use super::archive::{self, ArchiveKind};
use super::{Hook, HookContext, HookError, HookOutcome};

const DEFAULT_EXTENSIONS: &[&str] = &[
    "obj", "fbx", "stl", "3ds", "dae", "ply", "blend", "glb", "gltf", "usdz", "usd",
];

pub struct Is3DModel;

impl Hook for Is3DModel {
    fn name(&self) -> &'static str {
        "is3DModel"
    }

    fn description(&self) -> &'static str {
        "Archive contains a 3D model file"
    }

    fn defaults(&self) -> HookContext {
        let mut context = HookContext::new();
        context.insert("extensions".to_string(), json!(DEFAULT_EXTENSIONS));
        context
    }

    fn invoke(&self, path: &Path, context: &HookContext) -> Result<HookOutcome, HookError> {
        if !path.exists() {
            log::debug!("is3DModel: {} does not exist", path.display());
            return Ok(HookOutcome::Gate(false));
        }

        let extensions = extension_set(context)?;

        match ArchiveKind::from_path(path) {
            Some(ArchiveKind::Zip) => match archive::zip_file_names(path) {
                Ok(entries) => Ok(HookOutcome::Gate(
                    entries
                        .iter()
                        .any(|name| extensions.contains(&archive::lower_extension(Path::new(name)))),
                )),
                Err(HookError::Archive(e)) => {
                    log::debug!("is3DModel: invalid zip {}: {}", path.display(), e);
                    Ok(HookOutcome::Gate(false))
                }
                Err(e) => Err(e),
            },
            Some(ArchiveKind::Rar) => {
                log::debug!("is3DModel: rar archives are not supported");
                Ok(HookOutcome::Gate(false))
            }
            None => {
                log::debug!("is3DModel: unsupported archive type {}", path.display());
                Ok(HookOutcome::Gate(false))
            }
        }
    }
}

/// Normalize `extensions` (with or without leading dots) to lowercase bare extensions
fn extension_set(context: &HookContext) -> Result<HashSet<String>, HookError> {
    match context.get("extensions") {
        Some(Value::Array(items)) if !items.is_empty() => Ok(items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim_start_matches('.').to_lowercase())
            .collect()),
        Some(Value::Array(_)) | None => Ok(DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()),
        Some(other) => Err(HookError::InvalidContext(format!(
            "extensions must be a list, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::super::archive::testing::write_zip;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_detects_model_in_zip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("ship.zip");
        write_zip(&path, &[("ship/hull.STL", b"solid"), ("ship/readme.txt", b"hi")]);

        let outcome = Is3DModel.invoke(&path, &Is3DModel.defaults()).unwrap();
        assert_eq!(outcome, HookOutcome::Gate(true));
    }

    #[test]
    fn test_custom_extensions() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("ship.zip");
        write_zip(&path, &[("ship/hull.stl", b"solid")]);

        let mut context = HookContext::new();
        context.insert("extensions".to_string(), json!([".step"]));
        let outcome = Is3DModel.invoke(&path, &context).unwrap();
        assert_eq!(outcome, HookOutcome::Gate(false));
    }

    #[test]
    fn test_invalid_extensions_context() {
        let mut context = HookContext::new();
        context.insert("extensions".to_string(), json!("stl"));
        assert!(matches!(extension_set(&context), Err(HookError::InvalidContext(_))));
    }

    #[test]
    fn test_non_archive_fails() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("model.stl");
        std::fs::write(&path, b"solid").unwrap();

        let outcome = Is3DModel.invoke(&path, &HookContext::new()).unwrap();
        assert_eq!(outcome, HookOutcome::Gate(false));
    }
}
