//! Action execution
//!
//! The dispatcher picks the executor for an action's type, runs it and
//! removes the original file afterwards unless the action keeps it.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::hook::change_extension::NEW_EXTENSION_KEY;
use crate::rules::Action;

pub mod executor;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("source file {} does not exist", .0.display())]
    MissingSource(PathBuf),

    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no executor registered for action type '{0}'")]
    NoExecutor(String),
}

/// What an executor did with the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorOutcome {
    Transferred { destination: String },
    /// Destination existed and the action says not to overwrite
    AlreadyExists { destination: String },
    /// Nothing was transferred; the original always stays
    Simulated { destination: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub action: String,
    pub executor: ExecutorOutcome,
    pub original_removed: bool,
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Action type this executor handles
    fn kind(&self) -> &'static str;

    async fn execute(&self, action: &Action, path: &Path, destination_name: &str)
    -> Result<ExecutorOutcome, ExecutionError>;
}

pub struct Dispatcher {
    executors: HashMap<&'static str, Arc<dyn Executor>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Dispatcher {
    pub fn empty() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut dispatcher = Self::empty();
        dispatcher.register(Arc::new(executor::ScpExecutor::default()));
        dispatcher.register(Arc::new(executor::CopyExecutor));
        dispatcher.register(Arc::new(executor::DummyExecutor));
        dispatcher
    }

    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        self.executors.insert(executor.kind(), executor);
    }

    pub async fn dispatch(&self, action: &Action, path: &Path) -> Result<DispatchOutcome, ExecutionError> {
        if !path.exists() {
            return Err(ExecutionError::MissingSource(path.to_path_buf()));
        }

        let kind = action.kind.type_name();
        let executor = self
            .executors
            .get(kind)
            .ok_or_else(|| ExecutionError::NoExecutor(kind.to_string()))?;

        let destination_name = destination_name(action, path, Local::now().date_naive());
        log::info!(
            "Executing '{}' ({}) for {} as {}",
            action.name,
            kind,
            path.display(),
            destination_name
        );

        let outcome = executor.execute(action, path, &destination_name).await?;

        let original_removed = match &outcome {
            ExecutorOutcome::Transferred { destination } => {
                log::info!("'{}' delivered {} to {}", action.name, path.display(), destination);
                !action.keep_original && remove_original(path)
            }
            ExecutorOutcome::AlreadyExists { destination } => {
                log::info!("{} already exists, keeping {}", destination, path.display());
                false
            }
            ExecutorOutcome::Simulated { destination } => {
                log::info!("'{}' simulated {} for {}", action.name, destination, path.display());
                false
            }
        };

        Ok(DispatchOutcome {
            action: action.name.clone(),
            executor: outcome,
            original_removed,
        })
    }
}

fn remove_original(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            log::info!("Deleted original file: {}", path.display());
            true
        }
        Err(e) => {
            log::error!("Failed to delete original file {}: {}", path.display(), e);
            false
        }
    }
}

/// Name of the file at the destination.
///
/// `rename` may use `{name}`, `{stem}`, `{ext}` and `{date}`; a
/// `new_extension` annotation replaces the extension.
pub fn destination_name(action: &Action, path: &Path, date: NaiveDate) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.clone());
    let original_ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();

    let new_ext = action
        .annotations
        .get(NEW_EXTENSION_KEY)
        .and_then(|v| v.as_str())
        .map(|e| e.trim_start_matches('.').to_string());
    let ext = new_ext.clone().unwrap_or(original_ext);

    match &action.rename {
        Some(pattern) if !pattern.trim().is_empty() => pattern
            .replace("{name}", &name)
            .replace("{stem}", &stem)
            .replace("{ext}", &ext)
            .replace("{date}", &date.format("%Y-%m-%d").to_string()),
        _ if new_ext.is_some() && !ext.is_empty() => format!("{}.{}", stem, ext),
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{ActionKind, OverwriteRule};
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn copy_action(target: &Path, keep_original: bool) -> Action {
        Action {
            name: "Archive".to_string(),
            display_name: None,
            kind: ActionKind::Copy {
                target: target.to_path_buf(),
            },
            rename: None,
            keep_original,
            overwrite: OverwriteRule::Replace,
            auto: true,
            annotations: Default::default(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn test_destination_name_plain() {
        let action = copy_action(Path::new("/t"), true);
        assert_eq!(destination_name(&action, Path::new("/d/issue.zip"), date()), "issue.zip");
    }

    #[test]
    fn test_destination_name_new_extension() {
        let mut action = copy_action(Path::new("/t"), true);
        action.annotations.insert(NEW_EXTENSION_KEY.to_string(), json!("cbz"));
        assert_eq!(destination_name(&action, Path::new("/d/issue.zip"), date()), "issue.cbz");
    }

    #[test]
    fn test_destination_name_rename_pattern() {
        let mut action = copy_action(Path::new("/t"), true);
        action.rename = Some("{date}_{stem}.{ext}".to_string());
        action.annotations.insert(NEW_EXTENSION_KEY.to_string(), json!(".cbz"));
        assert_eq!(
            destination_name(&action, Path::new("/d/issue.zip"), date()),
            "2024-03-09_issue.cbz"
        );
    }

    #[tokio::test]
    async fn test_dispatch_removes_original() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("a.zip");
        let target = temp.path().join("out");
        fs::write(&source, b"data").unwrap();

        let outcome = Dispatcher::builtin()
            .dispatch(&copy_action(&target, false), &source)
            .await
            .unwrap();

        assert!(outcome.original_removed);
        assert!(!source.exists());
        assert_eq!(fs::read(target.join("a.zip")).unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_dispatch_keeps_original() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("a.zip");
        fs::write(&source, b"data").unwrap();

        let outcome = Dispatcher::builtin()
            .dispatch(&copy_action(&temp.path().join("out"), true), &source)
            .await
            .unwrap();

        assert!(!outcome.original_removed);
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_dummy_action_never_removes_original() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("a.zip");
        fs::write(&source, b"data").unwrap();

        let mut action = copy_action(temp.path(), false);
        action.name = "Try".to_string();
        action.kind = ActionKind::Dummy;

        let outcome = Dispatcher::builtin().dispatch(&action, &source).await.unwrap();

        assert_eq!(
            outcome.executor,
            ExecutorOutcome::Simulated {
                destination: "dummy:a.zip".to_string()
            }
        );
        assert!(!outcome.original_removed);
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_dispatch_missing_source() {
        let err = Dispatcher::builtin()
            .dispatch(&copy_action(Path::new("/tmp"), false), Path::new("/nonexistent/a.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::MissingSource(_)));
    }

    #[tokio::test]
    async fn test_dispatch_without_executor() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("a.zip");
        fs::write(&source, b"data").unwrap();

        let err = Dispatcher::empty()
            .dispatch(&copy_action(temp.path(), false), &source)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NoExecutor(kind) if kind == "copy"));
        assert!(source.exists());
    }
}
