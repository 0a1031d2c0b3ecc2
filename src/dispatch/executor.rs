//! Built-in executors

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{ExecutionError, Executor, ExecutorOutcome};
use crate::rules::{Action, ActionKind, OverwriteRule};

const SCP_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const EXISTS_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Transfers with the system `scp`
pub struct ScpExecutor {
    program: String,
    ssh_program: String,
    timeout: Duration,
}

impl Default for ScpExecutor {
    fn default() -> Self {
        Self {
            program: "scp".to_string(),
            ssh_program: "ssh".to_string(),
            timeout: SCP_TIMEOUT,
        }
    }
}

fn expand_key(key: &str) -> String {
    shellexpand::tilde(key).to_string()
}

/// `host:/dir` + `name` → (`host:/dir/name`, host, `/dir/name`)
pub fn remote_destination(target: &str, name: &str) -> (String, Option<String>, String) {
    let full = format!("{}/{}", target.trim_end_matches('/'), name);
    match full.split_once(':') {
        Some((host, path)) if !host.is_empty() && !host.contains('/') => {
            (full.clone(), Some(host.to_string()), path.to_string())
        }
        _ => (full.clone(), None, full.clone()),
    }
}

async fn run_bounded(
    mut command: Command,
    label: &str,
    timeout: Duration,
) -> Result<std::process::Output, ExecutionError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|source| ExecutionError::Spawn {
        command: label.to_string(),
        source,
    })?;

    tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ExecutionError::Timeout {
            command: label.to_string(),
            secs: timeout.as_secs(),
        })?
        .map_err(|source| ExecutionError::Spawn {
            command: label.to_string(),
            source,
        })
}

impl ScpExecutor {
    #[cfg(test)]
    pub fn with_programs(program: impl Into<String>, ssh_program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            ssh_program: ssh_program.into(),
            timeout,
        }
    }

    async fn remote_exists(&self, host: &str, path: &str, key: Option<&str>) -> Result<bool, ExecutionError> {
        let mut command = Command::new(&self.ssh_program);
        if let Some(key) = key {
            command.arg("-i").arg(expand_key(key));
        }
        command.arg(host).arg("test").arg("-e").arg(path);

        let output = run_bounded(command, &self.ssh_program, EXISTS_CHECK_TIMEOUT).await?;
        Ok(output.status.success())
    }
}

#[async_trait]
impl Executor for ScpExecutor {
    fn kind(&self) -> &'static str {
        "scp"
    }

    async fn execute(
        &self,
        action: &Action,
        path: &Path,
        destination_name: &str,
    ) -> Result<ExecutorOutcome, ExecutionError> {
        let ActionKind::Scp { target, private_key } = &action.kind else {
            return Err(ExecutionError::NoExecutor(action.kind.type_name().to_string()));
        };
        let (destination, host, remote_path) = remote_destination(target, destination_name);

        if action.overwrite == OverwriteRule::Skip {
            let exists = match &host {
                Some(host) => self.remote_exists(host, &remote_path, private_key.as_deref()).await?,
                None => Path::new(&remote_path).exists(),
            };
            if exists {
                return Ok(ExecutorOutcome::AlreadyExists { destination });
            }
        }

        let mut command = Command::new(&self.program);
        if let Some(key) = private_key {
            command.arg("-i").arg(expand_key(key));
        }
        command.arg(path).arg(&destination);

        log::info!("Transferring {} to {}", path.display(), destination);
        let output = run_bounded(command, &self.program, self.timeout).await?;

        if !output.status.success() {
            return Err(ExecutionError::Failed {
                command: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(ExecutorOutcome::Transferred { destination })
    }
}

/// Copies into a local directory
pub struct CopyExecutor;

#[async_trait]
impl Executor for CopyExecutor {
    fn kind(&self) -> &'static str {
        "copy"
    }

    async fn execute(
        &self,
        action: &Action,
        path: &Path,
        destination_name: &str,
    ) -> Result<ExecutorOutcome, ExecutionError> {
        let ActionKind::Copy { target } = &action.kind else {
            return Err(ExecutionError::NoExecutor(action.kind.type_name().to_string()));
        };
        let dir = PathBuf::from(shellexpand::tilde(&target.to_string_lossy()).as_ref());
        let destination = dir.join(destination_name);

        if action.overwrite == OverwriteRule::Skip && tokio::fs::try_exists(&destination).await? {
            return Ok(ExecutorOutcome::AlreadyExists {
                destination: destination.display().to_string(),
            });
        }

        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::copy(path, &destination).await?;

        Ok(ExecutorOutcome::Transferred {
            destination: destination.display().to_string(),
        })
    }
}

/// Only logs; useful for trying out rules
pub struct DummyExecutor;

#[async_trait]
impl Executor for DummyExecutor {
    fn kind(&self) -> &'static str {
        "dummy"
    }

    async fn execute(
        &self,
        action: &Action,
        path: &Path,
        destination_name: &str,
    ) -> Result<ExecutorOutcome, ExecutionError> {
        log::info!(
            "Dummy action '{}' for {} (as {})",
            action.name,
            path.display(),
            destination_name
        );
        Ok(ExecutorOutcome::Simulated {
            destination: format!("dummy:{}", destination_name),
        })
    }
}
