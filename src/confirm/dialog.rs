//! Synchronous dialog channel

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use super::{Answer, ConfirmationChannel, ConfirmationError, Prompt, Solicitation};
use crate::registry::ActionRegistry;

pub struct DialogChannel {
    command: Vec<String>,
    timeout: Duration,
    execute_label: String,
    skip_label: String,
    registry: Arc<ActionRegistry>,
}

impl DialogChannel {
    pub fn new(
        command: Vec<String>,
        timeout: Duration,
        execute_label: String,
        skip_label: String,
        registry: Arc<ActionRegistry>,
    ) -> Self {
        Self {
            command,
            timeout,
            execute_label,
            skip_label,
            registry,
        }
    }

    fn args(&self, prompt: &Prompt) -> Vec<String> {
        vec![
            prompt.title.clone(),
            prompt.subtitle.clone(),
            prompt.message.clone(),
            self.execute_label.clone(),
            self.skip_label.clone(),
            self.timeout.as_secs().to_string(),
        ]
    }
}

/// First answer word the presenter prints.
///
/// Output that ends without one counts as a timeout, unless the presenter
/// failed or printed something unrecognized.
async fn read_answer(child: &mut Child, program: &str) -> Result<Answer, ConfirmationError> {
    let io_error = |source| ConfirmationError::Spawn {
        command: program.to_string(),
        source,
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io_error(std::io::Error::other("presenter stdout not captured")))?;
    let mut lines = BufReader::new(stdout).lines();

    let mut unrecognized = None;
    while let Some(line) = lines.next_line().await.map_err(io_error)? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match Answer::parse(line) {
            Some(answer) => return Ok(answer),
            None => {
                log::debug!("Dialog presenter said: {}", line);
                unrecognized = Some(line.to_string());
            }
        }
    }

    let status = child.wait().await.map_err(io_error)?;
    if !status.success() {
        return Err(ConfirmationError::Exit {
            command: program.to_string(),
            status,
        });
    }
    match unrecognized {
        Some(line) => Err(ConfirmationError::Unparseable(line)),
        None => Ok(Answer::Timeout),
    }
}

#[async_trait]
impl ConfirmationChannel for DialogChannel {
    fn name(&self) -> &'static str {
        "dialog"
    }

    async fn solicit(&self, hash: &str, prompt: &Prompt) -> Result<Solicitation, ConfirmationError> {
        let (program, base_args) = self.command.split_first().ok_or(ConfirmationError::NoCommand)?;

        self.registry.mark_shown(hash)?;

        // Dropping the child kills a presenter that is still showing
        let mut child = Command::new(program)
            .args(base_args)
            .args(self.args(prompt))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConfirmationError::Spawn {
                command: program.clone(),
                source,
            })?;

        log::debug!("Dialog presenter started for {}", hash);

        let answer = match tokio::time::timeout(self.timeout, read_answer(&mut child, program)).await {
            Ok(answer) => answer?,
            Err(_) => {
                log::warn!("Dialog presenter for {} did not answer in time", hash);
                Answer::Timeout
            }
        };

        log::info!("Dialog answer for {}: {}", hash, answer);
        Ok(Solicitation::Answered(answer))
    }
}
