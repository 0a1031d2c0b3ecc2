//! Asynchronous banner channel

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use super::{ConfirmationChannel, ConfirmationError, Prompt, Solicitation, presenter_command};

pub struct BannerChannel {
    command: Vec<String>,
    port: u16,
    timeout_secs: u64,
}

impl BannerChannel {
    /// `command` may contain `{title}`, `{subtitle}`, `{message}`, `{hash}`,
    /// `{port}`, `{image}` and `{actions}` placeholders. An argument that is
    /// exactly `{actions}` expands to one argument per label.
    pub fn new(command: Vec<String>, port: u16, timeout_secs: u64) -> Self {
        Self {
            command,
            port,
            timeout_secs,
        }
    }

    fn argv(&self, hash: &str, prompt: &Prompt) -> Vec<String> {
        let default = self.command.is_empty();
        let template = if default {
            let mut argv = presenter_command(&[], "banner");
            argv.extend(
                [
                    "--title",
                    "{title}",
                    "--subtitle",
                    "{subtitle}",
                    "--message",
                    "{message}",
                    "--hash",
                    "{hash}",
                    "--port",
                    "{port}",
                    "--image",
                    "{image}",
                    "--timeout",
                    "{timeout}",
                ]
                .iter()
                .map(|s| s.to_string()),
            );
            argv
        } else {
            self.command.clone()
        };

        let image = prompt
            .image
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let actions = prompt.actions.join(", ");

        let mut argv: Vec<String> = template
            .iter()
            .flat_map(|arg| {
                if arg == "{actions}" {
                    return prompt.actions.clone();
                }
                vec![
                    arg.replace("{title}", &prompt.title)
                        .replace("{subtitle}", &prompt.subtitle)
                        .replace("{message}", &prompt.message)
                        .replace("{hash}", hash)
                        .replace("{port}", &self.port.to_string())
                        .replace("{image}", &image)
                        .replace("{actions}", &actions)
                        .replace("{timeout}", &self.timeout_secs.to_string()),
                ]
            })
            .collect();

        if default {
            for label in &prompt.actions {
                argv.push("--action".to_string());
                argv.push(label.clone());
            }
        }
        argv
    }
}

#[async_trait]
impl ConfirmationChannel for BannerChannel {
    fn name(&self) -> &'static str {
        "banner"
    }

    async fn solicit(&self, hash: &str, prompt: &Prompt) -> Result<Solicitation, ConfirmationError> {
        let argv = self.argv(hash, prompt);
        let (program, args) = argv.split_first().ok_or(ConfirmationError::NoCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ConfirmationError::Spawn {
                command: program.clone(),
                source,
            })?;

        log::info!("Banner presenter started for {} (pid {:?})", hash, child.id());

        // Reap the detached presenter so it never lingers as a zombie
        let hash = hash.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => log::debug!("Banner presenter for {} finished", hash),
                Ok(status) => log::warn!("Banner presenter for {} exited with {}", hash, status),
                Err(e) => log::warn!("Banner presenter for {} could not be awaited: {}", hash, e),
            }
        });

        Ok(Solicitation::Pending)
    }
}
