//! Secondary selection step for multiple-candidate confirmations

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{ConfirmationError, Prompt};
use crate::rules::Action;

#[async_trait]
pub trait Selector: Send + Sync {
    /// Pick one of `candidates`; `None` means skip
    async fn select(&self, prompt: &Prompt, candidates: &[Action]) -> Result<Option<Action>, ConfirmationError>;
}

/// Runs a presenter that receives `title message label...` and prints the
/// chosen label or `SKIP`
pub struct ProcessSelector {
    command: Vec<String>,
    timeout: Duration,
}

impl ProcessSelector {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

/// Match presenter output against the candidates by label or name
pub fn pick(output: &str, candidates: &[Action]) -> Result<Option<Action>, ConfirmationError> {
    let Some(line) = output.lines().map(str::trim).filter(|l| !l.is_empty()).last() else {
        return Ok(None);
    };
    if line.eq_ignore_ascii_case("SKIP") || line.eq_ignore_ascii_case("TIMEOUT") {
        return Ok(None);
    }
    candidates
        .iter()
        .find(|a| a.label() == line || a.name == line)
        .cloned()
        .map(Some)
        .ok_or_else(|| ConfirmationError::Unparseable(line.to_string()))
}

#[async_trait]
impl Selector for ProcessSelector {
    async fn select(&self, prompt: &Prompt, candidates: &[Action]) -> Result<Option<Action>, ConfirmationError> {
        let (program, base_args) = self.command.split_first().ok_or(ConfirmationError::NoCommand)?;

        let child = Command::new(program)
            .args(base_args)
            .arg(&prompt.title)
            .arg(&prompt.message)
            .args(candidates.iter().map(|a| a.label()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConfirmationError::Spawn {
                command: program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ConfirmationError::Timeout(self.timeout.as_secs()))?
            .map_err(|source| ConfirmationError::Spawn {
                command: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ConfirmationError::Exit {
                command: program.clone(),
                status: output.status,
            });
        }

        let choice = pick(&String::from_utf8_lossy(&output.stdout), candidates)?;
        match &choice {
            Some(action) => log::info!("Selected '{}'", action.name),
            None => log::info!("Selection skipped"),
        }
        Ok(choice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{ActionKind, OverwriteRule};

    fn action(name: &str, display: Option<&str>) -> Action {
        Action {
            name: name.to_string(),
            display_name: display.map(str::to_string),
            kind: ActionKind::Dummy,
            rename: None,
            keep_original: true,
            overwrite: OverwriteRule::Replace,
            auto: false,
            annotations: Default::default(),
        }
    }

    fn prompt() -> Prompt {
        Prompt {
            title: "Pelagos".to_string(),
            subtitle: "Choose an action".to_string(),
            message: "issue.cbz".to_string(),
            image: None,
            actions: Vec::new(),
        }
    }

    #[test]
    fn test_pick() {
        let candidates = vec![action("manga", Some("Manga Library")), action("mags", None)];
        assert_eq!(pick("Manga Library\n", &candidates).unwrap().unwrap().name, "manga");
        assert_eq!(pick("mags", &candidates).unwrap().unwrap().name, "mags");
        assert_eq!(pick("SKIP", &candidates).unwrap(), None);
        assert_eq!(pick("", &candidates).unwrap(), None);
        assert!(pick("books", &candidates).is_err());
    }

    #[tokio::test]
    async fn test_process_selector_passes_labels() {
        // $4 is the second candidate label
        let selector = ProcessSelector::new(
            vec!["sh".to_string(), "-c".to_string(), r#"echo "$4""#.to_string(), "select".to_string()],
            Duration::from_secs(5),
        );
        let candidates = vec![action("a", Some("Alpha")), action("b", Some("Beta"))];
        let choice = selector.select(&prompt(), &candidates).await.unwrap();
        assert_eq!(choice.unwrap().name, "b");
    }
}
