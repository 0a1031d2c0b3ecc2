//! Confirmation channels
//!
//! A channel asks the user about one registered confirmation. The dialog
//! channel waits for the answer; the banner channel returns immediately and
//! the answer arrives later over the local protocol.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::registry::{Payload, RegistryError};

pub mod banner;
pub mod dialog;
pub mod listener;
pub mod protocol;
pub mod select;

pub use banner::BannerChannel;
pub use dialog::DialogChannel;

pub const PROMPT_TITLE: &str = "Pelagos";

/// User's answer to a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Answer {
    Execute,
    Skip,
    Timeout,
}

impl Answer {
    /// Parse a presenter's output word; `GAVE_UP` is the dialog's timeout marker
    pub fn parse(word: &str) -> Option<Self> {
        match word.trim().to_ascii_uppercase().as_str() {
            "EXECUTE" => Some(Answer::Execute),
            "SKIP" => Some(Answer::Skip),
            "TIMEOUT" | "GAVE_UP" => Some(Answer::Timeout),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Answer::Execute => "EXECUTE",
            Answer::Skip => "SKIP",
            Answer::Timeout => "TIMEOUT",
        }
    }
}

impl std::fmt::Display for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Solicitation {
    Answered(Answer),
    /// The answer will arrive over the local protocol
    Pending,
}

#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error("failed to start presenter '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("presenter '{command}' exited with {status}")]
    Exit { command: String, status: std::process::ExitStatus },

    #[error("unrecognized presenter output: {0:?}")]
    Unparseable(String),

    #[error("presenter did not answer within {0} seconds")]
    Timeout(u64),

    #[error("presenter command is empty")]
    NoCommand,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Text shown to the user for one confirmation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub title: String,
    pub subtitle: String,
    pub message: String,
    pub image: Option<PathBuf>,
    /// Candidate labels for multiple-choice prompts
    pub actions: Vec<String>,
}

impl Prompt {
    pub fn for_payload(path: &Path, payload: &Payload) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let (subtitle, actions) = match payload {
            Payload::Single(action) => (format!("Confirm {}", action.label()), Vec::new()),
            Payload::Multiple(actions) => (
                "Choose an action".to_string(),
                actions.iter().map(|a| a.label().to_string()).collect(),
            ),
        };

        let image = payload
            .actions()
            .iter()
            .find_map(|a| a.annotations.get("contentImage").and_then(|v| v.as_str()))
            .map(PathBuf::from);

        Self {
            title: PROMPT_TITLE.to_string(),
            subtitle,
            message: file_name,
            image,
            actions,
        }
    }
}

#[async_trait]
pub trait ConfirmationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn solicit(&self, hash: &str, prompt: &Prompt) -> Result<Solicitation, ConfirmationError>;
}

/// Presenter argv: the configured command, or this binary's `present <sub>`
pub fn presenter_command(configured: &[String], subcommand: &str) -> Vec<String> {
    if !configured.is_empty() {
        return configured.to_vec();
    }
    let exe = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "pelagos".to_string());
    vec![exe, "present".to_string(), subcommand.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Action, ActionKind, OverwriteRule};
    use serde_json::json;

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

    #[test]
    fn test_parse_answers() {
        assert_eq!(Answer::parse("execute\n"), Some(Answer::Execute));
        assert_eq!(Answer::parse("SKIP"), Some(Answer::Skip));
        assert_eq!(Answer::parse("gave_up"), Some(Answer::Timeout));
        assert_eq!(Answer::parse("maybe"), None);
    }

    #[test]
    fn test_single_prompt() {
        let mut a = action("upload", Some("Upload to NAS"));
        a.annotations.insert("contentImage".to_string(), json!("/tmp/c.jpg"));
        let prompt = Prompt::for_payload(Path::new("/d/issue.cbz"), &Payload::Single(a));
        assert_eq!(prompt.title, PROMPT_TITLE);
        assert_eq!(prompt.subtitle, "Confirm Upload to NAS");
        assert_eq!(prompt.message, "issue.cbz");
        assert_eq!(prompt.image, Some(PathBuf::from("/tmp/c.jpg")));
        assert!(prompt.actions.is_empty());
    }

    #[test]
    fn test_multiple_prompt_lists_candidates() {
        let payload = Payload::Multiple(vec![action("a", None), action("b", Some("Bee"))]);
        let prompt = Prompt::for_payload(Path::new("/d/issue.cbz"), &payload);
        assert_eq!(prompt.actions, vec!["a".to_string(), "Bee".to_string()]);
        assert_eq!(prompt.image, None);
    }

    #[test]
    fn test_configured_presenter_command_wins() {
        let configured = vec!["/usr/local/bin/dialog".to_string()];
        assert_eq!(presenter_command(&configured, "dialog"), configured);
        let default = presenter_command(&[], "banner");
        assert_eq!(&default[1..], &["present".to_string(), "banner".to_string()]);
    }
}
