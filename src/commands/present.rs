//! Presenter front-ends for the macOS notification tools
//!
//! `dialog` and `select` print their answer on stdout for the daemon to read.
//! `banner` reports back over the local protocol instead, since the daemon
//! does not wait for it.

use eyre::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::cli::PresentAction;
use crate::config::Config;
use crate::confirm::Answer;
use crate::confirm::protocol::Message;

use super::notify;

pub fn run(action: PresentAction) -> Result<()> {
    match action {
        PresentAction::Dialog {
            title,
            subtitle,
            message,
            execute_label,
            skip_label,
            timeout_secs,
        } => {
            let answer = dialog(&title, &subtitle, &message, &execute_label, &skip_label, timeout_secs)?;
            println!("{}", answer);
            Ok(())
        }
        PresentAction::Select {
            title,
            message,
            candidates,
        } => {
            let choice = choose_from_list(&title, &message, &candidates)?;
            println!("{}", choice.as_deref().unwrap_or(Answer::Skip.as_str()));
            Ok(())
        }
        PresentAction::Banner {
            title,
            subtitle,
            message,
            hash,
            port,
            image,
            actions,
            timeout,
        } => {
            let actions: Vec<String> = actions.into_iter().filter(|a| !a.trim().is_empty()).collect();
            let banner = Banner {
                title,
                subtitle,
                message,
                image: (!image.is_empty()).then(|| PathBuf::from(image)),
                actions,
                timeout,
            };
            banner_round_trip(&banner, &hash, port)
        }
    }
}

fn escape_applescript(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn osascript(script: &str) -> Result<String> {
    let output = Command::new("osascript")
        .arg("-e")
        .arg(script)
        .output()
        .context("Failed to run osascript")?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // -128 is "User canceled"
        if stderr.contains("-128") {
            return Ok(String::new());
        }
        bail!("osascript failed ({}): {}", output.status, stderr.trim());
    }
    Ok(stdout)
}

fn dialog(
    title: &str,
    subtitle: &str,
    message: &str,
    execute_label: &str,
    skip_label: &str,
    timeout_secs: u64,
) -> Result<Answer> {
    let text = if subtitle.is_empty() {
        message.to_string()
    } else {
        format!("{}\n\n{}", subtitle, message)
    };
    let script = format!(
        r#"display dialog "{text}" with title "{title}" buttons {{"{skip}", "{exec}"}} default button "{exec}" giving up after {timeout}"#,
        text = escape_applescript(&text),
        title = escape_applescript(title),
        skip = escape_applescript(skip_label),
        exec = escape_applescript(execute_label),
        timeout = timeout_secs,
    );
    let output = osascript(&script)?;
    Ok(parse_dialog_result(&output, execute_label))
}

/// Interpret `button returned:<label>, gave up:<bool>`
pub fn parse_dialog_result(output: &str, execute_label: &str) -> Answer {
    let mut button = None;
    let mut gave_up = false;
    for part in output.split(", ") {
        if let Some(value) = part.strip_prefix("button returned:") {
            button = Some(value.trim());
        } else if let Some(value) = part.strip_prefix("gave up:") {
            gave_up = value.trim() == "true";
        }
    }

    match button {
        _ if gave_up => Answer::Timeout,
        Some(label) if label == execute_label => Answer::Execute,
        _ => Answer::Skip,
    }
}

fn choose_from_list(title: &str, message: &str, candidates: &[String]) -> Result<Option<String>> {
    let items = candidates
        .iter()
        .map(|c| format!("\"{}\"", escape_applescript(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let script = format!(
        r#"set chosen to choose from list {{{items}}} with title "{title}" with prompt "{prompt}" OK button name "Apply" cancel button name "Skip"
if chosen is false then
    return "SKIP"
else
    return item 1 of chosen
end if"#,
        items = items,
        title = escape_applescript(title),
        prompt = escape_applescript(message),
    );
    let output = osascript(&script)?;
    Ok(parse_choice(&output, candidates))
}

/// Chosen label, or `None` for a skip or anything not offered
pub fn parse_choice(output: &str, candidates: &[String]) -> Option<String> {
    let output = output.trim();
    if output.is_empty() || output == "false" || output.eq_ignore_ascii_case(Answer::Skip.as_str()) {
        return None;
    }
    candidates.iter().find(|c| c.as_str() == output).cloned()
}

struct Banner {
    title: String,
    subtitle: String,
    message: String,
    image: Option<PathBuf>,
    actions: Vec<String>,
    timeout: u64,
}

/// `alerter -json` response
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlerterResponse {
    #[serde(default)]
    pub activation_type: String,
    #[serde(default)]
    pub activation_value: Option<String>,
}

/// What the banner interaction means for the daemon
#[derive(Debug, PartialEq, Eq)]
pub enum BannerReply {
    Execute,
    Choose(String),
    Skip,
    /// No answer; the daemon's sweep expires the confirmation
    Silent,
}

pub fn interpret(response: &AlerterResponse, actions: &[String]) -> BannerReply {
    match response.activation_type.as_str() {
        // Multiple candidates go through the daemon's selection step
        "contentsClicked" => BannerReply::Execute,
        "actionClicked" => match &response.activation_value {
            Some(value) if actions.len() > 1 => actions
                .iter()
                .find(|a| alerter_label(a) == *value)
                .map(|a| BannerReply::Choose(a.clone()))
                .unwrap_or(BannerReply::Execute),
            _ => BannerReply::Execute,
        },
        "closed" => BannerReply::Skip,
        "timeout" => BannerReply::Silent,
        other => {
            log::warn!("Unknown alerter activation type '{}'", other);
            BannerReply::Silent
        }
    }
}

/// alerter splits `-actions` on commas
fn alerter_label(label: &str) -> String {
    label.replace(',', "\u{201a}")
}

fn alerter_path() -> Option<PathBuf> {
    which::which("alerter").ok().or_else(|| {
        let fallback = Config::expand_path(Path::new("~/.local/bin/alerter"));
        fallback.exists().then_some(fallback)
    })
}

fn show_alerter(alerter: &Path, banner: &Banner, hash: &str) -> Result<AlerterResponse> {
    let timeout = banner.timeout.to_string();
    let mut command = Command::new(alerter);
    command
        .args(["-title", banner.title.as_str()])
        .args(["-subtitle", banner.subtitle.as_str()])
        .args(["-message", banner.message.as_str()])
        .args(["-group", hash])
        .args(["-timeout", timeout.as_str()])
        .args(["-closeLabel", "Skip"])
        .arg("-json");

    if banner.actions.len() > 1 {
        let actions = banner.actions.iter().map(|a| alerter_label(a)).collect::<Vec<_>>().join(",");
        command
            .args(["-actions", actions.as_str()])
            .args(["-dropdownLabel", "Select an action"]);
    } else {
        command.args(["-actions", "Execute"]);
    }
    if let Some(image) = banner.image.as_ref().filter(|p| p.exists()) {
        command.arg("-contentImage").arg(image);
    }

    let output = command.output().context("Failed to run alerter")?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    log::debug!("alerter exited with {}: {}", output.status, stdout.trim());

    if stdout.trim().is_empty() {
        return Ok(AlerterResponse::default());
    }
    serde_json::from_str(stdout.trim()).context("Failed to parse alerter response")
}

/// Without alerter, fall back to a blocking dialog
fn show_dialog_fallback(banner: &Banner) -> Result<BannerReply> {
    if banner.actions.len() > 1 {
        let choice = choose_from_list(&banner.title, &banner.message, &banner.actions)?;
        return Ok(choice.map(BannerReply::Choose).unwrap_or(BannerReply::Skip));
    }
    let answer = dialog(
        &banner.title,
        &banner.subtitle,
        &banner.message,
        "Execute",
        "Skip",
        banner.timeout,
    )?;
    Ok(match answer {
        Answer::Execute => BannerReply::Execute,
        Answer::Skip => BannerReply::Skip,
        Answer::Timeout => BannerReply::Silent,
    })
}

fn banner_round_trip(banner: &Banner, hash: &str, port: u16) -> Result<()> {
    if let Err(e) = notify::send(port, &Message::Shown(hash.to_string())) {
        log::warn!("Could not report banner as shown: {:#}", e);
    }

    let reply = match alerter_path() {
        Some(alerter) => interpret(&show_alerter(&alerter, banner, hash)?, &banner.actions),
        None => {
            log::info!("alerter not found, using a dialog");
            show_dialog_fallback(banner)?
        }
    };

    let message = match reply {
        BannerReply::Execute => Message::Execute(hash.to_string()),
        BannerReply::Choose(name) => Message::Action {
            name,
            hash: hash.to_string(),
        },
        BannerReply::Skip => Message::Skip(hash.to_string()),
        BannerReply::Silent => {
            println!("{}", Answer::Timeout);
            return Ok(());
        }
    };

    let response = notify::send(port, &message)?;
    println!("{} {}", message, response);
    Ok(())
}
