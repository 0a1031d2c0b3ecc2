//! Diagnose pelagos setup issues

use colored::*;
use eyre::Result;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::{ChannelKind, Config};
use crate::hook::HookRegistry;
use crate::rules::ActionType;

pub fn run(config: &Config, config_path: Option<&PathBuf>) -> Result<()> {
    println!("{}", "Pelagos Doctor".bold());
    println!("{}", "═".repeat(50));
    println!();

    let mut issues = 0;

    // Check config file
    match config_path {
        Some(path) => println!("{} Config file: {}", "✓".green(), path.display()),
        None => {
            let expected = Config::pelagos_dir().join("pelagos.yaml");
            println!("{} No config file, using defaults", "⚠".yellow());
            println!("  Create {} to add rules", expected.display().to_string().cyan());
        }
    }

    // Check watch directory
    if config.watch_dir.is_dir() {
        println!("{} Watch directory: {}", "✓".green(), config.watch_dir.display());
    } else {
        println!("{} Watch directory missing: {}", "✗".red(), config.watch_dir.display());
        issues += 1;
    }

    // Check rules
    match config.build_resolver(&HookRegistry::builtin()) {
        Ok(resolver) => println!(
            "{} Rules: {} source(s), {} common action(s)",
            "✓".green(),
            resolver.rules().sources.len(),
            resolver.rules().templates.len()
        ),
        Err(e) => {
            println!("{} Rules are invalid: {:#}", "✗".red(), e);
            issues += 1;
        }
    }

    println!();

    // Check dependencies
    println!("{}", "Dependencies:".bold());

    let needs_scp = config
        .sources
        .iter()
        .filter_map(|s| s.action.action_type)
        .chain(config.common_actions.iter().filter_map(|a| a.action_type))
        .any(|t| t == ActionType::Scp);
    for tool in ["scp", "ssh"] {
        if is_installed(tool) {
            println!("  {} {}", "✓".green(), tool);
        } else if needs_scp {
            println!("  {} {} (required by scp actions)", "✗".red(), tool);
            issues += 1;
        } else {
            println!("  {} {} (needed for scp actions)", "⚠".yellow(), tool);
        }
    }

    if is_installed("xattr") && is_installed("plutil") {
        println!("  {} xattr, plutil (download origin lookup)", "✓".green());
    } else {
        println!(
            "  {} xattr/plutil missing; origin URLs unavailable, only common actions will match",
            "⚠".yellow()
        );
    }

    if check_command("osascript", &["-e", "return 1"]) {
        println!("  {} osascript (dialogs)", "✓".green());
    } else if config.confirmation.dialog_command.is_empty() || config.confirmation.select_command.is_empty() {
        println!("  {} osascript (needed by the default dialog and select presenters)", "✗".red());
        issues += 1;
    } else {
        println!("  {} osascript (custom presenters configured)", "⚠".yellow());
    }

    if config.confirmation.channel == ChannelKind::Banner && config.confirmation.banner_command.is_empty() {
        let alerter = Config::expand_path(Path::new("~/.local/bin/alerter"));
        if is_installed("alerter") || alerter.exists() {
            println!("  {} alerter (banners)", "✓".green());
        } else {
            println!("  {} alerter not found; banners fall back to dialogs", "⚠".yellow());
        }
    }

    println!();

    // Summary
    println!("{}", "═".repeat(50));
    if issues == 0 {
        println!("{} All checks passed!", "✓".green().bold());
    } else {
        println!("{} {} issue(s) found", "⚠".yellow().bold(), issues);
    }

    Ok(())
}

fn is_installed(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

fn check_command(cmd: &str, args: &[&str]) -> bool {
    Command::new(cmd)
        .args(args)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
