//! Dry-run resolution of a single file

use colored::*;
use eyre::{Context, Result};
use std::path::PathBuf;

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::event::FileEvent;
use crate::hook::HookRegistry;
use crate::rules::resolver::Resolution;
use crate::rules::{Action, RuleStore};

pub fn run(path: PathBuf, url: Option<String>, format: OutputFormat, verbose: bool, config: &Config) -> Result<()> {
    let hooks = HookRegistry::builtin();
    let resolver = config.build_resolver(&hooks)?;

    let path = path
        .canonicalize()
        .context(format!("Cannot read {}", path.display()))?;
    let event = match url {
        Some(url) => FileEvent::new(path, Some(url)),
        None => FileEvent::detect(path),
    };
    log::info!("Resolving {} (origin: {:?})", event.path.display(), event.origin_url);

    let resolution = resolver.resolve(&event);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resolution)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&resolution)?),
        OutputFormat::Text => {
            println!("{} {}", "File:".bold(), event.path.display());
            match &event.origin_url {
                Some(origin) => println!("{} {}", "Origin:".bold(), origin),
                None => println!("{} {}", "Origin:".bold(), "unknown".dimmed()),
            }
            if verbose {
                println!("{} {}", "Detected:".bold(), event.created_at.format("%Y-%m-%d %H:%M:%S"));
            }
            println!();
            print_resolution(&resolution, resolver.rules(), verbose);
        }
    }

    Ok(())
}

fn print_resolution(resolution: &Resolution, rules: &RuleStore, verbose: bool) {
    let mode = if resolution.needs_confirmation() {
        "after confirmation".yellow()
    } else {
        "automatically".green()
    };
    match resolution {
        Resolution::NoMatch => println!("{} No matching rule; the file would be left alone", "⚠".yellow()),
        Resolution::Determined { action, source, .. } => {
            let origin = match source {
                Some(name) => format!("source {}", name.cyan()),
                None => "common action".to_string(),
            };
            println!("{} {} ({}), {}", "✓".green(), action.label().bold(), origin, mode);
            if verbose
                && let Some(source) = source.as_deref().and_then(|name| rules.source(name))
                && !source.tags.is_empty()
            {
                println!("    tags: {}", source.tags.join(", "));
            }
            print_action(action, verbose);
        }
        Resolution::Ambiguous { candidates } => {
            println!("{} {} candidates, the user chooses:", "?".cyan(), candidates.len());
            for action in candidates {
                println!("  - {}", action.label().bold());
                print_action(action, verbose);
            }
        }
    }
}

fn print_action(action: &Action, verbose: bool) {
    if let Some(target) = action.kind.target() {
        println!("    {} → {}", action.kind.type_name(), target);
    } else {
        println!("    {}", action.kind.type_name());
    }
    if verbose {
        if let Some(rename) = &action.rename {
            println!("    rename: {}", rename);
        }
        println!("    keep original: {}", action.keep_original);
        for (key, value) in &action.annotations {
            println!("    {}: {}", key, value);
        }
    }
}
