//! Inspect and try out hooks

use colored::*;
use eyre::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

use crate::cli::{HookAction, OutputFormat};
use crate::hook::{HookContext, HookOutcome, HookRegistry};

#[derive(Serialize)]
struct HookInfo {
    name: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    defaults: HookContext,
}

pub fn run(action: HookAction) -> Result<()> {
    let hooks = HookRegistry::builtin();
    match action {
        HookAction::List { format } => list(&hooks, OutputFormat::resolve(format)),
        HookAction::Test { name, path, context } => test(&hooks, &name, &path, context.as_deref()),
    }
}

fn list(hooks: &HookRegistry, format: OutputFormat) -> Result<()> {
    let infos: Vec<HookInfo> = hooks
        .iter()
        .map(|hook| HookInfo {
            name: hook.name(),
            description: hook.description(),
            defaults: hook.defaults(),
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&infos)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&infos)?),
        OutputFormat::Text => {
            println!("{}", "Registered hooks:".bold());
            println!();
            for info in &infos {
                println!("  {} - {}", info.name.green(), info.description);
            }
        }
    }
    Ok(())
}

fn test(hooks: &HookRegistry, name: &str, path: &Path, context: Option<&str>) -> Result<()> {
    if !hooks.contains(name) {
        bail!("Unknown hook '{}'. Run `pelagos hook list` to see registered hooks", name);
    }

    let context = match context {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("Failed to parse --context JSON")? {
            Value::Object(map) => map,
            other => bail!("--context must be a JSON object, got {}", other),
        },
        None => HookContext::new(),
    };

    let outcome = hooks.invoke(name, path, &context)?;
    let verdict = if outcome.passes() { "pass".green() } else { "fail".red() };
    println!("{} {} on {}: {}", "→".cyan(), name.bold(), path.display(), verdict);

    if let HookOutcome::Value(value) = &outcome {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}
