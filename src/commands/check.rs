//! Validate the configuration and summarize the compiled rules

use colored::*;
use eyre::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::hook::HookRegistry;
use crate::rules::UrlMatch;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    config_file: Option<String>,
    watch_dir: String,
    channel: String,
    headless: bool,
    prompt_required: bool,
    sources: Vec<SourceSummary>,
    common_actions: Vec<TemplateSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceSummary {
    name: String,
    url: String,
    #[serde(rename = "match")]
    url_match: UrlMatch,
    action: String,
    action_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    template: Option<String>,
    auto: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TemplateSummary {
    name: String,
    action_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    filters: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    extensions: Vec<String>,
    auto: bool,
}

pub fn run(format: OutputFormat, verbose: bool, config: &Config, config_path: Option<&PathBuf>) -> Result<()> {
    let hooks = HookRegistry::builtin();
    let resolver = config.build_resolver(&hooks).context("Configuration check failed")?;
    let rules = resolver.rules();

    let summary = Summary {
        config_file: config_path.map(|p| p.display().to_string()),
        watch_dir: config.watch_dir.display().to_string(),
        channel: format!("{:?}", config.confirmation.channel).to_lowercase(),
        headless: config.headless,
        prompt_required: config.common_actions_prompt_required,
        sources: rules
            .sources
            .iter()
            .map(|s| SourceSummary {
                name: s.name.clone(),
                url: s.url.clone(),
                url_match: s.url_match,
                action: s.action.label().to_string(),
                action_type: s.action.kind.type_name().to_string(),
                target: s.action.kind.target(),
                template: s.template.clone(),
                auto: s.action.auto,
            })
            .collect(),
        common_actions: rules
            .templates
            .iter()
            .map(|t| TemplateSummary {
                name: t.name().to_string(),
                action_type: t.action.kind.type_name().to_string(),
                target: t.action.kind.target(),
                filters: t.filters.len(),
                extensions: t.extensions.as_ref().map(|e| e.patterns.clone()).unwrap_or_default(),
                auto: t.action.auto,
            })
            .collect(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&summary)?),
        OutputFormat::Text => print_text(&summary, verbose),
    }

    Ok(())
}

fn print_text(summary: &Summary, verbose: bool) {
    println!("{} Configuration is valid", "✓".green());
    match &summary.config_file {
        Some(path) => println!("  Config:    {}", path),
        None => println!("  Config:    {}", "(defaults)".dimmed()),
    }
    println!("  Watching:  {}", summary.watch_dir);
    println!("  Channel:   {}", summary.channel);
    if summary.headless {
        println!("  Headless:  {}", "yes".yellow());
    }
    println!();

    println!("{} ({})", "Sources:".bold(), summary.sources.len());
    for source in &summary.sources {
        let via = source
            .template
            .as_ref()
            .map(|t| format!(" via {}", t.cyan()))
            .unwrap_or_default();
        let auto = if source.auto { " [auto]".green().to_string() } else { String::new() };
        println!("  {} → {} ({}){}{}", source.name.bold(), source.action, source.action_type, via, auto);
        if verbose {
            println!("      url: {} ({:?})", source.url, source.url_match);
            if let Some(target) = &source.target {
                println!("      target: {}", target);
            }
        }
    }
    println!();

    println!("{} ({})", "Common actions:".bold(), summary.common_actions.len());
    for template in &summary.common_actions {
        let auto = if template.auto { " [auto]".green().to_string() } else { String::new() };
        println!(
            "  {} ({}, {} filter(s)){}",
            template.name.bold(),
            template.action_type,
            template.filters,
            auto
        );
        if verbose {
            if let Some(target) = &template.target {
                println!("      target: {}", target);
            }
            if !template.extensions.is_empty() {
                println!("      extensions: {}", template.extensions.join(", "));
            }
        }
    }
}
