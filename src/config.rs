use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::hook::HookRegistry;
use crate::rules::resolver::{ResolveOptions, Resolver};
use crate::rules::{ActionDoc, RuleStore, SourceDoc};

/// Main pelagos configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub log_level: LogLevel,
    pub watch_dir: PathBuf,
    /// Wait before processing a new file so the writer can finish
    pub settle_delay_ms: u64,
    /// Glob patterns of file names the watcher never reports
    pub ignore: Vec<String>,
    pub port: u16,
    /// How many ports after `port` to try when it is taken
    pub port_range: u16,
    pub common_actions_prompt_required: bool,
    pub headless: bool,
    /// Rule reload interval; 0 disables reloading
    pub reload_interval_secs: u64,
    pub confirmation: ConfirmationConfig,
    pub registry: RegistryConfig,
    pub sources: Vec<SourceDoc>,
    pub common_actions: Vec<ActionDoc>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

/// Confirmation strategy
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Detached notification answering over the local protocol
    #[default]
    Banner,
    /// Blocking dialog answering on stdout
    Dialog,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfirmationConfig {
    pub channel: ChannelKind,
    pub timeout_secs: u64,
    /// Dialog presenter argv; empty means `pelagos present dialog`
    pub dialog_command: Vec<String>,
    /// Banner presenter argv with placeholders; empty means `pelagos present banner`
    pub banner_command: Vec<String>,
    /// Selection presenter argv; empty means `pelagos present select`
    pub select_command: Vec<String>,
    pub execute_label: String,
    pub skip_label: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Age at which an unanswered confirmation is dropped
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            watch_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from("~/Downloads")),
            settle_delay_ms: 2000,
            ignore: ["*.crdownload", "*.download", "*.part", "*.tmp", ".*"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            port: 9999,
            port_range: 10,
            common_actions_prompt_required: true,
            headless: false,
            reload_interval_secs: 60,
            confirmation: ConfirmationConfig::default(),
            registry: RegistryConfig::default(),
            sources: Vec::new(),
            common_actions: Vec::new(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            channel: ChannelKind::default(),
            timeout_secs: 120,
            dialog_command: Vec::new(),
            banner_command: Vec::new(),
            select_command: Vec::new(),
            execute_label: "Execute".to_string(),
            skip_label: "Skip".to_string(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            sweep_interval_secs: 30,
        }
    }
}

impl ConfirmationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RegistryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Config {
    /// Load configuration with fallback chain, returning the file it came from
    pub fn locate_and_load(config_path: Option<&PathBuf>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = config_path {
            let config =
                Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()))?;
            return Ok((config, Some(path.clone())));
        }

        Self::load_first(Self::candidate_paths())
    }

    /// Loads the first candidate that exists; a present but invalid file is an error
    fn load_first(candidates: Vec<(String, PathBuf)>) -> Result<(Self, Option<PathBuf>)> {
        for (origin, path) in candidates {
            if !path.exists() {
                continue;
            }
            let config = Self::load_from_file(&path).context(format!("Failed to load config from {}", origin))?;
            return Ok((config, Some(path)));
        }

        log::info!("No config file found, using defaults");
        Ok((Self::default(), None))
    }

    fn candidate_paths() -> Vec<(String, PathBuf)> {
        let mut candidates = Vec::new();

        if let Ok(env_path) = std::env::var("PELAGOS_CONFIG") {
            candidates.push(("PELAGOS_CONFIG".to_string(), PathBuf::from(env_path)));
        }

        if let Ok(dir) = std::env::var("PELAGOS_DIR") {
            candidates.push(("PELAGOS_DIR".to_string(), PathBuf::from(dir).join("pelagos.yaml")));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("pelagos").join("pelagos.yaml");
            candidates.push((path.display().to_string(), path));
        }

        // For development
        candidates.push(("./pelagos.yaml".to_string(), PathBuf::from("pelagos.yaml")));
        candidates
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config = Self::parse(&content)?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(content).context("Failed to parse config file")?;
        config.watch_dir = Self::expand_path(&config.watch_dir);
        Ok(config)
    }

    /// Validate the rules against `hooks` and build a resolver
    pub fn build_resolver(&self, hooks: &HookRegistry) -> Result<Resolver> {
        let rules = RuleStore::compile(&self.sources, &self.common_actions, hooks).context("Invalid rules")?;
        Ok(Resolver::new(rules, hooks.clone(), self.resolve_options()))
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            prompt_required: self.common_actions_prompt_required,
            headless: self.headless,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Ports to try for the listener, base first
    pub fn listener_ports(&self) -> impl Iterator<Item = u16> {
        let base = self.port;
        (0..=self.port_range).filter_map(move |offset| base.checked_add(offset))
    }

    /// Get the pelagos directory
    pub fn pelagos_dir() -> PathBuf {
        std::env::var("PELAGOS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("pelagos"))
    }

    /// Expand a path that may contain ~ or env vars
    pub fn expand_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        let expanded = shellexpand::full(&path_str).unwrap_or_else(|_| path_str.clone());
        PathBuf::from(expanded.as_ref())
    }
}
