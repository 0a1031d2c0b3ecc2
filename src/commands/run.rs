//! Run the download watcher daemon

use eyre::{Context, Result};
use std::path::PathBuf;

use crate::config::Config;
use crate::daemon::Daemon;
use crate::hook::HookRegistry;

pub fn run(watch_dir: Option<PathBuf>, mut config: Config, config_path: Option<PathBuf>) -> Result<()> {
    if let Some(dir) = watch_dir {
        config.watch_dir = Config::expand_path(&dir);
    }

    let hooks = HookRegistry::builtin();
    // Fail before starting anything when the rules are broken
    config.build_resolver(&hooks).context("Refusing to start")?;

    log::info!(
        "Starting daemon: {} source(s), {} common action(s), watching {}",
        config.sources.len(),
        config.common_actions.len(),
        config.watch_dir.display()
    );
    println!("Watching {} (Ctrl-C to stop)", config.watch_dir.display());

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(Daemon::new(config, config_path, hooks).run())
}
