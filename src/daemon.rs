//! Event loop: watch → resolve → confirm → dispatch

use eyre::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::{ChannelKind, Config};
use crate::confirm::listener::{DecisionEvent, Listener};
use crate::confirm::select::{ProcessSelector, Selector};
use crate::confirm::{
    Answer, BannerChannel, ConfirmationChannel, DialogChannel, Prompt, Solicitation, presenter_command,
};
use crate::dispatch::Dispatcher;
use crate::event::FileEvent;
use crate::hook::HookRegistry;
use crate::registry::{ActionRegistry, Decision, Payload};
use crate::rules::Action;
use crate::rules::resolver::{Resolution, Resolver};
use crate::watch::DownloadWatcher;

/// State shared by every file task
pub struct Engine {
    resolver: RwLock<Arc<Resolver>>,
    registry: Arc<ActionRegistry>,
    dispatcher: Dispatcher,
    channel: Box<dyn ConfirmationChannel>,
    selector: Box<dyn Selector>,
    settle_delay: Duration,
}

impl Engine {
    pub fn new(
        resolver: Resolver,
        registry: Arc<ActionRegistry>,
        dispatcher: Dispatcher,
        channel: Box<dyn ConfirmationChannel>,
        selector: Box<dyn Selector>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            resolver: RwLock::new(Arc::new(resolver)),
            registry,
            dispatcher,
            channel,
            selector,
            settle_delay,
        }
    }

    pub fn resolver(&self) -> Arc<Resolver> {
        Arc::clone(&self.resolver.read().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    pub fn replace_resolver(&self, resolver: Resolver) {
        *self.resolver.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(resolver);
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    /// Full pipeline for one new file
    pub async fn handle_file(&self, path: PathBuf) {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        if !path.exists() {
            log::debug!("{} disappeared before processing", path.display());
            return;
        }

        match tokio::task::spawn_blocking(move || FileEvent::detect(path)).await {
            Ok(event) => self.handle_event(event).await,
            Err(e) => log::error!("Origin detection failed: {}", e),
        }
    }

    /// Resolves an event and routes it to dispatch or confirmation
    pub async fn handle_event(&self, event: FileEvent) {
        let resolver = self.resolver();
        let resolved = tokio::task::spawn_blocking(move || {
            let resolution = resolver.resolve(&event);
            (event, resolution)
        })
        .await;

        let (event, resolution) = match resolved {
            Ok(pair) => pair,
            Err(e) => {
                log::error!("Resolution task failed: {}", e);
                return;
            }
        };

        match resolution {
            Resolution::NoMatch => {}
            Resolution::Determined { action, auto: true, .. } => {
                self.dispatch(&action, &event.path).await;
            }
            Resolution::Determined { action, .. } => {
                self.confirm(&event.path, Payload::Single(action)).await;
            }
            Resolution::Ambiguous { candidates } => {
                self.confirm(&event.path, Payload::Multiple(candidates)).await;
            }
        }
    }

    async fn confirm(&self, path: &Path, payload: Payload) {
        let prompt = Prompt::for_payload(path, &payload);
        let hash = self.registry.register(path, payload.clone());
        log::info!(
            "Awaiting {} confirmation {} for {} via {}",
            payload.kind(),
            hash,
            path.display(),
            self.channel.name()
        );

        match self.channel.solicit(&hash, &prompt).await {
            Ok(Solicitation::Pending) => {}
            Ok(Solicitation::Answered(answer)) => {
                let decision = match answer {
                    Answer::Execute => Decision::Execute,
                    Answer::Skip | Answer::Timeout => Decision::Skip,
                };
                match self.registry.decide(&hash, decision) {
                    Ok(record) => {
                        self.handle_decision(DecisionEvent {
                            record,
                            decision,
                            choice: None,
                        })
                        .await
                    }
                    Err(e) => log::warn!("Decision for {} ignored: {}", hash, e),
                }
            }
            Err(e) => {
                log::warn!("Confirmation for {} failed: {}", path.display(), e);
                self.fallback(&hash, &payload).await;
            }
        }
    }

    /// No answer could be obtained. Ambiguous files get the ranked default
    /// when prompting is optional; everything else is left alone.
    async fn fallback(&self, hash: &str, payload: &Payload) {
        let resolver = self.resolver();
        let best = match payload {
            Payload::Multiple(candidates) if !resolver.options().prompt_required => resolver.rank_best(candidates),
            _ => None,
        };

        match best {
            Some(action) => match self.registry.decide(hash, Decision::Execute) {
                Ok(record) => {
                    log::info!("Falling back to '{}' for {}", action.name, record.path.display());
                    self.dispatch(&action, &record.path).await;
                    self.registry.retire(hash);
                }
                Err(e) => log::warn!("Fallback for {} skipped: {}", hash, e),
            },
            None => {
                self.registry.retire(hash);
            }
        }
    }

    /// Carry out a decided confirmation and retire it
    pub async fn handle_decision(&self, event: DecisionEvent) {
        let DecisionEvent {
            record,
            decision,
            choice,
        } = event;

        if decision == Decision::Execute {
            let action = match &record.payload {
                Payload::Single(action) => Some(action.clone()),
                Payload::Multiple(candidates) => match choice {
                    Some(name) => candidates
                        .iter()
                        .find(|a| a.name == name || a.label() == name)
                        .cloned(),
                    None => self.select(&record.path, &record.payload, candidates).await,
                },
            };

            match action {
                Some(action) => self.dispatch(&action, &record.path).await,
                None => log::info!("No action chosen for {}", record.path.display()),
            }
        } else {
            log::info!("Skipped {}", record.path.display());
        }

        self.registry.retire(&record.hash);
    }

    async fn select(&self, path: &Path, payload: &Payload, candidates: &[Action]) -> Option<Action> {
        let prompt = Prompt::for_payload(path, payload);
        match self.selector.select(&prompt, candidates).await {
            Ok(choice) => choice,
            Err(e) => {
                log::warn!("Selection for {} failed: {}", path.display(), e);
                None
            }
        }
    }

    async fn dispatch(&self, action: &Action, path: &Path) {
        match self.dispatcher.dispatch(action, path).await {
            Ok(outcome) => log::info!(
                "'{}' finished: {:?} (original removed: {})",
                outcome.action,
                outcome.executor,
                outcome.original_removed
            ),
            Err(e) => log::error!("Action '{}' failed for {}: {}", action.name, path.display(), e),
        }
    }
}

/// The long-running watcher process
pub struct Daemon {
    config: Config,
    config_path: Option<PathBuf>,
    hooks: HookRegistry,
}

impl Daemon {
    pub fn new(config: Config, config_path: Option<PathBuf>, hooks: HookRegistry) -> Self {
        Self {
            config,
            config_path,
            hooks,
        }
    }

    pub async fn run(self) -> Result<()> {
        let resolver = self.config.build_resolver(&self.hooks)?;
        let registry = Arc::new(ActionRegistry::new());

        let listener = match Listener::bind(self.config.listener_ports()).await {
            Ok(listener) => Some(listener),
            Err(e) if self.config.confirmation.channel == ChannelKind::Dialog => {
                log::warn!("Local listener unavailable: {}", e);
                None
            }
            Err(e) => return Err(e).context("Failed to bind the local listener"),
        };

        let confirmation = &self.config.confirmation;
        let channel: Box<dyn ConfirmationChannel> = match confirmation.channel {
            ChannelKind::Dialog => Box::new(DialogChannel::new(
                presenter_command(&confirmation.dialog_command, "dialog"),
                confirmation.timeout(),
                confirmation.execute_label.clone(),
                confirmation.skip_label.clone(),
                Arc::clone(&registry),
            )),
            ChannelKind::Banner => Box::new(BannerChannel::new(
                confirmation.banner_command.clone(),
                listener.as_ref().map(|l| l.port()).unwrap_or(self.config.port),
                confirmation.timeout_secs,
            )),
        };
        let selector = Box::new(ProcessSelector::new(
            presenter_command(&confirmation.select_command, "select"),
            confirmation.timeout(),
        ));

        let engine = Arc::new(Engine::new(
            resolver,
            Arc::clone(&registry),
            Dispatcher::builtin(),
            channel,
            selector,
            self.config.settle_delay(),
        ));

        let mut tasks = Vec::new();

        let (decisions_tx, mut decisions_rx) = mpsc::channel::<DecisionEvent>(64);
        if let Some(listener) = listener {
            tasks.push(tokio::spawn(listener.serve(Arc::clone(&registry), decisions_tx)));
        }

        {
            let engine = Arc::clone(&engine);
            tasks.push(tokio::spawn(async move {
                while let Some(event) = decisions_rx.recv().await {
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move { engine.handle_decision(event).await });
                }
            }));
        }

        {
            let registry = Arc::clone(&registry);
            let ttl = self.config.registry.ttl();
            let mut interval = tokio::time::interval(self.config.registry.sweep_interval());
            tasks.push(tokio::spawn(async move {
                loop {
                    interval.tick().await;
                    let expired = registry.sweep_expired(ttl);
                    if expired > 0 {
                        log::info!("Expired {} unanswered confirmation(s)", expired);
                    }
                }
            }));
        }

        if let (Some(path), true) = (self.config_path.clone(), self.config.reload_interval_secs > 0) {
            let engine = Arc::clone(&engine);
            let hooks = self.hooks.clone();
            let mut interval = tokio::time::interval(Duration::from_secs(self.config.reload_interval_secs));
            tasks.push(tokio::spawn(async move {
                // The first tick fires immediately
                interval.tick().await;
                loop {
                    interval.tick().await;
                    reload_rules(&engine, &path, &hooks);
                }
            }));
        }

        let mut watcher = DownloadWatcher::start(&self.config.watch_dir, &self.config.ignore)
            .context(format!("Failed to watch {}", self.config.watch_dir.display()))?;

        log::info!("pelagos daemon running");
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                next = watcher.next() => match next {
                    Some(path) => {
                        log::info!("New file: {}", path.display());
                        let engine = Arc::clone(&engine);
                        tokio::spawn(async move { engine.handle_file(path).await });
                    }
                    None => {
                        log::warn!("Watcher stopped");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    log::info!("Shutdown requested");
                    break;
                }
            }
        }

        for task in tasks {
            task.abort();
        }
        let pending = engine.registry().pending().len();
        if pending > 0 {
            log::info!("Dropping {} pending confirmation(s)", pending);
        }
        Ok(())
    }
}

fn reload_rules(engine: &Engine, path: &Path, hooks: &HookRegistry) {
    let result = Config::load_from_file(path).and_then(|config| config.build_resolver(hooks));
    match result {
        Ok(resolver) => {
            engine.replace_resolver(resolver);
            log::debug!("Rules reloaded from {}", path.display());
        }
        Err(e) => log::warn!("Keeping previous rules, reload failed: {:#}", e),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::ConfirmationError;
    use crate::rules::resolver::ResolveOptions;
    use crate::rules::{ActionDoc, ActionType, FilterDoc, RegexTarget, RuleStore, SourceDoc, UrlMatch};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    /// Answers every prompt the same way
    struct Scripted {
        answer: Result<Solicitation, ()>,
    }

    #[async_trait]
    impl ConfirmationChannel for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn solicit(&self, hash: &str, _prompt: &Prompt) -> Result<Solicitation, ConfirmationError> {
            assert_eq!(hash.len(), 16);
            self.answer.clone().map_err(|_| ConfirmationError::NoCommand)
        }
    }

    struct PickLast;

    #[async_trait]
    impl Selector for PickLast {
        async fn select(&self, _prompt: &Prompt, candidates: &[Action]) -> Result<Option<Action>, ConfirmationError> {
            Ok(candidates.last().cloned())
        }
    }

    fn copy_doc(name: &str, target: &Path, pattern: &str) -> ActionDoc {
        ActionDoc {
            action_type: Some(ActionType::Copy),
            name: Some(name.to_string()),
            target: Some(target.display().to_string()),
            filters: Some(vec![FilterDoc::Regex {
                pattern: pattern.to_string(),
                ignore_case: true,
                target: RegexTarget::Filename,
            }]),
            ..Default::default()
        }
    }

    fn engine(
        sources: Vec<SourceDoc>,
        templates: Vec<ActionDoc>,
        answer: Result<Solicitation, ()>,
        options: ResolveOptions,
    ) -> Engine {
        let hooks = HookRegistry::builtin();
        let rules = RuleStore::compile(&sources, &templates, &hooks).unwrap();
        Engine::new(
            Resolver::new(rules, hooks, options),
            Arc::new(ActionRegistry::new()),
            Dispatcher::builtin(),
            Box::new(Scripted { answer }),
            Box::new(PickLast),
            Duration::ZERO,
        )
    }

    fn download(temp: &TempDir, name: &str) -> PathBuf {
        let path = temp.path().join(name);
        fs::write(&path, b"payload").unwrap();
        path
    }

    #[tokio::test]
    async fn test_single_confirmed_action_is_dispatched_and_retired() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("out");
        let engine = engine(
            Vec::new(),
            vec![copy_doc("Archive", &out, r"\.zip$")],
            Ok(Solicitation::Answered(Answer::Execute)),
            ResolveOptions::default(),
        );

        let file = download(&temp, "a.zip");
        engine.handle_file(file.clone()).await;

        assert!(out.join("a.zip").exists());
        assert!(!file.exists());
        assert!(engine.registry().pending().is_empty());
    }

    #[tokio::test]
    async fn test_skip_keeps_file() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("out");
        let engine = engine(
            Vec::new(),
            vec![copy_doc("Archive", &out, r"\.zip$")],
            Ok(Solicitation::Answered(Answer::Timeout)),
            ResolveOptions::default(),
        );

        let file = download(&temp, "a.zip");
        engine.handle_file(file.clone()).await;

        assert!(file.exists());
        assert!(!out.exists());
        assert!(engine.registry().pending().is_empty());
    }

    #[tokio::test]
    async fn test_pending_banner_leaves_record_for_listener() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("out");
        let engine = engine(
            Vec::new(),
            vec![copy_doc("Archive", &out, r"\.zip$")],
            Ok(Solicitation::Pending),
            ResolveOptions::default(),
        );

        let file = download(&temp, "a.zip");
        engine.handle_file(file.clone()).await;

        let pending = engine.registry().pending();
        assert_eq!(pending.len(), 1);

        let record = engine.registry().decide(&pending[0].hash, Decision::Execute).unwrap();
        engine
            .handle_decision(DecisionEvent {
                record,
                decision: Decision::Execute,
                choice: None,
            })
            .await;

        assert!(out.join("a.zip").exists());
        assert!(engine.registry().pending().is_empty());
    }

    /// Fails the test if a prompt is ever shown
    struct Silent;

    #[async_trait]
    impl ConfirmationChannel for Silent {
        fn name(&self) -> &'static str {
            "silent"
        }

        async fn solicit(&self, hash: &str, _prompt: &Prompt) -> Result<Solicitation, ConfirmationError> {
            panic!("auto action {} must not prompt", hash);
        }
    }

    #[tokio::test]
    async fn test_auto_source_dispatches_without_record() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("out");
        let source = SourceDoc {
            name: "local".to_string(),
            url: "/".to_string(),
            url_match: UrlMatch::Substring,
            tags: Vec::new(),
            action: ActionDoc {
                auto: Some(true),
                ..copy_doc("Archive", &out, ".")
            },
        };
        let hooks = HookRegistry::builtin();
        let rules = RuleStore::compile(&[source], &[], &hooks).unwrap();
        let engine = Engine::new(
            Resolver::new(rules, hooks, ResolveOptions::default()),
            Arc::new(ActionRegistry::new()),
            Dispatcher::builtin(),
            Box::new(Silent),
            Box::new(PickLast),
            Duration::ZERO,
        );

        let file = download(&temp, "a.zip");
        engine
            .handle_event(FileEvent::new(&file, Some("file:///downloads/a.zip".to_string())))
            .await;

        assert!(out.join("a.zip").exists());
        assert!(!file.exists());
        assert!(engine.registry().pending().is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_uses_selector() {
        let temp = tempdir().unwrap();
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        let engine = engine(
            Vec::new(),
            vec![copy_doc("First", &first, "cbz"), copy_doc("Second", &second, "issue")],
            Ok(Solicitation::Answered(Answer::Execute)),
            ResolveOptions::default(),
        );

        engine.handle_file(download(&temp, "issue.cbz")).await;

        assert!(second.join("issue.cbz").exists());
        assert!(!first.exists());
    }

    #[tokio::test]
    async fn test_failed_channel_falls_back_to_ranking_when_prompt_optional() {
        let temp = tempdir().unwrap();
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        let options = ResolveOptions {
            prompt_required: false,
            headless: false,
        };
        let engine = engine(
            Vec::new(),
            vec![copy_doc("First", &first, "cbz"), copy_doc("Second", &second, "issue")],
            Err(()),
            options,
        );

        engine.handle_file(download(&temp, "issue.cbz")).await;

        assert!(first.join("issue.cbz").exists());
        assert!(engine.registry().pending().is_empty());
    }

    #[tokio::test]
    async fn test_failed_channel_leaves_file_when_prompt_required() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("out");
        let engine = engine(
            Vec::new(),
            vec![copy_doc("Archive", &out, r"\.zip$")],
            Err(()),
            ResolveOptions::default(),
        );

        let file = download(&temp, "a.zip");
        engine.handle_file(file.clone()).await;

        assert!(file.exists());
        assert!(engine.registry().pending().is_empty());
    }

    #[test]
    fn test_reload_keeps_previous_rules_on_error() {
        let temp = tempdir().unwrap();
        let engine = engine(
            Vec::new(),
            vec![copy_doc("Archive", temp.path(), "zip")],
            Err(()),
            ResolveOptions::default(),
        );
        let config_path = temp.path().join("pelagos.yaml");

        fs::write(&config_path, "commonActions:\n  - name: Broken\n    type: scp\n").unwrap();
        reload_rules(&engine, &config_path, &HookRegistry::builtin());
        assert!(engine.resolver().rules().template("Archive").is_some());

        fs::write(&config_path, "commonActions:\n  - name: Fresh\n    type: dummy\n").unwrap();
        reload_rules(&engine, &config_path, &HookRegistry::builtin());
        assert!(engine.resolver().rules().template("Fresh").is_some());
    }
}
