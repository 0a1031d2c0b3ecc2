//! File event → resolution

use serde::Serialize;

use crate::event::FileEvent;
use crate::hook::HookRegistry;

use super::filter::evaluate_template;
use super::{Action, RuleStore, Source};

/// Resolver behavior switches taken from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    pub prompt_required: bool,
    pub headless: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            prompt_required: true,
            headless: false,
        }
    }
}

/// What should happen to a file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "resolution", rename_all = "camelCase")]
pub enum Resolution {
    NoMatch,
    Determined {
        action: Action,
        auto: bool,
        /// Name of the matching source, if the decision came from one
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    Ambiguous {
        candidates: Vec<Action>,
    },
}

impl Resolution {
    pub fn needs_confirmation(&self) -> bool {
        match self {
            Resolution::NoMatch => false,
            Resolution::Determined { auto, .. } => !auto,
            Resolution::Ambiguous { .. } => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolver {
    rules: RuleStore,
    hooks: HookRegistry,
    options: ResolveOptions,
}

impl Resolver {
    pub fn new(rules: RuleStore, hooks: HookRegistry, options: ResolveOptions) -> Self {
        Self { rules, hooks, options }
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn options(&self) -> ResolveOptions {
        self.options
    }

    /// First source, in declaration order, whose URL predicate accepts `origin`
    pub fn match_source(&self, origin: &str) -> Option<&Source> {
        self.rules.sources.iter().find(|s| s.matches(origin))
    }

    pub fn resolve(&self, event: &FileEvent) -> Resolution {
        if let Some(source) = event.origin_url.as_deref().and_then(|url| self.match_source(url)) {
            log::info!(
                "{}: matched source '{}' -> {}",
                event.file_name(),
                source.name,
                source.action.name
            );
            return Resolution::Determined {
                action: source.action.clone(),
                auto: source.action.auto,
                source: Some(source.name.clone()),
            };
        }

        let mut candidates = self.matching_templates(event);
        match candidates.len() {
            0 => {
                log::debug!("{}: no matching action", event.file_name());
                Resolution::NoMatch
            }
            1 => {
                let action = candidates.remove(0);
                log::info!("{}: matched common action '{}'", event.file_name(), action.name);
                Resolution::Determined {
                    auto: action.auto,
                    action,
                    source: None,
                }
            }
            n => {
                log::info!("{}: {} common actions match", event.file_name(), n);
                if !self.options.prompt_required && self.options.headless {
                    if let Some(action) = self.rank_best(&candidates) {
                        log::info!("{}: headless, picked '{}'", event.file_name(), action.name);
                        return Resolution::Determined {
                            auto: action.auto,
                            action,
                            source: None,
                        };
                    }
                }
                Resolution::Ambiguous { candidates }
            }
        }
    }

    /// Every template accepting the file, in declaration order, annotated
    fn matching_templates(&self, event: &FileEvent) -> Vec<Action> {
        self.rules
            .templates
            .iter()
            .filter_map(|template| {
                let verdict = evaluate_template(template, event, false, &self.hooks);
                verdict
                    .passed
                    .then(|| template.action.clone().with_annotations(verdict.annotations))
            })
            .collect()
    }

    /// Most specific candidate; ties go to the earliest declared template
    pub fn rank_best(&self, candidates: &[Action]) -> Option<Action> {
        candidates
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                let rank = |name: &str, fallback: usize| {
                    let specificity = self.rules.template(name).map(|t| t.specificity()).unwrap_or(0);
                    let index = self.rules.template_index(name).unwrap_or(fallback);
                    (specificity, std::cmp::Reverse(index))
                };
                rank(&a.name, *ia).cmp(&rank(&b.name, *ib))
            })
            .map(|(_, action)| action.clone())
    }
}
