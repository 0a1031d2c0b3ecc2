//! Filter evaluation

use crate::event::FileEvent;
use crate::hook::{HookContext, HookRegistry};

use super::{Filter, RegexTarget, Template};

/// Result of evaluating a filter or filter list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdict {
    pub passed: bool,
    /// Data carried forward from value-returning hooks
    pub annotations: HookContext,
}

impl Verdict {
    fn pass() -> Self {
        Self {
            passed: true,
            annotations: HookContext::new(),
        }
    }

    fn fail() -> Self {
        Self::default()
    }
}

/// Evaluate a single filter against a file
pub fn evaluate(filter: &Filter, event: &FileEvent, had_source_match: bool, hooks: &HookRegistry) -> Verdict {
    match filter {
        Filter::Regex { regex, target } => {
            let subject = match target {
                RegexTarget::Filename => event.file_name(),
                RegexTarget::Path => event.path.to_string_lossy().to_string(),
                RegexTarget::Extension => event
                    .path
                    .extension()
                    .map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_default(),
            };
            if regex.is_match(&subject) { Verdict::pass() } else { Verdict::fail() }
        }
        Filter::NoSource => {
            if had_source_match {
                Verdict::fail()
            } else {
                Verdict::pass()
            }
        }
        Filter::Hook { name, context } => match hooks.invoke(name, &event.path, context) {
            Ok(outcome) if outcome.passes() => Verdict {
                passed: true,
                annotations: outcome.annotations(name),
            },
            Ok(_) => Verdict::fail(),
            Err(e) => {
                log::warn!("Filter failed: {}", e);
                Verdict::fail()
            }
        },
    }
}

/// AND over a filter list, stopping at the first failure; empty passes
pub fn evaluate_all(filters: &[Filter], event: &FileEvent, had_source_match: bool, hooks: &HookRegistry) -> Verdict {
    let mut annotations = HookContext::new();
    for filter in filters {
        let verdict = evaluate(filter, event, had_source_match, hooks);
        if !verdict.passed {
            return Verdict::fail();
        }
        annotations.extend(verdict.annotations);
    }
    Verdict {
        passed: true,
        annotations,
    }
}

/// Whether a template accepts the file.
///
/// The legacy extension globs are ORed with the rich filters. A template
/// with only one of the two is decided by that one alone.
pub fn evaluate_template(template: &Template, event: &FileEvent, had_source_match: bool, hooks: &HookRegistry) -> Verdict {
    let Some(globs) = &template.extensions else {
        return evaluate_all(&template.filters, event, had_source_match, hooks);
    };

    let glob_match = globs.is_match(&event.file_name());
    if template.filters.is_empty() {
        return if glob_match { Verdict::pass() } else { Verdict::fail() };
    }

    let verdict = evaluate_all(&template.filters, event, had_source_match, hooks);
    if verdict.passed || !glob_match {
        verdict
    } else {
        Verdict::pass()
    }
}
