//! Sources, common action templates and their filters
//!
//! The `*Doc` types mirror the configuration document. `RuleStore::compile`
//! validates them against the hook table and produces the read-only rule set
//! used by the resolver.

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

use crate::hook::{HookContext, HookRegistry};

pub mod filter;
pub mod resolver;

/// Configuration-shape errors; fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate source name '{0}'")]
    DuplicateSource(String),

    #[error("duplicate common action name '{0}'")]
    DuplicateTemplate(String),

    #[error("source '{source_name}' references unknown common action '{template}'")]
    UnknownTemplate { source_name: String, template: String },

    #[error("{owner}: unknown hook '{hook}'")]
    UnknownHook { owner: String, hook: String },

    #[error("{owner}: invalid regex '{pattern}': {source}")]
    InvalidRegex {
        owner: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{owner}: invalid extension glob '{pattern}': {source}")]
    InvalidGlob {
        owner: String,
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("{owner}: missing required field '{field}'")]
    MissingField { owner: String, field: &'static str },

    #[error("{owner}: action type '{found}' is not allowed here")]
    InvalidActionType { owner: String, found: String },

    #[error("source '{source_name}' has an empty url")]
    EmptyUrl { source_name: String },
}

/// Action types accepted in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Scp,
    Copy,
    Dummy,
    /// Reference to a common action template
    Common,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionType::Scp => "scp",
            ActionType::Copy => "copy",
            ActionType::Dummy => "dummy",
            ActionType::Common => "common",
        };
        write!(f, "{}", s)
    }
}

/// What to do when the destination already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwriteRule {
    #[default]
    Replace,
    Skip,
}

/// Which part of the path a regex filter looks at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegexTarget {
    #[default]
    Filename,
    Path,
    Extension,
}

/// How a source's `url` is compared with a file's origin URL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlMatch {
    /// Same host or a subdomain of it
    #[default]
    Domain,
    Prefix,
    Substring,
}

fn default_true() -> bool {
    true
}

/// A filter as written in the document
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FilterDoc {
    Regex {
        pattern: String,
        #[serde(default = "default_true", rename = "ignoreCase", alias = "caseInsensitive")]
        ignore_case: bool,
        #[serde(default)]
        target: RegexTarget,
    },
    NoSource,
    Hook {
        name: String,
        #[serde(default)]
        context: HookContext,
    },
}

/// An action definition as written in the document.
///
/// Every field is optional so the same shape describes templates, inline
/// source actions and the overrides on a `common` reference.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDoc {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_original: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<OverwriteRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<FilterDoc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
}

impl ActionDoc {
    /// Apply `overrides` on top of `self`: last write wins per field, lists
    /// are replaced wholesale, `type` and `name` are never overridden.
    pub fn overlay(&self, overrides: &ActionDoc) -> ActionDoc {
        fn pick<T: Clone>(base: &Option<T>, over: &Option<T>) -> Option<T> {
            over.clone().or_else(|| base.clone())
        }

        ActionDoc {
            action_type: self.action_type,
            name: self.name.clone(),
            display_name: pick(&self.display_name, &overrides.display_name),
            target: pick(&self.target, &overrides.target),
            private_key: pick(&self.private_key, &overrides.private_key),
            rename: pick(&self.rename, &overrides.rename),
            keep_original: pick(&self.keep_original, &overrides.keep_original),
            overwrite: pick(&self.overwrite, &overrides.overwrite),
            auto: pick(&self.auto, &overrides.auto),
            filters: pick(&self.filters, &overrides.filters),
            extensions: pick(&self.extensions, &overrides.extensions),
        }
    }
}

/// A source as written in the document
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDoc {
    pub name: String,
    pub url: String,
    #[serde(default, rename = "match")]
    pub url_match: UrlMatch,
    #[serde(default)]
    pub tags: Vec<String>,
    pub action: ActionDoc,
}

/// Executor-specific parameters of a resolved action
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionKind {
    Scp {
        target: String,
        #[serde(default, rename = "privateKey", skip_serializing_if = "Option::is_none")]
        private_key: Option<String>,
    },
    Copy {
        target: PathBuf,
    },
    Dummy,
}

impl ActionKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::Scp { .. } => "scp",
            ActionKind::Copy { .. } => "copy",
            ActionKind::Dummy => "dummy",
        }
    }

    pub fn target(&self) -> Option<String> {
        match self {
            ActionKind::Scp { target, .. } => Some(target.clone()),
            ActionKind::Copy { target } => Some(target.display().to_string()),
            ActionKind::Dummy => None,
        }
    }
}

/// A fully resolved, executable action
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename: Option<String>,
    #[serde(default)]
    pub keep_original: bool,
    #[serde(default)]
    pub overwrite: OverwriteRule,
    #[serde(default)]
    pub auto: bool,
    /// Data contributed by value-returning hooks
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub annotations: HookContext,
}

impl Action {
    /// Build an action from a document entry. `default_name` is used when the
    /// entry carries no name of its own.
    pub fn from_doc(doc: &ActionDoc, owner: &str, default_name: Option<&str>) -> Result<Self, ConfigError> {
        let name = doc
            .name
            .clone()
            .or_else(|| default_name.map(str::to_string))
            .ok_or_else(|| ConfigError::MissingField {
                owner: owner.to_string(),
                field: "name",
            })?;

        let action_type = doc.action_type.ok_or_else(|| ConfigError::MissingField {
            owner: owner.to_string(),
            field: "type",
        })?;

        let require_target = || {
            doc.target.clone().ok_or_else(|| ConfigError::MissingField {
                owner: owner.to_string(),
                field: "target",
            })
        };

        let kind = match action_type {
            ActionType::Scp => ActionKind::Scp {
                target: require_target()?,
                private_key: doc.private_key.clone(),
            },
            ActionType::Copy => ActionKind::Copy {
                target: PathBuf::from(require_target()?),
            },
            ActionType::Dummy => ActionKind::Dummy,
            ActionType::Common => {
                return Err(ConfigError::InvalidActionType {
                    owner: owner.to_string(),
                    found: action_type.to_string(),
                });
            }
        };

        Ok(Self {
            name,
            display_name: doc.display_name.clone(),
            kind,
            rename: doc.rename.clone(),
            keep_original: doc.keep_original.unwrap_or(false),
            overwrite: doc.overwrite.unwrap_or_default(),
            auto: doc.auto.unwrap_or(false),
            annotations: HookContext::new(),
        })
    }

    /// Name shown to the user
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn with_annotations(mut self, annotations: HookContext) -> Self {
        self.annotations.extend(annotations);
        self
    }
}

/// A compiled filter
#[derive(Debug, Clone)]
pub enum Filter {
    Regex { regex: Regex, target: RegexTarget },
    NoSource,
    Hook { name: String, context: HookContext },
}

impl Filter {
    fn compile(doc: &FilterDoc, owner: &str, hooks: &HookRegistry) -> Result<Self, ConfigError> {
        match doc {
            FilterDoc::Regex {
                pattern,
                ignore_case,
                target,
            } => {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(*ignore_case)
                    .build()
                    .map_err(|source| ConfigError::InvalidRegex {
                        owner: owner.to_string(),
                        pattern: pattern.clone(),
                        source,
                    })?;
                Ok(Filter::Regex { regex, target: *target })
            }
            FilterDoc::NoSource => Ok(Filter::NoSource),
            FilterDoc::Hook { name, context } => {
                if !hooks.contains(name) {
                    return Err(ConfigError::UnknownHook {
                        owner: owner.to_string(),
                        hook: name.clone(),
                    });
                }
                Ok(Filter::Hook {
                    name: name.clone(),
                    context: context.clone(),
                })
            }
        }
    }
}

/// Legacy extension glob list
#[derive(Debug, Clone)]
pub struct ExtensionGlobs {
    pub patterns: Vec<String>,
    set: GlobSet,
}

impl ExtensionGlobs {
    fn compile(patterns: &[String], owner: &str) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(&pattern.to_lowercase()).map_err(|source| ConfigError::InvalidGlob {
                owner: owner.to_string(),
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| ConfigError::InvalidGlob {
            owner: owner.to_string(),
            pattern: patterns.join(","),
            source,
        })?;
        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    /// Matches the lowercased file name or its bare extension
    pub fn is_match(&self, file_name: &str) -> bool {
        let name = file_name.to_lowercase();
        let extension = std::path::Path::new(&name)
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        self.set.is_match(&name) || (!extension.is_empty() && self.set.is_match(&extension))
    }
}

/// A compiled common action template
#[derive(Debug, Clone)]
pub struct Template {
    pub action: Action,
    pub filters: Vec<Filter>,
    pub extensions: Option<ExtensionGlobs>,
    doc: ActionDoc,
}

impl Template {
    fn compile(doc: &ActionDoc, hooks: &HookRegistry) -> Result<Self, ConfigError> {
        let owner = format!("common action '{}'", doc.name.as_deref().unwrap_or("<unnamed>"));
        let action = Action::from_doc(doc, &owner, None)?;
        let (filters, extensions) = compile_filters(doc, &owner, hooks)?;
        Ok(Self {
            action,
            filters,
            extensions,
            doc: doc.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.action.name
    }

    /// Ranking weight when several templates match: more filters is more specific
    pub fn specificity(&self) -> usize {
        self.filters.len() + usize::from(self.extensions.is_some())
    }
}

fn compile_filters(
    doc: &ActionDoc,
    owner: &str,
    hooks: &HookRegistry,
) -> Result<(Vec<Filter>, Option<ExtensionGlobs>), ConfigError> {
    let filters = doc
        .filters
        .iter()
        .flatten()
        .map(|f| Filter::compile(f, owner, hooks))
        .collect::<Result<Vec<_>, _>>()?;
    let extensions = match &doc.extensions {
        Some(patterns) if !patterns.is_empty() => Some(ExtensionGlobs::compile(patterns, owner)?),
        _ => None,
    };
    Ok((filters, extensions))
}

/// A compiled source
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub url: String,
    pub url_match: UrlMatch,
    pub tags: Vec<String>,
    /// Template this source's action was materialized from, if any
    pub template: Option<String>,
    pub action: Action,
    host: Option<String>,
}

impl Source {
    fn compile(doc: &SourceDoc, templates: &[Template], hooks: &HookRegistry) -> Result<Self, ConfigError> {
        if doc.url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl {
                source_name: doc.name.clone(),
            });
        }
        let owner = format!("source '{}'", doc.name);

        let (template, action) = match doc.action.action_type {
            Some(ActionType::Common) => {
                let template_name = doc.action.name.clone().ok_or_else(|| ConfigError::MissingField {
                    owner: owner.clone(),
                    field: "action.name",
                })?;
                let template = templates
                    .iter()
                    .find(|t| t.name() == template_name)
                    .ok_or_else(|| ConfigError::UnknownTemplate {
                        source_name: doc.name.clone(),
                        template: template_name.clone(),
                    })?;
                let merged = template.doc.overlay(&doc.action);
                // Overridden filters still have to reference known hooks
                compile_filters(&merged, &owner, hooks)?;
                (Some(template_name), Action::from_doc(&merged, &owner, None)?)
            }
            _ => (None, Action::from_doc(&doc.action, &owner, Some(&doc.name))?),
        };

        Ok(Self {
            name: doc.name.clone(),
            url: doc.url.clone(),
            url_match: doc.url_match,
            tags: doc.tags.clone(),
            template,
            action,
            host: host_of(&doc.url),
        })
    }

    /// Whether this source's URL predicate accepts `origin`
    pub fn matches(&self, origin: &str) -> bool {
        match self.url_match {
            UrlMatch::Prefix => origin.starts_with(&self.url),
            UrlMatch::Substring => origin.contains(&self.url),
            UrlMatch::Domain => {
                let (Some(source_host), Some(origin_host)) = (self.host.as_deref(), host_of(origin)) else {
                    return false;
                };
                origin_host == source_host || origin_host.ends_with(&format!(".{}", source_host))
            }
        }
    }
}

/// Lowercased host of a URL; bare hosts without a scheme are accepted
fn host_of(raw: &str) -> Option<String> {
    match url::Url::parse(raw) {
        Ok(parsed) => parsed.host_str().map(|h| h.to_lowercase()),
        Err(_) => {
            let host = raw.split(['/', ':', '?', '#']).next().unwrap_or("").trim();
            if host.is_empty() { None } else { Some(host.to_lowercase()) }
        }
    }
}

/// Read-only rule set
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    pub sources: Vec<Source>,
    pub templates: Vec<Template>,
}

impl RuleStore {
    pub fn compile(sources: &[SourceDoc], common_actions: &[ActionDoc], hooks: &HookRegistry) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut templates = Vec::with_capacity(common_actions.len());
        for doc in common_actions {
            let template = Template::compile(doc, hooks)?;
            if !seen.insert(template.name().to_string()) {
                return Err(ConfigError::DuplicateTemplate(template.name().to_string()));
            }
            templates.push(template);
        }

        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(sources.len());
        for doc in sources {
            if !seen.insert(doc.name.clone()) {
                return Err(ConfigError::DuplicateSource(doc.name.clone()));
            }
            compiled.push(Source::compile(doc, &templates, hooks)?);
        }

        Ok(Self {
            sources: compiled,
            templates,
        })
    }

    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name() == name)
    }

    /// Declaration index of a template
    pub fn template_index(&self, name: &str) -> Option<usize> {
        self.templates.iter().position(|t| t.name() == name)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn scp(name: &str, target: &str) -> ActionDoc {
        ActionDoc {
            action_type: Some(ActionType::Scp),
            name: Some(name.to_string()),
            target: Some(target.to_string()),
            ..Default::default()
        }
    }

    pub fn source(name: &str, url: &str, action: ActionDoc) -> SourceDoc {
        SourceDoc {
            name: name.to_string(),
            url: url.to_string(),
            url_match: UrlMatch::Domain,
            tags: Vec::new(),
            action,
        }
    }

    pub fn regex(pattern: &str) -> FilterDoc {
        FilterDoc::Regex {
            pattern: pattern.to_string(),
            ignore_case: true,
            target: RegexTarget::Filename,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn hooks() -> HookRegistry {
        HookRegistry::builtin()
    }

    #[test]
    fn test_parse_filter_docs() {
        let yaml = r#"
- type: regex
  pattern: "\\.cbz$"
  caseInsensitive: false
- type: noSource
- type: hook
  name: isMagazine
  context:
    allowedNames: [poster.jpg]
"#;
        let filters: Vec<FilterDoc> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(filters.len(), 3);
        assert!(matches!(&filters[0], FilterDoc::Regex { ignore_case: false, .. }));
        assert_eq!(filters[1], FilterDoc::NoSource);
        assert!(matches!(&filters[2], FilterDoc::Hook { name, context } if name == "isMagazine" && context.contains_key("allowedNames")));
    }

    #[test]
    fn test_regex_ignore_case_defaults_to_true() {
        let filter: FilterDoc = serde_yaml::from_str("type: regex\npattern: abc").unwrap();
        assert!(matches!(filter, FilterDoc::Regex { ignore_case: true, .. }));
    }

    #[test]
    fn test_overlay_is_shallow_and_replaces_filters() {
        let base = ActionDoc {
            filters: Some(vec![regex("a"), FilterDoc::NoSource]),
            keep_original: Some(true),
            auto: Some(false),
            ..scp("Manga", "nas:/manga")
        };
        let overrides = ActionDoc {
            action_type: Some(ActionType::Common),
            name: Some("Manga".to_string()),
            auto: Some(true),
            filters: Some(vec![regex("b")]),
            ..Default::default()
        };

        let merged = base.overlay(&overrides);
        assert_eq!(merged.action_type, Some(ActionType::Scp));
        assert_eq!(merged.auto, Some(true));
        assert_eq!(merged.keep_original, Some(true));
        assert_eq!(merged.target.as_deref(), Some("nas:/manga"));
        assert_eq!(merged.filters, Some(vec![regex("b")]));
    }

    #[test]
    fn test_common_reference_materialized_with_overrides() {
        let templates = vec![ActionDoc {
            private_key: Some("~/.ssh/nas".to_string()),
            ..scp("Manga", "nas:/manga")
        }];
        let sources = vec![source(
            "site-a",
            "https://site-a.example",
            ActionDoc {
                action_type: Some(ActionType::Common),
                name: Some("Manga".to_string()),
                target: Some("nas:/manga/site-a".to_string()),
                auto: Some(true),
                ..Default::default()
            },
        )];

        let store = RuleStore::compile(&sources, &templates, &hooks()).unwrap();
        let source = store.source("site-a").unwrap();
        assert_eq!(source.template.as_deref(), Some("Manga"));
        assert_eq!(source.action.name, "Manga");
        assert!(source.action.auto);
        assert_eq!(
            source.action.kind,
            ActionKind::Scp {
                target: "nas:/manga/site-a".to_string(),
                private_key: Some("~/.ssh/nas".to_string()),
            }
        );
    }

    #[test]
    fn test_unknown_template_rejected() {
        let sources = vec![source(
            "site-a",
            "https://site-a.example",
            ActionDoc {
                action_type: Some(ActionType::Common),
                name: Some("Missing".to_string()),
                ..Default::default()
            },
        )];
        let err = RuleStore::compile(&sources, &[], &hooks()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTemplate { .. }));
    }

    #[test]
    fn test_unknown_hook_rejected() {
        let templates = vec![ActionDoc {
            filters: Some(vec![FilterDoc::Hook {
                name: "isSpreadsheet".to_string(),
                context: HookContext::new(),
            }]),
            ..scp("Docs", "nas:/docs")
        }];
        let err = RuleStore::compile(&[], &templates, &hooks()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownHook { hook, .. } if hook == "isSpreadsheet"));
    }

    #[test]
    fn test_malformed_regex_rejected() {
        let templates = vec![ActionDoc {
            filters: Some(vec![regex("([unclosed")]),
            ..scp("Docs", "nas:/docs")
        }];
        let err = RuleStore::compile(&[], &templates, &hooks()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRegex { .. }));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let templates = vec![scp("Docs", "a:/"), scp("Docs", "b:/")];
        assert!(matches!(
            RuleStore::compile(&[], &templates, &hooks()).unwrap_err(),
            ConfigError::DuplicateTemplate(_)
        ));

        let sources = vec![
            source("a", "https://a.example", scp("x", "a:/")),
            source("a", "https://b.example", scp("y", "b:/")),
        ];
        assert!(matches!(
            RuleStore::compile(&sources, &[], &hooks()).unwrap_err(),
            ConfigError::DuplicateSource(_)
        ));
    }

    #[test]
    fn test_scp_requires_target() {
        let doc = ActionDoc {
            action_type: Some(ActionType::Scp),
            name: Some("x".to_string()),
            ..Default::default()
        };
        let err = Action::from_doc(&doc, "test", None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "target", .. }));
    }

    #[test]
    fn test_inline_action_named_after_source() {
        let sources = vec![source(
            "site-a",
            "https://site-a.example",
            ActionDoc {
                action_type: Some(ActionType::Dummy),
                ..Default::default()
            },
        )];
        let store = RuleStore::compile(&sources, &[], &hooks()).unwrap();
        assert_eq!(store.sources[0].action.name, "site-a");
    }

    #[test]
    fn test_domain_match() {
        let store = RuleStore::compile(
            &[source("a", "https://site-a.example", scp("x", "h:/"))],
            &[],
            &hooks(),
        )
        .unwrap();
        let src = &store.sources[0];
        assert!(src.matches("https://site-a.example/x.zip"));
        assert!(src.matches("https://cdn.site-a.example/x.zip"));
        assert!(!src.matches("https://evil-site-a.example/x.zip"));
        assert!(!src.matches("not a url"));
    }

    #[test]
    fn test_prefix_and_substring_match() {
        let mut prefix = source("p", "https://site-a.example/manga/", scp("x", "h:/"));
        prefix.url_match = UrlMatch::Prefix;
        let mut substring = source("s", "/downloads/", scp("y", "h:/"));
        substring.url_match = UrlMatch::Substring;

        let store = RuleStore::compile(&[prefix, substring], &[], &hooks()).unwrap();
        assert!(store.sources[0].matches("https://site-a.example/manga/1.zip"));
        assert!(!store.sources[0].matches("https://site-a.example/books/1.zip"));
        assert!(store.sources[1].matches("https://other.example/downloads/1.zip"));
    }

    #[test]
    fn test_extension_globs() {
        let globs = ExtensionGlobs::compile(&["cbz".to_string(), "*.ZIP".to_string()], "t").unwrap();
        assert!(globs.is_match("Issue.CBZ"));
        assert!(globs.is_match("archive.zip"));
        assert!(!globs.is_match("notes.txt"));
    }

    #[test]
    fn test_action_serialization_shape() {
        let action = Action::from_doc(
            &ActionDoc {
                private_key: Some("~/.ssh/id".to_string()),
                ..scp("Manga", "nas:/manga")
            },
            "t",
            None,
        )
        .unwrap();
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "scp");
        assert_eq!(json["privateKey"], "~/.ssh/id");
        let back: Action = serde_json::from_value(json).unwrap();
        assert_eq!(back, action);
    }
}
