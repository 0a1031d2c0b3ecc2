//! `isMagazine`: archive looks like a scanned magazine or comic issue

use std::collections::HashSet;
use std::path::Path;

use super::archive::{self, ArchiveKind};
use super::{Hook, HookContext, HookError, HookOutcome};

const DEFAULT_ALLOWED_STEMS: &[&str] = &["cover", "credits", "back", "backcover", "title", "toc"];

/// Share of un-numbered images above which the archive is rejected
const MAX_NON_NUMERIC_RATIO: f64 = 0.2;

pub struct IsMagazine;

impl Hook for IsMagazine {
    fn name(&self) -> &'static str {
        "isMagazine"
    }

    fn description(&self) -> &'static str {
        "Archive has one top-level folder of mostly numbered page images"
    }

    fn invoke(&self, path: &Path, context: &HookContext) -> Result<HookOutcome, HookError> {
        if !path.exists() {
            log::debug!("isMagazine: {} does not exist", path.display());
            return Ok(HookOutcome::Gate(false));
        }

        let entries = match ArchiveKind::from_path(path) {
            Some(ArchiveKind::Zip) => match archive::zip_file_names(path) {
                Ok(entries) => entries,
                Err(HookError::Archive(e)) => {
                    log::debug!("isMagazine: invalid zip {}: {}", path.display(), e);
                    return Ok(HookOutcome::Gate(false));
                }
                Err(e) => return Err(e),
            },
            Some(ArchiveKind::Rar) => {
                log::debug!("isMagazine: rar archives are not supported");
                return Ok(HookOutcome::Gate(false));
            }
            None => {
                log::debug!("isMagazine: unsupported archive type {}", path.display());
                return Ok(HookOutcome::Gate(false));
            }
        };

        let allowed = AllowedNames::from_context(context);
        Ok(HookOutcome::Gate(looks_like_magazine(&entries, &allowed)))
    }
}

struct AllowedNames {
    full: HashSet<String>,
    stems: HashSet<String>,
}

impl AllowedNames {
    fn from_context(context: &HookContext) -> Self {
        let mut full = HashSet::new();
        let mut stems: HashSet<String> = DEFAULT_ALLOWED_STEMS.iter().map(|s| s.to_string()).collect();

        if let Some(names) = context.get("allowedNames").and_then(|v| v.as_array()) {
            for name in names.iter().filter_map(|n| n.as_str()) {
                let lowered = name.to_lowercase();
                stems.insert(stem_of(&lowered));
                full.insert(lowered);
            }
        }

        Self { full, stems }
    }

    fn contains(&self, name: &str, stem: &str) -> bool {
        self.full.contains(name) || self.stems.contains(stem)
    }
}

fn stem_of(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn looks_like_magazine(entries: &[String], allowed: &AllowedNames) -> bool {
    if entries.is_empty() {
        log::debug!("isMagazine: archive has no files");
        return false;
    }

    let mut top_level = HashSet::new();
    let mut numeric = 0usize;
    let mut non_numeric = 0usize;
    let mut image_seen = false;

    for entry in entries {
        let parts: Vec<&str> = entry.split('/').filter(|p| !p.is_empty()).collect();
        match parts.as_slice() {
            [] => continue,
            [_] => {
                top_level.insert("");
            }
            [first, ..] => {
                top_level.insert(*first);
            }
        }

        if !archive::is_image(entry) {
            continue;
        }
        image_seen = true;

        let name = parts.last().map(|n| n.to_lowercase()).unwrap_or_default();
        let stem = stem_of(&name);
        if allowed.contains(&name, &stem) {
            continue;
        }

        if stem.chars().any(|c| c.is_ascii_digit()) {
            numeric += 1;
        } else {
            non_numeric += 1;
        }
    }

    if top_level.len() != 1 {
        log::debug!("isMagazine: expected one top-level folder, found {}", top_level.len());
        return false;
    }
    if !image_seen {
        log::debug!("isMagazine: no images found");
        return false;
    }

    let considered = numeric + non_numeric;
    if considered == 0 {
        log::debug!("isMagazine: no numbered images after filtering allowed names");
        return false;
    }

    if non_numeric as f64 / considered as f64 > MAX_NON_NUMERIC_RATIO {
        log::debug!("isMagazine: too many non-numeric images ({} of {})", non_numeric, considered);
        return false;
    }

    true
}
