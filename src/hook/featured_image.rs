//! `getFeaturedImage`: extract a preview image for the notification
//!
//! Never fails the filter; when no image can be extracted it passes without
//! data.

use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

use super::archive::{self, ArchiveKind};
use super::{Hook, HookContext, HookError, HookOutcome};

const MAX_IMAGE_AGE: Duration = Duration::from_secs(24 * 60 * 60);

pub struct GetFeaturedImage {
    output_dir: PathBuf,
}

impl Default for GetFeaturedImage {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("pelagos_images"))
    }
}

impl GetFeaturedImage {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    fn extract(&self, path: &Path) -> Result<Option<PathBuf>, HookError> {
        let mut images: Vec<String> = archive::zip_file_names(path)?
            .into_iter()
            .filter(|name| archive::is_image(name))
            .collect();
        images.sort();

        let Some(first) = images.first() else {
            log::debug!("getFeaturedImage: no images in {}", path.display());
            return Ok(None);
        };

        let data = archive::read_zip_entry(path, first)?;

        fs::create_dir_all(&self.output_dir)?;
        let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let member = Path::new(first)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        let output = self.output_dir.join(format!("{}_{}", stem, member));
        fs::write(&output, data)?;

        log::info!("getFeaturedImage: extracted {} to {}", first, output.display());
        Ok(Some(output))
    }

    fn cleanup_old_images(&self) {
        if !self.output_dir.exists() {
            return;
        }
        let now = SystemTime::now();
        for entry in WalkDir::new(&self.output_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let expired = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|modified| now.duration_since(modified).ok())
                .map(|age| age > MAX_IMAGE_AGE)
                .unwrap_or(false);
            if expired {
                match fs::remove_file(entry.path()) {
                    Ok(()) => log::debug!("getFeaturedImage: removed old image {}", entry.path().display()),
                    Err(e) => log::debug!("getFeaturedImage: cleanup failed: {}", e),
                }
            }
        }
    }
}

impl Hook for GetFeaturedImage {
    fn name(&self) -> &'static str {
        "getFeaturedImage"
    }

    fn description(&self) -> &'static str {
        "Extracts the first image of an archive as the notification preview"
    }

    fn invoke(&self, path: &Path, _context: &HookContext) -> Result<HookOutcome, HookError> {
        if !path.exists() {
            return Ok(HookOutcome::Gate(true));
        }

        self.cleanup_old_images();

        match ArchiveKind::from_path(path) {
            Some(ArchiveKind::Zip) => match self.extract(path) {
                Ok(Some(image)) => Ok(HookOutcome::Value(json!({
                    "contentImage": image.to_string_lossy(),
                }))),
                Ok(None) => Ok(HookOutcome::Gate(true)),
                Err(e) => {
                    log::error!("getFeaturedImage: extraction failed for {}: {}", path.display(), e);
                    Ok(HookOutcome::Gate(true))
                }
            },
            Some(ArchiveKind::Rar) | None => {
                log::debug!("getFeaturedImage: unsupported archive type {}", path.display());
                Ok(HookOutcome::Gate(true))
            }
        }
    }
}
