//! Download directory watcher

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::event::{CreateKind, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

/// Seen-set size at which old entries are dropped
const SEEN_LIMIT: usize = 1000;

/// Repeated events for the same path within this window are ignored
const DUPLICATE_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch directory {} does not exist", .0.display())]
    MissingDir(PathBuf),

    #[error("invalid ignore pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Decides which raw events become new-file notifications
#[derive(Debug)]
pub struct EventFilter {
    ignore: GlobSet,
    seen: HashMap<PathBuf, Instant>,
}

impl EventFilter {
    pub fn new(ignore: &[String]) -> Result<Self, WatchError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in ignore {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            ignore: builder.build()?,
            seen: HashMap::new(),
        })
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.ignore.is_match(Path::new(name)))
            .unwrap_or(true)
    }

    /// New files worth processing among the paths of one event
    pub fn accept(&mut self, event: &Event) -> Vec<PathBuf> {
        let candidates: Vec<&PathBuf> = match event.kind {
            EventKind::Create(CreateKind::File) | EventKind::Create(CreateKind::Any) => event.paths.iter().collect(),
            // Renames report the destination last
            EventKind::Modify(ModifyKind::Name(_)) => event.paths.last().into_iter().collect(),
            _ => Vec::new(),
        };

        let mut accepted = Vec::new();
        for path in candidates {
            if path.is_file() && !self.is_ignored(path) && self.first_sighting(path, Instant::now()) {
                accepted.push(path.clone());
            }
        }
        accepted
    }

    fn first_sighting(&mut self, path: &Path, now: Instant) -> bool {
        if let Some(seen) = self.seen.get(path) {
            if now.saturating_duration_since(*seen) < DUPLICATE_WINDOW {
                log::debug!("Ignoring duplicate event for {}", path.display());
                return false;
            }
        }
        if self.seen.len() >= SEEN_LIMIT {
            self.seen.clear();
        }
        self.seen.insert(path.to_path_buf(), now);
        true
    }
}

/// Non-recursive watcher over one directory
pub struct DownloadWatcher {
    // Dropping the watcher stops event delivery
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    filter: EventFilter,
    pending: Vec<PathBuf>,
}

impl DownloadWatcher {
    pub fn start(dir: &Path, ignore: &[String]) -> Result<Self, WatchError> {
        if !dir.is_dir() {
            return Err(WatchError::MissingDir(dir.to_path_buf()));
        }

        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |result| {
                // Receiver gone means the daemon is shutting down
                let _ = tx.send(result);
            },
            notify::Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        log::info!("Watching {}", dir.display());

        Ok(Self {
            _watcher: watcher,
            events,
            filter: EventFilter::new(ignore)?,
            pending: Vec::new(),
        })
    }

    /// Next new file; `None` once the watcher has stopped
    pub async fn next(&mut self) -> Option<PathBuf> {
        loop {
            if let Some(path) = self.pending.pop() {
                return Some(path);
            }
            match self.events.recv().await? {
                Ok(event) => {
                    let mut accepted = self.filter.accept(&event);
                    accepted.reverse();
                    self.pending = accepted;
                }
                Err(e) => log::warn!("Watcher error: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::RenameMode;
    use std::fs;
    use tempfile::tempdir;

    fn filter() -> EventFilter {
        EventFilter::new(&["*.crdownload".to_string(), ".*".to_string()]).unwrap()
    }

    #[test]
    fn test_ignore_patterns() {
        let filter = filter();
        assert!(filter.is_ignored(Path::new("/d/movie.mp4.crdownload")));
        assert!(filter.is_ignored(Path::new("/d/.DS_Store")));
        assert!(!filter.is_ignored(Path::new("/d/issue.cbz")));
    }

    #[test]
    fn test_create_and_rename_events() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("issue.cbz");
        fs::write(&file, b"x").unwrap();
        let partial = temp.path().join("issue.cbz.crdownload");

        let mut filter = filter();
        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(partial)
            .add_path(file.clone());
        assert_eq!(filter.accept(&rename), vec![file.clone()]);

        let other = temp.path().join("model.zip");
        fs::write(&other, b"x").unwrap();
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(other.clone());
        assert_eq!(filter.accept(&create), vec![other]);
    }

    #[test]
    fn test_duplicates_suppressed() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("issue.cbz");
        fs::write(&file, b"x").unwrap();

        let mut filter = filter();
        let event = Event::new(EventKind::Create(CreateKind::File)).add_path(file.clone());
        assert_eq!(filter.accept(&event).len(), 1);
        assert!(filter.accept(&event).is_empty());

        let later = Instant::now() + DUPLICATE_WINDOW + Duration::from_secs(1);
        assert!(filter.first_sighting(&file, later));
    }

    #[test]
    fn test_ignored_and_missing_files_dropped() {
        let temp = tempdir().unwrap();
        let partial = temp.path().join("a.zip.crdownload");
        fs::write(&partial, b"x").unwrap();

        let mut filter = filter();
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(partial)
            .add_path(temp.path().join("gone.zip"));
        assert!(filter.accept(&event).is_empty());
    }

    #[test]
    fn test_start_requires_directory() {
        assert!(matches!(
            DownloadWatcher::start(Path::new("/nonexistent/downloads"), &[]),
            Err(WatchError::MissingDir(_))
        ));
    }
}
