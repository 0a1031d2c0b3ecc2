//! File events and download origin lookup
//!
//! A `FileEvent` is produced once per detected file and discarded after the
//! file has been resolved.

use chrono::{DateTime, Local};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Extended attribute macOS uses to record where a download came from
const WHERE_FROMS_ATTR: &str = "com.apple.metadata:kMDItemWhereFroms";

/// A newly detected file
#[derive(Debug, Clone, PartialEq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub origin_url: Option<String>,
    pub created_at: DateTime<Local>,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>, origin_url: Option<String>) -> Self {
        Self {
            path: path.into(),
            origin_url,
            created_at: Local::now(),
        }
    }

    /// Build an event for `path`, reading the origin URL from file metadata
    pub fn detect(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let origin_url = origin_url(&path);
        Self::new(path, origin_url)
    }

    /// Base name of the file, lossily converted
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Read the first "where from" URL recorded for a download.
///
/// Returns `None` when the metadata is missing or the platform tools
/// (`xattr`, `plutil`) are unavailable.
pub fn origin_url(path: &Path) -> Option<String> {
    if which::which("xattr").is_err() || which::which("plutil").is_err() {
        return None;
    }

    let raw = Command::new("xattr")
        .args(["-x", "-p", WHERE_FROMS_ATTR])
        .arg(path)
        .output()
        .ok()?;
    if !raw.status.success() {
        return None;
    }

    let plist = decode_hex_dump(&String::from_utf8_lossy(&raw.stdout))?;

    let mut child = Command::new("plutil")
        .args(["-convert", "json", "-o", "-", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&plist).ok()?;
    }
    let output = child.wait_with_output().ok()?;
    if !output.status.success() {
        log::debug!("plutil could not decode origin metadata for {}", path.display());
        return None;
    }

    first_url(&String::from_utf8_lossy(&output.stdout))
}

/// `xattr -x` prints the attribute as whitespace separated hex pairs
fn decode_hex_dump(dump: &str) -> Option<Vec<u8>> {
    let digits: String = dump.split_whitespace().collect();
    if digits.is_empty() || digits.len() % 2 != 0 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

fn first_url(json: &str) -> Option<String> {
    let urls: Vec<String> = serde_json::from_str(json).ok()?;
    urls.into_iter().find(|u| !u.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex_dump() {
        let bytes = decode_hex_dump("62 70 6C 69\n73 74").unwrap();
        assert_eq!(bytes, b"bplist");
    }

    #[test]
    fn test_decode_hex_dump_rejects_non_hex() {
        assert!(decode_hex_dump("6é").is_none());
        assert!(decode_hex_dump("é6 70").is_none());
        assert!(decode_hex_dump("zz").is_none());
    }

    #[test]
    fn test_decode_hex_dump_rejects_odd_length() {
        assert!(decode_hex_dump("6").is_none());
        assert!(decode_hex_dump("").is_none());
    }

    #[test]
    fn test_first_url_skips_empty_entries() {
        let json = r#"["", "https://site-a.example/x.zip", "https://site-a.example/"]"#;
        assert_eq!(first_url(json), Some("https://site-a.example/x.zip".to_string()));
    }

    #[test]
    fn test_first_url_invalid_json() {
        assert_eq!(first_url("not json"), None);
    }

    #[test]
    fn test_file_name() {
        let event = FileEvent::new("/tmp/downloads/issue-01.cbz", None);
        assert_eq!(event.file_name(), "issue-01.cbz");
    }
}
