//! Archive inspection shared by the content hooks

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::HookError;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff"];

/// Upper bound on bytes read from a single archive member
pub const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// Archive formats the hooks can look inside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Rar,
}

impl ArchiveKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        match lower_extension(path).as_str() {
            "zip" | "cbz" => Some(Self::Zip),
            "rar" | "cbr" => Some(Self::Rar),
            _ => None,
        }
    }
}

/// Lowercased extension without the dot, empty if none
pub fn lower_extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub fn is_image(name: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&lower_extension(Path::new(name)).as_str())
}

/// Names of all file (non-directory) members of a zip archive
pub fn zip_file_names(path: &Path) -> Result<Vec<String>, HookError> {
    let file = File::open(path)?;
    let archive = zip::ZipArchive::new(BufReader::new(file))?;
    Ok(archive
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .map(|name| name.to_string())
        .collect())
}

/// Read one member of a zip archive, bounded by `MAX_ENTRY_BYTES`
pub fn read_zip_entry(path: &Path, name: &str) -> Result<Vec<u8>, HookError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
    let entry = archive.by_name(name)?;
    let mut out = Vec::new();
    entry.take(MAX_ENTRY_BYTES).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::Write;
    use std::path::Path;
    use zip::write::SimpleFileOptions;

    /// Write a zip archive with the given members
    pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::testing::write_zip;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_archive_kind() {
        assert_eq!(ArchiveKind::from_path(Path::new("a.CBZ")), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::from_path(Path::new("a.cbr")), Some(ArchiveKind::Rar));
        assert_eq!(ArchiveKind::from_path(Path::new("a.pdf")), None);
    }

    #[test]
    fn test_zip_file_names_skips_directories() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("a.zip");
        write_zip(&path, &[("issue/", b""), ("issue/001.jpg", b"x")]);

        assert_eq!(zip_file_names(&path).unwrap(), vec!["issue/001.jpg".to_string()]);
    }

    #[test]
    fn test_zip_file_names_not_a_zip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("a.zip");
        std::fs::write(&path, b"plain text").unwrap();

        assert!(matches!(zip_file_names(&path), Err(HookError::Archive(_))));
    }

    #[test]
    fn test_is_image() {
        assert!(is_image("dir/Cover.JPG"));
        assert!(!is_image("dir/readme.txt"));
    }
}
