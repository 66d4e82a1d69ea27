// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Folder scanning for candidate images

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::Result;

/// Recognized image extensions (matched case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".bmp"];

/// Check whether a path's file name ends with a recognized image extension
pub fn has_image_extension(path: &Path) -> bool {
    let filename = match path.file_name() {
        Some(n) => n.to_string_lossy().to_lowercase(),
        None => return false,
    };

    IMAGE_EXTENSIONS.iter().any(|ext| filename.ends_with(ext))
}

/// List the image files directly inside `dir`, ordered by file name.
///
/// Subdirectories are skipped whatever their name. An empty folder yields an
/// empty list; a missing or unreadable folder is an error.
pub fn scan_folder(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!("Found {} images in {:?}", files.len(), dir);

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_extension_matching() {
        assert!(has_image_extension(Path::new("photo.jpg")));
        assert!(has_image_extension(Path::new("photo.JPG")));
        assert!(has_image_extension(Path::new("dir/scan.Jpeg")));
        assert!(has_image_extension(Path::new("anim.gif")));
        assert!(has_image_extension(Path::new("old.BMP")));
        assert!(!has_image_extension(Path::new("notes.txt")));
        assert!(!has_image_extension(Path::new("photo.jpg.bak")));
        assert!(!has_image_extension(Path::new("photo.webp")));
        assert!(!has_image_extension(Path::new("jpg")));
    }

    #[test]
    fn test_scan_filters_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("photo.JPG"), b"x").unwrap();
        fs::write(dir.path().join("b.png"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("pic.png")).unwrap();

        let files = scan_folder(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["b.png", "photo.JPG"]);
    }

    #[test]
    fn test_scan_is_not_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("deep.jpg"), b"x").unwrap();

        assert!(scan_folder(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_scan_empty_folder() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_folder(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_scan_missing_folder_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_folder(&dir.path().join("absent")).is_err());
    }
}
