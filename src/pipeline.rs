// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Classify-and-sort pipeline
//!
//! One call handles one image: normalize it into a scoped temporary file, run
//! the detector, reduce the labels to the dominant one and move the original
//! into `<base>/<label>/`. Failures become a [`SortOutcome`] instead of an
//! error so a caller can keep going with the next file.

use image::ImageFormat;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::detector::{open_image, Detector};
use crate::{Result, SorterError};

/// Result of sorting one image
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SortOutcome {
    /// Moved into the folder of its dominant label
    Sorted { label: String, destination: PathBuf },
    /// Nothing detected; moved into the fallback folder
    Uncategorized { destination: PathBuf },
    /// Input path is not an existing file
    NotFound { path: PathBuf },
    /// No detector was loaded
    ModelUnavailable,
    /// Decode, inference or I/O failure; file left in place
    ProcessingError { file_name: String, message: String },
}

impl SortOutcome {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SortOutcome::NotFound { .. }
                | SortOutcome::ModelUnavailable
                | SortOutcome::ProcessingError { .. }
        )
    }

    /// Final location of the file, when it was moved
    pub fn destination(&self) -> Option<&Path> {
        match self {
            SortOutcome::Sorted { destination, .. } | SortOutcome::Uncategorized { destination } => {
                Some(destination)
            }
            _ => None,
        }
    }
}

impl fmt::Display for SortOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOutcome::Sorted { label, .. } => write!(f, "Classified and moved to '{}'", label),
            SortOutcome::Uncategorized { destination } => {
                let folder = destination
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                write!(f, "No objects detected, moved to '{}'", folder)
            }
            SortOutcome::NotFound { path } => write!(f, "Error: Image not found at {}", path.display()),
            SortOutcome::ModelUnavailable => write!(f, "Error: detection model not loaded"),
            SortOutcome::ProcessingError { file_name, message } => {
                write!(f, "Error processing {}: {}", file_name, message)
            }
        }
    }
}

/// Most frequent label, ties going to the one seen first
pub fn dominant_label(labels: &[String]) -> Option<&str> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (index, label) in labels.iter().enumerate() {
        counts.entry(label.as_str()).or_insert((0, index)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(label, _)| label)
}

/// Make a detector label usable as a single folder name
pub fn category_dir_name(label: &str) -> String {
    let clean: String = label
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();

    if clean.is_empty() || clean.chars().all(|c| c == '.') {
        "unlabeled".to_string()
    } else {
        clean
    }
}

/// Sorts images using a detector loaded once for the whole run
pub struct Sorter {
    detector: Option<Box<dyn Detector>>,
    base_folder: PathBuf,
    uncategorized_folder: String,
    min_confidence: f32,
    temp_dir: PathBuf,
}

impl Sorter {
    /// Create a sorter; `detector` is `None` when the model failed to load
    pub fn new(detector: Option<Box<dyn Detector>>, config: &AppConfig) -> Self {
        Self {
            detector,
            base_folder: config.base_folder.clone(),
            uncategorized_folder: category_dir_name(&config.uncategorized_folder),
            min_confidence: config.min_confidence,
            temp_dir: config.temp_dir(),
        }
    }

    pub fn base_folder(&self) -> &Path {
        &self.base_folder
    }

    pub fn has_detector(&self) -> bool {
        self.detector.is_some()
    }

    /// Classify one image and move it into its category folder
    pub fn classify_and_sort(&self, image_path: &Path) -> SortOutcome {
        let detector = match &self.detector {
            Some(d) => d.as_ref(),
            None => return SortOutcome::ModelUnavailable,
        };

        if !image_path.is_file() {
            return SortOutcome::NotFound {
                path: image_path.to_path_buf(),
            };
        }

        match self.process(detector, image_path) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Failed to process {:?}: {}", image_path, e);
                SortOutcome::ProcessingError {
                    file_name: image_path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| image_path.display().to_string()),
                    message: e.to_string(),
                }
            }
        }
    }

    fn process(&self, detector: &dyn Detector, image_path: &Path) -> Result<SortOutcome> {
        ensure_dir(&self.base_folder)?;

        let labels = {
            // Removed when dropped, on every path out of this block
            let normalized = self.normalize(image_path)?;
            let detections = detector.predict(normalized.path(), self.min_confidence)?;
            debug!("{} reported {:?} for {:?}", detector.name(), detections, image_path);

            detections
                .into_iter()
                .filter(|d| d.confidence >= self.min_confidence)
                .map(|d| d.label)
                .collect::<Vec<_>>()
        };

        match dominant_label(&labels) {
            Some(label) => {
                let target = self.base_folder.join(category_dir_name(label));
                let destination = move_into(image_path, &target)?;
                info!("Sorted {:?} into '{}'", image_path, label);
                Ok(SortOutcome::Sorted {
                    label: label.to_string(),
                    destination,
                })
            }
            None => {
                let target = self.base_folder.join(&self.uncategorized_folder);
                let destination = move_into(image_path, &target)?;
                info!("No objects in {:?}, moved to '{}'", image_path, self.uncategorized_folder);
                Ok(SortOutcome::Uncategorized { destination })
            }
        }
    }

    /// Decode the source and re-encode it as an RGB PNG the model can read
    fn normalize(&self, image_path: &Path) -> Result<NamedTempFile> {
        let img = open_image(image_path)?;

        let temp = tempfile::Builder::new()
            .prefix("image-sorter-")
            .suffix(".png")
            .tempfile_in(&self.temp_dir)?;

        img.to_rgb8().save_with_format(temp.path(), ImageFormat::Png)?;
        debug!("Normalized {:?} into {:?}", image_path, temp.path());

        Ok(temp)
    }
}

/// Create `dir` and its parents unless it already exists
fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        fs::create_dir_all(dir)?;
        info!("Created folder {:?}", dir);
    }
    Ok(())
}

/// Move `source` into `target_dir`, creating the directory if needed.
///
/// A same-volume rename is tried first, then [`copy_then_replace`]. An
/// existing file of the same name is never overwritten; a `_N` suffix is
/// added instead.
pub fn move_into(source: &Path, target_dir: &Path) -> Result<PathBuf> {
    ensure_dir(target_dir)?;

    let file_name = source
        .file_name()
        .ok_or_else(|| SorterError::FileSystem(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", source.display()),
        )))?;
    let destination = free_destination(target_dir, Path::new(file_name));

    match fs::rename(source, &destination) {
        Ok(()) => return Ok(destination),
        Err(e) if !source.exists() => return Err(e.into()),
        Err(e) => debug!("Rename {:?} failed ({}), copying instead", source, e),
    }

    copy_then_replace(source, &destination)?;
    Ok(destination)
}

/// Move by copying, for when `source` and `destination` are on different volumes.
///
/// The bytes go to a hidden `.<name>.partial` file next to `destination`,
/// which is renamed onto `destination` once the length matches. `source` is
/// removed last; on any error it is left untouched and the staging file is
/// cleaned up.
pub fn copy_then_replace(source: &Path, destination: &Path) -> Result<()> {
    let dir = destination.parent().unwrap_or_else(|| Path::new("."));
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let staging = dir.join(format!(".{}.partial", name));

    let copied = match fs::copy(source, &staging) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
    };

    let expected = fs::metadata(source)?.len();
    if copied != expected {
        let _ = fs::remove_file(&staging);
        return Err(SorterError::FileSystem(io::Error::new(
            io::ErrorKind::Other,
            format!("Copied {} of {} bytes for {}", copied, expected, source.display()),
        )));
    }

    if let Err(e) = fs::rename(&staging, destination) {
        let _ = fs::remove_file(&staging);
        return Err(e.into());
    }

    fs::remove_file(source)?;
    Ok(())
}

/// First `name`, `stem_1.ext`, `stem_2.ext`, ... not present in `dir`
fn free_destination(dir: &Path, name: &Path) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = name.extension().map(|e| e.to_string_lossy().to_string());

    (1..)
        .map(|n| match &ext {
            Some(ext) => dir.join(format!("{}_{}.{}", stem, n, ext)),
            None => dir.join(format!("{}_{}", stem, n)),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
