// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Object detection backends

pub mod coco;
pub mod yolo;

use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Result;

pub use yolo::YoloDetector;

/// A single detected object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class name
    pub label: String,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Trait for object detectors
///
/// Implementations are loaded once and shared across every file of a run,
/// so `predict` takes `&self`.
pub trait Detector: Send + Sync {
    /// Name of this detector
    fn name(&self) -> &'static str;

    /// Detect objects in an image, keeping those at or above `min_confidence`
    fn predict(&self, image: &Path, min_confidence: f32) -> Result<Vec<Detection>>;
}

/// Decode an image, detecting its format from the file content rather than the extension
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(img)
}
