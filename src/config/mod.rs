// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for the image sorter

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Root directory for category folders
    #[serde(default = "default_base_folder")]
    pub base_folder: PathBuf,

    /// Folder name for images with no detections
    #[serde(default = "default_uncategorized")]
    pub uncategorized_folder: String,

    /// Minimum detection confidence (0.0 - 1.0)
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// Where normalized model inputs are written (system temp dir if unset)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Detection model settings
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    /// ONNX weights on disk
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
    /// Download source used when `path` does not exist
    #[serde(default = "default_model_url")]
    pub url: Option<String>,
    /// Optional class names, one per line (COCO names otherwise)
    #[serde(default)]
    pub labels_path: Option<PathBuf>,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

/// Published YOLOv8n ONNX export (COCO, 640px input) fetched on first run
pub const DEFAULT_MODEL_URL: &str =
    "https://huggingface.co/unity/sentis-YOLOv8n/resolve/main/yolov8n.onnx";

// Default value functions
fn default_base_folder() -> PathBuf { PathBuf::from("sorted_images") }
fn default_uncategorized() -> String { "uncategorized".to_string() }
fn default_min_confidence() -> f32 { 0.5 }
fn default_model_path() -> PathBuf { PathBuf::from("models/yolov8n.onnx") }
fn default_model_url() -> Option<String> { Some(DEFAULT_MODEL_URL.to_string()) }
fn default_input_size() -> u32 { 640 }
fn default_iou_threshold() -> f32 { 0.7 }
fn default_max_detections() -> usize { 300 }
fn default_intra_threads() -> usize { 4 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_folder: default_base_folder(),
            uncategorized_folder: default_uncategorized(),
            min_confidence: default_min_confidence(),
            temp_dir: None,
            model: ModelConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            url: default_model_url(),
            labels_path: None,
            input_size: default_input_size(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            intra_threads: default_intra_threads(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::SorterError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.min_confidence) {
            return Err(crate::SorterError::Config(format!(
                "min_confidence must be within 0.0-1.0, got {}",
                self.min_confidence
            )));
        }
        if !unit.contains(&self.model.iou_threshold) {
            return Err(crate::SorterError::Config(format!(
                "model.iou_threshold must be within 0.0-1.0, got {}",
                self.model.iou_threshold
            )));
        }
        if self.model.input_size == 0 {
            return Err(crate::SorterError::Config("model.input_size must be positive".to_string()));
        }
        if self.base_folder.as_os_str().is_empty() {
            return Err(crate::SorterError::Config("base_folder must not be empty".to_string()));
        }
        let uncategorized = self.uncategorized_folder.trim();
        if uncategorized.is_empty() {
            return Err(crate::SorterError::Config(
                "uncategorized_folder must not be empty".to_string(),
            ));
        }
        if uncategorized.contains(['/', '\\']) || uncategorized.chars().all(|c| c == '.') {
            return Err(crate::SorterError::Config(format!(
                "uncategorized_folder must be a single folder name, got {:?}",
                self.uncategorized_folder
            )));
        }
        Ok(())
    }

    /// Directory for normalized model inputs
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
