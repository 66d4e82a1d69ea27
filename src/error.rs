// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for the image sorter

use thiserror::Error;

/// Result type alias for sorter operations
pub type Result<T> = std::result::Result<T, SorterError>;

/// Sorter error types
#[derive(Error, Debug)]
pub enum SorterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Download error: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Inference error: {0}")]
    Inference(String),
}

impl From<ort::Error> for SorterError {
    fn from(err: ort::Error) -> Self {
        SorterError::Inference(err.to_string())
    }
}
