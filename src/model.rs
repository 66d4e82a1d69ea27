// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Fetching detection model weights

use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::{Result, SorterError};

/// Make sure the model weights are on disk, downloading them if needed
pub async fn ensure_model(config: &ModelConfig) -> Result<PathBuf> {
    if config.path.is_file() {
        debug!("Model present at {:?}", config.path);
        return Ok(config.path.clone());
    }

    let url = config.url.as_deref().ok_or_else(|| {
        SorterError::Model(format!(
            "Model not found at {} and no download URL configured",
            config.path.display()
        ))
    })?;

    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    info!("Downloading model from {}", url);
    let partial = partial_path(&config.path);
    if let Err(e) = download_file(url, &partial).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }

    tokio::fs::rename(&partial, &config.path).await?;
    info!("Model saved to {:?}", config.path);

    Ok(config.path.clone())
}

/// `<path>.part`, where downloads land until they are complete
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()?;

    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(SorterError::Model(format!(
            "Failed to download {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut last_logged = 0;

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        downloaded += chunk.len() as u64;
        file.write_all(&chunk).await?;

        if total_size > 0 {
            let progress = (downloaded * 100) / total_size;
            if progress >= last_logged + 10 {
                debug!("Model download {}%", progress);
                last_logged = progress;
            }
        }
    }
    file.flush().await?;

    if total_size > 0 && downloaded != total_size {
        warn!("Expected {} bytes, received {}", total_size, downloaded);
        return Err(SorterError::Model(format!(
            "Incomplete download from {} ({} of {} bytes)",
            url, downloaded, total_size
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("models/yolov8n.onnx")),
            PathBuf::from("models/yolov8n.onnx.part")
        );
    }

    #[tokio::test]
    async fn test_existing_model_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"weights").unwrap();

        let config = ModelConfig {
            path: path.clone(),
            url: Some("http://127.0.0.1:9/never-contacted".to_string()),
            ..ModelConfig::default()
        };

        assert_eq!(ensure_model(&config).await.unwrap(), path);
    }

    #[tokio::test]
    async fn test_missing_model_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = ModelConfig {
            path: dir.path().join("model.onnx"),
            url: None,
            ..ModelConfig::default()
        };

        let err = ensure_model(&config).await.unwrap_err();
        assert!(matches!(err, SorterError::Model(_)));
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("model.onnx");
        let config = ModelConfig {
            path: path.clone(),
            // Discard port; nothing listens there
            url: Some("http://127.0.0.1:9/model.onnx".to_string()),
            ..ModelConfig::default()
        };

        assert!(ensure_model(&config).await.is_err());
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }
}
