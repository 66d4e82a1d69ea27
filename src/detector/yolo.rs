// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! YOLOv8 detector running on ONNX Runtime

use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use super::coco::coco_labels;
use super::{open_image, Detection, Detector};
use crate::config::ModelConfig;
use crate::{Result, SorterError};

/// Grey used by YOLO letterboxing
const PAD_VALUE: u8 = 114;

/// A scored box before suppression, in letterboxed pixel space
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    class_id: usize,
    score: f32,
    bbox: [f32; 4],
}

/// Object detector backed by a YOLOv8 ONNX export
pub struct YoloDetector {
    session: Mutex<Session>,
    input_name: String,
    labels: Vec<String>,
    input_size: u32,
    iou_threshold: f32,
    max_detections: usize,
}

impl YoloDetector {
    /// Load the ONNX model and class names described by `config`
    pub fn load(config: &ModelConfig) -> Result<Self> {
        if !config.path.is_file() {
            return Err(SorterError::Model(format!(
                "Model file not found at {}",
                config.path.display()
            )));
        }

        let labels = match &config.labels_path {
            Some(path) => load_labels(path)?,
            None => coco_labels(),
        };

        let _ = ort::init().with_name("image-sorter").commit();

        let session = Session::builder()
            .map_err(|e| SorterError::Model(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| SorterError::Model(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(config.intra_threads.max(1))
            .map_err(|e| SorterError::Model(format!("Failed to set intra threads: {}", e)))?
            .commit_from_file(&config.path)
            .map_err(|e| SorterError::Model(format!("Failed to load ONNX model: {}", e)))?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| SorterError::Model("Model declares no inputs".to_string()))?;

        info!(
            "Loaded detector {:?} ({} classes, input {}px)",
            config.path,
            labels.len(),
            config.input_size
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            labels,
            input_size: config.input_size,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        })
    }

    /// Class names this detector reports
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Detector for YoloDetector {
    fn name(&self) -> &'static str {
        "yolov8-onnx"
    }

    fn predict(&self, image: &Path, min_confidence: f32) -> Result<Vec<Detection>> {
        let img = open_image(image)?;
        let tensor = letterbox(&img, self.input_size);

        let input = Value::from_array(tensor)
            .map_err(|e| SorterError::Inference(format!("Failed to create tensor value: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| SorterError::Inference("Detector session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| SorterError::Inference(format!("Inference failed: {}", e)))?;

        let output = outputs
            .values()
            .next()
            .ok_or_else(|| SorterError::Inference("Model produced no outputs".to_string()))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| SorterError::Inference(format!("Failed to extract output tensor: {}", e)))?;
        let dims: Vec<i64> = shape.iter().copied().collect();

        let candidates = decode_output(data, &dims, min_confidence)?;
        let kept = non_max_suppression(candidates, self.iou_threshold, self.max_detections);

        let detections: Vec<Detection> = kept
            .into_iter()
            .map(|c| {
                let label = self
                    .labels
                    .get(c.class_id)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", c.class_id));
                Detection::new(label, c.score)
            })
            .collect();

        debug!("{} detections in {:?}", detections.len(), image);
        Ok(detections)
    }
}

/// Read class names, one per non-empty line
fn load_labels(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let labels: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();

    if labels.is_empty() {
        return Err(SorterError::Model(format!("No labels in {}", path.display())));
    }
    Ok(labels)
}

/// Resize onto a square `size` canvas keeping aspect ratio, as an NCHW tensor in [0, 1]
pub fn letterbox(img: &DynamicImage, size: u32) -> Array4<f32> {
    let (w, h) = (img.width().max(1), img.height().max(1));
    let scale = (size as f32 / w as f32).min(size as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, size);

    let resized = img
        .resize_exact(new_w, new_h, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    image::imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    tensor
}

/// Turn the raw `[1, 4 + classes, anchors]` output into scored boxes.
///
/// Exports that put anchors first (`[1, anchors, 4 + classes]`) are accepted too.
fn decode_output(data: &[f32], dims: &[i64], min_confidence: f32) -> Result<Vec<Candidate>> {
    if dims.len() != 3 || dims.iter().any(|&d| d <= 0) {
        return Err(SorterError::Inference(format!("Unexpected output shape {:?}", dims)));
    }

    let (a, b) = (dims[1] as usize, dims[2] as usize);
    let transposed = a > b;
    let (features, anchors) = if transposed { (b, a) } else { (a, b) };

    if features < 5 || data.len() < features * anchors {
        return Err(SorterError::Inference(format!(
            "Output shape {:?} does not hold boxes and class scores",
            dims
        )));
    }

    let at = |feature: usize, anchor: usize| -> f32 {
        if transposed {
            data[anchor * features + feature]
        } else {
            data[feature * anchors + anchor]
        }
    };

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut best = (0usize, f32::NEG_INFINITY);
        for class_id in 0..features - 4 {
            let score = at(4 + class_id, anchor);
            if score > best.1 {
                best = (class_id, score);
            }
        }

        if best.1 < min_confidence {
            continue;
        }

        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        candidates.push(Candidate {
            class_id: best.0,
            score: best.1,
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
        });
    }

    Ok(candidates)
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;

    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy per-class suppression, highest score first
fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Build a `[1, 4 + classes, anchors]` buffer from (cx, cy, w, h, scores) rows
    fn raw_output(rows: &[([f32; 4], Vec<f32>)]) -> (Vec<f32>, Vec<i64>) {
        let classes = rows[0].1.len();
        let features = 4 + classes;
        let anchors = rows.len();
        let mut data = vec![0.0; features * anchors];
        for (anchor, (bbox, scores)) in rows.iter().enumerate() {
            for (f, v) in bbox.iter().chain(scores.iter()).enumerate() {
                data[f * anchors + anchor] = *v;
            }
        }
        (data, vec![1, features as i64, anchors as i64])
    }

    fn candidate(class_id: usize, score: f32, bbox: [f32; 4]) -> Candidate {
        Candidate { class_id, score, bbox }
    }

    #[test]
    fn test_decode_filters_by_confidence() {
        let (data, dims) = raw_output(&[
            ([50.0, 50.0, 20.0, 20.0], vec![0.9, 0.1, 0.0]),
            ([10.0, 10.0, 4.0, 4.0], vec![0.2, 0.3, 0.1]),
            ([80.0, 80.0, 10.0, 10.0], vec![0.0, 0.1, 0.6]),
            ([5.0, 5.0, 2.0, 2.0], vec![0.0, 0.0, 0.0]),
            ([7.0, 7.0, 2.0, 2.0], vec![0.0, 0.0, 0.0]),
            ([9.0, 9.0, 2.0, 2.0], vec![0.0, 0.0, 0.0]),
            ([11.0, 11.0, 2.0, 2.0], vec![0.0, 0.0, 0.0]),
            ([13.0, 13.0, 2.0, 2.0], vec![0.0, 0.0, 0.0]),
        ]);

        let found = decode_output(&data, &dims, 0.5).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].class_id, 0);
        assert_eq!(found[0].bbox, [40.0, 40.0, 60.0, 60.0]);
        assert_eq!(found[1].class_id, 2);
    }

    #[test]
    fn test_decode_accepts_anchor_major_layout() {
        // 8 anchors x (4 + 2) features, anchors first
        let mut data = vec![0.0; 8 * 6];
        data[..6].copy_from_slice(&[10.0, 10.0, 4.0, 4.0, 0.1, 0.8]);
        let found = decode_output(&data, &[1, 8, 6], 0.5).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_id, 1);
        assert_eq!(found[0].bbox, [8.0, 8.0, 12.0, 12.0]);
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        assert!(decode_output(&[0.0; 4], &[1, 4], 0.5).is_err());
        assert!(decode_output(&[0.0; 4], &[1, 2, 2], 0.5).is_err());
        assert!(decode_output(&[0.0; 10], &[1, 84, 8400], 0.5).is_err());
    }

    #[test]
    fn test_iou() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
        let half = iou(&a, &[5.0, 0.0, 15.0, 10.0]);
        assert!((half - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_same_class_overlap() {
        let kept = non_max_suppression(
            vec![
                candidate(16, 0.7, [0.0, 0.0, 10.0, 10.0]),
                candidate(16, 0.9, [0.5, 0.5, 10.5, 10.5]),
                candidate(16, 0.8, [50.0, 50.0, 60.0, 60.0]),
            ],
            0.7,
            300,
        );

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.8);
    }

    #[test]
    fn test_nms_keeps_other_classes() {
        let kept = non_max_suppression(
            vec![
                candidate(16, 0.9, [0.0, 0.0, 10.0, 10.0]),
                candidate(0, 0.8, [0.0, 0.0, 10.0, 10.0]),
            ],
            0.7,
            300,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_caps_detections() {
        let many: Vec<_> = (0..10)
            .map(|i| candidate(0, 0.5 + i as f32 / 100.0, [i as f32 * 20.0, 0.0, i as f32 * 20.0 + 10.0, 10.0]))
            .collect();
        assert_eq!(non_max_suppression(many, 0.7, 3).len(), 3);
    }

    #[test]
    fn test_letterbox_geometry() {
        // 200x100 scales by 0.32 to 64x32, centred with 16 rows of padding above and below
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([255, 0, 0])));
        let tensor = letterbox(&img, 64);
        let grey = PAD_VALUE as f32 / 255.0;

        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        for row in [0, 15, 48, 63] {
            assert!((tensor[[0, 0, row, 10]] - grey).abs() < 1e-6, "row {} should be padding", row);
        }
        for row in [16, 32, 47] {
            assert!((tensor[[0, 0, row, 10]] - 1.0).abs() < 0.01, "row {} should be image", row);
            assert!(tensor[[0, 1, row, 10]].abs() < 0.01);
        }
    }

    #[test]
    fn test_load_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = ModelConfig {
            path: dir.path().join("absent.onnx"),
            ..ModelConfig::default()
        };

        match YoloDetector::load(&config) {
            Err(SorterError::Model(msg)) => assert!(msg.contains("absent.onnx")),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected load failure"),
        }
    }

    #[test]
    fn test_load_labels_file() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("labels.txt");
        std::fs::write(&path, "cat\n\n dog \nbird\n").unwrap();

        assert_eq!(load_labels(&path).unwrap(), vec!["cat", "dog", "bird"]);

        std::fs::write(&path, "\n  \n").unwrap();
        assert!(load_labels(&path).is_err());
    }
}
