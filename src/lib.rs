// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Image Sorter: local object-detection photo organizer
//!
//! Scans a folder of images, runs each one through a YOLOv8 detector and moves
//! it into a folder named after the object class it shows most often.

pub mod batch;
pub mod config;
pub mod detector;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod scanner;

pub use config::AppConfig;
pub use error::{Result, SorterError};
pub use pipeline::{SortOutcome, Sorter};
