// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::path::Path;

use image_sorter::pipeline::{category_dir_name, dominant_label};
use image_sorter::scanner::has_image_extension;

#[derive(Arbitrary, Debug)]
struct Input {
    file_name: String,
    labels: Vec<String>,
}

fuzz_target!(|input: Input| {
    let _ = has_image_extension(Path::new(&input.file_name));

    if let Some(label) = dominant_label(&input.labels) {
        assert!(input.labels.iter().any(|l| l == label));

        let dir = category_dir_name(label);
        assert!(!dir.is_empty());
        assert!(!dir.contains('/') && !dir.contains('\\'));
    } else {
        assert!(input.labels.is_empty());
    }
});
