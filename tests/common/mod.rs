#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use image::{Rgb, RgbImage};
use pagescribe::{Detection, Detector, Error, PageProcessor, Recognizer, Result};

/// Page width that makes [`FakeDetector`] fail.
pub const FAILING_WIDTH: u32 = 13;

/// Returns the same detections for every page and counts its calls.
#[derive(Clone, Default)]
pub struct FakeDetector {
    pub detections: Vec<Detection>,
    pub calls: Arc<AtomicUsize>,
}

impl FakeDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            calls: Arc::default(),
        }
    }
}

impl Detector for FakeDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if image.width() == FAILING_WIDTH {
            return Err(Error::ModelOutput("detector exploded".into()));
        }
        Ok(self.detections.clone())
    }
}

/// Reads back the red channel of the crop's top-left pixel, padded with
/// whitespace.
#[derive(Clone, Default)]
pub struct FakeRecognizer {
    pub calls: Arc<AtomicUsize>,
}

impl Recognizer for FakeRecognizer {
    fn recognize(&self, crop: &RgbImage) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("  r{}\n", crop.get_pixel(0, 0).0[0]))
    }
}

pub fn processor(detections: Vec<Detection>) -> PageProcessor<FakeDetector, FakeRecognizer> {
    PageProcessor::new(FakeDetector::new(detections), FakeRecognizer::default())
}

/// The three regions of the reading order example: two on the first line,
/// one below, listed out of order.
pub fn example_detections() -> Vec<Detection> {
    vec![
        Detection::new(60, 0, 100, 20, 0.8),
        Detection::new(10, 25, 50, 45, 0.95),
        Detection::new(10, 0, 50, 20, 0.9),
    ]
}

/// 120x60 page whose regions carry distinct red values: 1 for (10,0), 2 for
/// (60,0), 3 for (10,25).
pub fn example_page() -> RgbImage {
    RgbImage::from_fn(120, 60, |x, y| {
        let red = match (x, y) {
            (10..=49, 0..=19) => 1,
            (60..=99, 0..=19) => 2,
            (10..=49, 25..=44) => 3,
            _ => 255,
        };
        Rgb([red, 255, 255])
    })
}

pub fn save_page(dir: &Path, name: &str, image: &RgbImage) {
    image.save(dir.join(name)).expect("failed to write test page");
}
