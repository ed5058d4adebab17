use std::path::Path;

use float_ord::FloatOrd;
use image::RgbImage;
use ndarray::{ArrayView2, Axis, Ix3};
use ort::{session::Session, value::TensorRef};
use parking_lot::Mutex;
use tracing::instrument;

use crate::{
    util::{self, load_session, subtract_mean_normalize, Letterbox},
    Detection, Detector, Error, ExecutionProvider, Result,
};

const MEAN_VALUES: [f32; 3] = [0.0, 0.0, 0.0];
const NORM_VALUES: [f32; 3] = [1.0, 1.0, 1.0];

/// Post-processing applied inside the detector before its boxes reach the
/// pipeline.
#[derive(Debug, Clone, Copy)]
pub struct YoloOptions {
    pub input_size: u32,
    pub confidence_floor: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloOptions {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_floor: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// YOLOv8 text region detector.
pub struct YoloNet {
    session: Mutex<Session>,
    options: YoloOptions,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    rect: [f32; 4],
    score: f32,
    class: usize,
}

impl YoloNet {
    #[instrument(level = "debug", skip(execution_providers))]
    pub fn init(
        path: &Path,
        num_threads: usize,
        options: YoloOptions,
        execution_providers: &[ExecutionProvider],
        cache_path: Option<&Path>,
    ) -> Result<Self> {
        let session = load_session(path, num_threads, execution_providers, cache_path)?;
        Ok(Self {
            session: Mutex::new(session),
            options,
        })
    }

    #[instrument(level = "debug", skip(self, image))]
    pub fn get_text_boxes(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        let letterbox = Letterbox::new(image.width(), image.height(), self.options.input_size);
        let input = letterbox.apply(image);
        let input_values =
            subtract_mean_normalize(&input, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));

        let predictions = {
            let mut session = self.session.lock();
            let outputs =
                session.run(ort::inputs![TensorRef::from_array_view(input_values.view())?])?;
            let predictions = outputs[0]
                .try_extract_array::<f32>()?
                .to_owned()
                .into_dimensionality::<Ix3>()
                .map_err(|e| Error::ModelOutput(format!("expected a 3D detector output: {e}")))?;
            predictions
        };
        log::trace!("Detector output shape: {:?}", predictions.dim());

        Ok(find_boxes(
            predictions.index_axis(Axis(0), 0),
            letterbox,
            (image.width(), image.height()),
            &self.options,
        ))
    }
}

impl Detector for YoloNet {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        self.get_text_boxes(image)
    }
}

/// Decodes a `[4 + classes, anchors]` prediction matrix into source pixel
/// boxes.
#[instrument(level = "trace", skip(predictions))]
fn find_boxes(
    predictions: ArrayView2<f32>,
    letterbox: util::Letterbox,
    (width, height): (u32, u32),
    options: &YoloOptions,
) -> Vec<Detection> {
    if predictions.len_of(Axis(0)) < 5 {
        log::warn!(
            "Detector output has {} rows, expected at least 5",
            predictions.len_of(Axis(0))
        );
        return Vec::new();
    }

    let candidates = predictions
        .axis_iter(Axis(1))
        .filter_map(|anchor| {
            let (class, score) = anchor
                .iter()
                .skip(4)
                .enumerate()
                .max_by_key(|(_, score)| FloatOrd(**score))?;
            (*score > options.confidence_floor).then(|| {
                let (cx, cy, w, h) = (anchor[0], anchor[1], anchor[2], anchor[3]);
                let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
                let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);
                Candidate {
                    rect: [
                        x1.clamp(0.0, width as f32),
                        y1.clamp(0.0, height as f32),
                        x2.clamp(0.0, width as f32),
                        y2.clamp(0.0, height as f32),
                    ],
                    score: *score,
                    class,
                }
            })
        })
        .collect::<Vec<_>>();
    log::trace!("{} candidates above the confidence floor", candidates.len());

    non_max_suppression(candidates, options.iou_threshold)
        .into_iter()
        .take(options.max_detections)
        .filter_map(|Candidate { rect, score, .. }| {
            let [x1, y1, x2, y2] = rect.map(|v| v as i32);
            (x2 > x1 && y2 > y1).then(|| Detection::new(x1, y1, x2, y2, score))
        })
        .collect()
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let width = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let height = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = width * height;
    let area = |r: &[f32; 4]| (r[2] - r[0]) * (r[3] - r[1]);
    let union = area(a) + area(b) - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Greedy per-class suppression, highest score first.
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by_key(|it| std::cmp::Reverse(FloatOrd(it.score)));
    let mut keep: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = keep.iter().any(|kept| {
            kept.class == candidate.class && iou(&kept.rect, &candidate.rect) > iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}
