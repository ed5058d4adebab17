use std::path::Path;

use image::RgbImage;
use tracing::{instrument, warn};

use crate::{
    line_cluster,
    util::{crop_region, open_upright},
    Detection, Error, PageResult, Result, TranscriptRecord,
};

/// Finds text regions in a page image.
pub trait Detector {
    /// Boxes in source pixel coordinates with their confidence.
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>>;
}

/// Reads the text of one cropped region.
pub trait Recognizer {
    /// Raw recognized text; surrounding whitespace is trimmed by the caller.
    fn recognize(&self, crop: &RgbImage) -> Result<String>;
}

/// What became of one page.
#[derive(Debug)]
pub enum PageOutcome {
    Transcribed(PageResult),
    /// The file could not be decoded. Stands for an empty page.
    Unreadable(Error),
}

impl PageOutcome {
    pub fn is_unreadable(&self) -> bool {
        matches!(self, PageOutcome::Unreadable(_))
    }

    pub fn into_page(self) -> PageResult {
        match self {
            PageOutcome::Transcribed(page) => page,
            PageOutcome::Unreadable(_) => PageResult::default(),
        }
    }
}

/// Detect, order, crop and recognize the regions of one page.
pub struct PageProcessor<D, R> {
    detector: D,
    recognizer: R,
}

impl<D: Detector, R: Recognizer> PageProcessor<D, R> {
    pub fn new(detector: D, recognizer: R) -> Self {
        Self {
            detector,
            recognizer,
        }
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    /// Decodes and transcribes the image at `path`.
    ///
    /// A file that cannot be decoded is reported as [`PageOutcome::Unreadable`]
    /// rather than an error. Detector and recognizer failures are returned as
    /// errors and no partial page is produced.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn process(&self, path: &Path) -> Result<PageOutcome> {
        let image = match open_upright(path) {
            Ok(image) => image,
            Err(source) => {
                let error = Error::ImageDecode {
                    path: path.to_path_buf(),
                    source,
                };
                warn!("Could not read image: {error}");
                return Ok(PageOutcome::Unreadable(error));
            }
        };
        let image = image.to_rgb8();
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy())
            .unwrap_or_default();

        self.run(&image, &stem).map(PageOutcome::Transcribed)
    }

    /// Transcribes an already decoded RGB image.
    pub fn transcribe(&self, image: &RgbImage) -> Result<PageResult> {
        self.run(image, "page")
    }

    #[instrument(level = "debug", skip(self, image))]
    fn run(&self, image: &RgbImage, stem: &str) -> Result<PageResult> {
        let detections = self.detector.detect(image)?;
        log::debug!("Detector returned {} regions", detections.len());
        let ordered = line_cluster::order(detections);

        #[cfg(feature = "debug")]
        crate::util::save_debug_images(stem, image, &ordered)?;
        #[cfg(not(feature = "debug"))]
        let _ = stem;

        ordered
            .iter()
            .map(|detection| {
                let crop = crop_region(image, &detection.bbox)?;
                let text = self.recognizer.recognize(&crop)?;
                Ok(TranscriptRecord {
                    text: text.trim().to_string(),
                    bbox: detection.bbox,
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(PageResult::from)
    }
}
