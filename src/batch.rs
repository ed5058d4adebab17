use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{error, info, instrument};
use walkdir::WalkDir;

use crate::{output, Detector, PageProcessor, Recognizer, Result};

/// Extensions picked up from the input directory, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// Pages transcribed and written.
    pub processed: usize,
    /// Pages whose output already existed.
    pub skipped: usize,
    /// Pages that could not be decoded; written as empty pages.
    pub unreadable: usize,
    /// Pages that failed during inference or writing; nothing was written.
    pub failed: usize,
}

/// Transcribes every image of a directory that has no output yet.
pub struct BatchRunner<'a, D, R> {
    processor: &'a PageProcessor<D, R>,
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl<'a, D: Detector, R: Recognizer> BatchRunner<'a, D, R> {
    pub fn new(
        processor: &'a PageProcessor<D, R>,
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            processor,
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// `<output dir>/<image stem>.json`
    pub fn output_path(&self, image_path: &Path) -> PathBuf {
        let mut name = image_path
            .file_stem()
            .unwrap_or(image_path.as_os_str())
            .to_os_string();
        name.push(".json");
        self.output_dir.join(name)
    }

    /// Images in the input directory, sorted by file name.
    pub fn images(&self) -> Result<Vec<PathBuf>> {
        let mut images = Vec::new();
        for entry in WalkDir::new(&self.input_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() && is_image(entry.path()) {
                images.push(entry.into_path());
            }
        }
        Ok(images)
    }

    /// Runs the batch. Only listing the input directory or creating the output
    /// directory can fail; per-image problems are logged and counted.
    #[instrument(skip(self), fields(input = %self.input_dir.display(), output = %self.output_dir.display()))]
    pub fn run(&self) -> Result<BatchReport> {
        fs::create_dir_all(&self.output_dir)?;
        let mut report = BatchReport::default();

        for image_path in self.images()? {
            let name = image_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let output_path = self.output_path(&image_path);

            if output_path.exists() {
                info!("Skipping {name} - output already exists");
                report.skipped += 1;
                continue;
            }

            match self.process_one(&image_path, &output_path) {
                Ok(true) => {
                    report.processed += 1;
                    info!("Processed {name} -> Saved to {}", output_path.display());
                    info!("Number of JSON files: {}", self.count_outputs());
                }
                Ok(false) => {
                    report.unreadable += 1;
                    info!("Wrote empty page for unreadable {name}");
                }
                Err(err) => {
                    report.failed += 1;
                    error!("Error processing {name}: {err}");
                }
            }
        }

        info!(
            processed = report.processed,
            skipped = report.skipped,
            unreadable = report.unreadable,
            failed = report.failed,
            "Processing complete"
        );
        Ok(report)
    }

    /// Returns whether the page was readable.
    fn process_one(&self, image_path: &Path, output_path: &Path) -> Result<bool> {
        let outcome = self.processor.process(image_path)?;
        let readable = !outcome.is_unreadable();
        output::write_page_json(&outcome.into_page(), output_path)?;
        Ok(readable)
    }

    fn count_outputs(&self) -> usize {
        WalkDir::new(&self.output_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| has_extension(entry.path(), &["json"]))
            .count()
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|it| ext.eq_ignore_ascii_case(it)))
}

fn is_image(path: &Path) -> bool {
    has_extension(path, IMAGE_EXTENSIONS)
}
