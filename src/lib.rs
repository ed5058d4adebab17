use std::path::PathBuf;

mod batch;
mod error;
pub mod line_cluster;
pub mod output;
mod page;
mod result;
mod trocr;
pub mod util;
mod yolo;

pub use batch::{BatchReport, BatchRunner, IMAGE_EXTENSIONS};
pub use error::{Error, Result};
pub use page::{Detector, PageOutcome, PageProcessor, Recognizer};
pub use result::*;
pub use trocr::{TrOcrNet, TrOcrOptions};
pub use yolo::{YoloNet, YoloOptions};
use tracing::instrument;

pub use ort as runtime;

/// Page processor backed by the ONNX detector and recognizer.
pub type PageScribe = PageProcessor<YoloNet, TrOcrNet>;

pub struct PageScribeBuilder {
    threads: usize,
    detector_path: Option<PathBuf>,
    recognizer_paths: Option<(PathBuf, PathBuf, PathBuf)>,
    detector_options: YoloOptions,
    recognizer_options: TrOcrOptions,
    cache_path: Option<PathBuf>,
    execution_providers: Vec<ExecutionProvider>,
}

impl PageScribeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn detector_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.detector_path = Some(path.into());
        self
    }

    pub fn recognizer_model(
        mut self,
        encoder_path: impl Into<PathBuf>,
        decoder_path: impl Into<PathBuf>,
        tokenizer_path: impl Into<PathBuf>,
    ) -> Self {
        self.recognizer_paths = Some((
            encoder_path.into(),
            decoder_path.into(),
            tokenizer_path.into(),
        ));
        self
    }

    pub fn detector_options(mut self, options: YoloOptions) -> Self {
        self.detector_options = options;
        self
    }

    pub fn recognizer_options(mut self, options: TrOcrOptions) -> Self {
        self.recognizer_options = options;
        self
    }

    pub fn with_engine_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn with_execution_providers(
        mut self,
        providers: impl IntoIterator<Item = ExecutionProvider>,
    ) -> Self {
        self.execution_providers = providers.into_iter().collect();
        self
    }

    #[instrument(skip(self), level = "debug")]
    fn init_models(&mut self) -> Result<(YoloNet, TrOcrNet)> {
        let detector_path = self
            .detector_path
            .take()
            .unwrap_or_else(|| "models/yolov8_text.onnx".into());
        let (encoder_path, decoder_path, tokenizer_path) =
            self.recognizer_paths.take().unwrap_or_else(|| {
                (
                    "models/trocr/encoder_model.onnx".into(),
                    "models/trocr/decoder_model.onnx".into(),
                    "models/trocr/tokenizer.json".into(),
                )
            });
        Ok((
            YoloNet::init(
                &detector_path,
                self.threads,
                self.detector_options,
                &self.execution_providers,
                self.cache_path.as_deref(),
            )?,
            TrOcrNet::init(
                &encoder_path,
                &decoder_path,
                &tokenizer_path,
                self.threads,
                self.recognizer_options,
                &self.execution_providers,
                self.cache_path.as_deref(),
            )?,
        ))
    }

    /// Loads both models. Failing here is fatal for a batch.
    #[instrument(skip(self))]
    pub fn build(mut self) -> Result<PageScribe> {
        let (detector, recognizer) = self.init_models()?;
        Ok(PageProcessor::new(detector, recognizer))
    }
}

impl Default for PageScribeBuilder {
    fn default() -> Self {
        Self {
            threads: 4,
            detector_path: None,
            recognizer_paths: None,
            detector_options: YoloOptions::default(),
            recognizer_options: TrOcrOptions::default(),
            cache_path: None,
            execution_providers: DEFAULT_PROVIDERS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Default,
    #[cfg(feature = "tensorrt")]
    TensorRT,
    #[cfg(feature = "coreml")]
    CoreML,
    #[cfg(feature = "cuda")]
    Cuda,
    #[cfg(feature = "directml")]
    DirectML,
}

const DEFAULT_PROVIDERS: &[ExecutionProvider] = &[
    #[cfg(feature = "tensorrt")]
    ExecutionProvider::TensorRT,
    #[cfg(feature = "coreml")]
    ExecutionProvider::CoreML,
    #[cfg(feature = "directml")]
    ExecutionProvider::DirectML,
    #[cfg(feature = "cuda")]
    ExecutionProvider::Cuda,
    ExecutionProvider::Default,
];
