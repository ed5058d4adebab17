//! Command line arguments backing the `pagescribe` binary.
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pagescribe",
    about = "Transcribe a folder of document images into per-image JSON files",
    version
)]
pub struct Args {
    /// Directory holding the .jpg/.jpeg/.png pages
    #[arg(long, short = 'i', default_value = "IMAGES")]
    pub input_dir: PathBuf,

    /// Directory receiving one .json file per page
    #[arg(long, short = 'o', default_value = "predictions_of_IMAGES")]
    pub output_dir: PathBuf,

    /// YOLOv8 text region detector
    #[arg(long, default_value = "models/yolov8_text.onnx")]
    pub detector: PathBuf,

    /// TrOCR encoder
    #[arg(long, default_value = "models/trocr/encoder_model.onnx")]
    pub encoder: PathBuf,

    /// TrOCR decoder
    #[arg(long, default_value = "models/trocr/decoder_model.onnx")]
    pub decoder: PathBuf,

    /// Tokenizer matching the TrOCR decoder
    #[arg(long, default_value = "models/trocr/tokenizer.json")]
    pub tokenizer: PathBuf,

    /// ONNX Runtime threads per session
    #[arg(long, default_value_t = 4)]
    pub threads: usize,

    /// Cache directory for compiled accelerator engines
    #[arg(long)]
    pub engine_cache: Option<PathBuf>,
}
