use std::path::{Path, PathBuf};

use image::{
    imageops, imageops::FilterType, DynamicImage, ImageDecoder, ImageReader, ImageResult, Rgb,
    RgbImage,
};
use ndarray::Array3;
use ort::{
    execution_providers::ExecutionProviderDispatch,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::instrument;

use crate::{BoundingBox, Error, ExecutionProvider, Result};

/// CHW tensor of `(pixel / 255 - mean) * norm` per channel.
#[instrument(level = "trace", skip(image))]
pub(crate) fn subtract_mean_normalize(
    image: &RgbImage,
    mean_vals: &[f32; 3],
    norm_vals: &[f32; 3],
) -> Array3<f32> {
    Array3::<f32>::from_shape_fn(
        (3, image.height() as usize, image.width() as usize),
        |(ch, y, x)| {
            let value = image.get_pixel(x as u32, y as u32).0[ch] as f32 / 255.0;
            (value - mean_vals[ch]) * norm_vals[ch]
        },
    )
}

/// Decodes the image at `path` in its upright orientation.
///
/// The format is sniffed from the file contents, not the extension, and an
/// EXIF orientation tag is applied to the pixels.
pub fn open_upright(path: &Path) -> ImageResult<DynamicImage> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Crops `bbox` out of `image`, clamping it to the image bounds.
pub fn crop_region(image: &RgbImage, bbox: &BoundingBox) -> Result<RgbImage> {
    let clamp_x = |v: i32| v.clamp(0, image.width() as i32) as u32;
    let clamp_y = |v: i32| v.clamp(0, image.height() as i32) as u32;
    let (x1, x2) = (clamp_x(bbox.x1), clamp_x(bbox.x2));
    let (y1, y2) = (clamp_y(bbox.y1), clamp_y(bbox.y2));
    if x2 <= x1 || y2 <= y1 {
        return Err(Error::EmptyCrop(*bbox));
    }
    log::trace!("Cropping region to ({x1}, {y1}) - ({x2}, {y2})");
    Ok(imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image())
}

/// Mapping between source pixels and a letterboxed square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub gain: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub size: u32,
}

impl Letterbox {
    pub fn new(width: u32, height: u32, size: u32) -> Self {
        let gain = (size as f32 / width as f32).min(size as f32 / height as f32);
        let scaled_width = ((width as f32 * gain).round() as u32).clamp(1, size);
        let scaled_height = ((height as f32 * gain).round() as u32).clamp(1, size);
        let pad_x = ((size - scaled_width) as f32 / 2.0 - 0.1).round().max(0.0) as u32;
        let pad_y = ((size - scaled_height) as f32 / 2.0 - 0.1).round().max(0.0) as u32;
        log::debug!(
            "Letterboxing (w: {width}, h: {height}) into {size}x{size} with gain {gain} and padding ({pad_x}, {pad_y})."
        );
        Self {
            gain,
            pad_x,
            pad_y,
            size,
        }
    }

    /// Resizes `image` into the square input, padding with grey.
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let width = ((image.width() as f32 * self.gain).round() as u32).clamp(1, self.size);
        let height = ((image.height() as f32 * self.gain).round() as u32).clamp(1, self.size);
        let resized = imageops::resize(image, width, height, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([114, 114, 114]));
        imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }

    /// Maps a point from model input space back to source pixels.
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.gain,
            (y - self.pad_y as f32) / self.gain,
        )
    }
}

#[cfg(feature = "tensorrt")]
fn setup_tensorrt(cache_path: PathBuf) -> ExecutionProviderDispatch {
    use ort::execution_providers::TensorRTExecutionProvider;

    TensorRTExecutionProvider::default()
        .with_engine_cache(true)
        .with_engine_cache_path(cache_path.to_string_lossy())
        .with_timing_cache(true)
        .build()
}

#[cfg(feature = "cuda")]
fn setup_cuda() -> ExecutionProviderDispatch {
    use ort::execution_providers::CUDAExecutionProvider;

    CUDAExecutionProvider::default().build()
}

#[cfg(feature = "directml")]
fn setup_directml() -> ExecutionProviderDispatch {
    use ort::execution_providers::DirectMLExecutionProvider;

    DirectMLExecutionProvider::default().build()
}

#[cfg(feature = "coreml")]
fn setup_coreml() -> ExecutionProviderDispatch {
    use ort::execution_providers::CoreMLExecutionProvider;

    CoreMLExecutionProvider::default().build()
}

/// Opens an ONNX session, registering the requested accelerators ahead of the
/// CPU fallback.
#[instrument(level = "debug", skip(execution_providers))]
pub(crate) fn load_session(
    path: &Path,
    num_threads: usize,
    execution_providers: &[ExecutionProvider],
    cache_path: Option<&Path>,
) -> Result<Session> {
    #[cfg(feature = "tensorrt")]
    let cache_path = cache_path.map(Path::to_path_buf).unwrap_or_else(|| {
        path.parent()
            .map(|dir| dir.join(".cache"))
            .unwrap_or_else(|| PathBuf::from(".cache"))
    });
    #[cfg(not(feature = "tensorrt"))]
    let _ = cache_path;

    let providers = execution_providers
        .iter()
        .filter_map(|provider| -> Option<ExecutionProviderDispatch> {
            match provider {
                ExecutionProvider::Default => None,
                #[cfg(feature = "tensorrt")]
                ExecutionProvider::TensorRT => Some(setup_tensorrt(cache_path.clone())),
                #[cfg(feature = "coreml")]
                ExecutionProvider::CoreML => Some(setup_coreml()),
                #[cfg(feature = "cuda")]
                ExecutionProvider::Cuda => Some(setup_cuda()),
                #[cfg(feature = "directml")]
                ExecutionProvider::DirectML => Some(setup_directml()),
            }
        })
        .collect::<Vec<_>>();

    let to_load_error = |source: ort::Error| Error::ModelLoad {
        path: PathBuf::from(path),
        source,
    };
    let session = Session::builder()
        .map_err(to_load_error)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(to_load_error)?
        .with_intra_threads(num_threads)
        .map_err(to_load_error)?
        .with_execution_providers(providers)
        .map_err(to_load_error)?
        .commit_from_file(path)
        .map_err(to_load_error)?;

    log::debug!("{} inputs: {:?}", path.display(), session.inputs);
    log::debug!("{} outputs: {:?}", path.display(), session.outputs);
    Ok(session)
}

#[cfg(feature = "debug")]
pub(crate) fn save_debug_images(
    stem: &str,
    image: &RgbImage,
    ordered: &[crate::Detection],
) -> Result<()> {
    use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

    let dir = PathBuf::from("crops");
    std::fs::create_dir_all(&dir)?;
    let mut overlay = image.clone();
    for (i, detection) in ordered.iter().enumerate() {
        let bbox = detection.bbox;
        if let Ok(crop) = crop_region(image, &bbox) {
            crop.save(dir.join(format!("{stem}_{i}.png")))
                .map_err(std::io::Error::other)?;
        }
        if bbox.width() > 0 && bbox.height() > 0 {
            let rect = Rect::at(bbox.x1, bbox.y1).of_size(bbox.width() as u32, bbox.height() as u32);
            draw_hollow_rect_mut(&mut overlay, rect, Rgb([255, 0, 0]));
        }
    }
    overlay
        .save(dir.join(format!("{stem}_order.png")))
        .map_err(std::io::Error::other)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_maps_into_expected_range() {
        let image = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let tensor = subtract_mean_normalize(&image, &[0.5; 3], &[2.0; 3]);
        assert_eq!(tensor.dim(), (3, 1, 2));
        assert_eq!(tensor[[0, 0, 0]], -1.0);
        assert_eq!(tensor[[2, 0, 1]], 1.0);
    }

    #[test]
    fn crop_clamps_to_image() {
        let image = RgbImage::new(100, 50);
        let crop = crop_region(&image, &BoundingBox::new(-10, 40, 20, 80)).unwrap();
        assert_eq!(crop.dimensions(), (20, 10));
    }

    #[test]
    fn crop_outside_image_is_an_error() {
        let image = RgbImage::new(100, 50);
        let err = crop_region(&image, &BoundingBox::new(120, 0, 140, 10)).unwrap_err();
        assert!(matches!(err, Error::EmptyCrop(_)));
    }

    #[test]
    fn crop_keeps_pixels() {
        let image = RgbImage::from_fn(10, 10, |x, y| Rgb([x as u8, y as u8, 0]));
        let crop = crop_region(&image, &BoundingBox::new(3, 4, 6, 8)).unwrap();
        assert_eq!(crop.get_pixel(0, 0), &Rgb([3, 4, 0]));
        assert_eq!(crop.get_pixel(2, 3), &Rgb([5, 7, 0]));
    }

    /// JPEG bytes of `image` with an APP1 segment holding only an EXIF
    /// orientation tag.
    fn jpeg_with_orientation(image: &RgbImage, orientation: u8) -> Vec<u8> {
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(image.clone())
            .write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();
        let mut exif = b"Exif\0\0MM\0\x2a\0\0\0\x08\0\x01".to_vec();
        exif.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
        exif.extend_from_slice(&[0x00, orientation, 0x00, 0x00]);
        exif.extend_from_slice(&[0x00; 4]);
        let mut segment = vec![0xff, 0xe1];
        segment.extend_from_slice(&(exif.len() as u16 + 2).to_be_bytes());
        segment.extend_from_slice(&exif);
        jpeg.splice(2..2, segment);
        jpeg
    }

    #[test]
    fn format_is_sniffed_from_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.jpg");
        RgbImage::new(8, 6)
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        assert_eq!(open_upright(&path).unwrap().to_rgb8().dimensions(), (8, 6));
    }

    #[test]
    fn exif_orientation_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let page = RgbImage::new(40, 20);

        let path = dir.path().join("rotated.jpg");
        std::fs::write(&path, jpeg_with_orientation(&page, 6)).unwrap();
        assert_eq!(open_upright(&path).unwrap().to_rgb8().dimensions(), (20, 40));

        let path = dir.path().join("upright.jpg");
        std::fs::write(&path, jpeg_with_orientation(&page, 1)).unwrap();
        assert_eq!(open_upright(&path).unwrap().to_rgb8().dimensions(), (40, 20));
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let letterbox = Letterbox::new(1280, 640, 640);
        assert_eq!(letterbox.gain, 0.5);
        assert_eq!((letterbox.pad_x, letterbox.pad_y), (0, 160));
        assert_eq!(letterbox.unmap(320.0, 480.0), (640.0, 640.0));

        let input = letterbox.apply(&RgbImage::new(1280, 640));
        assert_eq!(input.dimensions(), (640, 640));
        assert_eq!(input.get_pixel(0, 0), &Rgb([114, 114, 114]));
        assert_eq!(input.get_pixel(0, 320), &Rgb([0, 0, 0]));
    }
}
