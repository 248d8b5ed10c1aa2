//! Image preprocessing for inference.
//!
//! Turns an uploaded image (file or bytes) into the fixed `[1, 3, 224, 224]`
//! channel-first tensor the classifier expects: decode, force RGB, bilinear
//! resize, ImageNet normalization. The transform is deterministic; there is
//! no augmentation at inference time.

use std::path::Path;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage, ImageBuffer, ImageReader, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::error::{DermaCareError, Result};
use crate::{IMAGE_CHANNELS, IMAGE_SIZE};

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Where an image comes from
#[derive(Debug, Clone, Copy)]
pub enum ImageSource<'a> {
    /// A file on disk
    Path(&'a Path),
    /// Raw encoded bytes (PNG, JPEG, ...)
    Bytes(&'a [u8]),
}

impl<'a> ImageSource<'a> {
    /// Short description for logs and error messages
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Path(path) => format!("{}", path.display()),
            ImageSource::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

impl<'a> From<&'a Path> for ImageSource<'a> {
    fn from(path: &'a Path) -> Self {
        ImageSource::Path(path)
    }
}

impl<'a> From<&'a [u8]> for ImageSource<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        ImageSource::Bytes(bytes)
    }
}

/// A normalized image in `[batch, channels, height, width]` layout
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
}

impl ImageTensor {
    /// The only shape the classifier accepts
    pub const SHAPE: [usize; 4] = [1, IMAGE_CHANNELS, IMAGE_SIZE, IMAGE_SIZE];

    /// Wrap raw values, rejecting anything that is not exactly [`Self::SHAPE`]
    pub fn from_raw(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        let expected_len: usize = Self::SHAPE.iter().product();
        if shape != Self::SHAPE {
            return Err(DermaCareError::ShapeMismatch {
                expected: Self::SHAPE.to_vec(),
                actual: shape.to_vec(),
            });
        }
        if data.len() != expected_len {
            return Err(DermaCareError::ShapeMismatch {
                expected: vec![expected_len],
                actual: vec![data.len()],
            });
        }
        Ok(Self { data })
    }

    pub fn shape(&self) -> [usize; 4] {
        Self::SHAPE
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Upload to a backend device
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        Tensor::from_data(TensorData::new(self.data.clone(), Self::SHAPE), device)
    }
}

/// Configuration for image preprocessing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Output width and height
    pub target_size: u32,
    /// Normalization means [R, G, B]
    pub mean: [f32; 3],
    /// Normalization standard deviations [R, G, B]
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_size: IMAGE_SIZE as u32,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

/// Deterministic inference-time image transform
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Smallest and largest value `channel` can take after normalization
    pub fn channel_bounds(&self, channel: usize) -> Option<(f32, f32)> {
        let mean = *self.config.mean.get(channel)?;
        let std = *self.config.std.get(channel)?;
        Some(((0.0 - mean) / std, (1.0 - mean) / std))
    }

    /// Decode, resize and normalize an image into an [`ImageTensor`]
    pub fn preprocess(&self, source: ImageSource<'_>) -> Result<ImageTensor> {
        let image = self.decode(source)?;
        debug!(
            "Decoded {} ({}x{}, {:?})",
            source.describe(),
            image.width(),
            image.height(),
            image.color()
        );
        self.preprocess_image(&image)
    }

    /// Preprocess an already decoded image
    pub fn preprocess_image(&self, image: &DynamicImage) -> Result<ImageTensor> {
        // Decoders may hand back grayscale, alpha or 16-bit buffers; the
        // classifier was trained on 8-bit RGB.
        let rgb = image.to_rgb8();
        let resized = self.resize(&rgb);
        let normalized = self.normalize(&resized);

        let size = self.config.target_size as usize;
        ImageTensor::from_raw(normalized, &[1, IMAGE_CHANNELS, size, size])
    }

    /// Decode an image source into pixels
    pub fn decode(&self, source: ImageSource<'_>) -> Result<DynamicImage> {
        match source {
            ImageSource::Path(path) => {
                let reader = ImageReader::open(path)
                    .map_err(|e| DermaCareError::decode_path(path, e))?
                    .with_guessed_format()
                    .map_err(|e| DermaCareError::decode_path(path, e))?;
                reader
                    .decode()
                    .map_err(|e| DermaCareError::decode_path(path, e))
            }
            ImageSource::Bytes(bytes) => image::load_from_memory(bytes)
                .map_err(|e| DermaCareError::decode_bytes(bytes.len(), e)),
        }
    }

    /// Resize to the target square, ignoring aspect ratio
    fn resize(&self, image: &RgbImage) -> RgbImage {
        let target = self.config.target_size;
        if image.dimensions() == (target, target) {
            return image.clone();
        }
        image::imageops::resize(image, target, target, FilterType::Triangle)
    }

    /// Normalize into CHW layout: all R values, then all G, then all B
    fn normalize(&self, image: &RgbImage) -> Vec<f32> {
        let (width, height) = image.dimensions();
        let num_pixels = (width * height) as usize;
        let mut normalized = vec![0.0f32; IMAGE_CHANNELS * num_pixels];

        for (i, pixel) in image.pixels().enumerate() {
            for c in 0..IMAGE_CHANNELS {
                let value = pixel[c] as f32 / 255.0;
                normalized[c * num_pixels + i] = (value - self.config.mean[c]) / self.config.std[c];
            }
        }

        normalized
    }

    /// Map a tensor back to image space (for debugging what the model saw)
    pub fn denormalize(&self, tensor: &ImageTensor) -> RgbImage {
        let size = self.config.target_size;
        let plane = (size * size) as usize;
        let data = tensor.as_slice();

        ImageBuffer::from_fn(size, size, |x, y| {
            let idx = (y * size + x) as usize;
            let mut pixel = Rgb([0u8; 3]);
            for c in 0..IMAGE_CHANNELS {
                let value = data[c * plane + idx] * self.config.std[c] + self.config.mean[c];
                pixel[c] = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
            }
            pixel
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use image::ImageFormat;
    use tempfile::TempDir;

    fn encode_png(image: &DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn assert_within_bounds(preprocessor: &ImagePreprocessor, tensor: &ImageTensor) {
        let plane = IMAGE_SIZE * IMAGE_SIZE;
        for (i, &value) in tensor.as_slice().iter().enumerate() {
            let (lo, hi) = preprocessor.channel_bounds(i / plane).unwrap();
            assert!(
                value >= lo - 1e-5 && value <= hi + 1e-5,
                "value {} at {} outside [{}, {}]",
                value,
                i,
                lo,
                hi
            );
        }
    }

    #[test]
    fn test_output_shape_for_arbitrary_sizes() {
        let preprocessor = ImagePreprocessor::default();
        for (w, h) in [(10, 10), (300, 300), (640, 480), (37, 911)] {
            let img = DynamicImage::new_rgb8(w, h);
            let tensor = preprocessor.preprocess_image(&img).unwrap();
            assert_eq!(tensor.shape(), [1, 3, 224, 224]);
            assert_eq!(tensor.as_slice().len(), 3 * 224 * 224);
        }
    }

    #[test]
    fn test_values_within_normalization_bounds() {
        let preprocessor = ImagePreprocessor::default();
        let img = ImageBuffer::from_fn(97, 53, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        });
        let tensor = preprocessor
            .preprocess_image(&DynamicImage::ImageRgb8(img))
            .unwrap();
        assert_within_bounds(&preprocessor, &tensor);
    }

    #[test]
    fn test_white_image_hits_upper_bound() {
        let preprocessor = ImagePreprocessor::default();
        let img = ImageBuffer::from_pixel(300, 300, Rgb([255u8, 255, 255]));
        let tensor = preprocessor
            .preprocess_image(&DynamicImage::ImageRgb8(img))
            .unwrap();

        let plane = IMAGE_SIZE * IMAGE_SIZE;
        for c in 0..3 {
            let (_, hi) = preprocessor.channel_bounds(c).unwrap();
            let value = tensor.as_slice()[c * plane + 1234];
            assert!((value - hi).abs() < 1e-4);
        }
    }

    #[test]
    fn test_channel_first_layout() {
        let preprocessor = ImagePreprocessor::default();
        let img = ImageBuffer::from_pixel(224, 224, Rgb([255u8, 0, 0]));
        let tensor = preprocessor
            .preprocess_image(&DynamicImage::ImageRgb8(img))
            .unwrap();

        let plane = IMAGE_SIZE * IMAGE_SIZE;
        let data = tensor.as_slice();
        assert!((data[0] - preprocessor.channel_bounds(0).unwrap().1).abs() < 1e-5);
        assert!((data[plane] - preprocessor.channel_bounds(1).unwrap().0).abs() < 1e-5);
        assert!((data[2 * plane] - preprocessor.channel_bounds(2).unwrap().0).abs() < 1e-5);
    }

    #[test]
    fn test_grayscale_and_alpha_are_converted() {
        let preprocessor = ImagePreprocessor::default();
        let gray = DynamicImage::new_luma8(50, 40);
        let rgba = DynamicImage::new_rgba8(50, 40);
        assert_eq!(preprocessor.preprocess_image(&gray).unwrap().shape(), ImageTensor::SHAPE);
        assert_eq!(preprocessor.preprocess_image(&rgba).unwrap().shape(), ImageTensor::SHAPE);
    }

    #[test]
    fn test_bytes_and_path_sources_agree() {
        let preprocessor = ImagePreprocessor::default();
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(64, 48, |x, y| {
            Rgb([x as u8 * 3, y as u8 * 5, 128])
        }));
        let bytes = encode_png(&img);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.png");
        std::fs::write(&path, &bytes).unwrap();

        let from_bytes = preprocessor.preprocess(ImageSource::Bytes(&bytes)).unwrap();
        let from_path = preprocessor.preprocess(ImageSource::Path(&path)).unwrap();
        assert_eq!(from_bytes, from_path);
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let preprocessor = ImagePreprocessor::default();
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(120, 80, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 77])
        }));
        let bytes = encode_png(&img);
        let a = preprocessor.preprocess(ImageSource::Bytes(&bytes)).unwrap();
        let b = preprocessor.preprocess(ImageSource::Bytes(&bytes)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_image_bytes_fail_with_decode() {
        let preprocessor = ImagePreprocessor::default();
        let text = b"this is a text file, not an image";
        let err = preprocessor.preprocess(ImageSource::Bytes(text)).unwrap_err();
        assert!(matches!(err, DermaCareError::Decode { .. }));
    }

    #[test]
    fn test_missing_path_fails_with_decode() {
        let preprocessor = ImagePreprocessor::default();
        let err = preprocessor
            .preprocess(ImageSource::Path(Path::new("/definitely/not/here.jpg")))
            .unwrap_err();
        assert!(matches!(err, DermaCareError::Decode { .. }));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_wrong_target_size_is_shape_mismatch() {
        let preprocessor = ImagePreprocessor::new(PreprocessConfig {
            target_size: 128,
            ..Default::default()
        });
        let err = preprocessor
            .preprocess_image(&DynamicImage::new_rgb8(10, 10))
            .unwrap_err();
        assert!(matches!(err, DermaCareError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_from_raw_rejects_wrong_length() {
        let err = ImageTensor::from_raw(vec![0.0; 10], &ImageTensor::SHAPE).unwrap_err();
        assert!(matches!(err, DermaCareError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_from_raw_rejects_channel_last_shape() {
        let len: usize = ImageTensor::SHAPE.iter().product();
        let err = ImageTensor::from_raw(vec![0.0; len], &[1, IMAGE_SIZE, IMAGE_SIZE, 3])
            .unwrap_err();
        assert!(matches!(err, DermaCareError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_channel_bounds_follow_config() {
        let preprocessor = ImagePreprocessor::new(PreprocessConfig {
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.25, 1.0],
            ..Default::default()
        });
        assert_eq!(preprocessor.channel_bounds(0), Some((-1.0, 1.0)));
        assert_eq!(preprocessor.channel_bounds(1), Some((-2.0, 2.0)));
        assert_eq!(preprocessor.channel_bounds(2), Some((-0.5, 0.5)));
        assert_eq!(preprocessor.channel_bounds(3), None);
    }

    #[test]
    fn test_denormalize_recovers_pixels() {
        let preprocessor = ImagePreprocessor::default();
        let original = ImageBuffer::from_pixel(224, 224, Rgb([100u8, 150, 200]));
        let tensor = preprocessor
            .preprocess_image(&DynamicImage::ImageRgb8(original.clone()))
            .unwrap();
        let restored = preprocessor.denormalize(&tensor);

        let a = original.get_pixel(112, 112);
        let b = restored.get_pixel(112, 112);
        for c in 0..3 {
            assert!((a[c] as i32 - b[c] as i32).abs() <= 1);
        }
    }
}
