//! Inference Predictor Module
//!
//! Turns an image into a labelled prediction:
//! preprocess -> classifier -> softmax -> argmax -> label codec.
//!
//! A [`Predictor`] is immutable once built. Cloning it is cheap (model
//! parameters are reference-counted tensors), so concurrent callers each
//! work on their own handle without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{ImagePreprocessor, ImageSource, ImageTensor, LabelCodec};
use crate::model::SkinClassifier;
use crate::utils::error::{DermaCareError, Result};
use crate::utils::format_millis;

/// Result of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Name of the most probable class
    pub predicted_class: String,

    /// Probability of that class, in [0, 1]
    pub confidence: f32,
}

/// One entry of a ranked prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub index: usize,
    pub class_name: String,
    pub probability: f32,
}

/// Index and value of the largest probability; the lowest index wins ties
pub fn argmax(probabilities: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &p) in probabilities.iter().enumerate() {
        let better = match best {
            Some((_, b)) => p > b,
            None => !p.is_nan(),
        };
        if better {
            best = Some((i, p));
        }
    }
    best
}

/// The `k` most probable classes, highest first, ties by lowest index
pub fn top_k(probabilities: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    indexed.truncate(k);
    indexed
}

/// Name the most probable class
///
/// A distribution with no comparable value (empty or all NaN) means the
/// classifier itself is broken.
fn select_class(codec: &LabelCodec, probabilities: &[f32]) -> Result<PredictionResult> {
    let (index, confidence) = argmax(probabilities).ok_or_else(|| {
        DermaCareError::InvalidOutput(format!(
            "no finite probability among {} classes",
            probabilities.len()
        ))
    })?;
    Ok(PredictionResult {
        predicted_class: codec.name_for(index)?.to_string(),
        confidence,
    })
}

/// Predictor for running inference with a loaded classifier
pub struct Predictor<B: Backend> {
    model: SkinClassifier<B>,
    codec: Arc<LabelCodec>,
    preprocessor: ImagePreprocessor,
    device: B::Device,
    forward_passes: Arc<AtomicU64>,
}

impl<B: Backend> Clone for Predictor<B> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            codec: Arc::clone(&self.codec),
            preprocessor: self.preprocessor.clone(),
            device: self.device.clone(),
            forward_passes: Arc::clone(&self.forward_passes),
        }
    }
}

impl<B: Backend> Predictor<B> {
    /// Assemble a predictor from already loaded parts
    ///
    /// Fails with `ShapeMismatch` when the model's output layer does not
    /// produce one logit per codec class.
    pub fn new(
        model: SkinClassifier<B>,
        codec: LabelCodec,
        preprocessor: ImagePreprocessor,
        device: B::Device,
    ) -> Result<Self> {
        let output_dim = model.output_dim();
        if output_dim != codec.class_count() {
            return Err(DermaCareError::ShapeMismatch {
                expected: vec![1, codec.class_count()],
                actual: vec![1, output_dim],
            });
        }

        Ok(Self {
            model,
            codec: Arc::new(codec),
            preprocessor,
            device,
            forward_passes: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Classify an image file or encoded image bytes
    ///
    /// Decode failures are returned before the classifier runs.
    pub fn predict(&self, source: ImageSource<'_>) -> Result<PredictionResult> {
        let start = Instant::now();
        let tensor = self.preprocessor.preprocess(source)?;
        let result = self.predict_tensor(&tensor)?;

        info!(
            "Predicted {} for {} (confidence {:.4}, {})",
            result.predicted_class,
            source.describe(),
            result.confidence,
            format_millis(start.elapsed().as_secs_f64())
        );
        Ok(result)
    }

    /// Classify an already preprocessed tensor
    pub fn predict_tensor(&self, tensor: &ImageTensor) -> Result<PredictionResult> {
        let probabilities = self.probabilities(tensor)?;
        select_class(&self.codec, &probabilities)
    }

    /// The `k` most probable classes for an image
    pub fn predict_top_k(&self, source: ImageSource<'_>, k: usize) -> Result<Vec<ClassScore>> {
        self.predict_ranked(source, k).map(|(_, ranked)| ranked)
    }

    /// Headline prediction and the `k` most probable classes from one
    /// classifier run
    pub fn predict_ranked(
        &self,
        source: ImageSource<'_>,
        k: usize,
    ) -> Result<(PredictionResult, Vec<ClassScore>)> {
        let tensor = self.preprocessor.preprocess(source)?;
        let probabilities = self.probabilities(&tensor)?;
        let headline = select_class(&self.codec, &probabilities)?;

        let ranked = top_k(&probabilities, k)
            .into_iter()
            .map(|(index, probability)| {
                Ok(ClassScore {
                    index,
                    class_name: self.codec.name_for(index)?.to_string(),
                    probability,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((headline, ranked))
    }

    /// Raw class scores (logits) for a preprocessed tensor
    pub fn score(&self, tensor: &ImageTensor) -> Result<Vec<f32>> {
        let logits = self.forward(tensor)?;
        self.to_vec(logits)
    }

    /// Softmax distribution over classes for a preprocessed tensor
    pub fn probabilities(&self, tensor: &ImageTensor) -> Result<Vec<f32>> {
        let logits = self.forward(tensor)?;
        let probabilities = burn::tensor::activation::softmax(logits, 1);
        self.to_vec(probabilities)
    }

    fn forward(&self, tensor: &ImageTensor) -> Result<Tensor<B, 2>> {
        debug!("Running classifier on tensor {:?}", ImageTensor::SHAPE);
        self.forward_passes.fetch_add(1, Ordering::Relaxed);
        Ok(self.model.forward(tensor.to_tensor::<B>(&self.device)))
    }

    fn to_vec(&self, output: Tensor<B, 2>) -> Result<Vec<f32>> {
        let [batch, classes] = output.dims();
        if batch != 1 || classes != self.codec.class_count() {
            return Err(DermaCareError::ShapeMismatch {
                expected: vec![1, self.codec.class_count()],
                actual: vec![batch, classes],
            });
        }

        output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| DermaCareError::Serialization(format!("{:?}", e)))
    }

    pub fn codec(&self) -> &LabelCodec {
        &self.codec
    }

    pub fn class_count(&self) -> usize {
        self.codec.class_count()
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Number of classifier invocations across all clones of this predictor
    pub fn forward_passes(&self) -> u64 {
        self.forward_passes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SkinClassifierConfig;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    type TestBackend = NdArray;

    fn test_predictor() -> Predictor<TestBackend> {
        let device = Default::default();
        let codec = LabelCodec::new(vec![
            "acne".to_string(),
            "healthy".to_string(),
            "sun_damage".to_string(),
        ])
        .unwrap();
        let model = SkinClassifierConfig::new(codec.class_count())
            .with_width_multiplier(0.25)
            .with_depth_multiplier(0.25)
            .init::<TestBackend>(&device);
        Predictor::new(model, codec, ImagePreprocessor::default(), device).unwrap()
    }

    fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb(color));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_argmax_lowest_index_wins_ties() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some((1, 0.4)));
        assert_eq!(argmax(&[0.5, 0.5]), Some((0, 0.5)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_argmax_skips_nan() {
        assert_eq!(argmax(&[f32::NAN, 0.1, 0.9]), Some((2, 0.9)));
    }

    #[test]
    fn test_all_nan_output_is_invalid_output() {
        let codec = LabelCodec::new(vec!["a".to_string(), "b".to_string()]).unwrap();

        let err = select_class(&codec, &[f32::NAN, f32::NAN]).unwrap_err();
        assert!(matches!(err, DermaCareError::InvalidOutput(_)));
        assert!(!err.is_client_error());

        let result = select_class(&codec, &[f32::NAN, 0.4]).unwrap();
        assert_eq!(result.predicted_class, "b");
    }

    #[test]
    fn test_top_k_order() {
        let ranked = top_k(&[0.1, 0.3, 0.3, 0.2], 3);
        assert_eq!(ranked, vec![(1, 0.3), (2, 0.3), (3, 0.2)]);
        assert_eq!(top_k(&[0.1, 0.9], 10).len(), 2);
    }

    #[test]
    fn test_mismatched_codec_is_rejected() {
        let device = Default::default();
        let codec = LabelCodec::new(vec!["a".to_string(), "b".to_string()]).unwrap();
        let model = SkinClassifierConfig::new(3)
            .with_width_multiplier(0.25)
            .with_depth_multiplier(0.25)
            .init::<TestBackend>(&device);

        let err = Predictor::new(model, codec, ImagePreprocessor::default(), device)
            .err()
            .unwrap();
        assert!(matches!(err, DermaCareError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_predict_returns_known_class() {
        let predictor = test_predictor();
        let bytes = png_bytes(300, 300, [255, 255, 255]);

        let result = predictor.predict(ImageSource::Bytes(&bytes)).unwrap();
        assert!(predictor.codec().index_of(&result.predicted_class).is_some());
        assert!(result.confidence >= 1.0 / 3.0 - 1e-6);
        assert!(result.confidence <= 1.0);
        assert_eq!(predictor.forward_passes(), 1);
    }

    #[test]
    fn test_probabilities_sum_to_one_and_match_confidence() {
        let predictor = test_predictor();
        let bytes = png_bytes(64, 48, [200, 120, 90]);
        let tensor = predictor
            .preprocessor
            .preprocess(ImageSource::Bytes(&bytes))
            .unwrap();

        let probabilities = predictor.probabilities(&tensor).unwrap();
        let sum: f32 = probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);

        let result = predictor.predict_tensor(&tensor).unwrap();
        let max = probabilities.iter().cloned().fold(f32::MIN, f32::max);
        assert_eq!(result.confidence, max);
    }

    #[test]
    fn test_decode_failure_skips_classifier() {
        let predictor = test_predictor();
        let err = predictor
            .predict(ImageSource::Bytes(b"definitely not an image"))
            .unwrap_err();

        assert!(matches!(err, DermaCareError::Decode { .. }));
        assert!(err.is_client_error());
        assert_eq!(predictor.forward_passes(), 0);
    }

    #[test]
    fn test_top_k_is_sorted_and_named() {
        let predictor = test_predictor();
        let bytes = png_bytes(32, 32, [10, 200, 30]);

        let ranked = predictor
            .predict_top_k(ImageSource::Bytes(&bytes), 3)
            .unwrap();
        assert_eq!(ranked.len(), 3);
        assert!(ranked[0].probability >= ranked[1].probability);
        assert!(ranked[1].probability >= ranked[2].probability);
        for entry in &ranked {
            assert_eq!(
                predictor.codec().name_for(entry.index).unwrap(),
                entry.class_name
            );
        }
    }

    #[test]
    fn test_ranked_prediction_runs_classifier_once() {
        let predictor = test_predictor();
        let bytes = png_bytes(40, 40, [180, 90, 60]);

        let (headline, ranked) = predictor
            .predict_ranked(ImageSource::Bytes(&bytes), 3)
            .unwrap();
        assert_eq!(predictor.forward_passes(), 1);
        assert_eq!(ranked.len(), 3);
        assert_eq!(headline.predicted_class, ranked[0].class_name);
        assert_eq!(headline.confidence, ranked[0].probability);

        let single = predictor.predict(ImageSource::Bytes(&bytes)).unwrap();
        assert_eq!(single, headline);
        assert_eq!(predictor.forward_passes(), 2);
    }

    #[test]
    fn test_prediction_json_keys() {
        let result = PredictionResult {
            predicted_class: "acne".to_string(),
            confidence: 0.75,
        };
        let json = serde_json::to_value(&result).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["predicted_class"], "acne");
        assert_eq!(object["confidence"], 0.75);
    }

    #[test]
    fn test_clones_share_pass_counter() {
        let predictor = test_predictor();
        let handle = predictor.clone();
        let bytes = png_bytes(16, 16, [0, 0, 0]);

        handle.predict(ImageSource::Bytes(&bytes)).unwrap();
        assert_eq!(predictor.forward_passes(), 1);
    }
}
