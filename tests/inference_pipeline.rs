//! End-to-end tests: exported artifacts -> startup loader -> predictions

use std::io::Cursor;
use std::path::Path;

use burn_ndarray::NdArray;
use image::{ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

use dermacare::dataset::{ImageSource, LabelCodec};
use dermacare::inference::{export_model, load_predictor, ModelArtifacts, Predictor};
use dermacare::model::SkinClassifierConfig;
use dermacare::DermaCareError;

type TestBackend = NdArray;

const SKIN_CLASSES: [&str; 3] = ["acne", "healthy", "sun_damage"];

fn small_config(num_classes: usize) -> SkinClassifierConfig {
    SkinClassifierConfig::new(num_classes)
        .with_width_multiplier(0.25)
        .with_depth_multiplier(0.25)
}

fn export(dir: &Path, classes: &[&str], config: &SkinClassifierConfig) -> ModelArtifacts {
    let codec = LabelCodec::new(classes.iter().map(|s| s.to_string()).collect()).unwrap();
    let model = config.init::<TestBackend>(&Default::default());
    export_model(model, &codec, config, dir).unwrap()
}

fn skin_predictor(dir: &Path) -> Predictor<TestBackend> {
    let artifacts = export(dir, &SKIN_CLASSES, &small_config(SKIN_CLASSES.len()));
    load_predictor::<TestBackend>(&artifacts, &Default::default()).unwrap()
}

fn write_white_jpeg(path: &Path, size: u32) {
    RgbImage::from_pixel(size, size, Rgb([255, 255, 255]))
        .save_with_format(path, ImageFormat::Jpeg)
        .unwrap();
}

#[test]
fn white_image_is_classified_into_known_class() {
    let dir = TempDir::new().unwrap();
    let predictor = skin_predictor(dir.path());
    let image_path = dir.path().join("white.jpg");
    write_white_jpeg(&image_path, 300);

    let result = predictor.predict(ImageSource::Path(&image_path)).unwrap();

    assert!(SKIN_CLASSES.contains(&result.predicted_class.as_str()));
    assert!(result.confidence >= 1.0 / 3.0 - 1e-6);
    assert!(result.confidence <= 1.0);
}

#[test]
fn repeated_predictions_are_identical() {
    let dir = TempDir::new().unwrap();
    let predictor = skin_predictor(dir.path());
    let image_path = dir.path().join("white.jpg");
    write_white_jpeg(&image_path, 300);

    let first = predictor.predict(ImageSource::Path(&image_path)).unwrap();
    for _ in 0..3 {
        let again = predictor.predict(ImageSource::Path(&image_path)).unwrap();
        assert_eq!(again, first);
    }
}

#[test]
fn path_and_bytes_give_the_same_prediction() {
    let dir = TempDir::new().unwrap();
    let predictor = skin_predictor(dir.path());

    let image = RgbImage::from_fn(120, 80, |x, y| Rgb([(x * 2) as u8, (y * 3) as u8, 128]));
    let image_path = dir.path().join("gradient.png");
    image.save(&image_path).unwrap();
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();

    let from_path = predictor.predict(ImageSource::Path(&image_path)).unwrap();
    let from_bytes = predictor.predict(ImageSource::Bytes(&bytes)).unwrap();
    assert_eq!(from_path, from_bytes);
}

#[test]
fn text_bytes_fail_with_decode_before_inference() {
    let dir = TempDir::new().unwrap();
    let predictor = skin_predictor(dir.path());

    let err = predictor
        .predict(ImageSource::Bytes(b"hello, this is plain text"))
        .unwrap_err();

    assert!(matches!(err, DermaCareError::Decode { .. }));
    assert_eq!(predictor.forward_passes(), 0);
}

#[test]
fn unreadable_path_fails_with_decode() {
    let dir = TempDir::new().unwrap();
    let predictor = skin_predictor(dir.path());

    let err = predictor
        .predict(ImageSource::Path(&dir.path().join("missing.jpg")))
        .unwrap_err();

    assert!(matches!(err, DermaCareError::Decode { .. }));
    assert_eq!(predictor.forward_passes(), 0);
}

#[test]
fn class_count_mismatch_fails_at_startup() {
    let dir = TempDir::new().unwrap();
    // Weights for four classes, codec with three
    let artifacts = export(
        dir.path(),
        &["acne", "eczema", "healthy", "sun_damage"],
        &small_config(4),
    );
    LabelCodec::new(SKIN_CLASSES.iter().map(|s| s.to_string()).collect())
        .unwrap()
        .save(&artifacts.labels)
        .unwrap();

    let err = load_predictor::<TestBackend>(&artifacts, &Default::default())
        .err()
        .unwrap();
    assert!(matches!(err, DermaCareError::WeightLoad(..)));
}

#[test]
fn concurrent_predictions_agree() {
    let dir = TempDir::new().unwrap();
    let predictor = skin_predictor(dir.path());
    let image_path = dir.path().join("white.jpg");
    write_white_jpeg(&image_path, 300);
    let expected = predictor.predict(ImageSource::Path(&image_path)).unwrap();

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let handle = predictor.clone();
                let path = image_path.clone();
                scope.spawn(move || handle.predict(ImageSource::Path(&path)).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for result in results {
        assert_eq!(result, expected);
    }
    assert_eq!(predictor.forward_passes(), 5);
}
