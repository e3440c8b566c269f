use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::Array4;
use ort::{session::Session, value::Value};
use serde::{Deserialize, Serialize};

/// Vocabulary of the bundled ViT facial-expression model, in logit order.
pub const DEFAULT_LABELS: [&str; 7] = [
    "angry", "disgust", "fear", "happy", "neutral", "sad", "surprise",
];

pub fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
}

/// Best label for a single face crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionResult {
    pub label_id: usize,
    pub label: String,
    /// Probability of `label`, in [0, 1].
    pub confidence: f32,
}

/// Anything that names the emotion on a face crop.
///
/// Implementations must be pure with respect to the crop: the same pixels
/// give the same answer.
pub trait EmotionClassifier {
    fn classify(&mut self, crop: &DynamicImage) -> Result<EmotionResult>;
}

const INPUT_SIZE: u32 = 224;
const MEAN: f32 = 0.5;
const STD: f32 = 0.5;

/// ViT image classifier exported to ONNX, expecting `[1, 3, 224, 224]` RGB
/// normalised with mean 0.5 / std 0.5 and returning `[1, labels]` logits.
pub struct VitEmotionClassifier {
    session: Session,
    labels: Vec<String>,
}

impl VitEmotionClassifier {
    pub fn new(session: Session, labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            anyhow::bail!("emotion classifier needs at least one label");
        }
        log::info!("Emotion classifier ready with {} labels", labels.len());
        Ok(Self { session, labels })
    }

    pub fn from_file(path: &Path, labels: Vec<String>) -> Result<Self> {
        Self::new(crate::model::emotion_session(path)?, labels)
    }
}

impl EmotionClassifier for VitEmotionClassifier {
    fn classify(&mut self, crop: &DynamicImage) -> Result<EmotionResult> {
        let input = Value::from_array(preprocess(crop))?;
        let outputs = self
            .session
            .run(ort::inputs![input])
            .context("running emotion classifier")?;
        let (_shape, logits) = outputs[0].try_extract_tensor::<f32>()?;

        if logits.len() != self.labels.len() {
            anyhow::bail!(
                "classifier returned {} logits for {} labels",
                logits.len(),
                self.labels.len()
            );
        }

        let probs = softmax(logits);
        let (label_id, confidence) =
            argmax(&probs).context("classifier returned no finite probability")?;
        let result = EmotionResult {
            label_id,
            label: self.labels[label_id].clone(),
            confidence,
        };
        log::debug!(
            "Prediction complete: label={} confidence={:.4}",
            result.label,
            result.confidence
        );
        Ok(result)
    }
}

/// Normalise any colour mode to RGB and lay it out as a CHW tensor.
pub fn preprocess(crop: &DynamicImage) -> Array4<f32> {
    if !matches!(crop, DynamicImage::ImageRgb8(_)) {
        log::debug!("converting {:?} face crop to RGB", crop.color());
    }
    let rgb = crop
        .resize_exact(INPUT_SIZE, INPUT_SIZE, image::imageops::FilterType::Triangle)
        .to_rgb8();
    let size = INPUT_SIZE as usize;
    Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
        let v = rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
        (v - MEAN) / STD
    })
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the largest finite entry; the first one wins ties.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}
