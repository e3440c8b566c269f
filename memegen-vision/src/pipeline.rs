use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use serde::Serialize;

use crate::emotion::{EmotionClassifier, EmotionResult, VitEmotionClassifier};
use crate::face::{self, BoundingBox, FaceLocator, YuNetLocator};

/// Label recorded for a face whose classification failed.
pub const ERROR_LABEL: &str = "Error";

/// Lower-cased emotion label to emoji.
pub type EmojiMap = BTreeMap<String, String>;

pub fn default_emoji_map() -> EmojiMap {
    [
        ("angry", "😠"),
        ("disgust", "🤢"),
        ("fear", "😨"),
        ("happy", "😄"),
        ("neutral", "😐"),
        ("sad", "😢"),
        ("surprise", "😲"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Unknown labels map to the empty string.
pub fn lookup_emoji(map: &EmojiMap, label: &str) -> String {
    map.get(&label.to_lowercase()).cloned().unwrap_or_default()
}

/// Probability in [0, 1] as a percentage rounded to two decimals.
pub fn to_percent(confidence: f32) -> f32 {
    (confidence.clamp(0.0, 1.0) * 100.0 * 100.0).round() / 100.0
}

/// One entry per detected face, in detector order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceEmotionRecord {
    /// 1-based position among the detected faces.
    pub index: usize,
    pub bbox: BoundingBox,
    pub label: String,
    pub label_id: Option<usize>,
    /// Percentage in [0, 100]; 0.0 on failure.
    pub confidence: f32,
    pub emoji: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FaceEmotionRecord {
    pub fn classified(index: usize, bbox: BoundingBox, result: EmotionResult, emoji: String) -> Self {
        Self {
            index,
            bbox,
            label: result.label,
            label_id: Some(result.label_id),
            confidence: to_percent(result.confidence),
            emoji,
            error: None,
        }
    }

    pub fn failed(index: usize, reason: String) -> Self {
        Self {
            index,
            bbox: BoundingBox::zero(),
            label: ERROR_LABEL.to_string(),
            label_id: None,
            confidence: 0.0,
            emoji: String::new(),
            error: Some(reason),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Face detection followed by per-face emotion classification.
///
/// Only detection can fail the whole call. Every detected box yields exactly
/// one record; a face that cannot be cropped or classified is recorded as
/// the [`ERROR_LABEL`] sentinel and the batch carries on.
pub struct FacePipeline {
    pub locator: Box<dyn FaceLocator + Send>,
    pub classifier: Box<dyn EmotionClassifier + Send>,
    pub emoji: EmojiMap,
}

impl FacePipeline {
    pub fn new(
        locator: Box<dyn FaceLocator + Send>,
        classifier: Box<dyn EmotionClassifier + Send>,
        emoji: EmojiMap,
    ) -> Self {
        Self {
            locator,
            classifier,
            emoji,
        }
    }

    /// YuNet detector plus ViT classifier loaded from disk.
    pub fn from_models(
        detector_model: &Path,
        emotion_model: &Path,
        labels: Vec<String>,
        score_threshold: f32,
        nms_threshold: f32,
        emoji: EmojiMap,
    ) -> Result<Self> {
        let locator = YuNetLocator::from_file(detector_model, score_threshold, nms_threshold)?;
        let classifier = VitEmotionClassifier::from_file(emotion_model, labels)?;
        Ok(Self::new(Box::new(locator), Box::new(classifier), emoji))
    }

    pub fn run(&mut self, img: &DynamicImage) -> Result<Vec<FaceEmotionRecord>> {
        let boxes = self.locator.detect(img).context("detecting faces")?;
        if boxes.is_empty() {
            log::warn!("No faces detected in the image");
            return Ok(Vec::new());
        }

        let mut records = Vec::with_capacity(boxes.len());
        for (i, bbox) in boxes.iter().enumerate() {
            let index = i + 1;
            let record = match self.classify_face(img, bbox) {
                Ok(result) => {
                    log::debug!(
                        "face {}: {} ({:.4})",
                        index,
                        result.label,
                        result.confidence
                    );
                    let emoji = lookup_emoji(&self.emoji, &result.label);
                    FaceEmotionRecord::classified(index, bbox.truncated(), result, emoji)
                }
                Err(e) => {
                    log::warn!("Error processing face {}: {:#}", index, e);
                    FaceEmotionRecord::failed(index, format!("{:#}", e))
                }
            };
            records.push(record);
        }

        let ok = records.iter().filter(|r| !r.is_error()).count();
        log::info!(
            "Emotion detection complete: {} face(s) found, {} classified",
            records.len(),
            ok
        );
        Ok(records)
    }

    fn classify_face(&mut self, img: &DynamicImage, bbox: &BoundingBox) -> Result<EmotionResult> {
        let crop = face::crop_face(img, bbox)?;
        self.classifier.classify(&crop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emoji_lookup_lowercases() {
        let map = default_emoji_map();
        assert_eq!(lookup_emoji(&map, "HAPPY"), "😄");
        assert_eq!(lookup_emoji(&map, "contempt"), "");
    }

    #[test]
    fn percent_rounds_to_two_places() {
        assert_eq!(to_percent(0.987654), 98.77);
        assert_eq!(to_percent(1.0), 100.0);
        assert_eq!(to_percent(0.0), 0.0);
    }

    #[test]
    fn failed_record_is_sentinel() {
        let r = FaceEmotionRecord::failed(3, "boom".into());
        assert_eq!(r.index, 3);
        assert_eq!(r.label, ERROR_LABEL);
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.bbox, BoundingBox::zero());
        assert!(r.emoji.is_empty());
        assert!(r.is_error());
    }
}
