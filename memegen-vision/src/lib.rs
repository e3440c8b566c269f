pub mod emotion;
pub mod face;
pub mod model;
pub mod pipeline;
pub mod yunet;

// Re-export commonly used types
pub use emotion::{EmotionClassifier, EmotionResult, VitEmotionClassifier};
pub use face::{BoundingBox, FaceLocator, YuNetLocator};
pub use pipeline::{EmojiMap, FaceEmotionRecord, FacePipeline, ERROR_LABEL};
