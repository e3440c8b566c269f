pub mod config;
pub mod dialogue;
pub mod error;
pub mod meme;
pub mod render;
pub mod templates;

// Re-export vision types for convenience
pub use memegen_vision::{
    emotion, face, pipeline, BoundingBox, EmotionClassifier, EmotionResult, FaceEmotionRecord,
    FaceLocator, FacePipeline, ERROR_LABEL,
};

pub use dialogue::{CaptionPair, DialogueSynthesizer, TextGenerator};
pub use error::MemeError;
pub use meme::{Backdrop, MemeArtifact, MemePipeline};
pub use render::{ImageRef, MemeRenderer};
