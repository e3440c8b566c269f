use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use image::DynamicImage;
use memegen_vision::{FaceEmotionRecord, FacePipeline};
use serde::Serialize;

use crate::config::Config;
use crate::dialogue::{DialogueSynthesizer, GeminiClient};
use crate::error::{MemeError, Result};
use crate::render::{ImageRef, MemeRenderer};
use crate::templates::TemplateLibrary;

/// What the captions are drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backdrop {
    /// The submitted photo itself.
    #[default]
    Photo,
    /// The template registered for the representative emotion.
    Template,
}

/// Finished meme. The caller owns the PNG bytes.
#[derive(Debug, Clone, Serialize)]
pub struct MemeArtifact {
    /// Where the backdrop came from: the caller's label or a template path.
    pub source: String,
    pub emotion: String,
    pub top: String,
    pub bottom: String,
    pub faces: Vec<FaceEmotionRecord>,
    #[serde(skip)]
    pub image: Vec<u8>,
}

/// First face that was classified; a batch where every face failed has no
/// usable emotion.
pub fn representative_emotion(records: &[FaceEmotionRecord]) -> Result<&FaceEmotionRecord> {
    if records.is_empty() {
        return Err(MemeError::NoFaces);
    }
    records
        .iter()
        .find(|r| !r.is_error())
        .ok_or(MemeError::NoUsableEmotion {
            faces: records.len(),
        })
}

/// Photo in, captioned meme out:
/// faces -> representative emotion -> captions -> composite.
pub struct MemePipeline {
    pub faces: FacePipeline,
    pub dialogue: DialogueSynthesizer,
    pub renderer: MemeRenderer,
    pub templates: TemplateLibrary,
    pub backdrop: Backdrop,
}

impl MemePipeline {
    pub fn new(
        faces: FacePipeline,
        dialogue: DialogueSynthesizer,
        renderer: MemeRenderer,
        templates: TemplateLibrary,
    ) -> Self {
        Self {
            faces,
            dialogue,
            renderer,
            templates,
            backdrop: Backdrop::default(),
        }
    }

    /// Load models, font and service client described by `cfg`.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        log::info!("Initializing meme pipeline...");
        let faces = FacePipeline::from_models(
            &cfg.detector_model,
            &cfg.emotion_model,
            cfg.emotion_labels.clone(),
            cfg.score_threshold,
            cfg.nms_threshold,
            cfg.emoji_map.clone(),
        )
        .context("loading face models")?;

        let client = GeminiClient::new(
            &cfg.api_base,
            &cfg.text_model,
            cfg.resolve_api_key()?,
            Duration::from_secs(cfg.request_timeout_secs),
        )?;

        Ok(Self::new(
            faces,
            DialogueSynthesizer::new(Box::new(client)),
            MemeRenderer::with_font(cfg.font_path.as_deref()),
            TemplateLibrary::new(&cfg.template_dir, cfg.memes.clone()),
        ))
    }

    pub fn with_backdrop(mut self, backdrop: Backdrop) -> Self {
        self.backdrop = backdrop;
        self
    }

    /// Decode an uploaded file and run the pipeline on it.
    pub fn run_file(&mut self, path: &Path) -> Result<MemeArtifact> {
        let img = image::open(path).map_err(|e| {
            MemeError::InvalidInput(format!("cannot read image {}: {}", path.display(), e))
        })?;
        self.run(&img, &path.display().to_string())
    }

    /// Decode raw upload bytes (any supported raster format) and run.
    pub fn run_bytes(&mut self, data: &[u8], source: &str) -> Result<MemeArtifact> {
        let img = image::load_from_memory(data)
            .map_err(|e| MemeError::InvalidInput(format!("cannot decode {}: {}", source, e)))?;
        self.run(&img, source)
    }

    pub fn run(&mut self, img: &DynamicImage, source: &str) -> Result<MemeArtifact> {
        log::info!("Running meme pipeline on {}", source);

        let faces = self.faces.run(img).map_err(MemeError::Detection)?;
        let primary = representative_emotion(&faces)?;
        let emotion = primary.label.clone();
        log::info!(
            "Detected primary emotion: {} (face {} of {})",
            emotion,
            primary.index,
            faces.len()
        );

        let captions = self
            .dialogue
            .synthesize(&emotion)
            .map_err(MemeError::Dialogue)?;

        let (image, source) = match self.backdrop {
            Backdrop::Photo => (
                self.renderer
                    .render(ImageRef::Image(img), &captions.top, &captions.bottom),
                source.to_string(),
            ),
            Backdrop::Template => {
                let template = self
                    .templates
                    .template_for(&emotion)
                    .map_err(MemeError::Template)?;
                (
                    self.renderer.render(
                        ImageRef::Path(&template),
                        &captions.top,
                        &captions.bottom,
                    ),
                    template.display().to_string(),
                )
            }
        };

        log::info!("Meme pipeline completed successfully");
        Ok(MemeArtifact {
            source,
            emotion,
            top: captions.top,
            bottom: captions.bottom,
            faces,
            image,
        })
    }
}
