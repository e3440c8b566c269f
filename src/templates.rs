use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};

pub const DEFAULT_TEMPLATE: &str = "default_template.png";
const DEFAULT_TEMPLATE_SIZE: u32 = 800;

/// Static emotion -> template image table rooted at one directory.
#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    dir: PathBuf,
    memes: BTreeMap<String, String>,
}

impl TemplateLibrary {
    pub fn new(dir: impl Into<PathBuf>, memes: BTreeMap<String, String>) -> Self {
        let memes = memes
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Self {
            dir: dir.into(),
            memes,
        }
    }

    /// Template registered for `emotion`, or the default template when there
    /// is none or its file is missing.
    pub fn template_for(&self, emotion: &str) -> Result<PathBuf> {
        if let Some(name) = self.memes.get(&emotion.to_lowercase()) {
            let path = self.dir.join(name);
            if path.is_file() {
                log::info!("Using template {} for '{}'", path.display(), emotion);
                return Ok(path);
            }
            log::warn!(
                "Template {} for '{}' not found, using default",
                path.display(),
                emotion
            );
        }
        self.default_template()
    }

    /// Blank white square, created on first use and reused afterwards.
    pub fn default_template(&self) -> Result<PathBuf> {
        let path = self.dir.join(DEFAULT_TEMPLATE);
        if path.is_file() {
            log::debug!("Using cached default template");
            return Ok(path);
        }
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating template dir {}", self.dir.display()))?;
        RgbImage::from_pixel(
            DEFAULT_TEMPLATE_SIZE,
            DEFAULT_TEMPLATE_SIZE,
            Rgb([255, 255, 255]),
        )
        .save(&path)
        .with_context(|| format!("writing default template {}", path.display()))?;
        log::info!("Default template created at {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "memegen-templates-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn creates_default_once() {
        let dir = scratch("default");
        let lib = TemplateLibrary::new(&dir, BTreeMap::new());
        let first = lib.template_for("happy").unwrap();
        assert_eq!(first, dir.join(DEFAULT_TEMPLATE));
        let img = image::open(&first).unwrap();
        assert_eq!((img.width(), img.height()), (800, 800));
        assert_eq!(lib.default_template().unwrap(), first);
    }

    #[test]
    fn registered_template_wins() {
        let dir = scratch("registered");
        std::fs::create_dir_all(&dir).unwrap();
        RgbImage::new(10, 10).save(dir.join("sad.png")).unwrap();

        let memes = BTreeMap::from([("Sad".to_string(), "sad.png".to_string())]);
        let lib = TemplateLibrary::new(&dir, memes);
        assert_eq!(lib.template_for("SAD").unwrap(), dir.join("sad.png"));
    }

    #[test]
    fn missing_registered_file_falls_back() {
        let dir = scratch("missing");
        let memes = BTreeMap::from([("angry".to_string(), "gone.png".to_string())]);
        let lib = TemplateLibrary::new(&dir, memes);
        assert_eq!(lib.template_for("angry").unwrap(), dir.join(DEFAULT_TEMPLATE));
    }
}
