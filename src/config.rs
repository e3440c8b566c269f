use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use memegen_vision::{emotion, pipeline::default_emoji_map, EmojiMap};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("", "", "memegen"));

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| match option_env!("MEMEGEN_CONFIG_PATH") {
    Some(p) => PathBuf::from(p),
    None => PROJECT_DIRS
        .as_ref()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("memegen.toml")),
});

static DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    PROJECT_DIRS
        .as_ref()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detector_model: PathBuf,
    pub score_threshold: f32,
    pub nms_threshold: f32,

    pub emotion_model: PathBuf,
    pub emotion_labels: Vec<String>,

    pub text_model: String,
    pub api_base: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,

    pub output_dir: PathBuf,
    pub template_dir: PathBuf,
    pub font_path: Option<PathBuf>,

    pub emoji_map: EmojiMap,
    /// Emotion label to template file name inside `template_dir`.
    pub memes: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detector_model: DATA_DIR.join("models/face_detection_yunet_2023mar.onnx"),
            score_threshold: 0.6,
            nms_threshold: 0.3,
            emotion_model: DATA_DIR.join("models/vit_face_expression.onnx"),
            emotion_labels: emotion::default_labels(),
            text_model: "gemini-1.5-flash".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            request_timeout_secs: 30,
            output_dir: PathBuf::from("output"),
            template_dir: DATA_DIR.join("templates"),
            font_path: Some(PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf")),
            emoji_map: default_emoji_map(),
            memes: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Credential for the text service: the config value, else the environment.
    pub fn resolve_api_key(&self) -> Result<String> {
        self.api_key_or_env(API_KEY_ENV)
    }

    fn api_key_or_env(&self, var: &str) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        std::env::var(var)
            .ok()
            .filter(|k| !k.is_empty())
            .with_context(|| format!("no api_key in config and {} is not set", var))
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.score_threshold) {
            anyhow::bail!("score_threshold must be within [0, 1], got {}", self.score_threshold);
        }
        if !(0.0..=1.0).contains(&self.nms_threshold) {
            anyhow::bail!("nms_threshold must be within [0, 1], got {}", self.nms_threshold);
        }
        if self.emotion_labels.is_empty() {
            anyhow::bail!("emotion_labels must not be empty");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be positive");
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("memegen-config-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("config.toml")
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = load_config(Some(Path::new("/nonexistent/memegen/config.toml"))).unwrap();
        assert_eq!(cfg.emotion_labels.len(), 7);
        assert_eq!(cfg.score_threshold, 0.6);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let path = scratch("partial");
        std::fs::write(&path, "text_model = \"gemini-pro\"\n[memes]\nhappy = \"happy.jpg\"\n").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.text_model, "gemini-pro");
        assert_eq!(cfg.memes.get("happy").map(String::as_str), Some("happy.jpg"));
        assert_eq!(cfg.nms_threshold, 0.3);
        assert_eq!(cfg.emoji_map.get("sad").map(String::as_str), Some("😢"));
    }

    #[test]
    fn save_then_load() {
        let path = scratch("save");
        let mut cfg = Config::default();
        cfg.request_timeout_secs = 5;
        save_config(&cfg, Some(&path)).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().request_timeout_secs, 5);
    }

    #[test]
    fn rejects_bad_threshold() {
        let path = scratch("bad");
        std::fs::write(&path, "score_threshold = 1.5\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn api_key_prefers_config() {
        let cfg = Config {
            api_key: Some("from-config".into()),
            ..Config::default()
        };
        assert_eq!(cfg.resolve_api_key().unwrap(), "from-config");
    }

    #[test]
    fn api_key_falls_back_to_env() {
        let var = format!("MEMEGEN_TEST_KEY_{}", std::process::id());
        let cfg = Config {
            api_key: Some(String::new()),
            ..Config::default()
        };

        std::env::set_var(&var, "from-env");
        assert_eq!(cfg.api_key_or_env(&var).unwrap(), "from-env");

        std::env::remove_var(&var);
        let err = cfg.api_key_or_env(&var).unwrap_err();
        assert!(err.to_string().contains(&var));
    }
}
