use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use veriface_core::matcher;

/// Optional `veriface.toml` contents; every field falls back to a default.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub device: Option<String>,
    pub tolerance: Option<f32>,
    pub downscale: Option<u32>,
    pub warmup_frames: Option<usize>,
    pub locator_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub ocr_lang: Option<String>,
}

/// Resolved configuration: defaults < `veriface.toml` < CLI flags
/// (flag overrides are applied by the caller).
#[derive(Debug, Clone)]
pub struct Config {
    pub device: String,
    pub tolerance: f32,
    pub downscale: u32,
    pub warmup_frames: usize,
    pub locator_model: PathBuf,
    pub encoder_model: PathBuf,
    pub ocr_lang: String,
}

impl Config {
    /// Load configuration, reading `path` when given, otherwise
    /// `./veriface.toml` when present.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                toml::from_str(&raw).with_context(|| format!("parsing config {}", p.display()))?
            }
            None => {
                let default = Path::new("veriface.toml");
                if default.exists() {
                    let raw = std::fs::read_to_string(default).context("reading veriface.toml")?;
                    toml::from_str(&raw).context("parsing veriface.toml")?
                } else {
                    FileConfig::default()
                }
            }
        };
        Ok(Self::resolve(file))
    }

    fn resolve(file: FileConfig) -> Self {
        let model_dir = std::env::var("VERIFACE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("models"));

        Self {
            device: file.device.unwrap_or_else(|| "/dev/video0".to_string()),
            tolerance: file.tolerance.unwrap_or(matcher::DEFAULT_TOLERANCE),
            downscale: file.downscale.unwrap_or(4),
            warmup_frames: file.warmup_frames.unwrap_or(4),
            locator_model: file
                .locator_model
                .unwrap_or_else(|| model_dir.join("ultraface-320.onnx")),
            encoder_model: file
                .encoder_model
                .unwrap_or_else(|| model_dir.join("encoder-128.onnx")),
            ocr_lang: file.ocr_lang.unwrap_or_else(|| "eng".to_string()),
        }
    }
}
