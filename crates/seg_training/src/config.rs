//! TOML run configuration. Every field has a default; CLI flags override.

use anyhow::Context;
use seg_dataset::Preprocess;
use seg_models::UNetConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_NAME: &str = "unet-train.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSection {
    pub root: PathBuf,
    pub train_split: String,
    /// Split used for the validation phase.
    pub val_split: String,
    pub batch_size: usize,
    pub shuffle: bool,
    pub seed: Option<u64>,
    pub preprocess: Preprocess,
}

impl Default for DatasetSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            train_split: "train".to_string(),
            val_split: "test".to_string(),
            batch_size: 4,
            shuffle: true,
            seed: None,
            preprocess: Preprocess::imagenet(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    pub epochs: usize,
    pub learning_rate: f64,
    pub checkpoint_dir: PathBuf,
    pub progress: bool,
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self {
            epochs: 10,
            learning_rate: 1e-3,
            checkpoint_dir: PathBuf::from("checkpoints"),
            progress: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub dataset: DatasetSection,
    pub model: UNetConfig,
    pub training: TrainingSection,
}

impl TrainConfig {
    /// Read `path` if given, else `unet-train.toml` in the working directory
    /// if present, else defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None if Path::new(DEFAULT_CONFIG_NAME).exists() => {
                Self::from_path(Path::new(DEFAULT_CONFIG_NAME))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut cfg: TrainConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        cfg.dataset.root = expand_path(&cfg.dataset.root);
        cfg.training.checkpoint_dir = expand_path(&cfg.training.checkpoint_dir);
        cfg.warn_if_invalid();
        Ok(cfg)
    }

    fn warn_if_invalid(&self) {
        if self.dataset.batch_size == 0 {
            tracing::warn!("config: dataset.batch_size is 0; using 1");
        }
        if self.training.epochs == 0 {
            tracing::warn!("config: training.epochs is 0; nothing will be trained");
        }
        if self.model.num_classes < 2 {
            tracing::warn!(
                "config: model.num_classes is {}; cross-entropy needs at least 2 classes",
                self.model.num_classes
            );
        }
        if let Some((w, h)) = self.dataset.preprocess.resize {
            let multiple = self.model.spatial_multiple() as u32;
            if w % multiple != 0 || h % multiple != 0 {
                tracing::warn!(
                    "config: resize {w}x{h} is not divisible by {multiple}; U-Net skips will not line up"
                );
            }
        }
    }
}

/// Expand a leading `~` to `$HOME`.
fn expand_path(path: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(stripped) = raw.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(format!("{home}{stripped}"));
        }
    }
    path.to_path_buf()
}
