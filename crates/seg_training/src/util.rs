use anyhow::Context;
use burn::backend::Autodiff;
use burn::optim::AdamConfig;
use burn::tensor::backend::{AutodiffBackend, Backend};
use clap::{Parser, ValueEnum};
use seg_dataset::{
    build_loader, index_split, unzip_pairs, validate_dataset_root, SampleTransform, SegLoader,
    SplitDir,
};
use seg_models::{UNet, UNetConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::TrainConfig;
use crate::learner::BurnLearner;
use crate::logger::TracingLogger;
use crate::trainer::{run, TrainingConfig, TrainingState};
use crate::TrainBackend;

pub const STATE_FILE_NAME: &str = "training_state.json";

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train a U-Net segmentation model")]
pub struct TrainArgs {
    /// TOML config file (defaults to ./unet-train.toml if present).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Dataset root containing train/, test/ and eval/.
    #[arg(long)]
    pub dataset_root: Option<PathBuf>,
    /// Number of epochs.
    #[arg(long)]
    pub epochs: Option<usize>,
    /// Batch size.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Learning rate.
    #[arg(long)]
    pub lr: Option<f64>,
    /// Directory for unet_model_epoch_<N>.pth checkpoints.
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,
    /// Seed for reproducible shuffling.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Disable progress bars.
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
    /// Debug-level logging (RUST_LOG overrides).
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl TrainArgs {
    pub fn resolve_config(&self) -> anyhow::Result<TrainConfig> {
        let mut cfg = TrainConfig::load(self.config.as_deref())?;
        if let Some(root) = &self.dataset_root {
            cfg.dataset.root = root.clone();
        }
        if let Some(epochs) = self.epochs {
            cfg.training.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            cfg.dataset.batch_size = batch_size;
        }
        if let Some(lr) = self.lr {
            cfg.training.learning_rate = lr;
        }
        if let Some(dir) = &self.checkpoint_dir {
            cfg.training.checkpoint_dir = dir.clone();
        }
        if self.seed.is_some() {
            cfg.dataset.seed = self.seed;
        }
        if self.no_progress {
            cfg.training.progress = false;
        }
        Ok(cfg)
    }
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            tracing::warn!("built with backend-wgpu; training will still use the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

fn split_loader<B: Backend>(
    split: &SplitDir,
    cfg: &TrainConfig,
    shuffle: bool,
    transform: Arc<dyn SampleTransform>,
    device: &B::Device,
) -> anyhow::Result<SegLoader<B>> {
    let pairs = index_split(split)
        .with_context(|| format!("failed to index split {}", split.root.display()))?;
    if pairs.is_empty() {
        anyhow::bail!("split {} contains no image/mask pairs", split.root.display());
    }
    let (images, masks) = unzip_pairs(pairs);
    let loader = build_loader::<B>(
        images,
        masks,
        cfg.dataset.batch_size,
        shuffle,
        Some(transform),
        device,
    );
    Ok(match cfg.dataset.seed {
        Some(seed) => loader.with_seed(seed),
        None => loader,
    })
}

fn split_by_name(layout: &seg_dataset::DatasetLayout, name: &str) -> SplitDir {
    match name {
        "train" => layout.train.clone(),
        "test" => layout.test.clone(),
        "eval" => layout.eval.clone(),
        other => SplitDir {
            name: other.to_string(),
            root: layout.root.join(other),
        },
    }
}

type ADBackend = Autodiff<TrainBackend>;

/// Train a fresh U-Net on the dataset described by `cfg`.
pub fn train_unet<B: AutodiffBackend>(
    cfg: &TrainConfig,
    device: &B::Device,
) -> anyhow::Result<TrainingState> {
    let layout = validate_dataset_root(&cfg.dataset.root)
        .with_context(|| format!("dataset root {} is not usable", cfg.dataset.root.display()))?;
    let transform: Arc<dyn SampleTransform> = Arc::new(cfg.dataset.preprocess.clone());
    tracing::info!(preprocess = %transform.describe(), "building loaders");

    let train_split = split_by_name(&layout, &cfg.dataset.train_split);
    let val_split = split_by_name(&layout, &cfg.dataset.val_split);
    let train_loader = split_loader::<B>(
        &train_split,
        cfg,
        cfg.dataset.shuffle,
        transform.clone(),
        device,
    )?;
    // Validation runs on the inner backend; its batches carry no autodiff graph.
    let val_loader = split_loader::<B::InnerBackend>(
        &val_split,
        cfg,
        cfg.dataset.shuffle,
        transform,
        device,
    )?;
    tracing::info!(
        train_samples = train_loader.len(),
        val_samples = val_loader.len(),
        batch_size = train_loader.batch_size(),
        "loaders ready"
    );

    let model = UNet::<B>::new(&cfg.model, device);
    let mut learner = BurnLearner::new(model, AdamConfig::new().init());
    let training = TrainingConfig::new(
        cfg.training.epochs,
        cfg.training.learning_rate,
        cfg.training.checkpoint_dir.clone(),
    )
    .with_progress(cfg.training.progress);
    let mut logger = TracingLogger;
    run(
        &mut learner,
        &train_loader,
        &val_loader,
        &training,
        Some(&mut logger),
    )
}

pub fn write_state(state: &TrainingState, dir: &Path) -> anyhow::Result<PathBuf> {
    let path = dir.join(STATE_FILE_NAME);
    let json = serde_json::to_vec_pretty(state)?;
    std::fs::write(&path, json)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend)?;
    let cfg = args.resolve_config()?;
    let device = <ADBackend as Backend>::Device::default();
    let state = train_unet::<ADBackend>(&cfg, &device)?;
    let state_path = write_state(&state, &cfg.training.checkpoint_dir)?;
    match &state.best {
        Some(best) => tracing::info!(
            epoch = best.epoch,
            val_loss = best.val_loss,
            checkpoint = %best.path.display(),
            state = %state_path.display(),
            "best checkpoint"
        ),
        None => tracing::warn!("no checkpoint written"),
    }
    Ok(())
}

/// Parse `C,H,W` (e.g. `3,224,224`).
pub fn parse_input_size(raw: &str) -> Result<[usize; 3], String> {
    let dims: Vec<usize> = raw
        .split(',')
        .map(|s| s.trim().parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid input size '{raw}': {e}"))?;
    <[usize; 3]>::try_from(dims)
        .map_err(|d| format!("input size needs 3 dims (C,H,W), got {}", d.len()))
}

pub fn default_input_size(model: &UNetConfig, cfg: &TrainConfig) -> [usize; 3] {
    let (w, h) = cfg.dataset.preprocess.resize.unwrap_or((224, 224));
    [model.in_channels, h as usize, w as usize]
}
