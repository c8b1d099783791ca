//! The epoch loop: train, validate, checkpoint on a new best validation loss.

use anyhow::Context;
use burn::tensor::backend::Backend;
use indicatif::{ProgressBar, ProgressStyle};
use seg_dataset::{SegBatch, SegLoader};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::checkpoint::checkpoint_path;
use crate::learner::SegmentationLearner;
use crate::logger::EpochLogger;

/// A restartable stream of batches; every call to `batches` is one full pass.
pub trait BatchSource {
    type Batch;

    fn num_batches(&self) -> usize;
    fn batches(&self) -> Box<dyn Iterator<Item = anyhow::Result<Self::Batch>> + '_>;
}

impl<B: Backend> BatchSource for SegLoader<B> {
    type Batch = SegBatch<B>;

    fn num_batches(&self) -> usize {
        SegLoader::num_batches(self)
    }

    fn batches(&self) -> Box<dyn Iterator<Item = anyhow::Result<SegBatch<B>>> + '_> {
        Box::new(self.iter().map(|b| b.map_err(anyhow::Error::from)))
    }
}

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub num_epochs: usize,
    pub learning_rate: f64,
    pub checkpoint_dir: PathBuf,
    /// Draw per-phase progress bars on stderr.
    pub progress: bool,
}

impl TrainingConfig {
    pub fn new(num_epochs: usize, learning_rate: f64, checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            num_epochs,
            learning_rate,
            checkpoint_dir: checkpoint_dir.into(),
            progress: false,
        }
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based.
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub checkpoint: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestCheckpoint {
    pub epoch: usize,
    pub val_loss: f64,
    pub path: PathBuf,
}

/// Run state threaded through the loop and returned at the end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    pub epochs_completed: usize,
    pub best: Option<BestCheckpoint>,
    pub history: Vec<EpochRecord>,
}

impl TrainingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// +inf until the first checkpoint is written.
    pub fn best_val_loss(&self) -> f64 {
        self.best.as_ref().map_or(f64::INFINITY, |b| b.val_loss)
    }

    /// Strict improvement; NaN never improves.
    pub fn is_improvement(&self, val_loss: f64) -> bool {
        val_loss < self.best_val_loss()
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = &PathBuf> {
        self.history.iter().filter_map(|r| r.checkpoint.as_ref())
    }
}

fn phase_bar(enabled: bool, len: usize, label: String) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len} {elapsed}") {
        bar.set_style(style);
    }
    bar.set_message(label);
    bar
}

fn mean(sum: f64, batches: usize) -> f64 {
    if batches == 0 {
        f64::NAN
    } else {
        sum / batches as f64
    }
}

fn train_epoch<L, T>(
    learner: &mut L,
    train: &T,
    cfg: &TrainingConfig,
    epoch: usize,
) -> anyhow::Result<f64>
where
    L: SegmentationLearner,
    T: BatchSource<Batch = L::TrainBatch> + ?Sized,
{
    learner.begin_train();
    let bar = phase_bar(
        cfg.progress,
        train.num_batches(),
        format!("Epoch {}/{}", epoch + 1, cfg.num_epochs),
    );
    let mut sum = 0.0;
    let mut batches = 0usize;
    for batch in train.batches() {
        sum += learner.train_batch(batch?, cfg.learning_rate)?;
        batches += 1;
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(mean(sum, batches))
}

fn validate_epoch<L, V>(learner: &mut L, val: &V, cfg: &TrainingConfig) -> anyhow::Result<f64>
where
    L: SegmentationLearner,
    V: BatchSource<Batch = L::ValidBatch> + ?Sized,
{
    learner.begin_valid();
    let bar = phase_bar(cfg.progress, val.num_batches(), "Validation".to_string());
    let mut sum = 0.0;
    let mut batches = 0usize;
    for batch in val.batches() {
        sum += learner.valid_batch(batch?)?;
        batches += 1;
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(mean(sum, batches))
}

/// Train for `cfg.num_epochs` epochs, validating after each one and writing
/// `unet_model_epoch_<N>.pth` whenever validation loss hits a new minimum.
///
/// Any batch, loss, or checkpoint failure aborts the run.
pub fn run<L, T, V>(
    learner: &mut L,
    train: &T,
    val: &V,
    cfg: &TrainingConfig,
    mut logger: Option<&mut dyn EpochLogger>,
) -> anyhow::Result<TrainingState>
where
    L: SegmentationLearner,
    T: BatchSource<Batch = L::TrainBatch> + ?Sized,
    V: BatchSource<Batch = L::ValidBatch> + ?Sized,
{
    fs::create_dir_all(&cfg.checkpoint_dir).with_context(|| {
        format!(
            "failed to create checkpoint dir {}",
            cfg.checkpoint_dir.display()
        )
    })?;

    let mut state = TrainingState::new();
    for epoch in 0..cfg.num_epochs {
        let train_loss = train_epoch(learner, train, cfg, epoch)?;
        if let Some(log) = logger.as_deref_mut() {
            log.info(&format!(
                "Epoch {}/{}, Train Loss: {:.4}",
                epoch + 1,
                cfg.num_epochs,
                train_loss
            ));
        }

        let val_loss = validate_epoch(learner, val, cfg)?;
        if let Some(log) = logger.as_deref_mut() {
            log.info(&format!(
                "Epoch {}/{}, Validation Loss: {:.4}",
                epoch + 1,
                cfg.num_epochs,
                val_loss
            ));
        }

        let mut saved = None;
        if state.is_improvement(val_loss) {
            let path = checkpoint_path(&cfg.checkpoint_dir, epoch + 1);
            learner.save_checkpoint(&path)?;
            if let Some(log) = logger.as_deref_mut() {
                log.info(&format!("Saved checkpoint to {}", path.display()));
            }
            state.best = Some(BestCheckpoint {
                epoch: epoch + 1,
                val_loss,
                path: path.clone(),
            });
            saved = Some(path);
        }
        state.history.push(EpochRecord {
            epoch: epoch + 1,
            train_loss,
            val_loss,
            checkpoint: saved,
        });
        state.epochs_completed = epoch + 1;
    }

    tracing::info!("Finished Training");
    Ok(state)
}
