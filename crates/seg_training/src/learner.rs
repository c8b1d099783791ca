//! Per-batch numerics: forward pass, pixel-wise cross-entropy, Adam updates.

use anyhow::bail;
use burn::module::{AutodiffModule, Module};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Int, Tensor};
use seg_dataset::SegBatch;
use seg_models::UNet;
use std::path::Path;

use crate::checkpoint::save_checkpoint;

/// What the epoch loop needs from a model + optimizer pair.
pub trait SegmentationLearner {
    type TrainBatch;
    type ValidBatch;

    /// Called before the first training batch of an epoch.
    fn begin_train(&mut self) {}
    /// Called before the first validation batch of an epoch.
    fn begin_valid(&mut self) {}

    /// Forward, loss, backward, one optimizer step. Returns the batch loss.
    fn train_batch(&mut self, batch: Self::TrainBatch, learning_rate: f64) -> anyhow::Result<f64>;
    /// Forward and loss only.
    fn valid_batch(&mut self, batch: Self::ValidBatch) -> anyhow::Result<f64>;

    fn save_checkpoint(&self, path: &Path) -> anyhow::Result<()>;
}

/// Models producing per-pixel logits `[N, classes, H, W]`.
pub trait SegmentationModel<B: Backend>: Module<B> {
    fn forward_logits(&self, images: Tensor<B, 4>) -> Tensor<B, 4>;
}

impl<B: Backend> SegmentationModel<B> for UNet<B> {
    fn forward_logits(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward(images)
    }
}

/// Mean cross-entropy over every pixel. `masks` is `[N, 1, H, W]`; the
/// singleton channel is dropped before flattening.
///
/// Mask values outside `0..classes` are an error.
pub fn pixel_cross_entropy<B: Backend>(
    logits: Tensor<B, 4>,
    masks: Tensor<B, 4, Int>,
) -> anyhow::Result<Tensor<B, 1>> {
    let [n, classes, h, w] = logits.dims();
    let lowest: i64 = masks.clone().min().into_scalar().elem();
    let highest: i64 = masks.clone().max().into_scalar().elem();
    if lowest < 0 || highest >= classes as i64 {
        bail!(
            "mask class index out of range: found {lowest}..={highest}, model predicts {classes} classes \
             (binary 0/255 masks need mask_encoding = {{ kind = \"binary\", threshold = 127 }})"
        );
    }
    let targets: Tensor<B, 3, Int> = masks.squeeze(1);
    let logits = logits.permute([0, 2, 3, 1]).reshape([n * h * w, classes]);
    let targets = targets.reshape([n * h * w]);
    Ok(CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, targets))
}

/// Burn implementation of [`SegmentationLearner`]: training batches run on the
/// autodiff backend, validation batches on its inner backend via `valid()`.
pub struct BurnLearner<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    model: M,
    optim: O,
    valid_model: Option<M::InnerModule>,
    _backend: std::marker::PhantomData<B>,
}

impl<B, M, O> BurnLearner<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + SegmentationModel<B>,
    M::InnerModule: SegmentationModel<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    pub fn new(model: M, optim: O) -> Self {
        Self {
            model,
            optim,
            valid_model: None,
            _backend: std::marker::PhantomData,
        }
    }
}

impl<B, M, O> SegmentationLearner for BurnLearner<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + SegmentationModel<B>,
    M::InnerModule: SegmentationModel<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    type TrainBatch = SegBatch<B>;
    type ValidBatch = SegBatch<B::InnerBackend>;

    fn begin_train(&mut self) {
        self.valid_model = None;
    }

    fn begin_valid(&mut self) {
        self.valid_model = Some(self.model.valid());
    }

    fn train_batch(&mut self, batch: SegBatch<B>, learning_rate: f64) -> anyhow::Result<f64> {
        let logits = self.model.forward_logits(batch.images);
        let loss = pixel_cross_entropy(logits, batch.masks)?;
        let value: f64 = loss.clone().into_scalar().elem();
        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self.optim.step(learning_rate, self.model.clone(), grads);
        Ok(value)
    }

    fn valid_batch(&mut self, batch: SegBatch<B::InnerBackend>) -> anyhow::Result<f64> {
        let model = self.valid_model.get_or_insert_with(|| self.model.valid());
        let logits = model.forward_logits(batch.images);
        let loss = pixel_cross_entropy(logits, batch.masks)?;
        Ok(loss.into_scalar().elem())
    }

    fn save_checkpoint(&self, path: &Path) -> anyhow::Result<()> {
        save_checkpoint::<B, M>(&self.model, path)
    }
}
