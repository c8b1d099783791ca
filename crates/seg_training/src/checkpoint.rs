//! Checkpoint naming and (de)serialization of model records.

use anyhow::Context;
use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use std::fs;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_PREFIX: &str = "unet_model";
pub const CHECKPOINT_EXTENSION: &str = "pth";

/// `<dir>/unet_model_epoch_<epoch>.pth`, with `epoch` 1-based.
pub fn checkpoint_path(dir: &Path, epoch: usize) -> PathBuf {
    dir.join(format!(
        "{CHECKPOINT_PREFIX}_epoch_{epoch}.{CHECKPOINT_EXTENSION}"
    ))
}

/// Write the full-precision parameter record of `model` to `path`.
///
/// Plain write, no temp file + rename: a crash mid-write leaves a truncated file.
pub fn save_checkpoint<B: Backend, M: Module<B>>(model: &M, path: &Path) -> anyhow::Result<()> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let bytes = Recorder::<B>::record(&recorder, model.clone().into_record(), ())
        .map_err(|e| anyhow::anyhow!("failed to serialize checkpoint: {e}"))?;
    fs::write(path, bytes)
        .with_context(|| format!("failed to write checkpoint {}", path.display()))?;
    Ok(())
}

/// Load a record written by [`save_checkpoint`] into `model`.
pub fn load_checkpoint<B: Backend, M: Module<B>>(
    model: M,
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<M> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read checkpoint {}", path.display()))?;
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let record: M::Record = Recorder::<B>::load(&recorder, bytes, device)
        .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", path.display()))?;
    Ok(model.load_record(record))
}
