//! One real epoch of a tiny U-Net on NdArray, then reload the checkpoint.

use burn::backend::Autodiff;
use burn::tensor::Tensor;
use image::{GrayImage, Luma, Rgb, RgbImage};
use seg_models::{UNet, UNetConfig};
use seg_training::config::TrainConfig;
use seg_training::util::{train_unet, write_state, STATE_FILE_NAME};
use seg_training::{checkpoint_path, load_checkpoint, TrainingState};
use std::fs;
use std::path::Path;

type InnerBackend = burn_ndarray::NdArray<f32>;
type ADBackend = Autodiff<InnerBackend>;

fn create_split(root: &Path, split: &str, count: usize) -> anyhow::Result<()> {
    let images = root.join(split).join("images");
    let masks = root.join(split).join("masks");
    fs::create_dir_all(&images)?;
    fs::create_dir_all(&masks)?;
    for i in 0..count {
        let img = RgbImage::from_fn(16, 16, |x, y| {
            Rgb([(x * 16) as u8, (y * 16) as u8, (i * 40) as u8])
        });
        img.save(images.join(format!("frame_{i:02}.png")))?;
        let mask = GrayImage::from_fn(16, 16, |x, _| Luma([u8::from(x >= 8)]));
        mask.save(masks.join(format!("frame_{i:02}.png")))?;
    }
    Ok(())
}

fn tiny_config(root: &Path, checkpoints: &Path) -> TrainConfig {
    let mut cfg = TrainConfig::default();
    cfg.dataset.root = root.to_path_buf();
    cfg.dataset.batch_size = 2;
    cfg.dataset.seed = Some(7);
    cfg.dataset.preprocess = cfg.dataset.preprocess.clone().with_resize(Some((16, 16)));
    cfg.model = UNetConfig {
        in_channels: 3,
        num_classes: 2,
        base_channels: 4,
        depth: 2,
    };
    cfg.training.epochs = 1;
    cfg.training.checkpoint_dir = checkpoints.to_path_buf();
    cfg.training.progress = false;
    cfg
}

#[test]
fn one_epoch_writes_a_loadable_checkpoint() -> anyhow::Result<()> {
    let data = tempfile::tempdir()?;
    create_split(data.path(), "train", 3)?;
    create_split(data.path(), "test", 2)?;
    create_split(data.path(), "eval", 1)?;
    let out = tempfile::tempdir()?;
    let ckpt_dir = out.path().join("ckpt");
    let cfg = tiny_config(data.path(), &ckpt_dir);

    let device = Default::default();
    let state = train_unet::<ADBackend>(&cfg, &device)?;

    assert_eq!(state.epochs_completed, 1);
    let record = &state.history[0];
    assert!(record.train_loss.is_finite() && record.train_loss > 0.0);
    assert!(record.val_loss.is_finite() && record.val_loss > 0.0);

    let path = checkpoint_path(&ckpt_dir, 1);
    assert!(path.is_file());
    assert_eq!(state.best.as_ref().map(|b| b.path.clone()), Some(path.clone()));

    let fresh = UNet::<InnerBackend>::new(&cfg.model, &device);
    let restored = load_checkpoint::<InnerBackend, _>(fresh, &path, &device)?;
    let logits = restored.forward(Tensor::zeros([1, 3, 16, 16], &device));
    assert_eq!(logits.dims(), [1, 2, 16, 16]);

    let state_path = write_state(&state, &ckpt_dir)?;
    assert_eq!(state_path, ckpt_dir.join(STATE_FILE_NAME));
    let reread: TrainingState = serde_json::from_slice(&fs::read(&state_path)?)?;
    assert_eq!(reread.epochs_completed, 1);
    Ok(())
}

#[test]
fn invalid_root_is_rejected_before_training() {
    let data = tempfile::tempdir().unwrap();
    create_split(data.path(), "train", 1).unwrap();
    let out = tempfile::tempdir().unwrap();
    let cfg = tiny_config(data.path(), out.path());
    let device = Default::default();
    let err = train_unet::<ADBackend>(&cfg, &device).unwrap_err();
    assert!(format!("{err:#}").contains("not usable"));
    assert!(fs::read_dir(out.path()).unwrap().next().is_none());
}
