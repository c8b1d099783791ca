//! Dataset layout checks, image/mask preprocessing, and Burn-compatible batch
//! loading for segmentation training.
//!
//! This crate provides:
//! - Dataset root validation (`train`/`test`/`eval` with `images`/`masks`)
//! - Image/mask pairing inside a split
//! - A named preprocessing pipeline with an ImageNet preset
//! - A restartable, optionally shuffled batch loader

pub mod aug;
pub mod batch;
pub mod index;
pub mod types;
pub mod validation;

pub use aug::{load_sample, Preprocess, SampleTransform, IMAGENET_MEAN, IMAGENET_STD};
pub use batch::{build_loader, BatchIter, SegBatch, SegLoader};
pub use index::{index_split, unzip_pairs};
pub use types::*;
pub use validation::{
    is_valid_dataset_root, validate_dataset_root, DatasetLayout, LayoutError, SplitDir,
};
