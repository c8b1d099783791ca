//! Core types and error definitions for seg_dataset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, SegDatasetError>;

#[derive(Debug, Error)]
pub enum SegDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{images} image paths but {masks} mask paths")]
    LengthMismatch { images: usize, masks: usize },
    #[error("sample {path} is {actual:?}, expected {expected:?} (set a resize target to force consistency)")]
    SizeMismatch {
        path: PathBuf,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("no mask found for image {image}")]
    MissingMask { image: PathBuf },
    #[error("{0}")]
    Other(String),
}

/// One decoded image/mask pair, ready to be stacked into a batch.
#[derive(Debug, Clone)]
pub struct SegSample {
    /// Image in CHW layout, already normalized.
    pub image_chw: Vec<f32>,
    pub channels: usize,
    pub width: u32,
    pub height: u32,
    /// Per-pixel class indices in HW layout.
    pub mask_hw: Vec<i64>,
}

/// An (image, mask) path association. Pairing is positional; nothing here
/// checks that either file exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePair {
    pub image: PathBuf,
    pub mask: PathBuf,
}

/// How mask pixel values become class indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MaskEncoding {
    /// The luma value is the class index.
    #[default]
    ClassIndex,
    /// `value > threshold` is class 1, everything else class 0.
    Binary { threshold: u8 },
}

impl MaskEncoding {
    pub fn class_of(&self, value: u8) -> i64 {
        match self {
            MaskEncoding::ClassIndex => value as i64,
            MaskEncoding::Binary { threshold } => (value > *threshold) as i64,
        }
    }
}
