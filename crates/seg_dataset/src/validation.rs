//! Dataset root layout checks.
//!
//! A usable root holds `train`, `test` and `eval` split directories, and every
//! entry directly under the root (not only the three splits) carries both an
//! `images` and a `masks` subdirectory.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SPLIT_NAMES: [&str; 3] = ["train", "test", "eval"];
pub const IMAGES_SUBDIR: &str = "images";
pub const MASKS_SUBDIR: &str = "masks";

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("the '{}' folder does not exist", .root.display())]
    MissingRoot { root: PathBuf },
    #[error("split folder '{split}' is missing under {}", .root.display())]
    MissingSplit { root: PathBuf, split: &'static str },
    #[error("{} has no '{missing}' subfolder", .entry.display())]
    MissingPairing {
        entry: PathBuf,
        missing: &'static str,
    },
    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A split directory with its paired `images`/`masks` folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDir {
    pub name: String,
    pub root: PathBuf,
}

impl SplitDir {
    fn new(dataset_root: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            root: dataset_root.join(name),
        }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_SUBDIR)
    }

    pub fn masks_dir(&self) -> PathBuf {
        self.root.join(MASKS_SUBDIR)
    }
}

/// Result of a successful layout check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    pub root: PathBuf,
    pub train: SplitDir,
    pub test: SplitDir,
    pub eval: SplitDir,
}

pub fn validate_dataset_root(root: &Path) -> Result<DatasetLayout, LayoutError> {
    if !root.exists() {
        return Err(LayoutError::MissingRoot {
            root: root.to_path_buf(),
        });
    }
    for split in SPLIT_NAMES {
        if !root.join(split).is_dir() {
            return Err(LayoutError::MissingSplit {
                root: root.to_path_buf(),
                split,
            });
        }
    }

    let layout = DatasetLayout {
        root: root.to_path_buf(),
        train: SplitDir::new(root, "train"),
        test: SplitDir::new(root, "test"),
        eval: SplitDir::new(root, "eval"),
    };
    tracing::debug!(
        train = %layout.train.root.display(),
        test = %layout.test.root.display(),
        eval = %layout.eval.root.display(),
        "found split folders"
    );

    let entries = fs::read_dir(root).map_err(|e| LayoutError::Io {
        path: root.to_path_buf(),
        source: e,
    })?;
    let mut children = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| LayoutError::Io {
            path: root.to_path_buf(),
            source: e,
        })?;
        children.push(entry.path());
    }
    // read_dir order is platform dependent; sort so the reported entry is stable.
    children.sort();

    for child in children {
        if !child.join(MASKS_SUBDIR).is_dir() {
            return Err(LayoutError::MissingPairing {
                entry: child,
                missing: MASKS_SUBDIR,
            });
        }
        if !child.join(IMAGES_SUBDIR).is_dir() {
            return Err(LayoutError::MissingPairing {
                entry: child,
                missing: IMAGES_SUBDIR,
            });
        }
    }

    Ok(layout)
}

/// Boolean form of [`validate_dataset_root`]: every failure is logged and
/// reported as `false`.
pub fn is_valid_dataset_root(root: &Path) -> bool {
    match validate_dataset_root(root) {
        Ok(layout) => {
            tracing::info!(root = %layout.root.display(), "dataset layout ok");
            true
        }
        Err(LayoutError::Io { path, source }) => {
            tracing::error!(path = %path.display(), "an error occurred: {source}");
            false
        }
        Err(e) => {
            tracing::warn!("{e}");
            false
        }
    }
}
