//! Pairing image files with their masks inside a split directory.

use crate::types::{DatasetResult, SamplePair, SegDatasetError};
use crate::validation::SplitDir;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

fn files_by_stem(dir: &Path) -> DatasetResult<BTreeMap<String, PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| SegDatasetError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut out = BTreeMap::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !is_image_file(&path) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        out.insert(stem.to_string(), path);
    }
    Ok(out)
}

/// Index `<split>/images` against `<split>/masks`, matching files by stem
/// (`0001.jpg` pairs with `0001.png`). Pairs come back sorted by stem.
/// Masks without an image are ignored; an image without a mask is an error.
pub fn index_split(split: &SplitDir) -> DatasetResult<Vec<SamplePair>> {
    let images = files_by_stem(&split.images_dir())?;
    let masks = files_by_stem(&split.masks_dir())?;
    let mut pairs = Vec::with_capacity(images.len());
    for (stem, image) in images {
        let Some(mask) = masks.get(&stem) else {
            return Err(SegDatasetError::MissingMask { image });
        };
        pairs.push(SamplePair {
            image,
            mask: mask.clone(),
        });
    }
    tracing::debug!(split = %split.name, samples = pairs.len(), "indexed split");
    Ok(pairs)
}

/// Split pairs into the parallel path lists the loader takes.
pub fn unzip_pairs(pairs: Vec<SamplePair>) -> (Vec<PathBuf>, Vec<PathBuf>) {
    pairs.into_iter().map(|p| (p.image, p.mask)).unzip()
}
