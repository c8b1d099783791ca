//! Sample preprocessing: resize, tensor conversion, per-channel normalization.

use crate::types::{DatasetResult, MaskEncoding, SamplePair, SegDatasetError, SegSample};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
pub const DEFAULT_IMAGE_SIZE: (u32, u32) = (224, 224);

/// Turns a decoded image/mask pair into a [`SegSample`].
///
/// Implement this to replace the whole preprocessing pipeline; the loader only
/// requires that the returned image and mask share one spatial size.
pub trait SampleTransform: Debug + Send + Sync {
    fn apply(&self, image: DynamicImage, mask: DynamicImage) -> DatasetResult<SegSample>;

    fn describe(&self) -> String {
        format!("{self:?}")
    }
}

/// Named preprocessing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preprocess {
    /// Resize images and masks to this (width, height). If None, each mask is
    /// brought to its image's size and samples must already agree in size.
    pub resize: Option<(u32, u32)>,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub mask_encoding: MaskEncoding,
}

impl Default for Preprocess {
    fn default() -> Self {
        Self::imagenet()
    }
}

impl Preprocess {
    /// 224x224 resize with ImageNet channel statistics.
    pub fn imagenet() -> Self {
        Self {
            resize: Some(DEFAULT_IMAGE_SIZE),
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            mask_encoding: MaskEncoding::ClassIndex,
        }
    }

    pub fn with_resize(mut self, resize: Option<(u32, u32)>) -> Self {
        self.resize = resize;
        self
    }

    pub fn with_mask_encoding(mut self, encoding: MaskEncoding) -> Self {
        self.mask_encoding = encoding;
        self
    }

    fn normalize_chw(&self, img: &RgbImage) -> Vec<f32> {
        let (width, height) = img.dimensions();
        let mut out = Vec::with_capacity(3 * (width * height) as usize);
        for c in 0..3 {
            let mean = self.mean[c];
            let std = self.std[c];
            for y in 0..height {
                for x in 0..width {
                    let v = img.get_pixel(x, y)[c] as f32 / 255.0;
                    out.push((v - mean) / std);
                }
            }
        }
        out
    }

    fn encode_mask(&self, mask: &GrayImage) -> Vec<i64> {
        mask.as_raw()
            .iter()
            .map(|v| self.mask_encoding.class_of(*v))
            .collect()
    }
}

impl SampleTransform for Preprocess {
    fn apply(&self, image: DynamicImage, mask: DynamicImage) -> DatasetResult<SegSample> {
        let rgb = image.to_rgb8();
        let luma = mask.to_luma8();
        let (width, height) = self.resize.unwrap_or_else(|| rgb.dimensions());
        if width == 0 || height == 0 {
            return Err(SegDatasetError::Other(format!(
                "cannot resize to {width}x{height}"
            )));
        }

        let rgb = if rgb.dimensions() == (width, height) {
            rgb
        } else {
            image::imageops::resize(&rgb, width, height, FilterType::Triangle)
        };
        // Masks hold class indices; interpolating them would invent classes.
        let luma = if luma.dimensions() == (width, height) {
            luma
        } else {
            image::imageops::resize(&luma, width, height, FilterType::Nearest)
        };

        Ok(SegSample {
            image_chw: self.normalize_chw(&rgb),
            channels: 3,
            width,
            height,
            mask_hw: self.encode_mask(&luma),
        })
    }

    fn describe(&self) -> String {
        let size = self
            .resize
            .map(|(w, h)| format!("{w}x{h}"))
            .unwrap_or_else(|| "none".to_string());
        format!(
            "resize={} mean={:?} std={:?} mask={:?}",
            size, self.mean, self.std, self.mask_encoding
        )
    }
}

/// Decode one pair from disk and run it through `transform`.
pub fn load_sample(pair: &SamplePair, transform: &dyn SampleTransform) -> DatasetResult<SegSample> {
    let image = image::open(&pair.image).map_err(|e| SegDatasetError::Image {
        path: pair.image.clone(),
        source: e,
    })?;
    let mask = image::open(&pair.mask).map_err(|e| SegDatasetError::Image {
        path: pair.mask.clone(),
        source: e,
    })?;
    let sample = transform.apply(image, mask)?;
    let pixels = (sample.width * sample.height) as usize;
    if sample.mask_hw.len() != pixels || sample.image_chw.len() != sample.channels * pixels {
        return Err(SegDatasetError::Other(format!(
            "transform produced mismatched buffers for {}",
            pair.image.display()
        )));
    }
    Ok(sample)
}
