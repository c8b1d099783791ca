//! Batched, optionally shuffled loading of image/mask pairs into Burn tensors.

use crate::aug::{load_sample, Preprocess, SampleTransform};
use crate::types::{DatasetResult, SamplePair, SegDatasetError, SegSample};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A stacked batch: images `[N, C, H, W]` and class-index masks `[N, 1, H, W]`.
#[derive(Debug, Clone)]
pub struct SegBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub masks: Tensor<B, 4, Int>,
}

impl<B: Backend> SegBatch<B> {
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Restartable loader over positional image/mask path lists.
///
/// Nothing is read at construction; bad paths and mismatched list lengths are
/// reported by the iterator on first use.
pub struct SegLoader<B: Backend> {
    images: Vec<PathBuf>,
    masks: Vec<PathBuf>,
    batch_size: usize,
    shuffle: bool,
    seed: Option<u64>,
    passes: AtomicU64,
    transform: Arc<dyn SampleTransform>,
    device: B::Device,
}

/// Build a loader. Without `transform`, [`Preprocess::imagenet`] is applied.
pub fn build_loader<B: Backend>(
    image_paths: Vec<PathBuf>,
    mask_paths: Vec<PathBuf>,
    batch_size: usize,
    shuffle: bool,
    transform: Option<Arc<dyn SampleTransform>>,
    device: &B::Device,
) -> SegLoader<B> {
    let transform = transform.unwrap_or_else(|| Arc::new(Preprocess::imagenet()));
    SegLoader {
        images: image_paths,
        masks: mask_paths,
        batch_size: batch_size.max(1),
        shuffle,
        seed: None,
        passes: AtomicU64::new(0),
        transform,
        device: device.clone(),
    }
}

impl<B: Backend> SegLoader<B> {
    /// Make shuffling reproducible. Pass `k` uses `seed + k`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of samples (image list length).
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Batches per full pass; the last one may be short.
    pub fn num_batches(&self) -> usize {
        self.images.len().div_ceil(self.batch_size)
    }

    /// Start a new pass. Each call reshuffles when shuffling is enabled.
    pub fn iter(&self) -> BatchIter<'_, B> {
        let pass = self.passes.fetch_add(1, Ordering::Relaxed);
        let mut order: Vec<usize> = (0..self.images.len()).collect();
        if self.shuffle {
            let mut rng = match self.seed {
                Some(seed) => rand::rngs::StdRng::seed_from_u64(seed.wrapping_add(pass)),
                None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
            };
            order.shuffle(&mut rng);
        }
        BatchIter {
            loader: self,
            order,
            cursor: 0,
            checked_lengths: false,
        }
    }

    fn pair(&self, idx: usize) -> SamplePair {
        SamplePair {
            image: self.images[idx].clone(),
            mask: self.masks[idx].clone(),
        }
    }
}

impl<'a, B: Backend> IntoIterator for &'a SegLoader<B> {
    type Item = DatasetResult<SegBatch<B>>;
    type IntoIter = BatchIter<'a, B>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One pass over a [`SegLoader`].
pub struct BatchIter<'a, B: Backend> {
    loader: &'a SegLoader<B>,
    order: Vec<usize>,
    cursor: usize,
    checked_lengths: bool,
}

impl<B: Backend> BatchIter<'_, B> {
    fn next_batch(&mut self) -> DatasetResult<Option<SegBatch<B>>> {
        if !self.checked_lengths {
            self.checked_lengths = true;
            let (images, masks) = (self.loader.images.len(), self.loader.masks.len());
            if images != masks {
                self.cursor = self.order.len();
                return Err(SegDatasetError::LengthMismatch { images, masks });
            }
        }
        if self.cursor >= self.order.len() {
            return Ok(None);
        }
        let end = (self.cursor + self.loader.batch_size).min(self.order.len());
        let pairs: Vec<SamplePair> = self.order[self.cursor..end]
            .iter()
            .map(|&i| self.loader.pair(i))
            .collect();
        self.cursor = end;

        let t_load = Instant::now();
        let transform = self.loader.transform.as_ref();
        let loaded: Vec<DatasetResult<SegSample>> = pairs
            .par_iter()
            .map(|pair| load_sample(pair, transform))
            .collect();
        let load_ms = t_load.elapsed().as_secs_f64() * 1000.0;

        let batch_len = loaded.len();
        let mut images_buf: Vec<f32> = Vec::new();
        let mut masks_buf: Vec<i64> = Vec::new();
        let mut expected: Option<(usize, u32, u32)> = None;
        for (pair, res) in pairs.iter().zip(loaded) {
            let sample = res?;
            let shape = (sample.channels, sample.width, sample.height);
            match expected {
                None => {
                    expected = Some(shape);
                    let pixels = (sample.width * sample.height) as usize;
                    images_buf.reserve(batch_len * sample.channels * pixels);
                    masks_buf.reserve(batch_len * pixels);
                }
                Some(exp) if exp != shape => {
                    return Err(SegDatasetError::SizeMismatch {
                        path: pair.image.clone(),
                        expected: (exp.1, exp.2),
                        actual: (sample.width, sample.height),
                    });
                }
                _ => {}
            }
            images_buf.extend_from_slice(&sample.image_chw);
            masks_buf.extend_from_slice(&sample.mask_hw);
        }

        let Some((channels, width, height)) = expected else {
            return Ok(None);
        };
        let (h, w) = (height as usize, width as usize);
        let device = &self.loader.device;
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(images_buf, [batch_len, channels, h, w]),
            device,
        );
        let masks = Tensor::<B, 4, Int>::from_data(
            TensorData::new(masks_buf, [batch_len, 1, h, w]),
            device,
        );
        tracing::trace!(samples = batch_len, width, height, load_ms, "assembled batch");
        Ok(Some(SegBatch { images, masks }))
    }
}

impl<B: Backend> Iterator for BatchIter<'_, B> {
    type Item = DatasetResult<SegBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .order
            .len()
            .saturating_sub(self.cursor)
            .div_ceil(self.loader.batch_size);
        (0, Some(remaining + usize::from(!self.checked_lengths)))
    }
}
