//! End-to-end dataset workflows: layout check → split indexing → batch loading.

use burn::tensor::backend::Backend;
use image::{GrayImage, Luma, Rgb, RgbImage};
use seg_dataset::{
    build_loader, index_split, is_valid_dataset_root, unzip_pairs, validate_dataset_root,
    LayoutError, MaskEncoding, Preprocess, SampleTransform, SegDatasetError,
};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type TestBackend = burn_ndarray::NdArray<f32>;

/// Create `<root>/<split>/{images,masks}` with `count` 8x8 samples.
fn create_split(root: &Path, split: &str, count: usize) -> anyhow::Result<()> {
    let images = root.join(split).join("images");
    let masks = root.join(split).join("masks");
    fs::create_dir_all(&images)?;
    fs::create_dir_all(&masks)?;
    for i in 0..count {
        let img = RgbImage::from_pixel(8, 8, Rgb([(i * 20) as u8, 128, 200]));
        img.save(images.join(format!("sample_{i:03}.png")))?;
        let mut mask = GrayImage::new(8, 8);
        for (x, _y, p) in mask.enumerate_pixels_mut() {
            *p = Luma([if x < 4 { 0 } else { 1 }]);
        }
        mask.save(masks.join(format!("sample_{i:03}.png")))?;
    }
    Ok(())
}

fn create_root(root: &Path) -> anyhow::Result<()> {
    create_split(root, "train", 5)?;
    create_split(root, "test", 2)?;
    create_split(root, "eval", 1)?;
    Ok(())
}

fn small_preprocess() -> Arc<dyn SampleTransform> {
    Arc::new(Preprocess::imagenet().with_resize(Some((8, 8))))
}

#[test]
fn complete_root_is_valid() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_root(tmp.path())?;
    assert!(is_valid_dataset_root(tmp.path()));
    let layout = validate_dataset_root(tmp.path())?;
    assert_eq!(layout.train.root, tmp.path().join("train"));
    Ok(())
}

#[test]
fn missing_split_is_not_valid() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_split(tmp.path(), "train", 1)?;
    create_split(tmp.path(), "test", 1)?;
    assert!(!is_valid_dataset_root(tmp.path()));
    assert!(matches!(
        validate_dataset_root(tmp.path()),
        Err(LayoutError::MissingSplit { split: "eval", .. })
    ));
    Ok(())
}

#[test]
fn extra_child_without_masks_is_not_valid() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_root(tmp.path())?;
    fs::create_dir_all(tmp.path().join("extra").join("images"))?;
    assert!(!is_valid_dataset_root(tmp.path()));
    match validate_dataset_root(tmp.path()) {
        Err(LayoutError::MissingPairing { entry, missing }) => {
            assert!(entry.ends_with("extra"));
            assert_eq!(missing, "masks");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[test]
fn split_missing_images_is_not_valid() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_root(tmp.path())?;
    fs::remove_dir_all(tmp.path().join("test").join("images"))?;
    assert!(!is_valid_dataset_root(tmp.path()));
    Ok(())
}

#[test]
fn nonexistent_root_is_not_valid() {
    let missing = PathBuf::from("/definitely/not/a/dataset/root");
    assert!(!is_valid_dataset_root(&missing));
    assert!(matches!(
        validate_dataset_root(&missing),
        Err(LayoutError::MissingRoot { .. })
    ));
}

#[test]
fn index_pairs_by_stem() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_root(tmp.path())?;
    let layout = validate_dataset_root(tmp.path())?;
    let pairs = index_split(&layout.train)?;
    assert_eq!(pairs.len(), 5);
    for pair in &pairs {
        assert_eq!(pair.image.file_stem(), pair.mask.file_stem());
    }
    Ok(())
}

#[test]
fn index_reports_image_without_mask() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_root(tmp.path())?;
    fs::remove_file(tmp.path().join("train/masks/sample_002.png"))?;
    let layout = validate_dataset_root(tmp.path())?;
    assert!(matches!(
        index_split(&layout.train),
        Err(SegDatasetError::MissingMask { .. })
    ));
    Ok(())
}

#[test]
fn loader_yields_ceil_n_over_b_batches() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_root(tmp.path())?;
    let layout = validate_dataset_root(tmp.path())?;
    let (images, masks) = unzip_pairs(index_split(&layout.train)?);
    let device = <TestBackend as Backend>::Device::default();
    let loader =
        build_loader::<TestBackend>(images, masks, 2, false, Some(small_preprocess()), &device);
    assert_eq!(loader.num_batches(), 3);

    let sizes: Vec<usize> = loader
        .iter()
        .map(|b| b.map(|b| b.len()))
        .collect::<Result<_, _>>()?;
    assert_eq!(sizes, vec![2, 2, 1]);

    // Restartable: a second pass sees the same number of batches.
    assert_eq!(loader.iter().count(), 3);
    Ok(())
}

#[test]
fn loader_batch_shapes_and_mask_values() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_root(tmp.path())?;
    let layout = validate_dataset_root(tmp.path())?;
    let (images, masks) = unzip_pairs(index_split(&layout.test)?);
    let device = <TestBackend as Backend>::Device::default();
    let loader =
        build_loader::<TestBackend>(images, masks, 4, true, Some(small_preprocess()), &device);
    let batch = loader.iter().next().expect("one batch")?;
    assert_eq!(batch.images.dims(), [2, 3, 8, 8]);
    assert_eq!(batch.masks.dims(), [2, 1, 8, 8]);
    let classes: Vec<i64> = batch.masks.into_data().convert::<i64>().to_vec::<i64>().unwrap();
    assert!(classes.iter().all(|c| *c == 0 || *c == 1));
    Ok(())
}

#[test]
fn default_transform_resizes_to_224() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_root(tmp.path())?;
    let layout = validate_dataset_root(tmp.path())?;
    let (images, masks) = unzip_pairs(index_split(&layout.eval)?);
    let device = <TestBackend as Backend>::Device::default();
    let loader = build_loader::<TestBackend>(images, masks, 1, true, None, &device);
    let batch = loader.iter().next().expect("one batch")?;
    assert_eq!(batch.images.dims(), [1, 3, 224, 224]);
    assert_eq!(batch.masks.dims(), [1, 1, 224, 224]);
    Ok(())
}

#[test]
fn seeded_shuffle_visits_each_sample_once() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_root(tmp.path())?;
    let layout = validate_dataset_root(tmp.path())?;
    let (images, masks) = unzip_pairs(index_split(&layout.train)?);
    let device = <TestBackend as Backend>::Device::default();
    let loader =
        build_loader::<TestBackend>(images, masks, 2, true, Some(small_preprocess()), &device)
            .with_seed(7);

    // Each sample image has a distinct red channel, so the first pixel identifies it.
    let mut seen = HashSet::new();
    for batch in loader.iter() {
        let batch = batch?;
        let n = batch.len();
        let red: Vec<f32> = batch
            .images
            .slice([0..n, 0..1, 0..1, 0..1])
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        for v in red {
            assert!(seen.insert((v * 1000.0).round() as i64));
        }
    }
    assert_eq!(seen.len(), 5);
    Ok(())
}

#[test]
fn mismatched_lengths_fail_on_first_use() {
    let device = <TestBackend as Backend>::Device::default();
    let loader = build_loader::<TestBackend>(
        vec![PathBuf::from("a.png"), PathBuf::from("b.png")],
        vec![PathBuf::from("a_mask.png")],
        1,
        false,
        None,
        &device,
    );
    let mut iter = loader.iter();
    assert!(matches!(
        iter.next(),
        Some(Err(SegDatasetError::LengthMismatch { images: 2, masks: 1 }))
    ));
    assert!(iter.next().is_none());
}

#[test]
fn unreadable_paths_fail_at_iteration_not_construction() {
    let device = <TestBackend as Backend>::Device::default();
    let loader = build_loader::<TestBackend>(
        vec![PathBuf::from("/missing/image.png")],
        vec![PathBuf::from("/missing/mask.png")],
        1,
        false,
        None,
        &device,
    );
    assert_eq!(loader.num_batches(), 1);
    assert!(matches!(
        loader.iter().next(),
        Some(Err(SegDatasetError::Image { .. }))
    ));
}

#[test]
fn binary_mask_encoding_thresholds_values() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let img_path = tmp.path().join("img.png");
    let mask_path = tmp.path().join("mask.png");
    RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])).save(&img_path)?;
    GrayImage::from_pixel(4, 4, Luma([255])).save(&mask_path)?;
    let device = <TestBackend as Backend>::Device::default();
    let transform: Arc<dyn SampleTransform> = Arc::new(
        Preprocess::imagenet()
            .with_resize(None)
            .with_mask_encoding(MaskEncoding::Binary { threshold: 127 }),
    );
    let loader = build_loader::<TestBackend>(
        vec![img_path],
        vec![mask_path],
        1,
        false,
        Some(transform),
        &device,
    );
    let batch = loader.iter().next().expect("one batch")?;
    let classes: Vec<i64> = batch.masks.into_data().convert::<i64>().to_vec::<i64>().unwrap();
    assert_eq!(classes, vec![1; 16]);
    Ok(())
}

/// First red value of every sample, in the order one pass yields them.
fn pass_order(loader: &seg_dataset::SegLoader<TestBackend>) -> anyhow::Result<Vec<i64>> {
    let mut order = Vec::new();
    for batch in loader.iter() {
        let batch = batch?;
        let n = batch.len();
        let red: Vec<f32> = batch
            .images
            .slice([0..n, 0..1, 0..1, 0..1])
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        order.extend(red.into_iter().map(|v| (v * 1000.0).round() as i64));
    }
    Ok(order)
}

#[test]
fn same_seed_gives_same_order_and_passes_reshuffle() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_root(tmp.path())?;
    let layout = validate_dataset_root(tmp.path())?;
    let device = <TestBackend as Backend>::Device::default();
    let seeded = || -> anyhow::Result<_> {
        let (images, masks) = unzip_pairs(index_split(&layout.train)?);
        Ok(
            build_loader::<TestBackend>(images, masks, 2, true, Some(small_preprocess()), &device)
                .with_seed(11),
        )
    };
    let a = seeded()?;
    let b = seeded()?;

    let a_passes: Vec<Vec<i64>> = (0..5).map(|_| pass_order(&a)).collect::<Result<_, _>>()?;
    let b_passes: Vec<Vec<i64>> = (0..5).map(|_| pass_order(&b)).collect::<Result<_, _>>()?;
    assert_eq!(a_passes, b_passes);
    assert!(
        a_passes[1..].iter().any(|p| p != &a_passes[0]),
        "every pass came back in the same order"
    );
    Ok(())
}

#[test]
fn differently_sized_samples_in_one_batch_fail() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut images = Vec::new();
    let mut masks = Vec::new();
    for (i, size) in [4u32, 8].into_iter().enumerate() {
        let img = tmp.path().join(format!("img_{i}.png"));
        let mask = tmp.path().join(format!("mask_{i}.png"));
        RgbImage::from_pixel(size, size, Rgb([50, 50, 50])).save(&img)?;
        GrayImage::from_pixel(size, size, Luma([0])).save(&mask)?;
        images.push(img);
        masks.push(mask);
    }
    let device = <TestBackend as Backend>::Device::default();
    let transform: Arc<dyn SampleTransform> = Arc::new(Preprocess::imagenet().with_resize(None));
    let loader = build_loader::<TestBackend>(images, masks, 2, false, Some(transform), &device);
    match loader.iter().next() {
        Some(Err(SegDatasetError::SizeMismatch {
            expected, actual, ..
        })) => {
            assert_eq!(expected, (4, 4));
            assert_eq!(actual, (8, 8));
        }
        other => panic!("unexpected result: {:?}", other.map(|r| r.map(|b| b.len()))),
    }
    Ok(())
}
