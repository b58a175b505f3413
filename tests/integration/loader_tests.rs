//! Tests for the load entry points against files on disk.

use std::sync::Arc;

use volume_stack::error::ErrorKind;
use volume_stack::{
    ArrayVolume, FormatRegistry, ImageCache, LoadRequest, LoaderOptions, VolumeDimensions,
    VolumeError, VolumeFormat, VolumeLoader,
};

use super::test_utils::{
    czi_xml, gradient, gradient_value, write_temp, CziBlock, CziBuilder, TiffStackBuilder,
};

fn imagej_stack() -> Vec<u8> {
    let mut builder = TiffStackBuilder::new(4, 4)
        .description("ImageJ=1.53t\nimages=8\nchannels=2\nslices=2\nframes=2\nspacing=2.0\n");
    for i in 0..8 {
        builder = builder.plane(gradient(i, 4, 4));
    }
    builder.build()
}

fn two_scene_czi() -> Vec<u8> {
    let mut builder = CziBuilder::new(2, 2, czi_xml(&["A"], "1E-06"));
    for s in 0..2 {
        for z in 0..3 {
            let dims = [('Z', z), ('C', 0), ('S', s)];
            builder = builder.block(CziBlock::gray16(&dims, vec![(s * 10 + z) as u16; 4]));
        }
    }
    builder.build()
}

fn loader() -> (VolumeLoader, Arc<ImageCache>) {
    let cache = Arc::new(ImageCache::new());
    (VolumeLoader::new(cache.clone()), cache)
}

#[tokio::test]
async fn test_load_tiff_timepoint() {
    let file = write_temp(&imagej_stack(), ".tif");
    let (loader, cache) = loader();

    let request = LoadRequest::new(file.path()).time(1);
    let image = loader.load_from_file(&request).await.unwrap();
    assert_eq!((image.size_x(), image.size_y()), (4, 4));
    assert_eq!((image.size_z(), image.size_c()), (2, 2));
    assert_eq!(image.physical_size(), [2.0, 2.0, 2.0]);
    // XYCZT: (z=1, c=0, t=1) is plane 0 + 1*2 + 1*4
    assert_eq!(image.sample(1, 2, 1, 0), Some(gradient_value(6, 4, 1, 2)));
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_cached_load_is_shared() {
    let file = write_temp(&imagej_stack(), ".tif");
    let (loader, cache) = loader();

    let first = loader.load_from_file_4d(file.path()).await.unwrap();
    let second = loader.load_from_file_4d(file.path()).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len().await, 1);

    // Cached by path only: another timepoint returns the cached image
    let request = LoadRequest::new(file.path()).time(1);
    let third = loader.load_from_file(&request).await.unwrap();
    assert!(Arc::ptr_eq(&first, &third));

    assert!(cache.invalidate(&request.cache_key()).await);
    let fourth = loader.load_from_file(&request).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &fourth));
}

#[tokio::test]
async fn test_concurrent_cached_loads_share_one_image() {
    let file = write_temp(&imagej_stack(), ".tif");
    let (loader, cache) = loader();
    let loader = Arc::new(loader);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let loader = loader.clone();
        let request = LoadRequest::new(file.path()).cached(true);
        handles.push(tokio::spawn(async move {
            loader.load_from_file(&request).await
        }));
    }

    let mut images = Vec::new();
    for handle in handles {
        images.push(handle.await.unwrap().unwrap());
    }
    assert!(images.iter().all(|image| Arc::ptr_eq(image, &images[0])));
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn test_czi_dimensions_and_scene() {
    let file = write_temp(&two_scene_czi(), ".czi");
    let (loader, _) = loader();

    let dims = loader.load_dimensions(file.path(), 1).await.unwrap();
    assert_eq!((dims.size_x, dims.size_y, dims.size_z), (2, 2, 3));
    assert_eq!(dims.channel_names, vec!["A"]);

    let request = LoadRequest::new(file.path()).scene(1);
    let image = loader.load_from_file(&request).await.unwrap();
    assert_eq!(image.sample(0, 0, 2, 0), Some(12));

    let err = loader
        .load_from_file(&LoadRequest::new(file.path()).scene(2))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BoundsViolation);
}

#[tokio::test]
async fn test_time_out_of_range() {
    let file = write_temp(&imagej_stack(), ".tif");
    let (loader, cache) = loader();

    let request = LoadRequest::new(file.path()).time(5).cached(true);
    let err = loader.load_from_file(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BoundsViolation);
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_dimensions_override() {
    // Four planes read as Z=2, C=2 in XYZCT order instead of the description
    let file = write_temp(&imagej_stack(), ".tiff");
    let (loader, _) = loader();

    let dims = VolumeDimensions {
        size_x: 4,
        size_y: 4,
        size_z: 2,
        size_c: 2,
        size_t: 1,
        dimension_order: "XYZCT".to_string(),
        ..VolumeDimensions::default()
    };
    let request = LoadRequest::new(file.path()).dimensions(dims.clone());
    let image = loader.load_from_file(&request).await.unwrap();
    // (z=0, c=1) is plane 2
    assert_eq!(image.sample(0, 0, 0, 1), Some(gradient_value(2, 4, 0, 0)));

    let mut invalid = dims;
    invalid.physical_size_x = -1.0;
    let err = loader
        .load_from_file(&LoadRequest::new(file.path()).dimensions(invalid))
        .await
        .unwrap_err();
    assert!(matches!(err, VolumeError::InvalidDimensions(_)));
}

#[tokio::test]
async fn test_misnamed_file_read_by_content() {
    let file = write_temp(&two_scene_czi(), ".tif");
    let (loader, _) = loader();

    let dims = loader.load_dimensions(file.path(), 0).await.unwrap();
    assert_eq!(dims.size_z, 3);
}

#[tokio::test]
async fn test_unregistered_extension() {
    let file = write_temp(&imagej_stack(), ".stk");
    let (loader, _) = loader();

    let err = loader.load_from_file_4d(file.path()).await.unwrap_err();
    assert!(matches!(err, VolumeError::UnsupportedFormat { .. }));

    let mut registry = FormatRegistry::default();
    registry.register("stk", VolumeFormat::Tiff);
    let loader = VolumeLoader::with_registry(
        Arc::new(ImageCache::new()),
        registry,
        LoaderOptions {
            block_size: 1024,
            cache_blocks: 4,
        },
    );
    let image = loader.load_from_file_4d(file.path()).await.unwrap();
    assert_eq!(image.size_c(), 2);
}

#[tokio::test]
async fn test_corrupt_file_not_cached() {
    let mut bytes = imagej_stack();
    bytes.truncate(64);
    let file = write_temp(&bytes, ".tif");
    let (loader, cache) = loader();

    let err = loader.load_from_file_4d(file.path()).await.unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::IoFailure | ErrorKind::MetadataMalformed
    ));
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_load_from_array() {
    let (loader, cache) = loader();
    let samples: Vec<u8> = (0..2 * 3 * 2 * 2u16).flat_map(|v| v.to_le_bytes()).collect();
    let volume = ArrayVolume::new("segmentation", samples, vec![2, 3, 2, 2])
        .with_channel_names(vec!["labels".into(), "mask".into()])
        .with_physical_sizes(vec![0.1, 0.1, 0.3]);

    let image = loader.load_from_array(volume, true).await.unwrap();
    assert_eq!((image.size_c(), image.size_z()), (2, 3));
    // c=1, z=2, y=1, x=0 is sample 1*12 + 2*4 + 1*2 + 0
    assert_eq!(image.sample(0, 1, 2, 1), Some(22));
    assert_eq!(cache.keys().await, vec!["segmentation"]);
}
