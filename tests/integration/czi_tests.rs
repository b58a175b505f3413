//! End-to-end tests for CZI containers.

use volume_stack::error::ErrorKind;
use volume_stack::format::czi::CziVolume;
use volume_stack::{assemble_volume, PlaneSource};

use super::test_utils::{
    czi_xml, gradient, gradient_value, CziBlock, CziBuilder, TrackingReader, CZI_GRAY8,
    CZI_UNCOMPRESSED, CZI_ZSTD0,
};

/// Sub-block seed for `(z, c, t, s)`.
fn seed(z: i32, c: i32, t: i32, s: i32) -> u16 {
    (s * 100 + t * 20 + c * 10 + z) as u16
}

/// Z x C x T gray16 blocks of 3x2 pixels, with optional extra coordinates.
fn stack(size_z: i32, size_c: i32, size_t: i32, extra: &[(char, i32)]) -> Vec<CziBlock> {
    let scene = extra
        .iter()
        .find(|(name, _)| *name == 'S')
        .map_or(0, |&(_, s)| s);
    let mut blocks = Vec::new();
    for t in 0..size_t {
        for c in 0..size_c {
            for z in 0..size_z {
                let mut dims = vec![('Z', z), ('C', c), ('T', t)];
                dims.extend_from_slice(extra);
                blocks.push(CziBlock::gray16(&dims, gradient(seed(z, c, t, scene), 3, 2)));
            }
        }
    }
    blocks
}

fn builder(blocks: Vec<CziBlock>) -> CziBuilder {
    blocks.into_iter().fold(
        CziBuilder::new(3, 2, czi_xml(&["DAPI", "Actin"], "2E-06")),
        CziBuilder::block,
    )
}

#[tokio::test]
async fn test_zstd_timeseries() {
    let blocks = stack(4, 2, 3, &[])
        .into_iter()
        .map(|mut b| {
            b.compression = CZI_ZSTD0;
            b
        })
        .collect();
    let reader = TrackingReader::new(builder(blocks).build(), "timeseries.czi");
    let volume = CziVolume::open(reader, 0).await.unwrap();

    let dims = volume.dimensions();
    assert_eq!((dims.size_x, dims.size_y), (3, 2));
    assert_eq!((dims.size_z, dims.size_c, dims.size_t), (4, 2, 3));
    assert_eq!(dims.bits_per_pixel, 16);
    assert_eq!(dims.channel_names, vec!["DAPI", "Actin"]);
    assert!((dims.physical_size_x - 0.15).abs() < 1e-9);
    assert!((dims.physical_size_z - 2.0).abs() < 1e-9);
    assert_eq!(volume.subblock_count(), 24);

    let image = assemble_volume(&volume, 2, 0).await.unwrap();
    for c in 0..2 {
        for z in 0..4 {
            assert_eq!(
                image.sample(2, 1, z as u32, c as u32),
                Some(gradient_value(seed(z, c, 2, 0), 3, 2, 1))
            );
        }
    }
}

#[tokio::test]
async fn test_gray8_upconverted() {
    let blocks: Vec<CziBlock> = (0..2)
        .map(|z| CziBlock {
            pixel_type: CZI_GRAY8,
            compression: CZI_UNCOMPRESSED,
            dims: vec![('Z', z), ('C', 0)],
            samples: vec![250 + z as u16; 6],
        })
        .collect();
    let xml = czi_xml(&["Brightfield"], "1E-06");
    let data = blocks
        .into_iter()
        .fold(CziBuilder::new(3, 2, xml), CziBuilder::block)
        .build();
    let volume = CziVolume::open(TrackingReader::new(data, "gray8.czi"), 0)
        .await
        .unwrap();
    assert_eq!(volume.dimensions().bits_per_pixel, 8);

    let image = assemble_volume(&volume, 0, 0).await.unwrap();
    assert_eq!(image.channel_range(0), Some((250, 251)));
}

#[tokio::test]
async fn test_mosaic_rejected_without_plane_reads() {
    // Any M index above zero is a mosaic
    let mut blocks = stack(2, 1, 1, &[('M', 0)]);
    blocks[1].dims.retain(|(name, _)| *name != 'M');
    blocks[1].dims.push(('M', 1));
    let (data, ranges) = builder(blocks).build_with_ranges();

    let reader = TrackingReader::new(data, "mosaic.czi");
    let err = CziVolume::open(reader.clone(), 0).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
    for (start, end) in ranges {
        assert!(!reader.touched(start, end).await);
    }
}

#[tokio::test]
async fn test_time_out_of_range_reads_no_subblocks() {
    let (data, ranges) = builder(stack(2, 2, 3, &[])).build_with_ranges();
    let reader = TrackingReader::new(data, "frames.czi");
    let volume = CziVolume::open(reader.clone(), 0).await.unwrap();

    let err = assemble_volume(&volume, 5, 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BoundsViolation);
    for (start, end) in ranges {
        assert!(!reader.touched(start, end).await);
    }
}

#[tokio::test]
async fn test_scene_selection() {
    let mut blocks = stack(2, 2, 1, &[('S', 0)]);
    blocks.extend(stack(2, 2, 1, &[('S', 1)]));
    let data = builder(blocks).build();

    let volume = CziVolume::open(TrackingReader::new(data.clone(), "scenes.czi"), 1)
        .await
        .unwrap();
    assert!(volume.supports_scenes());
    let image = assemble_volume(&volume, 0, 1).await.unwrap();
    assert_eq!(
        image.sample(0, 0, 1, 1),
        Some(gradient_value(seed(1, 1, 0, 1), 3, 0, 0))
    );

    let err = CziVolume::open(TrackingReader::new(data, "scenes.czi"), 2)
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::BoundsViolation);
}

#[tokio::test]
async fn test_missing_channel_metadata() {
    let xml = "<ImageDocument><Metadata><Information/></Metadata></ImageDocument>";
    let data = stack(1, 1, 1, &[])
        .into_iter()
        .fold(CziBuilder::new(3, 2, xml), CziBuilder::block)
        .build();
    let err = CziVolume::open(TrackingReader::new(data, "bare.czi"), 0)
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::MetadataMalformed);
}
