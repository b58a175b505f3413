//! End-to-end tests for TIFF plane stacks: dimension extraction for each
//! description dialect, plane decoding and volume assembly.

use volume_stack::error::ErrorKind;
use volume_stack::format::tiff::{DescriptionDialect, TiffVolume};
use volume_stack::{assemble_volume, PlaneSource, VolumeError};

use super::test_utils::{
    gradient, gradient_value, ome_xml, StripCompression, TiffStackBuilder, TrackingReader,
};

#[tokio::test]
async fn test_imagej_hyperstack() {
    // Channels vary fastest in an ImageJ hyperstack
    let mut builder = TiffStackBuilder::new(2, 2)
        .description("ImageJ=\nchannels=2\nslices=10\nframes=1\nspacing=0.5\n");
    for i in 0..20 {
        builder = builder.constant_plane(i);
    }
    let reader = TrackingReader::new(builder.build(), "hyperstack.tif");
    let volume = TiffVolume::open(reader).await.unwrap();
    assert_eq!(volume.dialect(), DescriptionDialect::ImageJ);

    let dims = volume.dimensions();
    assert_eq!((dims.size_c, dims.size_z, dims.size_t), (2, 10, 1));
    assert_eq!(dims.dimension_order, "XYCZT");
    assert_eq!(dims.physical_size_x, 0.5);
    assert_eq!(dims.physical_size_y, 0.5);
    assert_eq!(dims.physical_size_z, 0.5);
    assert_eq!(dims.channel_names, vec!["0", "1"]);

    let image = assemble_volume(&volume, 0, 0).await.unwrap();
    for c in 0..2 {
        for z in 0..10 {
            assert_eq!(image.sample(1, 1, z, c), Some((c + 2 * z) as u16));
        }
    }
}

#[tokio::test]
async fn test_shape_array_stack() {
    // {"shape": [C, Z, Y, X]} with Z varying fastest
    let mut builder = TiffStackBuilder::new(100, 50).description("{\"shape\": [2,10,50,100]}");
    for i in 0..20 {
        builder = builder.plane(gradient(i, 100, 50));
    }
    let reader = TrackingReader::new(builder.build(), "shape.tif");
    let volume = TiffVolume::open(reader).await.unwrap();
    assert_eq!(volume.dialect(), DescriptionDialect::ShapeArray);

    let dims = volume.dimensions();
    assert_eq!((dims.size_x, dims.size_y), (100, 50));
    assert_eq!((dims.size_z, dims.size_c, dims.size_t), (10, 2, 1));
    assert_eq!(dims.dimension_order, "XYZCT");

    let image = assemble_volume(&volume, 0, 0).await.unwrap();
    assert_eq!(image.data().len(), 100 * 50 * 2 * 10 * 2);
    // (z=3, c=1) is file plane 13
    assert_eq!(image.sample(42, 17, 3, 1), Some(gradient_value(13, 100, 42, 17)));
    assert_eq!(image.sample(0, 0, 9, 0), Some(gradient_value(9, 100, 0, 0)));
}

#[tokio::test]
async fn test_ome_big_endian_deflate() {
    // XYCTZ: C fastest, then T, then Z
    let xml = ome_xml((4, 3, 2, 2, 2), "XYCTZ", "uint16", &["GFP", "RFP"], Some(("500", "nm")));
    let mut builder = TiffStackBuilder::new(4, 3)
        .big_endian()
        .compression(StripCompression::Deflate)
        .description(xml);
    for i in 0..8 {
        builder = builder.plane(gradient(i, 4, 3));
    }
    let reader = TrackingReader::new(builder.build(), "cells.ome.tif");
    let volume = TiffVolume::open(reader).await.unwrap();
    assert_eq!(volume.dialect(), DescriptionDialect::OmeXml);

    let dims = volume.dimensions();
    assert_eq!(dims.channel_names, vec!["GFP", "RFP"]);
    assert_eq!(dims.physical_size_x, 0.25);
    assert!((dims.physical_size_z - 0.5).abs() < 1e-9);

    let image = assemble_volume(&volume, 1, 0).await.unwrap();
    for z in 0..2u32 {
        for c in 0..2u32 {
            let plane = (c + 2 + 4 * z) as u16;
            assert_eq!(image.sample(3, 2, z, c), Some(gradient_value(plane, 4, 3, 2)));
        }
    }
    assert_eq!(image.channel_name(1), Some("RFP"));
}

#[tokio::test]
async fn test_plain_8bit_stack_upconverted() {
    let reader = TrackingReader::new(
        TiffStackBuilder::new(3, 2)
            .bits(8)
            .constant_plane(7)
            .constant_plane(200)
            .constant_plane(255)
            .build(),
        "plain.tif",
    );
    let volume = TiffVolume::open(reader).await.unwrap();
    assert_eq!(volume.dialect(), DescriptionDialect::Fallback);
    assert_eq!(volume.dimensions().size_z, 3);
    assert_eq!(volume.dimensions().bits_per_pixel, 8);

    let image = assemble_volume(&volume, 0, 0).await.unwrap();
    assert_eq!(image.sample(2, 1, 0, 0), Some(7));
    assert_eq!(image.sample(0, 0, 1, 0), Some(200));
    assert_eq!(image.channel_range(0), Some((7, 255)));
    assert_eq!(image.channel_names(), ["0"]);
}

#[tokio::test]
async fn test_scene_ignored_for_tiff() {
    let reader = TrackingReader::new(
        TiffStackBuilder::new(2, 2)
            .constant_plane(1)
            .constant_plane(2)
            .build(),
        "scenes.tif",
    );
    let volume = TiffVolume::open(reader).await.unwrap();
    assert!(!volume.supports_scenes());

    let scene0 = assemble_volume(&volume, 0, 0).await.unwrap();
    let scene3 = assemble_volume(&volume, 0, 3).await.unwrap();
    assert_eq!(scene0.data(), scene3.data());
}

#[tokio::test]
async fn test_time_out_of_range_reads_no_planes() {
    // Three timepoints, time 5 requested
    let mut builder =
        TiffStackBuilder::new(2, 2).description("ImageJ=1.53t\nimages=3\nframes=3\n");
    for i in 0..3 {
        builder = builder.constant_plane(i);
    }
    let reader = TrackingReader::new(builder.build(), "frames.tif");
    let volume = TiffVolume::open(reader.clone()).await.unwrap();
    assert_eq!(volume.dimensions().size_t, 3);

    let reads_after_open = reader.request_count();
    let err = assemble_volume(&volume, 5, 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BoundsViolation);
    assert_eq!(reader.request_count(), reads_after_open);
}

#[tokio::test]
async fn test_every_ifd_entry_is_read() {
    // StripByteCounts is the last entry of each IFD
    let data = TiffStackBuilder::new(2, 2)
        .description("ImageJ=1.53t\nimages=2\nslices=2\n")
        .constant_plane(3)
        .constant_plane(4)
        .build();
    assert_eq!(u16::from_le_bytes([data[8], data[9]]), 10);

    let volume = TiffVolume::open(TrackingReader::new(data, "entries.tif"))
        .await
        .unwrap();
    assert_eq!(volume.ifd_count(), 2);
    let image = assemble_volume(&volume, 0, 0).await.unwrap();
    assert_eq!(image.sample(1, 1, 0, 0), Some(3));
    assert_eq!(image.sample(1, 1, 1, 0), Some(4));

    let plain = TiffStackBuilder::new(2, 2).constant_plane(5).build();
    assert_eq!(u16::from_le_bytes([plain[8], plain[9]]), 9);
    let volume = TiffVolume::open(TrackingReader::new(plain, "plain.tif"))
        .await
        .unwrap();
    let image = assemble_volume(&volume, 0, 0).await.unwrap();
    assert_eq!(image.sample(0, 1, 0, 0), Some(5));
}

#[tokio::test]
async fn test_description_plane_size_mismatch() {
    let reader = TrackingReader::new(
        TiffStackBuilder::new(4, 4)
            .description("{\"shape\": [1,1,8,8]}")
            .constant_plane(0)
            .build(),
        "mismatch.tif",
    );
    let err = TiffVolume::open(reader).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::MetadataMalformed);
}

#[tokio::test]
async fn test_float_ome_rejected() {
    let xml = ome_xml((2, 2, 1, 1, 1), "XYZCT", "float", &[], None);
    let reader = TrackingReader::new(
        TiffStackBuilder::new(2, 2)
            .description(xml)
            .constant_plane(0)
            .build(),
        "float.ome.tif",
    );
    let err = TiffVolume::open(reader).await.err().unwrap();
    assert!(matches!(err, VolumeError::UnsupportedFeature { .. }));
}
