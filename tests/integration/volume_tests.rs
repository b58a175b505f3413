//! Plane index mapping and dimension validation through the public API.

use volume_stack::{
    coordinate_from_plane_index, plane_index_from_coordinate, PlaneCoordinate, VolumeDimensions,
};

fn dims(order: &str, size_z: u32, size_c: u32, size_t: u32) -> VolumeDimensions {
    VolumeDimensions {
        size_x: 100,
        size_y: 50,
        size_z,
        size_c,
        size_t,
        dimension_order: order.to_string(),
        ..VolumeDimensions::default()
    }
}

#[test]
fn test_xyzct_plane_index() {
    // (z=3, c=1) in XYZCT with Z=5 is 3 + 1*5
    let dims = dims("XYZCT", 5, 2, 1);
    assert_eq!(plane_index_from_coordinate(&dims, 3, 1, 0).unwrap(), 8);
    assert_eq!(
        coordinate_from_plane_index(&dims, 8).unwrap(),
        PlaneCoordinate::new(3, 1, 0)
    );
}

#[test]
fn test_every_order_is_a_bijection() {
    for prefix in ["XY", "YX"] {
        for planes in ["ZCT", "ZTC", "CZT", "CTZ", "TZC", "TCZ"] {
            let dims = dims(&format!("{}{}", prefix, planes), 3, 2, 4);
            assert!(dims.validate());

            let mut seen = vec![false; 24];
            for t in 0..4 {
                for c in 0..2 {
                    for z in 0..3 {
                        let index = plane_index_from_coordinate(&dims, z, c, t).unwrap();
                        assert!(!seen[index as usize]);
                        seen[index as usize] = true;
                        assert_eq!(
                            coordinate_from_plane_index(&dims, index).unwrap(),
                            PlaneCoordinate::new(z, c, t)
                        );
                    }
                }
            }
            assert!(seen.iter().all(|&s| s));
        }
    }
}

#[test]
fn test_out_of_range_coordinates_fail() {
    let dims = dims("XYCZT", 2, 2, 1);
    assert!(plane_index_from_coordinate(&dims, 2, 0, 0).is_err());
    assert!(plane_index_from_coordinate(&dims, 0, 0, 1).is_err());
    assert!(coordinate_from_plane_index(&dims, 4).is_err());
}

#[test]
fn test_validation_collects_every_issue() {
    let mut bad = dims("ZYXCT", 0, 2, 1);
    bad.physical_size_y = f64::NAN;
    bad.channel_names = vec!["only".into()];
    assert!(!bad.validate());
    assert_eq!(bad.issues().len(), 4);
}
