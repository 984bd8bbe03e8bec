use serde_json::json;
use zarrs_eopf::address::{PathStyle, parse_with_style};
use zarrs_eopf::georef::{BoundingBox, GeoTransform, correct_bbox_order, resolve};

#[test]
fn quoted_addresses_split_verbatim() {
    env_logger::try_init().ok();
    for (store, sub) in [
        ("/data/S2A.zarr", "/measurements/b02"),
        ("relative/dir:with:colons.zarr", "conditions/geometry"),
        ("C:\\data\\p.zarr", "quality/mask"),
    ] {
        let parsed = parse_with_style(&format!("EOPFZARR:\"{store}\":{sub}"), PathStyle::Posix);
        assert_eq!(parsed.store_path(), store);
        assert_eq!(parsed.sub_path(), sub);
        assert!(parsed.is_subdataset());
    }
}

#[test]
fn unsplit_addresses() {
    for store in ["/data/S2A.zarr", "relative.zarr", "/a b/c.zarr"] {
        let parsed = parse_with_style(&format!("EOPFZARR:{store}"), PathStyle::Posix);
        assert_eq!(parsed.store_path(), store);
        assert_eq!(parsed.sub_path(), "");
        assert!(!parsed.is_subdataset());
    }
}

#[test]
fn ordering_correction_scenarios() {
    let cases = [
        (
            [56.3803, 7.58006, 40.4139, 20.9708],
            [40.4139, 7.58006, 56.3803, 20.9708],
        ),
        (
            [-29.74827, 67.58993, -30.64866, 68.40500],
            [-30.64866, 67.58993, -29.74827, 68.40500],
        ),
        ([-10.0, 35.0, 5.0, 45.0], [-10.0, 35.0, 5.0, 45.0]),
        ([170.0, -10.0, -170.0, 10.0], [-170.0, -10.0, 170.0, 10.0]),
    ];
    for (input, expected) in cases {
        let corrected = correct_bbox_order(input);
        assert_eq!(corrected.to_array(), expected);
        assert!(corrected.min_x < corrected.max_x && corrected.min_y < corrected.max_y);

        let ctx = resolve(&json!({"stac_discovery": {"properties": {"proj:bbox": input}}}));
        assert_eq!(ctx.bbox.to_array(), expected);
    }
}

#[test]
fn degenerate_input_resolves_to_valid_box() {
    let ctx = resolve(&json!({"proj:bbox": [3.0, 3.0, 3.0, 3.0]}));
    assert!(ctx.bounds_origin.is_default());
    assert!(ctx.bbox.min_x < ctx.bbox.max_x && ctx.bbox.min_y < ctx.bbox.max_y);
}

#[test]
fn geotransform_derivation() {
    let bbox = BoundingBox::new(0.0, 0.0, 100.0, 50.0);
    let gt = GeoTransform::from_bbox(&bbox, 100, 50).expect("non-empty raster");
    assert_eq!(gt.0, [0.0, 1.0, 0.0, 50.0, 0.0, -1.0]);
}
