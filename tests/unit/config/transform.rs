use super::*;

#[test]
fn defaults_are_valid() {
    let cfg = TransformConfig::default();
    cfg.validate().unwrap();
    assert_eq!(cfg.max_scale_jitter, 0.05);
    assert_eq!(cfg.accent_pixel_range, (3, 5));
    assert_eq!(cfg.max_backgrounds_per_composite, 2);
    assert_eq!(
        cfg.rotation_range(ImageCategory::Default).unwrap(),
        (-3.0, 3.0)
    );
}

#[test]
fn empty_json_yields_defaults() {
    let cfg = TransformConfig::from_json("{}").unwrap();
    assert_eq!(cfg, TransformConfig::default());
}

#[test]
fn partial_json_overrides_fields() {
    let cfg = TransformConfig::from_json(
        r#"{
            "border_enabled": false,
            "concurrency_limit": 4,
            "rotation_bounds": { "default": 1.0 },
            "harmony": { "max_hue_distance": 12.0 }
        }"#,
    )
    .unwrap();
    assert!(!cfg.border_enabled);
    assert_eq!(cfg.border_padding(), 0);
    assert_eq!(cfg.concurrency_limit, 4);
    assert_eq!(cfg.harmony.max_hue_distance, 12.0);
    assert_eq!(cfg.harmony.sample_grid, 16);
    assert_eq!(
        cfg.rotation_range(ImageCategory::Photo).unwrap(),
        (-1.0, 1.0)
    );
}

#[test]
fn unknown_fields_are_rejected() {
    let err = TransformConfig::from_json(r#"{ "border_colour": 3 }"#).unwrap_err();
    assert!(matches!(err, StrataError::Configuration(_)));
}

#[test]
fn malformed_rotation_table_is_configuration_error() {
    let err =
        TransformConfig::from_json(r#"{ "rotation_bounds": { "photo": -2.0 } }"#).unwrap_err();
    assert!(matches!(err, StrataError::Configuration(_)));
    assert!(err.to_string().contains("photo"));
}

#[test]
fn each_invalid_option_is_rejected() {
    let cases: Vec<Box<dyn Fn(&mut TransformConfig)>> = vec![
        Box::new(|c| c.max_scale_jitter = -0.1),
        Box::new(|c| c.max_scale_jitter = 1.0),
        Box::new(|c| c.depth_scale_range = (1.2, 0.9)),
        Box::new(|c| c.depth_scale_range = (0.0, 1.0)),
        Box::new(|c| c.background_opacity = 1.5),
        Box::new(|c| c.border_band_width = 0),
        Box::new(|c| c.accent_pixel_range = (6, 2)),
        Box::new(|c| c.accent_channel_range = (200, 100)),
        Box::new(|c| c.palette_size = 0),
        Box::new(|c| c.palette_size = 4),
        Box::new(|c| c.max_backgrounds_per_composite = 3),
        Box::new(|c| c.concurrency_limit = 0),
        Box::new(|c| c.item_timeout_ms = Some(0)),
        Box::new(|c| c.max_source_width = Some(0)),
        Box::new(|c| c.background_rotation = RotationBound::Symmetric(-1.0)),
        Box::new(|c| c.harmony.hue_buckets = 0),
        Box::new(|c| c.harmony.max_hue_distance = 200.0),
        Box::new(|c| c.harmony.max_hue_distance = 1.0),
        Box::new(|c| c.harmony.lightness_bounds = (0.9, 0.1)),
    ];
    for (i, mutate) in cases.iter().enumerate() {
        let mut cfg = TransformConfig::default();
        mutate(&mut cfg);
        assert!(
            matches!(cfg.validate(), Err(StrataError::Configuration(_))),
            "case {i} should be rejected"
        );
    }
}

#[test]
fn from_path_reads_and_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cfg.json");
    std::fs::write(&path, r#"{ "palette_size": 1 }"#).unwrap();
    assert_eq!(TransformConfig::from_path(&path).unwrap().palette_size, 1);

    let missing = dir.path().join("nope.json");
    assert!(matches!(
        TransformConfig::from_path(&missing),
        Err(StrataError::Configuration(_))
    ));
}
