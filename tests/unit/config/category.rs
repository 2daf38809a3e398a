use serde_json::json;

use super::*;

#[test]
fn category_names_roundtrip_and_unknown_falls_back() {
    for c in ImageCategory::ALL {
        assert_eq!(ImageCategory::from_name(c.name()), Some(c));
    }
    assert_eq!(ImageCategory::parse("Pre-Rotated"), ImageCategory::PreRotated);
    assert_eq!(ImageCategory::parse("hologram"), ImageCategory::Default);

    let c: ImageCategory = serde_json::from_value(json!("no-such-kind")).unwrap();
    assert_eq!(c, ImageCategory::Default);
}

#[test]
fn symmetric_and_range_bounds_resolve() {
    assert_eq!(RotationBound::Symmetric(2.5).resolve().unwrap(), (-2.5, 2.5));
    assert_eq!(
        RotationBound::Range {
            min: -1.0,
            max: 4.0
        }
        .resolve()
        .unwrap(),
        (-1.0, 4.0)
    );
}

#[test]
fn malformed_bounds_are_configuration_errors() {
    for bad in [
        RotationBound::Symmetric(-1.0),
        RotationBound::Symmetric(f64::NAN),
        RotationBound::Range { min: 2.0, max: 1.0 },
        RotationBound::Symmetric(400.0),
    ] {
        assert!(matches!(bad.resolve(), Err(StrataError::Configuration(_))));
    }
}

#[test]
fn table_falls_back_to_default_bound() {
    let mut t = RotationBounds::uniform(RotationBound::Symmetric(3.0));
    t.set(ImageCategory::Photo, RotationBound::Symmetric(0.5));
    assert_eq!(t.resolve(ImageCategory::Photo).unwrap(), (-0.5, 0.5));
    assert_eq!(t.resolve(ImageCategory::Illustration).unwrap(), (-3.0, 3.0));
}

#[test]
fn table_deserializes_numbers_and_ranges() {
    let t: RotationBounds = serde_json::from_value(json!({
        "default": 2.0,
        "photo": { "min": -1.0, "max": 0.0 }
    }))
    .unwrap();
    assert_eq!(t.resolve(ImageCategory::Default).unwrap(), (-2.0, 2.0));
    assert_eq!(t.resolve(ImageCategory::Photo).unwrap(), (-1.0, 0.0));
    // Built-in overrides survive when not mentioned.
    assert_eq!(t.resolve(ImageCategory::PreRotated).unwrap(), (-1.0, 1.0));
}

#[test]
fn table_rejects_unknown_keys() {
    let res: Result<RotationBounds, _> = serde_json::from_value(json!({ "phtoo": 1.0 }));
    assert!(res.is_err());
}

#[test]
fn table_validate_names_the_bad_category() {
    let mut t = RotationBounds::default();
    t.set(ImageCategory::Screenshot, RotationBound::Symmetric(-2.0));
    let err = t.validate().unwrap_err();
    assert!(err.to_string().contains("screenshot"));
}
