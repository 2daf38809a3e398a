use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::*;
use crate::config::category::RotationBound;

#[test]
fn region_boxes_step_in_quarters() {
    assert_eq!(PlacementRegion::TopLeft.bounds(), Rect::new(0.0, 0.0, 0.5, 0.5));
    assert_eq!(
        PlacementRegion::BottomRight.bounds(),
        Rect::new(0.5, 0.5, 1.0, 1.0)
    );
    assert_eq!(PlacementRegion::Center.anchor(), Point::new(0.5, 0.5));
    assert_eq!(PlacementRegion::Right.cell(), (2, 1));
}

#[test]
fn neighbouring_regions_overlap_by_half() {
    use PlacementRegion::*;
    assert!((TopLeft.overlap_ratio(Top) - 0.5).abs() < 1e-12);
    assert!((TopLeft.overlap_ratio(Left) - 0.5).abs() < 1e-12);
    assert!((Top.overlap_ratio(Left) - 0.25).abs() < 1e-12);
    assert_eq!(TopLeft.overlap_ratio(TopRight), 0.0);
    assert!(!TopLeft.compatible_with(TopLeft));
    assert!(!TopLeft.compatible_with(Top));
    assert!(TopLeft.compatible_with(BottomRight));
}

#[test]
fn every_background_region_has_a_partner() {
    for a in PlacementRegion::BACKGROUND {
        assert!(
            PlacementRegion::BACKGROUND
                .iter()
                .any(|b| a.compatible_with(*b)),
            "{a:?} has no compatible partner"
        );
    }
}

#[test]
fn same_seed_same_plan() {
    let cfg = TransformConfig::default();
    let a = GeometryPlanner::plan(ImageCategory::Photo, &cfg, &mut StdRng::seed_from_u64(9))
        .unwrap();
    let b = GeometryPlanner::plan(ImageCategory::Photo, &cfg, &mut StdRng::seed_from_u64(9))
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn malformed_bound_fails_before_sampling() {
    let mut cfg = TransformConfig::default();
    cfg.rotation_bounds
        .set(ImageCategory::Photo, RotationBound::Range { min: 3.0, max: -3.0 });
    let err = GeometryPlanner::plan(ImageCategory::Photo, &cfg, &mut StdRng::seed_from_u64(1))
        .unwrap_err();
    assert!(matches!(err, StrataError::Configuration(_)));
}

#[test]
fn zero_jitter_and_zero_rotation_are_exact() {
    let mut cfg = TransformConfig::default();
    cfg.max_scale_jitter = 0.0;
    cfg.rotation_bounds = crate::config::category::RotationBounds::uniform(
        RotationBound::Symmetric(0.0),
    );
    let plan = GeometryPlanner::plan(ImageCategory::Default, &cfg, &mut StdRng::seed_from_u64(4))
        .unwrap();
    assert_eq!(plan.scale_delta, 0.0);
    assert_eq!(plan.rotation_degrees, 0.0);
}

fn category_strategy() -> impl Strategy<Value = ImageCategory> {
    (0usize..ImageCategory::COUNT).prop_map(|i| ImageCategory::ALL[i])
}

proptest! {
    #[test]
    fn plan_stays_within_bounds(seed in any::<u64>(), category in category_strategy()) {
        let cfg = TransformConfig::default();
        let plan = GeometryPlanner::plan(category, &cfg, &mut StdRng::seed_from_u64(seed)).unwrap();
        let (min, max) = cfg.rotation_range(category).unwrap();

        prop_assert!(plan.rotation_degrees >= min && plan.rotation_degrees <= max);
        prop_assert!(plan.scale_delta.abs() <= cfg.max_scale_jitter);
        prop_assert_eq!(plan.backgrounds.len(), 2);
        for bg in &plan.backgrounds {
            prop_assert!(bg.region != PlacementRegion::Center);
            prop_assert!(bg.depth_scale >= 0.85 && bg.depth_scale <= 1.15);
            prop_assert!(bg.rotation_degrees.abs() <= 3.0);
        }
        let (a, b) = (plan.backgrounds[0].region, plan.backgrounds[1].region);
        prop_assert!(a != b);
        prop_assert!(a.overlap_ratio(b) < 0.5);
    }

    #[test]
    fn custom_range_is_respected(seed in any::<u64>(), lo in -20.0f64..0.0, span in 0.0f64..20.0) {
        let mut cfg = TransformConfig::default();
        cfg.rotation_bounds.set(
            ImageCategory::Illustration,
            RotationBound::Range { min: lo, max: lo + span },
        );
        let plan = GeometryPlanner::plan(
            ImageCategory::Illustration,
            &cfg,
            &mut StdRng::seed_from_u64(seed),
        )
        .unwrap();
        prop_assert!(plan.rotation_degrees >= lo && plan.rotation_degrees <= lo + span);
    }
}
