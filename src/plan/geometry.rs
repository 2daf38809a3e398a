use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::category::ImageCategory;
use crate::config::transform::TransformConfig;
use crate::foundation::core::{Point, Rect};
use crate::foundation::error::{StrataError, StrataResult};

/// One of nine fixed zones in a 3x3 arrangement over the canvas.
///
/// Each zone covers half the canvas in both directions and is offset in quarter steps, so
/// neighbouring zones overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementRegion {
    /// Row 0, column 0.
    TopLeft,
    /// Row 0, column 1.
    Top,
    /// Row 0, column 2.
    TopRight,
    /// Row 1, column 0.
    Left,
    /// Row 1, column 1. Reserved for the foreground.
    Center,
    /// Row 1, column 2.
    Right,
    /// Row 2, column 0.
    BottomLeft,
    /// Row 2, column 1.
    Bottom,
    /// Row 2, column 2.
    BottomRight,
}

impl PlacementRegion {
    /// All regions in row-major order.
    pub const ALL: [Self; 9] = [
        Self::TopLeft,
        Self::Top,
        Self::TopRight,
        Self::Left,
        Self::Center,
        Self::Right,
        Self::BottomLeft,
        Self::Bottom,
        Self::BottomRight,
    ];

    /// Regions a background layer may use.
    pub const BACKGROUND: [Self; 8] = [
        Self::TopLeft,
        Self::Top,
        Self::TopRight,
        Self::Left,
        Self::Right,
        Self::BottomLeft,
        Self::Bottom,
        Self::BottomRight,
    ];

    /// Two regions overlapping at least this much cannot host both backgrounds.
    pub const MAX_OVERLAP: f64 = 0.5;

    /// `(column, row)` in the 3x3 grid.
    pub fn cell(self) -> (u8, u8) {
        let i = self as u8;
        (i % 3, i / 3)
    }

    /// Normalized bounding box in `[0, 1]^2`.
    pub fn bounds(self) -> Rect {
        let (col, row) = self.cell();
        let x0 = f64::from(col) * 0.25;
        let y0 = f64::from(row) * 0.25;
        Rect::new(x0, y0, x0 + 0.5, y0 + 0.5)
    }

    /// Normalized center of the bounding box.
    pub fn anchor(self) -> Point {
        self.bounds().center()
    }

    /// Intersection area divided by the smaller box area.
    pub fn overlap_ratio(self, other: Self) -> f64 {
        let a = self.bounds();
        let b = other.bounds();
        let smaller = a.area().min(b.area());
        if smaller <= 0.0 {
            return 0.0;
        }
        a.intersect(b).area() / smaller
    }

    /// `true` when both regions may host backgrounds in the same composite.
    pub fn compatible_with(self, other: Self) -> bool {
        self != other && self.overlap_ratio(other) < Self::MAX_OVERLAP
    }
}

/// Placement of one background layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackgroundPlacement {
    /// Zone whose anchor the layer is centered on.
    pub region: PlacementRegion,
    /// Resize factor applied to the background's own dimensions.
    pub depth_scale: f64,
    /// Independent layer rotation in degrees.
    pub rotation_degrees: f64,
    /// Layer opacity in `[0, 1]`.
    pub opacity: f32,
}

/// Randomized geometric parameters for one composite.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeometryPlan {
    /// Foreground scale offset; the foreground is scaled by `1 + scale_delta`.
    pub scale_delta: f64,
    /// Foreground rotation in degrees.
    pub rotation_degrees: f64,
    /// Background layers, back to front.
    pub backgrounds: SmallVec<[BackgroundPlacement; 2]>,
}

/// Draws [`GeometryPlan`]s within configured bounds.
pub struct GeometryPlanner;

impl GeometryPlanner {
    /// Sample a plan for an image of `category`.
    #[tracing::instrument(skip(config, rng))]
    pub fn plan<R: Rng + ?Sized>(
        category: ImageCategory,
        config: &TransformConfig,
        rng: &mut R,
    ) -> StrataResult<GeometryPlan> {
        let (rot_min, rot_max) = config.rotation_range(category)?;
        let (bg_min, bg_max) = config.background_rotation.resolve()?;
        let (depth_min, depth_max) = config.depth_scale_range;
        let jitter = config.max_scale_jitter;

        let scale_delta = rng.gen_range(-jitter..=jitter);
        let rotation_degrees = rng.gen_range(rot_min..=rot_max);

        let mut backgrounds = SmallVec::<[BackgroundPlacement; 2]>::new();
        let mut chosen = SmallVec::<[PlacementRegion; 2]>::new();
        for _ in 0..TransformConfig::BACKGROUND_LAYERS {
            let candidates: SmallVec<[PlacementRegion; 8]> = PlacementRegion::BACKGROUND
                .into_iter()
                .filter(|r| chosen.iter().all(|c| c.compatible_with(*r)))
                .collect();
            let region = *candidates.choose(rng).ok_or_else(|| {
                StrataError::composition("no compatible background region left")
            })?;
            chosen.push(region);
            backgrounds.push(BackgroundPlacement {
                region,
                depth_scale: rng.gen_range(depth_min..=depth_max),
                rotation_degrees: rng.gen_range(bg_min..=bg_max),
                opacity: config.background_opacity,
            });
        }

        Ok(GeometryPlan {
            scale_delta,
            rotation_degrees,
            backgrounds,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/plan/geometry.rs"]
mod tests;
