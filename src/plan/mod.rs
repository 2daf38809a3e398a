//! Randomized per-image planning.
//!
//! Planning is the only phase that touches random state. Everything downstream of a
//! [`TransformationPlan`] is a pure function of its inputs.

pub(crate) mod geometry;
pub(crate) mod palette;

use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::category::ImageCategory;
use crate::config::transform::TransformConfig;
use crate::foundation::core::{Canvas, ImageAsset, Rgb8};
use crate::foundation::error::StrataResult;
use crate::plan::geometry::{BackgroundPlacement, GeometryPlanner};
use crate::plan::palette::ColorHarmonizer;

/// A single accent pixel on the output canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccentPixel {
    /// Column on the output canvas.
    pub x: u32,
    /// Row on the output canvas.
    pub y: u32,
    /// Opaque color written at `(x, y)`.
    pub color: Rgb8,
}

/// Everything the compositor needs besides pixels. Created per image, consumed once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformationPlan {
    /// Category the rotation bound was taken from.
    pub category: ImageCategory,
    /// Output canvas the plan was drawn for (foreground plus border padding).
    pub canvas: Canvas,
    /// Foreground scale offset.
    pub scale_delta: f64,
    /// Foreground rotation in degrees.
    pub rotation_degrees: f64,
    /// Border band colors; empty when the border is disabled.
    pub border_palette: SmallVec<[Rgb8; 3]>,
    /// Accent pixels at distinct coordinates.
    pub accent_pixels: Vec<AccentPixel>,
    /// Background layers, back to front.
    pub backgrounds: SmallVec<[BackgroundPlacement; 2]>,
}

/// Combines geometry, palette and accent sampling into one [`TransformationPlan`].
pub struct TransformPlanner;

impl TransformPlanner {
    /// Draw a plan for `foreground`. Consumes random state in a fixed order: geometry,
    /// palette, accents.
    #[tracing::instrument(skip(foreground, config, rng), fields(source = %foreground.source()))]
    pub fn plan<R: Rng + ?Sized>(
        foreground: &ImageAsset,
        category: ImageCategory,
        config: &TransformConfig,
        rng: &mut R,
    ) -> StrataResult<TransformationPlan> {
        let geometry = GeometryPlanner::plan(category, config, rng)?;

        let pad = config.border_padding();
        let canvas = Canvas {
            width: foreground.width().saturating_add(pad.saturating_mul(2)),
            height: foreground.height().saturating_add(pad.saturating_mul(2)),
        };

        let border_palette = if config.border_enabled {
            ColorHarmonizer::derive_palette(foreground, config.palette_size, &config.harmony, rng)
                .colors
        } else {
            SmallVec::new()
        };

        let accent_pixels = if config.accent_pixels_enabled {
            Self::accents(canvas, config, rng)
        } else {
            Vec::new()
        };

        Ok(TransformationPlan {
            category,
            canvas,
            scale_delta: geometry.scale_delta,
            rotation_degrees: geometry.rotation_degrees,
            border_palette,
            accent_pixels,
            backgrounds: geometry.backgrounds,
        })
    }

    fn accents<R: Rng + ?Sized>(
        canvas: Canvas,
        config: &TransformConfig,
        rng: &mut R,
    ) -> Vec<AccentPixel> {
        let (min, max) = config.accent_pixel_range;
        let (cmin, cmax) = config.accent_channel_range;
        let total = usize::try_from(canvas.pixel_count()).unwrap_or(usize::MAX);
        let count = (rng.gen_range(min..=max) as usize).min(total);
        if count == 0 {
            return Vec::new();
        }

        let width = canvas.width as usize;
        index::sample(rng, total, count)
            .into_iter()
            .map(|i| AccentPixel {
                x: (i % width) as u32,
                y: (i / width) as u32,
                color: Rgb8::new(
                    rng.gen_range(cmin..=cmax),
                    rng.gen_range(cmin..=cmax),
                    rng.gen_range(cmin..=cmax),
                ),
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/plan/mod.rs"]
mod tests;
