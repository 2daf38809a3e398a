use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::config::category::{ImageCategory, RotationBound, RotationBounds};
use crate::foundation::core::{PixelFormat, Rgb8};
use crate::foundation::error::{StrataError, StrataResult};

/// What the compositor does when fewer than two backgrounds are supplied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingBackgroundPolicy {
    /// Fail the item with a composition error.
    Fail,
    /// Replace each missing layer with a solid neutral fill and flag the result degraded.
    #[default]
    NeutralFill,
    /// Reuse the foreground as the missing layer and flag the result degraded.
    ReuseForeground,
}

/// Dominant-color extraction and palette thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarmonyConfig {
    /// Samples per axis of the fixed sampling grid.
    pub sample_grid: u32,
    /// Number of hue buckets used for clustering.
    pub hue_buckets: u32,
    /// How many of the most frequent buckets count as dominant.
    pub dominant_clusters: usize,
    /// Maximum hue distance (degrees) between a palette color and its cluster.
    pub max_hue_distance: f64,
    /// Samples below this HSL saturation are treated as achromatic.
    pub min_saturation: f64,
    /// Samples with alpha below this are ignored.
    pub min_alpha: u8,
    /// Samples with HSL lightness outside `[min, max]` are treated as achromatic.
    pub lightness_bounds: (f64, f64),
}

impl Default for HarmonyConfig {
    fn default() -> Self {
        Self {
            sample_grid: 16,
            hue_buckets: 12,
            dominant_clusters: 2,
            max_hue_distance: 30.0,
            min_saturation: 0.12,
            min_alpha: 16,
            lightness_bounds: (0.08, 0.92),
        }
    }
}

/// Smallest hue bound an RGB8 palette color can be held to.
const MIN_HUE_DISTANCE: f64 = 2.0;

impl HarmonyConfig {
    fn validate(&self) -> StrataResult<()> {
        if self.sample_grid == 0 || self.sample_grid > 256 {
            return Err(StrataError::configuration(
                "harmony.sample_grid must be in 1..=256",
            ));
        }
        if self.hue_buckets == 0 || self.hue_buckets > 360 {
            return Err(StrataError::configuration(
                "harmony.hue_buckets must be in 1..=360",
            ));
        }
        if self.dominant_clusters == 0 {
            return Err(StrataError::configuration(
                "harmony.dominant_clusters must be >= 1",
            ));
        }
        if !(MIN_HUE_DISTANCE..=180.0).contains(&self.max_hue_distance) {
            return Err(StrataError::configuration(
                "harmony.max_hue_distance must be in [2, 180]",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_saturation) {
            return Err(StrataError::configuration(
                "harmony.min_saturation must be in [0, 1]",
            ));
        }
        let (lmin, lmax) = self.lightness_bounds;
        if !(0.0..=1.0).contains(&lmin) || !(0.0..=1.0).contains(&lmax) || lmin >= lmax {
            return Err(StrataError::configuration(
                "harmony.lightness_bounds must satisfy 0 <= min < max <= 1",
            ));
        }
        Ok(())
    }
}

/// Shared configuration for every composite in a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    /// Foreground scale jitter: `scale_delta` is drawn from `[-v, +v]`.
    pub max_scale_jitter: f64,
    /// Foreground rotation bound per image category.
    pub rotation_bounds: RotationBounds,
    /// Rotation bound for background layers.
    pub background_rotation: RotationBound,
    /// Depth scale range `[min, max]` for background layers.
    pub depth_scale_range: (f64, f64),
    /// Opacity applied to each background layer.
    pub background_opacity: f32,
    /// Draw a framed border around the composite (grows the canvas by `2 * border_width`).
    pub border_enabled: bool,
    /// Border thickness in pixels.
    pub border_width: u32,
    /// Thickness of one color band inside the border.
    pub border_band_width: u32,
    /// Scatter a few bright accent pixels over the output.
    pub accent_pixels_enabled: bool,
    /// Inclusive accent pixel count range.
    pub accent_pixel_range: (u32, u32),
    /// Inclusive per-channel range for accent colors.
    pub accent_channel_range: (u8, u8),
    /// Number of border colors, 1..=3.
    pub palette_size: usize,
    /// Background layers per composite. Fixed at 2.
    pub max_backgrounds_per_composite: usize,
    /// Maximum number of source images held decoded at once (K); also the worker count.
    pub concurrency_limit: usize,
    /// Per-item processing budget, checked between stages.
    pub item_timeout_ms: Option<u64>,
    /// Behavior when fewer than two backgrounds are available.
    pub missing_background: MissingBackgroundPolicy,
    /// Color of neutral replacement layers.
    pub neutral_fill: Rgb8,
    /// Canvas color under all layers (straight RGBA8).
    pub canvas_rgba: [u8; 4],
    /// Pixel layout of flattened output.
    pub output_format: PixelFormat,
    /// Sources wider than this are downscaled at load time.
    pub max_source_width: Option<u32>,
    /// Palette derivation thresholds.
    pub harmony: HarmonyConfig,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_scale_jitter: 0.05,
            rotation_bounds: RotationBounds::default(),
            background_rotation: RotationBound::Symmetric(3.0),
            depth_scale_range: (0.85, 1.15),
            background_opacity: 1.0,
            border_enabled: true,
            border_width: 5,
            border_band_width: 2,
            accent_pixels_enabled: true,
            accent_pixel_range: (3, 5),
            accent_channel_range: (100, 255),
            palette_size: 3,
            max_backgrounds_per_composite: 2,
            concurrency_limit: 2,
            item_timeout_ms: None,
            missing_background: MissingBackgroundPolicy::default(),
            neutral_fill: Rgb8::new(128, 128, 128),
            canvas_rgba: [255, 255, 255, 255],
            output_format: PixelFormat::Rgb8,
            max_source_width: Some(1500),
            harmony: HarmonyConfig::default(),
        }
    }
}

impl TransformConfig {
    /// Background layers per composite.
    pub const BACKGROUND_LAYERS: usize = 2;
    /// Upper limit for `concurrency_limit`.
    pub const MAX_CONCURRENCY: usize = 64;

    /// Load a JSON config file and validate it.
    pub fn from_path(path: impl AsRef<Path>) -> StrataResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))
            .map_err(|e| StrataError::configuration(format!("{e:#}")))?;
        Self::from_json(&text)
    }

    /// Parse a JSON config string and validate it.
    pub fn from_json(text: &str) -> StrataResult<Self> {
        let cfg: Self = serde_json::from_str(text)
            .map_err(|e| StrataError::configuration(format!("parse config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validated foreground rotation range for `category`.
    pub fn rotation_range(&self, category: ImageCategory) -> StrataResult<(f64, f64)> {
        self.rotation_bounds.resolve(category)
    }

    /// Border padding added on each side of the canvas.
    pub fn border_padding(&self) -> u32 {
        if self.border_enabled {
            self.border_width
        } else {
            0
        }
    }

    /// Check every option; the first violation is returned as a configuration error.
    pub fn validate(&self) -> StrataResult<()> {
        if !self.max_scale_jitter.is_finite() || !(0.0..1.0).contains(&self.max_scale_jitter) {
            return Err(StrataError::configuration(
                "max_scale_jitter must be in [0, 1)",
            ));
        }
        self.rotation_bounds.validate()?;
        self.background_rotation.resolve().map_err(|e| {
            StrataError::configuration(format!("background_rotation: {e}"))
        })?;

        let (dmin, dmax) = self.depth_scale_range;
        if !dmin.is_finite() || !dmax.is_finite() || dmin <= 0.0 || dmin > dmax || dmax > 4.0 {
            return Err(StrataError::configuration(
                "depth_scale_range must satisfy 0 < min <= max <= 4",
            ));
        }
        if !self.background_opacity.is_finite() || !(0.0..=1.0).contains(&self.background_opacity)
        {
            return Err(StrataError::configuration(
                "background_opacity must be in [0, 1]",
            ));
        }
        if self.border_width > 4096 {
            return Err(StrataError::configuration("border_width must be <= 4096"));
        }
        if self.border_band_width == 0 {
            return Err(StrataError::configuration(
                "border_band_width must be >= 1",
            ));
        }

        let (amin, amax) = self.accent_pixel_range;
        if amin > amax || amax > 1024 {
            return Err(StrataError::configuration(
                "accent_pixel_range must satisfy min <= max <= 1024",
            ));
        }
        let (cmin, cmax) = self.accent_channel_range;
        if cmin > cmax {
            return Err(StrataError::configuration(
                "accent_channel_range min must be <= max",
            ));
        }
        if !(1..=3).contains(&self.palette_size) {
            return Err(StrataError::configuration("palette_size must be in 1..=3"));
        }
        if self.max_backgrounds_per_composite != Self::BACKGROUND_LAYERS {
            return Err(StrataError::configuration(format!(
                "max_backgrounds_per_composite is fixed at {}",
                Self::BACKGROUND_LAYERS
            )));
        }
        if self.concurrency_limit == 0 || self.concurrency_limit > Self::MAX_CONCURRENCY {
            return Err(StrataError::configuration(format!(
                "concurrency_limit must be in 1..={}",
                Self::MAX_CONCURRENCY
            )));
        }
        if self.item_timeout_ms == Some(0) {
            return Err(StrataError::configuration(
                "item_timeout_ms must be > 0 when set",
            ));
        }
        if self.max_source_width == Some(0) {
            return Err(StrataError::configuration(
                "max_source_width must be > 0 when set",
            ));
        }
        self.harmony.validate()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/config/transform.rs"]
mod tests;
