use crate::config::transform::{MissingBackgroundPolicy, TransformConfig};
use crate::foundation::core::{Canvas, ImageAsset, PixelFormat, Point, Rgb8, SourceId};
use crate::foundation::error::{StrataError, StrataResult};
use crate::plan::TransformationPlan;
use crate::plan::geometry::BackgroundPlacement;
use crate::render::raster::{Layer, Surface};

/// Flattened composite raster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositeOutput {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Layout of `data`.
    pub format: PixelFormat,
    /// Straight-alpha pixels, row-major.
    pub data: Vec<u8>,
    /// A background layer was substituted.
    pub degraded: bool,
}

impl CompositeOutput {
    /// Output dimensions.
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }
}

/// Renders a foreground, two backgrounds and a plan into one raster.
///
/// Composition is a pure function of its inputs: the same foreground, backgrounds, plan and
/// config always produce identical bytes.
pub struct LayerCompositor;

impl LayerCompositor {
    /// Build the layer stack described by `plan` from images already in memory.
    #[tracing::instrument(
        skip(foreground, backgrounds, plan, config),
        fields(source = %foreground.source(), backgrounds = backgrounds.len())
    )]
    pub fn compose(
        foreground: &ImageAsset,
        backgrounds: &[ImageAsset],
        plan: &TransformationPlan,
        config: &TransformConfig,
    ) -> StrataResult<CompositeOutput> {
        let mut stack = Self::begin(foreground, plan, config)?;
        for bg in backgrounds {
            if !stack.needs_background() {
                break;
            }
            stack.add_background(bg)?;
        }
        stack.finish()
    }

    /// Start a layer stack for `foreground`.
    ///
    /// The foreground is resampled into its layer here; the stack keeps no reference to it, so
    /// the decoded image can be released before any background is decoded.
    pub fn begin<'a>(
        foreground: &ImageAsset,
        plan: &'a TransformationPlan,
        config: &'a TransformConfig,
    ) -> StrataResult<LayerStack<'a>> {
        let pad = config.border_padding();
        let canvas = Canvas {
            width: foreground.width().saturating_add(pad.saturating_mul(2)),
            height: foreground.height().saturating_add(pad.saturating_mul(2)),
        };
        if plan.canvas != canvas {
            return Err(StrataError::composition(format!(
                "plan was drawn for a {}x{} canvas, foreground needs {}x{}",
                plan.canvas.width, plan.canvas.height, canvas.width, canvas.height
            )));
        }
        if plan.backgrounds.len() != TransformConfig::BACKGROUND_LAYERS {
            return Err(StrataError::composition(format!(
                "plan has {} background placements, expected {}",
                plan.backgrounds.len(),
                TransformConfig::BACKGROUND_LAYERS
            )));
        }

        let scale = 1.0 + plan.scale_delta;
        let center = Point::new(
            f64::from(canvas.width) / 2.0,
            f64::from(canvas.height) / 2.0,
        );
        let layer = Layer::new(
            foreground,
            scaled_extent(foreground.width(), scale),
            scaled_extent(foreground.height(), scale),
        )?
        .placed(center, plan.rotation_degrees);

        Ok(LayerStack {
            plan,
            config,
            canvas,
            foreground_size: (foreground.width(), foreground.height()),
            foreground: layer,
            backgrounds: Vec::with_capacity(TransformConfig::BACKGROUND_LAYERS),
        })
    }
}

/// A composite being assembled one decoded image at a time.
///
/// Backgrounds fill the plan's placements in order. Placements still empty at
/// [`finish`](Self::finish) are handled by the configured [`MissingBackgroundPolicy`].
#[derive(Debug)]
pub struct LayerStack<'a> {
    plan: &'a TransformationPlan,
    config: &'a TransformConfig,
    canvas: Canvas,
    foreground_size: (u32, u32),
    foreground: Layer,
    backgrounds: Vec<Layer>,
}

impl LayerStack<'_> {
    /// Some placement has no background yet.
    pub fn needs_background(&self) -> bool {
        self.backgrounds.len() < self.plan.backgrounds.len()
    }

    /// Backgrounds supplied so far.
    pub fn background_count(&self) -> usize {
        self.backgrounds.len()
    }

    /// Resample `image` into the next empty background placement.
    pub fn add_background(&mut self, image: &ImageAsset) -> StrataResult<()> {
        let placement = self.next_placement()?;
        let layer = Layer::new(
            image,
            scaled_extent(image.width(), placement.depth_scale),
            scaled_extent(image.height(), placement.depth_scale),
        )?;
        let placed = self.place(layer, placement);
        self.backgrounds.push(placed);
        Ok(())
    }

    /// Fill remaining placements per policy, render, then draw the border and accents.
    pub fn finish(mut self) -> StrataResult<CompositeOutput> {
        let supplied = self.backgrounds.len();
        let degraded = self.needs_background();
        while self.needs_background() {
            self.substitute_background()?;
        }
        if degraded {
            tracing::warn!(
                supplied,
                policy = ?self.config.missing_background,
                "background layers substituted"
            );
        }

        let canvas = self.canvas;
        let mut layers = self.backgrounds;
        layers.push(self.foreground);
        let mut surface =
            Surface::render(canvas.width, canvas.height, self.config.canvas_rgba, &layers)?;
        drop(layers);

        let pad = self.config.border_padding();
        if self.config.border_enabled && pad > 0 {
            draw_border(&mut surface, pad, self.config, &self.plan.border_palette);
        }

        for accent in &self.plan.accent_pixels {
            if accent.x >= canvas.width || accent.y >= canvas.height {
                return Err(StrataError::composition(format!(
                    "accent pixel ({}, {}) lies outside the canvas",
                    accent.x, accent.y
                )));
            }
            surface.set(accent.x, accent.y, accent.color.to_premul());
        }

        let format = self.config.output_format;
        Ok(CompositeOutput {
            width: canvas.width,
            height: canvas.height,
            format,
            data: surface.to_straight(format.channels()),
            degraded,
        })
    }

    fn next_placement(&self) -> StrataResult<&BackgroundPlacement> {
        self.plan
            .backgrounds
            .get(self.backgrounds.len())
            .ok_or_else(|| {
                StrataError::composition(format!(
                    "all {} background placements are already filled",
                    self.plan.backgrounds.len()
                ))
            })
    }

    fn substitute_background(&mut self) -> StrataResult<()> {
        let slot = self.backgrounds.len();
        let placement = self.next_placement()?;
        let (fg_w, fg_h) = self.foreground_size;
        let w = scaled_extent(fg_w, placement.depth_scale);
        let h = scaled_extent(fg_h, placement.depth_scale);
        let layer = match self.config.missing_background {
            MissingBackgroundPolicy::Fail => {
                return Err(StrataError::composition(format!(
                    "background layer {slot} is missing"
                )));
            }
            MissingBackgroundPolicy::NeutralFill => {
                let fill =
                    ImageAsset::solid(SourceId::Index(slot), w, h, self.config.neutral_fill)?;
                Layer::new(&fill, w, h)?
            }
            MissingBackgroundPolicy::ReuseForeground => self.foreground.resized(w, h),
        };
        let placed = self.place(layer, placement);
        self.backgrounds.push(placed);
        Ok(())
    }

    fn place(&self, layer: Layer, placement: &BackgroundPlacement) -> Layer {
        let anchor = placement.region.anchor();
        let center = Point::new(
            anchor.x * f64::from(self.canvas.width),
            anchor.y * f64::from(self.canvas.height),
        );
        layer
            .placed(center, placement.rotation_degrees)
            .with_opacity(placement.opacity)
    }
}

fn draw_border(surface: &mut Surface, pad: u32, config: &TransformConfig, palette: &[Rgb8]) {
    let fallback = [config.neutral_fill];
    let palette = if palette.is_empty() {
        &fallback[..]
    } else {
        palette
    };
    let band = config.border_band_width.max(1);
    let (w, h) = (surface.width(), surface.height());
    for y in 0..h {
        for x in 0..w {
            let edge = x.min(y).min(w - 1 - x).min(h - 1 - y);
            if edge >= pad {
                continue;
            }
            let color = palette[(edge / band) as usize % palette.len()];
            surface.set(x, y, color.to_premul());
        }
    }
}

fn scaled_extent(extent: u32, scale: f64) -> u32 {
    (f64::from(extent) * scale).round().clamp(1.0, f64::from(u32::MAX)) as u32
}

#[cfg(test)]
#[path = "../../tests/unit/render/compositor.rs"]
mod tests;
