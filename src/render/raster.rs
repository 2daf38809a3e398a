use std::sync::Arc;

use image::imageops::{self, FilterType};

use crate::foundation::core::{Affine, ImageAsset, Point, Vec2};
use crate::foundation::error::{StrataError, StrataResult};
use crate::foundation::math::unpremultiply_px;

/// Premultiplied RGBA8 pixel.
pub type PremulRgba8 = [u8; 4];

/// Largest surface the renderer will allocate (1 GiB of RGBA8).
pub const MAX_SURFACE_PIXELS: u64 = 1 << 28;

fn surface_dims(width: u32, height: u32) -> StrataResult<(u16, u16)> {
    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_SURFACE_PIXELS {
        return Err(StrataError::resource_exhaustion(format!(
            "surface {width}x{height} exceeds {MAX_SURFACE_PIXELS} pixels"
        )));
    }
    let w: u16 = width
        .try_into()
        .map_err(|_| StrataError::composition(format!("surface width {width} exceeds u16")))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| StrataError::composition(format!("surface height {height} exceeds u16")))?;
    Ok((w, h))
}

fn alloc_pixels(
    width: u32,
    height: u32,
) -> StrataResult<Vec<vello_cpu::peniko::color::PremulRgba8>> {
    let len = width as usize * height as usize;
    let mut pixels = Vec::new();
    pixels.try_reserve_exact(len).map_err(|e| {
        StrataError::resource_exhaustion(format!("allocate {width}x{height} surface: {e}"))
    })?;
    Ok(pixels)
}

fn pixmap_from_premul(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> StrataResult<vello_cpu::Pixmap> {
    let (w, h) = surface_dims(width, height)?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(StrataError::composition("layer byte length does not match its size"));
    }

    let mut may_have_opacities = false;
    let mut pixels = alloc_pixels(width, height)?;
    for px in rgba8_premul.chunks_exact(4) {
        let a = px[3];
        may_have_opacities |= a != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a,
        });
    }
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

/// Lanczos3 resample of premultiplied bytes. Same-size requests copy.
fn resample_bytes(
    src_w: u32,
    src_h: u32,
    src: &[u8],
    width: u32,
    height: u32,
) -> StrataResult<Vec<u8>> {
    surface_dims(width, height)?;
    if (src_w, src_h) == (width, height) {
        return Ok(src.to_vec());
    }

    let view = image::ImageBuffer::<image::Rgba<u8>, &[u8]>::from_raw(src_w, src_h, src)
        .ok_or_else(|| StrataError::composition("source buffer does not match its size"))?;
    let mut data = imageops::resize(&view, width, height, FilterType::Lanczos3).into_raw();
    // Lanczos lobes can overshoot; premultiplied color may not exceed alpha.
    for px in data.chunks_exact_mut(4) {
        let a = px[3];
        px[0] = px[0].min(a);
        px[1] = px[1].min(a);
        px[2] = px[2].min(a);
    }
    Ok(data)
}

/// An image resampled to its drawn size and placed on the canvas by an affine transform.
#[derive(Clone)]
pub struct Layer {
    paint: vello_cpu::Image,
    paint_width: u32,
    paint_height: u32,
    width: u32,
    height: u32,
    transform: Affine,
    opacity: f32,
}

impl Layer {
    /// `image` resampled to `width x height` (Lanczos3), untransformed and opaque.
    pub fn new(image: &ImageAsset, width: u32, height: u32) -> StrataResult<Self> {
        let width = width.max(1);
        let height = height.max(1);
        let data = resample_bytes(
            image.width(),
            image.height(),
            image.premul_bytes(),
            width,
            height,
        )?;
        let pixmap = pixmap_from_premul(&data, width, height)?;
        Ok(Self {
            paint: vello_cpu::Image {
                image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
                sampler: vello_cpu::peniko::ImageSampler::default(),
            },
            paint_width: width,
            paint_height: height,
            width,
            height,
            transform: Affine::IDENTITY,
            opacity: 1.0,
        })
    }

    /// The same pixels drawn at `width x height`, unplaced and opaque. The pixmap is shared and
    /// scaled at render time.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        Self {
            paint: self.paint.clone(),
            paint_width: self.paint_width,
            paint_height: self.paint_height,
            width: width.max(1),
            height: height.max(1),
            transform: Affine::IDENTITY,
            opacity: 1.0,
        }
    }

    /// Rotate by `degrees` about the layer center and put that center at `center`.
    ///
    /// The unrotated top-left corner is snapped to whole pixels.
    pub fn placed(mut self, center: Point, degrees: f64) -> Self {
        let half = Vec2::new(f64::from(self.width) / 2.0, f64::from(self.height) / 2.0);
        let left = (center.x - half.x).round();
        let top = (center.y - half.y).round();
        self.transform = Affine::translate(Vec2::new(left, top) + half)
            * Affine::rotate(degrees.to_radians())
            * Affine::translate(-half);
        self
    }

    /// Blend the layer at `opacity` (clamped to `[0, 1]`).
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    /// Drawn width before rotation.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Drawn height before rotation.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Drawn layer space to canvas space.
    pub fn transform(&self) -> Affine {
        self.transform
    }

    fn paint_to_canvas(&self) -> Affine {
        self.transform
            * Affine::scale_non_uniform(
                f64::from(self.width) / f64::from(self.paint_width),
                f64::from(self.height) / f64::from(self.paint_height),
            )
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("transform", &self.transform)
            .field("opacity", &self.opacity)
            .finish()
    }
}

/// Premultiplied RGBA8 raster backed by a `vello_cpu` pixmap.
#[derive(Clone, Debug)]
pub struct Surface {
    pixmap: vello_cpu::Pixmap,
}

impl Surface {
    /// Allocate a surface filled with `px`.
    pub fn filled(width: u32, height: u32, px: PremulRgba8) -> StrataResult<Self> {
        let (w, h) = surface_dims(width, height)?;
        let mut pixels = alloc_pixels(width, height)?;
        let [r, g, b, a] = px;
        pixels.resize(
            width as usize * height as usize,
            vello_cpu::peniko::color::PremulRgba8 { r, g, b, a },
        );
        Ok(Self {
            pixmap: vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, a != 255),
        })
    }

    /// Fully transparent surface.
    pub fn transparent(width: u32, height: u32) -> StrataResult<Self> {
        Self::filled(width, height, [0, 0, 0, 0])
    }

    /// Fill a `width x height` canvas with the straight-alpha `background`, then draw `layers`
    /// back to front.
    #[tracing::instrument(skip(layers), fields(layers = layers.len()))]
    pub fn render(
        width: u32,
        height: u32,
        background: [u8; 4],
        layers: &[Layer],
    ) -> StrataResult<Self> {
        let mut surface = Self::transparent(width, height)?;
        let mut ctx =
            vello_cpu::RenderContext::new(surface.pixmap.width(), surface.pixmap.height());
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

        let [r, g, b, a] = background;
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, a));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(width),
            f64::from(height),
        ));

        for layer in layers {
            ctx.set_transform(affine_to_cpu(layer.paint_to_canvas()));
            ctx.set_paint(layer.paint.clone());
            if layer.opacity < 1.0 {
                ctx.push_opacity_layer(layer.opacity);
            }
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                0.0,
                0.0,
                f64::from(layer.paint_width),
                f64::from(layer.paint_height),
            ));
            if layer.opacity < 1.0 {
                ctx.pop_layer();
            }
        }

        ctx.flush();
        ctx.render_to_pixmap(&mut surface.pixmap);
        Ok(surface)
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        u32::from(self.pixmap.width())
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        u32::from(self.pixmap.height())
    }

    /// Premultiplied bytes.
    pub fn data(&self) -> &[u8] {
        self.pixmap.data_as_u8_slice()
    }

    /// Pixel at `(x, y)`, transparent outside.
    pub fn get(&self, x: i64, y: i64) -> PremulRgba8 {
        if x < 0 || y < 0 || x >= i64::from(self.width()) || y >= i64::from(self.height()) {
            return [0, 0, 0, 0];
        }
        let idx = (y as usize * self.width() as usize + x as usize) * 4;
        let data = self.data();
        [data[idx], data[idx + 1], data[idx + 2], data[idx + 3]]
    }

    /// Overwrite the pixel at `(x, y)`; ignored outside the surface.
    pub fn set(&mut self, x: u32, y: u32, px: PremulRgba8) {
        if x >= self.width() || y >= self.height() {
            return;
        }
        let idx = (y as usize * self.width() as usize + x as usize) * 4;
        self.pixmap.data_as_u8_slice_mut()[idx..idx + 4].copy_from_slice(&px);
    }

    /// Straight-alpha bytes with `channels` per pixel (3 drops alpha, 4 keeps it).
    pub fn to_straight(&self, channels: usize) -> Vec<u8> {
        let data = self.data();
        let mut out = Vec::with_capacity(data.len() / 4 * channels);
        for px in data.chunks_exact(4) {
            let s = unpremultiply_px([px[0], px[1], px[2], px[3]]);
            out.extend_from_slice(&s[..channels.min(4)]);
        }
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/raster.rs"]
mod tests;
