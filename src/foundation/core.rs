use std::fmt;
use std::path::PathBuf;

use crate::foundation::error::{StrataError, StrataResult};
use crate::foundation::math::premultiply_rgba8_in_place;

pub use kurbo::{Affine, Point, Rect, Vec2};

/// Identifies where an image came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// File on disk.
    Path(PathBuf),
    /// Position in the submitted batch (in-memory sources).
    Index(usize),
}

impl SourceId {
    /// File stem used for output naming.
    pub fn stem(&self) -> String {
        match self {
            Self::Path(p) => p
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_owned()),
            Self::Index(i) => format!("image_{i:05}"),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Index(i) => write!(f, "#{i}"),
        }
    }
}

/// Pixel layout of a decoded source or a flattened output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Opaque RGB, 3 bytes per pixel.
    #[default]
    Rgb8,
    /// Straight-alpha RGBA, 4 bytes per pixel.
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
        }
    }
}

/// Canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Total pixel count.
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Straight (non-premultiplied) opaque color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgb8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb8 {
    /// Build a color from channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Opaque premultiplied pixel.
    pub fn to_premul(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

/// A decoded raster owned by exactly one pipeline stage at a time.
///
/// Pixels are stored as premultiplied RGBA8, row-major, tightly packed. `format` records the
/// layout of the source it was decoded from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageAsset {
    source: SourceId,
    width: u32,
    height: u32,
    format: PixelFormat,
    rgba8_premul: Vec<u8>,
}

impl ImageAsset {
    /// Wrap premultiplied RGBA8 bytes.
    pub fn from_premul(
        source: SourceId,
        width: u32,
        height: u32,
        format: PixelFormat,
        rgba8_premul: Vec<u8>,
    ) -> StrataResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| StrataError::decode("image buffer size overflow"))?;
        if width == 0 || height == 0 {
            return Err(StrataError::decode(format!(
                "image {source} has zero dimensions"
            )));
        }
        if rgba8_premul.len() != expected {
            return Err(StrataError::decode(format!(
                "image {source} expects {expected} bytes, got {}",
                rgba8_premul.len()
            )));
        }
        Ok(Self {
            source,
            width,
            height,
            format,
            rgba8_premul,
        })
    }

    /// Take ownership of a straight-alpha `image` buffer and premultiply it.
    pub fn from_rgba_image(
        source: SourceId,
        img: image::RgbaImage,
        format: PixelFormat,
    ) -> StrataResult<Self> {
        let (width, height) = img.dimensions();
        let mut data = img.into_raw();
        premultiply_rgba8_in_place(&mut data);
        Self::from_premul(source, width, height, format, data)
    }

    /// Solid opaque image, used for neutral fills.
    pub fn solid(source: SourceId, width: u32, height: u32, color: Rgb8) -> StrataResult<Self> {
        let px = color.to_premul();
        let data = px.repeat((width as usize).saturating_mul(height as usize));
        Self::from_premul(source, width, height, PixelFormat::Rgb8, data)
    }

    /// Where the pixels came from.
    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Dimensions as a [`Canvas`].
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    /// Layout of the source this asset was decoded from.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Premultiplied RGBA8 bytes.
    pub fn premul_bytes(&self) -> &[u8] {
        &self.rgba8_premul
    }

    /// Premultiplied pixel at `(x, y)`; transparent outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0, 0];
        }
        let idx = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [
            self.rgba8_premul[idx],
            self.rgba8_premul[idx + 1],
            self.rgba8_premul[idx + 2],
            self.rgba8_premul[idx + 3],
        ]
    }

    /// Release the pixel buffer.
    pub fn into_premul_bytes(self) -> Vec<u8> {
        self.rgba8_premul
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
