use anyhow::Context;
use image::imageops::FilterType;

use crate::foundation::core::{ImageAsset, PixelFormat, SourceId};
use crate::foundation::error::{StrataError, StrataResult};

/// Decode an encoded image into a premultiplied [`ImageAsset`].
///
/// Images wider than `max_width` are resampled (Lanczos3) to that width, keeping the aspect
/// ratio.
pub fn decode_image(
    bytes: &[u8],
    source: SourceId,
    max_width: Option<u32>,
) -> StrataResult<ImageAsset> {
    let dyn_img = image::load_from_memory(bytes)
        .context("decode image from memory")
        .map_err(|e| StrataError::decode(format!("{source}: {e:#}")))?;
    let format = if dyn_img.color().has_alpha() {
        PixelFormat::Rgba8
    } else {
        PixelFormat::Rgb8
    };

    let dyn_img = match max_width {
        Some(max) if dyn_img.width() > max => {
            let height = ((f64::from(dyn_img.height()) * f64::from(max)
                / f64::from(dyn_img.width()))
            .round() as u32)
                .max(1);
            tracing::debug!(
                %source,
                from = dyn_img.width(),
                to = max,
                "downscaling wide source"
            );
            dyn_img.resize_exact(max, height, FilterType::Lanczos3)
        }
        _ => dyn_img,
    };

    ImageAsset::from_rgba_image(source, dyn_img.to_rgba8(), format)
}
