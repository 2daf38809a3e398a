use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::transform::HarmonyConfig;
use crate::foundation::core::{ImageAsset, Rgb8};
use crate::foundation::math::{hue_distance, unpremultiply_px};

/// Border colors derived from a foreground.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    /// Colors in band order.
    pub colors: SmallVec<[Rgb8; 3]>,
    /// Dominant cluster hues (degrees) the colors were derived from. Empty for neutral palettes.
    pub dominant_hues: SmallVec<[f64; 4]>,
}

impl Palette {
    /// `true` when the palette was built from grays.
    pub fn is_neutral(&self) -> bool {
        self.dominant_hues.is_empty()
    }
}

/// HSL triple: hue in degrees, saturation and lightness in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hsl {
    /// Hue in `[0, 360)`.
    pub h: f64,
    /// Saturation.
    pub s: f64,
    /// Lightness.
    pub l: f64,
}

/// Convert an RGB color to HSL.
pub fn rgb_to_hsl(c: Rgb8) -> Hsl {
    let r = f64::from(c.r) / 255.0;
    let g = f64::from(c.g) / 255.0;
    let b = f64::from(c.b) / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    let d = max - min;
    if d <= f64::EPSILON {
        return Hsl { h: 0.0, s: 0.0, l };
    }
    let s = d / (1.0 - (2.0 * l - 1.0).abs());
    let h = if max == r {
        60.0 * ((g - b) / d).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / d + 2.0)
    } else {
        60.0 * ((r - g) / d + 4.0)
    };
    Hsl {
        h: h.rem_euclid(360.0),
        s: s.clamp(0.0, 1.0),
        l,
    }
}

/// Convert HSL back to an RGB color.
pub fn hsl_to_rgb(hsl: Hsl) -> Rgb8 {
    let h = hsl.h.rem_euclid(360.0) / 360.0;
    let s = hsl.s.clamp(0.0, 1.0);
    let l = hsl.l.clamp(0.0, 1.0);
    let to_u8 = |v: f64| (v * 255.0).round().clamp(0.0, 255.0) as u8;

    if s == 0.0 {
        let v = to_u8(l);
        return Rgb8::new(v, v, v);
    }

    fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        if t < 1.0 / 6.0 {
            return p + (q - p) * 6.0 * t;
        }
        if t < 1.0 / 2.0 {
            return q;
        }
        if t < 2.0 / 3.0 {
            return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
        }
        p
    }

    let q = if l < 0.5 {
        l * (1.0 + s)
    } else {
        l + s - l * s
    };
    let p = 2.0 * l - q;

    Rgb8::new(
        to_u8(hue_to_rgb(p, q, h + 1.0 / 3.0)),
        to_u8(hue_to_rgb(p, q, h)),
        to_u8(hue_to_rgb(p, q, h - 1.0 / 3.0)),
    )
}

#[derive(Clone, Copy, Default)]
struct HueBucket {
    count: u32,
    sin: f64,
    cos: f64,
}

// Lightness steps for successive palette entries; keeps adjacent bands distinguishable.
const LIGHTNESS_STEPS: [f64; 3] = [0.38, 0.56, 0.72];
const GRAY_STEPS: [u8; 3] = [96, 140, 184];

/// Derives border palettes in harmony with an image's dominant colors.
pub struct ColorHarmonizer;

impl ColorHarmonizer {
    /// Dominant hues of `image` (circular mean of each top bucket), most frequent first.
    ///
    /// Only a fixed grid of `sample_grid x sample_grid` points is inspected. Transparent and
    /// achromatic samples are dropped; an empty result means the image is effectively gray.
    pub fn dominant_hues(image: &ImageAsset, config: &HarmonyConfig) -> SmallVec<[f64; 4]> {
        let n = config.sample_grid.max(1);
        let buckets_n = config.hue_buckets.max(1) as usize;
        let bucket_width = 360.0 / buckets_n as f64;
        let (lmin, lmax) = config.lightness_bounds;
        let mut buckets = vec![HueBucket::default(); buckets_n];

        for gy in 0..n {
            let y = grid_coord(gy, n, image.height());
            for gx in 0..n {
                let x = grid_coord(gx, n, image.width());
                let px = unpremultiply_px(image.pixel(x, y));
                if px[3] < config.min_alpha {
                    continue;
                }
                let hsl = rgb_to_hsl(Rgb8::new(px[0], px[1], px[2]));
                if hsl.s < config.min_saturation || hsl.l < lmin || hsl.l > lmax {
                    continue;
                }
                let idx = ((hsl.h / bucket_width).floor() as usize).min(buckets_n - 1);
                let rad = hsl.h.to_radians();
                let b = &mut buckets[idx];
                b.count += 1;
                b.sin += rad.sin();
                b.cos += rad.cos();
            }
        }

        let mut ranked: Vec<(usize, HueBucket)> = buckets
            .into_iter()
            .enumerate()
            .filter(|(_, b)| b.count > 0)
            .collect();
        ranked.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.0.cmp(&b.0)));

        ranked
            .into_iter()
            .take(config.dominant_clusters)
            .map(|(_, b)| b.sin.atan2(b.cos).to_degrees().rem_euclid(360.0))
            .collect()
    }

    /// Build `palette_size` colors whose hues stay within `max_hue_distance` of a dominant
    /// cluster. Fully transparent or gray inputs yield a neutral gray palette.
    #[tracing::instrument(skip(image, config, rng), fields(source = %image.source()))]
    pub fn derive_palette<R: Rng + ?Sized>(
        image: &ImageAsset,
        palette_size: usize,
        config: &HarmonyConfig,
        rng: &mut R,
    ) -> Palette {
        let hues = Self::dominant_hues(image, config);
        let size = palette_size.clamp(1, 3);

        if hues.is_empty() {
            tracing::debug!("no chromatic samples, using neutral palette");
            let colors = (0..size)
                .map(|i| {
                    let v = GRAY_STEPS[i % GRAY_STEPS.len()].saturating_add(rng.gen_range(0..=16));
                    Rgb8::new(v, v, v)
                })
                .collect();
            return Palette {
                colors,
                dominant_hues: hues,
            };
        }

        let spread = config.max_hue_distance;
        let colors = (0..size)
            .map(|i| {
                let cluster = hues[i % hues.len()];
                let offset = rng.gen_range(-spread..=spread);
                let s = rng.gen_range(0.45..=0.85);
                let l = LIGHTNESS_STEPS[i % LIGHTNESS_STEPS.len()] + rng.gen_range(-0.04..=0.04);
                color_near(cluster, offset, s, l, spread)
            })
            .collect();

        Palette {
            colors,
            dominant_hues: hues,
        }
    }
}

/// Halvings of the hue offset tried before falling back to the cluster hue itself.
const HUE_PULLBACK_STEPS: usize = 8;

/// `cluster + offset` as RGB8, with the offset pulled back toward the cluster until the
/// rounded color's hue lies within `max` degrees of it. Rounding to u8 moves a hue by up to
/// about one degree at the saturation and lightness used here.
fn color_near(cluster: f64, offset: f64, s: f64, l: f64, max: f64) -> Rgb8 {
    let mut offset = offset;
    for _ in 0..HUE_PULLBACK_STEPS {
        let h = (cluster + offset).rem_euclid(360.0);
        let color = hsl_to_rgb(Hsl { h, s, l });
        if hue_distance(rgb_to_hsl(color).h, cluster) <= max {
            return color;
        }
        offset *= 0.5;
    }
    hsl_to_rgb(Hsl { h: cluster, s, l })
}

fn grid_coord(i: u32, n: u32, extent: u32) -> u32 {
    let v = (u64::from(i) * 2 + 1) * u64::from(extent) / (u64::from(n) * 2);
    (v as u32).min(extent.saturating_sub(1))
}

#[cfg(test)]
#[path = "../../tests/unit/plan/palette.rs"]
mod tests;
