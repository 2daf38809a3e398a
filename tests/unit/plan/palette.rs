use rand::SeedableRng;
use rand::rngs::StdRng;

use super::*;
use crate::foundation::core::{PixelFormat, SourceId};
use crate::foundation::math::hue_distance;

fn solid(w: u32, h: u32, c: Rgb8) -> ImageAsset {
    ImageAsset::solid(SourceId::Index(0), w, h, c).unwrap()
}

#[test]
fn hsl_conversion_matches_primaries() {
    let red = rgb_to_hsl(Rgb8::new(255, 0, 0));
    assert_eq!((red.h, red.s, red.l), (0.0, 1.0, 0.5));
    let blue = rgb_to_hsl(Rgb8::new(0, 0, 255));
    assert!((blue.h - 240.0).abs() < 1e-9);
    assert_eq!(hsl_to_rgb(Hsl { h: 120.0, s: 1.0, l: 0.5 }), Rgb8::new(0, 255, 0));
    assert_eq!(hsl_to_rgb(Hsl { h: 10.0, s: 0.0, l: 0.5 }), Rgb8::new(128, 128, 128));

    let teal = Rgb8::new(30, 160, 150);
    let back = hsl_to_rgb(rgb_to_hsl(teal));
    assert!((i32::from(back.g) - 160).abs() <= 1);
}

#[test]
fn single_color_palette_stays_near_its_hue() {
    let cfg = HarmonyConfig::default();
    let img = solid(40, 30, Rgb8::new(200, 40, 40));
    let source_hue = rgb_to_hsl(Rgb8::new(200, 40, 40)).h;

    for seed in 0..50u64 {
        let p = ColorHarmonizer::derive_palette(&img, 3, &cfg, &mut StdRng::seed_from_u64(seed));
        assert_eq!(p.colors.len(), 3);
        assert!(!p.is_neutral());
        for c in &p.colors {
            let h = rgb_to_hsl(*c).h;
            assert!(
                hue_distance(h, source_hue) <= cfg.max_hue_distance,
                "seed {seed}: hue {h} too far from {source_hue}"
            );
        }
    }
}

#[test]
fn rounded_palette_colors_never_leave_their_cluster() {
    for max in [30.0, 2.0] {
        let cfg = HarmonyConfig {
            max_hue_distance: max,
            ..HarmonyConfig::default()
        };
        for source in [
            Rgb8::new(200, 40, 40),
            Rgb8::new(30, 160, 150),
            Rgb8::new(90, 60, 210),
        ] {
            let img = solid(12, 12, source);
            for seed in 0..2000u64 {
                let mut rng = StdRng::seed_from_u64(seed);
                let p = ColorHarmonizer::derive_palette(&img, 3, &cfg, &mut rng);
                for c in &p.colors {
                    let h = rgb_to_hsl(*c).h;
                    let nearest = p
                        .dominant_hues
                        .iter()
                        .map(|d| hue_distance(h, *d))
                        .fold(f64::INFINITY, f64::min);
                    assert!(
                        nearest <= max,
                        "seed {seed}: {c:?} is {nearest} degrees from its cluster (max {max})"
                    );
                }
            }
        }
    }
}

#[test]
fn gray_input_yields_neutral_palette() {
    let cfg = HarmonyConfig::default();
    let img = solid(16, 16, Rgb8::new(120, 120, 120));
    let p = ColorHarmonizer::derive_palette(&img, 2, &cfg, &mut StdRng::seed_from_u64(3));
    assert!(p.is_neutral());
    assert_eq!(p.colors.len(), 2);
    assert!(p.colors.iter().all(|c| c.r == c.g && c.g == c.b));
}

#[test]
fn transparent_input_yields_neutral_palette() {
    let cfg = HarmonyConfig::default();
    let img = ImageAsset::from_premul(
        SourceId::Index(1),
        8,
        8,
        PixelFormat::Rgba8,
        vec![0; 8 * 8 * 4],
    )
    .unwrap();
    let p = ColorHarmonizer::derive_palette(&img, 3, &cfg, &mut StdRng::seed_from_u64(0));
    assert!(p.is_neutral());
    assert!(p.colors.iter().all(|c| c.r == c.g && c.g == c.b));
}

#[test]
fn two_color_image_has_two_clusters() {
    // Left half green, right half blue; the right half is slightly larger.
    let (w, h) = (33u32, 16u32);
    let mut img = image::RgbaImage::new(w, h);
    for (x, _, px) in img.enumerate_pixels_mut() {
        *px = if x < 15 {
            image::Rgba([20, 200, 40, 255])
        } else {
            image::Rgba([30, 60, 220, 255])
        };
    }
    let asset = ImageAsset::from_rgba_image(SourceId::Index(2), img, PixelFormat::Rgb8).unwrap();
    let hues = ColorHarmonizer::dominant_hues(&asset, &HarmonyConfig::default());
    assert_eq!(hues.len(), 2);
    assert!(hue_distance(hues[0], rgb_to_hsl(Rgb8::new(30, 60, 220)).h) < 1.0);
    assert!(hue_distance(hues[1], rgb_to_hsl(Rgb8::new(20, 200, 40)).h) < 1.0);
}

#[test]
fn red_wraparound_uses_circular_mean() {
    // Hues near 355 and 5 degrees average to 0, not 180.
    let cfg = HarmonyConfig {
        hue_buckets: 1,
        dominant_clusters: 1,
        ..HarmonyConfig::default()
    };
    let mut img = image::RgbaImage::new(2, 1);
    img.put_pixel(0, 0, image::Rgba([255, 0, 22, 255]));
    img.put_pixel(1, 0, image::Rgba([255, 22, 0, 255]));
    let asset = ImageAsset::from_rgba_image(SourceId::Index(3), img, PixelFormat::Rgb8).unwrap();
    let hues = ColorHarmonizer::dominant_hues(&asset, &cfg);
    assert_eq!(hues.len(), 1);
    assert!(hue_distance(hues[0], 0.0) < 1.0);
}

#[test]
fn palette_is_deterministic_per_seed() {
    let cfg = HarmonyConfig::default();
    let img = solid(10, 10, Rgb8::new(10, 120, 200));
    let a = ColorHarmonizer::derive_palette(&img, 3, &cfg, &mut StdRng::seed_from_u64(77));
    let b = ColorHarmonizer::derive_palette(&img, 3, &cfg, &mut StdRng::seed_from_u64(77));
    assert_eq!(a, b);
}
