//! Strata turns a directory of images into layered composites.
//!
//! Every output is built from three layers: the source image as a jittered foreground, plus
//! two scaled and rotated background layers drawn from sibling images. A striped border in a
//! palette harmonized with the foreground's dominant hues frames the result, and a few accent
//! pixels are sprinkled on top.
//!
//! # Pipeline overview
//!
//! 1. **Load**: `SourceHandle -> ImageAsset` (decode, optional downscale, premultiply)
//! 2. **Plan**: `ImageAsset + seed -> TransformationPlan` (the only step touching random state)
//! 3. **Compose**: `TransformationPlan + layers -> CompositeOutput` (pure, deterministic)
//! 4. **Persist**: `CompositeResult -> ResultSink` (files, memory, or your own sink)
//!
//! [`BatchStreamProcessor`] drives the four steps over a batch with bounded concurrency and
//! yields one [`ItemReport`] per item, in submission order.
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Reproducible**: a batch seed fixes every plan, independent of the concurrency limit.
//! - **Bounded memory**: at most `concurrency_limit` items hold decoded pixels at once.
//! - **Premultiplied RGBA8** internally; outputs are flattened to straight RGB8 or RGBA8.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![allow(missing_docs_in_private_items)]

mod assets;
mod batch;
mod config;
mod foundation;
mod plan;
mod render;

pub use assets::backgrounds::{BackgroundSource, SiblingBackgrounds, StaticBackgrounds};
pub use assets::decode::decode_image;
pub use assets::source::{
    DecodeLoader, IMAGE_EXTENSIONS, SourceData, SourceHandle, SourceLoader, discover_sources,
};
pub use batch::job::{
    BatchJob, BatchProgress, BatchState, CancellationToken, ItemSeeds, ResidencyGauge,
    ResidencyGuard, item_seeds,
};
pub use batch::processor::{
    BatchStream, BatchStreamProcessor, BatchSummary, FatalError, ItemError, ItemReport,
    ItemStatus,
};
pub use batch::sink::{CompositeResult, DirectorySink, InMemorySink, OutputEncoding, ResultSink};
pub use config::category::{ImageCategory, RotationBound, RotationBounds};
pub use config::transform::{HarmonyConfig, MissingBackgroundPolicy, TransformConfig};
pub use foundation::core::{
    Affine, Canvas, ImageAsset, PixelFormat, Point, Rect, Rgb8, SourceId, Vec2,
};
pub use foundation::error::{StrataError, StrataResult};
pub use plan::geometry::{BackgroundPlacement, GeometryPlan, GeometryPlanner, PlacementRegion};
pub use plan::palette::{ColorHarmonizer, Hsl, Palette, hsl_to_rgb, rgb_to_hsl};
pub use plan::{AccentPixel, TransformPlanner, TransformationPlan};
pub use render::compositor::{CompositeOutput, LayerCompositor, LayerStack};
pub use render::raster::{Layer, MAX_SURFACE_PIXELS, PremulRgba8, Surface};
