use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::assets::decode::decode_image;
use crate::config::category::ImageCategory;
use crate::config::transform::TransformConfig;
use crate::foundation::core::{ImageAsset, SourceId};
use crate::foundation::error::{StrataError, StrataResult};

/// File extensions picked up when scanning a directory.
pub const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "bmp", "gif", "webp", "tif", "tiff"];

/// Where a source's encoded bytes live.
#[derive(Clone, Debug)]
pub enum SourceData {
    /// Read from disk at load time.
    Path(PathBuf),
    /// Already in memory.
    Bytes(Arc<[u8]>),
}

/// One submitted source image. Cheap to clone; pixels are only decoded by a [`SourceLoader`].
#[derive(Clone, Debug)]
pub struct SourceHandle {
    /// Identifier carried into reports and output names.
    pub id: SourceId,
    /// Encoded bytes or their location.
    pub data: SourceData,
    /// Selects the rotation bound.
    pub category: ImageCategory,
}

impl SourceHandle {
    /// Source backed by a file.
    pub fn from_path(path: impl Into<PathBuf>, category: ImageCategory) -> Self {
        let path = path.into();
        Self {
            id: SourceId::Path(path.clone()),
            data: SourceData::Path(path),
            category,
        }
    }

    /// Source backed by in-memory bytes, identified by its batch index.
    pub fn from_bytes(index: usize, bytes: impl Into<Arc<[u8]>>, category: ImageCategory) -> Self {
        Self {
            id: SourceId::Index(index),
            data: SourceData::Bytes(bytes.into()),
            category,
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.data {
            SourceData::Path(p) => Some(p.as_path()),
            SourceData::Bytes(_) => None,
        }
    }
}

/// Turns a [`SourceHandle`] into decoded pixels.
pub trait SourceLoader: Send + Sync {
    /// Read and decode one source.
    fn load(&self, handle: &SourceHandle) -> StrataResult<ImageAsset>;
}

/// Default loader: reads files or bytes and decodes them with the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodeLoader {
    max_source_width: Option<u32>,
}

impl DecodeLoader {
    /// Loader that downscales sources wider than `max_source_width`.
    pub fn new(max_source_width: Option<u32>) -> Self {
        Self { max_source_width }
    }

    /// Loader matching `config.max_source_width`.
    pub fn from_config(config: &TransformConfig) -> Self {
        Self::new(config.max_source_width)
    }
}

impl SourceLoader for DecodeLoader {
    fn load(&self, handle: &SourceHandle) -> StrataResult<ImageAsset> {
        match &handle.data {
            SourceData::Path(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("read source bytes from '{}'", path.display()))
                    .map_err(|e| StrataError::decode(format!("{e:#}")))?;
                decode_image(&bytes, handle.id.clone(), self.max_source_width)
            }
            SourceData::Bytes(bytes) => {
                decode_image(bytes, handle.id.clone(), self.max_source_width)
            }
        }
    }
}

/// Image files directly inside `dir`, sorted by file name.
pub fn discover_sources(dir: &Path, category: ImageCategory) -> StrataResult<Vec<SourceHandle>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("read input directory '{}'", dir.display()))
        .map_err(|e| StrataError::configuration(format!("{e:#}")))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("list input directory '{}'", dir.display()))
            .map_err(|e| StrataError::configuration(format!("{e:#}")))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths
        .into_iter()
        .map(|p| SourceHandle::from_path(p, category))
        .collect())
}

#[cfg(test)]
#[path = "../../tests/unit/assets/source.rs"]
mod tests;
