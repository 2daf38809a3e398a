use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::ImageEncoder as _;
use serde::{Deserialize, Serialize};

use crate::foundation::core::{PixelFormat, SourceId};
use crate::foundation::error::{StrataError, StrataResult};
use crate::plan::TransformationPlan;
use crate::render::compositor::CompositeOutput;

/// A finished composite on its way to the sink.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositeResult {
    /// Submission index.
    pub index: usize,
    /// Source the foreground came from.
    pub source: SourceId,
    /// Flattened pixels.
    pub output: CompositeOutput,
    /// Plan that produced the pixels.
    pub plan: TransformationPlan,
}

impl CompositeResult {
    /// A background layer was substituted.
    pub fn degraded(&self) -> bool {
        self.output.degraded
    }
}

/// Persists composites. Called concurrently from workers.
///
/// Errors classified as batch-fatal (`ResourceExhaustion`) stop the batch; anything else fails
/// only the current item.
pub trait ResultSink: Send + Sync {
    /// Called once before the first item. Fails when the destination cannot take writes.
    fn prepare(&self) -> StrataResult<()> {
        Ok(())
    }

    /// Store one composite. Returns the written location, if the sink has one.
    fn persist(&self, result: &CompositeResult) -> StrataResult<Option<PathBuf>>;

    /// Called once after the last item was reported.
    fn finish(&self) -> StrataResult<()> {
        Ok(())
    }
}

/// Encoded file format written by [`DirectorySink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputEncoding {
    /// Lossless PNG.
    Png,
    /// JPEG at the given quality (1..=100). Alpha is dropped.
    Jpeg {
        /// Encoder quality.
        quality: u8,
    },
}

impl Default for OutputEncoding {
    fn default() -> Self {
        Self::Jpeg { quality: 95 }
    }
}

impl OutputEncoding {
    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
        }
    }
}

/// Writes `<stem>_transformed.<ext>` files into one directory.
///
/// Names are claimed with create-new semantics; a taken name gets a `-N` suffix, so concurrent
/// workers never overwrite each other or pre-existing files.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    encoding: OutputEncoding,
    suffix: String,
}

const MAX_NAME_ATTEMPTS: usize = 10_000;

impl DirectorySink {
    /// Sink writing into `dir` (created on [`ResultSink::prepare`]).
    pub fn new(dir: impl Into<PathBuf>, encoding: OutputEncoding) -> Self {
        Self {
            dir: dir.into(),
            encoding,
            suffix: "_transformed".to_owned(),
        }
    }

    /// Replace the `_transformed` name suffix.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Destination directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidate(&self, stem: &str, attempt: usize) -> PathBuf {
        let ext = self.encoding.extension();
        let name = if attempt == 0 {
            format!("{stem}{}.{ext}", self.suffix)
        } else {
            format!("{stem}{}-{attempt}.{ext}", self.suffix)
        };
        self.dir.join(name)
    }

    fn claim(&self, stem: &str) -> StrataResult<(PathBuf, File)> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.candidate(stem, attempt);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(classify_io(&self.dir, &path, e)),
            }
        }
        Err(StrataError::persist(format!(
            "no free output name for '{stem}' after {MAX_NAME_ATTEMPTS} attempts"
        )))
    }

    fn encode<W: Write>(
        &self,
        writer: W,
        path: &Path,
        output: &CompositeOutput,
    ) -> StrataResult<()> {
        let mut out = ErrorTap::new(BufWriter::new(writer));
        let (w, h) = (output.width, output.height);
        let encoded = match self.encoding {
            OutputEncoding::Png => {
                let color = match output.format {
                    PixelFormat::Rgb8 => image::ExtendedColorType::Rgb8,
                    PixelFormat::Rgba8 => image::ExtendedColorType::Rgba8,
                };
                image::codecs::png::PngEncoder::new(&mut out).write_image(&output.data, w, h, color)
            }
            OutputEncoding::Jpeg { quality } => {
                let rgb;
                let data = match output.format {
                    PixelFormat::Rgb8 => &output.data,
                    PixelFormat::Rgba8 => {
                        rgb = output
                            .data
                            .chunks_exact(4)
                            .flat_map(|px| [px[0], px[1], px[2]])
                            .collect::<Vec<u8>>();
                        &rgb
                    }
                };
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
                    .write_image(data, w, h, image::ExtendedColorType::Rgb8)
            }
        };
        if let Err(e) = encoded {
            return Err(match out.take_error() {
                Some(io) => classify_io(&self.dir, path, io),
                None => StrataError::persist(format!("encode '{}': {e}", path.display())),
            });
        }
        out.flush().map_err(|e| classify_io(&self.dir, path, e))
    }
}

/// Keeps the kind of the first IO error; the PNG encoder reports write failures as
/// `ErrorKind::Other`.
struct ErrorTap<W> {
    inner: W,
    error: Option<(ErrorKind, String)>,
}

impl<W: Write> ErrorTap<W> {
    fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    fn record<T>(&mut self, res: std::io::Result<T>) -> std::io::Result<T> {
        if let Err(e) = &res {
            self.error.get_or_insert_with(|| (e.kind(), e.to_string()));
        }
        res
    }

    fn take_error(&mut self) -> Option<std::io::Error> {
        self.error
            .take()
            .map(|(kind, msg)| std::io::Error::new(kind, msg))
    }
}

impl<W: Write> Write for ErrorTap<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let res = self.inner.write(buf);
        self.record(res)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let res = self.inner.flush();
        self.record(res)
    }
}

fn classify_io(dir: &Path, path: &Path, e: std::io::Error) -> StrataError {
    match e.kind() {
        ErrorKind::PermissionDenied
        | ErrorKind::NotFound
        | ErrorKind::ReadOnlyFilesystem
        | ErrorKind::StorageFull
        | ErrorKind::QuotaExceeded => StrataError::resource_exhaustion(format!(
            "destination '{}' is not writable: {e}",
            dir.display()
        )),
        _ => StrataError::persist(format!("write '{}': {e}", path.display())),
    }
}

impl ResultSink for DirectorySink {
    fn prepare(&self) -> StrataResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            StrataError::resource_exhaustion(format!(
                "create destination '{}': {e}",
                self.dir.display()
            ))
        })?;
        let marker = self
            .dir
            .join(format!(".strata-write-check-{}", std::process::id()));
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&marker)
            .map_err(|e| classify_io(&self.dir, &marker, e))?;
        let _ = std::fs::remove_file(&marker);
        Ok(())
    }

    fn persist(&self, result: &CompositeResult) -> StrataResult<Option<PathBuf>> {
        let (path, file) = self.claim(&result.source.stem())?;
        if let Err(e) = self.encode(file, &path, &result.output) {
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }
        tracing::debug!(index = result.index, path = %path.display(), "composite written");
        Ok(Some(path))
    }
}

/// Keeps composites in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemorySink {
    results: Mutex<Vec<CompositeResult>>,
}

impl InMemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored composites ordered by submission index.
    pub fn results(&self) -> Vec<CompositeResult> {
        let mut out = match self.results.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        out.sort_by_key(|r| r.index);
        out
    }

    /// Number of stored composites.
    pub fn len(&self) -> usize {
        match self.results.lock() {
            Ok(g) => g.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// `true` when nothing was stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultSink for InMemorySink {
    fn persist(&self, result: &CompositeResult) -> StrataResult<Option<PathBuf>> {
        self.results
            .lock()
            .map_err(|_| StrataError::persist("in-memory sink lock poisoned"))?
            .push(result.clone());
        Ok(None)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/batch/sink.rs"]
mod tests;
