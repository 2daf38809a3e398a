use smallvec::SmallVec;

use super::*;
use crate::config::category::ImageCategory;
use crate::foundation::core::Canvas;

fn result(index: usize, source: SourceId, format: PixelFormat) -> CompositeResult {
    let channels = format.channels();
    CompositeResult {
        index,
        source,
        output: CompositeOutput {
            width: 3,
            height: 2,
            format,
            data: vec![200; 3 * 2 * channels],
            degraded: false,
        },
        plan: TransformationPlan {
            category: ImageCategory::Default,
            canvas: Canvas {
                width: 3,
                height: 2,
            },
            scale_delta: 0.0,
            rotation_degrees: 0.0,
            border_palette: SmallVec::new(),
            accent_pixels: Vec::new(),
            backgrounds: SmallVec::new(),
        },
    }
}

#[test]
fn directory_sink_names_outputs_and_avoids_collisions() {
    let dir = tempfile::tempdir().unwrap();
    let sink = DirectorySink::new(dir.path().join("out"), OutputEncoding::Png);
    sink.prepare().unwrap();

    let r = result(0, SourceId::Path("in/cat.png".into()), PixelFormat::Rgb8);
    let first = sink.persist(&r).unwrap().unwrap();
    let second = sink.persist(&r).unwrap().unwrap();
    assert_eq!(first.file_name().unwrap(), "cat_transformed.png");
    assert_eq!(second.file_name().unwrap(), "cat_transformed-1.png");

    let decoded = image::open(&first).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (3, 2));

    // The writability check leaves nothing behind.
    let names: Vec<_> = std::fs::read_dir(sink.dir()).unwrap().collect();
    assert_eq!(names.len(), 2);
}

#[test]
fn jpeg_output_drops_alpha() {
    let dir = tempfile::tempdir().unwrap();
    let sink = DirectorySink::new(dir.path(), OutputEncoding::Jpeg { quality: 90 });
    sink.prepare().unwrap();
    let path = sink
        .persist(&result(4, SourceId::Index(4), PixelFormat::Rgba8))
        .unwrap()
        .unwrap();
    assert_eq!(path.file_name().unwrap(), "image_00004_transformed.jpg");
    let decoded = image::open(&path).unwrap();
    assert_eq!(decoded.color(), image::ColorType::Rgb8);
}

#[test]
fn custom_suffix_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let sink = DirectorySink::new(dir.path(), OutputEncoding::Png).with_suffix("_v");
    let path = sink
        .persist(&result(0, SourceId::Path("a.jpeg".into()), PixelFormat::Rgb8))
        .unwrap()
        .unwrap();
    assert_eq!(path.file_name().unwrap(), "a_v.png");
}

#[test]
fn unusable_destination_is_batch_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("occupied");
    std::fs::write(&file, b"x").unwrap();
    let err = DirectorySink::new(&file, OutputEncoding::Png)
        .prepare()
        .unwrap_err();
    assert!(err.is_batch_fatal());
}

struct FailingWriter(std::io::ErrorKind);

impl std::io::Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::from(self.0))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Err(std::io::Error::from(self.0))
    }
}

#[test]
fn full_disk_while_writing_is_batch_fatal() {
    use rand::{RngCore, SeedableRng};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x_transformed.png");

    // Noise does not compress, so the large output overflows the write buffer mid-encode.
    let mut large = result(1, SourceId::Index(1), PixelFormat::Rgb8);
    large.output.width = 128;
    large.output.height = 128;
    large.output.data = vec![0; 128 * 128 * 3];
    rand::rngs::StdRng::seed_from_u64(1).fill_bytes(&mut large.output.data);

    for encoding in [OutputEncoding::Png, OutputEncoding::Jpeg { quality: 80 }] {
        let sink = DirectorySink::new(dir.path(), encoding);
        for r in [result(0, SourceId::Index(0), PixelFormat::Rgb8), large.clone()] {
            let err = sink
                .encode(FailingWriter(std::io::ErrorKind::StorageFull), &path, &r.output)
                .unwrap_err();
            assert!(matches!(err, StrataError::ResourceExhaustion(_)), "{err}");
            assert!(err.is_batch_fatal());
        }
    }
}

#[test]
fn other_write_errors_fail_only_the_item() {
    let dir = tempfile::tempdir().unwrap();
    let sink = DirectorySink::new(dir.path(), OutputEncoding::Png);
    let r = result(0, SourceId::Index(0), PixelFormat::Rgb8);
    let err = sink
        .encode(
            FailingWriter(std::io::ErrorKind::BrokenPipe),
            &dir.path().join("y.png"),
            &r.output,
        )
        .unwrap_err();
    assert!(matches!(err, StrataError::Persist(_)), "{err}");
}

#[test]
fn in_memory_sink_orders_by_index() {
    let sink = InMemorySink::new();
    assert!(sink.is_empty());
    for i in [2usize, 0, 1] {
        assert_eq!(
            sink.persist(&result(i, SourceId::Index(i), PixelFormat::Rgb8))
                .unwrap(),
            None
        );
    }
    let idx: Vec<usize> = sink.results().iter().map(|r| r.index).collect();
    assert_eq!(idx, [0, 1, 2]);
    assert_eq!(OutputEncoding::default(), OutputEncoding::Jpeg { quality: 95 });
}
