use std::io::Cursor;

use super::*;

fn png_bytes(w: u32, h: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(w, h, image::Rgb(rgb));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

#[test]
fn handles_carry_ids_and_paths() {
    let h = SourceHandle::from_path("in/a.png", ImageCategory::Photo);
    assert_eq!(h.id, SourceId::Path("in/a.png".into()));
    assert_eq!(h.path(), Some(Path::new("in/a.png")));

    let h = SourceHandle::from_bytes(3, vec![1u8, 2, 3], ImageCategory::Default);
    assert_eq!(h.id, SourceId::Index(3));
    assert!(h.path().is_none());
}

#[test]
fn loader_decodes_bytes_and_files() {
    let loader = DecodeLoader::new(None);
    let bytes = png_bytes(5, 4, [10, 20, 30]);

    let asset = loader
        .load(&SourceHandle::from_bytes(0, bytes.clone(), ImageCategory::Default))
        .unwrap();
    assert_eq!((asset.width(), asset.height()), (5, 4));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x.png");
    std::fs::write(&path, &bytes).unwrap();
    let asset = loader
        .load(&SourceHandle::from_path(&path, ImageCategory::Default))
        .unwrap();
    assert_eq!(asset.source(), &SourceId::Path(path));
}

#[test]
fn loader_applies_width_limit_from_config() {
    let cfg = TransformConfig {
        max_source_width: Some(4),
        ..TransformConfig::default()
    };
    let asset = DecodeLoader::from_config(&cfg)
        .load(&SourceHandle::from_bytes(
            0,
            png_bytes(8, 8, [1, 1, 1]),
            ImageCategory::Default,
        ))
        .unwrap();
    assert_eq!((asset.width(), asset.height()), (4, 4));
}

#[test]
fn missing_file_is_decode_error() {
    let err = DecodeLoader::default()
        .load(&SourceHandle::from_path(
            "/definitely/not/here.png",
            ImageCategory::Default,
        ))
        .unwrap_err();
    assert!(matches!(err, StrataError::Decode(_)));
}

#[test]
fn discover_filters_and_sorts() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.PNG", "a.jpg", "notes.txt", "c.webp"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }
    std::fs::create_dir(dir.path().join("sub.png")).unwrap();

    let found = discover_sources(dir.path(), ImageCategory::Screenshot).unwrap();
    let names: Vec<String> = found.iter().map(|h| h.id.stem()).collect();
    assert_eq!(names, ["a", "b", "c"]);
    assert!(found.iter().all(|h| h.category == ImageCategory::Screenshot));
}

#[test]
fn discover_missing_dir_is_configuration_error() {
    let err = discover_sources(Path::new("/no/such/dir"), ImageCategory::Default).unwrap_err();
    assert!(matches!(err, StrataError::Configuration(_)));
}
