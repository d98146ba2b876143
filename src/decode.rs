use crate::{
    loader::VolumeLoader,
    result::{to_vol, VolErrorKind, VolResult},
    types::{ImageContent, ImageInfo, Shape},
    volerr,
};
use image::{
    imageops::FilterType, metadata::Orientation, DynamicImage, ImageBuffer, ImageDecoder,
    ImageFormat, ImageReader, Rgb,
};
use std::io::Cursor;

/// Reads the raw bytes of `name` through the loader and decodes them.
/// This is what decode jobs scheduled by the cache run on a worker thread.
pub fn load_image_content(
    loader: &dyn VolumeLoader,
    name: &str,
    path: &str,
    max_import_dim: Option<u32>,
) -> VolResult<ImageContent> {
    let bytes = loader.load(name)?;
    decode_image_content(&bytes, path, max_import_dim)
}

/// Decodes one page from its encoded bytes. The format is guessed from the
/// byte stream, the extension of `path` plays no role. With `max_import_dim`
/// set, images larger than that in any dimension are downscaled on import
/// while `base_size` keeps the encoded dimensions.
pub fn decode_image_content(
    bytes: &[u8],
    path: &str,
    max_import_dim: Option<u32>,
) -> VolResult<ImageContent> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(to_vol(VolErrorKind::DecodeFailure))?;
    let format = reader.format();
    let mut decoder = reader.into_decoder().map_err(|e| {
        volerr!(
            VolErrorKind::DecodeFailure,
            "could not decode {:?} due to {:?}",
            path,
            e
        )
    })?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let (w, h) = decoder.dimensions();
    let base_size = Shape::new(w, h);
    let im = DynamicImage::from_decoder(decoder).map_err(|e| {
        volerr!(
            VolErrorKind::DecodeFailure,
            "could not decode {:?} due to {:?}",
            path,
            e
        )
    })?;
    let im = match max_import_dim {
        Some(d) if base_size.w > d || base_size.h > d => im.resize(d, d, FilterType::Lanczos3),
        _ => im,
    };
    let info = ImageInfo {
        format,
        orientation,
        n_bytes: bytes.len() as u64,
    };
    Ok(ImageContent::new(im, path, base_size, info))
}

/// Encoded all-black PNG of the given dimensions, meant for test fixtures.
pub fn encode_test_png(w: u32, h: u32) -> Vec<u8> {
    let im = DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, Vec<u8>>::new(w, h));
    let mut buf = Cursor::new(Vec::new());
    im.write_to(&mut buf, ImageFormat::Png)
        .expect("png encoding to memory does not fail");
    buf.into_inner()
}

#[test]
fn test_decode() {
    let bytes = encode_test_png(64, 32);
    let content = decode_image_content(&bytes, "somefolder/page1.png", None).unwrap();
    assert_eq!(content.base_size(), Shape::new(64, 32));
    assert_eq!(content.import_size(), Shape::new(64, 32));
    assert_eq!(content.path(), "somefolder/page1.png");
    assert_eq!(content.info().format, Some(ImageFormat::Png));
    assert_eq!(content.info().orientation, Orientation::NoTransforms);
    assert_eq!(content.info().n_bytes, bytes.len() as u64);
    assert!(content.is_wide());
}
#[test]
fn test_decode_failure() {
    let e = decode_image_content(b"these are no pixels", "nope.png", None).unwrap_err();
    assert_eq!(e.kind(), VolErrorKind::DecodeFailure);
    let e = decode_image_content(&[], "empty.png", None).unwrap_err();
    assert_eq!(e.kind(), VolErrorKind::DecodeFailure);
}
#[test]
fn test_decode_downscale() {
    let bytes = encode_test_png(64, 32);
    let content = decode_image_content(&bytes, "page1.png", Some(16)).unwrap();
    assert_eq!(content.base_size(), Shape::new(64, 32));
    assert_eq!(content.import_size(), Shape::new(16, 8));
    assert!(content.is_wide());
    // small enough images stay untouched
    let content = decode_image_content(&bytes, "page1.png", Some(1000)).unwrap();
    assert_eq!(content.import_size(), Shape::new(64, 32));
}
