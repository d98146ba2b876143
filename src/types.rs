use crate::{file_util::format_n_bytes, result::VolResult};
use image::{metadata::Orientation, DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Debug, Display, Formatter},
    sync::Arc,
};

/// Pixel dimensions of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Shape {
    pub w: u32,
    pub h: u32,
}
impl Shape {
    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }
    pub fn from_im<I>(im: &I) -> Self
    where
        I: GenericImageView,
    {
        Self {
            w: im.width(),
            h: im.height(),
        }
    }
}
impl Display for Shape {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.w, self.h)
    }
}

/// Metadata gathered while decoding a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    /// Container format as guessed from the byte stream, if any format matched.
    pub format: Option<ImageFormat>,
    /// EXIF orientation found in the stream, `NoTransforms` if there was none.
    pub orientation: Orientation,
    /// Size of the encoded entry in bytes.
    pub n_bytes: u64,
}
impl Display for ImageInfo {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.format {
            Some(format) => write!(f, "{format:?}")?,
            None => write!(f, "unknown format")?,
        }
        write!(f, ", {}", format_n_bytes(self.n_bytes))?;
        if self.orientation != Orientation::NoTransforms {
            write!(f, ", {:?}", self.orientation)?;
        }
        Ok(())
    }
}

/// One decoded page. The pixel data is shared, clones are cheap and hand the
/// same decode result to every consumer.
#[derive(Clone)]
pub struct ImageContent {
    image: Arc<DynamicImage>,
    base_size: Shape,
    import_size: Shape,
    path: String,
    info: ImageInfo,
}
impl ImageContent {
    pub fn new(image: DynamicImage, path: &str, base_size: Shape, info: ImageInfo) -> Self {
        let import_size = Shape::from_im(&image);
        ImageContent {
            image: Arc::new(image),
            base_size,
            import_size,
            path: path.to_string(),
            info,
        }
    }
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
    /// Dimensions as encoded in the source, before any import-time downscaling.
    pub fn base_size(&self) -> Shape {
        self.base_size
    }
    /// Dimensions of the pixel data held by [`Self::image`](Self::image).
    pub fn import_size(&self) -> Shape {
        self.import_size
    }
    /// Full path of the page, for archive entries in the
    /// `<container>::<entry>` form.
    pub fn path(&self) -> &str {
        &self.path
    }
    pub fn info(&self) -> &ImageInfo {
        &self.info
    }
    /// True for landscape-oriented pages, e.g. double page spreads in a book
    /// of portrait pages.
    pub fn is_wide(&self) -> bool {
        self.base_size.w > self.base_size.h
    }
}
impl Debug for ImageContent {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("ImageContent")
            .field("path", &self.path)
            .field("base_size", &self.base_size)
            .field("import_size", &self.import_size)
            .field("info", &self.info)
            .finish()
    }
}

/// Outcome of decoding one page.
pub type ResultContent = VolResult<ImageContent>;

#[cfg(test)]
use image::{ImageBuffer, Rgb};

#[test]
fn test_shape() {
    let im = DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, Vec<u8>>::new(32, 16));
    assert_eq!(Shape::from_im(&im), Shape::new(32, 16));
    assert_eq!(format!("{}", Shape::new(640, 480)), "640x480");
}
#[test]
fn test_wide() {
    let mk = |w, h| {
        let im = DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, Vec<u8>>::new(w, h));
        let info = ImageInfo {
            format: Some(ImageFormat::Png),
            orientation: Orientation::NoTransforms,
            n_bytes: 0,
        };
        ImageContent::new(im, "page.png", Shape::new(w, h), info)
    };
    assert!(mk(64, 32).is_wide());
    assert!(!mk(32, 64).is_wide());
    assert!(!mk(32, 32).is_wide());
}
#[test]
fn test_info_display() {
    let info = ImageInfo {
        format: Some(ImageFormat::Png),
        orientation: Orientation::NoTransforms,
        n_bytes: 512,
    };
    assert_eq!(format!("{info}"), "Png, 512b");
    let info = ImageInfo {
        format: None,
        orientation: Orientation::Rotate90,
        n_bytes: 2048,
    };
    assert_eq!(format!("{info}"), "unknown format, 2.000kb, Rotate90");
}
