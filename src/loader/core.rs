use crate::result::VolResult;
use std::path::Path;

pub const SUPPORTED_EXTENSIONS: [&str; 16] = [
    ".PNG", ".png", ".JPG", ".jpg", ".JPEG", ".jpeg", ".GIF", ".gif", ".BMP", ".bmp", ".WEBP",
    ".webp", ".TIF", ".tif", ".TIFF", ".tiff",
];
pub const ARCHIVE_EXTENSIONS: [&str; 4] = [".ZIP", ".zip", ".CBZ", ".cbz"];

fn has_extension_of(name: &str, extensions: &[&str]) -> bool {
    match Path::new(name).extension() {
        Some(ext) => extensions.iter().any(|sup| Some(&sup[1..]) == ext.to_str()),
        None => false,
    }
}

pub fn is_supported_image(name: &str) -> bool {
    has_extension_of(name, &SUPPORTED_EXTENSIONS)
}

pub fn is_archive_path(path: &str) -> bool {
    has_extension_of(path, &ARCHIVE_EXTENSIONS)
}

/// Uniform access to one container of image entries, either a folder on disk
/// or an archive file. Implementations are shared across decode worker
/// threads, concurrent [`load`](VolumeLoader::load) calls have to be safe.
pub trait VolumeLoader: Send + Sync {
    /// Whether the container is an archive file rather than a folder.
    fn is_archive(&self) -> bool;
    /// Identity of the container as it appears in composite entry paths.
    fn volume_path(&self) -> &str;
    /// Location of the container on the file system.
    fn real_volume_path(&self) -> &str {
        self.volume_path()
    }
    /// Names of all supported image entries, in container order.
    fn entries(&self) -> VolResult<Vec<String>>;
    /// Raw encoded bytes of the entry called `name`.
    fn load(&self, name: &str) -> VolResult<Vec<u8>>;
}

#[test]
fn test_extensions() {
    assert!(is_supported_image("page1.png"));
    assert!(is_supported_image("PAGE1.PNG"));
    assert!(is_supported_image("spread.jpeg"));
    assert!(!is_supported_image("notes.txt"));
    assert!(!is_supported_image("pagepng"));
    assert!(is_archive_path("book.zip"));
    assert!(is_archive_path("book.CBZ"));
    assert!(!is_archive_path("book.rar"));
    assert!(!is_archive_path("book.zip.txt"));
}
