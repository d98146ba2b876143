mod archive_loader;
mod core;
mod directory_loader;

pub use archive_loader::{write_test_archive, ArchiveLoader};
pub use core::{
    is_archive_path, is_supported_image, VolumeLoader, ARCHIVE_EXTENSIONS, SUPPORTED_EXTENSIONS,
};
pub use directory_loader::DirectoryLoader;
