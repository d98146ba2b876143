mod factory;
mod navigator;

/// Separates the volume path from the entry name in a composite path,
/// e.g. `/books/vol.cbz::art/p1.png`.
pub const VOLUME_SEPARATOR: &str = "::";

pub use factory::{
    create_volume, create_volume_with_only_cover, full_path_to_sub_file_path,
    full_path_to_volume_path,
};
pub use navigator::{CacheMode, VolumeNavigator};
