pub mod cache;
pub mod cfg;
pub mod decode;
pub mod file_util;
pub mod loader;
pub mod result;
mod threadpool;
pub mod tracing_setup;
mod types;
mod util;
pub mod volume;
pub use types::{ImageContent, ImageInfo, ResultContent, Shape};
pub use util::natural_cmp;
pub use volume::{
    create_volume, create_volume_with_only_cover, full_path_to_sub_file_path,
    full_path_to_volume_path, CacheMode, VolumeNavigator, VOLUME_SEPARATOR,
};
