mod core;
mod decode_cache;

pub use self::core::DecodeHandle;
pub use decode_cache::{CacheCfgArgs, DecodeCache, PREFETCH_DELAY};
