use crate::{
    cache::CacheCfgArgs,
    file_util::{self, DEFAULT_HOMEDIR},
    result::{to_vol, VolErrorKind, VolResult},
    volerr,
    volume::CacheMode,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

const CFG_FILENAME: &str = "rvolume_cfg.toml";

const CFG_DEFAULT: &str = r#"
    cache_mode = "Normal"  # "Normal", "FastForward", "CoverOnly" or "NoAsync"
    # max_import_dim = 4096
    [cache]
    n_prev_pages = 2
    n_next_pages = 8
    n_threads = 2
    capacity = 16
    "#;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct VolumeCfg {
    #[serde(default)]
    pub cache_mode: CacheMode,
    /// Downscale pages larger than this in any dimension on import.
    #[serde(default)]
    pub max_import_dim: Option<u32>,
    #[serde(default)]
    pub cache: CacheCfgArgs,
}

pub fn get_default_cfg() -> VolumeCfg {
    toml::from_str(CFG_DEFAULT).expect("default config broken")
}

pub fn get_cfg_path() -> PathBuf {
    DEFAULT_HOMEDIR.join(CFG_FILENAME)
}

pub fn get_log_folder(home_folder: &Path) -> PathBuf {
    home_folder.join("logs")
}

pub fn read_cfg_gen(cfg_toml_path: &Path) -> VolResult<VolumeCfg> {
    if cfg_toml_path.exists() {
        let toml_str = file_util::read_to_string(cfg_toml_path)?;
        toml::from_str(&toml_str).map_err(|e| {
            volerr!(
                VolErrorKind::ReadFailure,
                "could not parse cfg due to {:?}",
                e
            )
        })
    } else {
        info!("cfg {cfg_toml_path:?} does not exist, using default cfg");
        Ok(get_default_cfg())
    }
}

pub fn read_cfg() -> VolResult<VolumeCfg> {
    read_cfg_gen(&get_cfg_path())
}

/// Like [`read_cfg`](read_cfg) but a broken cfg file only costs a warning.
pub fn get_cfg() -> VolumeCfg {
    match read_cfg() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("falling back to default cfg due to {e:?}");
            get_default_cfg()
        }
    }
}

pub fn write_cfg_str(cfg_str: &str, p: &Path) -> VolResult<()> {
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).map_err(to_vol(VolErrorKind::Internal))?;
    }
    file_util::write(p, cfg_str)?;
    info!("wrote cfg to {p:?}");
    Ok(())
}

pub fn write_cfg(cfg: &VolumeCfg) -> VolResult<()> {
    let cfg_str = toml::to_string_pretty(cfg).map_err(to_vol(VolErrorKind::Internal))?;
    write_cfg_str(&cfg_str, &get_cfg_path())
}

#[cfg(test)]
use crate::{defer_file_removal, file_util::DEFAULT_TMPDIR};

#[test]
fn test_default_cfg() {
    let cfg = get_default_cfg();
    assert_eq!(cfg.cache_mode, CacheMode::Normal);
    assert_eq!(cfg.max_import_dim, None);
    assert_eq!(cfg.cache, CacheCfgArgs::default());
}
#[test]
fn test_partial_cfg() {
    let cfg = toml::from_str::<VolumeCfg>("cache_mode = \"NoAsync\"").unwrap();
    assert_eq!(cfg.cache_mode, CacheMode::NoAsync);
    assert_eq!(cfg.cache, CacheCfgArgs::default());
    let cfg = toml::from_str::<VolumeCfg>("max_import_dim = 2048").unwrap();
    assert_eq!(cfg.cache_mode, CacheMode::Normal);
    assert_eq!(cfg.max_import_dim, Some(2048));
}
#[test]
fn test_write_read_roundtrip() {
    let p = DEFAULT_TMPDIR.join("test_rvolume_cfg.toml");
    let mut cfg = get_default_cfg();
    cfg.cache_mode = CacheMode::FastForward;
    cfg.cache.capacity = 2;
    write_cfg_str(&toml::to_string_pretty(&cfg).unwrap(), &p).unwrap();
    defer_file_removal!(&p);
    let read = read_cfg_gen(&p).unwrap();
    assert_eq!(read, cfg);
}
#[test]
fn test_missing_cfg_file_is_default() {
    let read = read_cfg_gen(&DEFAULT_TMPDIR.join("no_such_cfg.toml")).unwrap();
    assert_eq!(read, get_default_cfg());
}
