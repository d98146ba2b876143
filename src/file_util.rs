use crate::{
    result::{VolErrorKind, VolResult},
    volerr,
};
use lazy_static::lazy_static;
use std::{
    ffi::OsStr,
    fmt::Debug,
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{error, info};

lazy_static! {
    pub static ref DEFAULT_TMPDIR: PathBuf = std::env::temp_dir().join("rvolume");
}
lazy_static! {
    pub static ref DEFAULT_HOMEDIR: PathBuf = match dirs::home_dir() {
        Some(p) => p.join(".rvolume"),
        _ => std::env::temp_dir().join("rvolume"),
    };
}

pub fn read_to_string<P>(p: P) -> VolResult<String>
where
    P: AsRef<Path> + Debug,
{
    fs::read_to_string(&p)
        .map_err(|e| volerr!(VolErrorKind::ReadFailure, "could not read {:?} due to {:?}", p, e))
}

pub fn path_to_str(p: &Path) -> VolResult<&str> {
    osstr_to_str(Some(p.as_os_str())).map_err(|e| {
        volerr!(
            VolErrorKind::ReadFailure,
            "path_to_str could not transform '{:?}' due to '{:?}'",
            p,
            e
        )
    })
}

pub fn osstr_to_str(p: Option<&OsStr>) -> io::Result<&str> {
    p.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{p:?} not found")))?
        .to_str()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{p:?} not convertible to unicode"),
            )
        })
}

pub fn to_name_str(p: &Path) -> VolResult<&str> {
    osstr_to_str(p.file_name()).map_err(|e| {
        volerr!(
            VolErrorKind::ReadFailure,
            "to_name_str could not transform '{:?}' due to '{:?}'",
            p,
            e
        )
    })
}

pub fn write<P, C>(path: P, contents: C) -> VolResult<()>
where
    P: AsRef<Path> + Debug,
    C: AsRef<[u8]>,
{
    fs::write(&path, contents).map_err(|e| {
        volerr!(
            VolErrorKind::ReadFailure,
            "could not write to {:?} since {:?}",
            path,
            e
        )
    })
}

/// Human readable byte count of an entry, e.g. for log lines and image infos.
pub fn format_n_bytes(n_bytes: u64) -> String {
    if n_bytes < 1024 {
        format!("{n_bytes}b")
    } else if n_bytes < 1024u64.pow(2) {
        format!("{:.3}kb", n_bytes as f64 / 1024f64)
    } else {
        format!("{:.3}mb", n_bytes as f64 / 1024f64.powi(2))
    }
}

pub struct Defer<F: FnMut()> {
    pub func: F,
}
impl<F: FnMut()> Drop for Defer<F> {
    fn drop(&mut self) {
        (self.func)();
    }
}
#[macro_export]
macro_rules! defer {
    ($f:expr) => {
        let _dfr = $crate::file_util::Defer { func: $f };
    };
}
pub fn checked_remove<'a, P: AsRef<Path> + Debug>(
    path: &'a P,
    func: fn(p: &'a P) -> io::Result<()>,
) {
    match func(path) {
        Ok(_) => info!("removed {path:?}"),
        Err(e) => error!("could not remove {path:?} due to {e:?}"),
    }
}
#[macro_export]
macro_rules! defer_folder_removal {
    ($path:expr) => {
        let func = || $crate::file_util::checked_remove($path, std::fs::remove_dir_all);
        $crate::defer!(func);
    };
}
#[macro_export]
macro_rules! defer_file_removal {
    ($path:expr) => {
        let func = || $crate::file_util::checked_remove($path, std::fs::remove_file);
        $crate::defer!(func);
    };
}

#[test]
fn test_format_n_bytes() {
    assert_eq!(format_n_bytes(512), "512b");
    assert_eq!(format_n_bytes(2048), "2.000kb");
    assert_eq!(format_n_bytes(3 * 1024 * 1024), "3.000mb");
}
#[test]
fn test_namestr() {
    assert_eq!(
        to_name_str(Path::new("somefolder/subfolder/page1.png")).unwrap(),
        "page1.png"
    );
    assert!(to_name_str(Path::new("/")).is_err());
}
