use std::{path::Path, sync::Arc};

use tracing::info;

use crate::{
    cfg::VolumeCfg,
    file_util::to_name_str,
    loader::{is_archive_path, is_supported_image, ArchiveLoader, DirectoryLoader},
    result::{trace_ok_err, VolErrorKind, VolResult},
    volerr,
};

use super::{CacheMode, VolumeNavigator, VOLUME_SEPARATOR};

/// Volume part of a path, i.e. everything before the [`VOLUME_SEPARATOR`]
/// or the parent directory of a plain path.
pub fn full_path_to_volume_path(path: &str) -> String {
    match path.split_once(VOLUME_SEPARATOR) {
        Some((volume_part, _)) => volume_part.to_string(),
        None => Path::new(path)
            .parent()
            .map(|parent| parent.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string()),
    }
}
/// Entry part of a path, i.e. everything behind the [`VOLUME_SEPARATOR`]
/// or the file name of a plain path.
pub fn full_path_to_sub_file_path(path: &str) -> String {
    match path.split_once(VOLUME_SEPARATOR) {
        Some((_, sub_part)) => sub_part.to_string(),
        None => Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

/// Opens the volume at `path` with the cache mode of `cfg`. The path can
/// point to a directory, an archive, an image file whose folder becomes the
/// volume, or a composite `<volume>::<entry>` path. `None` with a traced
/// error if the volume cannot be opened.
pub fn create_volume(path: &str, cfg: &VolumeCfg) -> Option<VolumeNavigator> {
    trace_ok_err(try_create(path, cfg, cfg.cache_mode))
}

/// Opens the volume in [`CacheMode::CoverOnly`](CacheMode::CoverOnly) and
/// puts the cursor on the first page with its decode already under way.
/// Meant for thumbnailing shelves of volumes without prefetch storms.
pub fn create_volume_with_only_cover(path: &str, cfg: &VolumeCfg) -> Option<VolumeNavigator> {
    let mut navigator = trace_ok_err(try_create(path, cfg, CacheMode::CoverOnly))?;
    navigator.preload_cover();
    Some(navigator)
}

fn try_create(path: &str, cfg: &VolumeCfg, cache_mode: CacheMode) -> VolResult<VolumeNavigator> {
    if let Some((volume_part, sub_part)) = path.split_once(VOLUME_SEPARATOR) {
        let mut navigator = try_create(volume_part, cfg, cache_mode)?;
        if navigator.find_image_by_name(sub_part) {
            return Ok(navigator);
        }
        return Err(volerr!(
            VolErrorKind::VolumeCreation,
            "no page {sub_part:?} in {volume_part}"
        ));
    }
    let p = Path::new(path);
    if p.is_dir() {
        let loader = DirectoryLoader::new(p)?;
        return VolumeNavigator::new(Arc::new(loader), cfg, cache_mode);
    }
    if p.is_file() {
        if is_archive_path(path) {
            let loader = ArchiveLoader::new(p)?;
            return VolumeNavigator::new(Arc::new(loader), cfg, cache_mode);
        }
        if is_supported_image(path) {
            // the folder of the image is the volume with the cursor on the image
            let parent = match p.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let loader = DirectoryLoader::new(parent)?;
            let mut navigator = VolumeNavigator::new(Arc::new(loader), cfg, cache_mode)?;
            let name = to_name_str(p)?;
            if !navigator.find_image_by_name(name) {
                return Err(volerr!(
                    VolErrorKind::VolumeCreation,
                    "{path} vanished while opening its folder"
                ));
            }
            info!("opened {} at page {:?}", navigator.volume_path(), navigator.cursor());
            return Ok(navigator);
        }
        return Err(volerr!(
            VolErrorKind::VolumeCreation,
            "{path} is neither an image nor an archive"
        ));
    }
    Err(volerr!(VolErrorKind::VolumeCreation, "{path} does not exist"))
}

#[cfg(test)]
use {
    crate::decode::encode_test_png,
    crate::defer_folder_removal,
    crate::file_util::DEFAULT_TMPDIR,
    crate::loader::write_test_archive,
    crate::tracing_setup::init_tracing_for_tests,
    std::fs,
};

#[cfg(test)]
fn cfg_for_test() -> VolumeCfg {
    crate::cfg::get_default_cfg()
}

#[test]
fn test_split_helpers() {
    assert_eq!(
        full_path_to_volume_path("/books/vol.zip::art/p1.png"),
        "/books/vol.zip"
    );
    assert_eq!(
        full_path_to_sub_file_path("/books/vol.zip::art/p1.png"),
        "art/p1.png"
    );
    let plain = Path::new("books")
        .join("pages")
        .join("p1.png")
        .to_string_lossy()
        .into_owned();
    assert_eq!(
        full_path_to_volume_path(&plain),
        Path::new("books").join("pages").to_string_lossy().into_owned()
    );
    assert_eq!(full_path_to_sub_file_path(&plain), "p1.png");
}
#[test]
fn test_create_from_dir() {
    init_tracing_for_tests();
    let tmp = DEFAULT_TMPDIR.join("factory_test_dir");
    fs::create_dir_all(&tmp).unwrap();
    defer_folder_removal!(&tmp);
    let png = encode_test_png(4, 4);
    fs::write(tmp.join("p1.png"), &png).unwrap();
    fs::write(tmp.join("p2.png"), &png).unwrap();
    fs::write(tmp.join("notes.txt"), b"not a page").unwrap();
    let nav = create_volume(tmp.to_str().unwrap(), &cfg_for_test()).unwrap();
    assert!(!nav.is_archive());
    assert_eq!(nav.size(), 2);
    assert_eq!(nav.cursor(), None);
}
#[test]
fn test_create_from_image_file() {
    init_tracing_for_tests();
    let tmp = DEFAULT_TMPDIR.join("factory_test_imgfile");
    fs::create_dir_all(&tmp).unwrap();
    defer_folder_removal!(&tmp);
    let png = encode_test_png(4, 4);
    fs::write(tmp.join("p1.png"), &png).unwrap();
    fs::write(tmp.join("p2.png"), &png).unwrap();
    let file_path = tmp.join("p2.png");
    let nav = create_volume(file_path.to_str().unwrap(), &cfg_for_test()).unwrap();
    assert!(!nav.is_archive());
    assert_eq!(nav.size(), 2);
    assert_eq!(nav.cursor(), Some(1));
    assert_eq!(nav.file_name_by_index(1), Some("p2.png"));
}
#[test]
fn test_create_from_archive_and_composite() {
    init_tracing_for_tests();
    let tmp = DEFAULT_TMPDIR.join("factory_test_archive");
    fs::create_dir_all(&tmp).unwrap();
    defer_folder_removal!(&tmp);
    let png = encode_test_png(4, 4);
    let zip_path = tmp.join("vol.cbz");
    write_test_archive(
        &zip_path,
        &[("p1.png", png.as_slice()), ("p2.png", png.as_slice())],
    );
    let zip_str = zip_path.to_str().unwrap();
    let nav = create_volume(zip_str, &cfg_for_test()).unwrap();
    assert!(nav.is_archive());
    assert_eq!(nav.size(), 2);

    let composite = format!("{zip_str}{VOLUME_SEPARATOR}p2.png");
    let nav = create_volume(&composite, &cfg_for_test()).unwrap();
    assert_eq!(nav.cursor(), Some(1));
    assert_eq!(nav.current_path(), Some(composite));

    let missing = format!("{zip_str}{VOLUME_SEPARATOR}zzz.png");
    assert!(create_volume(&missing, &cfg_for_test()).is_none());
}
#[test]
fn test_create_failures() {
    init_tracing_for_tests();
    assert!(create_volume("/definitely/not/there", &cfg_for_test()).is_none());
    let tmp = DEFAULT_TMPDIR.join("factory_test_failures");
    fs::create_dir_all(&tmp).unwrap();
    defer_folder_removal!(&tmp);
    let txt_path = tmp.join("notes.txt");
    fs::write(&txt_path, b"no pages in here").unwrap();
    assert!(create_volume(txt_path.to_str().unwrap(), &cfg_for_test()).is_none());
}
#[test]
fn test_create_with_only_cover() {
    init_tracing_for_tests();
    let tmp = DEFAULT_TMPDIR.join("factory_test_cover");
    fs::create_dir_all(&tmp).unwrap();
    defer_folder_removal!(&tmp);
    let png = encode_test_png(4, 4);
    fs::write(tmp.join("p1.png"), &png).unwrap();
    fs::write(tmp.join("p2.png"), &png).unwrap();
    let mut nav = create_volume_with_only_cover(tmp.to_str().unwrap(), &cfg_for_test()).unwrap();
    assert_eq!(nav.cache_mode(), CacheMode::CoverOnly);
    assert_eq!(nav.cursor(), Some(0));
    let cover = nav.current_image().unwrap();
    assert_eq!(cover.path(), tmp.join("p1.png").to_string_lossy());
}
