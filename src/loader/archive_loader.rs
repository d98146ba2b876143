use super::core::{is_supported_image, VolumeLoader};
use crate::{
    file_util,
    result::{to_vol, VolErrorKind, VolResult},
    volerr,
};
use std::{
    fs::File,
    io::Read,
    path::Path,
    sync::{Mutex, MutexGuard},
};
use zip::{result::ZipError, ZipArchive};

/// A zip or cbz file of image entries. The archive handle seeks while
/// reading, access is serialized behind a mutex so that the loader can be
/// shared across decode worker threads.
#[derive(Debug)]
pub struct ArchiveLoader {
    path: String,
    archive: Mutex<ZipArchive<File>>,
}
impl ArchiveLoader {
    pub fn new(path: &Path) -> VolResult<Self> {
        let file = File::open(path).map_err(|e| {
            volerr!(
                VolErrorKind::VolumeCreation,
                "could not open {:?} due to {:?}",
                path,
                e
            )
        })?;
        let archive = ZipArchive::new(file).map_err(|e| {
            volerr!(
                VolErrorKind::VolumeCreation,
                "{:?} is not a readable archive due to {:?}",
                path,
                e
            )
        })?;
        Ok(ArchiveLoader {
            path: file_util::path_to_str(path)?.to_string(),
            archive: Mutex::new(archive),
        })
    }
    fn lock_archive(&self) -> VolResult<MutexGuard<'_, ZipArchive<File>>> {
        self.archive
            .lock()
            .map_err(to_vol(VolErrorKind::ReadFailure))
    }
}
impl VolumeLoader for ArchiveLoader {
    fn is_archive(&self) -> bool {
        true
    }
    fn volume_path(&self) -> &str {
        &self.path
    }
    fn entries(&self) -> VolResult<Vec<String>> {
        let archive = self.lock_archive()?;
        Ok(archive
            .file_names()
            .filter(|name| is_supported_image(name))
            .map(|name| name.to_string())
            .collect())
    }
    fn load(&self, name: &str) -> VolResult<Vec<u8>> {
        let mut archive = self.lock_archive()?;
        match archive.by_name(name) {
            Ok(mut entry) => {
                let mut buf = Vec::new();
                entry
                    .read_to_end(&mut buf)
                    .map_err(to_vol(VolErrorKind::ReadFailure))?;
                Ok(buf)
            }
            Err(ZipError::FileNotFound) => Err(volerr!(
                VolErrorKind::EntryNotFound,
                "no entry {:?} in {}",
                name,
                self.path
            )),
            Err(e) => Err(volerr!(
                VolErrorKind::ReadFailure,
                "could not read {:?} from {} due to {:?}",
                name,
                self.path,
                e
            )),
        }
    }
}

/// Writes a zip with the given entries, meant for test fixtures.
pub fn write_test_archive(path: &Path, entries: &[(&str, &[u8])]) {
    use std::io::Write;
    use zip::write::{ExtendedFileOptions, ZipWriter};
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, bytes) in entries {
        zip.start_file::<&str, ExtendedFileOptions>(name, zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

#[cfg(test)]
use crate::{decode::encode_test_png, defer_file_removal, file_util::DEFAULT_TMPDIR};
#[cfg(test)]
use std::fs;

#[test]
fn test_archive_loader() {
    let archive_path = DEFAULT_TMPDIR.join("test_archive_loader.zip");
    let png = encode_test_png(8, 4);
    write_test_archive(
        &archive_path,
        &[
            ("page1.png", png.as_slice()),
            ("page2.png", png.as_slice()),
            ("notes.txt", b"no image"),
        ],
    );
    defer_file_removal!(&archive_path);

    let loader = ArchiveLoader::new(&archive_path).unwrap();
    assert!(loader.is_archive());
    let mut entries = loader.entries().unwrap();
    entries.sort();
    assert_eq!(entries, vec!["page1.png", "page2.png"]);
    assert_eq!(loader.load("page2.png").unwrap(), png);
    assert_eq!(
        loader.load("missing.png").unwrap_err().kind(),
        VolErrorKind::EntryNotFound
    );
}
#[test]
fn test_archive_loader_creation() {
    let path = DEFAULT_TMPDIR.join("test_archive_loader_creation.zip");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"this is not an archive").unwrap();
    defer_file_removal!(&path);
    assert_eq!(
        ArchiveLoader::new(&path).unwrap_err().kind(),
        VolErrorKind::VolumeCreation
    );
    assert_eq!(
        ArchiveLoader::new(&DEFAULT_TMPDIR.join("not_there.zip"))
            .unwrap_err()
            .kind(),
        VolErrorKind::VolumeCreation
    );
}
