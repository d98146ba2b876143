use super::core::{is_supported_image, VolumeLoader};
use crate::{
    file_util,
    result::{to_vol, VolErrorKind, VolResult},
    volerr,
};
use std::{fs, io, path::Path};
use walkdir::WalkDir;

/// A folder of image files. Entry names are plain file names, subfolders are
/// not descended into.
#[derive(Debug)]
pub struct DirectoryLoader {
    root: String,
}
impl DirectoryLoader {
    pub fn new(path: &Path) -> VolResult<Self> {
        if !path.is_dir() {
            return Err(volerr!(
                VolErrorKind::VolumeCreation,
                "{:?} is not a folder",
                path
            ));
        }
        let root = file_util::path_to_str(path)?.to_string();
        Ok(DirectoryLoader { root })
    }
}
impl VolumeLoader for DirectoryLoader {
    fn is_archive(&self) -> bool {
        false
    }
    fn volume_path(&self) -> &str {
        &self.root
    }
    fn entries(&self) -> VolResult<Vec<String>> {
        WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .map(|e| e.map_err(to_vol(VolErrorKind::ReadFailure)))
            .filter(|e| match e {
                Err(_) => true,
                Ok(e_) => {
                    e_.file_type().is_file()
                        && match file_util::osstr_to_str(Some(e_.file_name())) {
                            Ok(name) => is_supported_image(name),
                            Err(_) => false,
                        }
                }
            })
            .map(|e| {
                let e = e?;
                let name = file_util::osstr_to_str(Some(e.file_name()))
                    .map_err(to_vol(VolErrorKind::ReadFailure))?;
                Ok(name.to_string())
            })
            .collect::<VolResult<Vec<String>>>()
    }
    fn load(&self, name: &str) -> VolResult<Vec<u8>> {
        let path = Path::new(&self.root).join(name);
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => volerr!(
                VolErrorKind::EntryNotFound,
                "no entry {:?} in {}",
                name,
                self.root
            ),
            _ => volerr!(
                VolErrorKind::ReadFailure,
                "could not read {:?} due to {:?}",
                path,
                e
            ),
        })
    }
}

#[cfg(test)]
use crate::{decode::encode_test_png, defer_folder_removal, file_util::DEFAULT_TMPDIR};

#[test]
fn test_directory_loader() {
    let folder = DEFAULT_TMPDIR.join("test_directory_loader");
    fs::create_dir_all(&folder).unwrap();
    defer_folder_removal!(&folder);
    let png = encode_test_png(8, 4);
    for name in ["page1.png", "page2.png", "cover.jpg"] {
        fs::write(folder.join(name), &png).unwrap();
    }
    fs::write(folder.join("notes.txt"), b"no image").unwrap();
    fs::create_dir_all(folder.join("subfolder")).unwrap();

    let loader = DirectoryLoader::new(&folder).unwrap();
    assert!(!loader.is_archive());
    assert_eq!(loader.volume_path(), loader.real_volume_path());
    let mut entries = loader.entries().unwrap();
    entries.sort();
    assert_eq!(entries, vec!["cover.jpg", "page1.png", "page2.png"]);
    assert_eq!(loader.load("page1.png").unwrap(), png);
    assert_eq!(
        loader.load("missing.png").unwrap_err().kind(),
        VolErrorKind::EntryNotFound
    );
}
#[test]
fn test_directory_loader_creation() {
    let folder = DEFAULT_TMPDIR.join("test_directory_loader_creation");
    fs::create_dir_all(&folder).unwrap();
    defer_folder_removal!(&folder);
    let file = folder.join("somefile.png");
    fs::write(&file, encode_test_png(2, 2)).unwrap();
    assert_eq!(
        DirectoryLoader::new(&file).unwrap_err().kind(),
        VolErrorKind::VolumeCreation
    );
    assert_eq!(
        DirectoryLoader::new(&folder.join("not_there"))
            .unwrap_err()
            .kind(),
        VolErrorKind::VolumeCreation
    );
}
