use std::{fs, path::PathBuf};

use rvolume::{
    cfg::get_default_cfg,
    decode::encode_test_png,
    defer_folder_removal,
    file_util::DEFAULT_TMPDIR,
    loader::write_test_archive,
    result::VolErrorKind,
    tracing_setup::init_tracing_for_tests,
    volume::{
        create_volume, create_volume_with_only_cover, full_path_to_sub_file_path,
        full_path_to_volume_path, CacheMode, VOLUME_SEPARATOR,
    },
    Shape,
};

fn make_test_dir(name: &str, pages: &[(&str, u32, u32)]) -> PathBuf {
    let folder = DEFAULT_TMPDIR.join(name);
    fs::create_dir_all(&folder).unwrap();
    for (page_name, w, h) in pages {
        fs::write(folder.join(page_name), encode_test_png(*w, *h)).unwrap();
    }
    folder
}

#[test]
fn test_directory_volume_flow() {
    init_tracing_for_tests();
    let folder = make_test_dir(
        "nav_dir_flow",
        &[
            ("page10.png", 5, 5),
            ("page1.png", 10, 20),
            ("page2.png", 30, 10),
        ],
    );
    defer_folder_removal!(&folder);
    let mut cfg = get_default_cfg();
    cfg.cache.capacity = 2;
    let mut nav = create_volume(folder.to_str().unwrap(), &cfg).unwrap();
    assert!(!nav.is_archive());
    assert_eq!(nav.size(), 3);

    let mut sizes = Vec::new();
    while nav.next_page() {
        sizes.push(nav.current_image().unwrap().base_size());
    }
    assert_eq!(
        sizes,
        vec![Shape::new(10, 20), Shape::new(30, 10), Shape::new(5, 5)]
    );
    assert_eq!(nav.cursor(), Some(2));
    assert!(nav.prev_page());
    let content = nav.current_image().unwrap();
    assert_eq!(content.base_size(), Shape::new(30, 10));
    assert!(content.is_wide());
    assert_eq!(
        content.path(),
        folder.join("page2.png").to_string_lossy().as_ref()
    );
    assert!(nav.find_image_by_index(0));
    assert_eq!(nav.current_image().unwrap().base_size(), Shape::new(10, 20));
}

#[test]
fn test_image_file_positions_cursor() {
    init_tracing_for_tests();
    let folder = make_test_dir(
        "nav_image_file",
        &[("a.png", 4, 4), ("b.png", 6, 2), ("c.png", 4, 4)],
    );
    defer_folder_removal!(&folder);
    let image_path = folder.join("b.png");
    let mut nav = create_volume(image_path.to_str().unwrap(), &get_default_cfg()).unwrap();
    assert_eq!(nav.size(), 3);
    assert_eq!(nav.cursor(), Some(1));
    assert_eq!(nav.current_image().unwrap().base_size(), Shape::new(6, 2));
    assert!(nav.prev_page());
    assert_eq!(nav.current_image().unwrap().base_size(), Shape::new(4, 4));
}

#[test]
fn test_archive_volume_and_composite_path() {
    init_tracing_for_tests();
    let folder = DEFAULT_TMPDIR.join("nav_archive");
    fs::create_dir_all(&folder).unwrap();
    defer_folder_removal!(&folder);
    let zip_path = folder.join("vol.cbz");
    let p1 = encode_test_png(10, 20);
    let p2 = encode_test_png(30, 10);
    write_test_archive(
        &zip_path,
        &[
            ("p2.png", p2.as_slice()),
            ("p1.png", p1.as_slice()),
            ("notes.txt", b"no image"),
        ],
    );
    let zip_str = zip_path.to_str().unwrap();
    let mut nav = create_volume(zip_str, &get_default_cfg()).unwrap();
    assert!(nav.is_archive());
    assert_eq!(nav.size(), 2);
    assert!(nav.next_page());
    let content = nav.current_image().unwrap();
    assert_eq!(content.base_size(), Shape::new(10, 20));
    assert_eq!(content.path(), format!("{zip_str}{VOLUME_SEPARATOR}p1.png"));
    assert_eq!(nav.load_bytes_by_name("p2.png").unwrap(), p2);

    let composite = format!("{zip_str}{VOLUME_SEPARATOR}p2.png");
    assert_eq!(full_path_to_volume_path(&composite), zip_str);
    assert_eq!(full_path_to_sub_file_path(&composite), "p2.png");
    let mut nav = create_volume(&composite, &get_default_cfg()).unwrap();
    assert_eq!(nav.cursor(), Some(1));
    assert_eq!(nav.current_image().unwrap().base_size(), Shape::new(30, 10));
}

#[test]
fn test_cover_only_over_archive() {
    init_tracing_for_tests();
    let folder = DEFAULT_TMPDIR.join("nav_cover");
    fs::create_dir_all(&folder).unwrap();
    defer_folder_removal!(&folder);
    let zip_path = folder.join("vol.zip");
    write_test_archive(
        &zip_path,
        &[
            ("p10.png", encode_test_png(9, 9).as_slice()),
            ("p1.png", encode_test_png(3, 7).as_slice()),
        ],
    );
    let mut nav =
        create_volume_with_only_cover(zip_path.to_str().unwrap(), &get_default_cfg()).unwrap();
    assert_eq!(nav.cache_mode(), CacheMode::CoverOnly);
    assert_eq!(nav.cursor(), Some(0));
    // natural order puts p1 in front of p10
    assert_eq!(nav.current_image().unwrap().base_size(), Shape::new(3, 7));
}

#[test]
fn test_mode_switch_mid_walk() {
    init_tracing_for_tests();
    let folder = make_test_dir(
        "nav_mode_switch",
        &[("1.png", 2, 2), ("2.png", 2, 2), ("3.png", 2, 2), ("4.png", 2, 2)],
    );
    defer_folder_removal!(&folder);
    let mut cfg = get_default_cfg();
    cfg.cache_mode = CacheMode::FastForward;
    let mut nav = create_volume(folder.to_str().unwrap(), &cfg).unwrap();
    assert!(nav.next_page());
    assert!(nav.current_image().is_ok());
    nav.set_cache_mode(CacheMode::Normal);
    assert!(nav.next_page());
    assert!(nav.current_image().is_ok());
    nav.set_cache_mode(CacheMode::NoAsync);
    assert!(nav.next_page());
    assert!(nav.current_image().is_ok());
}

#[test]
fn test_corrupt_page_reports_and_recovers() {
    init_tracing_for_tests();
    let folder = make_test_dir("nav_corrupt", &[("good.png", 4, 4)]);
    defer_folder_removal!(&folder);
    let corrupt_path = folder.join("broken.png");
    fs::write(&corrupt_path, b"these are no pixels").unwrap();

    let mut nav = create_volume(folder.to_str().unwrap(), &get_default_cfg()).unwrap();
    assert_eq!(nav.size(), 2);
    assert!(nav.next_page());
    assert_eq!(
        nav.current_image().unwrap_err().kind(),
        VolErrorKind::DecodeFailure
    );
    assert!(nav.next_page());
    assert!(nav.current_image().is_ok());

    // the failed page is decoded again once the file is repaired
    fs::write(&corrupt_path, encode_test_png(8, 8)).unwrap();
    assert_eq!(
        nav.image_content_by_index(0).unwrap().base_size(),
        Shape::new(8, 8)
    );
}
