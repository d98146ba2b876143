use std::{path::Path, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    cache::{DecodeCache, DecodeHandle, PREFETCH_DELAY},
    cfg::VolumeCfg,
    decode,
    loader::VolumeLoader,
    result::{trace_ok_warn, VolErrorKind, VolResult},
    types::ImageContent,
    util::natural_cmp,
    volerr,
};

use super::VOLUME_SEPARATOR;

/// How eagerly pages are decoded around the cursor.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum CacheMode {
    /// Prefetch a window of neighbor pages around the cursor.
    #[default]
    Normal,
    /// Schedule only the page navigated to, e.g. while paging rapidly.
    FastForward,
    /// Navigation schedules nothing, only demanded pages are decoded.
    CoverOnly,
    /// Decode on the calling thread and bypass the cache.
    NoAsync,
}

/// Cursor over the naturally sorted pages of one volume. Navigation moves
/// the cursor and schedules decodes according to the cache mode, demand
/// calls block on the shared handle of the wanted page. A slow page never
/// blocks navigation, only the demand call that insists on its pixels.
pub struct VolumeNavigator {
    entries: Vec<String>,
    cursor: Option<usize>,
    cache_mode: CacheMode,
    cache: DecodeCache,
    loader: Arc<dyn VolumeLoader>,
    n_prev_pages: usize,
    n_next_pages: usize,
    max_import_dim: Option<u32>,
}

impl VolumeNavigator {
    pub fn new(
        loader: Arc<dyn VolumeLoader>,
        cfg: &VolumeCfg,
        cache_mode: CacheMode,
    ) -> VolResult<Self> {
        let mut entries = loader.entries()?;
        entries.sort_by(|n1, n2| natural_cmp(n1, n2));
        debug!(
            "opened volume {} with {} pages",
            loader.volume_path(),
            entries.len()
        );
        Ok(VolumeNavigator {
            entries,
            cursor: None,
            cache_mode,
            cache: DecodeCache::new(&cfg.cache),
            loader,
            n_prev_pages: cfg.cache.n_prev_pages,
            n_next_pages: cfg.cache.n_next_pages,
            max_import_dim: cfg.max_import_dim,
        })
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }
    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }
    pub fn set_cache_mode(&mut self, cache_mode: CacheMode) {
        if self.cache_mode != cache_mode {
            debug!(
                "cache mode changes from {:?} to {:?}",
                self.cache_mode, cache_mode
            );
            self.cache_mode = cache_mode;
        }
    }
    pub fn is_archive(&self) -> bool {
        self.loader.is_archive()
    }
    pub fn volume_path(&self) -> &str {
        self.loader.volume_path()
    }
    pub fn real_volume_path(&self) -> &str {
        self.loader.real_volume_path()
    }

    /// Full path of the page at `idx`, `None` beyond the last page.
    pub fn path_by_index(&self, idx: usize) -> Option<String> {
        self.entries.get(idx).map(|name| self.compose_path(name))
    }
    /// Entry name of the page at `idx`, `None` beyond the last page.
    pub fn file_name_by_index(&self, idx: usize) -> Option<&str> {
        self.entries.get(idx).map(|name| name.as_str())
    }
    /// Full path of the page under the cursor.
    pub fn current_path(&self) -> Option<String> {
        self.cursor.and_then(|cur| self.path_by_index(cur))
    }
    /// Raw encoded bytes of an entry, without going through the cache.
    pub fn load_bytes_by_name(&self, name: &str) -> VolResult<Vec<u8>> {
        self.loader.load(name)
    }

    /// Moves the cursor one page forward, from unset to the first page.
    /// `false` if there is no page beyond the cursor.
    pub fn next_page(&mut self) -> bool {
        let target = match self.cursor {
            None => 0,
            Some(cur) => cur + 1,
        };
        if target >= self.entries.len() {
            return false;
        }
        self.cursor = Some(target);
        self.schedule_target(target);
        self.schedule_window(target, true);
        true
    }
    /// Moves the cursor one page back. `false` on the first page or while
    /// the cursor is unset.
    pub fn prev_page(&mut self) -> bool {
        let target = match self.cursor {
            None | Some(0) => return false,
            Some(cur) => cur - 1,
        };
        self.cursor = Some(target);
        self.schedule_target(target);
        self.schedule_window(target, false);
        true
    }
    /// Puts the cursor on `idx`. `false` leaves the cursor untouched if the
    /// volume has no such page.
    pub fn find_image_by_index(&mut self, idx: usize) -> bool {
        if idx >= self.entries.len() {
            return false;
        }
        self.cursor = Some(idx);
        self.schedule_target(idx);
        self.schedule_window(idx, true);
        true
    }
    /// Puts the cursor on the page named `name`, `false` if no entry has
    /// that name.
    pub fn find_image_by_name(&mut self, name: &str) -> bool {
        match self.entries.iter().position(|n| n == name) {
            Some(idx) => self.find_image_by_index(idx),
            None => false,
        }
    }

    /// Decoded content of the page under the cursor. Blocks until its decode
    /// has finished and schedules the prefetch window around the cursor.
    pub fn current_image(&mut self) -> VolResult<ImageContent> {
        let cur = match self.cursor {
            Some(cur) => cur,
            None => {
                return Err(volerr!(
                    VolErrorKind::NavigationOutOfRange,
                    "no page selected in {}",
                    self.loader.volume_path()
                ))
            }
        };
        if self.cache_mode == CacheMode::NoAsync {
            return self.decode_sync(cur);
        }
        let handle = self.request(cur, self.demand_prio(), Duration::ZERO)?;
        self.schedule_window(cur, true);
        handle.wait()
    }
    /// Decoded content of the page at `idx` without moving the cursor.
    pub fn image_content_by_index(&mut self, idx: usize) -> VolResult<ImageContent> {
        if idx >= self.entries.len() {
            return Err(volerr!(
                VolErrorKind::NavigationOutOfRange,
                "page {} out of range, {} has {} pages",
                idx,
                self.loader.volume_path(),
                self.entries.len()
            ));
        }
        if self.cache_mode == CacheMode::NoAsync {
            return self.decode_sync(idx);
        }
        self.request(idx, self.demand_prio(), Duration::ZERO)?.wait()
    }

    pub(super) fn preload_cover(&mut self) {
        if self.find_image_by_index(0) {
            trace_ok_warn(self.request(0, self.demand_prio(), Duration::ZERO));
        }
    }

    fn compose_path(&self, name: &str) -> String {
        if self.loader.is_archive() {
            format!("{}{}{}", self.loader.volume_path(), VOLUME_SEPARATOR, name)
        } else {
            Path::new(self.loader.real_volume_path())
                .join(name)
                .to_string_lossy()
                .into_owned()
        }
    }

    fn demand_prio(&self) -> usize {
        // outranks every window priority
        self.n_prev_pages + self.n_next_pages + 2
    }

    fn request(&mut self, idx: usize, prio: usize, delay: Duration) -> VolResult<DecodeHandle> {
        let loader = Arc::clone(&self.loader);
        let name = self.entries[idx].clone();
        let path = self.compose_path(&name);
        let max_import_dim = self.max_import_dim;
        self.cache.get_or_create(idx, self.cursor, prio, delay, move || {
            decode::load_image_content(loader.as_ref(), &name, &path, max_import_dim)
        })
    }

    fn decode_sync(&self, idx: usize) -> VolResult<ImageContent> {
        let name = &self.entries[idx];
        let path = self.compose_path(name);
        decode::load_image_content(self.loader.as_ref(), name, &path, self.max_import_dim)
    }

    fn schedule_target(&mut self, idx: usize) {
        match self.cache_mode {
            CacheMode::Normal | CacheMode::FastForward => {
                let n_max_possible = self.n_prev_pages + self.n_next_pages + 1;
                trace_ok_warn(self.request(idx, n_max_possible, PREFETCH_DELAY));
            }
            CacheMode::CoverOnly | CacheMode::NoAsync => (),
        }
    }

    fn schedule_window(&mut self, center: usize, forward: bool) {
        if self.cache_mode != CacheMode::Normal || self.entries.is_empty() {
            return;
        }
        let (start_idx, end_idx) = if forward {
            (center, (center + self.n_next_pages).min(self.entries.len() - 1))
        } else {
            (center.saturating_sub(self.n_prev_pages), center)
        };
        let n_max_possible = self.n_prev_pages + self.n_next_pages + 1;
        for idx in start_idx..=end_idx {
            if idx == center {
                continue;
            }
            let prio = n_max_possible - center.abs_diff(idx);
            trace_ok_warn(self.request(idx, prio, PREFETCH_DELAY));
        }
    }
}

#[cfg(test)]
use {
    crate::cfg::get_default_cfg,
    crate::decode::encode_test_png,
    crate::tracing_setup::init_tracing_for_tests,
    crate::types::Shape,
    std::collections::HashMap,
    std::sync::atomic::{AtomicUsize, Ordering},
};

#[cfg(test)]
struct FakeLoader {
    vol_path: String,
    names: Vec<String>,
    data: HashMap<String, Vec<u8>>,
    n_failures_left: AtomicUsize,
    n_loads: AtomicUsize,
}
#[cfg(test)]
impl FakeLoader {
    fn new(names: &[&str]) -> Self {
        let png = encode_test_png(16, 8);
        FakeLoader {
            vol_path: "/books/vol.zip".to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
            data: names.iter().map(|n| (n.to_string(), png.clone())).collect(),
            n_failures_left: AtomicUsize::new(0),
            n_loads: AtomicUsize::new(0),
        }
    }
    fn failing_first(names: &[&str], n_failures: usize) -> Self {
        let loader = Self::new(names);
        loader.n_failures_left.store(n_failures, Ordering::SeqCst);
        loader
    }
}
#[cfg(test)]
impl VolumeLoader for FakeLoader {
    fn is_archive(&self) -> bool {
        true
    }
    fn volume_path(&self) -> &str {
        &self.vol_path
    }
    fn entries(&self) -> VolResult<Vec<String>> {
        Ok(self.names.clone())
    }
    fn load(&self, name: &str) -> VolResult<Vec<u8>> {
        self.n_loads.fetch_add(1, Ordering::SeqCst);
        if self.n_failures_left.load(Ordering::SeqCst) > 0 {
            self.n_failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(volerr!(VolErrorKind::ReadFailure, "flaky read of {name}"));
        }
        self.data
            .get(name)
            .cloned()
            .ok_or_else(|| volerr!(VolErrorKind::EntryNotFound, "no entry {name:?}"))
    }
}
#[cfg(test)]
fn make_nav(
    loader: Arc<FakeLoader>,
    mode: CacheMode,
    capacity: usize,
    n_prev: usize,
    n_next: usize,
) -> VolumeNavigator {
    let mut cfg = get_default_cfg();
    cfg.cache.capacity = capacity;
    cfg.cache.n_prev_pages = n_prev;
    cfg.cache.n_next_pages = n_next;
    VolumeNavigator::new(loader, &cfg, mode).unwrap()
}

#[test]
fn test_natural_order_and_paths() {
    let loader = Arc::new(FakeLoader::new(&["page10.png", "page1.png", "page2.png"]));
    let nav = make_nav(loader, CacheMode::Normal, 8, 2, 2);
    assert_eq!(nav.size(), 3);
    assert_eq!(nav.file_name_by_index(0), Some("page1.png"));
    assert_eq!(nav.file_name_by_index(1), Some("page2.png"));
    assert_eq!(nav.file_name_by_index(2), Some("page10.png"));
    assert_eq!(nav.file_name_by_index(3), None);
    assert_eq!(
        nav.path_by_index(2),
        Some("/books/vol.zip::page10.png".to_string())
    );
    assert_eq!(nav.path_by_index(3), None);
    assert!(nav.is_archive());
}
#[test]
fn test_navigation_bounds() {
    let loader = Arc::new(FakeLoader::new(&[]));
    let mut nav = make_nav(loader, CacheMode::Normal, 8, 2, 2);
    assert!(nav.is_empty());
    assert!(!nav.next_page());
    assert!(!nav.prev_page());
    assert_eq!(nav.cursor(), None);
    assert_eq!(
        nav.current_image().unwrap_err().kind(),
        VolErrorKind::NavigationOutOfRange
    );

    let loader = Arc::new(FakeLoader::new(&["a.png", "b.png", "c.png"]));
    let mut nav = make_nav(loader, CacheMode::Normal, 8, 2, 2);
    assert!(!nav.prev_page());
    assert!(nav.next_page());
    assert_eq!(nav.cursor(), Some(0));
    assert!(nav.next_page());
    assert!(nav.next_page());
    assert_eq!(nav.cursor(), Some(2));
    assert!(!nav.next_page());
    assert_eq!(nav.cursor(), Some(2));
    assert!(nav.prev_page());
    assert!(nav.prev_page());
    assert_eq!(nav.cursor(), Some(0));
    assert!(!nav.prev_page());
    assert!(nav.find_image_by_index(2));
    assert!(!nav.find_image_by_index(3));
    assert_eq!(nav.cursor(), Some(2));
    assert!(nav.find_image_by_name("b.png"));
    assert_eq!(nav.cursor(), Some(1));
    assert!(!nav.find_image_by_name("nope.png"));
    assert_eq!(nav.cursor(), Some(1));
}
#[test]
fn test_current_image() {
    init_tracing_for_tests();
    let loader = Arc::new(FakeLoader::new(&["page1.png", "page2.png"]));
    let png_len = loader.data["page1.png"].len() as u64;
    let mut nav = make_nav(loader, CacheMode::Normal, 8, 2, 2);
    assert!(nav.next_page());
    let content = nav.current_image().unwrap();
    assert_eq!(content.base_size(), Shape::new(16, 8));
    assert!(content.is_wide());
    assert_eq!(content.path(), "/books/vol.zip::page1.png");
    assert_eq!(content.info().n_bytes, png_len);
    assert_eq!(nav.current_path(), Some(content.path().to_string()));
}
#[test]
fn test_demand_does_not_move_cursor() {
    let loader = Arc::new(FakeLoader::new(&["a.png", "b.png", "c.png"]));
    let mut nav = make_nav(loader, CacheMode::Normal, 8, 2, 2);
    let content = nav.image_content_by_index(2).unwrap();
    assert_eq!(content.path(), "/books/vol.zip::c.png");
    assert_eq!(nav.cursor(), None);
    assert_eq!(
        nav.image_content_by_index(3).unwrap_err().kind(),
        VolErrorKind::NavigationOutOfRange
    );
}
#[test]
fn test_failure_does_not_poison() {
    let loader = Arc::new(FakeLoader::failing_first(&["a.png"], 1));
    let mut nav = make_nav(Arc::clone(&loader), CacheMode::Normal, 8, 2, 2);
    assert_eq!(
        nav.image_content_by_index(0).unwrap_err().kind(),
        VolErrorKind::ReadFailure
    );
    assert!(nav.image_content_by_index(0).is_ok());
    assert_eq!(loader.n_loads.load(Ordering::SeqCst), 2);
}
#[test]
fn test_window_scheduling() {
    let names = &["1.png", "2.png", "3.png", "4.png", "5.png", "6.png"];
    let loader = Arc::new(FakeLoader::new(names));
    let mut nav = make_nav(loader, CacheMode::Normal, 16, 2, 2);
    assert!(nav.find_image_by_index(0));
    // target plus two pages ahead
    assert_eq!(nav.cache.len(), 3);
    assert!(nav.cache.contains(0));
    assert!(nav.cache.contains(1));
    assert!(nav.cache.contains(2));

    assert!(nav.find_image_by_index(5));
    assert_eq!(nav.cache.len(), 4);
    assert!(nav.prev_page());
    // look-behind window around page 4
    assert!(nav.cache.contains(2));
    assert!(nav.cache.contains(3));
    assert!(nav.cache.contains(4));
    assert!(nav.cache.contains(5));
}
#[test]
fn test_fast_forward_schedules_target_only() {
    let loader = Arc::new(FakeLoader::new(&["a.png", "b.png", "c.png"]));
    let mut nav = make_nav(loader, CacheMode::FastForward, 8, 2, 2);
    assert!(nav.find_image_by_index(0));
    assert_eq!(nav.cache.len(), 1);
    assert!(nav.next_page());
    assert_eq!(nav.cache.len(), 2);
    assert!(nav.current_image().is_ok());
}
#[test]
fn test_cover_only_schedules_nothing_on_navigation() {
    let loader = Arc::new(FakeLoader::new(&["a.png", "b.png", "c.png"]));
    let mut nav = make_nav(loader, CacheMode::CoverOnly, 8, 2, 2);
    assert!(nav.next_page());
    assert!(nav.cache.is_empty());
    assert!(nav.current_image().is_ok());
    assert_eq!(nav.cache.len(), 1);
    assert!(nav.next_page());
    assert_eq!(nav.cache.len(), 1);
}
#[test]
fn test_noasync_bypasses_cache() {
    let loader = Arc::new(FakeLoader::new(&["a.png", "b.png"]));
    let mut nav = make_nav(Arc::clone(&loader), CacheMode::NoAsync, 8, 2, 2);
    assert!(nav.next_page());
    assert!(nav.current_image().is_ok());
    assert!(nav.image_content_by_index(1).is_ok());
    assert!(nav.cache.is_empty());
    assert_eq!(loader.n_loads.load(Ordering::SeqCst), 2);
}
#[test]
fn test_eviction_protects_cursor() {
    let loader = Arc::new(FakeLoader::new(&["a.png", "b.png", "c.png"]));
    let mut nav = make_nav(loader, CacheMode::Normal, 2, 0, 1);
    assert!(nav.find_image_by_index(0));
    assert!(nav.current_image().is_ok());
    assert!(nav.cache.contains(0));
    assert!(nav.cache.contains(1));
    assert!(nav.next_page());
    assert!(nav.current_image().is_ok());
    // page 2 got prefetched, the oldest page left, the cursor page stayed
    assert!(nav.cache.contains(1));
    assert!(nav.cache.contains(2));
    assert!(!nav.cache.contains(0));
    assert_eq!(nav.cache.len(), 2);
}
#[test]
fn test_mode_switch_keeps_navigating() {
    let loader = Arc::new(FakeLoader::new(&["a.png", "b.png", "c.png"]));
    let mut nav = make_nav(loader, CacheMode::Normal, 8, 2, 2);
    assert!(nav.next_page());
    assert!(nav.current_image().is_ok());
    nav.set_cache_mode(CacheMode::NoAsync);
    assert_eq!(nav.cache_mode(), CacheMode::NoAsync);
    assert!(nav.next_page());
    assert!(nav.current_image().is_ok());
    nav.set_cache_mode(CacheMode::Normal);
    assert!(nav.next_page());
    assert!(nav.current_image().is_ok());
}
#[test]
fn test_load_bytes_by_name() {
    let loader = Arc::new(FakeLoader::new(&["a.png"]));
    let nav = make_nav(Arc::clone(&loader), CacheMode::Normal, 8, 2, 2);
    assert_eq!(nav.load_bytes_by_name("a.png").unwrap(), loader.data["a.png"]);
    assert_eq!(
        nav.load_bytes_by_name("zzz.png").unwrap_err().kind(),
        VolErrorKind::EntryNotFound
    );
}
