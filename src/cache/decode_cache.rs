use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    result::VolResult,
    threadpool::{JobId, QueuedPool},
    types::ResultContent,
};

use super::core::DecodeHandle;

/// Delay before prefetch jobs become eligible to run. Rapid paging reorders
/// priorities within this window before any pixels get decoded.
pub const PREFETCH_DELAY: Duration = Duration::from_millis(10);

fn default_capacity() -> usize {
    16
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CacheCfgArgs {
    pub n_prev_pages: usize,
    pub n_next_pages: usize,
    pub n_threads: usize,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}
impl Default for CacheCfgArgs {
    fn default() -> Self {
        Self {
            n_prev_pages: 2,
            n_next_pages: 8,
            n_threads: 2,
            capacity: 16,
        }
    }
}

struct CacheEntry {
    handle: DecodeHandle,
    stamp: u64,
    job: Option<JobId>,
}

/// Bounded map from page index to decode result. Each resident index has
/// exactly one producer job, later requests for the same index share its
/// handle. When room is needed the least recently requested entry goes
/// first while the protected index is spared. Evicting a pending entry does
/// not cancel its job, the decoded content is dropped with the last handle
/// and a later reap claims the finished job from the pool.
pub struct DecodeCache {
    entries: HashMap<usize, CacheEntry>,
    // jobs of removed entries whose results still have to be claimed
    orphans: Vec<JobId>,
    capacity: usize,
    next_stamp: u64,
    tpq: QueuedPool<()>,
}
impl DecodeCache {
    pub fn new(args: &CacheCfgArgs) -> Self {
        DecodeCache {
            entries: HashMap::new(),
            orphans: Vec::new(),
            capacity: args.capacity.max(1),
            next_stamp: 0,
            tpq: QueuedPool::new(args.n_threads.max(1)),
        }
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn contains(&self, idx: usize) -> bool {
        self.entries.contains_key(&idx)
    }

    fn reap_finished(&mut self) {
        for entry in self.entries.values_mut() {
            if let Some(job_id) = entry.job {
                if self.tpq.take_result(job_id).is_some() {
                    entry.job = None;
                }
            }
        }
        let tpq = &mut self.tpq;
        self.orphans
            .retain(|job_id| tpq.take_result(*job_id).is_none());
    }

    fn remove_entry(&mut self, idx: usize) {
        if let Some(entry) = self.entries.remove(&idx) {
            if let Some(job_id) = entry.job {
                self.orphans.push(job_id);
            }
        }
    }

    fn evict_to_capacity(&mut self, protected: Option<usize>) {
        while self.entries.len() >= self.capacity {
            let victim = self
                .entries
                .iter()
                .filter(|(idx, _)| Some(**idx) != protected)
                .min_by_key(|(_, entry)| entry.stamp)
                .map(|(idx, _)| *idx)
                .or_else(|| {
                    // the protected entry is all that is left
                    self.entries
                        .iter()
                        .min_by_key(|(_, entry)| entry.stamp)
                        .map(|(idx, _)| *idx)
                });
            match victim {
                Some(idx) => {
                    debug!("evicting page {idx}");
                    self.remove_entry(idx);
                }
                None => break,
            }
        }
    }

    /// Returns the handle for page `idx`. A healthy resident entry is
    /// reused, its recency refreshed and the priority of its still queued
    /// job updated. Otherwise `task` is scheduled as the single producer of
    /// the index, evicting the least recently requested entries other than
    /// `protected` if the cache is full. Entries whose producer failed are
    /// scheduled anew, failures never stick.
    pub fn get_or_create<F>(
        &mut self,
        idx: usize,
        protected: Option<usize>,
        prio: usize,
        delay: Duration,
        task: F,
    ) -> VolResult<DecodeHandle>
    where
        F: FnOnce() -> ResultContent + Send + 'static,
    {
        self.reap_finished();
        self.next_stamp += 1;
        let stamp = self.next_stamp;
        let mut failed_before = false;
        if let Some(entry) = self.entries.get_mut(&idx) {
            match entry.handle.try_result() {
                Some(Err(e)) => {
                    debug!("page {idx} failed before, scheduling anew, {e:?}");
                    failed_before = true;
                }
                _ => {
                    entry.stamp = stamp;
                    if let Some(job_id) = entry.job {
                        self.tpq.bump(job_id, prio)?;
                    }
                    return Ok(entry.handle.clone());
                }
            }
        }
        if failed_before {
            self.remove_entry(idx);
        }
        self.evict_to_capacity(protected);
        let handle = DecodeHandle::pending();
        let job_handle = handle.clone();
        let job_id = self
            .tpq
            .submit(Box::new(move || job_handle.fulfill(task())), prio, delay)?;
        debug!("scheduled decode of page {idx} as job {job_id}");
        self.entries.insert(
            idx,
            CacheEntry {
                handle: handle.clone(),
                stamp,
                job: Some(job_id),
            },
        );
        Ok(handle)
    }
}

#[cfg(test)]
use {
    crate::result::VolErrorKind,
    crate::tracing_setup::init_tracing_for_tests,
    crate::types::{ImageContent, ImageInfo, Shape},
    crate::volerr,
    image::{metadata::Orientation, DynamicImage, ImageBuffer, Rgb},
    std::sync::atomic::{AtomicUsize, Ordering},
    std::sync::Arc,
    std::thread,
    std::time::Instant,
};

#[cfg(test)]
fn make_test_content(idx: usize) -> ImageContent {
    let im = DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, Vec<u8>>::new(20, 20));
    let info = ImageInfo {
        format: None,
        orientation: Orientation::NoTransforms,
        n_bytes: 0,
    };
    ImageContent::new(im, &format!("page{idx}.png"), Shape::new(20, 20), info)
}
#[cfg(test)]
fn make_test_args(capacity: usize) -> CacheCfgArgs {
    CacheCfgArgs {
        n_prev_pages: 2,
        n_next_pages: 8,
        n_threads: 2,
        capacity,
    }
}

#[test]
fn test_exactly_once() {
    init_tracing_for_tests();
    let mut cache = DecodeCache::new(&make_test_args(8));
    let n_runs = Arc::new(AtomicUsize::new(0));
    let nr = Arc::clone(&n_runs);
    let h1 = cache
        .get_or_create(3, None, 1, Duration::ZERO, move || {
            nr.fetch_add(1, Ordering::SeqCst);
            Ok(make_test_content(3))
        })
        .unwrap();
    let nr = Arc::clone(&n_runs);
    let h2 = cache
        .get_or_create(3, None, 5, Duration::ZERO, move || {
            nr.fetch_add(1, Ordering::SeqCst);
            Ok(make_test_content(3))
        })
        .unwrap();
    assert_eq!(h1.wait().unwrap().path(), "page3.png");
    assert_eq!(h2.wait().unwrap().path(), "page3.png");
    assert_eq!(n_runs.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
}
#[test]
fn test_capacity_bound() {
    let mut cache = DecodeCache::new(&make_test_args(3));
    for idx in 0..6 {
        let h = cache
            .get_or_create(idx, Some(idx), 1, Duration::ZERO, move || {
                Ok(make_test_content(idx))
            })
            .unwrap();
        h.wait().unwrap();
        assert!(cache.len() <= 3);
        assert!(cache.contains(idx));
    }
    assert_eq!(cache.len(), 3);
}
#[test]
fn test_lru_and_protection() {
    let mut cache = DecodeCache::new(&make_test_args(2));
    for idx in 0..3 {
        let h = cache
            .get_or_create(idx, Some(idx), 1, Duration::ZERO, move || {
                Ok(make_test_content(idx))
            })
            .unwrap();
        h.wait().unwrap();
    }
    // the oldest request was evicted, the last two pages are resident
    assert!(!cache.contains(0));
    assert!(cache.contains(1));
    assert!(cache.contains(2));

    let mut cache = DecodeCache::new(&make_test_args(2));
    for idx in [5, 6, 7] {
        let h = cache
            .get_or_create(idx, Some(5), 1, Duration::ZERO, move || {
                Ok(make_test_content(idx))
            })
            .unwrap();
        h.wait().unwrap();
    }
    // 6 was older than 7 and 5 was protected
    assert!(cache.contains(5));
    assert!(!cache.contains(6));
    assert!(cache.contains(7));
}
#[test]
fn test_failure_retry() {
    init_tracing_for_tests();
    let mut cache = DecodeCache::new(&make_test_args(4));
    let n_runs = Arc::new(AtomicUsize::new(0));
    let nr = Arc::clone(&n_runs);
    let h = cache
        .get_or_create(0, None, 1, Duration::ZERO, move || {
            nr.fetch_add(1, Ordering::SeqCst);
            Err(volerr!(VolErrorKind::ReadFailure, "flaky read"))
        })
        .unwrap();
    assert_eq!(h.wait().unwrap_err().kind(), VolErrorKind::ReadFailure);
    let nr = Arc::clone(&n_runs);
    let h = cache
        .get_or_create(0, None, 1, Duration::ZERO, move || {
            nr.fetch_add(1, Ordering::SeqCst);
            Ok(make_test_content(0))
        })
        .unwrap();
    assert!(h.wait().is_ok());
    assert_eq!(n_runs.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 1);
}
#[test]
fn test_slow_decode_does_not_block_others() {
    let mut cache = DecodeCache::new(&make_test_args(4));
    let h_slow = cache
        .get_or_create(0, None, 1, Duration::ZERO, move || {
            thread::sleep(Duration::from_millis(300));
            Ok(make_test_content(0))
        })
        .unwrap();
    let before = Instant::now();
    let h_fast = cache
        .get_or_create(1, None, 2, Duration::ZERO, move || Ok(make_test_content(1)))
        .unwrap();
    h_fast.wait().unwrap();
    assert!(before.elapsed() < Duration::from_millis(250));
    h_slow.wait().unwrap();
}
#[test]
fn test_eviction_keeps_orphan_running() {
    let mut cache = DecodeCache::new(&make_test_args(1));
    let h_orphan = cache
        .get_or_create(0, None, 1, Duration::ZERO, move || {
            thread::sleep(Duration::from_millis(100));
            Ok(make_test_content(0))
        })
        .unwrap();
    let h_new = cache
        .get_or_create(1, Some(1), 2, Duration::ZERO, move || {
            Ok(make_test_content(1))
        })
        .unwrap();
    assert!(!cache.contains(0));
    assert!(cache.contains(1));
    h_new.wait().unwrap();
    // the evicted decode still runs to completion for its handle holders
    assert_eq!(h_orphan.wait().unwrap().path(), "page0.png");
}
#[test]
fn test_orphaned_results_are_reaped() {
    init_tracing_for_tests();
    let mut cache = DecodeCache::new(&CacheCfgArgs {
        n_threads: 1,
        ..make_test_args(1)
    });
    // the slow decode pins the single worker so later jobs stay pending
    let h_slow = cache
        .get_or_create(0, None, 1, Duration::ZERO, move || {
            thread::sleep(Duration::from_millis(200));
            Ok(make_test_content(0))
        })
        .unwrap();
    let mut handles = vec![h_slow];
    let mut orphaned_jobs = Vec::new();
    for idx in 1..=8 {
        orphaned_jobs.push(cache.entries[&(idx - 1)].job.unwrap());
        let h = cache
            .get_or_create(idx, Some(idx), 2, Duration::ZERO, move || {
                Ok(make_test_content(idx))
            })
            .unwrap();
        handles.push(h);
    }
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.orphans.len(), 8);
    for h in &handles {
        h.wait().unwrap();
    }
    for _ in 0..500 {
        cache.reap_finished();
        if cache.orphans.is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    // all jobs ran, their results must not linger in the pool
    assert!(cache.orphans.is_empty());
    for job_id in orphaned_jobs {
        assert!(cache.tpq.take_result(job_id).is_none());
    }
}
