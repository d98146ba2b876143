use crate::types::ResultContent;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Slot {
    result: Mutex<Option<ResultContent>>,
    ready: Condvar,
}

/// Write-once cell for the outcome of one scheduled decode. The producer
/// calls [`fulfill`](Self::fulfill) exactly once, any number of cloned
/// handles observe the same result via [`wait`](Self::wait) or
/// [`try_result`](Self::try_result).
#[derive(Clone)]
pub struct DecodeHandle {
    slot: Arc<Slot>,
}
impl DecodeHandle {
    pub fn pending() -> Self {
        DecodeHandle {
            slot: Arc::new(Slot::default()),
        }
    }
    fn lock_slot(&self) -> MutexGuard<'_, Option<ResultContent>> {
        // a fulfilled slot stays valid even if some reader panicked
        self.slot
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
    /// Stores the result and wakes all waiters. Later calls are ignored, the
    /// first write is the terminal result every reader sees.
    pub fn fulfill(&self, res: ResultContent) {
        let mut slot = self.lock_slot();
        if slot.is_none() {
            *slot = Some(res);
            self.slot.ready.notify_all();
        }
    }
    /// Blocks until the producer has fulfilled the handle.
    pub fn wait(&self) -> ResultContent {
        let mut slot = self.lock_slot();
        loop {
            if let Some(res) = slot.as_ref() {
                return res.clone();
            }
            slot = self
                .slot
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
    /// The result if the decode has finished, `None` while it is pending.
    pub fn try_result(&self) -> Option<ResultContent> {
        self.lock_slot().clone()
    }
}

#[cfg(test)]
use {
    crate::result::VolErrorKind,
    crate::types::{ImageContent, ImageInfo, Shape},
    crate::volerr,
    image::{metadata::Orientation, DynamicImage, ImageBuffer, Rgb},
    std::thread,
    std::time::Duration,
};

#[cfg(test)]
fn make_test_content(path: &str) -> ImageContent {
    let im = DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, Vec<u8>>::new(20, 20));
    let info = ImageInfo {
        format: None,
        orientation: Orientation::NoTransforms,
        n_bytes: 0,
    };
    ImageContent::new(im, path, Shape::new(20, 20), info)
}

#[test]
fn test_handle() {
    let handle = DecodeHandle::pending();
    assert!(handle.try_result().is_none());
    let producer = handle.clone();
    let waiter = handle.clone();
    let join_handle = thread::spawn(move || waiter.wait());
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        producer.fulfill(Ok(make_test_content("page1.png")));
    });
    let from_thread = join_handle.join().unwrap().unwrap();
    let from_wait = handle.wait().unwrap();
    assert_eq!(from_thread.path(), "page1.png");
    assert_eq!(from_wait.path(), "page1.png");
    assert!(handle.try_result().is_some());
}
#[test]
fn test_handle_write_once() {
    let handle = DecodeHandle::pending();
    handle.fulfill(Err(volerr!(VolErrorKind::ReadFailure, "disk gone")));
    handle.fulfill(Ok(make_test_content("page1.png")));
    let res = handle.wait();
    assert_eq!(res.unwrap_err().kind(), VolErrorKind::ReadFailure);
}
