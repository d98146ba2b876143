use crate::result::{to_vol, VolErrorKind, VolResult};
use tracing::{debug, error, info};

use std::{
    fmt::{self, Debug, Display, Formatter},
    sync::mpsc::{self, Receiver, Sender},
    thread,
    time::{Duration, Instant},
};

type Job<T> = Box<dyn FnOnce() -> T + Send + 'static>;

/// Identifies one job for priority updates and result collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);
impl Display for JobId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

enum Message<J> {
    Terminate,
    NewJob(J),
}

fn take_result_from<T>(
    rx: &mut Receiver<(JobId, T)>,
    pending: &mut Vec<(JobId, T)>,
    job_id: JobId,
) -> Option<T> {
    pending.extend(rx.try_iter());
    let idx = pending.iter().position(|(jid, _)| *jid == job_id)?;
    Some(pending.swap_remove(idx).1)
}

fn run_job<T>(job_id: JobId, f: Job<T>, tx: &Sender<(JobId, T)>, idx_thread: usize) {
    match tx.send((job_id, f())) {
        Ok(_) => {
            debug!("worker {idx_thread} finished job {job_id}");
        }
        Err(e) => {
            error!("worker {idx_thread} could not send result of job {job_id}, receiver gone");
            error!("error: {e:?}");
        }
    }
}

type TxToWorker<T> = Sender<Message<(JobId, Job<T>)>>;

/// Fixed set of workers with round robin dispatch. Jobs run as soon as a
/// worker picks them up, ordering and delays are the business of
/// [`QueuedPool`](QueuedPool).
pub struct ThreadPool<T: Send + 'static> {
    txs_to_workers: Vec<TxToWorker<T>>,
    rx_from_workers: Receiver<(JobId, T)>,
    next_worker: usize,
    pending_results: Vec<(JobId, T)>,
}
impl<T: Send + 'static> ThreadPool<T> {
    pub fn new(n_threads: usize) -> Self {
        let mut txs_to_workers = Vec::with_capacity(n_threads);
        let (tx_from_workers, rx_from_workers) = mpsc::channel();
        for idx_thread in 0..n_threads {
            let (tx_to_worker, rx_to_worker) = mpsc::channel();
            txs_to_workers.push(tx_to_worker);
            let tx = tx_from_workers.clone();
            let worker = move || -> VolResult<()> {
                info!("spawning worker {idx_thread}");
                loop {
                    let msg = rx_to_worker
                        .recv()
                        .map_err(to_vol(VolErrorKind::Internal))?;
                    match msg {
                        Message::Terminate => {
                            info!("shut down worker {idx_thread}");
                            return Ok(());
                        }
                        Message::NewJob((job_id, f)) => {
                            run_job(job_id, f, &tx, idx_thread);
                        }
                    }
                }
            };
            thread::spawn(worker);
        }
        ThreadPool {
            txs_to_workers,
            rx_from_workers,
            next_worker: 0,
            pending_results: vec![],
        }
    }

    fn dispatch(&mut self, job_id: JobId, f: Job<T>) -> VolResult<()> {
        if self.next_worker == self.txs_to_workers.len() {
            self.next_worker = 0;
        }
        debug!("dispatching job {job_id}");
        self.txs_to_workers[self.next_worker]
            .send(Message::NewJob((job_id, f)))
            .map_err(to_vol(VolErrorKind::Internal))?;
        self.next_worker += 1;
        Ok(())
    }

    pub fn take_result(&mut self, job_id: JobId) -> Option<T> {
        take_result_from(&mut self.rx_from_workers, &mut self.pending_results, job_id)
    }
}

fn terminate_all_workers<T: Send + 'static>(tp: &ThreadPool<T>) -> VolResult<()> {
    for tx in &tp.txs_to_workers {
        tx.send(Message::Terminate)
            .map_err(to_vol(VolErrorKind::Internal))?;
    }
    Ok(())
}

impl<T: Send + 'static> Drop for ThreadPool<T> {
    fn drop(&mut self) {
        if let Err(e) = terminate_all_workers(self) {
            error!("error when dropping threadpool, {e:?}");
        }
    }
}

struct QueuedJob<T: Send + 'static> {
    f: Job<T>,
    prio: usize,
    delay: Duration,
    id: JobId,
    submitted: Instant,
}
impl<T: Send + 'static> Debug for QueuedJob<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "job id: {}, prio: {}, delay: {:?}, submitted: {:?}",
            self.id, self.prio, self.delay, self.submitted
        )
    }
}

fn bump_prio<T: Send + 'static>(id: JobId, new_prio: usize, queue: &mut Vec<QueuedJob<T>>) {
    if let Some(job) = queue.iter_mut().find(|j| j.id == id) {
        job.prio = new_prio;
    }
}

// Dispatch the queued job with the highest priority whose delay has passed,
// if a worker is free.
fn dispatch_best<T: Send + 'static>(
    n_threads: usize,
    running: &mut Vec<JobId>,
    queue: &mut Vec<QueuedJob<T>>,
    tp: &mut ThreadPool<T>,
) -> VolResult<()> {
    if running.len() < n_threads {
        let best_idx = queue
            .iter()
            .enumerate()
            .filter(|(_, j)| j.submitted.elapsed() >= j.delay)
            .max_by_key(|(_, j)| j.prio)
            .map(|(idx, _)| idx);
        if let Some(best_idx) = best_idx {
            let job = queue.swap_remove(best_idx);
            running.push(job.id);
            tp.dispatch(job.id, job.f)?;
        }
    }
    Ok(())
}

/// Scheduler in front of a [`ThreadPool`](ThreadPool). Submitted jobs wait in
/// a queue until their delay has passed and a worker is free, then the job
/// with the highest priority goes first. Priorities of queued jobs can be
/// changed as long as they have not started.
pub struct QueuedPool<T: Send + 'static> {
    next_id: u64,
    tx_jobs: Sender<Message<QueuedJob<T>>>,
    rx_results: Receiver<(JobId, T)>,
    tx_prios: Sender<(JobId, usize)>,
    pending_results: Vec<(JobId, T)>,
}
impl<T: Send + 'static> QueuedPool<T> {
    pub fn new(n_threads: usize) -> Self {
        let (tx_jobs, rx_jobs) = mpsc::channel();
        let (tx_results, rx_results) = mpsc::channel();
        let (tx_prios, rx_prios) = mpsc::channel();
        let scheduler = move || -> VolResult<()> {
            let mut tp: ThreadPool<T> = ThreadPool::new(n_threads);
            let mut queue: Vec<QueuedJob<T>> = Vec::new();
            let mut running: Vec<JobId> = Vec::new();
            loop {
                for msg in rx_jobs.try_iter() {
                    match msg {
                        Message::Terminate => {
                            return Ok(());
                        }
                        Message::NewJob(job) => {
                            queue.push(job);
                        }
                    }
                }
                for (id, new_prio) in rx_prios.try_iter() {
                    bump_prio(id, new_prio, &mut queue);
                }

                dispatch_best(n_threads, &mut running, &mut queue, &mut tp)?;

                let mut still_running = Vec::with_capacity(running.len());
                for id in running.drain(..) {
                    match tp.take_result(id) {
                        Some(res) => {
                            tx_results
                                .send((id, res))
                                .map_err(to_vol(VolErrorKind::Internal))?;
                        }
                        None => still_running.push(id),
                    }
                }
                running = still_running;
                thread::sleep(Duration::from_millis(1));
            }
        };
        thread::spawn(scheduler);
        QueuedPool {
            next_id: 0,
            tx_jobs,
            rx_results,
            tx_prios,
            pending_results: vec![],
        }
    }

    pub fn submit(&mut self, f: Job<T>, prio: usize, delay: Duration) -> VolResult<JobId> {
        let id = JobId(self.next_id);
        self.tx_jobs
            .send(Message::NewJob(QueuedJob {
                f,
                prio,
                delay,
                id,
                submitted: Instant::now(),
            }))
            .map_err(to_vol(VolErrorKind::Internal))?;
        self.next_id = self.next_id.wrapping_add(1);
        Ok(id)
    }

    /// Updates the priority of a job that has not started yet.
    pub fn bump(&self, job_id: JobId, new_prio: usize) -> VolResult<()> {
        self.tx_prios
            .send((job_id, new_prio))
            .map_err(to_vol(VolErrorKind::Internal))
    }

    pub fn take_result(&mut self, job_id: JobId) -> Option<T> {
        take_result_from(&mut self.rx_results, &mut self.pending_results, job_id)
    }
}
impl<T: Send + 'static> Drop for QueuedPool<T> {
    fn drop(&mut self) {
        if let Err(e) = self.tx_jobs.send(Message::Terminate) {
            error!("error when dropping queued pool, {e:?}");
        }
    }
}

#[cfg(test)]
fn make_test_job_sleep(res: i32, sleep_ms: u64) -> Job<i32> {
    Box::new(move || {
        thread::sleep(Duration::from_millis(sleep_ms));
        res
    })
}
#[cfg(test)]
fn make_test_job(res: i32) -> Job<i32> {
    make_test_job_sleep(res, 20)
}
#[cfg(test)]
fn make_test_queue() -> Vec<QueuedJob<i32>> {
    let mut queue = vec![];
    for i in 0..20 {
        queue.push(QueuedJob {
            prio: 1,
            id: JobId(i),
            f: make_test_job(i as i32),
            submitted: Instant::now(),
            delay: Duration::ZERO,
        });
    }
    queue
}
#[cfg(test)]
fn wait_for_result<T: Send + 'static>(tpq: &mut QueuedPool<T>, job_id: JobId) -> Option<T> {
    for _ in 0..500 {
        if let Some(res) = tpq.take_result(job_id) {
            return Some(res);
        }
        thread::sleep(Duration::from_millis(2));
    }
    None
}
#[test]
fn test_bump() {
    let mut queue = make_test_queue();
    bump_prio(JobId(0), 234, &mut queue);
    bump_prio(JobId(13), 577, &mut queue);
    assert_eq!(
        queue.iter().find(|j| j.id == JobId(0)).map(|j| j.prio),
        Some(234)
    );
    assert_eq!(
        queue.iter().find(|j| j.id == JobId(13)).map(|j| j.prio),
        Some(577)
    );
    assert_eq!(
        queue.iter().find(|j| j.id == JobId(1)).map(|j| j.prio),
        Some(1)
    );
}
#[test]
fn test_dispatch_best() -> VolResult<()> {
    let n_threads = 2;
    let mut tp = ThreadPool::<i32>::new(n_threads);
    let mut queue = make_test_queue();
    let mut running = vec![];
    bump_prio(JobId(0), 234, &mut queue);
    bump_prio(JobId(13), 577, &mut queue);
    dispatch_best(n_threads, &mut running, &mut vec![], &mut tp)?;
    assert_eq!(running.len(), 0);
    dispatch_best(n_threads, &mut running, &mut queue, &mut tp)?;
    assert!(running.contains(&JobId(13)));
    assert!(!queue.iter().any(|j| j.id == JobId(13)));
    dispatch_best(n_threads, &mut running, &mut queue, &mut tp)?;
    assert!(running.contains(&JobId(0)));
    assert!(!queue.iter().any(|j| j.id == JobId(0)));
    let n_threads = 20;
    let mut tp = ThreadPool::<i32>::new(n_threads);
    let mut queue = make_test_queue();
    let mut running = vec![];
    queue[0].delay = Duration::from_millis(1000);
    for _ in 0..20 {
        dispatch_best(n_threads, &mut running, &mut queue, &mut tp)?;
    }
    assert!(!running.contains(&JobId(0)));
    assert!(running.contains(&JobId(1)));
    Ok(())
}
#[test]
fn test_queued_pool() -> VolResult<()> {
    let mut tpq = QueuedPool::new(1);
    let jid = tpq.submit(make_test_job(17), 0, Duration::ZERO)?;
    assert_eq!(wait_for_result(&mut tpq, jid), Some(17));
    assert_eq!(tpq.take_result(jid), None);
    let jid1 = tpq.submit(make_test_job(11), 0, Duration::ZERO)?;
    let jid2 = tpq.submit(make_test_job(12), 0, Duration::ZERO)?;
    assert_eq!(wait_for_result(&mut tpq, jid1), Some(11));
    assert_eq!(wait_for_result(&mut tpq, jid2), Some(12));
    Ok(())
}
#[test]
fn test_queued_prio() -> VolResult<()> {
    let mut tpq = QueuedPool::new(1);
    let ref_lo = 47;
    let ref_hi = 23;
    let j_lo = make_test_job_sleep(ref_lo, 200);
    let j_hi = make_test_job_sleep(ref_hi, 200);
    let jid_hi = tpq.submit(j_hi, 50, Duration::ZERO)?;
    let jid_lo = tpq.submit(j_lo, 49, Duration::ZERO)?;
    thread::sleep(Duration::from_millis(300));
    assert_eq!(tpq.take_result(jid_hi), Some(ref_hi));
    assert_eq!(tpq.take_result(jid_lo), None);
    assert_eq!(wait_for_result(&mut tpq, jid_lo), Some(ref_lo));
    Ok(())
}
#[test]
fn test_queued_delay() -> VolResult<()> {
    let mut tpq = QueuedPool::new(1);
    let ref_lo = 47;
    let ref_hi = 23;
    let j_lo = make_test_job_sleep(ref_lo, 200);
    let j_hi = make_test_job_sleep(ref_hi, 200);
    let jid_hi = tpq.submit(j_hi, 50, Duration::from_millis(350))?;
    let jid_lo = tpq.submit(j_lo, 49, Duration::ZERO)?;
    thread::sleep(Duration::from_millis(300));
    assert_eq!(tpq.take_result(jid_hi), None);
    assert_eq!(tpq.take_result(jid_lo), Some(ref_lo));
    assert_eq!(wait_for_result(&mut tpq, jid_hi), Some(ref_hi));
    Ok(())
}
#[test]
fn test_queued_bump_order() -> VolResult<()> {
    let mut tpq = QueuedPool::new(1);
    let jid_1 = tpq.submit(make_test_job_sleep(5, 20), 0, Duration::from_millis(30))?;
    let jid_2 = tpq.submit(make_test_job_sleep(10, 20), 1, Duration::from_millis(30))?;
    tpq.bump(jid_1, 10)?;
    let mut res_2 = None;
    for _ in 0..250 {
        thread::sleep(Duration::from_millis(1));
        let res_1 = tpq.take_result(jid_1);
        if res_2.is_none() {
            res_2 = tpq.take_result(jid_2);
        }
        // the bumped job must not finish after the other one
        assert!(!(res_1.is_none() && res_2.is_some()));
        if res_1.is_some() {
            break;
        }
    }
    if res_2.is_none() {
        res_2 = wait_for_result(&mut tpq, jid_2);
    }
    assert_eq!(res_2, Some(10));
    Ok(())
}
#[test]
fn test_pool_roundrobin() -> VolResult<()> {
    let mut tp = ThreadPool::new(4);
    for i in 0..20 {
        let job = Box::new(move || {
            thread::sleep(Duration::from_millis(10));
            i
        });
        let job_id = JobId(i as u64);
        tp.dispatch(job_id, job)?;
        let mut res = None;
        for _ in 0..100 {
            res = tp.take_result(job_id);
            if res.is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(res, Some(i));
    }
    assert_eq!(tp.pending_results.len(), 0);
    Ok(())
}
