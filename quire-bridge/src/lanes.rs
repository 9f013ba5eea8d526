use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed pool of I/O worker threads with per-key ordering.
///
/// Every job carries a key (a file path). Jobs with the same key always land
/// on the same worker and run in submission order; jobs with different keys
/// may run concurrently and complete in any order. A job with several keys
/// runs after everything queued earlier under any of them, and holds back
/// later work on all of them until it finishes. Dropping the pool drains
/// whatever is queued and joins the workers.
pub struct IoLanes {
    senders: Vec<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    // Multi-lane jobs enqueue under this so every lane sees them in one order.
    fan_out: Mutex<()>,
}

impl IoLanes {
    pub fn new(count: usize) -> Self {
        let mut senders = Vec::new();
        let mut workers = Vec::new();

        for index in 0..count.max(1) {
            let (tx, rx) = unbounded::<Job>();
            let spawned = std::thread::Builder::new()
                .name(format!("quire-io-{}", index))
                .spawn(move || {
                    for job in rx {
                        if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                            log::error!("I/O job panicked: {}", panic_message(&*payload));
                        }
                    }
                });
            match spawned {
                Ok(handle) => {
                    senders.push(tx);
                    workers.push(handle);
                }
                Err(e) => log::error!("Failed to spawn I/O worker {}: {}", index, e),
            }
        }

        if senders.is_empty() {
            log::warn!("No I/O workers available, running jobs on the calling thread");
        }
        IoLanes {
            senders,
            workers,
            fan_out: Mutex::new(()),
        }
    }

    pub fn lane_count(&self) -> usize {
        self.senders.len()
    }

    pub fn submit<F>(&self, key: &str, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.senders.is_empty() {
            job();
            return;
        }
        self.send_to(self.lane_for(key), Box::new(job));
    }

    /// Run `job` once, ordered against every key in `keys`.
    ///
    /// The job runs on the lane of its first key. Every other lane involved
    /// gets a barrier that parks that lane until the job is done, and the job
    /// itself starts only once all barriers have been reached.
    pub fn submit_many<F>(&self, keys: &[&str], job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.senders.is_empty() {
            job();
            return;
        }
        let mut lanes: Vec<usize> = keys.iter().map(|k| self.lane_for(k)).collect();
        let home = lanes.first().copied().unwrap_or(0);
        lanes.retain(|&lane| lane != home);
        lanes.sort_unstable();
        lanes.dedup();
        if lanes.is_empty() {
            self.send_to(home, Box::new(job));
            return;
        }

        let _order = self.fan_out.lock();
        let (arrived_tx, arrived_rx) = unbounded::<()>();
        let (release_tx, release_rx) = unbounded::<()>();

        for &lane in &lanes {
            let arrived = arrived_tx.clone();
            let release = release_rx.clone();
            let barrier: Job = Box::new(move || {
                let _ = arrived.send(());
                // Returns once the job drops `release_tx`.
                let _ = release.recv();
            });
            if self.senders[lane].send(barrier).is_err() {
                log::warn!("I/O lane {} closed, not holding it for a multi-key job", lane);
                let _ = arrived_tx.send(());
            }
        }
        drop(arrived_tx);

        let waiting = lanes.len();
        self.send_to(
            home,
            Box::new(move || {
                for _ in 0..waiting {
                    if arrived_rx.recv().is_err() {
                        break;
                    }
                }
                job();
                drop(release_tx);
            }),
        );
    }

    fn send_to(&self, lane: usize, job: Job) {
        if let Err(e) = self.senders[lane].send(job) {
            // The worker is gone; run the job here rather than lose it.
            log::warn!("I/O lane {} closed, running job inline", lane);
            (e.into_inner())();
        }
    }

    /// Block until every job submitted before this call has finished.
    pub fn wait_idle(&self) {
        let (done_tx, done_rx) = unbounded::<()>();
        let mut pending = 0;
        for sender in &self.senders {
            let done = done_tx.clone();
            let marker: Job = Box::new(move || {
                let _ = done.send(());
            });
            if sender.send(marker).is_ok() {
                pending += 1;
            }
        }
        drop(done_tx);
        for _ in 0..pending {
            if done_rx.recv().is_err() {
                break;
            }
        }
    }

    fn lane_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }
}

impl Drop for IoLanes {
    fn drop(&mut self) {
        self.senders.clear();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
