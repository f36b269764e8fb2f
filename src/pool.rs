//! Bulk-synchronous worker pool: a fixed set of OS threads that execute one
//! kernel invocation in lockstep per phase, then block until the next one is
//! handed out.
//!
//! Worker 0 is the calling thread itself — `ThreadPool::with_workers(1)`
//! degenerates to a direct call with no thread handoff at all, which is the
//! path single-threaded callers take.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::DeviceError;

/// A unit of work handed to every worker for one phase: a closure receiving
/// its own worker index and the total worker count, run once per worker.
type Job = Arc<dyn Fn(u32, u32) + Send + Sync>;

/// The single piece of mutable state guarded by [`Shared::cond`]'s mutex:
/// the phase counter, the current job, the per-phase completion count, and
/// the shutdown flag. Spec §4.7/§5 mandate one mutex covering all of
/// `interrupt`/`phase`/`num_completed`/payload — a `parking_lot::Condvar`
/// may only ever be waited on against one mutex at a time, so splitting
/// these fields across separate `Mutex`es (one waited on by the main
/// thread, another by parked workers) panics the first time both sides
/// wait on the same condvar concurrently.
struct PoolState {
    phase: u64,
    completed: u32,
    job: Option<Job>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    cond: Condvar,
    worker_count: u32,
}

/// Owns the worker threads and the phase-barrier protocol used to hand them
/// kernel closures one phase at a time.
pub struct ThreadPool {
    shared: Arc<Shared>,
    handles: Vec<std::thread::JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawns `worker_count - 1` background threads; worker 0 runs on the
    /// calling thread during [`ThreadPool::parallel_for`].
    pub fn with_workers(worker_count: u32) -> Result<ThreadPool, DeviceError> {
        assert!(worker_count >= 1, "worker_count must be at least 1");
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                phase: 0,
                completed: 0,
                job: None,
                shutdown: false,
            }),
            cond: Condvar::new(),
            worker_count,
        });

        let mut handles = Vec::with_capacity((worker_count - 1) as usize);
        for idx in 1..worker_count {
            let shared = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name(format!("cpu-worker-{idx}"))
                .spawn(move || worker_loop(shared, idx));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    shutdown(&shared);
                    for h in handles {
                        let _ = h.join();
                    }
                    return Err(DeviceError::ThreadSpawn { index: idx, source });
                }
            }
        }

        tracing::info!(worker_count, "thread pool started");
        Ok(ThreadPool { shared, handles })
    }

    pub fn worker_count(&self) -> u32 {
        self.shared.worker_count
    }

    /// Runs `f(worker_idx, worker_count)` on every worker and blocks until
    /// all have finished — one barrier-synchronized phase.
    pub fn parallel_for<F>(&self, f: F)
    where
        F: Fn(u32, u32) + Send + Sync + 'static,
    {
        let worker_count = self.shared.worker_count;
        if worker_count == 1 {
            f(0, 1);
            return;
        }

        let job: Job = Arc::new(f);
        {
            let mut state = self.shared.state.lock();
            state.job = Some(job);
            state.completed = 0;
            state.phase += 1;
        }
        self.shared.cond.notify_all();

        // Worker 0 runs on the calling thread.
        let job0 = self.shared.state.lock().job.clone();
        if let Some(job0) = job0 {
            job0(0, worker_count);
        }
        mark_done(&self.shared);

        let mut state = self.shared.state.lock();
        while state.completed < worker_count {
            self.shared.cond.wait(&mut state);
        }
    }
}

fn mark_done(shared: &Shared) {
    let mut state = shared.state.lock();
    state.completed += 1;
    shared.cond.notify_all();
}

fn shutdown(shared: &Shared) {
    let mut state = shared.state.lock();
    state.shutdown = true;
    drop(state);
    shared.cond.notify_all();
}

fn worker_loop(shared: Arc<Shared>, idx: u32) {
    let mut last_seen_phase = 0u64;
    loop {
        let job = {
            let mut state = shared.state.lock();
            while state.phase == last_seen_phase && !state.shutdown {
                shared.cond.wait(&mut state);
            }
            if state.shutdown {
                return;
            }
            last_seen_phase = state.phase;
            state.job.clone()
        };
        if let Some(job) = job {
            job(idx, shared.worker_count);
        }
        mark_done(&shared);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        shutdown(&self.shared);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        tracing::info!("thread pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn single_worker_runs_inline() {
        let pool = ThreadPool::with_workers(1).unwrap();
        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = Arc::clone(&seen);
        pool.parallel_for(move |idx, count| {
            assert_eq!(idx, 0);
            assert_eq!(count, 1);
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn every_worker_runs_exactly_once() {
        let pool = ThreadPool::with_workers(4).unwrap();
        let count = Arc::new(AtomicU32::new(0));
        for _ in 0..5 {
            let count2 = Arc::clone(&count);
            pool.parallel_for(move |_idx, _total| {
                count2.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn phases_execute_one_at_a_time() {
        let pool = ThreadPool::with_workers(8).unwrap();
        let in_flight = Arc::new(AtomicU32::new(0));
        let max_in_flight = Arc::new(AtomicU32::new(0));
        for _ in 0..10 {
            let in_flight2 = Arc::clone(&in_flight);
            let max2 = Arc::clone(&max_in_flight);
            pool.parallel_for(move |_idx, _total| {
                let n = in_flight2.fetch_add(1, Ordering::SeqCst) + 1;
                max2.fetch_max(n, Ordering::SeqCst);
                in_flight2.fetch_sub(1, Ordering::SeqCst);
            });
        }
        assert!(max_in_flight.load(Ordering::SeqCst) <= 8);
    }
}
