//! Helpers for concurrency tests.
//!
//! Threads are released together through a barrier so their work
//! overlaps as much as possible.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a concurrent run.
#[derive(Debug, Clone)]
pub struct StressRun<R> {
    /// Every value returned, grouped by thread in spawn order.
    pub results: Vec<Vec<R>>,
    /// Wall time from release to the last thread finishing.
    pub duration: Duration,
}

impl<R> StressRun<R> {
    /// All results, flattened.
    pub fn flatten(self) -> Vec<R> {
        self.results.into_iter().flatten().collect()
    }

    /// Total number of operations performed.
    pub fn total(&self) -> usize {
        self.results.iter().map(Vec::len).sum()
    }
}

/// Runs `op(thread, iteration)` `per_thread` times on each of `threads`
/// threads, all starting at once.
pub fn run_concurrently<R, F>(threads: usize, per_thread: usize, op: F) -> StressRun<R>
where
    R: Send + 'static,
    F: Fn(usize, usize) -> R + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let barrier = Arc::new(Barrier::new(threads + 1));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let op = Arc::clone(&op);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..per_thread).map(|i| op(t, i)).collect::<Vec<R>>()
            })
        })
        .collect();

    barrier.wait();
    let start = Instant::now();
    let results = handles
        .into_iter()
        .map(|handle| handle.join().expect("stress thread panicked"))
        .collect();

    StressRun {
        results,
        duration: start.elapsed(),
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
///
/// Returns whether the condition held.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}
