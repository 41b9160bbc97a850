//! Worker pool running user callbacks off the hook thread.
//!
//! Submission is a non-blocking enqueue; the hook thread never runs user
//! code. A callback that hands back a future is forwarded to the lazy async
//! executor instead of being driven on the worker.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::debug;

use crate::async_exec::AsyncLoopThread;
use crate::bind::Callback;
use crate::logging;

/// Fixed-size worker pool over an unbounded queue. `None` is the shutdown
/// sentinel, one per worker.
pub struct CallbackDispatcher {
    queue: Sender<Option<Callback>>,
    workers: usize,
    threads: Mutex<Vec<JoinHandle<()>>>,
    async_loop: Arc<AsyncLoopThread>,
}

impl CallbackDispatcher {
    pub fn new(workers: usize) -> Self {
        Self::with_async_loop(workers, AsyncLoopThread::new())
    }

    /// Use a caller-provided tokio runtime for async callbacks instead of
    /// the lazily started internal one.
    pub fn with_runtime(workers: usize, handle: tokio::runtime::Handle) -> Self {
        Self::with_async_loop(workers, AsyncLoopThread::with_handle(handle))
    }

    fn with_async_loop(workers: usize, async_loop: AsyncLoopThread) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = unbounded::<Option<Callback>>();
        let async_loop = Arc::new(async_loop);

        let mut threads = Vec::with_capacity(workers);
        for index in 0..workers {
            let rx: Receiver<Option<Callback>> = rx.clone();
            let forward = Arc::clone(&async_loop);
            let handle = thread::Builder::new()
                .name(format!("bind-worker-{index}"))
                .spawn(move || worker_loop(rx, forward))
                .expect("worker thread spawn");
            threads.push(handle);
        }

        Self {
            queue: tx,
            workers,
            threads: Mutex::new(threads),
            async_loop,
        }
    }

    /// Enqueue a callback for execution. Never blocks.
    pub fn submit(&self, callback: Callback) {
        let _ = self.queue.send(Some(callback));
    }

    /// Drain the pool: one sentinel per worker, then join them. Idempotent.
    pub fn stop(&self) {
        for _ in 0..self.workers {
            let _ = self.queue.send(None);
        }
        let mut threads = self.threads.lock().unwrap();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        self.async_loop.stop();
    }
}

fn worker_loop(rx: Receiver<Option<Callback>>, async_loop: Arc<AsyncLoopThread>) {
    while let Ok(item) = rx.recv() {
        let Some(callback) = item else {
            debug!("worker draining on sentinel");
            return;
        };

        // User code must never take a worker down with it.
        match catch_unwind(AssertUnwindSafe(|| callback())) {
            Ok(Some(task)) => async_loop.submit(task),
            Ok(None) => {}
            Err(payload) => logging::report_swallowed_panic("bind callback", payload.as_ref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::into_callback;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};

    fn wait_for(predicate: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !predicate() {
            assert!(Instant::now() < deadline, "timed out waiting on condition");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn runs_submitted_callbacks() {
        let pool = CallbackDispatcher::new(2);
        let hits = Arc::new(AtomicU32::new(0));

        for _ in 0..10 {
            let counter = Arc::clone(&hits);
            pool.submit(into_callback(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        wait_for(|| hits.load(Ordering::SeqCst) == 10);
        pool.stop();
    }

    #[test]
    fn workers_survive_panicking_callbacks() {
        let pool = CallbackDispatcher::new(1);
        let hits = Arc::new(AtomicU32::new(0));

        pool.submit(into_callback(|| -> () { panic!("user bug") }));
        let counter = Arc::clone(&hits);
        pool.submit(into_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        wait_for(|| hits.load(Ordering::SeqCst) == 1);
        pool.stop();
    }

    #[test]
    fn async_callbacks_reach_the_executor() {
        let pool = CallbackDispatcher::new(1);
        let hits = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&hits);
        pool.submit(into_callback(move || {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        wait_for(|| hits.load(Ordering::SeqCst) == 1);
        pool.stop();
    }

    #[test]
    fn submission_order_is_preserved_on_one_worker() {
        let pool = CallbackDispatcher::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..20u32 {
            let log = Arc::clone(&seen);
            pool.submit(into_callback(move || {
                log.lock().unwrap().push(i);
            }));
        }

        wait_for(|| seen.lock().unwrap().len() == 20);
        assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
        pool.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let pool = CallbackDispatcher::new(2);
        pool.stop();
        pool.stop();
    }
}
