//! Lazy executor for futures returned by async bind callbacks.
//!
//! Nothing is started until the first async callback shows up; then a
//! current-thread tokio runtime is spun up on a dedicated thread and kept
//! parked on its task queue. A caller-provided runtime handle bypasses the
//! internal thread entirely.

use std::sync::Mutex;

use log::error;
use tokio::runtime::{Builder, Handle};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use crate::bind::TaskFuture;

enum LoopState {
    /// Internal runtime not started yet.
    Idle,
    /// Internal runtime pumping on its own thread.
    Running {
        sender: UnboundedSender<TaskFuture>,
        thread: std::thread::JoinHandle<()>,
    },
    Stopped,
}

pub struct AsyncLoopThread {
    external: Option<Handle>,
    state: Mutex<LoopState>,
}

impl AsyncLoopThread {
    pub fn new() -> Self {
        Self {
            external: None,
            state: Mutex::new(LoopState::Idle),
        }
    }

    /// Drive tasks on a caller-owned runtime. Assumed to be running.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            external: Some(handle),
            state: Mutex::new(LoopState::Idle),
        }
    }

    /// Submit one task. Starts the internal runtime on first use.
    pub fn submit(&self, task: TaskFuture) {
        if let Some(handle) = &self.external {
            spawn_monitored(handle, task);
            return;
        }

        let mut state = self.state.lock().unwrap();
        match &*state {
            LoopState::Stopped => {}
            LoopState::Running { sender, .. } => {
                let _ = sender.send(task);
            }
            LoopState::Idle => {
                let (sender, mut receiver) = unbounded_channel::<TaskFuture>();
                let thread = std::thread::Builder::new()
                    .name("keychord-async".to_string())
                    .spawn(move || {
                        let runtime = match Builder::new_current_thread().enable_time().build() {
                            Ok(rt) => rt,
                            Err(err) => {
                                error!("async executor failed to start: {err}");
                                return;
                            }
                        };
                        runtime.block_on(async move {
                            while let Some(task) = receiver.recv().await {
                                let handle = Handle::current();
                                spawn_monitored(&handle, task);
                            }
                        });
                    })
                    .expect("async thread spawn");
                let _ = sender.send(task);
                *state = LoopState::Running { sender, thread };
            }
        }
    }

    /// Shut the internal runtime down; external runtimes are left alone.
    /// In-flight tasks finish best-effort before the thread exits.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        if let LoopState::Running { thread, .. } =
            std::mem::replace(&mut *state, LoopState::Stopped)
        {
            // Dropping the sender ends the receive loop; the runtime then
            // drops and cancels anything still pending.
            drop(state);
            let _ = thread.join();
        }
    }
}

impl Default for AsyncLoopThread {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_monitored(handle: &Handle, task: TaskFuture) {
    let join = handle.spawn(task);
    handle.spawn(async move {
        if let Err(err) = join.await {
            if err.is_panic() {
                let payload = err.into_panic();
                crate::logging::report_swallowed_panic("async bind callback", payload.as_ref());
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn wait_for(predicate: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !predicate() {
            assert!(Instant::now() < deadline, "timed out waiting on condition");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn drives_submitted_tasks() {
        let exec = AsyncLoopThread::new();
        let hits = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&hits);
            exec.submit(Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        wait_for(|| hits.load(Ordering::SeqCst) == 3);
        exec.stop();
    }

    #[test]
    fn survives_panicking_tasks() {
        let exec = AsyncLoopThread::new();
        let hits = Arc::new(AtomicU32::new(0));

        exec.submit(Box::pin(async {
            panic!("async user bug");
        }));
        let counter = Arc::clone(&hits);
        exec.submit(Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        wait_for(|| hits.load(Ordering::SeqCst) == 1);
        exec.stop();
    }

    #[test]
    fn submit_after_stop_is_a_no_op() {
        let exec = AsyncLoopThread::new();
        exec.stop();
        exec.submit(Box::pin(async {}));
    }

    #[test]
    fn external_runtime_is_used_directly() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let exec = AsyncLoopThread::with_handle(runtime.handle().clone());
        let hits = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&hits);
        exec.submit(Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        wait_for(|| hits.load(Ordering::SeqCst) == 1);
        exec.stop();
    }
}
