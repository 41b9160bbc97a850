//! Bind evaluators and their shared plumbing.

pub mod keyboard;
pub mod mouse;
pub(crate) mod order;

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;

use crate::config::{Checks, FocusPolicy, Timing};
use crate::events::HookEvent;
use crate::state::StateView;
use crate::window::WindowTarget;

pub use keyboard::KeyBind;
pub use mouse::MouseBind;

/// Future produced by an async callback, driven on the executor thread.
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Erased user callback. Invoked on a worker thread; an async callback hands
/// back a future instead of doing the work inline.
pub type Callback = Arc<dyn Fn() -> Option<TaskFuture> + Send + Sync>;

/// Sink the bind submits fired callbacks to (the frontend's worker pool).
pub type DispatchFn = Arc<dyn Fn(Callback) + Send + Sync>;

/// Marker for callbacks that do their work inline and return `()`.
pub struct BlockingTask;
/// Marker for callbacks that hand back a future to drive.
pub struct DrivableTask;

/// Capability probe over callback return values: synchronous callbacks
/// return `()`, async callbacks return a future that gets forwarded to the
/// cooperative executor. The marker parameter keeps the two impls apart so
/// inference can pick one per closure.
pub trait IntoBindTask<Marker> {
    fn into_task(self) -> Option<TaskFuture>;
}

impl IntoBindTask<BlockingTask> for () {
    fn into_task(self) -> Option<TaskFuture> {
        None
    }
}

impl<F> IntoBindTask<DrivableTask> for F
where
    F: Future<Output = ()> + Send + 'static,
{
    fn into_task(self) -> Option<TaskFuture> {
        Some(Box::pin(self))
    }
}

/// Erase a user closure into the internal callback shape.
pub fn into_callback<F, R, M>(f: F) -> Callback
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoBindTask<M>,
{
    Arc::new(move || f().into_task())
}

static CLOCK_BASE: Lazy<Instant> = Lazy::new(Instant::now);

/// Milliseconds on a process-local monotonic clock. Used by timer tasks and
/// the focus cache; event timestamps come from the OS.
pub(crate) fn now_ms() -> u64 {
    CLOCK_BASE.elapsed().as_millis() as u64
}

/// Runtime state shared by keyboard and mouse binds, guarded by the owning
/// bind's mutex.
#[derive(Debug, Default)]
pub(crate) struct FireState {
    /// Generation counter; pending hold/repeat tasks self-cancel when it no
    /// longer matches the value they captured.
    pub hold_token: u64,
    pub fires: u32,
    pub last_fire_ms: u64,
    pub repeat_active: bool,

    focus_cache: bool,
    focus_last_check_ms: u64,
    focus_last_value: Option<bool>,
}

/// Outcome of a focus probe.
pub(crate) struct FocusStatus {
    pub focused: bool,
    /// The target just transitioned focused -> unfocused.
    pub blurred: bool,
}

impl FireState {
    pub fn new() -> Self {
        Self {
            focus_cache: true,
            ..Self::default()
        }
    }

    /// Consult the focus cache, probing at most once per `focus_cache_ms`
    /// unless forced. Blur/focus edges are detected here; the caller applies
    /// the bind's [`FocusPolicy`].
    pub fn probe_focus(
        &mut self,
        window: Option<&WindowTarget>,
        cache_ms: u64,
        force: bool,
    ) -> FocusStatus {
        let Some(window) = window else {
            return FocusStatus {
                focused: true,
                blurred: false,
            };
        };

        let now = now_ms();
        if !force && now.saturating_sub(self.focus_last_check_ms) < cache_ms {
            return FocusStatus {
                focused: self.focus_cache,
                blurred: false,
            };
        }

        self.focus_last_check_ms = now;
        let focused = window.is_focused();

        let blurred = match self.focus_last_value {
            None => false,
            Some(prev) => prev && !focused,
        };
        self.focus_last_value = Some(focused);
        self.focus_cache = focused;

        FocusStatus { focused, blurred }
    }

    pub fn apply_blur(&mut self, policy: FocusPolicy) -> bool {
        match policy {
            // Caller performs the full reset; signalled through the return.
            FocusPolicy::CancelOnBlur => true,
            FocusPolicy::PauseOnBlur => {
                self.hold_token += 1;
                false
            }
        }
    }

    pub fn cooldown_ok(&self, timing: &Timing, now_ms: u64) -> bool {
        timing.cooldown_ms == 0
            || now_ms.saturating_sub(self.last_fire_ms) >= timing.cooldown_ms
    }

    pub fn max_fires_ok(&self, max_fires: Option<u32>) -> bool {
        max_fires.map(|mx| self.fires < mx).unwrap_or(true)
    }

    /// Timing-gated fire: consult cooldown and the fire cap, then submit the
    /// callback to the worker pool. Never invokes user code inline.
    pub fn fire_if_allowed(
        &mut self,
        timing: &Timing,
        max_fires: Option<u32>,
        ts_ms: u64,
        callback: &Callback,
        dispatch: &DispatchFn,
    ) -> bool {
        if self.cooldown_ok(timing, ts_ms) && self.max_fires_ok(max_fires) {
            self.fires += 1;
            self.last_fire_ms = ts_ms;
            (dispatch)(Arc::clone(callback));
            return true;
        }
        false
    }
}

/// Run the bind's predicates; a panicking predicate counts as false.
pub(crate) fn checks_ok(checks: &Checks, event: HookEvent<'_>, state: &StateView<'_>) -> bool {
    for predicate in checks.iter() {
        let passed = catch_unwind(AssertUnwindSafe(|| predicate(&event, state))).unwrap_or(false);
        if !passed {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Checks;
    use crate::events::{KeyAction, KeyboardEvent};
    use crate::state::PressedSets;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_dispatch() -> DispatchFn {
        Arc::new(|_cb| {})
    }

    fn counting_dispatch(counter: Arc<AtomicU32>) -> DispatchFn {
        Arc::new(move |cb| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = cb();
        })
    }

    #[test]
    fn cooldown_gates_fires() {
        let mut st = FireState::new();
        let timing = Timing {
            cooldown_ms: 100,
            ..Timing::default()
        };
        let fired = Arc::new(AtomicU32::new(0));
        let dispatch = counting_dispatch(Arc::clone(&fired));
        let cb: Callback = into_callback(|| {});

        assert!(st.fire_if_allowed(&timing, None, 1000, &cb, &dispatch));
        assert!(!st.fire_if_allowed(&timing, None, 1050, &cb, &dispatch));
        assert!(st.fire_if_allowed(&timing, None, 1100, &cb, &dispatch));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn max_fires_caps_lifetime_fires() {
        let mut st = FireState::new();
        let timing = Timing::default();
        let cb: Callback = into_callback(|| {});
        let dispatch = no_dispatch();

        assert!(st.fire_if_allowed(&timing, Some(2), 0, &cb, &dispatch));
        assert!(st.fire_if_allowed(&timing, Some(2), 1, &cb, &dispatch));
        assert!(!st.fire_if_allowed(&timing, Some(2), 2, &cb, &dispatch));
        assert_eq!(st.fires, 2);
    }

    #[test]
    fn panicking_predicate_is_false() {
        let mut checks = Checks::new();
        checks.push(|_, _| panic!("boom"));
        let sets = PressedSets::default();
        let event = KeyboardEvent::new(KeyAction::Down, 0x41, 0);
        assert!(!checks_ok(
            &checks,
            HookEvent::Keyboard(&event),
            &sets.view()
        ));
    }

    #[test]
    fn predicates_short_circuit() {
        let hits = Arc::new(AtomicU32::new(0));
        let mut checks = Checks::new();
        checks.push(|_, _| false);
        let counter = Arc::clone(&hits);
        checks.push(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });
        let sets = PressedSets::default();
        let event = KeyboardEvent::new(KeyAction::Down, 0x41, 0);
        assert!(!checks_ok(
            &checks,
            HookEvent::Keyboard(&event),
            &sets.view()
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn focus_cache_and_blur_edge() {
        let mut st = FireState::new();
        let target = WindowTarget::with_probe(|| false);

        // First probe records the value without reporting an edge.
        let status = st.probe_focus(Some(&target), 0, false);
        assert!(!status.focused);
        assert!(!status.blurred);

        let focused = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let flag = Arc::clone(&focused);
        let target = WindowTarget::with_probe(move || flag.load(Ordering::SeqCst));
        let mut st = FireState::new();

        assert!(st.probe_focus(Some(&target), 0, false).focused);
        focused.store(false, Ordering::SeqCst);
        let status = st.probe_focus(Some(&target), 0, false);
        assert!(!status.focused);
        assert!(status.blurred);
    }

    #[test]
    fn async_callbacks_probe_as_tasks() {
        let sync_cb: Callback = into_callback(|| {});
        assert!(sync_cb().is_none());

        let async_cb: Callback = into_callback(|| async {});
        assert!(async_cb().is_some());
    }
}
