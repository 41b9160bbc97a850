//! Hook frontend: the user-facing registry of binds.
//!
//! A `Hook` owns its binds and its worker pool and registers with the
//! process-wide backend on construction. Bind lists are immutable snapshots
//! swapped atomically, so the hook thread iterates without taking the
//! registration lock. Dropping a `Hook` (or calling `close`) detaches it;
//! the backend keeps running while other frontends remain.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use log::debug;
use uuid::Uuid;

use crate::backend;
use crate::bind::{into_callback, Callback, DispatchFn, IntoBindTask, KeyBind, MouseBind};
use crate::config::BindConfig;
use crate::dispatch::CallbackDispatcher;
use crate::error::Result;
use crate::events::{HookFlags, KeyboardEvent, MouseButton, MouseEvent};
use crate::state::StateView;
use crate::window::WindowTarget;

const WAIT_POLL: Duration = Duration::from_millis(200);

/// Construction options for [`Hook`].
#[derive(Default)]
pub struct HookOptions {
    /// Worker threads for user callbacks; clamped to at least 1.
    pub workers: usize,
    /// Config applied by [`Hook::bind`] when none is given.
    pub default_config: Option<BindConfig>,
    /// Config applied by [`Hook::bind_mouse`] when none is given.
    pub default_mouse_config: Option<BindConfig>,
    /// Drive async callbacks on this runtime instead of the internal one.
    pub runtime: Option<tokio::runtime::Handle>,
}

pub(crate) struct HookCore {
    id: Uuid,
    keyboard: ArcSwap<Vec<Arc<KeyBind>>>,
    mouse: ArcSwap<Vec<Arc<MouseBind>>>,
    /// Serializes snapshot rebuilds; readers never take it.
    rebuild: Mutex<()>,
    pause_count: AtomicUsize,
    stop_flag: Mutex<bool>,
    stop_signal: Condvar,
    closed: AtomicBool,
    dispatcher: CallbackDispatcher,
}

impl HookCore {
    fn new(dispatcher: CallbackDispatcher) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            keyboard: ArcSwap::from_pointee(Vec::new()),
            mouse: ArcSwap::from_pointee(Vec::new()),
            rebuild: Mutex::new(()),
            pause_count: AtomicUsize::new(0),
            stop_flag: Mutex::new(false),
            stop_signal: Condvar::new(),
            closed: AtomicBool::new(false),
            dispatcher,
        })
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    fn paused(&self) -> bool {
        self.pause_count.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn handle_keyboard(&self, event: &KeyboardEvent, view: &StateView<'_>) -> HookFlags {
        if self.paused() {
            return HookFlags::CONTINUE;
        }
        let binds = self.keyboard.load();
        let mut flags = HookFlags::CONTINUE;
        for bind in binds.iter() {
            flags |= bind.handle(event, view);
        }
        flags
    }

    pub(crate) fn handle_mouse(&self, event: &MouseEvent, view: &StateView<'_>) -> HookFlags {
        if self.paused() {
            return HookFlags::CONTINUE;
        }
        let binds = self.mouse.load();
        let mut flags = HookFlags::CONTINUE;
        for bind in binds.iter() {
            flags |= bind.handle(event, view);
        }
        flags
    }

    fn push_key_bind(&self, bind: Arc<KeyBind>) {
        let _guard = self.rebuild.lock().unwrap();
        let mut next = (**self.keyboard.load()).clone();
        next.push(bind);
        self.keyboard.store(Arc::new(next));
    }

    fn push_mouse_bind(&self, bind: Arc<MouseBind>) {
        let _guard = self.rebuild.lock().unwrap();
        let mut next = (**self.mouse.load()).clone();
        next.push(bind);
        self.mouse.store(Arc::new(next));
    }
}

/// A set of binds attached to the global input hooks.
pub struct Hook {
    core: Arc<HookCore>,
    default_config: BindConfig,
    default_mouse_config: BindConfig,
}

impl Hook {
    /// Install (or join) the global hooks with one callback worker.
    pub fn new() -> Result<Self> {
        Self::with_options(HookOptions::default())
    }

    /// Install (or join) the global hooks with a worker pool of `workers`.
    pub fn with_workers(workers: usize) -> Result<Self> {
        Self::with_options(HookOptions {
            workers,
            ..HookOptions::default()
        })
    }

    pub fn with_options(options: HookOptions) -> Result<Self> {
        let workers = options.workers.max(1);
        let dispatcher = match options.runtime {
            Some(handle) => CallbackDispatcher::with_runtime(workers, handle),
            None => CallbackDispatcher::new(workers),
        };
        let core = HookCore::new(dispatcher);

        if let Err(err) = backend::instance().register(core.id, Arc::downgrade(&core)) {
            core.dispatcher.stop();
            return Err(err);
        }

        Ok(Self {
            core,
            default_config: options.default_config.unwrap_or_default(),
            default_mouse_config: options
                .default_mouse_config
                .unwrap_or_else(BindConfig::mouse_default),
        })
    }

    fn dispatch_fn(&self) -> DispatchFn {
        let weak = Arc::downgrade(&self.core);
        Arc::new(move |callback: Callback| {
            if let Some(core) = weak.upgrade() {
                core.dispatcher.submit(callback);
            }
        })
    }

    /// Bind a key expression with this hook's default config.
    pub fn bind<F, R, M>(&self, expr: &str, callback: F) -> Result<Arc<KeyBind>>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoBindTask<M>,
    {
        self.bind_with(expr, self.default_config.clone(), callback)
    }

    /// Bind a key expression with an explicit config.
    pub fn bind_with<F, R, M>(
        &self,
        expr: &str,
        config: BindConfig,
        callback: F,
    ) -> Result<Arc<KeyBind>>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoBindTask<M>,
    {
        self.bind_scoped(expr, config, None, callback)
    }

    /// Bind a key expression scoped to a window.
    pub fn bind_to_window<F, R, M>(
        &self,
        expr: &str,
        config: BindConfig,
        window: WindowTarget,
        callback: F,
    ) -> Result<Arc<KeyBind>>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoBindTask<M>,
    {
        self.bind_scoped(expr, config, Some(window), callback)
    }

    fn bind_scoped<F, R, M>(
        &self,
        expr: &str,
        config: BindConfig,
        window: Option<WindowTarget>,
        callback: F,
    ) -> Result<Arc<KeyBind>>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoBindTask<M>,
    {
        let bind = KeyBind::create(
            expr,
            into_callback(callback),
            config,
            window,
            self.dispatch_fn(),
            backend::instance().pressed(),
        )?;
        self.core.push_key_bind(Arc::clone(&bind));
        debug!("bound {:?}", bind);
        Ok(bind)
    }

    /// Bind a mouse button with this hook's default mouse config.
    pub fn bind_mouse<F, R, M>(&self, button: MouseButton, callback: F) -> Arc<MouseBind>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoBindTask<M>,
    {
        self.bind_mouse_with(button, self.default_mouse_config.clone(), callback)
    }

    /// Bind a mouse button with an explicit config.
    pub fn bind_mouse_with<F, R, M>(
        &self,
        button: MouseButton,
        config: BindConfig,
        callback: F,
    ) -> Arc<MouseBind>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoBindTask<M>,
    {
        self.bind_mouse_scoped(button, config, None, callback)
    }

    /// Bind a mouse button scoped to a window.
    pub fn bind_mouse_to_window<F, R, M>(
        &self,
        button: MouseButton,
        config: BindConfig,
        window: WindowTarget,
        callback: F,
    ) -> Arc<MouseBind>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoBindTask<M>,
    {
        self.bind_mouse_scoped(button, config, Some(window), callback)
    }

    fn bind_mouse_scoped<F, R, M>(
        &self,
        button: MouseButton,
        config: BindConfig,
        window: Option<WindowTarget>,
        callback: F,
    ) -> Arc<MouseBind>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoBindTask<M>,
    {
        let bind = MouseBind::create(
            button,
            into_callback(callback),
            config,
            window,
            self.dispatch_fn(),
        );
        self.core.push_mouse_bind(Arc::clone(&bind));
        bind
    }

    /// Remove a keyboard bind. Unknown binds are ignored.
    pub fn unbind(&self, bind: &Arc<KeyBind>) {
        let _guard = self.core.rebuild.lock().unwrap();
        let next: Vec<Arc<KeyBind>> = self
            .core
            .keyboard
            .load()
            .iter()
            .filter(|existing| !Arc::ptr_eq(existing, bind))
            .cloned()
            .collect();
        self.core.keyboard.store(Arc::new(next));
    }

    /// Remove a mouse bind. Unknown binds are ignored.
    pub fn unbind_mouse(&self, bind: &Arc<MouseBind>) {
        let _guard = self.core.rebuild.lock().unwrap();
        let next: Vec<Arc<MouseBind>> = self
            .core
            .mouse
            .load()
            .iter()
            .filter(|existing| !Arc::ptr_eq(existing, bind))
            .cloned()
            .collect();
        self.core.mouse.store(Arc::new(next));
    }

    /// Stop evaluating events until [`resume`](Self::resume). Nests.
    pub fn pause(&self) {
        self.core.pause_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Undo one [`pause`](Self::pause). Saturates at zero.
    pub fn resume(&self) {
        let mut current = self.core.pause_count.load(Ordering::SeqCst);
        while current > 0 {
            match self.core.pause_count.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn is_paused(&self) -> bool {
        self.core.paused()
    }

    /// Run `f` with the hook paused.
    pub fn paused_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        self.pause();
        let result = f();
        self.resume();
        result
    }

    /// Make [`wait`](Self::wait) return.
    pub fn stop(&self) {
        let mut stopped = self.core.stop_flag.lock().unwrap();
        *stopped = true;
        self.core.stop_signal.notify_all();
    }

    /// Block until [`stop`](Self::stop) is called, or until `timeout`
    /// passes. Polls periodically so callers can layer their own
    /// cancellation on top. Returns true when stopped.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut stopped = self.core.stop_flag.lock().unwrap();
        loop {
            if *stopped {
                return true;
            }
            let chunk = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    (deadline - now).min(WAIT_POLL)
                }
                None => WAIT_POLL,
            };
            let (guard, _) = self
                .core
                .stop_signal
                .wait_timeout(stopped, chunk)
                .unwrap();
            stopped = guard;
        }
    }

    /// Detach from the backend and drain the worker pool. Idempotent; the
    /// hook thread keeps running while other frontends remain.
    pub fn close(&self) {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        backend::instance().unregister(self.core.id);
        self.core.dispatcher.stop();
    }
}

impl Drop for Hook {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
impl HookCore {
    pub(crate) fn new_for_tests() -> Arc<Self> {
        HookCore::new(CallbackDispatcher::new(1))
    }

    /// Attach a keyboard bind whose callback runs inline on dispatch, so
    /// tests can assert fire counts synchronously.
    pub(crate) fn add_key_bind_inline(
        &self,
        expr: &str,
        config: BindConfig,
        pressed: crate::state::SharedPressedState,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Arc<KeyBind> {
        let dispatch: DispatchFn = Arc::new(|cb: Callback| {
            let _ = cb();
        });
        let bind = KeyBind::create(
            expr,
            into_callback(callback),
            config,
            None,
            dispatch,
            pressed,
        )
        .expect("bind expected");
        self.push_key_bind(Arc::clone(&bind));
        bind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SuppressPolicy, Trigger};
    use crate::events::KeyAction;
    use crate::state::{PressedSets, SharedPressedState};
    use std::sync::atomic::AtomicU32;

    const E: u16 = 0x45;

    struct Rig {
        hook: Hook,
        pressed: SharedPressedState,
    }

    impl Rig {
        fn new() -> Self {
            // Core without OS hooks: events are driven by hand.
            let hook = Hook {
                core: HookCore::new_for_tests(),
                default_config: BindConfig::default(),
                default_mouse_config: BindConfig::mouse_default(),
            };
            Self {
                hook,
                pressed: SharedPressedState::new(),
            }
        }

        fn key(&self, action: KeyAction, vk: u16, ts: u64) -> HookFlags {
            let mut event = KeyboardEvent::new(action, vk, ts);
            let snapshot: PressedSets = self.pressed.with_mut(|sets| {
                let was_down = sets.apply_keyboard(&event);
                event.is_repeat = event.action.is_down() && was_down;
                sets.clone()
            });
            self.hook.core.handle_keyboard(&event, &snapshot.view())
        }
    }

    fn wait_for(predicate: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !predicate() {
            assert!(Instant::now() < deadline, "timed out waiting on condition");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn bound_expression_fires_through_the_pool() {
        let rig = Rig::new();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        rig.hook
            .bind("e", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("bind expected");

        rig.key(KeyAction::Down, E, 0);
        wait_for(|| fired.load(Ordering::SeqCst) == 1);
    }

    #[test]
    fn pause_short_circuits_evaluation() {
        let rig = Rig::new();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        rig.hook
            .bind("e", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("bind expected");

        rig.hook.pause();
        assert!(rig.hook.is_paused());
        rig.key(KeyAction::Down, E, 0);
        rig.key(KeyAction::Up, E, 10);

        rig.hook.resume();
        assert!(!rig.hook.is_paused());
        rig.key(KeyAction::Down, E, 20);
        wait_for(|| fired.load(Ordering::SeqCst) == 1);
    }

    #[test]
    fn pause_nests_and_resume_saturates() {
        let rig = Rig::new();
        rig.hook.pause();
        rig.hook.pause();
        rig.hook.resume();
        assert!(rig.hook.is_paused());
        rig.hook.resume();
        assert!(!rig.hook.is_paused());
        rig.hook.resume(); // extra resume is a no-op
        assert!(!rig.hook.is_paused());
    }

    #[test]
    fn paused_scope_restores() {
        let rig = Rig::new();
        rig.hook.paused_scope(|| {
            assert!(rig.hook.is_paused());
        });
        assert!(!rig.hook.is_paused());
    }

    #[test]
    fn unbind_stops_future_fires() {
        let rig = Rig::new();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let bind = rig
            .hook
            .bind("e", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("bind expected");

        rig.key(KeyAction::Down, E, 0);
        wait_for(|| fired.load(Ordering::SeqCst) == 1);
        rig.key(KeyAction::Up, E, 10);

        rig.hook.unbind(&bind);
        rig.key(KeyAction::Down, E, 20);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn suppression_flags_or_reduce_across_binds() {
        let rig = Rig::new();
        rig.hook.bind("e", || {}).expect("bind expected");
        rig.hook
            .bind_with(
                "e",
                BindConfig {
                    trigger: Trigger::OnPress,
                    suppress: SuppressPolicy::WhenMatched,
                    ..BindConfig::default()
                },
                || {},
            )
            .expect("bind expected");

        assert!(rig.key(KeyAction::Down, E, 0).suppresses());
    }

    #[test]
    fn stop_unblocks_wait() {
        let rig = Rig::new();
        assert!(!rig.hook.wait(Some(Duration::from_millis(20))));

        let hook = &rig.hook;
        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(50));
                hook.stop();
            });
            assert!(hook.wait(Some(Duration::from_secs(5))));
        });
        // Already stopped: returns immediately.
        assert!(rig.hook.wait(None));
    }

    #[test]
    fn close_is_idempotent() {
        let rig = Rig::new();
        rig.hook.close();
        rig.hook.close();
    }

    #[cfg(not(windows))]
    #[test]
    fn hook_install_requires_windows() {
        let err = Hook::new().err().expect("hook must fail off-Windows");
        assert!(matches!(err, crate::error::Error::PlatformUnsupported));
    }
}
