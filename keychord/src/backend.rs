//! Process-wide hook backend.
//!
//! One backend per process: it owns the pressed-state bookkeeping, the list
//! of registered frontends, and the OS hook thread. The first frontend
//! registration installs the hooks; the last unregistration tears them down
//! again. Frontends are held weakly so a dropped `Hook` detaches on its own.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, Weak};

use log::debug;
use once_cell::sync::Lazy;
use uuid::Uuid;

use crate::error::Result;
use crate::events::{HookFlags, KeyboardEvent, MouseAction, MouseEvent};
use crate::hook::HookCore;
use crate::logging;
use crate::state::SharedPressedState;

#[cfg(windows)]
use crate::platform;

static BACKEND: Lazy<GlobalBackend> = Lazy::new(GlobalBackend::new);

pub(crate) fn instance() -> &'static GlobalBackend {
    &BACKEND
}

#[derive(Default)]
struct PumpState {
    running: bool,
    #[cfg(windows)]
    thread: Option<std::thread::JoinHandle<()>>,
    #[cfg(windows)]
    thread_id: Option<u32>,
}

pub(crate) struct GlobalBackend {
    frontends: Mutex<Vec<(Uuid, Weak<HookCore>)>>,
    pressed: SharedPressedState,
    pump: Mutex<PumpState>,
}

impl GlobalBackend {
    pub fn new() -> Self {
        Self {
            frontends: Mutex::new(Vec::new()),
            pressed: SharedPressedState::new(),
            pump: Mutex::new(PumpState::default()),
        }
    }

    /// Handle to the pressed-state sets; binds keep a clone for their timer
    /// tasks.
    pub fn pressed(&self) -> SharedPressedState {
        self.pressed.clone()
    }

    /// Register a frontend and make sure the hook thread is up. Install
    /// failures surface here, synchronously with the registration.
    pub fn register(&self, id: Uuid, frontend: Weak<HookCore>) -> Result<()> {
        {
            let mut frontends = self.frontends.lock().unwrap();
            frontends.push((id, frontend));
        }

        if let Err(err) = self.ensure_hook_thread() {
            self.unregister(id);
            return Err(err);
        }
        debug!("frontend {id} registered");
        Ok(())
    }

    /// Register without touching the OS hook thread. Event routing only;
    /// used by in-process tests.
    #[cfg(test)]
    pub fn register_detached(&self, id: Uuid, frontend: Weak<HookCore>) {
        self.frontends.lock().unwrap().push((id, frontend));
    }

    pub fn unregister(&self, id: Uuid) {
        let remaining = {
            let mut frontends = self.frontends.lock().unwrap();
            frontends.retain(|(fid, weak)| *fid != id && weak.strong_count() > 0);
            frontends.len()
        };
        debug!("frontend {id} unregistered ({remaining} left)");
        if remaining == 0 {
            self.stop_hook_thread();
        }
    }

    /// Strong refs to the live frontends, in registration order. The lock is
    /// held only for the copy so registration never blocks the hook thread.
    fn alive(&self) -> Vec<std::sync::Arc<HookCore>> {
        let mut frontends = self.frontends.lock().unwrap();
        frontends.retain(|(_, weak)| weak.strong_count() > 0);
        frontends
            .iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }

    /// Keyboard entry point, called on the hook thread. Updates the pressed
    /// sets, annotates OS auto-repeat, then fans out to every frontend and
    /// OR-reduces their verdicts.
    pub fn on_keyboard(&self, event: &mut KeyboardEvent) -> HookFlags {
        let snapshot = self.pressed.with_mut(|sets| {
            let was_down = sets.apply_keyboard(event);
            event.is_repeat = event.action.is_down() && was_down;
            sets.clone()
        });
        let view = snapshot.view();
        let event: &KeyboardEvent = event;

        let mut flags = HookFlags::CONTINUE;
        for frontend in self.alive() {
            let verdict =
                catch_unwind(AssertUnwindSafe(|| frontend.handle_keyboard(event, &view)));
            match verdict {
                Ok(f) => flags |= f,
                Err(payload) => {
                    logging::report_swallowed_panic("keyboard frontend", payload.as_ref())
                }
            }
        }
        flags
    }

    /// Mouse entry point. Moves and wheels are noise at this layer and are
    /// dropped before any frontend sees them.
    pub fn on_mouse(&self, event: &MouseEvent) -> HookFlags {
        if matches!(
            event.action,
            MouseAction::Move | MouseAction::Wheel | MouseAction::HWheel
        ) {
            return HookFlags::CONTINUE;
        }

        let snapshot = self.pressed.with_mut(|sets| {
            sets.apply_mouse(event);
            sets.clone()
        });
        let view = snapshot.view();

        let mut flags = HookFlags::CONTINUE;
        for frontend in self.alive() {
            let verdict = catch_unwind(AssertUnwindSafe(|| frontend.handle_mouse(event, &view)));
            match verdict {
                Ok(f) => flags |= f,
                Err(payload) => {
                    logging::report_swallowed_panic("mouse frontend", payload.as_ref())
                }
            }
        }
        flags
    }

    #[cfg(windows)]
    fn ensure_hook_thread(&self) -> Result<()> {
        let mut pump = self.pump.lock().unwrap();
        if pump.running {
            return Ok(());
        }

        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<u32>>(1);
        let thread = std::thread::Builder::new()
            .name("keychord-hook".to_string())
            .spawn(move || platform::run_hook_thread(ready_tx))
            .expect("hook thread spawn");

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                pump.running = true;
                pump.thread = Some(thread);
                pump.thread_id = Some(thread_id);
                debug!("hook thread running (id {thread_id})");
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(crate::error::Error::HookInstall {
                    kind: "keyboard",
                    code: 0,
                })
            }
        }
    }

    #[cfg(not(windows))]
    fn ensure_hook_thread(&self) -> Result<()> {
        Err(crate::error::Error::PlatformUnsupported)
    }

    #[cfg(windows)]
    fn stop_hook_thread(&self) {
        let mut pump = self.pump.lock().unwrap();
        if !pump.running {
            return;
        }
        if let Some(thread_id) = pump.thread_id.take() {
            platform::post_quit(thread_id);
        }
        if let Some(thread) = pump.thread.take() {
            let _ = thread.join();
        }
        pump.running = false;
        debug!("hook thread stopped");
    }

    #[cfg(not(windows))]
    fn stop_hook_thread(&self) {
        let mut pump = self.pump.lock().unwrap();
        pump.running = false;
    }
}
