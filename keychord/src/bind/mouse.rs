//! Mouse bind: the keyboard pipeline stripped down to a single button.
//!
//! Only down/up events of the target button are relevant; X-buttons are
//! disambiguated through the event's auxiliary data word. Moves and wheels
//! never get this far (the dispatcher filters them).

use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use log::debug;

use crate::config::{BindConfig, InjectedPolicy, SuppressPolicy, Trigger};
use crate::events::{HookEvent, HookFlags, MouseButton, MouseEvent};
use crate::state::StateView;
use crate::window::WindowTarget;

use super::{checks_ok, now_ms, Callback, DispatchFn, FireState};

#[derive(Debug, Default)]
struct MouseState {
    fire: FireState,
    last_event_ms: u64,
    down_ms: Option<u64>,
    tap_count: u32,
    tap_last_ms: u64,
    /// Button currently held (down seen, no up yet).
    armed: bool,
}

/// Policy-driven mouse button bind.
pub struct MouseBind {
    button: MouseButton,
    config: BindConfig,
    window: Option<WindowTarget>,
    callback: Callback,
    dispatch: DispatchFn,
    state: Mutex<MouseState>,
    weak: Weak<MouseBind>,
}

impl MouseBind {
    pub(crate) fn create(
        button: MouseButton,
        callback: Callback,
        config: BindConfig,
        window: Option<WindowTarget>,
        dispatch: DispatchFn,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            button,
            config,
            window,
            callback,
            dispatch,
            state: Mutex::new(MouseState {
                fire: FireState::new(),
                ..MouseState::default()
            }),
            weak: weak.clone(),
        })
    }

    pub fn button(&self) -> MouseButton {
        self.button
    }

    pub fn config(&self) -> &BindConfig {
        &self.config
    }

    pub fn fires(&self) -> u32 {
        self.state.lock().unwrap().fire.fires
    }

    pub fn reset(&self) {
        let mut st = self.state.lock().unwrap();
        Self::reset_locked(&mut st);
    }

    fn reset_locked(st: &mut MouseState) {
        st.down_ms = None;
        st.tap_count = 0;
        st.tap_last_ms = 0;
        st.armed = false;
        st.fire.hold_token += 1;
        st.fire.repeat_active = false;
    }

    /// Evaluate one mouse event. Returns the suppression verdict.
    pub fn handle(&self, event: &MouseEvent, view: &StateView<'_>) -> HookFlags {
        let cfg = &self.config;
        let mut st = self.state.lock().unwrap();
        let now = event.time_ms;

        // Focus gate.
        if self.window.is_some() {
            let status =
                st.fire
                    .probe_focus(self.window.as_ref(), cfg.timing.focus_cache_ms, false);
            if status.blurred && st.fire.apply_blur(cfg.focus) {
                Self::reset_locked(&mut st);
            }
            if !status.focused {
                return HookFlags::CONTINUE;
            }
        }

        // Predicates.
        if !cfg.checks.is_empty() && !checks_ok(&cfg.checks, HookEvent::Mouse(event), view) {
            return HookFlags::CONTINUE;
        }

        // Not our button (including the wrong X-button) -> ignore.
        let Some((button, is_down)) = event.button() else {
            return HookFlags::CONTINUE;
        };
        if button != self.button {
            return HookFlags::CONTINUE;
        }

        // Debounce.
        if cfg.timing.debounce_ms > 0
            && now.saturating_sub(st.last_event_ms) < cfg.timing.debounce_ms
        {
            return HookFlags::CONTINUE;
        }
        st.last_event_ms = now;

        // Injected filter.
        let inj = event.injected;
        match cfg.injected {
            InjectedPolicy::Ignore if inj => return HookFlags::CONTINUE,
            InjectedPolicy::Only if !inj => return HookFlags::CONTINUE,
            _ => {}
        }

        let is_up = !is_down;
        let was_armed = st.armed;
        if is_down {
            st.armed = true;
        } else {
            st.armed = false;
            st.fire.repeat_active = false;
        }

        let mut flags = HookFlags::CONTINUE;
        match cfg.suppress {
            SuppressPolicy::Always => flags |= HookFlags::DONT_PASS,
            SuppressPolicy::WhileActive => {
                if st.armed {
                    flags |= HookFlags::DONT_PASS;
                }
            }
            SuppressPolicy::WhileEvaluating => {
                // Hide the down and its paired up of the current click.
                if st.armed || was_armed {
                    flags |= HookFlags::DONT_PASS;
                }
            }
            SuppressPolicy::Never | SuppressPolicy::WhenMatched => {}
        }

        match cfg.trigger {
            Trigger::OnPress => {
                if is_down {
                    if self.fire_gate(&mut st, now) && cfg.suppress == SuppressPolicy::WhenMatched {
                        flags |= HookFlags::DONT_PASS;
                    }
                }
            }

            Trigger::OnRelease => {
                if is_up {
                    if self.fire_gate(&mut st, now) && cfg.suppress == SuppressPolicy::WhenMatched {
                        flags |= HookFlags::DONT_PASS;
                    }
                }
            }

            Trigger::OnClick => {
                if is_down {
                    st.down_ms = Some(now);
                } else if let Some(down_ms) = st.down_ms.take() {
                    if now.saturating_sub(down_ms) <= cfg.timing.hold_ms {
                        if self.fire_gate(&mut st, now)
                            && cfg.suppress == SuppressPolicy::WhenMatched
                        {
                            flags |= HookFlags::DONT_PASS;
                        }
                    }
                }
            }

            Trigger::OnHold => {
                if is_down {
                    st.fire.hold_token += 1;
                    let token = st.fire.hold_token;
                    self.spawn_hold_timer(token);
                }
            }

            Trigger::OnRepeat => {
                if is_down && !st.fire.repeat_active {
                    st.fire.repeat_active = true;
                    let token = st.fire.hold_token;
                    self.spawn_repeat_task(token);
                }
            }

            Trigger::OnDoubleTap => {
                if is_down {
                    if now.saturating_sub(st.tap_last_ms) <= cfg.timing.double_tap_window_ms {
                        st.tap_count += 1;
                    } else {
                        st.tap_count = 1;
                    }
                    st.tap_last_ms = now;

                    if st.tap_count >= 2 {
                        st.tap_count = 0;
                        if self.fire_gate(&mut st, now)
                            && cfg.suppress == SuppressPolicy::WhenMatched
                        {
                            flags |= HookFlags::DONT_PASS;
                        }
                    }
                }
            }

            // Chord-shaped triggers have no single-button meaning.
            Trigger::OnChordComplete
            | Trigger::OnChordReleased
            | Trigger::OnSequence => {}
        }

        flags
    }

    fn fire_gate(&self, st: &mut MouseState, ts_ms: u64) -> bool {
        st.fire.fire_if_allowed(
            &self.config.timing,
            self.config.constraints.max_fires,
            ts_ms,
            &self.callback,
            &self.dispatch,
        )
    }

    fn spawn_hold_timer(&self, token: u64) {
        let Some(bind) = self.weak.upgrade() else {
            return;
        };
        let hold_ms = self.config.timing.hold_ms;

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(hold_ms));

            let mut st = bind.state.lock().unwrap();
            if token != st.fire.hold_token || !st.armed {
                return;
            }
            let status = st.fire.probe_focus(
                bind.window.as_ref(),
                bind.config.timing.focus_cache_ms,
                true,
            );
            if status.blurred && st.fire.apply_blur(bind.config.focus) {
                Self::reset_locked(&mut st);
            }
            if !status.focused {
                return;
            }
            bind.fire_gate(&mut st, now_ms());
        });
    }

    fn spawn_repeat_task(&self, token: u64) {
        let Some(bind) = self.weak.upgrade() else {
            return;
        };
        let delay_ms = self
            .config
            .timing
            .hold_ms
            .max(self.config.timing.repeat_delay_ms);
        let interval_ms = self.config.timing.repeat_interval_ms.max(1);

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(delay_ms));

            loop {
                {
                    let mut st = bind.state.lock().unwrap();
                    if token != st.fire.hold_token || !st.armed {
                        st.fire.repeat_active = false;
                        return;
                    }
                    let status = st.fire.probe_focus(
                        bind.window.as_ref(),
                        bind.config.timing.focus_cache_ms,
                        true,
                    );
                    if !status.focused {
                        st.fire.repeat_active = false;
                        debug!("button repeat loop for {:?} stopped", bind.button);
                        return;
                    }
                    bind.fire_gate(&mut st, now_ms());
                }
                thread::sleep(Duration::from_millis(interval_ms));
            }
        });
    }
}

impl std::fmt::Debug for MouseBind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MouseBind")
            .field("button", &self.button)
            .field("trigger", &self.config.trigger)
            .finish()
    }
}
