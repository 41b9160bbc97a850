//! Keyboard bind: a per-bind state machine fed by hook events.
//!
//! `handle` runs on the hook thread under the bind mutex and must stay
//! cheap; user callbacks are only ever submitted to the worker pool.
//! Hold/repeat triggers spawn short-lived timer threads that re-enter the
//! bind through a captured `hold_token`; a stale token means the bind was
//! reset (or paused by blur) and the timer gives up.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use log::debug;

use crate::config::{
    BindConfig, ChordPolicy, InjectedPolicy, OrderPolicy, SuppressPolicy, Trigger,
};
use crate::error::Result;
use crate::events::{HookEvent, HookFlags, KeyboardEvent};
use crate::keycodes::is_modifier_vk;
use crate::parse::{parse_key_expr, ChordSpec, KeyExpr};
use crate::state::{SharedPressedState, StateView};
use crate::window::WindowTarget;

use super::order::OrderTracker;
use super::{checks_ok, now_ms, Callback, DispatchFn, FireState};

#[derive(Debug, Default)]
struct KeyState {
    fire: FireState,

    seq_index: usize,
    seq_last_ms: u64,
    last_event_ms: u64,

    click_down_ms: Option<u64>,
    armed: bool,
    was_full: bool,
    tap_count: u32,
    tap_last_ms: u64,

    had_full: bool,
    release_armed: bool,

    order: OrderTracker,
}

/// Policy-driven keyboard bind.
pub struct KeyBind {
    expr: KeyExpr,
    source: String,
    config: BindConfig,
    window: Option<WindowTarget>,
    callback: Callback,
    dispatch: DispatchFn,
    pressed: SharedPressedState,
    state: Mutex<KeyState>,
    weak: Weak<KeyBind>,
}

impl KeyBind {
    pub(crate) fn create(
        expr: &str,
        callback: Callback,
        config: BindConfig,
        window: Option<WindowTarget>,
        dispatch: DispatchFn,
        pressed: SharedPressedState,
    ) -> Result<Arc<Self>> {
        let parsed = parse_key_expr(expr)?;
        Ok(Arc::new_cyclic(|weak| Self {
            expr: parsed,
            source: expr.to_string(),
            config,
            window,
            callback,
            dispatch,
            pressed,
            state: Mutex::new(KeyState {
                fire: FireState::new(),
                ..KeyState::default()
            }),
            weak: weak.clone(),
        }))
    }

    /// The expression this bind was built from.
    pub fn expression(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &KeyExpr {
        &self.expr
    }

    pub fn config(&self) -> &BindConfig {
        &self.config
    }

    /// Lifetime fire count.
    pub fn fires(&self) -> u32 {
        self.state.lock().unwrap().fire.fires
    }

    /// Drop all in-flight evaluation state, as if the bind were fresh.
    /// Pending hold/repeat timers are invalidated through the token bump.
    pub fn reset(&self) {
        let mut st = self.state.lock().unwrap();
        Self::reset_locked(&mut st);
    }

    fn reset_locked(st: &mut KeyState) {
        st.seq_index = 0;
        st.seq_last_ms = 0;
        st.click_down_ms = None;
        st.tap_count = 0;
        st.tap_last_ms = 0;
        st.fire.hold_token += 1;
        st.fire.repeat_active = false;
        st.armed = false;
        st.was_full = false;
        st.had_full = false;
        st.release_armed = false;
        st.order.reset();
    }

    /// Pressed-key domain the chord is matched against, per injected policy.
    /// For ALLOW the event's own origin decides: injected events match the
    /// injected keys plus any held physical modifiers, so a real Ctrl still
    /// qualifies a synthetic E.
    fn domain<'a>(&self, view: &StateView<'a>, event_injected: bool) -> Cow<'a, HashSet<u16>> {
        match self.config.injected {
            InjectedPolicy::Ignore => Cow::Borrowed(view.keys),
            InjectedPolicy::Only => Cow::Borrowed(view.keys_injected),
            InjectedPolicy::Allow => {
                if event_injected {
                    let mut union: HashSet<u16> = view.keys_injected.clone();
                    union.extend(view.keys.iter().copied().filter(|vk| is_modifier_vk(*vk)));
                    Cow::Owned(union)
                } else {
                    Cow::Borrowed(view.keys)
                }
            }
        }
    }

    fn match_chord(&self, chord: &ChordSpec, pressed: &HashSet<u16>) -> bool {
        for group in chord.groups() {
            if !group.iter().any(|vk| pressed.contains(vk)) {
                return false;
            }
        }

        match self.config.constraints.chord_policy {
            ChordPolicy::Relaxed => true,
            ChordPolicy::IgnoreExtraModifiers => pressed
                .iter()
                .all(|vk| chord.contains(*vk) || is_modifier_vk(*vk)),
            ChordPolicy::Strict => {
                let ignored = &self.config.constraints.ignore_keys;
                pressed
                    .iter()
                    .all(|vk| ignored.contains(vk) || chord.contains(*vk))
            }
        }
    }

    /// Evaluate one keyboard event. Returns the suppression verdict.
    pub fn handle(&self, event: &KeyboardEvent, view: &StateView<'_>) -> HookFlags {
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
        if !cfg.checks.is_empty() && !checks_ok(&cfg.checks, HookEvent::Keyboard(event), view) {
            return HookFlags::CONTINUE;
        }

        // Debounce.
        if cfg.timing.debounce_ms > 0
            && now.saturating_sub(st.last_event_ms) < cfg.timing.debounce_ms
        {
            return HookFlags::CONTINUE;
        }

        // Sequence step timeout.
        if self.expr.is_sequence()
            && st.seq_index > 0
            && now.saturating_sub(st.seq_last_ms) > cfg.timing.chord_timeout_ms
        {
            Self::reset_locked(&mut st);
        }

        st.last_event_ms = now;

        // Injected filter.
        let inj = event.injected;
        match cfg.injected {
            InjectedPolicy::Ignore if inj => return HookFlags::CONTINUE,
            InjectedPolicy::Only if !inj => return HookFlags::CONTINUE,
            _ => {}
        }

        let step = st.seq_index;
        let chord = &self.expr.steps()[step];
        let pressed = self.domain(view, inj);

        let vk_evt = event.vk;
        let is_down = event.action.is_down();
        let is_up = event.action.is_up();
        let fresh_down = is_down && (cfg.constraints.allow_os_key_repeat || !event.is_repeat);

        let strict = matches!(
            cfg.constraints.order_policy,
            OrderPolicy::Strict | OrderPolicy::StrictRecoverable
        );
        let recoverable = cfg.constraints.order_policy == OrderPolicy::StrictRecoverable;

        if strict {
            st.order
                .on_event(chord, &pressed, vk_evt, fresh_down, recoverable);
        }

        let prev_full = st.was_full;
        let had_full_before = st.had_full;
        let mut full = self.match_chord(chord, &pressed);
        if strict && full && !st.order.allows_full(chord, &pressed, recoverable) {
            full = false;
        }
        if strict && full && !prev_full {
            st.order.on_full_rising_edge(chord);
        }

        st.armed = full;

        // Track the activation cycle: the chord was fully pressed at least
        // once since the last time every chord key was up.
        if full {
            st.had_full = true;
        }

        // Rearm ON_RELEASE on every not_full -> full transition.
        if full && !prev_full {
            st.release_armed = true;
        }

        let any_chord_key_pressed = chord.allowed().iter().any(|vk| pressed.contains(vk));

        let mut flags = HookFlags::CONTINUE;
        let relevant = chord.contains(vk_evt) || is_modifier_vk(vk_evt);

        match cfg.suppress {
            SuppressPolicy::Always => flags |= HookFlags::DONT_PASS,
            SuppressPolicy::WhileActive => {
                if st.armed && relevant {
                    flags |= HookFlags::DONT_PASS;
                }
            }
            SuppressPolicy::WhileEvaluating => {
                // Suppress during chord assembly: anything from the allowed
                // set (or a modifier) while progress is visible.
                let in_progress = full
                    || prev_full
                    || any_chord_key_pressed
                    || pressed.iter().any(|vk| is_modifier_vk(*vk));
                if in_progress && relevant {
                    flags |= HookFlags::DONT_PASS;
                }
            }
            SuppressPolicy::Never | SuppressPolicy::WhenMatched => {}
        }

        let trig = cfg.trigger;

        // Sequences: steps advance on fresh full downs; only the final step
        // fires, then the machine rewinds.
        if self.expr.is_sequence() {
            if full && fresh_down {
                st.seq_last_ms = now;
                if step == self.expr.steps().len() - 1 {
                    if matches!(
                        trig,
                        Trigger::OnSequence | Trigger::OnPress | Trigger::OnChordComplete
                    ) && self.fire_gate(&mut st, now)
                        && cfg.suppress == SuppressPolicy::WhenMatched
                    {
                        flags |= HookFlags::DONT_PASS;
                    }
                    Self::reset_locked(&mut st);
                } else {
                    st.seq_index += 1;
                    st.order.reset();
                }
            }

            st.was_full = full;
            if !any_chord_key_pressed {
                st.had_full = false;
                st.release_armed = false;
                st.order.reset();
            }
            return flags;
        }

        match trig {
            Trigger::OnPress => {
                // Any fresh keydown that completes or maintains a full chord.
                if full && fresh_down && chord.contains(vk_evt) {
                    if self.fire_gate(&mut st, now) && cfg.suppress == SuppressPolicy::WhenMatched {
                        flags |= HookFlags::DONT_PASS;
                    }
                }
            }

            Trigger::OnChordComplete => {
                // First NOT_FULL -> FULL transition of the activation cycle.
                if full && fresh_down && !prev_full && !had_full_before && chord.contains(vk_evt) {
                    if self.fire_gate(&mut st, now) && cfg.suppress == SuppressPolicy::WhenMatched {
                        flags |= HookFlags::DONT_PASS;
                    }
                }
            }

            Trigger::OnRelease => {
                // Rearmed each time the chord becomes full; consumed by the
                // next allowed-set keyup. Hold Ctrl and tap E: one fire per
                // E release.
                if st.had_full && st.release_armed && is_up && chord.contains(vk_evt) {
                    if self.fire_gate(&mut st, now) && cfg.suppress == SuppressPolicy::WhenMatched {
                        flags |= HookFlags::DONT_PASS;
                    }
                    st.release_armed = false;
                }
            }

            Trigger::OnChordReleased => {
                // Every chord key released after the chord was fully pressed.
                if st.had_full && is_up && chord.contains(vk_evt) && !any_chord_key_pressed {
                    if self.fire_gate(&mut st, now) && cfg.suppress == SuppressPolicy::WhenMatched {
                        flags |= HookFlags::DONT_PASS;
                    }
                    st.had_full = false;
                    st.release_armed = false;
                    st.order.reset();
                }
            }

            Trigger::OnClick => {
                if full && fresh_down {
                    st.click_down_ms = Some(now);
                } else if is_up {
                    if let Some(down_ms) = st.click_down_ms.take() {
                        if now.saturating_sub(down_ms) <= cfg.timing.hold_ms {
                            if self.fire_gate(&mut st, now)
                                && cfg.suppress == SuppressPolicy::WhenMatched
                            {
                                flags |= HookFlags::DONT_PASS;
                            }
                        }
                    }
                }
            }

            Trigger::OnHold => {
                if full && fresh_down {
                    st.fire.hold_token += 1;
                    let token = st.fire.hold_token;
                    self.spawn_hold_timer(token, step, inj);
                }
            }

            Trigger::OnRepeat => {
                if full && is_down && !st.fire.repeat_active {
                    st.fire.repeat_active = true;
                    let token = st.fire.hold_token;
                    self.spawn_repeat_task(token, step, inj);
                }
            }

            Trigger::OnDoubleTap => {
                if full && fresh_down {
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

            // Single-chord expressions never reach OnSequence firing; the
            // sequence block above owns it.
            Trigger::OnSequence => {}
        }

        // Cycle closes once nothing from the allowed set is held.
        if !any_chord_key_pressed {
            st.had_full = false;
            st.release_armed = false;
            st.order.reset();
        }

        st.was_full = full;
        flags
    }

    fn fire_gate(&self, st: &mut KeyState, ts_ms: u64) -> bool {
        st.fire.fire_if_allowed(
            &self.config.timing,
            self.config.constraints.max_fires,
            ts_ms,
            &self.callback,
            &self.dispatch,
        )
    }

    /// One-shot hold check `hold_ms` from now. Valid only while the captured
    /// token holds and the chord is still matched against the live state.
    fn spawn_hold_timer(&self, token: u64, step: usize, event_injected: bool) {
        let Some(bind) = self.weak.upgrade() else {
            return;
        };
        let hold_ms = self.config.timing.hold_ms;

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(hold_ms));

            let mut st = bind.state.lock().unwrap();
            if token != st.fire.hold_token {
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

            let step = step.min(bind.expr.steps().len() - 1);
            let chord = &bind.expr.steps()[step];
            let matched = bind.pressed.with(|sets| {
                let view = sets.view();
                bind.match_chord(chord, &bind.domain(&view, event_injected))
            });
            if matched {
                bind.fire_gate(&mut st, now_ms());
            }
        });
    }

    /// Repeat loop: initial delay of `max(hold_ms, repeat_delay_ms)`, then a
    /// fire every `repeat_interval_ms` while the chord stays matched and the
    /// window focused.
    fn spawn_repeat_task(&self, token: u64, step: usize, event_injected: bool) {
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
                    if token != st.fire.hold_token {
                        st.fire.repeat_active = false;
                        return;
                    }

                    let step = step.min(bind.expr.steps().len() - 1);
                    let chord = &bind.expr.steps()[step];
                    let matched = bind.pressed.with(|sets| {
                        let view = sets.view();
                        bind.match_chord(chord, &bind.domain(&view, event_injected))
                    });
                    let status = st.fire.probe_focus(
                        bind.window.as_ref(),
                        bind.config.timing.focus_cache_ms,
                        true,
                    );
                    if !matched || !status.focused {
                        st.fire.repeat_active = false;
                        debug!("repeat loop for {:?} stopped", bind.source);
                        return;
                    }

                    bind.fire_gate(&mut st, now_ms());
                }
                thread::sleep(Duration::from_millis(interval_ms));
            }
        });
    }
}

impl std::fmt::Debug for KeyBind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBind")
            .field("expr", &self.source)
            .field("trigger", &self.config.trigger)
            .finish()
    }
}
