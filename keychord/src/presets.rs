//! Ready-to-use bind configurations and a few practical bundles.
//!
//! ```no_run
//! use keychord::{presets, Hook};
//!
//! let hook = Hook::new()?;
//! hook.bind_with("k", presets::hold(450), || println!("held"))?;
//! let ptt = presets::ptt(true, false);
//! hook.bind_with("v", ptt.press, || println!("mic on"))?;
//! hook.bind_with("v", ptt.release, || println!("mic off"))?;
//! # Ok::<(), keychord::Error>(())
//! ```

use crate::config::{
    BindConfig, ChordPolicy, Constraints, SuppressPolicy, Timing, Trigger,
};

fn strict_constraints() -> Constraints {
    Constraints {
        chord_policy: ChordPolicy::Strict,
        ..Constraints::default()
    }
}

fn base(trigger: Trigger, suppress: SuppressPolicy, timing: Timing, strict: bool) -> BindConfig {
    BindConfig {
        trigger,
        suppress,
        timing,
        constraints: if strict {
            strict_constraints()
        } else {
            Constraints::default()
        },
        ..BindConfig::default()
    }
}

/// Fire on every chord-completing keydown.
pub fn press() -> BindConfig {
    base(
        Trigger::OnPress,
        SuppressPolicy::Never,
        Timing::default(),
        false,
    )
}

/// Fire on the release after a completion.
pub fn release() -> BindConfig {
    base(
        Trigger::OnRelease,
        SuppressPolicy::Never,
        Timing::default(),
        false,
    )
}

/// Fire once the whole chord has been let go.
pub fn chord_released() -> BindConfig {
    base(
        Trigger::OnChordReleased,
        SuppressPolicy::Never,
        Timing::default(),
        false,
    )
}

/// Quick press-and-release within `tap_ms`.
pub fn click(tap_ms: u64) -> BindConfig {
    base(
        Trigger::OnClick,
        SuppressPolicy::Never,
        Timing {
            hold_ms: tap_ms,
            ..Timing::default()
        },
        false,
    )
}

/// Fire after the chord has been held `hold_ms`.
pub fn hold(hold_ms: u64) -> BindConfig {
    base(
        Trigger::OnHold,
        SuppressPolicy::Never,
        Timing {
            hold_ms,
            ..Timing::default()
        },
        false,
    )
}

/// Autorepeat: first fire after `delay_ms`, then every `interval_ms` while
/// held.
pub fn repeat(delay_ms: u64, interval_ms: u64) -> BindConfig {
    base(
        Trigger::OnRepeat,
        SuppressPolicy::Never,
        Timing {
            hold_ms: delay_ms,
            repeat_delay_ms: delay_ms,
            repeat_interval_ms: interval_ms,
            ..Timing::default()
        },
        false,
    )
}

/// Two taps inside `window_ms`.
pub fn double_tap(window_ms: u64) -> BindConfig {
    base(
        Trigger::OnDoubleTap,
        SuppressPolicy::Never,
        Timing {
            double_tap_window_ms: window_ms,
            ..Timing::default()
        },
        false,
    )
}

/// Multi-chord sequence with `timeout_ms` between steps.
pub fn sequence(timeout_ms: u64) -> BindConfig {
    base(
        Trigger::OnSequence,
        SuppressPolicy::Never,
        Timing {
            chord_timeout_ms: timeout_ms,
            ..Timing::default()
        },
        false,
    )
}

// Mouse presets carry their own tuned timings: clicks and holds are judged
// on tighter windows than their keyboard counterparts.

pub fn mouse_press() -> BindConfig {
    base(
        Trigger::OnPress,
        SuppressPolicy::Never,
        Timing::default(),
        false,
    )
}

pub fn mouse_release() -> BindConfig {
    base(
        Trigger::OnRelease,
        SuppressPolicy::Never,
        Timing::default(),
        false,
    )
}

/// Quick button click: press and release within 200 ms.
pub fn mouse_click() -> BindConfig {
    base(
        Trigger::OnClick,
        SuppressPolicy::Never,
        Timing {
            hold_ms: 200,
            ..Timing::default()
        },
        false,
    )
}

/// Fire after the button has been held 300 ms.
pub fn mouse_hold() -> BindConfig {
    base(
        Trigger::OnHold,
        SuppressPolicy::Never,
        Timing {
            hold_ms: 300,
            ..Timing::default()
        },
        false,
    )
}

/// Button autorepeat: first fire after 180 ms, then every 80 ms while held.
pub fn mouse_repeat() -> BindConfig {
    base(
        Trigger::OnRepeat,
        SuppressPolicy::Never,
        Timing {
            hold_ms: 180,
            repeat_delay_ms: 180,
            repeat_interval_ms: 80,
            ..Timing::default()
        },
        false,
    )
}

/// Two button taps inside 300 ms.
pub fn mouse_double_tap() -> BindConfig {
    base(
        Trigger::OnDoubleTap,
        SuppressPolicy::Never,
        Timing {
            double_tap_window_ms: 300,
            ..Timing::default()
        },
        false,
    )
}

/// One physical key, two behaviours: a quick tap and a long hold.
#[derive(Debug, Clone)]
pub struct TapHoldProfile {
    pub tap: BindConfig,
    pub hold: BindConfig,
}

pub fn tap_hold(tap_ms: u64, hold_ms: u64) -> TapHoldProfile {
    let mut held = hold(hold_ms);
    held.timing.cooldown_ms = 100;
    TapHoldProfile {
        tap: click(tap_ms),
        hold: held,
    }
}

/// Push-to-talk: press enables, release disables.
#[derive(Debug, Clone)]
pub struct PttProfile {
    pub press: BindConfig,
    pub release: BindConfig,
}

/// With `suppress` the key never leaks to the app while held
/// (WHILE_ACTIVE).
pub fn ptt(suppress: bool, strict: bool) -> PttProfile {
    let sup = if suppress {
        SuppressPolicy::WhileActive
    } else {
        SuppressPolicy::Never
    };
    PttProfile {
        press: base(Trigger::OnPress, sup, Timing::default(), strict),
        release: base(Trigger::OnRelease, sup, Timing::default(), strict),
    }
}

/// A hotkey the focused app should never see.
///
/// `aggressive` hides the chord already while it is being assembled;
/// otherwise only the matching event is swallowed.
pub fn silent_hotkey(strict: bool, aggressive: bool) -> BindConfig {
    let sup = if aggressive {
        SuppressPolicy::WhileEvaluating
    } else {
        SuppressPolicy::WhenMatched
    };
    base(Trigger::OnPress, sup, Timing::default(), strict)
}

/// A chord fully hidden from applications during assembly.
pub fn hidden_chord(strict: bool, chord_timeout_ms: u64) -> BindConfig {
    base(
        Trigger::OnPress,
        SuppressPolicy::WhileEvaluating,
        Timing {
            chord_timeout_ms,
            ..Timing::default()
        },
        strict,
    )
}

/// Mouse autofire while the button is held. With `suppress` the clicks stay
/// invisible to the app.
pub fn game_autofire(delay_ms: u64, interval_ms: u64, suppress: bool) -> BindConfig {
    let mut cfg = mouse_repeat();
    cfg.timing.hold_ms = delay_ms;
    cfg.timing.repeat_delay_ms = delay_ms;
    cfg.timing.repeat_interval_ms = interval_ms;
    cfg.suppress = if suppress {
        SuppressPolicy::WhileActive
    } else {
        SuppressPolicy::Never
    };
    cfg
}

/// Fast dash-style double tap with a short cooldown.
pub fn rapid_double_tap(window_ms: u64, cooldown_ms: u64) -> BindConfig {
    let mut cfg = double_tap(window_ms);
    cfg.timing.cooldown_ms = cooldown_ms;
    cfg
}

/// Sequence tuned for long cheat-code style combos.
pub fn cheatcode_sequence(timeout_ms: u64) -> BindConfig {
    sequence(timeout_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_pick_their_trigger() {
        assert_eq!(press().trigger, Trigger::OnPress);
        assert_eq!(release().trigger, Trigger::OnRelease);
        assert_eq!(chord_released().trigger, Trigger::OnChordReleased);
        assert_eq!(click(220).trigger, Trigger::OnClick);
        assert_eq!(hold(450).trigger, Trigger::OnHold);
        assert_eq!(repeat(200, 80).trigger, Trigger::OnRepeat);
        assert_eq!(double_tap(300).trigger, Trigger::OnDoubleTap);
        assert_eq!(sequence(550).trigger, Trigger::OnSequence);
    }

    #[test]
    fn repeat_timing_feeds_both_delay_knobs() {
        let cfg = repeat(200, 80);
        assert_eq!(cfg.timing.hold_ms, 200);
        assert_eq!(cfg.timing.repeat_delay_ms, 200);
        assert_eq!(cfg.timing.repeat_interval_ms, 80);
    }

    #[test]
    fn mouse_presets_use_mouse_tuned_timings() {
        assert_eq!(mouse_press().trigger, Trigger::OnPress);
        assert_eq!(mouse_release().trigger, Trigger::OnRelease);

        let click = mouse_click();
        assert_eq!(click.trigger, Trigger::OnClick);
        assert_eq!(click.timing.hold_ms, 200);

        let held = mouse_hold();
        assert_eq!(held.trigger, Trigger::OnHold);
        assert_eq!(held.timing.hold_ms, 300);

        let rep = mouse_repeat();
        assert_eq!(rep.trigger, Trigger::OnRepeat);
        assert_eq!(rep.timing.repeat_delay_ms, 180);
        assert_eq!(rep.timing.repeat_interval_ms, 80);

        let tap = mouse_double_tap();
        assert_eq!(tap.trigger, Trigger::OnDoubleTap);
        assert_eq!(tap.timing.double_tap_window_ms, 300);
    }

    #[test]
    fn game_autofire_builds_on_the_mouse_repeat_preset() {
        let cfg = game_autofire(150, 60, true);
        assert_eq!(cfg.trigger, Trigger::OnRepeat);
        assert_eq!(cfg.timing.repeat_delay_ms, 150);
        assert_eq!(cfg.timing.repeat_interval_ms, 60);
        assert_eq!(cfg.suppress, SuppressPolicy::WhileActive);

        let loud = game_autofire(150, 60, false);
        assert_eq!(loud.suppress, SuppressPolicy::Never);
    }

    #[test]
    fn ptt_suppression_covers_the_held_key() {
        let profile = ptt(true, false);
        assert_eq!(profile.press.suppress, SuppressPolicy::WhileActive);
        assert_eq!(profile.release.suppress, SuppressPolicy::WhileActive);

        let quiet = ptt(false, true);
        assert_eq!(quiet.press.suppress, SuppressPolicy::Never);
        assert_eq!(quiet.press.constraints.chord_policy, ChordPolicy::Strict);
    }

    #[test]
    fn silent_hotkey_modes() {
        assert_eq!(
            silent_hotkey(false, false).suppress,
            SuppressPolicy::WhenMatched
        );
        assert_eq!(
            silent_hotkey(false, true).suppress,
            SuppressPolicy::WhileEvaluating
        );
    }

    #[test]
    fn tap_hold_bundle() {
        let profile = tap_hold(220, 450);
        assert_eq!(profile.tap.trigger, Trigger::OnClick);
        assert_eq!(profile.tap.timing.hold_ms, 220);
        assert_eq!(profile.hold.trigger, Trigger::OnHold);
        assert_eq!(profile.hold.timing.hold_ms, 450);
        assert_eq!(profile.hold.timing.cooldown_ms, 100);
    }
}
