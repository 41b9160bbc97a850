//! Bind configuration: trigger kind, suppression and matching policies,
//! timings, constraints, and user predicates.
//!
//! Two merge operators combine configs: [`BindConfig::merge_soft`] takes a
//! patch field only when it differs from that field's default, and
//! [`BindConfig::merge_hard`] lets the patch win outright. Both recurse into
//! the nested subtrees.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::events::HookEvent;
use crate::state::StateView;

/// When to fire the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    OnPress,
    OnRelease,
    OnClick,
    OnHold,
    OnRepeat,
    OnDoubleTap,
    OnChordComplete,
    OnChordReleased,
    OnSequence,
}

/// Whether/when to stop the event from reaching other applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuppressPolicy {
    Never,
    Always,
    WhenMatched,
    WhileActive,
    WhileEvaluating,
}

/// How to treat extra pressed keys while matching a chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChordPolicy {
    Relaxed,
    Strict,
    IgnoreExtraModifiers,
}

/// Whether key press order matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderPolicy {
    Any,
    Strict,
    StrictRecoverable,
}

/// How to handle injected (synthetic) input events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InjectedPolicy {
    /// Process both physical and injected input.
    Allow,
    /// Treat injected input as non-existent.
    Ignore,
    /// React only to injected input.
    Only,
}

/// What to do when the target window loses focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusPolicy {
    CancelOnBlur,
    PauseOnBlur,
}

/// Millisecond timing knobs. All values are absolute guards; zero disables
/// the corresponding check where that makes sense (debounce, cooldown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub chord_timeout_ms: u64,
    pub debounce_ms: u64,
    pub hold_ms: u64,
    pub repeat_delay_ms: u64,
    pub repeat_interval_ms: u64,
    pub double_tap_window_ms: u64,
    pub focus_cache_ms: u64,
    pub cooldown_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            chord_timeout_ms: 350,
            debounce_ms: 0,
            hold_ms: 350,
            repeat_delay_ms: 350,
            repeat_interval_ms: 60,
            double_tap_window_ms: 300,
            focus_cache_ms: 50,
            cooldown_ms: 0,
        }
    }
}

impl Timing {
    fn merge_soft(&self, patch: &Timing) -> Timing {
        let defaults = Timing::default();
        let pick = |base: u64, patched: u64, default: u64| {
            if patched != default {
                patched
            } else {
                base
            }
        };
        Timing {
            chord_timeout_ms: pick(
                self.chord_timeout_ms,
                patch.chord_timeout_ms,
                defaults.chord_timeout_ms,
            ),
            debounce_ms: pick(self.debounce_ms, patch.debounce_ms, defaults.debounce_ms),
            hold_ms: pick(self.hold_ms, patch.hold_ms, defaults.hold_ms),
            repeat_delay_ms: pick(
                self.repeat_delay_ms,
                patch.repeat_delay_ms,
                defaults.repeat_delay_ms,
            ),
            repeat_interval_ms: pick(
                self.repeat_interval_ms,
                patch.repeat_interval_ms,
                defaults.repeat_interval_ms,
            ),
            double_tap_window_ms: pick(
                self.double_tap_window_ms,
                patch.double_tap_window_ms,
                defaults.double_tap_window_ms,
            ),
            focus_cache_ms: pick(
                self.focus_cache_ms,
                patch.focus_cache_ms,
                defaults.focus_cache_ms,
            ),
            cooldown_ms: pick(self.cooldown_ms, patch.cooldown_ms, defaults.cooldown_ms),
        }
    }
}

/// Matching constraints beyond timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    pub chord_policy: ChordPolicy,
    pub order_policy: OrderPolicy,
    /// Let OS auto-repeat keydowns count as fresh presses. With a zero
    /// cooldown an ON_PRESS bind then fires once per repeat event.
    pub allow_os_key_repeat: bool,
    /// Hard cap on lifetime fires, `None` for unlimited.
    pub max_fires: Option<u32>,
    /// Keys tolerated by the STRICT chord policy.
    pub ignore_keys: BTreeSet<u16>,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            chord_policy: ChordPolicy::IgnoreExtraModifiers,
            order_policy: OrderPolicy::Any,
            allow_os_key_repeat: false,
            max_fires: None,
            ignore_keys: BTreeSet::new(),
        }
    }
}

impl Constraints {
    fn merge_soft(&self, patch: &Constraints) -> Constraints {
        let defaults = Constraints::default();
        Constraints {
            chord_policy: if patch.chord_policy != defaults.chord_policy {
                patch.chord_policy
            } else {
                self.chord_policy
            },
            order_policy: if patch.order_policy != defaults.order_policy {
                patch.order_policy
            } else {
                self.order_policy
            },
            allow_os_key_repeat: if patch.allow_os_key_repeat != defaults.allow_os_key_repeat {
                patch.allow_os_key_repeat
            } else {
                self.allow_os_key_repeat
            },
            max_fires: if patch.max_fires != defaults.max_fires {
                patch.max_fires
            } else {
                self.max_fires
            },
            ignore_keys: if patch.ignore_keys != defaults.ignore_keys {
                patch.ignore_keys.clone()
            } else {
                self.ignore_keys.clone()
            },
        }
    }
}

/// User predicate consulted before evaluation; all must pass.
pub type Predicate = Arc<dyn Fn(&HookEvent<'_>, &StateView<'_>) -> bool + Send + Sync>;

/// Ordered, short-circuit ANDed predicates.
#[derive(Clone, Default)]
pub struct Checks {
    predicates: Vec<Predicate>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(
        predicate: impl Fn(&HookEvent<'_>, &StateView<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            predicates: vec![Arc::new(predicate)],
        }
    }

    pub fn push(
        &mut self,
        predicate: impl Fn(&HookEvent<'_>, &StateView<'_>) -> bool + Send + Sync + 'static,
    ) {
        self.predicates.push(Arc::new(predicate));
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter()
    }
}

impl fmt::Debug for Checks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checks")
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

// Predicates have no value equality; two check lists compare equal when they
// hold the same closures.
impl PartialEq for Checks {
    fn eq(&self, other: &Self) -> bool {
        self.predicates.len() == other.predicates.len()
            && self
                .predicates
                .iter()
                .zip(other.predicates.iter())
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

/// Full per-bind configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindConfig {
    pub trigger: Trigger,
    pub suppress: SuppressPolicy,
    pub injected: InjectedPolicy,
    pub focus: FocusPolicy,
    pub timing: Timing,
    pub constraints: Constraints,
    #[serde(skip)]
    pub checks: Checks,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            trigger: Trigger::OnPress,
            suppress: SuppressPolicy::Never,
            injected: InjectedPolicy::Allow,
            focus: FocusPolicy::CancelOnBlur,
            timing: Timing::default(),
            constraints: Constraints::default(),
            checks: Checks::new(),
        }
    }
}

impl BindConfig {
    /// Default configuration for mouse binds (trigger ON_CLICK).
    pub fn mouse_default() -> Self {
        Self {
            trigger: Trigger::OnClick,
            ..Self::default()
        }
    }

    /// Patch merge: a field from `patch` wins only when it differs from that
    /// field's default value.
    pub fn merge_soft(&self, patch: &BindConfig) -> BindConfig {
        let defaults = BindConfig::default();
        BindConfig {
            trigger: if patch.trigger != defaults.trigger {
                patch.trigger
            } else {
                self.trigger
            },
            suppress: if patch.suppress != defaults.suppress {
                patch.suppress
            } else {
                self.suppress
            },
            injected: if patch.injected != defaults.injected {
                patch.injected
            } else {
                self.injected
            },
            focus: if patch.focus != defaults.focus {
                patch.focus
            } else {
                self.focus
            },
            timing: self.timing.merge_soft(&patch.timing),
            constraints: self.constraints.merge_soft(&patch.constraints),
            checks: if !patch.checks.is_empty() {
                patch.checks.clone()
            } else {
                self.checks.clone()
            },
        }
    }

    /// Override merge: every field from `patch` wins.
    pub fn merge_hard(&self, patch: &BindConfig) -> BindConfig {
        BindConfig {
            trigger: patch.trigger,
            suppress: patch.suppress,
            injected: patch.injected,
            focus: patch.focus,
            timing: patch.timing,
            constraints: patch.constraints.clone(),
            checks: patch.checks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom() -> BindConfig {
        BindConfig {
            trigger: Trigger::OnHold,
            suppress: SuppressPolicy::WhenMatched,
            injected: InjectedPolicy::Ignore,
            focus: FocusPolicy::PauseOnBlur,
            timing: Timing {
                hold_ms: 450,
                cooldown_ms: 100,
                ..Timing::default()
            },
            constraints: Constraints {
                chord_policy: ChordPolicy::Strict,
                max_fires: Some(3),
                ..Constraints::default()
            },
            checks: Checks::new(),
        }
    }

    #[test]
    fn soft_merge_is_idempotent() {
        let c = custom();
        assert_eq!(c.merge_soft(&c), c);
    }

    #[test]
    fn hard_merge_from_defaults_is_identity() {
        let c = custom();
        assert_eq!(BindConfig::default().merge_hard(&c), c);
    }

    #[test]
    fn soft_merge_keeps_base_where_patch_is_default() {
        let base = custom();
        let patch = BindConfig {
            timing: Timing {
                double_tap_window_ms: 250,
                ..Timing::default()
            },
            ..BindConfig::default()
        };
        let merged = base.merge_soft(&patch);
        assert_eq!(merged.timing.double_tap_window_ms, 250);
        assert_eq!(merged.timing.hold_ms, 450);
        assert_eq!(merged.trigger, Trigger::OnHold);
        assert_eq!(merged.constraints.max_fires, Some(3));
    }

    #[test]
    fn soft_merge_patch_overrides_non_default_fields() {
        let base = BindConfig::default();
        let patch = BindConfig {
            suppress: SuppressPolicy::WhileEvaluating,
            ..BindConfig::default()
        };
        assert_eq!(
            base.merge_soft(&patch).suppress,
            SuppressPolicy::WhileEvaluating
        );
    }

    #[test]
    fn mouse_default_clicks() {
        assert_eq!(BindConfig::mouse_default().trigger, Trigger::OnClick);
    }

    #[test]
    fn checks_compare_by_identity() {
        let shared = Checks::single(|_, _| true);
        assert_eq!(shared.clone(), shared);
        let other = Checks::single(|_, _| true);
        assert_ne!(shared, other);
    }

    #[test]
    fn config_serde_round_trip() {
        let c = custom();
        let json = serde_json::to_string(&c).expect("serialize");
        let back: BindConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, c);
    }
}
