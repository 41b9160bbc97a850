//! Ordered-chord matching for the STRICT and STRICT_RECOVERABLE order
//! policies.
//!
//! Model, per chord step:
//! - Group order is the index order of `ChordSpec::groups`: 0, 1, 2, ...
//! - The groups currently pressed must always form a prefix `[0..k]`.
//! - Before the first full match, groups must *first appear* in index order.
//! - After the first full match a locked prefix is established (every group
//!   but the last). The tail may be rebuilt, left to right; the locked
//!   prefix must stay continuously held and may only shrink as keys release
//!   from the right.
//!
//! For `ctrl+shift+x`: Ctrl, Shift, X then X up / X down is fine; Shift
//! before Ctrl is fatal; Ctrl up while Shift+X are held breaks the locked
//! prefix and is fatal; after releasing Shift+X, pressing X before Shift is
//! a tail mistake, fatal under STRICT and retryable under
//! STRICT_RECOVERABLE.

use std::collections::HashSet;

use crate::parse::ChordSpec;

#[derive(Debug, Default)]
pub(crate) struct OrderTracker {
    /// Fatal for the rest of the chord cycle.
    invalid: bool,
    /// Recoverable tail-rebuild mistake (STRICT_RECOVERABLE only).
    attempt_invalid: bool,
    /// Group indices in first-press order, before the first full match.
    seen_groups: Vec<usize>,
    /// None before the first full match; then `groups.len() - 1`, shrinking
    /// as the right tail releases.
    locked_prefix_len: Option<usize>,
}

fn pressed_group_indices(chord: &ChordSpec, pressed: &HashSet<u16>) -> Vec<usize> {
    chord
        .groups()
        .iter()
        .enumerate()
        .filter(|(_, group)| group.iter().any(|vk| pressed.contains(vk)))
        .map(|(i, _)| i)
        .collect()
}

fn is_prefix(indices: &[usize]) -> bool {
    indices.iter().enumerate().all(|(i, &gi)| i == gi)
}

impl OrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.invalid = false;
        self.attempt_invalid = false;
        self.seen_groups.clear();
        self.locked_prefix_len = None;
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    /// Feed one event. `pressed` must be the post-event pressed set in the
    /// bind's matching domain.
    pub fn on_event(
        &mut self,
        chord: &ChordSpec,
        pressed: &HashSet<u16>,
        vk_evt: u16,
        fresh_down: bool,
        recoverable: bool,
    ) {
        if self.invalid {
            return;
        }

        let pressed_idxs = pressed_group_indices(chord, pressed);
        let prefix = is_prefix(&pressed_idxs);

        // The locked prefix shrinks only by releases from the right.
        if let Some(locked) = self.locked_prefix_len {
            if prefix && pressed_idxs.len() < locked {
                self.locked_prefix_len = Some(pressed_idxs.len());
            }
        }

        if recoverable {
            if let Some(locked) = self.locked_prefix_len {
                // A tail mistake clears once the user is back on a valid
                // prefix at or below the tail base.
                if prefix && pressed_idxs.len() <= locked {
                    self.attempt_invalid = false;
                }
            }
        }

        if !prefix {
            let Some(locked) = self.locked_prefix_len else {
                // Any non-prefix state before the first success is fatal.
                self.invalid = true;
                return;
            };

            let prefix_ok = pressed_idxs.len() >= locked
                && pressed_idxs[..locked].iter().enumerate().all(|(i, &gi)| i == gi);
            if !prefix_ok {
                // e.g. ctrl+shift+x with Ctrl released under Shift+X: [1,2].
                self.invalid = true;
                return;
            }

            // Locked prefix still held, tail malformed (e.g. [0,2]).
            if recoverable {
                self.attempt_invalid = true;
            } else {
                self.invalid = true;
            }
            return;
        }

        // Keys outside the chord never advance the order bookkeeping.
        if !chord.contains(vk_evt) {
            return;
        }
        let Some(gi) = chord.group_index(vk_evt) else {
            return;
        };

        if fresh_down {
            let Some(locked) = self.locked_prefix_len else {
                // Pre-success: first appearances must arrive 0, 1, 2, ...
                if !self.seen_groups.contains(&gi) {
                    if gi != self.seen_groups.len() {
                        self.invalid = true;
                        return;
                    }
                    self.seen_groups.push(gi);
                }
                // Re-press before first success is fine while the prefix
                // invariant holds.
                return;
            };

            // Post-success: locked-prefix groups must stay held, never be
            // re-pressed.
            if gi < locked {
                self.invalid = true;
                return;
            }

            // Tail rebuild goes left to right; the freshly pressed group must
            // be the rightmost of the post-event prefix.
            let expected = pressed_idxs.len().saturating_sub(1);
            if gi != expected {
                if recoverable {
                    self.attempt_invalid = true;
                } else {
                    self.invalid = true;
                }
            }
        }
    }

    /// Veto for chord completion: a full pressed set still fails while the
    /// tracker is invalid (or mid tail-retry in recoverable mode).
    pub fn allows_full(
        &self,
        chord: &ChordSpec,
        pressed: &HashSet<u16>,
        recoverable: bool,
    ) -> bool {
        if self.invalid {
            return false;
        }
        if recoverable && self.attempt_invalid {
            return false;
        }
        is_prefix(&pressed_group_indices(chord, pressed))
    }

    /// Called on the chord's rising edge: lock all but the last group.
    pub fn on_full_rising_edge(&mut self, chord: &ChordSpec) {
        if self.locked_prefix_len.is_none() {
            self.locked_prefix_len = Some(chord.groups().len().saturating_sub(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keycodes::vk;
    use crate::parse::parse_chord;

    const X: u16 = 0x58;

    struct Driver {
        chord: ChordSpec,
        tracker: OrderTracker,
        pressed: HashSet<u16>,
        recoverable: bool,
    }

    impl Driver {
        fn new(expr: &str, recoverable: bool) -> Self {
            Self {
                chord: parse_chord(expr).expect("chord expected"),
                tracker: OrderTracker::new(),
                pressed: HashSet::new(),
                recoverable,
            }
        }

        fn down(&mut self, vk: u16) {
            self.pressed.insert(vk);
            self.tracker
                .on_event(&self.chord, &self.pressed, vk, true, self.recoverable);
        }

        fn up(&mut self, vk: u16) {
            self.pressed.remove(&vk);
            self.tracker
                .on_event(&self.chord, &self.pressed, vk, false, self.recoverable);
        }

        fn full_allowed(&self) -> bool {
            self.tracker
                .allows_full(&self.chord, &self.pressed, self.recoverable)
        }

        fn rising_edge(&mut self) {
            self.tracker.on_full_rising_edge(&self.chord);
        }
    }

    #[test]
    fn in_order_press_is_valid() {
        let mut d = Driver::new("ctrl+shift+x", false);
        d.down(vk::LCONTROL);
        d.down(vk::LSHIFT);
        d.down(X);
        assert!(d.full_allowed());
    }

    #[test]
    fn out_of_order_press_is_fatal() {
        let mut d = Driver::new("ctrl+shift+x", false);
        d.down(vk::LSHIFT);
        d.down(vk::LCONTROL);
        d.down(X);
        assert!(d.tracker.is_invalid());
        assert!(!d.full_allowed());
    }

    #[test]
    fn tail_retap_is_allowed_after_success() {
        let mut d = Driver::new("ctrl+shift+x", false);
        d.down(vk::LCONTROL);
        d.down(vk::LSHIFT);
        d.down(X);
        d.rising_edge();
        d.up(X);
        d.down(X);
        assert!(d.full_allowed());
    }

    #[test]
    fn breaking_locked_prefix_is_fatal() {
        let mut d = Driver::new("ctrl+shift+x", false);
        d.down(vk::LCONTROL);
        d.down(vk::LSHIFT);
        d.down(X);
        d.rising_edge();
        // Ctrl released while Shift+X still held.
        d.up(vk::LCONTROL);
        assert!(d.tracker.is_invalid());
    }

    #[test]
    fn repress_inside_locked_prefix_is_fatal() {
        let mut d = Driver::new("ctrl+shift+x", false);
        d.down(vk::LCONTROL);
        d.down(vk::LSHIFT);
        d.down(X);
        d.rising_edge();
        d.up(X);
        d.up(vk::LSHIFT);
        d.down(vk::LSHIFT);
        assert!(!d.tracker.is_invalid());
        // Ctrl is locked; tapping it again breaks the invariant.
        d.down(vk::LCONTROL);
        assert!(d.tracker.is_invalid());
    }

    #[test]
    fn malformed_tail_fatal_under_strict() {
        let mut d = Driver::new("ctrl+shift+x", false);
        d.down(vk::LCONTROL);
        d.down(vk::LSHIFT);
        d.down(X);
        d.rising_edge();
        d.up(X);
        d.up(vk::LSHIFT);
        // X before Shift: tail must rebuild left to right.
        d.down(X);
        assert!(d.tracker.is_invalid());
    }

    #[test]
    fn malformed_tail_recovers_under_recoverable() {
        let mut d = Driver::new("ctrl+shift+x", true);
        d.down(vk::LCONTROL);
        d.down(vk::LSHIFT);
        d.down(X);
        d.rising_edge();
        d.up(X);
        d.up(vk::LSHIFT);
        d.down(X);
        assert!(!d.tracker.is_invalid());
        assert!(!d.full_allowed());

        // Back off to the locked prefix, then rebuild correctly.
        d.up(X);
        d.down(vk::LSHIFT);
        d.down(X);
        assert!(d.full_allowed());
    }

    #[test]
    fn locked_prefix_shrinks_by_right_releases() {
        let mut d = Driver::new("ctrl+shift+x", false);
        d.down(vk::LCONTROL);
        d.down(vk::LSHIFT);
        d.down(X);
        d.rising_edge();
        d.up(X);
        d.up(vk::LSHIFT);
        d.up(vk::LCONTROL);
        // Everything released; tracker is reusable after reset by the owner.
        assert!(!d.tracker.is_invalid());
        d.down(vk::LCONTROL);
        d.down(vk::LSHIFT);
        d.down(X);
        assert!(d.full_allowed());
    }

    #[test]
    fn reset_clears_everything() {
        let mut d = Driver::new("ctrl+shift+x", false);
        d.down(vk::LSHIFT);
        d.down(vk::LCONTROL);
        assert!(d.tracker.is_invalid());
        d.tracker.reset();
        assert!(!d.tracker.is_invalid());
        assert_eq!(d.tracker.locked_prefix_len, None);
        assert!(d.tracker.seen_groups.is_empty());
    }
}
