//! Pressed-input bookkeeping.
//!
//! The global dispatcher owns one [`PressedSets`] and updates it on the hook
//! thread before any bind runs. Binds receive a read-only [`StateView`];
//! hold/repeat timer tasks re-evaluate through the shared handle because the
//! pressed state keeps moving while they sleep.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::events::{KeyboardEvent, MouseEvent};
use crate::events::MouseButton;

/// Currently pressed keys and buttons, split by origin.
#[derive(Debug, Default, Clone)]
pub struct PressedSets {
    /// Events the OS marked as real.
    pub keys: HashSet<u16>,
    pub mouse: HashSet<MouseButton>,
    /// Physical + injected union.
    pub keys_all: HashSet<u16>,
    pub mouse_all: HashSet<MouseButton>,
    /// Events the OS marked as synthetic.
    pub keys_injected: HashSet<u16>,
    pub mouse_injected: HashSet<MouseButton>,
}

impl PressedSets {
    /// Apply a keyboard event. Returns whether the key was already down in
    /// the event's origin domain (OS auto-repeat marker for keydowns).
    pub fn apply_keyboard(&mut self, event: &KeyboardEvent) -> bool {
        let vk = event.vk;
        let was_down = if event.action.is_down() {
            if event.injected {
                self.keys_injected.contains(&vk)
            } else {
                self.keys.contains(&vk)
            }
        } else {
            false
        };

        if event.action.is_down() {
            self.keys_all.insert(vk);
            if event.injected {
                self.keys_injected.insert(vk);
            } else {
                self.keys.insert(vk);
            }
        } else if event.action.is_up() {
            self.keys_all.remove(&vk);
            self.keys.remove(&vk);
            self.keys_injected.remove(&vk);
        }

        was_down
    }

    /// Apply a mouse event. Non-button events leave the sets untouched.
    pub fn apply_mouse(&mut self, event: &MouseEvent) {
        let Some((button, down)) = event.button() else {
            return;
        };

        if down {
            self.mouse_all.insert(button);
            if event.injected {
                self.mouse_injected.insert(button);
            } else {
                self.mouse.insert(button);
            }
        } else {
            self.mouse_all.remove(&button);
            self.mouse.remove(&button);
            self.mouse_injected.remove(&button);
        }
    }

    pub fn view(&self) -> StateView<'_> {
        StateView {
            keys: &self.keys,
            mouse: &self.mouse,
            keys_all: &self.keys_all,
            mouse_all: &self.mouse_all,
            keys_injected: &self.keys_injected,
            mouse_injected: &self.mouse_injected,
        }
    }
}

/// Read-only view over [`PressedSets`] handed to bind evaluators and user
/// predicates.
#[derive(Debug, Clone, Copy)]
pub struct StateView<'a> {
    pub keys: &'a HashSet<u16>,
    pub mouse: &'a HashSet<MouseButton>,
    pub keys_all: &'a HashSet<u16>,
    pub mouse_all: &'a HashSet<MouseButton>,
    pub keys_injected: &'a HashSet<u16>,
    pub mouse_injected: &'a HashSet<MouseButton>,
}

/// Shared handle to the dispatcher-owned pressed state. Cloned into binds so
/// timer tasks can look at the live sets.
#[derive(Debug, Clone, Default)]
pub struct SharedPressedState {
    inner: Arc<Mutex<PressedSets>>,
}

impl SharedPressedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&PressedSets) -> R) -> R {
        let sets = self.inner.lock().unwrap();
        f(&sets)
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut PressedSets) -> R) -> R {
        let mut sets = self.inner.lock().unwrap();
        f(&mut sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{KeyAction, MouseAction};

    #[test]
    fn keyboard_domains_stay_disjoint_by_origin() {
        let mut sets = PressedSets::default();

        sets.apply_keyboard(&KeyboardEvent::new(KeyAction::Down, 0x41, 0));
        sets.apply_keyboard(&KeyboardEvent::new(KeyAction::Down, 0x42, 0).injected());

        assert!(sets.keys.contains(&0x41));
        assert!(!sets.keys.contains(&0x42));
        assert!(sets.keys_injected.contains(&0x42));
        assert!(sets.keys_all.contains(&0x41) && sets.keys_all.contains(&0x42));

        // Up removes from every domain regardless of origin.
        sets.apply_keyboard(&KeyboardEvent::new(KeyAction::Up, 0x42, 1));
        assert!(!sets.keys_all.contains(&0x42));
        assert!(!sets.keys_injected.contains(&0x42));
    }

    #[test]
    fn auto_repeat_detected_per_domain() {
        let mut sets = PressedSets::default();

        assert!(!sets.apply_keyboard(&KeyboardEvent::new(KeyAction::Down, 0x41, 0)));
        assert!(sets.apply_keyboard(&KeyboardEvent::new(KeyAction::Down, 0x41, 10)));

        // Physical A held; an injected A-down is fresh in its own domain.
        assert!(!sets.apply_keyboard(&KeyboardEvent::new(KeyAction::Down, 0x41, 20).injected()));
        assert!(!sets.apply_keyboard(&KeyboardEvent::new(KeyAction::Up, 0x41, 30)));
    }

    #[test]
    fn mouse_buttons_and_xbuttons() {
        let mut sets = PressedSets::default();

        sets.apply_mouse(&MouseEvent::new(MouseAction::LeftDown, 0));
        sets.apply_mouse(&MouseEvent::new(MouseAction::XDown, 0).with_data(2));
        assert!(sets.mouse.contains(&MouseButton::Left));
        assert!(sets.mouse.contains(&MouseButton::X2));

        // Moves and wheels bypass the bookkeeping.
        sets.apply_mouse(&MouseEvent::new(MouseAction::Move, 1));
        sets.apply_mouse(&MouseEvent::new(MouseAction::Wheel, 1).with_data(120));
        assert_eq!(sets.mouse.len(), 2);

        sets.apply_mouse(&MouseEvent::new(MouseAction::XUp, 2).with_data(2));
        assert!(!sets.mouse.contains(&MouseButton::X2));
    }
}
