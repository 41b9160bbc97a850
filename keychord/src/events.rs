//! Event records delivered by the low-level hooks, plus the flag word
//! handlers return to the hook chain.

use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Keyboard hook action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
    /// Alt-qualified keydown (WM_SYSKEYDOWN).
    SysDown,
    /// Alt-qualified keyup (WM_SYSKEYUP).
    SysUp,
}

impl KeyAction {
    pub fn is_down(self) -> bool {
        matches!(self, KeyAction::Down | KeyAction::SysDown)
    }

    pub fn is_up(self) -> bool {
        matches!(self, KeyAction::Up | KeyAction::SysUp)
    }
}

/// One keyboard event as observed by the hook.
#[derive(Debug, Clone)]
pub struct KeyboardEvent {
    pub action: KeyAction,
    /// Virtual-key code.
    pub vk: u16,
    /// Hardware scan code.
    pub scan: u32,
    /// Millisecond timestamp from the OS (monotonic within a session).
    pub time_ms: u64,
    /// Event was synthesized by another program.
    pub injected: bool,
    /// Synthesized by a process at lower integrity level.
    pub lower_il_injected: bool,
    /// Extra-info pointer word attached by the sender.
    pub extra_info: usize,
    /// OS auto-repeat: keydown while the key was already down in the same
    /// origin domain. Annotated by the dispatcher before bind evaluation.
    pub is_repeat: bool,
}

impl KeyboardEvent {
    pub fn new(action: KeyAction, vk: u16, time_ms: u64) -> Self {
        Self {
            action,
            vk,
            scan: 0,
            time_ms,
            injected: false,
            lower_il_injected: false,
            extra_info: 0,
            is_repeat: false,
        }
    }

    pub fn injected(mut self) -> Self {
        self.injected = true;
        self
    }
}

/// Mouse button identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

impl std::str::FromStr for MouseButton {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "lmb" => Ok(MouseButton::Left),
            "right" | "rmb" => Ok(MouseButton::Right),
            "middle" | "mmb" => Ok(MouseButton::Middle),
            "x1" | "mouse4" => Ok(MouseButton::X1),
            "x2" | "mouse5" => Ok(MouseButton::X2),
            other => Err(crate::error::Error::UnknownMouseButton(other.to_string())),
        }
    }
}

/// Mouse hook action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Move,
    Wheel,
    HWheel,
    LeftDown,
    LeftUp,
    RightDown,
    RightUp,
    MiddleDown,
    MiddleUp,
    /// X-button down; which one is in `MouseEvent::data` (1 or 2).
    XDown,
    /// X-button up; which one is in `MouseEvent::data`.
    XUp,
}

/// One mouse event as observed by the hook.
#[derive(Debug, Clone)]
pub struct MouseEvent {
    pub action: MouseAction,
    /// Screen position at event time.
    pub position: (i32, i32),
    /// Auxiliary data word: X-button index for XDown/XUp, wheel delta for
    /// Wheel/HWheel.
    pub data: u32,
    pub time_ms: u64,
    pub injected: bool,
    pub lower_il_injected: bool,
    pub extra_info: usize,
}

impl MouseEvent {
    pub fn new(action: MouseAction, time_ms: u64) -> Self {
        Self {
            action,
            position: (0, 0),
            data: 0,
            time_ms,
            injected: false,
            lower_il_injected: false,
            extra_info: 0,
        }
    }

    pub fn with_data(mut self, data: u32) -> Self {
        self.data = data;
        self
    }

    pub fn injected(mut self) -> Self {
        self.injected = true;
        self
    }

    /// Resolve the button identity and edge for button events.
    /// X-buttons disambiguate through the auxiliary data word.
    pub fn button(&self) -> Option<(MouseButton, bool)> {
        match self.action {
            MouseAction::LeftDown => Some((MouseButton::Left, true)),
            MouseAction::LeftUp => Some((MouseButton::Left, false)),
            MouseAction::RightDown => Some((MouseButton::Right, true)),
            MouseAction::RightUp => Some((MouseButton::Right, false)),
            MouseAction::MiddleDown => Some((MouseButton::Middle, true)),
            MouseAction::MiddleUp => Some((MouseButton::Middle, false)),
            MouseAction::XDown | MouseAction::XUp => {
                let button = match self.data {
                    1 => MouseButton::X1,
                    2 => MouseButton::X2,
                    _ => return None,
                };
                Some((button, self.action == MouseAction::XDown))
            }
            MouseAction::Move | MouseAction::Wheel | MouseAction::HWheel => None,
        }
    }
}

/// Event reference handed to user predicates.
#[derive(Debug, Clone, Copy)]
pub enum HookEvent<'a> {
    Keyboard(&'a KeyboardEvent),
    Mouse(&'a MouseEvent),
}

/// Flag word returned to the hook chain. Values OR-combine across binds and
/// frontends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HookFlags(u8);

impl HookFlags {
    pub const CONTINUE: HookFlags = HookFlags(0);
    pub const UNHOOK: HookFlags = HookFlags(1);
    pub const STOP: HookFlags = HookFlags(2);
    /// Swallow the event: it never reaches the focused application.
    pub const DONT_PASS: HookFlags = HookFlags(4);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn suppresses(self) -> bool {
        self.0 & HookFlags::DONT_PASS.0 != 0
    }
}

impl BitOr for HookFlags {
    type Output = HookFlags;

    fn bitor(self, rhs: HookFlags) -> HookFlags {
        HookFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for HookFlags {
    fn bitor_assign(&mut self, rhs: HookFlags) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_or_combine() {
        let mut flags = HookFlags::CONTINUE;
        assert!(!flags.suppresses());
        flags |= HookFlags::DONT_PASS;
        flags |= HookFlags::STOP;
        assert!(flags.suppresses());
        assert_eq!(flags.bits(), 6);
    }

    #[test]
    fn xbutton_resolution_uses_aux_data() {
        let ev = MouseEvent::new(MouseAction::XDown, 0).with_data(1);
        assert_eq!(ev.button(), Some((MouseButton::X1, true)));
        let ev = MouseEvent::new(MouseAction::XUp, 0).with_data(2);
        assert_eq!(ev.button(), Some((MouseButton::X2, false)));
        let ev = MouseEvent::new(MouseAction::XDown, 0).with_data(7);
        assert_eq!(ev.button(), None);
    }

    #[test]
    fn moves_and_wheels_are_not_buttons() {
        assert_eq!(MouseEvent::new(MouseAction::Move, 0).button(), None);
        assert_eq!(MouseEvent::new(MouseAction::Wheel, 0).button(), None);
    }

    #[test]
    fn mouse_button_aliases() {
        assert_eq!("LMB".parse::<MouseButton>().unwrap(), MouseButton::Left);
        assert_eq!("mouse5".parse::<MouseButton>().unwrap(), MouseButton::X2);
        assert!("side".parse::<MouseButton>().is_err());
    }
}
