//! Virtual-key constants, display names, and the token tables behind the
//! key-expression parser.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use once_cell::sync::Lazy;

/// Windows Virtual Key constants used throughout the project.
pub mod vk {
    pub const A: u16 = 0x41;
    pub const Z: u16 = 0x5A;
    pub const KEY_0: u16 = 0x30;
    pub const KEY_9: u16 = 0x39;

    pub const F1: u16 = 0x70;
    pub const F24: u16 = 0x87;

    pub const SPACE: u16 = 0x20;
    pub const RETURN: u16 = 0x0D;
    pub const ESCAPE: u16 = 0x1B;
    pub const TAB: u16 = 0x09;
    pub const BACK: u16 = 0x08;
    pub const DELETE: u16 = 0x2E;
    pub const INSERT: u16 = 0x2D;
    pub const HOME: u16 = 0x24;
    pub const END: u16 = 0x23;
    pub const PRIOR: u16 = 0x21;
    pub const NEXT: u16 = 0x22;

    pub const UP: u16 = 0x26;
    pub const DOWN: u16 = 0x28;
    pub const LEFT: u16 = 0x25;
    pub const RIGHT: u16 = 0x27;

    pub const VOLUME_MUTE: u16 = 0xAD;
    pub const VOLUME_DOWN: u16 = 0xAE;
    pub const VOLUME_UP: u16 = 0xAF;

    pub const SHIFT: u16 = 0x10;
    pub const LSHIFT: u16 = 0xA0;
    pub const RSHIFT: u16 = 0xA1;
    pub const CONTROL: u16 = 0x11;
    pub const LCONTROL: u16 = 0xA2;
    pub const RCONTROL: u16 = 0xA3;
    pub const MENU: u16 = 0x12;
    pub const LMENU: u16 = 0xA4;
    pub const RMENU: u16 = 0xA5;
    pub const LWIN: u16 = 0x5B;
    pub const RWIN: u16 = 0x5C;

    pub const OEM_1: u16 = 0xBA; // ;:
    pub const OEM_PLUS: u16 = 0xBB; // =+
    pub const OEM_COMMA: u16 = 0xBC; // ,<
    pub const OEM_MINUS: u16 = 0xBD; // -_
    pub const OEM_PERIOD: u16 = 0xBE; // .>
    pub const OEM_2: u16 = 0xBF; // /?
    pub const OEM_3: u16 = 0xC0; // `~
    pub const OEM_4: u16 = 0xDB; // [{
    pub const OEM_5: u16 = 0xDC; // \|
    pub const OEM_6: u16 = 0xDD; // ]}
    pub const OEM_7: u16 = 0xDE; // '"
}

/// True for any modifier VK, generic or sided.
pub fn is_modifier_vk(code: u16) -> bool {
    matches!(
        code,
        vk::SHIFT
            | vk::LSHIFT
            | vk::RSHIFT
            | vk::CONTROL
            | vk::LCONTROL
            | vk::RCONTROL
            | vk::MENU
            | vk::LMENU
            | vk::RMENU
            | vk::LWIN
            | vk::RWIN
    )
}

/// Modifier alias -> interchangeable VK group. Order of entries matches the
/// order tokens are tried during parsing.
pub(crate) fn modifier_group(token: &str) -> Option<BTreeSet<u16>> {
    let group: &[u16] = match token {
        "shift" => &[vk::SHIFT, vk::LSHIFT, vk::RSHIFT],
        "ctrl" | "control" => &[vk::CONTROL, vk::LCONTROL, vk::RCONTROL],
        "alt" | "menu" => &[vk::MENU, vk::LMENU, vk::RMENU],
        "win" => &[vk::LWIN, vk::RWIN],
        "lwin" => &[vk::LWIN],
        "rwin" => &[vk::RWIN],
        _ => return None,
    };
    Some(group.iter().copied().collect())
}

fn builtin_special_key(token: &str) -> Option<u16> {
    let code = match token {
        "esc" | "escape" => vk::ESCAPE,
        "enter" | "return" => vk::RETURN,
        "tab" => vk::TAB,
        "space" => vk::SPACE,
        "backspace" => vk::BACK,
        "delete" | "del" => vk::DELETE,
        "insert" => vk::INSERT,
        "home" => vk::HOME,
        "end" => vk::END,
        "pgup" | "pageup" => vk::PRIOR,
        "pgdn" | "pagedown" => vk::NEXT,
        "up" => vk::UP,
        "down" => vk::DOWN,
        "left" => vk::LEFT,
        "right" => vk::RIGHT,
        "volumeup" => vk::VOLUME_UP,
        "volumedown" => vk::VOLUME_DOWN,
        "mute" => vk::VOLUME_MUTE,
        "`" | "backtick" | "grave" | "tilde" => vk::OEM_3,
        "-" => vk::OEM_MINUS,
        "=" => vk::OEM_PLUS,
        "[" => vk::OEM_4,
        "]" => vk::OEM_6,
        "\\" => vk::OEM_5,
        ";" => vk::OEM_1,
        "'" => vk::OEM_7,
        "." => vk::OEM_PERIOD,
        "/" => vk::OEM_2,
        _ => {
            // f1..f24
            let rest = token.strip_prefix('f')?;
            let n: u16 = rest.parse().ok()?;
            if (1..=24).contains(&n) {
                return Some(vk::F1 + (n - 1));
            }
            return None;
        }
    };
    Some(code)
}

// Runtime-registered tokens take precedence over the builtin table so a
// caller can redefine a name for an exotic layout.
static CUSTOM_TOKENS: Lazy<RwLock<HashMap<String, u16>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a custom key token usable in bind expressions.
///
/// Call before parsing; names are matched case-insensitively.
pub fn register_key_token(name: &str, code: u16) {
    let mut table = CUSTOM_TOKENS.write().unwrap();
    table.insert(name.trim().to_ascii_lowercase(), code);
}

pub(crate) fn special_key(token: &str) -> Option<u16> {
    {
        let table = CUSTOM_TOKENS.read().unwrap();
        if let Some(code) = table.get(token) {
            return Some(*code);
        }
    }
    builtin_special_key(token)
}

/// Convert a VK code to a display name for logs and canonical expressions.
pub fn vk_to_key_name(code: u16) -> String {
    match code {
        vk::A..=vk::Z => char::from(b'a' + (code - vk::A) as u8).to_string(),
        vk::KEY_0..=vk::KEY_9 => char::from(b'0' + (code - vk::KEY_0) as u8).to_string(),
        vk::F1..=vk::F24 => format!("f{}", code - vk::F1 + 1),
        vk::SHIFT => "shift".into(),
        vk::LSHIFT => "lshift".into(),
        vk::RSHIFT => "rshift".into(),
        vk::CONTROL => "ctrl".into(),
        vk::LCONTROL => "lctrl".into(),
        vk::RCONTROL => "rctrl".into(),
        vk::MENU => "alt".into(),
        vk::LMENU => "lalt".into(),
        vk::RMENU => "ralt".into(),
        vk::LWIN => "lwin".into(),
        vk::RWIN => "rwin".into(),
        vk::SPACE => "space".into(),
        vk::RETURN => "enter".into(),
        vk::ESCAPE => "esc".into(),
        vk::TAB => "tab".into(),
        vk::BACK => "backspace".into(),
        vk::DELETE => "delete".into(),
        vk::INSERT => "insert".into(),
        vk::HOME => "home".into(),
        vk::END => "end".into(),
        vk::PRIOR => "pgup".into(),
        vk::NEXT => "pgdn".into(),
        vk::UP => "up".into(),
        vk::DOWN => "down".into(),
        vk::LEFT => "left".into(),
        vk::RIGHT => "right".into(),
        vk::VOLUME_UP => "volumeup".into(),
        vk::VOLUME_DOWN => "volumedown".into(),
        vk::VOLUME_MUTE => "mute".into(),
        vk::OEM_1 => ";".into(),
        vk::OEM_PLUS => "=".into(),
        vk::OEM_COMMA => "oem_comma".into(),
        vk::OEM_MINUS => "-".into(),
        vk::OEM_PERIOD => ".".into(),
        vk::OEM_2 => "/".into(),
        vk::OEM_3 => "`".into(),
        vk::OEM_4 => "[".into(),
        vk::OEM_5 => "\\".into(),
        vk::OEM_6 => "]".into(),
        vk::OEM_7 => "'".into(),
        other => format!("vk{:#04x}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_groups_cover_both_sides() {
        let shift = modifier_group("shift").expect("group expected");
        assert!(shift.contains(&vk::SHIFT));
        assert!(shift.contains(&vk::LSHIFT));
        assert!(shift.contains(&vk::RSHIFT));
        assert!(modifier_group("q").is_none());
    }

    #[test]
    fn function_keys_resolve() {
        assert_eq!(special_key("f1"), Some(vk::F1));
        assert_eq!(special_key("f24"), Some(vk::F24));
        assert_eq!(special_key("f25"), None);
        assert_eq!(special_key("f0"), None);
    }

    #[test]
    fn custom_tokens_override_builtins() {
        register_key_token("Copilot", 0xE8);
        assert_eq!(special_key("copilot"), Some(0xE8));
        register_key_token("esc", 0x1B);
        assert_eq!(special_key("esc"), Some(vk::ESCAPE));
    }

    #[test]
    fn names_round_trip_through_the_parser_tables() {
        for code in [vk::F1 + 6, vk::SPACE, vk::RETURN, vk::OEM_3, vk::UP] {
            let name = vk_to_key_name(code);
            assert_eq!(special_key(&name), Some(code), "name {:?}", name);
        }
    }

    #[test]
    fn modifier_detection() {
        assert!(is_modifier_vk(vk::LSHIFT));
        assert!(is_modifier_vk(vk::CONTROL));
        assert!(is_modifier_vk(vk::RWIN));
        assert!(!is_modifier_vk(vk::A));
        assert!(!is_modifier_vk(vk::F1));
    }
}
