//! Windows low-level hook glue.
//!
//! Hooks and the message pump MUST live on the same thread; the backend
//! spawns [`run_hook_thread`] once and keeps it pumping until the last
//! frontend goes away. Hook callbacks stay minimal: decode the OS record,
//! hand it to the backend, translate the verdict.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::SyncSender;

use log::{debug, error};
use winapi::shared::minwindef::{HINSTANCE, HIWORD, LPARAM, LRESULT, WPARAM};
use winapi::shared::windef::HHOOK;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::processthreadsapi::GetCurrentThreadId;
use winapi::um::winuser::{
    CallNextHookEx, GetMessageW, PostThreadMessageW, SetWindowsHookExW, UnhookWindowsHookEx,
    HC_ACTION, KBDLLHOOKSTRUCT, LLKHF_INJECTED, LLMHF_INJECTED, MSG, MSLLHOOKSTRUCT,
    WH_KEYBOARD_LL, WH_MOUSE_LL, WM_KEYDOWN, WM_KEYUP, WM_LBUTTONDOWN, WM_LBUTTONUP,
    WM_MBUTTONDOWN, WM_MBUTTONUP, WM_QUIT, WM_RBUTTONDOWN, WM_RBUTTONUP, WM_SYSKEYDOWN,
    WM_SYSKEYUP, WM_XBUTTONDOWN, WM_XBUTTONUP,
};

use crate::backend;
use crate::error::{Error, Result};
use crate::events::{HookFlags, KeyAction, KeyboardEvent, MouseAction, MouseEvent};

// Lower-integrity-level injection markers (hook-struct `flags` bits).
const KB_LOWER_IL_INJECTED: u32 = 0x0000_0002;
const MS_LOWER_IL_INJECTED: u32 = 0x0000_0002;

static KEYBOARD_HOOK: AtomicUsize = AtomicUsize::new(0);
static MOUSE_HOOK: AtomicUsize = AtomicUsize::new(0);

/// Install both hooks, report readiness (or the install error) through
/// `ready`, then pump messages until WM_QUIT. Runs on its own thread.
pub(crate) fn run_hook_thread(ready: SyncSender<Result<u32>>) {
    unsafe {
        let keyboard = SetWindowsHookExW(
            WH_KEYBOARD_LL,
            Some(keyboard_hook_proc),
            std::ptr::null_mut() as HINSTANCE,
            0,
        );
        if keyboard.is_null() {
            let _ = ready.send(Err(Error::HookInstall {
                kind: "keyboard",
                code: GetLastError(),
            }));
            return;
        }

        let mouse = SetWindowsHookExW(
            WH_MOUSE_LL,
            Some(mouse_hook_proc),
            std::ptr::null_mut() as HINSTANCE,
            0,
        );
        if mouse.is_null() {
            let code = GetLastError();
            UnhookWindowsHookEx(keyboard);
            let _ = ready.send(Err(Error::HookInstall {
                kind: "mouse",
                code,
            }));
            return;
        }

        KEYBOARD_HOOK.store(keyboard as usize, Ordering::SeqCst);
        MOUSE_HOOK.store(mouse as usize, Ordering::SeqCst);
        let _ = ready.send(Ok(GetCurrentThreadId()));

        debug!("input hooks installed, pumping messages");
        let mut msg: MSG = std::mem::zeroed();
        loop {
            let ret = GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0);
            if ret > 0 {
                continue;
            } else if ret == 0 {
                // WM_QUIT
                break;
            } else {
                error!("GetMessageW failed: {}", GetLastError());
                break;
            }
        }

        uninstall_hooks();
        debug!("hook thread exited cleanly");
    }
}

/// Ask the pump thread to exit.
pub(crate) fn post_quit(thread_id: u32) {
    unsafe {
        PostThreadMessageW(thread_id, WM_QUIT, 0, 0);
    }
}

unsafe fn uninstall_hooks() {
    let keyboard = KEYBOARD_HOOK.swap(0, Ordering::SeqCst);
    if keyboard != 0 {
        UnhookWindowsHookEx(keyboard as HHOOK);
    }
    let mouse = MOUSE_HOOK.swap(0, Ordering::SeqCst);
    if mouse != 0 {
        UnhookWindowsHookEx(mouse as HHOOK);
    }
}

/// Apply the OR-reduced verdict: maybe unhook, maybe stop the pump, and
/// decide whether the event continues down the hook chain.
unsafe fn finish(flags: HookFlags, code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if flags.bits() & HookFlags::UNHOOK.bits() != 0 {
        uninstall_hooks();
    }
    if flags.bits() & HookFlags::STOP.bits() != 0 {
        PostThreadMessageW(GetCurrentThreadId(), WM_QUIT, 0, 0);
    }
    if flags.suppresses() {
        // Non-zero swallows the event before the focused application.
        return 1;
    }
    CallNextHookEx(std::ptr::null_mut(), code, wparam, lparam)
}

unsafe extern "system" fn keyboard_hook_proc(
    code: i32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if code == HC_ACTION as i32 {
        let record = &*(lparam as *const KBDLLHOOKSTRUCT);
        let action = match wparam as u32 {
            WM_KEYDOWN => Some(KeyAction::Down),
            WM_KEYUP => Some(KeyAction::Up),
            WM_SYSKEYDOWN => Some(KeyAction::SysDown),
            WM_SYSKEYUP => Some(KeyAction::SysUp),
            _ => None,
        };

        if let Some(action) = action {
            let mut event = KeyboardEvent {
                action,
                vk: record.vkCode as u16,
                scan: record.scanCode,
                time_ms: record.time as u64,
                injected: record.flags & LLKHF_INJECTED != 0,
                lower_il_injected: record.flags & KB_LOWER_IL_INJECTED != 0,
                extra_info: record.dwExtraInfo,
                is_repeat: false,
            };
            let flags = backend::instance().on_keyboard(&mut event);
            return finish(flags, code, wparam, lparam);
        }
    }

    CallNextHookEx(std::ptr::null_mut(), code, wparam, lparam)
}

unsafe extern "system" fn mouse_hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let record = &*(lparam as *const MSLLHOOKSTRUCT);
        // Buttons only; moves and wheels stay on the fast path.
        let action = match wparam as u32 {
            WM_LBUTTONDOWN => Some(MouseAction::LeftDown),
            WM_LBUTTONUP => Some(MouseAction::LeftUp),
            WM_RBUTTONDOWN => Some(MouseAction::RightDown),
            WM_RBUTTONUP => Some(MouseAction::RightUp),
            WM_MBUTTONDOWN => Some(MouseAction::MiddleDown),
            WM_MBUTTONUP => Some(MouseAction::MiddleUp),
            WM_XBUTTONDOWN => Some(MouseAction::XDown),
            WM_XBUTTONUP => Some(MouseAction::XUp),
            _ => None,
        };

        if let Some(action) = action {
            let data = match action {
                // Which X-button lives in the high word of mouseData.
                MouseAction::XDown | MouseAction::XUp => HIWORD(record.mouseData) as u32,
                _ => 0,
            };
            let event = MouseEvent {
                action,
                position: (record.pt.x, record.pt.y),
                data,
                time_ms: record.time as u64,
                injected: record.flags & LLMHF_INJECTED != 0,
                lower_il_injected: record.flags & MS_LOWER_IL_INJECTED != 0,
                extra_info: record.dwExtraInfo,
            };
            let flags = backend::instance().on_mouse(&event);
            return finish(flags, code, wparam, lparam);
        }
    }

    CallNextHookEx(std::ptr::null_mut(), code, wparam, lparam)
}
