//! Window focus targets for window-scoped binds.

use std::fmt;
use std::sync::Arc;

type FocusProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// A window a bind is scoped to. Evaluation is skipped while the window is
/// not the foreground window.
#[derive(Clone)]
pub struct WindowTarget {
    hwnd: isize,
    probe: Option<FocusProbe>,
}

impl WindowTarget {
    /// Target a native window handle.
    pub fn from_hwnd(hwnd: isize) -> Self {
        Self { hwnd, probe: None }
    }

    /// Target with a caller-supplied focus probe. Used by tests and by hosts
    /// that track focus themselves.
    pub fn with_probe(probe: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            hwnd: 0,
            probe: Some(Arc::new(probe)),
        }
    }

    pub fn hwnd(&self) -> isize {
        self.hwnd
    }

    /// True while the target is the current foreground window. A destroyed
    /// window is never focused.
    pub fn is_focused(&self) -> bool {
        if let Some(probe) = &self.probe {
            return probe();
        }
        os_is_focused(self.hwnd)
    }
}

impl fmt::Debug for WindowTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.probe.is_some() {
            write!(f, "WindowTarget(probe)")
        } else {
            write!(f, "WindowTarget(hwnd=0x{:08X})", self.hwnd)
        }
    }
}

#[cfg(windows)]
fn os_is_focused(hwnd: isize) -> bool {
    use winapi::shared::windef::HWND;
    use winapi::um::winuser::{GetForegroundWindow, IsWindow};

    if hwnd == 0 {
        return false;
    }
    unsafe {
        let handle = hwnd as HWND;
        if IsWindow(handle) == 0 {
            return false;
        }
        GetForegroundWindow() == handle
    }
}

#[cfg(not(windows))]
fn os_is_focused(_hwnd: isize) -> bool {
    false
}
