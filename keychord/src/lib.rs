//! Global keyboard and mouse binds on top of the Windows low-level input
//! hooks.
//!
//! A [`Hook`] owns a set of binds. Every physical or injected input event in
//! the session runs through each bind's state machine, which decides whether
//! to fire the user callback (on a worker pool, never on the hook thread)
//! and whether to swallow the event before the focused application sees it.
//!
//! ```no_run
//! use keychord::{presets, Hook, SuppressPolicy, BindConfig};
//!
//! let hook = Hook::new()?;
//! hook.bind("ctrl+e", || println!("ctrl+e"))?;
//! hook.bind_with(
//!     "ctrl+r",
//!     BindConfig {
//!         suppress: SuppressPolicy::WhenMatched,
//!         ..BindConfig::default()
//!     },
//!     || println!("ctrl+r, swallowed"),
//! )?;
//! hook.bind_with("g,k,i", presets::sequence(550), || println!("g k i"))?;
//! hook.wait(None);
//! # Ok::<(), keychord::Error>(())
//! ```
//!
//! The evaluation core is platform-independent; only installing the hooks
//! requires Windows. [`Hook::new`] returns [`Error::PlatformUnsupported`]
//! elsewhere.

pub mod async_exec;
mod backend;
pub mod bind;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod keycodes;
pub mod logging;
pub mod parse;
#[cfg(windows)]
mod platform;
pub mod presets;
pub mod state;
pub mod window;

mod hook;

pub use bind::{BlockingTask, DrivableTask, IntoBindTask, KeyBind, MouseBind};
pub use config::{
    BindConfig, Checks, ChordPolicy, Constraints, FocusPolicy, InjectedPolicy, OrderPolicy,
    Predicate, SuppressPolicy, Timing, Trigger,
};
pub use error::{Error, Result};
pub use events::{HookEvent, HookFlags, KeyAction, KeyboardEvent, MouseAction, MouseButton, MouseEvent};
pub use hook::{Hook, HookOptions};
pub use keycodes::{is_modifier_vk, register_key_token, vk, vk_to_key_name};
pub use parse::{parse_chord, parse_key_expr, ChordSpec, KeyExpr};
pub use state::StateView;
pub use window::WindowTarget;
