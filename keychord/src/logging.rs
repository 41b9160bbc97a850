//! Logging setup and diagnostics for swallowed user errors.
//!
//! Panics out of bind callbacks, async tasks, and frontends never propagate;
//! the workers and the hook thread must survive them. Every swallowed panic
//! is reported through [`report_swallowed_panic`], which always writes to the
//! log and, once [`log_diagnostics_to_file`] has been called, also appends a
//! timestamped line to a diagnostics file so crashes in fire-and-forget
//! callbacks leave a trace.

use std::any::Any;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{error, LevelFilter};

static DIAGNOSTICS_PATH: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Initialize env_logger with a default WARN level unless `RUST_LOG`
/// overrides it. Safe to call more than once.
pub fn init_logger() {
    let mut builder = env_logger::Builder::from_default_env();

    if std::env::var("RUST_LOG").is_err() {
        builder.filter_level(LevelFilter::Warn);
    }

    let _ = builder.try_init();
}

/// Additionally append swallowed-panic diagnostics to a file. With `None`
/// the file lives under the platform-local data dir
/// (`.../keychord/diagnostics.log`). Returns the path being written to.
pub fn log_diagnostics_to_file(dir: Option<&Path>) -> std::io::Result<PathBuf> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keychord"),
    };
    fs::create_dir_all(&dir)?;

    let path = dir.join("diagnostics.log");
    let mut path_guard = DIAGNOSTICS_PATH.lock().unwrap();
    *path_guard = Some(path.clone());
    Ok(path)
}

/// Stop writing the diagnostics file. Logging keeps going.
pub fn disable_diagnostics_file() {
    let mut path_guard = DIAGNOSTICS_PATH.lock().unwrap();
    *path_guard = None;
}

/// Report a panic caught on behalf of user code. `source` names the
/// execution context (worker, async task, frontend dispatch).
pub(crate) fn report_swallowed_panic(source: &str, payload: &(dyn Any + Send)) {
    let message = panic_payload_message(payload);
    error!("{source} panicked: {message}");

    let path_guard = DIAGNOSTICS_PATH.lock().unwrap();
    if let Some(path) = path_guard.as_ref() {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let thread = std::thread::current()
            .name()
            .unwrap_or("unnamed")
            .to_string();
        let line = format!("[{stamp}] {source} panicked: {message} (thread {thread})");
        if let Err(err) = append_line(path, &line) {
            error!("failed to write diagnostics file: {err}");
        }
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

fn panic_payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
