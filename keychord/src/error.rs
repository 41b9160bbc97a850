use thiserror::Error;

/// Errors surfaced by the public API.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown key token: {0:?}")]
    UnknownToken(String),
    #[error("Empty chord")]
    EmptyChord,
    #[error("Empty key expression")]
    EmptyExpression,
    #[error("Unknown mouse button: {0:?}")]
    UnknownMouseButton(String),
    #[error("Global input hooks require Windows")]
    PlatformUnsupported,
    #[error("Failed to install {kind} hook (os error {code})")]
    HookInstall { kind: &'static str, code: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
