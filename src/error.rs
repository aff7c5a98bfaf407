use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tmux error: {0}")]
    Tmux(String),

    #[error(
        "tmux is not installed or not on PATH. Install it first \
         (macOS: `brew install tmux`, Debian/Ubuntu: `apt install tmux`)"
    )]
    HostUnavailable,

    #[error("Invalid worker slot {slot} (expected 1..={max})")]
    InvalidSlot { slot: u8, max: u8 },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

pub type Result<T> = std::result::Result<T, Error>;
