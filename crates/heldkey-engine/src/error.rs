use std::result::Result as StdResult;

use thiserror::Error;

/// Convenient result type for the engine crate.
pub type Result<T> = StdResult<T, Error>;

/// Unified error type for the heldkey engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine's dispatcher has already been started once.
    #[error("engine already started")]
    AlreadyStarted,

    /// A registry operation referenced a hotkey id that was never defined.
    #[error("unknown hotkey id: {0}")]
    UnknownHotkey(String),

    /// The hook-to-dispatcher event queue is full.
    #[error("event queue full")]
    QueueFull,

    /// The dispatcher side of the event queue has gone away.
    #[error("event queue closed")]
    QueueClosed,

    /// Generic error with context.
    #[error("engine error: {0}")]
    Msg(String),
}
