use thiserror::Error;

/// フォークの使い方を誤った場合のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForkError {
    #[error("fork {fork} released by philosopher {by} but nobody holds it")]
    NotHeld { fork: usize, by: usize },

    #[error("fork {fork} released by philosopher {by} but it is held by {owner}")]
    NotOwner { fork: usize, by: usize, owner: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("at least 2 philosophers are needed, got {0}")]
    TooFewPhilosophers(usize),

    #[error("invalid {name} range: {min}ms..{max}ms")]
    InvertedRange { name: &'static str, min: u64, max: u64 },

    #[error("cannot parse range {0:?}, expected MIN..MAX in milliseconds")]
    BadRange(String),

    #[error("unknown policy {0:?} (left-first, last-reversed, alternating, backoff)")]
    UnknownPolicy(String),
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("philosopher {index} panicked")]
    Panicked { index: usize },

    #[error(transparent)]
    Fork(#[from] ForkError),

    #[error("failed to spawn philosopher thread: {0}")]
    Spawn(#[from] std::io::Error),
}
