use pdx_exchange::ExchangeError;
use pdx_store::Checkpoint;
use pdx_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid identifier: {0}")]
    Types(#[from] TypeError),

    /// The change feed failed. Resubscribe from `checkpoint`.
    #[error("feed disconnected at {checkpoint}: {reason}")]
    FeedDisconnected { checkpoint: Checkpoint, reason: String },

    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),
}

impl RuntimeError {
    /// The checkpoint to resume from, if this error ends a feed session.
    pub fn resume_checkpoint(&self) -> Option<Checkpoint> {
        match self {
            Self::FeedDisconnected { checkpoint, .. } => Some(*checkpoint),
            _ => None,
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
