use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The governing token fired while waiting on a lane or the barrier.
    #[error("dispatcher cancelled")]
    Cancelled,
    #[error("lane {0} is closed")]
    LaneClosed(usize),
    #[error("invalid dispatcher configuration: {0}")]
    Config(String),
    /// A DDL statement failed on the DDL lane.
    #[error(transparent)]
    Backend(#[from] datadam_core::Error),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
