use thiserror::Error;

/// Core error type shared across datadam crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration, unknown backend kind or bad weight vector.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Introspection failed or the table cannot be used.
    #[error("schema error: {0}")]
    Schema(String),
    /// The generator could not build a payload.
    #[error("generation error: {0}")]
    Generation(String),
    /// A column type the value synthesizer does not know.
    #[error("unsupported column type: {0}")]
    UnsupportedType(String),
    /// Every column of the table is a key or unique column.
    #[error("no eligible column to update in {0}")]
    NoEligibleColumn(String),
    /// No cached table can receive generated rows.
    #[error("no table available for generation in schemas {0:?}")]
    NoTables(Vec<String>),
    /// A statement failed while a lane applied its batch.
    #[error("execution error: {0}")]
    Execution(String),
    /// Database error or adapter failure.
    #[error("database error: {0}")]
    Db(String),
}

/// Convenience alias for results returned by datadam crates.
pub type Result<T> = std::result::Result<T, Error>;
