#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A required option is absent or blank.
    #[error("{0} undefined")]
    Undefined(String),

    #[error("Invalid option {key}: {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("Unknown DB type: {0}")]
    UnknownDbType(String),

    /// Command-line flags could not be parsed (includes `--help`).
    #[error(transparent)]
    Cli(#[from] clap::Error),
}
