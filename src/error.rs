use thiserror::Error;

/// Errors raised while validating inputs, building models or reading them back.
#[derive(Debug, Error)]
pub enum Error {
    /// The learner was handed data or hyperparameters it cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Decision table paths are encoded in a `u64`, so depths beyond 63 cannot be represented.
    #[error("decision table depth {depth} exceeds the supported maximum of {max}")]
    DepthTooLarge { depth: usize, max: usize },

    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
