use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount overflow")]
    Overflow,

    #[error("Invalid split mode: {0}")]
    InvalidSplitMode(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
