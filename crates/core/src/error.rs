#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid command input: {0}")]
    InvalidCommand(String),

    #[error("Unexpected data format: {0}")]
    DataFormat(String),
}
