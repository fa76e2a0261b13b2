use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EntryError {
    #[error("invalid configuration: penalty divisor must be a positive number, got {0}")]
    InvalidConfiguration(f64),

    #[error("student not found: {0}")]
    UnknownStudent(String),

    #[error("subject not found: {0}")]
    UnknownSubject(String),
}

impl EntryError {
    /// Wire error code used by the IPC layer.
    pub fn code(&self) -> &'static str {
        match self {
            EntryError::InvalidConfiguration(_) => "invalid_configuration",
            EntryError::UnknownStudent(_) | EntryError::UnknownSubject(_) => "not_found",
        }
    }
}
