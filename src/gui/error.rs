use std::{error::Error, fmt::Display, io};

/// Raised when the terminal cannot be set up, drawn to, or restored.
#[derive(Debug)]
pub enum GuiError {
    /// The underlying terminal io failed.
    IoError(io::Error),
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuiError::IoError(error) => write!(f, "terminal io error: {}", error),
        }
    }
}

impl Error for GuiError {}

impl From<io::Error> for GuiError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}
