use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed command; the message carries the usage line.
    #[error("{message}")]
    Usage { message: String },

    #[error("\"{input}\" is not a user mention or id")]
    InvalidUser { input: String },

    #[error(transparent)]
    Sanctions(#[from] gatehouse_sanctions::Error),

    #[error(transparent)]
    Interviews(#[from] gatehouse_interviews::Error),

    #[error(transparent)]
    Gateway(#[from] gatehouse_channels::Error),
}

impl Error {
    #[must_use]
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for gatehouse_common::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Usage { message } => Self::validation(message),
            Error::InvalidUser { .. } => Self::validation(err.to_string()),
            Error::Sanctions(e) => e.into(),
            Error::Interviews(e) => e.into(),
            Error::Gateway(e) => e.into(),
        }
    }
}
