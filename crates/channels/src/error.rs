use std::error::Error as StdError;

/// Crate-wide result type for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed gateway errors.
///
/// Only `Unavailable` is worth a retry. `Gone` means the target vanished and
/// callers in the archival and sweep paths abort the stages that need it;
/// `External` and `InvalidInput` are refusals that will repeat.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid gateway input: {message}")]
    InvalidInput { message: String },

    /// The channel, member or message no longer exists.
    #[error("{what} no longer exists")]
    Gone { what: String },

    /// Rate limited or otherwise temporarily refused.
    #[error("gateway unavailable: {message}")]
    Unavailable { message: String },

    /// The platform refused the call (missing permission, managed role).
    /// Wraps the client's error.
    #[error("gateway call failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn gone(what: impl std::fmt::Display) -> Self {
        Self::Gone {
            what: what.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Gone { .. })
    }

    /// Worth one retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<Error> for gatehouse_common::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput { message } => Self::validation(message),
            Error::Gone { ref what } => Self::unavailable(what.clone(), &err),
            Error::Unavailable { .. } => Self::unavailable("rate limited", err),
            Error::External { ref context, .. } => Self::unavailable(context.clone(), &err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(Error::gone("channel 1").is_gone());
        assert!(!Error::gone("channel 1").is_transient());
        assert!(Error::unavailable("429").is_transient());
        assert!(!Error::external("send", std::io::Error::other("403")).is_transient());
        assert!(!Error::external("send", std::io::Error::other("403")).is_gone());
        assert!(!Error::invalid_input("empty").is_transient());
    }

    #[test]
    fn converts_into_taxonomy() {
        let err: gatehouse_common::Error = Error::gone("member 5").into();
        assert!(matches!(
            err,
            gatehouse_common::Error::ExternalUnavailable { ref context, .. } if context == "member 5"
        ));
        let err: gatehouse_common::Error = Error::invalid_input("too long").into();
        assert!(matches!(err, gatehouse_common::Error::Validation { .. }));
    }
}
