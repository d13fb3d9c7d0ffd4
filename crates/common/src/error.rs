use {thiserror::Error, tracing::error};

/// User-facing error taxonomy shared by every subsystem.
///
/// Crate-local errors convert into this type at the dispatcher boundary so
/// the reply sent back to the invoking user is always one of these shapes.
#[derive(Error, Debug)]
pub enum Error {
    /// No interview or pending action for the given key.
    #[error("{what}")]
    NotFound { what: String },

    /// The acting moderator lacks a capability (usually role hierarchy).
    #[error("missing capability: {capability}")]
    PermissionDenied { capability: String },

    /// A gateway call failed: the channel or member vanished, or the call was
    /// rate limited.
    #[error("{context}: {message}")]
    ExternalUnavailable { context: String, message: String },

    /// Bad input: unparsable duration, out-of-range index, oversized content.
    #[error("{message}")]
    Validation { message: String },

    #[error("internal error")]
    Internal {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    #[must_use]
    pub fn permission_denied(capability: impl Into<String>) -> Self {
        Self::PermissionDenied {
            capability: capability.into(),
        }
    }

    #[must_use]
    pub fn unavailable(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ExternalUnavailable {
            context: context.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal {
            source: Box::new(source),
        }
    }

    /// Render the text sent back to the user who invoked a command.
    ///
    /// Internal errors never leak their detail: a fresh correlation id is
    /// logged next to the full error and only the id is returned.
    pub fn user_reply(&self) -> String {
        match self {
            Self::NotFound { what } => what.clone(),
            Self::PermissionDenied { capability } => {
                format!("You can't do that: {capability}.")
            },
            Self::ExternalUnavailable { context, .. } => {
                format!("Discord didn't accept that request ({context}). Please try again.")
            },
            Self::Validation { message } => message.clone(),
            Self::Internal { source } => {
                let correlation_id = uuid::Uuid::new_v4();
                error!(%correlation_id, error = ?source, "internal error while handling command");
                format!("Something went wrong. Error id: `{correlation_id}`")
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
