use {gatehouse_common::UserId, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Gateway(#[from] gatehouse_channels::Error),

    #[error("invalid duration \"{input}\": {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("{applicant} is already muted")]
    AlreadyActive { applicant: UserId },

    #[error("pending action not found: {action_id}")]
    ActionNotFound { action_id: String },

    #[error("{applicant} is not muted")]
    NotMuted { applicant: UserId },

    #[error("{applicant} is not a member of this server")]
    NotAMember { applicant: UserId },

    #[error("no mod log entries on page {page}")]
    PageOutOfRange { page: usize },

    /// Role hierarchy forbids the action.
    #[error("missing capability: {capability}")]
    Hierarchy { capability: String },

    /// A stored row names a kind or action this build does not know.
    #[error("unknown {what}: {value}")]
    UnknownName { what: &'static str, value: String },
}

impl Error {
    #[must_use]
    pub fn unknown_name(what: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownName {
            what,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn invalid_duration(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            input: input.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn action_not_found(action_id: impl Into<String>) -> Self {
        Self::ActionNotFound {
            action_id: action_id.into(),
        }
    }

    #[must_use]
    pub fn hierarchy(capability: impl Into<String>) -> Self {
        Self::Hierarchy {
            capability: capability.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for gatehouse_common::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidDuration { .. } | Error::AlreadyActive { .. } => {
                Self::validation(err.to_string())
            },
            Error::ActionNotFound { .. }
            | Error::NotMuted { .. }
            | Error::NotAMember { .. }
            | Error::PageOutOfRange { .. } => Self::not_found(err.to_string()),
            Error::Hierarchy { capability } => Self::permission_denied(capability),
            Error::Gateway(e) => e.into(),
            Error::Json(_) | Error::Sqlx(_) | Error::Migrate(_) | Error::UnknownName { .. } => {
                Self::internal(err)
            },
        }
    }
}
