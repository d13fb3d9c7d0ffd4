use {
    gatehouse_common::{ChannelId, UserId},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Gateway(#[from] gatehouse_channels::Error),

    #[error("channel {channel} is not an interview")]
    NotAnInterview { channel: ChannelId },

    #[error("channel {channel} is already being archived")]
    AlreadyArchiving { channel: ChannelId },

    #[error("{user} is not a member of this server")]
    NotAMember { user: UserId },

    #[error("archival worker has stopped")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for gatehouse_common::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::NotAnInterview { .. } => Self::not_found("This channel is not an interview."),
            Error::NotAMember { .. } => Self::not_found(err.to_string()),
            Error::AlreadyArchiving { .. } => {
                Self::validation("This channel is already being archived.")
            },
            Error::Gateway(e) => e.into(),
            Error::Sqlx(_) | Error::Migrate(_) | Error::QueueClosed => Self::internal(err),
        }
    }
}
