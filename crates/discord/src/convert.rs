//! Conversions between gatehouse types and serenity models.

use {
    gatehouse_channels::{Access, Error, Overwrite, OverwriteTarget, Result},
    gatehouse_common::{ChannelId, MessageId, RoleId, UserId},
    serenity::{
        all::{
            ChannelId as DiscordChannelId, GuildId, MessageId as DiscordMessageId,
            PermissionOverwrite, PermissionOverwriteType, Permissions, ReactionType,
            RoleId as DiscordRoleId, UserId as DiscordUserId,
        },
        http::HttpError,
    },
};

/// Discord ids are non-zero; serenity panics on zero.
fn non_zero(kind: &str, id: u64) -> Result<u64> {
    if id == 0 {
        return Err(Error::invalid_input(format!("{kind} id must not be 0")));
    }
    Ok(id)
}

pub fn channel(id: ChannelId) -> Result<DiscordChannelId> {
    non_zero("channel", id.get()).map(DiscordChannelId::new)
}

pub fn message(id: MessageId) -> Result<DiscordMessageId> {
    non_zero("message", id.get()).map(DiscordMessageId::new)
}

pub fn user(id: UserId) -> Result<DiscordUserId> {
    non_zero("user", id.get()).map(DiscordUserId::new)
}

pub fn role(id: RoleId) -> Result<DiscordRoleId> {
    non_zero("role", id.get()).map(DiscordRoleId::new)
}

pub fn permissions(access: &[Access]) -> Permissions {
    access.iter().fold(Permissions::empty(), |acc, a| {
        acc | match a {
            Access::View => Permissions::VIEW_CHANNEL,
            Access::Send => Permissions::SEND_MESSAGES,
            Access::React => Permissions::ADD_REACTIONS,
            Access::ReadHistory => Permissions::READ_MESSAGE_HISTORY,
            Access::ManageMessages => Permissions::MANAGE_MESSAGES,
        }
    })
}

/// The default role shares the guild's id.
pub fn overwrite(guild: GuildId, overwrite: &Overwrite) -> Result<PermissionOverwrite> {
    let kind = match overwrite.target {
        OverwriteTarget::Member(id) => PermissionOverwriteType::Member(user(id)?),
        OverwriteTarget::Role(id) => PermissionOverwriteType::Role(role(id)?),
        OverwriteTarget::Everyone => PermissionOverwriteType::Role(DiscordRoleId::new(guild.get())),
    };
    Ok(PermissionOverwrite {
        allow: permissions(&overwrite.allow),
        deny: permissions(&overwrite.deny),
        kind,
    })
}

/// Unicode emoji or the `<:name:id>` custom emoji form.
pub fn reaction(emoji: &str) -> Result<ReactionType> {
    ReactionType::try_from(emoji)
        .map_err(|_| Error::invalid_input(format!("not an emoji: {emoji}")))
}

/// Classify a serenity failure: 404 means the target is gone; 429, 5xx and
/// connection failures are transient; any other refusal is permanent.
pub fn map_error(context: &str, err: serenity::Error) -> Error {
    match &err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            match response.status_code.as_u16() {
                404 => return Error::gone(format!("target of {context}")),
                429 | 500..=599 => {
                    return Error::unavailable(format!(
                        "{context}: {}",
                        response.error.message
                    ));
                },
                _ => {},
            }
        },
        serenity::Error::Http(HttpError::Request(e)) => {
            return Error::unavailable(format!("{context}: {e}"));
        },
        serenity::Error::Io(e) => return Error::unavailable(format!("{context}: {e}")),
        _ => {},
    }
    Error::external(context, err)
}
