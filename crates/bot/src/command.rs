//! Chat command grammar.
//!
//! A command is a message starting with one of the configured prefixes or
//! with a mention of the bot, followed by the command words:
//!
//! ```text
//! interview create <user>
//! interview approve | deny | manual-archive
//! mute <user> <duration> [reason]
//! hardmute <user> <duration> [reason]
//! unmute <user> [reason]
//! warn <user> <reason>
//! modlogs <user> [page]
//! ```

use std::time::Duration;

use {
    gatehouse_common::UserId,
    gatehouse_sanctions::parse::parse_duration,
};

use crate::{Error, Result};

/// Recorded when a moderator gives no reason.
pub const DEFAULT_REASON: &str = "No reason given";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    InterviewCreate {
        applicant: UserId,
    },
    InterviewApprove,
    InterviewDeny,
    InterviewManualArchive,
    Mute {
        target: UserId,
        duration: Duration,
        reason: String,
    },
    Hardmute {
        target: UserId,
        duration: Duration,
        reason: String,
    },
    Unmute {
        target: UserId,
        reason: String,
    },
    Warn {
        target: UserId,
        reason: String,
    },
    ModLogs {
        target: UserId,
        page: usize,
    },
}

impl Command {
    /// Whether the command belongs to the interview subsystem.
    #[must_use]
    pub fn is_interview(&self) -> bool {
        matches!(
            self,
            Self::InterviewCreate { .. }
                | Self::InterviewApprove
                | Self::InterviewDeny
                | Self::InterviewManualArchive
        )
    }

    /// Name for log fields.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InterviewCreate { .. } => "interview create",
            Self::InterviewApprove => "interview approve",
            Self::InterviewDeny => "interview deny",
            Self::InterviewManualArchive => "interview manual-archive",
            Self::Mute { .. } => "mute",
            Self::Hardmute { .. } => "hardmute",
            Self::Unmute { .. } => "unmute",
            Self::Warn { .. } => "warn",
            Self::ModLogs { .. } => "modlogs",
        }
    }
}

/// Parse `content` as a command.
///
/// `Ok(None)` when the message is not addressed to the bot or names an
/// unknown command; an error when a known command is malformed.
pub fn parse_command(content: &str, prefixes: &[String], bot: UserId) -> Result<Option<Command>> {
    let Some(body) = strip_prefix(content, prefixes, bot) else {
        return Ok(None);
    };
    let (name, rest) = next_word(body);

    let command = match name.to_lowercase().as_str() {
        "interview" => parse_interview(rest)?,
        "mute" => {
            let (target, duration, reason) = sanction_args(rest, "mute")?;
            Command::Mute {
                target,
                duration,
                reason,
            }
        },
        "hardmute" => {
            let (target, duration, reason) = sanction_args(rest, "hardmute")?;
            Command::Hardmute {
                target,
                duration,
                reason,
            }
        },
        "unmute" => {
            let (user, reason) = next_word(rest);
            Command::Unmute {
                target: required_user(user, "unmute <user> [reason]")?,
                reason: reason_or_default(reason),
            }
        },
        "warn" => {
            let (user, reason) = next_word(rest);
            let target = required_user(user, "warn <user> <reason>")?;
            if reason.is_empty() {
                return Err(Error::usage("Usage: warn <user> <reason>"));
            }
            Command::Warn {
                target,
                reason: reason.to_string(),
            }
        },
        "modlogs" => {
            let (user, rest) = next_word(rest);
            let target = required_user(user, "modlogs <user> [page]")?;
            let (page, _) = next_word(rest);
            let page = if page.is_empty() {
                1
            } else {
                page.parse()
                    .map_err(|_| Error::usage("Usage: modlogs <user> [page]"))?
            };
            Command::ModLogs { target, page }
        },
        _ => return Ok(None),
    };
    Ok(Some(command))
}

fn parse_interview(rest: &str) -> Result<Command> {
    let (action, rest) = next_word(rest);
    match action.to_lowercase().as_str() {
        "create" => {
            let (user, _) = next_word(rest);
            Ok(Command::InterviewCreate {
                applicant: required_user(user, "interview create <user>")?,
            })
        },
        "approve" => Ok(Command::InterviewApprove),
        "deny" => Ok(Command::InterviewDeny),
        "manual-archive" => Ok(Command::InterviewManualArchive),
        _ => Err(Error::usage(
            "Usage: interview <create <user> | approve | deny | manual-archive>",
        )),
    }
}

fn sanction_args(rest: &str, name: &str) -> Result<(UserId, Duration, String)> {
    let usage = format!("{name} <user> <duration> [reason]");
    let (user, rest) = next_word(rest);
    let target = required_user(user, &usage)?;
    let (duration, reason) = next_word(rest);
    if duration.is_empty() {
        return Err(Error::usage(format!("Usage: {usage}")));
    }
    let duration = parse_duration(duration)?;
    Ok((target, duration, reason_or_default(reason)))
}

fn strip_prefix<'a>(content: &'a str, prefixes: &[String], bot: UserId) -> Option<&'a str> {
    let content = content.trim_start();
    let mentions = [format!("<@{bot}>"), format!("<@!{bot}>")];
    let body = mentions
        .iter()
        .chain(prefixes)
        .filter(|p| !p.is_empty())
        .find_map(|p| content.strip_prefix(p.as_str()))?;
    let body = body.trim_start();
    (!body.is_empty()).then_some(body)
}

/// First whitespace-delimited word and the trimmed remainder.
fn next_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], input[end..].trim()),
        None => (input, ""),
    }
}

fn required_user(word: &str, usage: &str) -> Result<UserId> {
    if word.is_empty() {
        return Err(Error::usage(format!("Usage: {usage}")));
    }
    parse_user(word)
}

/// Accepts `<@id>`, `<@!id>` or a bare id.
pub fn parse_user(word: &str) -> Result<UserId> {
    let id = word
        .strip_prefix("<@")
        .and_then(|s| s.strip_suffix('>'))
        .map(|s| s.trim_start_matches('!'))
        .unwrap_or(word);
    id.parse::<u64>()
        .ok()
        .filter(|id| *id > 0)
        .map(UserId::new)
        .ok_or_else(|| Error::InvalidUser {
            input: word.to_string(),
        })
}

fn reason_or_default(reason: &str) -> String {
    if reason.is_empty() {
        DEFAULT_REASON.to_string()
    } else {
        reason.to_string()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    const BOT: UserId = UserId::new(999);

    fn parse(content: &str) -> Result<Option<Command>> {
        parse_command(content, &["!".to_string(), "gh ".to_string()], BOT)
    }

    #[rstest]
    #[case("!interview approve", Command::InterviewApprove)]
    #[case("!Interview DENY", Command::InterviewDeny)]
    #[case("gh interview manual-archive", Command::InterviewManualArchive)]
    #[case("<@999> interview create <@42>", Command::InterviewCreate { applicant: UserId::new(42) })]
    #[case("<@!999>interview create 42", Command::InterviewCreate { applicant: UserId::new(42) })]
    #[case("!unmute <@!42>", Command::Unmute { target: UserId::new(42), reason: DEFAULT_REASON.into() })]
    #[case("!warn 42 spamming   links", Command::Warn { target: UserId::new(42), reason: "spamming   links".into() })]
    #[case("!modlogs <@42>", Command::ModLogs { target: UserId::new(42), page: 1 })]
    #[case("!modlogs <@42> 3", Command::ModLogs { target: UserId::new(42), page: 3 })]
    fn parses_commands(#[case] input: &str, #[case] expected: Command) {
        assert_eq!(parse(input).unwrap(), Some(expected));
    }

    #[rstest]
    #[case("!mute <@42> 1d2h being rude", 26 * 3600, "being rude")]
    #[case("!mute <@42> 30m", 30 * 60, DEFAULT_REASON)]
    #[case("!mute <@42> 1w", 7 * 24 * 3600, DEFAULT_REASON)]
    fn parses_mute(#[case] input: &str, #[case] secs: u64, #[case] reason: &str) {
        let Some(Command::Mute {
            target,
            duration,
            reason: parsed,
        }) = parse(input).unwrap()
        else {
            panic!("expected mute");
        };
        assert_eq!(target, UserId::new(42));
        assert_eq!(duration, Duration::from_secs(secs));
        assert_eq!(parsed, reason);
    }

    #[test]
    fn hardmute_shares_mute_grammar() {
        let parsed = parse("!hardmute 42 2h").unwrap().unwrap();
        assert_eq!(parsed, Command::Hardmute {
            target: UserId::new(42),
            duration: Duration::from_secs(7200),
            reason: DEFAULT_REASON.into(),
        });
    }

    #[rstest]
    #[case("hello there")]
    #[case("!")]
    #[case("!ping")]
    #[case("<@123> interview approve")]
    #[case("")]
    fn ignores_non_commands(#[case] input: &str) {
        assert_eq!(parse(input).unwrap(), None);
    }

    #[rstest]
    #[case("!interview")]
    #[case("!interview promote")]
    #[case("!interview create")]
    #[case("!mute <@42>")]
    #[case("!mute")]
    #[case("!warn <@42>")]
    #[case("!modlogs <@42> two")]
    fn malformed_commands_are_usage_errors(#[case] input: &str) {
        assert!(matches!(parse(input), Err(Error::Usage { .. })));
    }

    #[rstest]
    #[case("someone")]
    #[case("<#42>")]
    #[case("<@>")]
    #[case("0")]
    fn rejects_bad_user_arguments(#[case] word: &str) {
        assert!(matches!(parse_user(word), Err(Error::InvalidUser { .. })));
    }

    #[test]
    fn mute_with_bad_user_is_invalid_user() {
        assert!(matches!(
            parse("!mute bob 1h"),
            Err(Error::InvalidUser { .. })
        ));
    }
}
