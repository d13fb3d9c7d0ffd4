//! Core data types for timed sanctions and the moderation log.

use std::{collections::BTreeSet, fmt, str::FromStr};

use {
    gatehouse_common::{RoleId, UserId},
    serde::{Deserialize, Serialize},
};

use crate::Error;

/// Kind of timed sanction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanctionKind {
    /// Adds the mute role.
    Mute,
    /// Strips every role and adds the mute role.
    Hardmute,
}

impl SanctionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mute => "mute",
            Self::Hardmute => "hardmute",
        }
    }
}

impl fmt::Display for SanctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SanctionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mute" => Ok(Self::Mute),
            "hardmute" => Ok(Self::Hardmute),
            other => Err(Error::unknown_name("sanction kind", other)),
        }
    }
}

/// A sanction that must revert at `expires_at_ms`.
///
/// Reverting means removing `roles_to_remove` and adding `roles_to_add`;
/// both are sets, so replaying a revert is harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: String,
    pub applicant: UserId,
    pub kind: SanctionKind,
    pub roles_to_remove: BTreeSet<RoleId>,
    pub roles_to_add: BTreeSet<RoleId>,
    /// Epoch millis.
    pub expires_at_ms: u64,
}

/// Input for [`crate::service::TimedActionScheduler::schedule_action`].
#[derive(Debug, Clone)]
pub struct PendingActionCreate {
    pub applicant: UserId,
    pub kind: SanctionKind,
    pub roles_to_remove: BTreeSet<RoleId>,
    pub roles_to_add: BTreeSet<RoleId>,
    pub expires_at_ms: u64,
}

/// Action recorded in the moderation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModAction {
    Warn,
    Mute,
    Hardmute,
    Unmute,
}

impl ModAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Mute => "mute",
            Self::Hardmute => "hardmute",
            Self::Unmute => "unmute",
        }
    }
}

impl From<SanctionKind> for ModAction {
    fn from(kind: SanctionKind) -> Self {
        match kind {
            SanctionKind::Mute => Self::Mute,
            SanctionKind::Hardmute => Self::Hardmute,
        }
    }
}

impl fmt::Display for ModAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warn" => Ok(Self::Warn),
            "mute" => Ok(Self::Mute),
            "hardmute" => Ok(Self::Hardmute),
            "unmute" => Ok(Self::Unmute),
            other => Err(Error::unknown_name("mod log action", other)),
        }
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModLogEntry {
    pub id: i64,
    pub applicant: UserId,
    pub moderator: UserId,
    pub action: ModAction,
    pub reason: String,
    pub timestamp_ms: u64,
}

/// A mod log entry before the store assigns its id.
#[derive(Debug, Clone)]
pub struct NewModLogEntry {
    pub applicant: UserId,
    pub moderator: UserId,
    pub action: ModAction,
    pub reason: String,
    pub timestamp_ms: u64,
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Roles reverted, action deleted.
    pub reverted: Vec<String>,
    /// Member gone; action deleted without touching roles.
    pub abandoned: Vec<String>,
    /// Transient failure; left for the next sweep.
    pub deferred: Vec<String>,
}

/// Result of asking for a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep was still running.
    Skipped,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [SanctionKind::Mute, SanctionKind::Hardmute] {
            assert_eq!(kind.as_str().parse::<SanctionKind>().ok(), Some(kind));
        }
        assert!("ban".parse::<SanctionKind>().is_err());
    }

    #[test]
    fn action_parses() {
        assert_eq!("unmute".parse::<ModAction>().ok(), Some(ModAction::Unmute));
        assert_eq!(ModAction::from(SanctionKind::Hardmute), ModAction::Hardmute);
    }

    #[test]
    fn unknown_names_are_internal_errors() {
        let err = "kick".parse::<ModAction>().unwrap_err();
        assert_eq!(err.to_string(), "unknown mod log action: kick");
        assert!(matches!(
            gatehouse_common::Error::from(err),
            gatehouse_common::Error::Internal { .. }
        ));
    }
}
