//! Snowflake id newtypes shared by the workflow, scheduler and gateway.

use {
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
};

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

snowflake!(
    /// A guild member or user.
    UserId
);
snowflake!(
    /// A text channel (interview channel, log channel, welcome channel).
    ChannelId
);
snowflake!(MessageId);
snowflake!(RoleId);

impl UserId {
    /// Chat mention syntax for this user.
    #[must_use]
    pub fn mention(self) -> String {
        format!("<@{}>", self.0)
    }
}

impl ChannelId {
    #[must_use]
    pub fn mention(self) -> String {
        format!("<#{}>", self.0)
    }
}
