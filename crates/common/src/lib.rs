//! Shared types, error definitions, and utilities used across all gatehouse crates.

pub mod clock;
pub mod error;
pub mod types;

pub use {
    clock::{Clock, ManualClock, SystemClock},
    error::{Error, Result},
    types::{ChannelId, MessageId, RoleId, UserId},
};
