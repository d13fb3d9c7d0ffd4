//! Command grammar and event dispatch.
//!
//! [`Dispatcher`] receives every inbound event, routes it to the subsystems
//! registered with it and answers commands in the channel they came from.

pub mod command;
pub mod dispatch;
pub mod error;

pub use {
    command::{Command, parse_command},
    dispatch::{DispatchConfig, Dispatcher},
    error::{Error, Result},
};
