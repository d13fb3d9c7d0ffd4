//! Discord transport built on serenity.
//!
//! [`DiscordGateway`] implements the outbound [`NotificationGateway`] over
//! the REST client; [`DiscordHandler`] turns gateway events for the
//! configured guild into [`gatehouse_channels::InboundEvent`]s.
//!
//! [`NotificationGateway`]: gatehouse_channels::NotificationGateway

pub mod convert;
pub mod gateway;
pub mod handler;

pub use {gateway::DiscordGateway, handler::DiscordHandler};
