//! Chat-platform boundary.
//!
//! The workflow and scheduler crates talk to the chat platform only through
//! [`NotificationGateway`] and receive platform events as [`InboundEvent`]s.
//! The serenity implementation lives in `gatehouse-discord`;
//! [`RecordingGateway`] is an in-memory implementation that records every
//! outbound call in order.

pub mod error;
pub mod event;
pub mod gateway;
pub mod recording;

pub use {
    error::{Error, Result},
    event::{EventSink, InboundEvent, InboundMessage},
    gateway::{
        Access, ChannelSpec, HistoryMessage, Identity, MemberInfo, NotificationGateway,
        Overwrite, OverwriteTarget,
    },
    recording::{FailureKind, GatewayCall, RecordingGateway},
};
