//! Notification types, channel resolution, and dispatching.
//!
//! # Dispatch Flow
//!
//! A [`SendRequest`] is handed to [`DispatchEngine::send`], which:
//!
//! 1. validates that recipient, source, target and kind are set
//! 2. resolves channels through [`ChannelPolicy`] (explicit preference row,
//!    otherwise the source protocol's default)
//! 3. writes the in-app record through the configured
//!    [`MessageStore`](crate::store::MessageStore) for members
//! 4. asks the source [`Protocol`] for SMS/email senders and runs them
//!
//! Sources customise steps 2 and 4 by registering a [`Protocol`] in the
//! [`ProtocolRegistry`].

mod capability;
mod code;
mod dispatcher;
mod policy;
mod protocol;
mod request;
mod types;

pub use capability::{
    Capabilities, Capability, Clock, ManualClock, StaticCapabilities, SystemClock,
};
pub use code::NotificationCode;
pub use dispatcher::{
    DispatchEngine, DispatchError, DispatchResult, DispatcherStats, DispatcherStatsSnapshot,
};
pub use policy::ChannelPolicy;
pub use protocol::{DefaultProtocol, Protocol, ProtocolRegistry, TransportError, TransportSender};
pub use request::{Recipient, SendRequest};
pub use types::{
    Channel, Envelope, MessageKey, NotificationMessage, Payload, PayloadBody, SendMode,
    SourceIdentity, TargetId, TargetRef, UnknownSendMode, PAYLOAD_SCHEMA_VERSION,
};
