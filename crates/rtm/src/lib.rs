//! Slack RTM fan-out - per-bot read loops and handler dispatch
//!
//! This crate is the realtime core of switchboard:
//! - **Transport** (`transport`) - wire seam, one session per bot identity
//! - **Connections** (`connection`) - identity-to-session registry and replies
//! - **Registry** (`registry`) - registered handler descriptors, snapshot iteration
//! - **Entrypoints** (`entrypoint`) - event-type and message-pattern filters
//! - **Dispatch** (`dispatch`) - one spawned task per matching handler
//! - **Runner** (`runner`) - polling read loop per connection, with reconnect
//!
//! # Architecture
//!
//! ```text
//! ConnectionRegistry → RtmRunner (one loop per bot) → Dispatcher
//!                                                         ↓ (per match)
//!                                       spawned handler task → optional reply
//! ```
//!
//! Handlers never block one another or the read loop: dispatch snapshots the
//! registry, spawns each qualifying invocation, and returns immediately.

pub mod connection;
pub mod dispatch;
pub mod entrypoint;
pub mod event;
pub mod registry;
pub mod runner;
pub mod transport;

pub use connection::{BotConnection, ConnectionRegistry, DeliveryError, SetupError};
pub use dispatch::Dispatcher;
pub use entrypoint::{
    Entrypoint, EventHandler, HandlerError, MessageCaptures, MessageHandler, MessagePattern,
};
pub use event::{Event, EVENT_TYPE_MESSAGE};
pub use registry::{
    HandlerRegistry, Registration, RegistrationId, RegistrationSpec, WorkerOptions,
};
pub use runner::{ReconnectPolicy, RtmRunner};
pub use transport::{
    NoopRtmTransport, NoopTransportFactory, RtmTransport, TransportError, TransportFactory,
};
