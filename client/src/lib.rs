//! Client for the presence and messaging relay.
//!
//! [`RelayClient`] keeps a socket and a push stream open to the relay,
//! reconnects each independently, and fans incoming traffic out to typed
//! listeners.

mod client;
pub mod config;
pub mod error;
pub mod listeners;
pub mod pending;
mod push;
pub mod reconnect;
mod socket;
pub mod sse;
pub mod task;

pub use client::{ConnectionState, RelayClient};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use listeners::{ChannelUpdate, ClientEvent, EventKind, ListenerId};
pub use pending::PendingSend;
pub use task::ScheduledTask;
