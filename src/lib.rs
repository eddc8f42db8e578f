//! Tether
//!
//! Connection-lifecycle management for multiplexed, auto-reconnecting,
//! event-based clients. A [`Manager`] owns one abstract bidirectional
//! [`Transport`], drives its open/error/close transitions, enforces a connect
//! timeout, reconnects with capped linear backoff, and multiplexes any number
//! of logical [`Channel`]s over the single connection. Transport listeners
//! are never leaked or double-fired across reconnects.
//!
//! The transport and packet codec are supplied by the embedding application;
//! a JSON codec is provided for convenience.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether::{JsonCodec, Manager, ManagerConfig, ManagerEvent, Packet};
//!
//! let manager = Manager::new(my_transport, Arc::new(JsonCodec), ManagerConfig::new());
//!
//! let _ = manager.events().subscribe(|event| {
//!     if let ManagerEvent::Packet(packet) = event {
//!         println!("packet on {}: {:?}", packet.channel, packet.payload);
//!     }
//! });
//!
//! let chat = manager.channel("chat");
//! manager.open();
//!
//! // once the application-level handshake completes:
//! chat.set_connected();
//! chat.send(&Packet::new("chat", serde_json::json!({"msg": "hello"})))?;
//! ```

mod backoff;
mod channel;
mod config;
mod error;
mod events;
mod manager;
mod packet;
mod subs;
mod transport;

pub use backoff::{delay_for, Backoff};
pub use channel::{Channel, ChannelEvent};
pub use config::ManagerConfig;
pub use error::{Result, TetherError};
pub use events::{EventBus, ListenerId};
pub use manager::{Manager, ManagerEvent, OpenCallback, ReadyState};
pub use packet::{Codec, JsonCodec, Packet};
pub use subs::{Subscription, SubscriptionList};
pub use transport::{Transport, TransportEvent};
