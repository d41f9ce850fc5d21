pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod event_bus;
pub mod locks;
pub mod queues;
pub mod replay;
pub mod store;
pub mod subscriptions;
pub mod sync;

pub use client::*;
pub use commands::*;
pub use config::*;
pub use connection::{backoff_delay, ConnectionManager, OutboundQueue, TransportEvent};
pub use engine::*;
pub use error::*;
pub use event_bus::*;
pub use locks::*;
pub use queues::*;
pub use replay::*;
pub use store::*;
pub use subscriptions::*;
pub use sync::*;
