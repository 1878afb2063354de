//! High-level, typed API over the `attache-connector` command bridge.
//!
//! Where the connector crate moves raw protocol lines, this crate speaks
//! in values: versions, profile properties, per-user lookups. Hosts that
//! need raw commands or notification listeners reach through
//! [`Client::connector`].

pub mod client;
pub mod error;

pub use attache_connector::{
    Connector, ConnectorConfig, ConnectorListener, MessageEvent, Status, StatusEvent,
    TcpLineTransport,
};
pub use client::Client;
pub use error::ApiError;
