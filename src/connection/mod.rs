//! Socket lifecycle for one session
//!
//! A `Connection` is created fresh on every `connect()`. It drives the
//! connect-request / status handshake over a `Connector`-provided transport and
//! publishes its `ConnectionState` through a shared `StateCell`.

mod client;
mod role;
mod state;
mod transport;
mod websocket;

pub use client::{Connection, ConnectionSettings, CLOSE_NORMAL};
pub use role::SessionRole;
pub use state::{ConnectionState, StateCell};
pub use transport::{Connector, OutboundFrame, TransportEvent, TransportLink};
pub use websocket::WebSocketConnector;
