//! Client side of the simulator link.
//!
//! This is the "just works" layer. [`SimClient`] connects eagerly, spawns one
//! background I/O worker per connection, and exposes:
//! - `send`: fire-and-forget, last write wins (there is no queue)
//! - a [`MessageHandler`] hook called on the worker for every decoded message
//! - `stop`: join the worker and close the socket
//!
//! A dropped connection is terminal. The handler then sees
//! [`SimMessage::Aborted`] exactly once and nothing after it.

pub mod client;
pub mod error;
pub mod handler;
mod io_loop;
pub mod message;
mod pending;

pub use client::{ClientConfig, SimClient, DEFAULT_POLL_INTERVAL, DEFAULT_READ_CHUNK};
pub use error::{ClientError, Result};
pub use handler::MessageHandler;
pub use message::{
    format_decimal, OutboundMessage, SimMessage, Telemetry, MSG_ABORTED, MSG_CAR_CONFIG,
    MSG_CAR_LOADED, MSG_CONTROL, MSG_LOAD_SCENE, MSG_TELEMETRY,
};
