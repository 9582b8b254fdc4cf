//! Non-blocking TCP transport for the simulator link.
//!
//! This is the lowest layer of simlink. It owns the socket, switches it to
//! non-blocking mode right after connecting, and exposes the three
//! primitives everything else is built from:
//! - a bounded readiness poll over the single descriptor
//! - `try_read` / `try_write` that never block
//! - a monotonic abort flag and an idempotent `close`

pub mod connection;
pub mod error;
pub mod poll;

pub use connection::{is_disconnect, Connection};
pub use error::{Result, TransportError};
pub use poll::{Interest, Readiness};
