//! Framed JSON link to a driving simulator.
//!
//! # Crate Structure
//!
//! - [`transport`]: Non-blocking TCP connection and readiness polling
//! - [`frame`]: Newline-delimited JSON reassembly with locale float repair
//! - [`client`]: Background I/O worker, pending-message slot and client facade
//! - `racer`: Telemetry handoff and steering policy (feature `racer`)

/// Re-export transport types.
pub mod transport {
    pub use simlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use simlink_frame::*;
}

/// Re-export client types.
pub mod client {
    pub use simlink_client::*;
}

#[cfg(feature = "racer")]
pub mod racer;
