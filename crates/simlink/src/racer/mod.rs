//! Race-side consumer of the client: telemetry handoff, camera frames and
//! the steering policy.

pub mod image;
pub mod pilot;
pub mod telemetry;

pub use self::image::{CameraDecoder, ImageDecoder, PixelBuffer};
pub use pilot::{ControlCommand, LineRacer, Pilot};
pub use telemetry::{race_channel, RaceInbox, TelemetrySnapshot};
