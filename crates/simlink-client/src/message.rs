//! Messages exchanged with the simulator host.
//!
//! Field names are part of the wire contract and follow the simulator's
//! spelling.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Inbound: the requested car has spawned.
pub const MSG_CAR_LOADED: &str = "car_loaded";
/// Inbound: one telemetry sample with a camera frame.
pub const MSG_TELEMETRY: &str = "telemetry";
/// Local only: the connection was lost. Never sent over the wire.
pub const MSG_ABORTED: &str = "aborted";
/// Outbound: load a scene by name.
pub const MSG_LOAD_SCENE: &str = "load_scene";
/// Outbound: car appearance and name.
pub const MSG_CAR_CONFIG: &str = "car_config";
/// Outbound: steering/throttle/brake command.
pub const MSG_CONTROL: &str = "control";

/// Telemetry sample sent by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Base64-encoded camera frame.
    pub image: String,
    /// Cross-track error.
    pub cte: f64,
    pub speed: f64,
    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,
}

/// A decoded inbound message, keyed by `msg_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum SimMessage {
    CarLoaded,
    Telemetry(Telemetry),
    /// Synthesized locally when the connection is lost.
    Aborted,
    /// Anything else, passed through untouched.
    Other {
        msg_type: Option<String>,
        value: Value,
    },
}

impl SimMessage {
    /// Classify a parsed JSON object.
    ///
    /// Unknown types, and known types whose fields do not fit the typed
    /// shape, come back as [`SimMessage::Other`]. An `aborted` type arriving
    /// from the wire is also treated as `Other`: only the I/O loop may
    /// produce [`SimMessage::Aborted`].
    pub fn from_value(value: Value) -> Self {
        let msg_type = value
            .get("msg_type")
            .and_then(Value::as_str)
            .map(str::to_owned);

        match msg_type.as_deref() {
            Some(MSG_CAR_LOADED) => SimMessage::CarLoaded,
            Some(MSG_TELEMETRY) => match Telemetry::deserialize(&value) {
                Ok(telemetry) => SimMessage::Telemetry(telemetry),
                Err(err) => {
                    debug!(error = %err, "telemetry does not fit the typed shape");
                    SimMessage::Other { msg_type, value }
                }
            },
            _ => SimMessage::Other { msg_type, value },
        }
    }

    /// The wire `msg_type` of this message, if it has one.
    pub fn msg_type(&self) -> Option<&str> {
        match self {
            SimMessage::CarLoaded => Some(MSG_CAR_LOADED),
            SimMessage::Telemetry(_) => Some(MSG_TELEMETRY),
            SimMessage::Aborted => Some(MSG_ABORTED),
            SimMessage::Other { msg_type, .. } => msg_type.as_deref(),
        }
    }

    /// JSON form, as the simulator sent it (or `{"msg_type":"aborted"}`).
    pub fn to_value(&self) -> Value {
        match self {
            SimMessage::CarLoaded => serde_json::json!({ "msg_type": MSG_CAR_LOADED }),
            SimMessage::Telemetry(telemetry) => {
                let mut value = serde_json::to_value(telemetry).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut value {
                    map.insert("msg_type".to_string(), Value::from(MSG_TELEMETRY));
                }
                value
            }
            SimMessage::Aborted => serde_json::json!({ "msg_type": MSG_ABORTED }),
            SimMessage::Other { value, .. } => value.clone(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, SimMessage::Aborted)
    }
}

/// An outbound message. Serializes with a `msg_type` tag.
///
/// Numeric settings travel as strings, which is what the simulator parses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type", rename_all = "snake_case")]
pub enum OutboundMessage {
    LoadScene {
        scene_name: String,
    },
    CarConfig {
        body_style: String,
        body_r: String,
        body_g: String,
        body_b: String,
        car_name: String,
        font_size: String,
    },
    Control {
        steering: String,
        throttle: String,
        brake: String,
    },
}

impl OutboundMessage {
    /// Ask the simulator to load a scene.
    pub fn load_scene(scene_name: &str) -> Self {
        Self::LoadScene {
            scene_name: scene_name.to_string(),
        }
    }

    /// Configure the car body colour, style and label.
    pub fn car_config(car_name: &str, body_style: &str, rgb: [u8; 3], font_size: u32) -> Self {
        Self::CarConfig {
            body_style: body_style.to_string(),
            body_r: rgb[0].to_string(),
            body_g: rgb[1].to_string(),
            body_b: rgb[2].to_string(),
            car_name: car_name.to_string(),
            font_size: font_size.to_string(),
        }
    }

    /// Drive command with decimal-string values.
    pub fn control(steering: f64, throttle: f64, brake: f64) -> Self {
        Self::Control {
            steering: format_decimal(steering),
            throttle: format_decimal(throttle),
            brake: format_decimal(brake),
        }
    }

    /// The wire `msg_type` of this message.
    pub fn msg_type(&self) -> &'static str {
        match self {
            Self::LoadScene { .. } => MSG_LOAD_SCENE,
            Self::CarConfig { .. } => MSG_CAR_CONFIG,
            Self::Control { .. } => MSG_CONTROL,
        }
    }

    /// Serialize to the wire text.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Format a float the way the simulator expects: always with a decimal point.
pub fn format_decimal(value: f64) -> String {
    format!("{value:?}")
}
