use simlink_client::OutboundMessage;
use tracing::trace;

use super::telemetry::TelemetrySnapshot;

/// Steering/throttle/brake for one control tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlCommand {
    pub steering: f64,
    pub throttle: f64,
    pub brake: f64,
}

impl ControlCommand {
    pub fn to_message(&self) -> OutboundMessage {
        OutboundMessage::control(self.steering, self.throttle, self.brake)
    }
}

/// Decides the next command from the newest telemetry.
pub trait Pilot {
    /// `None` means "send nothing this tick".
    fn drive(&mut self, snapshot: &TelemetrySnapshot) -> Option<ControlCommand>;
}

/// PD controller tuned for the generated track, with a fixed throttle
/// schedule per track section.
#[derive(Debug, Clone)]
pub struct LineRacer {
    kp: f64,
    kd: f64,
    /// Cross-track errors at or above this keep the previous steering.
    steer_limit: f64,
    prev_err: f64,
    steering: f64,
}

impl Default for LineRacer {
    fn default() -> Self {
        Self::new(0.3, 3.0)
    }
}

impl LineRacer {
    pub fn new(kp: f64, kd: f64) -> Self {
        Self {
            kp,
            kd,
            steer_limit: 10.0,
            prev_err: 0.0,
            steering: 0.0,
        }
    }
}

/// Throttle for the section the car is in, plus a cross-track error
/// measured against the racing line where the section defines one.
fn section_plan(s: &TelemetrySnapshot) -> (f64, Option<f64>) {
    let on_line = s.pos_x - 45.0;
    if s.pos_x < 55.0 && s.pos_z > 0.0 && s.pos_z <= 45.0 {
        // start straight
        (1.0, Some(on_line))
    } else if s.pos_x < 55.0 && s.pos_z > 45.0 && s.pos_z <= 60.0 && s.speed > 7.0 {
        (1.0, Some(on_line))
    } else if s.pos_x < 55.0 && s.pos_z > 60.0 && s.pos_z <= 70.0 && s.speed > 7.0 {
        // lift before the first corner
        (0.0, None)
    } else if s.pos_x > 70.0 && s.pos_z > 13.0 && s.pos_z < 20.0 && s.speed > 7.0 {
        // hairpin
        (-1.0, None)
    } else {
        (0.8, None)
    }
}

impl Pilot for LineRacer {
    fn drive(&mut self, snapshot: &TelemetrySnapshot) -> Option<ControlCommand> {
        snapshot.image.as_ref()?;

        let (throttle, line_err) = section_plan(snapshot);
        let cte = line_err.unwrap_or(snapshot.cte);

        if cte < self.steer_limit {
            let err_d = cte - self.prev_err;
            self.steering = self.kp * -cte + self.kd * -err_d;
        }
        self.prev_err = cte;

        trace!(cte, steering = self.steering, throttle, "pilot decision");
        Some(ControlCommand {
            steering: self.steering,
            throttle,
            brake: 0.0,
        })
    }
}
