use crossbeam_channel::{Receiver, Sender};
use simlink_client::{MessageHandler, SimMessage, Telemetry};
use tracing::{debug, warn};

use super::image::{ImageDecoder, PixelBuffer};

/// One telemetry sample, detached from the wire message.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub cte: f64,
    pub speed: f64,
    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,
    /// `None` when the frame could not be decoded.
    pub image: Option<PixelBuffer>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RaceEvent {
    CarLoaded,
    Telemetry(TelemetrySnapshot),
    Aborted,
}

/// Message handler that turns simulator traffic into [`RaceEvent`]s for the
/// control thread. Runs on the I/O worker.
pub struct TelemetryFeed<D> {
    events: Sender<RaceEvent>,
    decoder: D,
}

impl<D: ImageDecoder> TelemetryFeed<D> {
    fn snapshot(&mut self, telemetry: Telemetry) -> TelemetrySnapshot {
        let image = match self.decoder.decode(&telemetry.image) {
            Ok(frame) => Some(frame),
            Err(err) => {
                warn!(error = %err, "dropping camera frame");
                None
            }
        };
        TelemetrySnapshot {
            cte: telemetry.cte,
            speed: telemetry.speed,
            pos_x: telemetry.pos_x,
            pos_y: telemetry.pos_y,
            pos_z: telemetry.pos_z,
            image,
        }
    }
}

impl<D: ImageDecoder> MessageHandler for TelemetryFeed<D> {
    fn on_message(&mut self, message: SimMessage) {
        let event = match message {
            SimMessage::CarLoaded => RaceEvent::CarLoaded,
            SimMessage::Telemetry(telemetry) => RaceEvent::Telemetry(self.snapshot(telemetry)),
            SimMessage::Aborted => RaceEvent::Aborted,
            SimMessage::Other { msg_type, .. } => {
                debug!(?msg_type, "ignoring message");
                return;
            }
        };
        if self.events.send(event).is_err() {
            debug!("race inbox dropped");
        }
    }
}

/// Control-thread side of the feed. Keeps only the newest snapshot.
#[derive(Debug)]
pub struct RaceInbox {
    events: Receiver<RaceEvent>,
    latest: Option<TelemetrySnapshot>,
    car_loaded: bool,
    aborted: bool,
}

impl RaceInbox {
    /// Take everything queued so far without blocking.
    pub fn drain(&mut self) {
        for event in self.events.try_iter() {
            match event {
                RaceEvent::CarLoaded => {
                    debug!("car loaded");
                    self.car_loaded = true;
                }
                RaceEvent::Telemetry(snapshot) => self.latest = Some(snapshot),
                RaceEvent::Aborted => self.aborted = true,
            }
        }
    }

    pub fn latest(&self) -> Option<&TelemetrySnapshot> {
        self.latest.as_ref()
    }

    pub fn car_loaded(&self) -> bool {
        self.car_loaded
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

/// Create a connected feed and inbox.
pub fn race_channel<D: ImageDecoder>(decoder: D) -> (TelemetryFeed<D>, RaceInbox) {
    let (events, rx) = crossbeam_channel::unbounded();
    let feed = TelemetryFeed { events, decoder };
    let inbox = RaceInbox {
        events: rx,
        latest: None,
        car_loaded: false,
        aborted: false,
    };
    (feed, inbox)
}
