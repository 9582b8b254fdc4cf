use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use simlink::racer::{race_channel, CameraDecoder, LineRacer, Pilot, RaceInbox};
use simlink_client::{ClientConfig, OutboundMessage, SimClient};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, pause, RaceArgs};
use crate::exit::{client_error, CliError, CliResult, DATA_INVALID, SUCCESS, TRANSPORT_ERROR};

/// Time the simulator needs to load a scene before it accepts a car.
const SCENE_SETTLE: Duration = Duration::from_secs(1);
/// Time between the car config and the first control command.
const CAR_CONFIG_SETTLE: Duration = Duration::from_millis(200);

pub fn run(args: RaceArgs) -> CliResult<i32> {
    if !args.model.exists() {
        return Err(CliError::new(
            DATA_INVALID,
            format!("model not found: {}", args.model.display()),
        ));
    }
    let config = ClientConfig {
        poll_interval: parse_duration(&args.poll_interval)?,
        ..ClientConfig::default()
    };
    let tick = parse_duration(&args.tick)?;

    let (feed, mut inbox) = race_channel(CameraDecoder);
    let client = SimClient::connect_with_config(&args.host, args.port, feed, config)
        .map_err(|err| client_error("connect failed", err))?;
    info!(
        peer = %client.peer_addr(),
        model = %args.model.display(),
        name = %args.name,
        "race session started"
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    client
        .send_message(&OutboundMessage::load_scene(&args.scene))
        .map_err(|err| client_error("load_scene failed", err))?;
    pause(SCENE_SETTLE, &running);

    client
        .send_message(&OutboundMessage::car_config(
            &args.name,
            &args.body_style,
            args.body_rgb,
            args.font_size,
        ))
        .map_err(|err| client_error("car_config failed", err))?;
    pause(CAR_CONFIG_SETTLE, &running);

    let mut pilot = LineRacer::default();
    let outcome = drive(&client, &mut inbox, &mut pilot, tick, &running);

    client
        .stop()
        .map_err(|err| client_error("shutdown failed", err))?;
    outcome
}

/// Control loop: one command per tick from the newest telemetry, until
/// Ctrl-C or the connection aborts.
fn drive<P: Pilot>(
    client: &SimClient,
    inbox: &mut RaceInbox,
    pilot: &mut P,
    tick: Duration,
    running: &AtomicBool,
) -> CliResult<i32> {
    while running.load(Ordering::SeqCst) {
        inbox.drain();
        if inbox.is_aborted() {
            warn!("simulator connection lost");
            return Ok(TRANSPORT_ERROR);
        }

        if let Some(snapshot) = inbox.latest() {
            if let Some(command) = pilot.drive(snapshot) {
                client
                    .send_message(&command.to_message())
                    .map_err(|err| client_error("control failed", err))?;
                info!(
                    cte = snapshot.cte,
                    steering = command.steering,
                    speed = snapshot.speed,
                    pos_x = snapshot.pos_x,
                    pos_y = snapshot.pos_y,
                    pos_z = snapshot.pos_z,
                    "telemetry"
                );
            }
        }

        pause(tick, running);
    }

    info!("interrupted; stopping");
    Ok(SUCCESS)
}
