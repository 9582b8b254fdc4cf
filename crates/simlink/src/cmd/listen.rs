use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use simlink_client::{ClientConfig, SimClient};
use tracing::{debug, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, ListenArgs};
use crate::exit::{client_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR, USAGE};
use crate::output::{print_message, OutputFormat};

/// How often the receive wait checks for Ctrl-C.
const RECV_SLICE: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    for payload in &args.send {
        serde_json::from_str::<serde_json::Value>(payload)
            .map_err(|err| CliError::new(USAGE, format!("--send is not valid JSON: {err}")))?;
    }
    let config = ClientConfig {
        poll_interval: parse_duration(&args.poll_interval)?,
        ..ClientConfig::default()
    };

    let (client, messages) = SimClient::connect_channel(&args.host, args.port, config)
        .map_err(|err| client_error("connect failed", err))?;
    let peer = client.peer_addr().to_string();

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    for payload in args.send {
        client.send(payload);
        wait_until_flushed(&client, &running);
    }

    let mut printed = 0usize;
    let mut code = SUCCESS;
    while running.load(Ordering::SeqCst) {
        let message = match messages.recv_timeout(RECV_SLICE) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        print_message(&message, &peer, format);
        if message.is_aborted() {
            warn!(%peer, "simulator connection lost");
            code = TRANSPORT_ERROR;
            break;
        }

        printed = printed.saturating_add(1);
        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    client
        .stop()
        .map_err(|err| client_error("shutdown failed", err))?;
    Ok(code)
}

/// Each send replaces any unsent one, so wait for the slot to drain before
/// queueing the next.
fn wait_until_flushed(client: &SimClient, running: &AtomicBool) {
    while client.has_pending() && !client.is_aborted() && running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(1));
    }
    debug!(pending = client.has_pending(), "send flushed");
}
