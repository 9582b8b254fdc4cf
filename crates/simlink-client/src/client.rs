use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::Receiver;
use simlink_frame::FrameConfig;
use simlink_transport::Connection;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::handler::MessageHandler;
use crate::io_loop::{IoLoop, Shared};
use crate::message::{OutboundMessage, SimMessage};

/// Default wait per poll iteration.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default maximum bytes taken from the socket per read: 64 KiB.
pub const DEFAULT_READ_CHUNK: usize = 64 * 1024;

/// Client behavior configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound on each readiness wait of the I/O worker.
    pub poll_interval: Duration,
    /// Maximum bytes read per readable event.
    pub read_chunk_size: usize,
    /// Connect timeout per resolved address. `None` uses the OS default.
    pub connect_timeout: Option<Duration>,
    /// Frame reassembly limits.
    pub frame: FrameConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_chunk_size: DEFAULT_READ_CHUNK,
            connect_timeout: None,
            frame: FrameConfig::default(),
        }
    }
}

/// Connection to a simulator host with a background I/O worker.
///
/// Outbound traffic goes through a single pending slot: `send` overwrites
/// whatever has not been written yet. Callers that need several messages
/// delivered must wait for [`SimClient::has_pending`] to turn false between
/// sends.
pub struct SimClient {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Connection>>,
    peer: SocketAddr,
}

impl SimClient {
    /// Connect to `host:port` with default configuration.
    pub fn connect<H: MessageHandler>(host: &str, port: u16, handler: H) -> Result<Self> {
        Self::connect_with_config(host, port, handler, ClientConfig::default())
    }

    /// Connect with explicit configuration.
    ///
    /// Fails synchronously if the connection cannot be established.
    pub fn connect_with_config<H: MessageHandler>(
        host: &str,
        port: u16,
        handler: H,
        config: ClientConfig,
    ) -> Result<Self> {
        let connection = match config.connect_timeout {
            Some(timeout) => Connection::open_with_timeout(host, port, timeout)?,
            None => Connection::open(host, port)?,
        };
        Self::from_connection(connection, handler, config)
    }

    /// Connect and deliver messages through a channel instead of a callback.
    pub fn connect_channel(
        host: &str,
        port: u16,
        config: ClientConfig,
    ) -> Result<(Self, Receiver<SimMessage>)> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let client = Self::connect_with_config(host, port, tx, config)?;
        Ok((client, rx))
    }

    /// Start the I/O worker on an already open connection.
    pub fn from_connection<H: MessageHandler>(
        connection: Connection,
        handler: H,
        config: ClientConfig,
    ) -> Result<Self> {
        let peer = connection.peer_addr();
        let shared = Arc::new(Shared::default());
        let io_loop = IoLoop::new(connection, handler, Arc::clone(&shared), &config);

        let worker = std::thread::Builder::new()
            .name("simlink-io".to_string())
            .spawn(move || io_loop.run())
            .map_err(ClientError::Spawn)?;

        Ok(Self {
            shared,
            worker: Some(worker),
            peer,
        })
    }

    /// Queue `message` for the next writable event, replacing any unsent one.
    pub fn send(&self, message: impl Into<String>) {
        let payload = Bytes::from(message.into());
        if self.shared.pending.replace(payload) {
            debug!("unsent message replaced by a newer one");
        }
    }

    /// Serialize and [`send`](SimClient::send) a typed message.
    pub fn send_message(&self, message: &OutboundMessage) -> Result<()> {
        let text = message.to_json()?;
        self.send(text);
        Ok(())
    }

    /// True once the connection has failed. Never resets.
    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::Acquire)
    }

    /// True while a sent message is still waiting to be written.
    pub fn has_pending(&self) -> bool {
        !self.shared.pending.is_empty()
    }

    /// Address of the simulator host.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Stop the I/O worker, wait for it to exit, then close the connection.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        self.shared.stop.store(true, Ordering::Release);
        match worker.join() {
            Ok(mut connection) => {
                connection.close();
                info!(peer = %self.peer, "client stopped");
                Ok(())
            }
            Err(_) => Err(ClientError::WorkerPanicked),
        }
    }
}

impl Drop for SimClient {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "client shutdown failed");
        }
    }
}

impl std::fmt::Debug for SimClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimClient")
            .field("peer", &self.peer)
            .field("aborted", &self.is_aborted())
            .field("has_pending", &self.has_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    use crossbeam_channel::RecvTimeoutError;
    use serde_json::Value;

    use super::*;
    use crate::message::Telemetry;

    const WAIT: Duration = Duration::from_secs(3);

    fn fast_config() -> ClientConfig {
        ClientConfig {
            poll_interval: Duration::from_millis(5),
            ..ClientConfig::default()
        }
    }

    fn start() -> (SimClient, Receiver<SimMessage>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (client, rx) = SimClient::connect_channel("127.0.0.1", port, fast_config()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, rx, server)
    }

    fn read_json(server: &mut TcpStream) -> Value {
        server.set_read_timeout(Some(WAIT)).unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = server.read(&mut chunk).unwrap();
            assert!(n > 0, "client closed before a full message arrived");
            buf.extend_from_slice(&chunk[..n]);
            if let Ok(value) = serde_json::from_slice::<Value>(&buf) {
                return value;
            }
        }
    }

    #[test]
    fn receives_car_loaded() {
        let (client, rx, mut server) = start();
        server.write_all(b"{\"msg_type\":\"car_loaded\"}\n").unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), SimMessage::CarLoaded);
        client.stop().unwrap();
    }

    #[test]
    fn receives_split_telemetry_with_comma_decimals() {
        let (client, rx, mut server) = start();
        server
            .write_all(b"{\"msg_type\":\"telemetry\",\"image\":\"QUJD\",\"cte\":1")
            .unwrap();
        thread::sleep(Duration::from_millis(30));
        server
            .write_all(b"2,3,\"speed\":0,5,\"pos_x\":45,\"pos_y\":0,6,\"pos_z\":-2,25}\n")
            .unwrap();

        let expected = Telemetry {
            image: "QUJD".to_string(),
            cte: 12.3,
            speed: 0.5,
            pos_x: 45.0,
            pos_y: 0.6,
            pos_z: -2.25,
        };
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            SimMessage::Telemetry(expected)
        );
        client.stop().unwrap();
    }

    #[test]
    fn send_message_reaches_the_wire() {
        let (client, _rx, mut server) = start();
        client
            .send_message(&OutboundMessage::control(0.25, 1.0, 0.0))
            .unwrap();

        let value = read_json(&mut server);
        assert_eq!(value["msg_type"], "control");
        assert_eq!(value["steering"], "0.25");
        assert_eq!(value["throttle"], "1.0");
        assert_eq!(value["brake"], "0.0");

        let deadline = std::time::Instant::now() + WAIT;
        while client.has_pending() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!client.has_pending());
        client.stop().unwrap();
    }

    #[test]
    fn stop_returns_while_peer_is_not_reading() {
        let (client, _rx, _server) = start();
        client.send("x".repeat(32 * 1024 * 1024));
        thread::sleep(Duration::from_millis(50));
        assert!(client.has_pending());

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let _ = done_tx.send(client.stop().is_ok());
        });
        assert_eq!(done_rx.recv_timeout(WAIT), Ok(true));
    }

    #[test]
    fn peer_close_aborts_exactly_once() {
        let (client, rx, server) = start();
        drop(server);

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), SimMessage::Aborted);
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap_err(),
            RecvTimeoutError::Disconnected
        );
        assert!(client.is_aborted());
        client.stop().unwrap();
    }

    #[test]
    fn invalid_utf8_aborts() {
        let (client, rx, mut server) = start();
        server.write_all(&[b'{', 0xC0, b'}', b'\n']).unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), SimMessage::Aborted);
        assert!(client.is_aborted());
    }

    #[test]
    fn malformed_message_is_skipped() {
        let (client, rx, mut server) = start();
        server
            .write_all(b"{\"msg_type\":\"telemetry\",\"cte\":}\n{\"msg_type\":\"car_loaded\"}\n")
            .unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), SimMessage::CarLoaded);
        assert!(!client.is_aborted());
        client.stop().unwrap();
    }

    #[test]
    fn stop_closes_without_abort_message() {
        let (client, rx, mut server) = start();
        client.stop().unwrap();

        assert_eq!(
            rx.recv_timeout(WAIT).unwrap_err(),
            RecvTimeoutError::Disconnected
        );

        server.set_read_timeout(Some(WAIT)).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(server.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn handler_panic_aborts_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = crossbeam_channel::unbounded();

        let handler = move |message: SimMessage| {
            if message == SimMessage::CarLoaded {
                panic!("handler failure");
            }
            let _ = tx.send(message);
        };
        let client = SimClient::connect_with_config("127.0.0.1", port, handler, fast_config())
            .unwrap();
        let (mut server, _) = listener.accept().unwrap();
        server.write_all(b"{\"msg_type\":\"car_loaded\"}\n").unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), SimMessage::Aborted);
        assert!(client.is_aborted());
        client.stop().unwrap();
    }

    #[test]
    fn connect_failure_is_reported_synchronously() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = SimClient::connect("127.0.0.1", port, |_: SimMessage| {}).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(simlink_transport::TransportError::Connect { .. })
        ));
    }

    #[test]
    fn drop_stops_the_worker() {
        let (client, rx, _server) = start();
        drop(client);
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap_err(),
            RecvTimeoutError::Disconnected
        );
    }
}
