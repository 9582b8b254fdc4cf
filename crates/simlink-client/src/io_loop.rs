use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes};
use simlink_frame::FrameReassembler;
use simlink_transport::{is_disconnect, Connection, Interest, TransportError};
use tracing::{debug, error, trace, warn};

use crate::client::ClientConfig;
use crate::error::Result;
use crate::handler::MessageHandler;
use crate::message::SimMessage;
use crate::pending::PendingSlot;

/// State shared between the client facade and its I/O worker.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) stop: AtomicBool,
    pub(crate) aborted: AtomicBool,
    pub(crate) pending: PendingSlot,
}

/// Outcome of one poll iteration.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Disconnected(String),
}

/// A message partly on the wire. It must finish before anything else is
/// written, even if the slot was overwritten meanwhile.
#[derive(Debug)]
struct InFlight {
    seq: u64,
    remaining: Bytes,
}

/// The background worker: polls the socket, reassembles frames, dispatches
/// them to the handler and flushes the pending outbound message.
pub(crate) struct IoLoop<H> {
    connection: Connection,
    reassembler: FrameReassembler,
    handler: H,
    shared: Arc<Shared>,
    in_flight: Option<InFlight>,
    poll_interval: Duration,
    read_chunk_size: usize,
}

impl<H: MessageHandler> IoLoop<H> {
    pub(crate) fn new(
        connection: Connection,
        handler: H,
        shared: Arc<Shared>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            connection,
            reassembler: FrameReassembler::with_config(config.frame.clone()),
            handler,
            shared,
            in_flight: None,
            poll_interval: config.poll_interval,
            read_chunk_size: config.read_chunk_size,
        }
    }

    /// Run until a stop is requested or the connection aborts.
    ///
    /// Hands the connection back so the owner can close it after joining.
    pub(crate) fn run(mut self) -> Connection {
        let peer = self.connection.peer_addr();
        debug!(%peer, "I/O loop started");

        while !self.shared.stop.load(Ordering::Acquire) {
            let reason = match panic::catch_unwind(AssertUnwindSafe(|| self.poll_once())) {
                Ok(Ok(Flow::Continue)) => continue,
                Ok(Ok(Flow::Disconnected(reason))) => reason,
                Ok(Err(err)) => err.to_string(),
                Err(_) => "panic during message processing".to_string(),
            };
            self.abort(&reason);
            break;
        }

        debug!(%peer, "I/O loop finished");
        self.connection
    }

    /// One bounded wait on the socket followed by read, write and
    /// exceptional-condition handling.
    pub(crate) fn poll_once(&mut self) -> Result<Flow> {
        let interest = Interest {
            read: true,
            write: self.in_flight.is_some() || !self.shared.pending.is_empty(),
        };
        let ready = self.connection.poll(interest, self.poll_interval)?;

        if ready.readable {
            match self.connection.try_read(self.read_chunk_size) {
                Ok(data) if data.is_empty() => {
                    return Ok(Flow::Disconnected(
                        "simulator closed the connection".to_string(),
                    ));
                }
                Ok(data) => self.dispatch(&data)?,
                Err(TransportError::WouldBlock) => {}
                Err(TransportError::Io(err)) if is_disconnect(&err) => {
                    return Ok(Flow::Disconnected(format!("connection lost: {err}")));
                }
                Err(err) => return Err(err.into()),
            }
        }

        if ready.writable {
            self.flush_pending()?;
        }

        if ready.exceptional {
            warn!(peer = %self.connection.peer_addr(), "socket reported an exceptional condition");
        }

        Ok(Flow::Continue)
    }

    fn dispatch(&mut self, data: &[u8]) -> Result<()> {
        trace!(len = data.len(), "received chunk");
        for parsed in self.reassembler.feed(data)? {
            match parsed {
                Ok(value) => self.handler.on_message(SimMessage::from_value(value)),
                Err(err) => warn!(error = %err, "discarding malformed message"),
            }
        }
        Ok(())
    }

    /// One write attempt per writable event. A short write keeps the
    /// remainder for the next event so the loop keeps observing `stop`.
    fn flush_pending(&mut self) -> Result<()> {
        let resumed = self.in_flight.is_some();
        let mut in_flight = match self.in_flight.take() {
            Some(in_flight) => in_flight,
            None => match self.shared.pending.peek() {
                Some((seq, remaining)) => InFlight { seq, remaining },
                None => return Ok(()),
            },
        };

        match self.connection.try_write(&in_flight.remaining) {
            Ok(n) if n == in_flight.remaining.len() => {
                self.shared.pending.clear_if(in_flight.seq);
                trace!(seq = in_flight.seq, "sent pending message");
                Ok(())
            }
            Ok(n) => {
                in_flight.remaining.advance(n);
                trace!(left = in_flight.remaining.len(), "partial write");
                self.in_flight = Some(in_flight);
                Ok(())
            }
            Err(TransportError::WouldBlock) => {
                // A fresh payload stays in the slot and remains replaceable;
                // a started one keeps its place.
                if resumed {
                    self.in_flight = Some(in_flight);
                }
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn abort(&mut self, reason: &str) {
        error!(peer = %self.connection.peer_addr(), reason, "connection aborted");
        self.connection.mark_aborted();
        self.connection.close();
        self.shared.aborted.store(true, Ordering::Release);

        let handler = &mut self.handler;
        if panic::catch_unwind(AssertUnwindSafe(|| handler.on_message(SimMessage::Aborted)))
            .is_err()
        {
            error!("message handler panicked on the abort notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::Instant;

    use bytes::Bytes;
    use crossbeam_channel::Receiver;

    use super::*;

    fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let conn = Connection::open("127.0.0.1", port).unwrap();
        let (server, _) = listener.accept().unwrap();
        (conn, server)
    }

    fn channel_loop(
        conn: Connection,
    ) -> (
        IoLoop<crossbeam_channel::Sender<SimMessage>>,
        Receiver<SimMessage>,
        Arc<Shared>,
    ) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared::default());
        let config = ClientConfig {
            poll_interval: Duration::from_millis(10),
            ..ClientConfig::default()
        };
        (IoLoop::new(conn, tx, shared.clone(), &config), rx, shared)
    }

    #[test]
    fn second_send_before_writable_replaces_first() {
        let (conn, mut server) = pair();
        let (mut io, _rx, shared) = channel_loop(conn);

        shared.pending.replace(Bytes::from_static(b"{\"msg_type\":\"first\"}"));
        shared.pending.replace(Bytes::from_static(b"{\"msg_type\":\"second\"}"));

        assert_eq!(io.poll_once().unwrap(), Flow::Continue);
        assert!(shared.pending.is_empty());

        drop(io);
        let mut wire = String::new();
        server.read_to_string(&mut wire).unwrap();
        assert_eq!(wire, "{\"msg_type\":\"second\"}");
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn spawn_reader(mut server: TcpStream) -> std::thread::JoinHandle<Vec<u8>> {
        std::thread::spawn(move || {
            let mut wire = Vec::new();
            server.read_to_end(&mut wire).unwrap();
            wire
        })
    }

    fn drain_outbound(io: &mut IoLoop<crossbeam_channel::Sender<SimMessage>>, shared: &Shared) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while io.in_flight.is_some() || !shared.pending.is_empty() {
            assert!(Instant::now() < deadline, "outbound data never drained");
            assert_eq!(io.poll_once().unwrap(), Flow::Continue);
        }
    }

    #[test]
    fn short_write_resumes_on_later_events() {
        let (conn, server) = pair();
        let (mut io, _rx, shared) = channel_loop(conn);
        let payload = pattern(32 * 1024 * 1024);
        shared.pending.replace(Bytes::from(payload.clone()));

        // Nobody reads yet: one event leaves a remainder behind.
        assert_eq!(io.poll_once().unwrap(), Flow::Continue);
        assert!(io.in_flight.is_some());
        assert!(!shared.pending.is_empty());

        let reader = spawn_reader(server);
        drain_outbound(&mut io, &shared);
        drop(io);

        let wire = reader.join().unwrap();
        assert_eq!(wire.len(), payload.len());
        assert!(wire == payload);
    }

    #[test]
    fn newer_send_waits_for_started_write() {
        let (conn, server) = pair();
        let (mut io, _rx, shared) = channel_loop(conn);
        let first = pattern(32 * 1024 * 1024);
        shared.pending.replace(Bytes::from(first.clone()));

        assert_eq!(io.poll_once().unwrap(), Flow::Continue);
        assert!(io.in_flight.is_some());
        shared.pending.replace(Bytes::from_static(b"{\"msg_type\":\"second\"}"));

        let reader = spawn_reader(server);
        drain_outbound(&mut io, &shared);
        drop(io);

        let wire = reader.join().unwrap();
        let (head, tail) = wire.split_at(first.len());
        assert!(head == first.as_slice());
        assert_eq!(tail, b"{\"msg_type\":\"second\"}");
    }

    #[cfg(unix)]
    #[test]
    fn urgent_data_is_logged_not_fatal() {
        use std::os::fd::AsRawFd;

        let (conn, mut server) = pair();
        let (mut io, rx, shared) = channel_loop(conn);

        let byte = [b'!'];
        let sent = unsafe {
            libc::send(
                server.as_raw_fd(),
                byte.as_ptr().cast::<libc::c_void>(),
                byte.len(),
                libc::MSG_OOB,
            )
        };
        assert_eq!(sent, 1);

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let ready = io
                .connection
                .poll(Interest::READABLE, Duration::from_millis(10))
                .unwrap();
            if ready.exceptional {
                break;
            }
            assert!(Instant::now() < deadline, "urgent data never reported");
        }

        assert_eq!(io.poll_once().unwrap(), Flow::Continue);
        assert!(!shared.aborted.load(Ordering::Acquire));
        assert!(!io.connection.is_aborted());

        server.write_all(b"{\"msg_type\":\"car_loaded\"}\n").unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while rx.is_empty() && Instant::now() < deadline {
            assert_eq!(io.poll_once().unwrap(), Flow::Continue);
        }
        assert_eq!(rx.try_recv().unwrap(), SimMessage::CarLoaded);
    }

    #[test]
    fn messages_are_dispatched_in_wire_order() {
        let (conn, mut server) = pair();
        let (mut io, rx, _shared) = channel_loop(conn);

        server
            .write_all(b"{\"msg_type\":\"a\"}\n{\"msg_type\":\"b\"}\n{\"msg_type\":\"c\"}\n")
            .unwrap();

        let mut seen = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.len() < 3 && Instant::now() < deadline {
            io.poll_once().unwrap();
            seen.extend(rx.try_iter().filter_map(|m| m.msg_type().map(str::to_owned)));
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn malformed_message_does_not_stop_the_loop() {
        let (conn, mut server) = pair();
        let (mut io, rx, _shared) = channel_loop(conn);

        server
            .write_all(b"{\"cte\":}\n{\"msg_type\":\"car_loaded\"}\n")
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while rx.is_empty() && Instant::now() < deadline {
            assert_eq!(io.poll_once().unwrap(), Flow::Continue);
        }
        assert_eq!(rx.try_recv().unwrap(), SimMessage::CarLoaded);
    }

    #[test]
    fn peer_close_is_reported_as_disconnect() {
        let (conn, server) = pair();
        let (mut io, _rx, _shared) = channel_loop(conn);
        drop(server);

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match io.poll_once().unwrap() {
                Flow::Disconnected(_) => break,
                Flow::Continue => assert!(Instant::now() < deadline, "no disconnect seen"),
            }
        }
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let (conn, mut server) = pair();
        let (mut io, _rx, _shared) = channel_loop(conn);
        server.write_all(&[0xFF, 0xFE, b'\n']).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match io.poll_once() {
                Err(crate::ClientError::Frame(err)) => {
                    assert!(err.is_fatal());
                    break;
                }
                Ok(Flow::Continue) => assert!(Instant::now() < deadline, "no error seen"),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[test]
    fn run_aborts_once_and_returns_closed_connection() {
        let (conn, server) = pair();
        let (io, rx, shared) = channel_loop(conn);
        drop(server);

        let connection = io.run();
        assert!(connection.is_aborted());
        assert!(connection.is_closed());
        assert!(shared.aborted.load(Ordering::Acquire));

        let messages: Vec<SimMessage> = rx.iter().collect();
        assert_eq!(messages, vec![SimMessage::Aborted]);
    }

    #[test]
    fn run_honours_stop_without_abort() {
        let (conn, _server) = pair();
        let (io, rx, shared) = channel_loop(conn);
        shared.stop.store(true, Ordering::Release);

        let connection = io.run();
        assert!(!connection.is_aborted());
        assert!(rx.iter().next().is_none());
    }
}
