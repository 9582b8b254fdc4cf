use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::poll::{Interest, Readiness};

/// A TCP connection to the simulator host.
///
/// The socket is switched to non-blocking mode as soon as it is connected;
/// every operation after that either completes immediately or reports
/// [`TransportError::WouldBlock`]. The abort flag only ever goes from
/// `false` to `true`.
#[derive(Debug)]
pub struct Connection {
    stream: Option<TcpStream>,
    peer: SocketAddr,
    aborted: bool,
}

impl Connection {
    /// Connect to `host:port` (blocking until the OS connect completes).
    pub fn open(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect((host, port)).map_err(|source| TransportError::Connect {
            addr: addr.clone(),
            source,
        })?;
        Self::configure(stream, addr)
    }

    /// Connect to `host:port`, giving up on each resolved address after `timeout`.
    pub fn open_with_timeout(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let candidates = (host, port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Connect {
                addr: addr.clone(),
                source,
            })?;

        let mut last_err = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => return Self::configure(stream, addr),
                Err(err) => {
                    debug!(%candidate, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(match last_err {
            Some(source) => TransportError::Connect { addr, source },
            None => TransportError::Resolve { addr },
        })
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let addr = stream
            .peer_addr()
            .map(|peer| peer.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        Self::configure(stream, addr)
    }

    fn configure(stream: TcpStream, addr: String) -> Result<Self> {
        let setup = || -> std::io::Result<SocketAddr> {
            stream.set_nodelay(true)?;
            stream.set_nonblocking(true)?;
            stream.peer_addr()
        };
        let peer = setup().map_err(|source| TransportError::Connect { addr, source })?;

        info!(%peer, "connected to simulator");
        Ok(Self {
            stream: Some(stream),
            peer,
            aborted: false,
        })
    }

    /// Wait up to `timeout` for the requested readiness.
    pub fn poll(&self, interest: Interest, timeout: Duration) -> Result<Readiness> {
        let stream = self.stream.as_ref().ok_or(TransportError::Closed)?;

        #[cfg(unix)]
        {
            use std::os::fd::AsRawFd;
            crate::poll::poll_fd(stream.as_raw_fd(), interest, timeout).map_err(Into::into)
        }

        #[cfg(not(unix))]
        {
            let _ = (stream, interest, timeout);
            Err(TransportError::Unsupported)
        }
    }

    /// Read up to `max` bytes without blocking.
    ///
    /// An empty buffer means the peer closed the stream in an orderly way.
    pub fn try_read(&mut self, max: usize) -> Result<Bytes> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        let mut buf = BytesMut::zeroed(max);

        loop {
            match stream.read(&mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(buf.freeze());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Err(TransportError::WouldBlock)
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    /// Write as much of `payload` as the socket takes right now.
    ///
    /// Returns the number of bytes accepted, which is less than
    /// `payload.len()` when the send buffer filled up. Returns
    /// [`TransportError::WouldBlock`] only when no byte was accepted. The
    /// caller owns the unwritten remainder and retries it on the next
    /// writable event.
    pub fn try_write(&mut self, payload: &[u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;

        let mut offset = 0usize;
        while offset < payload.len() {
            match stream.write(&payload[offset..]) {
                Ok(0) => return Err(TransportError::Io(ErrorKind::WriteZero.into())),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        if offset == 0 && !payload.is_empty() {
            return Err(TransportError::WouldBlock);
        }
        Ok(offset)
    }

    /// Record that the connection hit an unrecoverable failure.
    pub fn mark_aborted(&mut self) {
        if !self.aborted {
            debug!(peer = %self.peer, "connection marked aborted");
        }
        self.aborted = true;
    }

    /// Whether [`Connection::mark_aborted`] has been called.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Whether [`Connection::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Shut the socket down. Safe to call repeatedly and after an abort.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!(peer = %self.peer, "connection closed");
        }
    }

    /// Address of the simulator host.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Local socket address, while the connection is open.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let stream = self.stream.as_ref().ok_or(TransportError::Closed)?;
        stream.local_addr().map_err(Into::into)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Returns true for I/O errors that mean the peer went away.
pub fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}
