//! Single-descriptor readiness polling.
//!
//! The I/O loop only ever waits on one socket, so this is a thin wrapper over
//! `poll(2)` rather than a general event registry.

use std::time::Duration;

/// Readiness the caller wants to be woken for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    /// Wake only when there is something to read.
    pub const READABLE: Interest = Interest {
        read: true,
        write: false,
    };
    /// Wake only when the socket accepts writes.
    pub const WRITABLE: Interest = Interest {
        read: false,
        write: true,
    };
    /// Wake on either direction.
    pub const BOTH: Interest = Interest {
        read: true,
        write: true,
    };
}

/// Result of a readiness poll.
///
/// `exceptional` is reported regardless of interest; it mirrors the third
/// descriptor set of a classic `select(2)` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub exceptional: bool,
}

impl Readiness {
    /// True when the poll timed out with nothing ready.
    pub fn is_empty(&self) -> bool {
        !self.readable && !self.writable && !self.exceptional
    }
}

/// Poll one descriptor for up to `timeout`.
///
/// Hang-up and error conditions are folded into `readable` (when read
/// interest is set) so the next read observes end-of-stream or the socket
/// error instead of the poll spinning on them.
#[cfg(unix)]
pub(crate) fn poll_fd(
    fd: std::os::fd::RawFd,
    interest: Interest,
    timeout: Duration,
) -> std::io::Result<Readiness> {
    let mut events: libc::c_short = libc::POLLPRI;
    if interest.read {
        events |= libc::POLLIN;
    }
    if interest.write {
        events |= libc::POLLOUT;
    }

    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    loop {
        // SAFETY: `pfd` is a valid, initialized pollfd and the count passed is exactly one.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc >= 0 {
            break;
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }

    let revents = pfd.revents;
    if revents & libc::POLLNVAL != 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "polled descriptor is not open",
        ));
    }

    Ok(Readiness {
        readable: interest.read && revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0,
        writable: interest.write && revents & libc::POLLOUT != 0,
        exceptional: revents & (libc::POLLPRI | libc::POLLERR) != 0,
    })
}
