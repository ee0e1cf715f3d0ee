//! Vsock endpoint lifetime holder.
//!
//! Owns a connected endpoint `E` and hands a consumer a `dup`'d descriptor
//! `D` it can close independently. `E` stays open until the transport is
//! explicitly closed, so the peer only observes EOF once both `D` and `E`
//! have been closed.

use crate::error::Result;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

pub struct VsockTransport {
    endpoint: Option<OwnedFd>,
}

impl VsockTransport {
    /// Take ownership of an already-connected vsock (or any stream)
    /// descriptor.
    pub fn new(endpoint: OwnedFd) -> Self {
        Self {
            endpoint: Some(endpoint),
        }
    }

    /// Duplicate the endpoint for a consumer. The duplicate may be closed
    /// by the consumer at any time without affecting the transport's own
    /// endpoint or the peer's view of the connection.
    pub fn hand_off(&self) -> Result<OwnedFd> {
        let fd = self.raw_fd()?;
        let dup = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
        if dup < 0 {
            return Err(crate::error::Error::Io(io::Error::last_os_error()));
        }
        Ok(unsafe { OwnedFd::from_raw_fd(dup) })
    }

    fn raw_fd(&self) -> Result<RawFd> {
        match &self.endpoint {
            Some(fd) => Ok(fd.as_raw_fd()),
            None => Err(crate::error::Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "vsock transport already closed",
            ))),
        }
    }

    /// Close the transport's own endpoint. Safe to call after consumers
    /// have already closed their duplicates; the peer observes EOF only
    /// once this has happened and every duplicate is also closed.
    pub fn close(&mut self) {
        self.endpoint = None;
    }

    pub fn is_closed(&self) -> bool {
        self.endpoint.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::FromRawFd;

    fn socketpair() -> (OwnedFd, OwnedFd) {
        let mut fds = [0i32; 2];
        let ret = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
        assert_eq!(ret, 0);
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
    }

    #[test]
    fn dup_survives_consumer_close_peer_sees_eof_only_after_transport_close() {
        let (peer, endpoint) = socketpair();
        let mut transport = VsockTransport::new(endpoint);

        let dup = transport.hand_off().unwrap();
        drop(dup);

        // peer write still succeeds: transport's own endpoint is still open.
        let byte = [7u8];
        let n = unsafe { libc::write(peer.as_raw_fd(), byte.as_ptr() as *const _, 1) };
        assert_eq!(n, 1);

        transport.close();

        // drain, then observe EOF.
        let mut buf = [0u8; 1];
        loop {
            let n = unsafe { libc::read(peer.as_raw_fd(), buf.as_mut_ptr() as *mut _, 1) };
            if n == 0 {
                break;
            }
            assert!(n > 0);
        }
    }
}
