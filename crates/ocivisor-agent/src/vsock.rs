//! Minimal `AF_VSOCK` listener and stream built directly on raw syscalls,
//! since neither `std` nor the workspace's `nix` version wrap vsock
//! addressing.

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

pub struct VsockListener {
    fd: OwnedFd,
}

pub struct VsockStream {
    fd: OwnedFd,
}

fn vsock_addr(cid: u32, port: u32) -> libc::sockaddr_vm {
    let mut addr: libc::sockaddr_vm = unsafe { mem::zeroed() };
    addr.svm_family = libc::AF_VSOCK as libc::sa_family_t;
    addr.svm_port = port;
    addr.svm_cid = cid;
    addr
}

impl VsockListener {
    /// Bind and listen on `port`, accepting connections from any CID.
    pub fn bind(port: u32) -> io::Result<Self> {
        let raw = unsafe { libc::socket(libc::AF_VSOCK, libc::SOCK_STREAM, 0) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let addr = vsock_addr(libc::VMADDR_CID_ANY, port);
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_vm>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        let ret = unsafe { libc::listen(fd.as_raw_fd(), 128) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { fd })
    }

    pub fn accept(&self) -> io::Result<VsockStream> {
        let conn = unsafe { libc::accept(self.fd.as_raw_fd(), std::ptr::null_mut(), std::ptr::null_mut()) };
        if conn < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(VsockStream {
            fd: unsafe { OwnedFd::from_raw_fd(conn) },
        })
    }
}

impl VsockStream {
    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Hand off ownership of the underlying fd (e.g. to `ocivisor_relay::VsockTransport`).
    pub fn into_owned_fd(self) -> OwnedFd {
        self.fd
    }
}

impl io::Read for VsockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr() as *mut _, buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }
}

impl io::Write for VsockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = unsafe { libc::write(self.fd.as_raw_fd(), buf.as_ptr() as *const _, buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
