//! Bidirectional byte relay between two file descriptors, with half-close
//! propagation and a single-writer completion signal.
//!
//! Each direction runs as its own tokio task driven by `AsyncFd` readiness;
//! the two tasks share only the teardown state below, guarded by a
//! `parking_lot::Mutex` held for pointer-like work only.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::unix::AsyncFd;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

fn page_size() -> usize {
    static PAGE_SIZE: std::sync::OnceLock<usize> = std::sync::OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        let ret = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if ret > 0 {
            ret as usize
        } else {
            4096
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    OneToTwo,
    TwoToOne,
}

#[derive(Default)]
struct TeardownState {
    dir1_done: bool,
    dir2_done: bool,
    closed: bool,
}

struct Shared {
    state: Mutex<TeardownState>,
    completion: Notify,
    waited: AtomicBool,
}

/// Owns both relayed descriptors until both directions have torn down.
///
/// The descriptors themselves are not stored here: each direction's task
/// holds the only references that matter, so they close as soon as both
/// tasks finish rather than whenever this handle happens to drop.
pub struct Relay {
    shared: Arc<Shared>,
    tasks: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn read_nonblocking(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
    if n >= 0 {
        Ok(n as usize)
    } else {
        Err(io::Error::last_os_error())
    }
}

fn write_nonblocking(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    let n = unsafe { libc::write(fd, buf.as_ptr() as *const _, buf.len()) };
    if n >= 0 {
        Ok(n as usize)
    } else {
        Err(io::Error::last_os_error())
    }
}

fn shutdown(fd: RawFd, how: i32) {
    unsafe {
        libc::shutdown(fd, how);
    }
}

impl Relay {
    /// Start relaying between `fd1` and `fd2`, spawning one tokio task per
    /// direction on the caller's runtime.
    pub fn new(fd1: OwnedFd, fd2: OwnedFd) -> Result<Self> {
        set_nonblocking(fd1.as_raw_fd())?;
        set_nonblocking(fd2.as_raw_fd())?;

        let fd1 = Arc::new(AsyncFd::new(fd1)?);
        let fd2 = Arc::new(AsyncFd::new(fd2)?);
        let shared = Arc::new(Shared {
            state: Mutex::new(TeardownState::default()),
            completion: Notify::new(),
            waited: AtomicBool::new(false),
        });

        let t1 = tokio::spawn(pump(fd1.clone(), fd2.clone(), shared.clone(), Direction::OneToTwo));
        let t2 = tokio::spawn(pump(fd2, fd1, shared.clone(), Direction::TwoToOne));

        Ok(Self {
            shared,
            tasks: Mutex::new(Some((t1, t2))),
        })
    }

    /// Idempotently cancel both subscriptions. Does not block; an in-flight
    /// copy may still complete.
    pub fn stop(&self) {
        if let Some((t1, t2)) = self.tasks.lock().take() {
            t1.abort();
            t2.abort();
        }
        finish_if_both_done(&self.shared, true, true);
    }

    /// Suspend until both directions have torn down and both descriptors
    /// are closed. Calling this twice is a programmer error.
    pub async fn wait_completion(&self) -> Result<()> {
        if self.shared.waited.swap(true, Ordering::SeqCst) {
            return Err(Error::DoubleWait);
        }
        loop {
            if self.shared.state.lock().closed {
                return Ok(());
            }
            self.shared.completion.notified().await;
        }
    }
}

async fn pump(src: Arc<AsyncFd<OwnedFd>>, dst: Arc<AsyncFd<OwnedFd>>, shared: Arc<Shared>, which: Direction) {
    let mut buf = vec![0u8; page_size()];
    loop {
        let mut guard = match src.readable().await {
            Ok(g) => g,
            Err(_) => break,
        };

        match guard.try_io(|inner| read_nonblocking(inner.as_raw_fd(), &mut buf)) {
            Ok(Ok(0)) => {
                shutdown(dst.as_raw_fd(), libc::SHUT_WR);
                break;
            }
            Ok(Ok(n)) => {
                drop(guard);
                if write_all(&dst, &buf[..n]).await.is_err() {
                    shutdown(dst.as_raw_fd(), libc::SHUT_RDWR);
                    break;
                }
            }
            Ok(Err(_)) => {
                shutdown(dst.as_raw_fd(), libc::SHUT_RDWR);
                break;
            }
            Err(_would_block) => continue,
        }
    }

    let (dir1, dir2) = match which {
        Direction::OneToTwo => (true, false),
        Direction::TwoToOne => (false, true),
    };
    finish_if_both_done(&shared, dir1, dir2);
}

async fn write_all(dst: &AsyncFd<OwnedFd>, buf: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < buf.len() {
        let mut guard = dst.writable().await?;
        match guard.try_io(|inner| write_nonblocking(inner.as_raw_fd(), &buf[written..])) {
            Ok(Ok(0)) => return Err(io::Error::new(io::ErrorKind::WriteZero, "dst accepted zero bytes")),
            Ok(Ok(n)) => written += n,
            Ok(Err(e)) => return Err(e),
            Err(_would_block) => continue,
        }
    }
    Ok(())
}

/// Marks the calling direction(s) done; if this call observes both
/// directions done, closes both descriptors and wakes the completion
/// waiter exactly once.
fn finish_if_both_done(shared: &Arc<Shared>, dir1: bool, dir2: bool) {
    let mut state = shared.state.lock();
    if dir1 {
        state.dir1_done = true;
    }
    if dir2 {
        state.dir2_done = true;
    }
    if state.dir1_done && state.dir2_done && !state.closed {
        state.closed = true;
        drop(state);
        shared.completion.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::FromRawFd;

    fn socketpair() -> (OwnedFd, OwnedFd) {
        let mut fds = [0i32; 2];
        let ret = unsafe {
            libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr())
        };
        assert_eq!(ret, 0);
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
    }

    #[tokio::test]
    async fn byte_mirror_and_teardown() {
        let (a, relay_end_a) = socketpair();
        let (relay_end_b, d) = socketpair();

        let relay = Relay::new(relay_end_a, relay_end_b).unwrap();

        let n = unsafe { libc::write(a.as_raw_fd(), [1u8, 2, 3].as_ptr() as *const _, 3) };
        assert_eq!(n, 3);

        let mut buf = [0u8; 3];
        let mut got = 0;
        while got < 3 {
            let n = unsafe {
                libc::read(d.as_raw_fd(), buf[got..].as_mut_ptr() as *mut _, 3 - got)
            };
            assert!(n > 0);
            got += n as usize;
        }
        assert_eq!(buf, [1, 2, 3]);

        unsafe {
            libc::shutdown(a.as_raw_fd(), libc::SHUT_WR);
        }
        unsafe {
            libc::shutdown(d.as_raw_fd(), libc::SHUT_WR);
        }

        relay.wait_completion().await.unwrap();
        assert!(relay.wait_completion().await.is_err());
    }
}
