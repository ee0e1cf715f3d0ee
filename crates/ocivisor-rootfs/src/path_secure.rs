//! Safe-path primitives: in-root symlink resolution, secure mkdir, and
//! recursive secure unlink, all relative to an open root directory
//! descriptor so a malicious rootfs tree can't walk a caller out of it.

use crate::error::{Error, Result};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use nix::dir::{Dir, Type};
    use nix::errno::Errno;
    use nix::fcntl::{openat, OFlag};
    use nix::sys::stat::{mkdirat, mknodat, Mode, SFlag};
    use nix::unistd::unlinkat;
    use nix::unistd::UnlinkatFlags;
    use std::os::fd::FromRawFd;

    #[repr(C)]
    struct OpenHow {
        flags: u64,
        mode: u64,
        resolve: u64,
    }

    const RESOLVE_IN_ROOT: u64 = 0x10;

    /// Open `relpath` under `root_fd`, confining symlink traversal to the
    /// subtree rooted at `root_fd` via the kernel's `openat2` facility.
    pub fn open_in_root(root_fd: RawFd, relpath: &str, oflags: i32, mode: u32) -> Result<OwnedFd> {
        let cpath = std::ffi::CString::new(relpath)
            .map_err(|_| Error::InvalidRelativePath(relpath.to_string()))?;
        let how = OpenHow {
            flags: oflags as u64,
            mode: mode as u64,
            resolve: RESOLVE_IN_ROOT,
        };
        let how_size = std::mem::size_of::<OpenHow>();
        let ret = unsafe {
            libc::syscall(
                libc::SYS_openat2,
                root_fd,
                cpath.as_ptr(),
                &how as *const OpenHow,
                how_size,
            )
        };
        if ret < 0 {
            return Err(Error::kernel("openat2", errno_value()));
        }
        Ok(unsafe { OwnedFd::from_raw_fd(ret as RawFd) })
    }

    fn errno_value() -> i32 {
        std::io::Error::last_os_error().raw_os_error().unwrap_or(-1)
    }

    /// Descend `components` under `root_fd`, creating missing intermediate
    /// directories and the final leaf (file or directory), returning an open
    /// descriptor to the leaf. Every intermediate descriptor is closed; only
    /// the leaf survives, including on the error path.
    pub fn secure_resolve(root_fd: RawFd, components: &[String], leaf_is_file: bool) -> Result<OwnedFd> {
        if components.is_empty() {
            return Err(Error::InvalidRelativePath(String::new()));
        }

        let mut current: OwnedFd = dup_fd(root_fd)?;
        for name in &components[..components.len() - 1] {
            let next = open_or_create_dir(current.as_raw_fd(), name)?;
            current = next;
        }

        let leaf_name = &components[components.len() - 1];
        let leaf = open_or_create_leaf(current.as_raw_fd(), leaf_name, leaf_is_file)?;
        Ok(leaf)
    }

    fn dup_fd(fd: RawFd) -> Result<OwnedFd> {
        let dup = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
        if dup < 0 {
            return Err(Error::kernel("fcntl(F_DUPFD_CLOEXEC)", errno_value()));
        }
        Ok(unsafe { OwnedFd::from_raw_fd(dup) })
    }

    fn open_or_create_dir(parent: RawFd, name: &str) -> Result<OwnedFd> {
        match openat(
            parent,
            name,
            OFlag::O_DIRECTORY | OFlag::O_NOFOLLOW | OFlag::O_CLOEXEC,
            Mode::empty(),
        ) {
            Ok(fd) => Ok(unsafe { OwnedFd::from_raw_fd(fd) }),
            Err(Errno::ENOENT) => {
                match mkdirat(parent, name, Mode::from_bits_truncate(0o755)) {
                    Ok(()) | Err(Errno::EEXIST) => {}
                    Err(e) => return Err(Error::kernel("mkdirat", e as i32)),
                }
                let fd = openat(
                    parent,
                    name,
                    OFlag::O_DIRECTORY | OFlag::O_NOFOLLOW | OFlag::O_CLOEXEC,
                    Mode::empty(),
                )
                .map_err(|e| Error::kernel("openat", e as i32))?;
                Ok(unsafe { OwnedFd::from_raw_fd(fd) })
            }
            Err(e) => Err(Error::kernel("openat", e as i32)),
        }
    }

    fn open_or_create_leaf(parent: RawFd, name: &str, leaf_is_file: bool) -> Result<OwnedFd> {
        let want_flags = if leaf_is_file {
            OFlag::O_NOFOLLOW | OFlag::O_CLOEXEC
        } else {
            OFlag::O_DIRECTORY | OFlag::O_NOFOLLOW | OFlag::O_CLOEXEC
        };

        match openat(parent, name, want_flags, Mode::empty()) {
            Ok(fd) => return Ok(unsafe { OwnedFd::from_raw_fd(fd) }),
            Err(Errno::ENOENT) => {}
            Err(e) => return Err(Error::kernel("openat", e as i32)),
        }

        if leaf_is_file {
            match mknodat(
                parent,
                name,
                SFlag::S_IFREG,
                Mode::from_bits_truncate(0o644),
                0,
            ) {
                Ok(()) | Err(Errno::EEXIST) => {}
                Err(e) => return Err(Error::kernel("mknodat", e as i32)),
            }
        } else {
            match mkdirat(parent, name, Mode::from_bits_truncate(0o755)) {
                Ok(()) | Err(Errno::EEXIST) => {}
                Err(e) => return Err(Error::kernel("mkdirat", e as i32)),
            }
        }

        let fd = openat(parent, name, want_flags, Mode::empty())
            .map_err(|e| Error::kernel("openat", e as i32))?;
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    /// Refuses `.` and `..`; removes `name` under `parent` recursively.
    pub fn unlink_recursive_secure(parent: RawFd, name: &str) -> Result<()> {
        if name == "." || name == ".." {
            return Err(Error::RefusedName(name.to_string()));
        }

        let dir_fd = match openat(
            parent,
            name,
            OFlag::O_DIRECTORY | OFlag::O_NOFOLLOW | OFlag::O_CLOEXEC,
            Mode::empty(),
        ) {
            Ok(fd) => Some(fd),
            Err(Errno::ENOTDIR) => None,
            Err(Errno::ENOENT) => return Ok(()),
            Err(e) => return Err(Error::kernel("openat", e as i32)),
        };

        match dir_fd {
            Some(fd) => {
                let owned = unsafe { OwnedFd::from_raw_fd(fd) };
                let mut dir = Dir::from_fd(unsafe { libc::dup(owned.as_raw_fd()) })
                    .map_err(|e| Error::kernel("fdopendir", e as i32))?;
                let children: Vec<(String, Option<Type>)> = dir
                    .iter()
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| {
                        let fname = entry.file_name().to_str()?.to_string();
                        if fname == "." || fname == ".." {
                            None
                        } else {
                            Some((fname, entry.file_type()))
                        }
                    })
                    .collect();
                drop(dir);

                for (child, _) in &children {
                    unlink_recursive_secure(owned.as_raw_fd(), child)?;
                }

                unlinkat(Some(parent), name, UnlinkatFlags::RemoveDir)
                    .map_err(|e| Error::kernel("unlinkat", e as i32))?;
            }
            None => {
                unlinkat(Some(parent), name, UnlinkatFlags::NoRemoveDir)
                    .map_err(|e| Error::kernel("unlinkat", e as i32))?;
            }
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
pub use linux::{open_in_root, secure_resolve, unlink_recursive_secure};

/// Collapse `.`/empty components and cancel `..` against preceding
/// components. A `..` that does not fully cancel (would escape the root)
/// is rejected.
pub fn normalize_relative(path: &str) -> Result<Vec<String>> {
    let mut stack: Vec<String> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                if stack.pop().is_none() {
                    return Err(Error::InvalidRelativePath(path.to_string()));
                }
            }
            other => stack.push(other.to_string()),
        }
    }
    Ok(stack)
}

/// Run `body` with an open descriptor to the directory at `relpath` under
/// `root_fd`, refusing escapes and (unless `make_intermediates`) missing
/// intermediate path components.
pub fn mkdir_secure<T>(
    root_fd: RawFd,
    relpath: &str,
    make_intermediates: bool,
    body: impl FnOnce(RawFd) -> Result<T>,
) -> Result<T> {
    let components = normalize_relative(relpath)?;
    if components.is_empty() {
        return body(root_fd);
    }

    #[cfg(target_os = "linux")]
    {
        if !make_intermediates && components.len() > 1 {
            // Verify every intermediate already exists without creating any.
            let mut current = dup_root(root_fd)?;
            for name in &components[..components.len() - 1] {
                current = linux::open_in_root(
                    current.as_raw_fd(),
                    name,
                    libc::O_DIRECTORY | libc::O_NOFOLLOW,
                    0,
                )
                .map_err(|_| Error::MissingIntermediate(relpath.to_string()))?;
            }
        }

        let leaf = linux::secure_resolve(root_fd, &components, false)?;
        body(leaf.as_raw_fd())
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = make_intermediates;
        body(root_fd)
    }
}

#[cfg(target_os = "linux")]
fn dup_root(fd: RawFd) -> Result<OwnedFd> {
    use std::os::fd::FromRawFd;
    let dup = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
    if dup < 0 {
        return Err(Error::kernel(
            "fcntl(F_DUPFD_CLOEXEC)",
            std::io::Error::last_os_error().raw_os_error().unwrap_or(-1),
        ));
    }
    Ok(unsafe { OwnedFd::from_raw_fd(dup) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dot_and_empty() {
        assert_eq!(
            normalize_relative("a/./b//c").unwrap(),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn normalize_cancels_parent_refs() {
        assert_eq!(
            normalize_relative("a/b/../c").unwrap(),
            vec!["a".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn normalize_rejects_escape() {
        assert!(normalize_relative("../escape").is_err());
        assert!(normalize_relative("a/../../escape").is_err());
    }
}
