//! Container launch sequence: layer extraction under a secure root
//! descriptor, the mount sequence, pivot-root, capability application, and
//! the final `execve` of the contained process.
//!
//! Everything up to and including `pivot_root` runs in the agent's own
//! process (there is exactly one container per guest, so the whole mount
//! namespace is the container's); capabilities are applied in the child's
//! `pre_exec`, after `fork` but before `exec`, so the agent itself keeps
//! whatever privilege it started with.

use crate::error::{Error, Result};
use crate::pty;
use ocivisor_oci::runtime_spec::{Process, RuntimeSpec};
use ocivisor_rootfs::capabilities::{self, Capabilities as Bitmask, Capability, Kind, Set};
use ocivisor_rootfs::mount::{mount_sequence, MountSpec};
use std::ffi::CString;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use tracing::debug;

/// The spawned contained process, plus the agent-side end of its
/// bidirectional stdio channel (a PTY master or a `socketpair` half).
pub struct Launched {
    pub child: Child,
    pub io_fd: OwnedFd,
}

/// Run the full launch sequence for `spec` against a rootfs already staged
/// at `rootfs`, extracting `layers` (lowest first) beforehand.
pub fn launch(spec: &RuntimeSpec, rootfs: &Path, layers: &[PathBuf]) -> Result<Launched> {
    std::fs::create_dir_all(rootfs)?;

    {
        let root_fd = open_root_dir(rootfs)?;
        extract_layers(root_fd.as_raw_fd(), layers)?;

        for mount in &spec.mounts {
            let mount_spec = MountSpec {
                fstype: mount.mount_type.clone().unwrap_or_default(),
                source: mount.source.clone(),
                target: mount.destination.clone(),
                options: mount.options.clone(),
            };
            mount_sequence(Some(root_fd.as_raw_fd()), &mount_spec)?;
        }
    }

    pivot_into(rootfs)?;

    let process = spec.process.as_ref().ok_or(Error::NoProcess)?;
    spawn_process(process)
}

fn open_root_dir(path: &Path) -> Result<OwnedFd> {
    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "rootfs path contains NUL")))?;
    let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_DIRECTORY | libc::O_CLOEXEC) };
    if fd < 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn extract_layers(root_fd: RawFd, layers: &[PathBuf]) -> Result<()> {
    let borrowed = unsafe { BorrowedFd::borrow_raw(root_fd) };
    for layer in layers {
        debug!(layer = %layer.display(), "extracting layer");
        let file = std::fs::File::open(layer)?;
        ocivisor_tar::unpack_into(std::io::BufReader::new(file), borrowed)?;
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn pivot_into(rootfs: &Path) -> Result<()> {
    use nix::mount::{mount, umount2, MntFlags, MsFlags};
    use nix::unistd::{chdir, pivot_root};

    let to_pivot_err = |e: nix::Error| Error::PivotRoot(std::io::Error::from_raw_os_error(e as i32));

    // pivot_root requires the new root to be a mount point in its own
    // right; a recursive self-bind makes an ordinary directory one.
    mount(Some(rootfs), rootfs, None::<&str>, MsFlags::MS_BIND | MsFlags::MS_REC, None::<&str>)
        .map_err(to_pivot_err)?;

    let put_old = rootfs.join(".ocivisor-old-root");
    std::fs::create_dir_all(&put_old)?;

    chdir(rootfs).map_err(to_pivot_err)?;
    pivot_root(".", ".ocivisor-old-root").map_err(to_pivot_err)?;
    chdir("/").map_err(to_pivot_err)?;

    umount2("/.ocivisor-old-root", MntFlags::MNT_DETACH).map_err(to_pivot_err)?;
    let _ = std::fs::remove_dir("/.ocivisor-old-root");

    Ok(())
}

fn spawn_process(process: &Process) -> Result<Launched> {
    let (program, rest) = process.args.split_first().ok_or(Error::NoProcess)?;

    let mut command = Command::new(program);
    command.args(rest).current_dir(&process.cwd).env_clear();
    for entry in &process.env {
        if let Some((key, value)) = entry.split_once('=') {
            command.env(key, value);
        }
    }
    command.uid(process.user.uid).gid(process.user.gid);

    let translated = process.capabilities.as_ref().map(translate_capabilities);

    if process.terminal {
        let (master, slave) = pty::open_pty(80, 24)?;
        let slave_raw = slave.as_raw_fd();
        let mut attach_pty = pty::slave_pre_exec(slave_raw);
        unsafe {
            command.pre_exec(move || {
                attach_pty()?;
                if let Some(caps) = &translated {
                    apply_translated(caps)?;
                }
                Ok(())
            });
        }
        let child = spawn_keeping_caps(&mut command)?;
        drop(slave);
        Ok(Launched { child, io_fd: master.into_owned_fd() })
    } else {
        let (agent_end, child_end) = socketpair()?;
        let child_raw = child_end.as_raw_fd();
        unsafe {
            command.pre_exec(move || {
                attach_stdio(child_raw)?;
                if let Some(caps) = &translated {
                    apply_translated(caps)?;
                }
                Ok(())
            });
        }
        let child = spawn_keeping_caps(&mut command)?;
        drop(child_end);
        Ok(Launched { child, io_fd: agent_end })
    }
}

/// Spawn `command`, wrapping the fork+uid/gid-change+exec sequence in
/// `PR_SET_KEEPCAPS` so the kernel does not clear the capability sets
/// `apply_translated`'s `pre_exec` closure raises when the child's uid
/// changes away from root.
fn spawn_keeping_caps(command: &mut Command) -> Result<Child> {
    capabilities::around_setuid(|| command.spawn().map_err(ocivisor_rootfs::Error::from))
        .map_err(Error::Rootfs)
}

fn socketpair() -> std::io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0i32; 2];
    let ret = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
    if ret < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/// Dup `fd` onto stdin/stdout/stderr, mirroring `pty::slave_pre_exec`'s
/// dup2-then-close-original pattern for the non-terminal case.
fn attach_stdio(fd: RawFd) -> std::io::Result<()> {
    for &target in &[0, 1, 2] {
        if fd != target && unsafe { libc::dup2(fd, target) } < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    if fd > 2 {
        unsafe { libc::close(fd) };
    }
    Ok(())
}

fn capability_from_name(name: &str) -> Option<Capability> {
    let bare = name.strip_prefix("CAP_").unwrap_or(name).to_ascii_uppercase();
    Some(match bare.as_str() {
        "CHOWN" => Capability::Chown,
        "DAC_OVERRIDE" => Capability::DacOverride,
        "DAC_READ_SEARCH" => Capability::DacReadSearch,
        "FOWNER" => Capability::Fowner,
        "FSETID" => Capability::Fsetid,
        "KILL" => Capability::Kill,
        "SETGID" => Capability::Setgid,
        "SETUID" => Capability::Setuid,
        "SETPCAP" => Capability::Setpcap,
        "LINUX_IMMUTABLE" => Capability::LinuxImmutable,
        "NET_BIND_SERVICE" => Capability::NetBindService,
        "NET_BROADCAST" => Capability::NetBroadcast,
        "NET_ADMIN" => Capability::NetAdmin,
        "NET_RAW" => Capability::NetRaw,
        "IPC_LOCK" => Capability::IpcLock,
        "IPC_OWNER" => Capability::IpcOwner,
        "SYS_MODULE" => Capability::SysModule,
        "SYS_RAWIO" => Capability::SysRawio,
        "SYS_CHROOT" => Capability::SysChroot,
        "SYS_PTRACE" => Capability::SysPtrace,
        "SYS_PACCT" => Capability::SysPacct,
        "SYS_ADMIN" => Capability::SysAdmin,
        "SYS_BOOT" => Capability::SysBoot,
        "SYS_NICE" => Capability::SysNice,
        "SYS_RESOURCE" => Capability::SysResource,
        "SYS_TIME" => Capability::SysTime,
        "SYS_TTY_CONFIG" => Capability::SysTtyConfig,
        "MKNOD" => Capability::Mknod,
        "LEASE" => Capability::Lease,
        "AUDIT_WRITE" => Capability::AuditWrite,
        "AUDIT_CONTROL" => Capability::AuditControl,
        "SETFCAP" => Capability::Setfcap,
        "MAC_OVERRIDE" => Capability::MacOverride,
        "MAC_ADMIN" => Capability::MacAdmin,
        "SYSLOG" => Capability::Syslog,
        "WAKE_ALARM" => Capability::WakeAlarm,
        "BLOCK_SUSPEND" => Capability::BlockSuspend,
        "AUDIT_READ" => Capability::AuditRead,
        "PERFMON" => Capability::Perfmon,
        "BPF" => Capability::Bpf,
        "CHECKPOINT_RESTORE" => Capability::CheckpointRestore,
        _ => return None,
    })
}

/// Translate the OCI runtime spec's named capability sets into the
/// bitmask representation `ocivisor_rootfs::capabilities` commits to the
/// kernel. Unrecognized names are dropped rather than rejected, since a
/// future kernel's capability list always outgrows this table.
fn translate_capabilities(oci: &ocivisor_oci::runtime_spec::Capabilities) -> Bitmask {
    let mut caps = Bitmask::empty();
    for (which, names) in [
        (Set::Bounding, &oci.bounding),
        (Set::Effective, &oci.effective),
        (Set::Inheritable, &oci.inheritable),
        (Set::Permitted, &oci.permitted),
        (Set::Ambient, &oci.ambient),
    ] {
        let resolved: Vec<Capability> = names.iter().filter_map(|n| capability_from_name(n)).collect();
        caps.set(which, &resolved);
    }
    caps
}

fn apply_translated(caps: &Bitmask) -> std::io::Result<()> {
    for kind in [Kind::Bounds, Kind::Caps, Kind::Ambs] {
        capabilities::apply(caps, kind).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_from_name_accepts_with_or_without_prefix() {
        assert_eq!(capability_from_name("CAP_SYS_ADMIN"), Some(Capability::SysAdmin));
        assert_eq!(capability_from_name("sys_admin"), Some(Capability::SysAdmin));
        assert_eq!(capability_from_name("not_a_capability"), None);
    }

    #[test]
    fn translate_capabilities_raises_only_resolved_bits() {
        let oci = ocivisor_oci::runtime_spec::Capabilities {
            bounding: vec!["CAP_CHOWN".to_string(), "CAP_BOGUS".to_string()],
            effective: vec!["CAP_CHOWN".to_string()],
            inheritable: Vec::new(),
            permitted: vec!["CAP_CHOWN".to_string()],
            ambient: Vec::new(),
        };
        let bitmask = translate_capabilities(&oci);
        assert!(bitmask.get(Set::Bounding, Capability::Chown));
        assert!(bitmask.get(Set::Effective, Capability::Chown));
        assert!(!bitmask.get(Set::Effective, Capability::SysAdmin));
    }
}
