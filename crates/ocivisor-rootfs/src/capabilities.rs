//! Linux capability sets: a five-bitmask value type plus the `capset`/
//! `prctl` sequence needed to commit it to the kernel.
//!
//! Grounded on the raw `capget`/`capset`/`prctl(PR_CAP_AMBIENT*)` sequence
//! used by container attach helpers that clone another process's security
//! context bit for bit.

use crate::error::{Error, Result};

/// A named Linux capability. Values are the fixed kernel bit indices
/// (`include/uapi/linux/capability.h`), extensible as the kernel adds more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Capability {
    Chown = 0,
    DacOverride = 1,
    DacReadSearch = 2,
    Fowner = 3,
    Fsetid = 4,
    Kill = 5,
    Setgid = 6,
    Setuid = 7,
    Setpcap = 8,
    LinuxImmutable = 9,
    NetBindService = 10,
    NetBroadcast = 11,
    NetAdmin = 12,
    NetRaw = 13,
    IpcLock = 14,
    IpcOwner = 15,
    SysModule = 16,
    SysRawio = 17,
    SysChroot = 18,
    SysPtrace = 19,
    SysPacct = 20,
    SysAdmin = 21,
    SysBoot = 22,
    SysNice = 23,
    SysResource = 24,
    SysTime = 25,
    SysTtyConfig = 26,
    Mknod = 27,
    Lease = 28,
    AuditWrite = 29,
    AuditControl = 30,
    Setfcap = 31,
    MacOverride = 32,
    MacAdmin = 33,
    Syslog = 34,
    WakeAlarm = 35,
    BlockSuspend = 36,
    AuditRead = 37,
    Perfmon = 38,
    Bpf = 39,
    CheckpointRestore = 40,
}

impl Capability {
    pub fn bit(self) -> u8 {
        self as u8
    }
}

/// Which of the five sets an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Set {
    Effective,
    Permitted,
    Inheritable,
    Bounding,
    Ambient,
}

/// Grouped bulk operations over related sets, per spec.md §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Effective + permitted (+ inheritable, cleared on fill).
    Caps,
    Bounds,
    Ambs,
}

/// The five 64-bit capability bitmasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub effective: u64,
    pub permitted: u64,
    pub inheritable: u64,
    pub bounding: u64,
    pub ambient: u64,
}

fn mask_mut(caps: &mut Capabilities, which: Set) -> &mut u64 {
    match which {
        Set::Effective => &mut caps.effective,
        Set::Permitted => &mut caps.permitted,
        Set::Inheritable => &mut caps.inheritable,
        Set::Bounding => &mut caps.bounding,
        Set::Ambient => &mut caps.ambient,
    }
}

fn mask(caps: &Capabilities, which: Set) -> u64 {
    match which {
        Set::Effective => caps.effective,
        Set::Permitted => caps.permitted,
        Set::Inheritable => caps.inheritable,
        Set::Bounding => caps.bounding,
        Set::Ambient => caps.ambient,
    }
}

impl Capabilities {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Non-mutating bit test.
    pub fn get(&self, which: Set, name: Capability) -> bool {
        mask(self, which) & (1u64 << name.bit()) != 0
    }

    /// Raise the named bits in `which`.
    pub fn set(&mut self, which: Set, names: &[Capability]) {
        let m = mask_mut(self, which);
        for name in names {
            *m |= 1u64 << name.bit();
        }
    }

    /// Clear the named bits in `which`.
    pub fn unset(&mut self, which: Set, names: &[Capability]) {
        let m = mask_mut(self, which);
        for name in names {
            *m &= !(1u64 << name.bit());
        }
    }

    /// Set the masks addressed by `kind` to all-ones (inheritable is
    /// cleared, not raised, when `kind == Caps`).
    pub fn fill(&mut self, kind: Kind) {
        match kind {
            Kind::Caps => {
                self.effective = u64::MAX;
                self.permitted = u64::MAX;
                self.inheritable = 0;
            }
            Kind::Bounds => self.bounding = u64::MAX,
            Kind::Ambs => self.ambient = u64::MAX,
        }
    }

    /// Zero the masks addressed by `kind`.
    pub fn clear(&mut self, kind: Kind) {
        match kind {
            Kind::Caps => {
                self.effective = 0;
                self.permitted = 0;
                self.inheritable = 0;
            }
            Kind::Bounds => self.bounding = 0,
            Kind::Ambs => self.ambient = 0,
        }
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::*;

    const _LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;

    #[repr(C)]
    struct CapUserHeader {
        version: u32,
        pid: i32,
    }

    #[repr(C)]
    #[derive(Default)]
    struct CapUserData {
        effective_lo: u32,
        permitted_lo: u32,
        inheritable_lo: u32,
        effective_hi: u32,
        permitted_hi: u32,
        inheritable_hi: u32,
    }

    fn last_os_errno() -> i32 {
        std::io::Error::last_os_error().raw_os_error().unwrap_or(-1)
    }

    /// Highest capability bit the running kernel recognizes.
    pub fn cap_last_cap() -> Result<u8> {
        let raw = std::fs::read_to_string("/proc/sys/kernel/cap_last_cap")?;
        raw.trim()
            .parse::<u8>()
            .map_err(|_| Error::kernel("cap_last_cap", 0))
    }

    /// Read the process's current effective/permitted/inheritable sets.
    /// Per spec.md §4.5 only the packed representation's low 32 bits are
    /// loaded (sufficient for the capabilities enumerated here).
    pub fn load() -> Result<Capabilities> {
        let hdr = CapUserHeader {
            version: _LINUX_CAPABILITY_VERSION_3,
            pid: 0,
        };
        let mut data = [CapUserData::default(), CapUserData::default()];
        let ret = unsafe {
            libc::syscall(
                libc::SYS_capget,
                &hdr as *const CapUserHeader,
                data.as_mut_ptr(),
            )
        };
        if ret < 0 {
            return Err(Error::kernel("capget", last_os_errno()));
        }
        Ok(Capabilities {
            effective: data[0].effective_lo as u64,
            permitted: data[0].permitted_lo as u64,
            inheritable: data[0].inheritable_lo as u64,
            bounding: 0,
            ambient: 0,
        })
    }

    fn capset(caps: &Capabilities) -> Result<()> {
        let hdr = CapUserHeader {
            version: _LINUX_CAPABILITY_VERSION_3,
            pid: 0,
        };
        let data = CapUserData {
            effective_lo: (caps.effective & 0xffff_ffff) as u32,
            permitted_lo: (caps.permitted & 0xffff_ffff) as u32,
            inheritable_lo: (caps.inheritable & 0xffff_ffff) as u32,
            effective_hi: (caps.effective >> 32) as u32,
            permitted_hi: (caps.permitted >> 32) as u32,
            inheritable_hi: (caps.inheritable >> 32) as u32,
        };
        let ret = unsafe {
            libc::syscall(
                libc::SYS_capset,
                &hdr as *const CapUserHeader,
                &data as *const CapUserData,
            )
        };
        if ret < 0 {
            return Err(Error::kernel("capset", last_os_errno()));
        }
        Ok(())
    }

    fn prctl_bounds_drop(cap: u8) -> Result<()> {
        let ret = unsafe { libc::prctl(libc::PR_CAPBSET_DROP, cap as libc::c_ulong, 0, 0, 0) };
        if ret < 0 {
            let errno = last_os_errno();
            if errno == libc::EINVAL {
                return Ok(());
            }
            return Err(Error::kernel("prctl(PR_CAPBSET_DROP)", errno));
        }
        Ok(())
    }

    fn prctl_ambient_clear_all() -> Result<()> {
        let ret = unsafe { libc::prctl(libc::PR_CAP_AMBIENT, libc::PR_CAP_AMBIENT_CLEAR_ALL, 0, 0, 0) };
        if ret < 0 {
            return Err(Error::kernel("prctl(PR_CAP_AMBIENT_CLEAR_ALL)", last_os_errno()));
        }
        Ok(())
    }

    fn prctl_ambient_raise(cap: u8) -> Result<()> {
        let ret = unsafe {
            libc::prctl(libc::PR_CAP_AMBIENT, libc::PR_CAP_AMBIENT_RAISE, cap as libc::c_ulong, 0, 0)
        };
        if ret < 0 {
            return Err(Error::kernel("prctl(PR_CAP_AMBIENT_RAISE)", last_os_errno()));
        }
        Ok(())
    }

    /// Commit the masks addressed by `kind` to the kernel, in the order
    /// mandated by spec.md §4.5: bounding first (only if `SETPCAP` is held),
    /// then effective/permitted/inheritable via `capset`, then ambient.
    pub fn apply(caps: &Capabilities, kind: Kind) -> Result<()> {
        match kind {
            Kind::Bounds => {
                let current = load()?;
                if current.get(Set::Effective, Capability::Setpcap) {
                    let last = cap_last_cap()?;
                    for bit in 0..=last {
                        if caps.bounding & (1u64 << bit) == 0 {
                            prctl_bounds_drop(bit)?;
                        }
                    }
                }
            }
            Kind::Caps => capset(caps)?,
            Kind::Ambs => {
                prctl_ambient_clear_all()?;
                let last = cap_last_cap()?;
                for bit in 0..=last {
                    if caps.ambient & (1u64 << bit) != 0 {
                        prctl_ambient_raise(bit)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Wrap a `setuid`-style privilege drop so capabilities are not lost
    /// across the uid change, per spec.md §4.5.
    pub fn around_setuid<T>(body: impl FnOnce() -> Result<T>) -> Result<T> {
        let ret = unsafe { libc::prctl(libc::PR_SET_KEEPCAPS, 1, 0, 0, 0) };
        if ret < 0 {
            return Err(Error::kernel("prctl(PR_SET_KEEPCAPS=1)", last_os_errno()));
        }
        let result = body();
        let ret = unsafe { libc::prctl(libc::PR_SET_KEEPCAPS, 0, 0, 0, 0) };
        if ret < 0 {
            return Err(Error::kernel("prctl(PR_SET_KEEPCAPS=0)", last_os_errno()));
        }
        result
    }
}

#[cfg(target_os = "linux")]
pub use linux::{apply, around_setuid, cap_last_cap, load};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_and_clear_caps() {
        let mut caps = Capabilities::empty();
        caps.fill(Kind::Caps);
        assert_eq!(caps.effective, u64::MAX);
        assert_eq!(caps.permitted, u64::MAX);
        assert_eq!(caps.inheritable, 0);
        assert_eq!(caps.bounding, 0);
        assert_eq!(caps.ambient, 0);

        caps.clear(Kind::Caps);
        assert_eq!(caps.effective, 0);
        assert_eq!(caps.permitted, 0);
        assert_eq!(caps.inheritable, 0);
    }

    #[test]
    fn set_and_unset_single_bits() {
        let mut caps = Capabilities::empty();
        caps.set(Set::Effective, &[Capability::NetBindService, Capability::Chown]);
        assert!(caps.get(Set::Effective, Capability::NetBindService));
        assert!(caps.get(Set::Effective, Capability::Chown));
        assert!(!caps.get(Set::Effective, Capability::SysAdmin));

        caps.unset(Set::Effective, &[Capability::Chown]);
        assert!(!caps.get(Set::Effective, Capability::Chown));
    }
}
