//! Mount sequencing: initial mount, propagation change, bind-readonly
//! remount, against a target securely resolved under an optional root.

use super::options::{parse_options, ParsedOptions, MS_BIND, MS_PROPAGATION, MS_RDONLY, MS_REC, MS_REMOUNT, MS_SILENT};
use crate::error::{Error, Result};
use std::os::fd::RawFd;

/// A single mount request: filesystem type, source, target and fstab-style
/// option keywords.
#[derive(Debug, Clone)]
pub struct MountSpec {
    pub fstype: String,
    pub source: String,
    pub target: String,
    pub options: Vec<String>,
}

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use crate::path_secure;
    use nix::mount::{mount, MsFlags};
    use nix::sys::stat::stat;

    fn mount_raw(
        source: Option<&str>,
        target: &str,
        fstype: Option<&str>,
        flags: u64,
        data: Option<&str>,
    ) -> Result<()> {
        mount(
            source,
            target,
            fstype,
            MsFlags::from_bits_truncate(flags as libc::c_ulong as _),
            data,
        )
        .map_err(|e| Error::kernel("mount", e as i32))
    }

    fn source_is_regular_file(source: &str) -> bool {
        stat(source).map(|st| st.st_mode & libc::S_IFMT == libc::S_IFREG).unwrap_or(false)
    }

    /// Resolve `target` securely under `root_fd`, creating the missing leaf
    /// if needed, and return its canonical path as seen from this process.
    fn resolve_target(root_fd: RawFd, target: &str, source: &str, flags: u64) -> Result<String> {
        let components = path_secure::normalize_relative(target)?;
        let leaf_is_file = flags & MS_BIND != 0 && source_is_regular_file(source);
        let leaf_fd = path_secure::secure_resolve(root_fd, &components, leaf_is_file)?;

        use std::os::fd::AsRawFd;
        let link = format!("/proc/self/fd/{}", leaf_fd.as_raw_fd());
        std::fs::read_link(&link)
            .map(|p| p.to_string_lossy().into_owned())
            .map_err(Error::Io)
    }

    /// Execute the four-step mount sequence of spec.md §4.4 against `spec`,
    /// whose target is resolved under `root_fd` when given, else used verbatim.
    pub fn mount_sequence(root_fd: Option<RawFd>, spec: &MountSpec) -> Result<()> {
        let parsed: ParsedOptions =
            parse_options(spec.options.iter().map(|s| s.as_str()))?;
        let flags = parsed.flags;
        let data = parsed.data;

        let target_path = match root_fd {
            Some(fd) => resolve_target(fd, &spec.target, &spec.source, flags)?,
            None => spec.target.clone(),
        };

        let propagation = flags & MS_PROPAGATION;
        let main_flags = flags & !MS_PROPAGATION;

        if flags & MS_REMOUNT == 0 || !data.is_empty() {
            mount_raw(
                Some(spec.source.as_str()),
                &target_path,
                Some(spec.fstype.as_str()),
                main_flags,
                if data.is_empty() { None } else { Some(data.as_str()) },
            )?;
        }

        if propagation != 0 {
            mount_raw(
                None,
                &target_path,
                None,
                flags & (MS_PROPAGATION | MS_REC | MS_SILENT),
                None,
            )?;
        }

        if main_flags & MS_BIND != 0 && main_flags & MS_RDONLY != 0 {
            mount_raw(None, &target_path, None, main_flags | MS_REMOUNT, None)?;
        }

        Ok(())
    }
}

#[cfg(target_os = "linux")]
pub use linux::mount_sequence;

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::options::{MS_BIND, MS_NOSUID, MS_RDONLY, MS_REC};

    #[test]
    fn propagation_split_from_main_flags() {
        let parsed = parse_options(["rbind", "ro", "nosuid"]).unwrap();
        let main_flags = parsed.flags & !MS_PROPAGATION;
        assert_eq!(main_flags, MS_BIND | MS_REC | MS_RDONLY | MS_NOSUID);
        assert_eq!(parsed.flags & MS_PROPAGATION, 0);
    }
}
