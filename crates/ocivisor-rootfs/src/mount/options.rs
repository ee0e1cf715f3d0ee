//! fstab-style mount option parsing: keyword-to-flag table and the
//! data-string accumulator.

use crate::error::{Error, Result};

pub const MS_RDONLY: u64 = 1;
pub const MS_NOSUID: u64 = 2;
pub const MS_NODEV: u64 = 4;
pub const MS_NOEXEC: u64 = 8;
pub const MS_SYNCHRONOUS: u64 = 16;
pub const MS_REMOUNT: u64 = 32;
pub const MS_MANDLOCK: u64 = 64;
pub const MS_DIRSYNC: u64 = 128;
pub const MS_NOATIME: u64 = 1024;
pub const MS_NODIRATIME: u64 = 2048;
pub const MS_BIND: u64 = 4096;
pub const MS_REC: u64 = 16384;
pub const MS_SILENT: u64 = 1 << 15;
pub const MS_RELATIME: u64 = 1 << 21;
pub const MS_STRICTATIME: u64 = 1 << 24;

pub const MS_SHARED: u64 = 1 << 20;
pub const MS_PRIVATE: u64 = 1 << 18;
pub const MS_SLAVE: u64 = 1 << 19;
pub const MS_UNBINDABLE: u64 = 1 << 17;
pub const MS_PROPAGATION: u64 = MS_SHARED | MS_PRIVATE | MS_SLAVE | MS_UNBINDABLE;

/// One page, the traditional cap on the `mount(2)` `data` argument.
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

/// `(keyword, clears, flag)` table per spec.md §4.4.
const KEYWORDS: &[(&str, bool, u64)] = &[
    ("async", true, MS_SYNCHRONOUS),
    ("atime", true, MS_NOATIME),
    ("bind", false, MS_BIND),
    ("dev", true, MS_NODEV),
    ("diratime", true, MS_NODIRATIME),
    ("dirsync", false, MS_DIRSYNC),
    ("exec", true, MS_NOEXEC),
    ("mand", false, MS_MANDLOCK),
    ("noatime", false, MS_NOATIME),
    ("nodev", false, MS_NODEV),
    ("nodiratime", false, MS_NODIRATIME),
    ("noexec", false, MS_NOEXEC),
    ("nomand", true, MS_MANDLOCK),
    ("norelatime", true, MS_RELATIME),
    ("nostrictatime", true, MS_STRICTATIME),
    ("nosuid", false, MS_NOSUID),
    ("rbind", false, MS_BIND | MS_REC),
    ("relatime", false, MS_RELATIME),
    ("remount", false, MS_REMOUNT),
    ("ro", false, MS_RDONLY),
    ("rw", true, MS_RDONLY),
    ("strictatime", false, MS_STRICTATIME),
    ("suid", true, MS_NOSUID),
    ("sync", false, MS_SYNCHRONOUS),
];

/// Parsed mount options: a kernel flag bitmask plus the free-form `data`
/// string forwarded to `mount(2)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    pub flags: u64,
    pub data: String,
}

/// Parse an fstab-style option list into flags + data, per the keyword
/// table. Unrecognized options are forwarded verbatim as comma-joined data.
pub fn parse_options<'a>(options: impl IntoIterator<Item = &'a str>) -> Result<ParsedOptions> {
    let mut flags = 0u64;
    let mut data_parts = Vec::new();

    for opt in options {
        match KEYWORDS.iter().find(|(kw, _, _)| *kw == opt) {
            Some((_, clears, flag)) => {
                if *clears {
                    flags &= !flag;
                } else {
                    flags |= flag;
                }
            }
            None => data_parts.push(opt.to_string()),
        }
    }

    let data = data_parts.join(",");
    if data.len() > page_size() {
        return Err(Error::MountDataTooLarge { len: data.len() });
    }

    Ok(ParsedOptions { flags, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rbind_ro_nosuid_with_data() {
        let parsed = parse_options(["rbind", "ro", "nosuid", "foo=1"]).unwrap();
        assert_eq!(parsed.flags, MS_BIND | MS_REC | MS_RDONLY | MS_NOSUID);
        assert_eq!(parsed.data, "foo=1");
    }

    #[test]
    fn rbind_ro_noexec_uid() {
        let parsed = parse_options(["rbind", "ro", "noexec", "uid=1000"]).unwrap();
        assert_eq!(parsed.flags, MS_BIND | MS_REC | MS_RDONLY | MS_NOEXEC);
        assert_eq!(parsed.data, "uid=1000");
    }

    #[test]
    fn data_over_one_page_is_rejected() {
        let huge = "x".repeat(page_size() + 1);
        assert!(parse_options([huge.as_str()]).is_err());
    }

    #[test]
    fn rw_clears_rdonly() {
        let parsed = parse_options(["ro", "rw"]).unwrap();
        assert_eq!(parsed.flags, 0);
    }
}
