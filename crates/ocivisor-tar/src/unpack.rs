//! Directory unpacking convenience: ingest a ustar/PAX archive under a
//! [`ocivisor_rootfs::path_secure`]-confined root, refusing to follow
//! symlinks out of it.

use crate::error::Result;
use crate::header::{EntryType, TarHeader};
use crate::reader::TarReader;
use ocivisor_rootfs::path_secure;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd};

/// Extract every entry from `reader` under `root_fd`.
///
/// Directories are created as encountered; regular file content is
/// streamed straight to the securely-resolved leaf. Symlinks, hard links,
/// devices and fifos are not materialized (this mirrors what the in-guest
/// agent actually needs from an OCI layer: ordinary files and directories).
pub fn unpack_into<R: Read>(reader: R, root_fd: BorrowedFd<'_>) -> Result<()> {
    let root_fd = root_fd.as_raw_fd();
    let mut tar = TarReader::new(reader);
    while let Some(header) = tar.next_header()? {
        extract_entry(root_fd, &header, &mut tar)?;
    }
    Ok(())
}

fn extract_entry<R: Read>(
    root_fd: std::os::fd::RawFd,
    header: &TarHeader,
    reader: &mut TarReader<R>,
) -> Result<()> {
    let components = path_secure::normalize_relative(&header.path)?;
    if components.is_empty() {
        reader.skip_remaining_content()?;
        return Ok(());
    }

    match header.entry_type {
        EntryType::Directory => {
            path_secure::secure_resolve(root_fd, &components, false)?;
            reader.skip_remaining_content()?;
        }
        EntryType::Regular | EntryType::RegularAlt | EntryType::Contiguous => {
            let leaf = path_secure::secure_resolve(root_fd, &components, true)?;
            let mut out = std::fs::File::from(leaf);
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = reader.read_content(&mut buf)?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n])?;
            }
        }
        _ => reader.skip_remaining_content()?,
    }
    Ok(())
}
