//! Streaming TAR/PAX writer.

use crate::error::{Error, Result};
use crate::header::{self, padding_len, serialize_block, EntryType, TarHeader, BLOCK_SIZE};
use crate::pax;
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// Conventional name ustar implementations give the synthetic entry that
/// carries a PAX extended header's content (GNU/libarchive convention).
const PAX_HEADER_NAME: &str = "././@PaxHeader";

#[derive(Debug)]
enum State {
    /// No entry currently open; a header may be written next.
    Idle,
    /// A file entry is open; `written`/`expected` track content bytes so far.
    WritingContent { expected: u64, written: u64 },
    Finalized,
}

/// A streaming writer of ustar/PAX archives.
///
/// Entries whose path, link target, size or ownership ids overflow the
/// traditional ustar fields are automatically preceded by a PAX extended
/// header carrying the overflowing fields (spec.md §4.2).
pub struct TarWriter<W> {
    sink: W,
    state: State,
}

impl<W: Write> TarWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            state: State::Idle,
        }
    }

    fn write_block(&mut self, block: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.sink.write_all(block).map_err(Error::Io)
    }

    fn write_padding(&mut self, content_len: u64) -> Result<()> {
        let pad = padding_len(content_len);
        if pad > 0 {
            let zeros = vec![0u8; pad as usize];
            self.sink.write_all(&zeros).map_err(Error::Io)?;
        }
        Ok(())
    }

    /// Emit a PAX extended header entry carrying `overrides`, immediately
    /// followed (by the caller) with the truncated ustar header it amends.
    fn write_pax_extension(&mut self, overrides: &BTreeMap<String, String>) -> Result<()> {
        let content = pax::encode_records(overrides);
        let mut pax_header = TarHeader {
            path: PAX_HEADER_NAME.to_string(),
            size: content.len() as i64,
            entry_type: EntryType::PaxExtended,
            ..Default::default()
        };
        pax_header.mode = 0o644;

        let block = serialize_block(&pax_header, PAX_HEADER_NAME, "")?;
        self.write_block(&block)?;
        self.sink.write_all(content.as_bytes()).map_err(Error::Io)?;
        self.write_padding(content.len() as u64)?;
        Ok(())
    }

    /// Write the header(s) for `header`, emitting a preceding PAX extension
    /// when any field overflows the traditional ustar encoding.
    fn write_header(&mut self, header: &TarHeader) -> Result<()> {
        if header::fits_in_ustar(header) {
            let (prefix, name) = header::split_path_for_ustar(&header.path)
                .expect("fits_in_ustar implies a valid ustar split");
            let block = serialize_block(header, &name, &prefix)?;
            return self.write_block(&block);
        }

        let mut overrides = BTreeMap::new();
        if header::split_path_for_ustar(&header.path).is_none() {
            overrides.insert(pax::KEY_PATH.to_string(), header.path.clone());
        }
        if header.link_name.len() > header::NAME_LEN {
            overrides.insert(pax::KEY_LINKPATH.to_string(), header.link_name.clone());
        }
        if header.size < 0 || header.size > header::MAX_USTAR_SIZE {
            overrides.insert(pax::KEY_SIZE.to_string(), header.size.to_string());
        }
        if header.uid > header::MAX_USTAR_ID {
            overrides.insert(pax::KEY_UID.to_string(), header.uid.to_string());
        }
        if header.gid > header::MAX_USTAR_ID {
            overrides.insert(pax::KEY_GID.to_string(), header.gid.to_string());
        }
        if overrides.is_empty() {
            return Err(Error::PathTooLong(header.path.clone()));
        }

        self.write_pax_extension(&overrides)?;

        // The ustar fallback header just needs to round-trip under a reader
        // that ignores PAX (best effort); truncate whatever doesn't fit.
        let fallback_path = if header.path.len() > header::NAME_LEN + 1 + header::PREFIX_LEN {
            header.path[header.path.len() - header::NAME_LEN..].to_string()
        } else {
            header.path.clone()
        };
        let (prefix, name) = header::split_path_for_ustar(&fallback_path)
            .unwrap_or_else(|| (String::new(), "pax-entry".to_string()));
        let block = serialize_block(header, &name, &prefix)?;
        self.write_block(&block)
    }

    #[allow(clippy::too_many_arguments)]
    fn entry_header(
        path: &str,
        mode: u32,
        uid: u32,
        gid: u32,
        mtime: i64,
        uname: &str,
        gname: &str,
        entry_type: EntryType,
        size: i64,
        link_name: &str,
    ) -> TarHeader {
        TarHeader {
            path: path.to_string(),
            mode,
            uid,
            gid,
            size,
            mtime,
            entry_type,
            link_name: link_name.to_string(),
            uname: uname.to_string(),
            gname: gname.to_string(),
            devmajor: 0,
            devminor: 0,
        }
    }

    fn require_idle(&self) -> Result<()> {
        match self.state {
            State::Idle => Ok(()),
            State::WritingContent { .. } => {
                Err(Error::InvalidState("an entry is still open; call finalize_entry first"))
            }
            State::Finalized => Err(Error::InvalidState("writer already finalized")),
        }
    }

    /// Write a directory entry (no content).
    #[allow(clippy::too_many_arguments)]
    pub fn write_directory(
        &mut self,
        path: &str,
        mode: u32,
        uid: u32,
        gid: u32,
        mtime: i64,
        uname: &str,
        gname: &str,
    ) -> Result<()> {
        self.require_idle()?;
        let path = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        let header = Self::entry_header(
            &path,
            mode,
            uid,
            gid,
            mtime,
            uname,
            gname,
            EntryType::Directory,
            0,
            "",
        );
        self.write_header(&header)
    }

    /// Write a symbolic link entry.
    #[allow(clippy::too_many_arguments)]
    pub fn write_symlink(
        &mut self,
        path: &str,
        target: &str,
        mode: u32,
        uid: u32,
        gid: u32,
        mtime: i64,
        uname: &str,
        gname: &str,
    ) -> Result<()> {
        self.require_idle()?;
        let header = Self::entry_header(
            path,
            mode,
            uid,
            gid,
            mtime,
            uname,
            gname,
            EntryType::SymbolicLink,
            0,
            target,
        );
        self.write_header(&header)
    }

    /// Write a hard link entry.
    #[allow(clippy::too_many_arguments)]
    pub fn write_hardlink(
        &mut self,
        path: &str,
        target: &str,
        mode: u32,
        uid: u32,
        gid: u32,
        mtime: i64,
        uname: &str,
        gname: &str,
    ) -> Result<()> {
        self.require_idle()?;
        let header = Self::entry_header(
            path,
            mode,
            uid,
            gid,
            mtime,
            uname,
            gname,
            EntryType::HardLink,
            0,
            target,
        );
        self.write_header(&header)
    }

    /// Begin a regular file entry of `size` bytes. Follow with one or more
    /// [`Self::write_content`] calls totalling exactly `size` bytes, then
    /// [`Self::finalize_entry`].
    #[allow(clippy::too_many_arguments)]
    pub fn begin_file(
        &mut self,
        path: &str,
        size: u64,
        mode: u32,
        uid: u32,
        gid: u32,
        mtime: i64,
        uname: &str,
        gname: &str,
    ) -> Result<()> {
        self.require_idle()?;
        let header = Self::entry_header(
            path,
            mode,
            uid,
            gid,
            mtime,
            uname,
            gname,
            EntryType::Regular,
            size as i64,
            "",
        );
        self.write_header(&header)?;
        self.state = State::WritingContent {
            expected: size,
            written: 0,
        };
        Ok(())
    }

    /// Write a chunk of the currently open file entry's content.
    pub fn write_content(&mut self, buf: &[u8]) -> Result<()> {
        let (expected, written) = match self.state {
            State::WritingContent { expected, written } => (expected, written),
            _ => return Err(Error::InvalidState("write_content without an open file entry")),
        };
        if buf.is_empty() {
            return Ok(());
        }
        if written + buf.len() as u64 > expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: written + buf.len() as u64,
            });
        }
        self.sink.write_all(buf).map_err(Error::Io)?;
        self.state = State::WritingContent {
            expected,
            written: written + buf.len() as u64,
        };
        Ok(())
    }

    /// Close the currently open file entry, padding its content to a block
    /// boundary. Errors if fewer bytes were written than `begin_file` declared.
    pub fn finalize_entry(&mut self) -> Result<()> {
        let (expected, written) = match self.state {
            State::WritingContent { expected, written } => (expected, written),
            State::Idle => return Ok(()),
            State::Finalized => return Err(Error::InvalidState("writer already finalized")),
        };
        if written != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: written,
            });
        }
        self.write_padding(written)?;
        self.state = State::Idle;
        Ok(())
    }

    /// Convenience: stream an entire file entry's content from `source`,
    /// reading exactly `size` bytes.
    #[allow(clippy::too_many_arguments)]
    pub fn write_file_from<R: Read>(
        &mut self,
        path: &str,
        mut source: R,
        size: u64,
        mode: u32,
        uid: u32,
        gid: u32,
        mtime: i64,
        uname: &str,
        gname: &str,
    ) -> Result<()> {
        self.begin_file(path, size, mode, uid, gid, mtime, uname, gname)?;
        let mut buf = [0u8; 64 * 1024];
        let mut remaining = size;
        while remaining > 0 {
            let chunk = remaining.min(buf.len() as u64) as usize;
            source.read_exact(&mut buf[..chunk]).map_err(Error::Io)?;
            self.write_content(&buf[..chunk])?;
            remaining -= chunk as u64;
        }
        self.finalize_entry()
    }

    /// Write the archive terminator (two all-zero blocks) and flush.
    pub fn finalize(&mut self) -> Result<()> {
        self.require_idle()?;
        let zero = [0u8; BLOCK_SIZE];
        self.write_block(&zero)?;
        self.write_block(&zero)?;
        self.sink.flush().map_err(Error::Io)?;
        self.state = State::Finalized;
        Ok(())
    }
}
