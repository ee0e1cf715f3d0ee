//! Streaming TAR/PAX reader.

use crate::error::{Error, Result};
use crate::header::{self, is_zero_block, parse_block, TarHeader, BLOCK_SIZE};
use crate::pax::{self, MAX_PAX_SIZE};
use std::collections::BTreeMap;
use std::io::Read;

#[derive(Debug)]
enum State {
    /// Positioned right before the next header block.
    BetweenEntries,
    /// Positioned inside an entry's content.
    InContent { remaining: u64, padding: u64 },
    /// Archive terminator seen; no further entries.
    Ended,
}

/// A streaming reader over a ustar/PAX archive.
///
/// Exclusively owns the input stream and an internal growable scratch
/// buffer used to skip bytes without allocating per call.
pub struct TarReader<R> {
    source: R,
    state: State,
    global_overrides: BTreeMap<String, String>,
    pending_local_overrides: Option<BTreeMap<String, String>>,
    scratch: Vec<u8>,
}

impl<R: Read> TarReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            state: State::BetweenEntries,
            global_overrides: BTreeMap::new(),
            pending_local_overrides: None,
            scratch: vec![0u8; BLOCK_SIZE],
        }
    }

    fn read_exact_n(&mut self, buf: &mut [u8]) -> Result<()> {
        self.source.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::UnexpectedEndOfArchive
            } else {
                Error::Io(e)
            }
        })
    }

    fn skip_n(&mut self, mut n: u64) -> Result<()> {
        while n > 0 {
            let chunk = n.min(self.scratch.len() as u64) as usize;
            self.read_exact_n(&mut self.scratch[..chunk])?;
            n -= chunk as u64;
        }
        Ok(())
    }

    fn read_block(&mut self) -> Result<[u8; BLOCK_SIZE]> {
        let mut block = [0u8; BLOCK_SIZE];
        self.read_exact_n(&mut block)?;
        Ok(block)
    }

    /// Consume whatever remains of the previous entry's content and padding.
    fn finish_current_entry(&mut self) -> Result<()> {
        if let State::InContent { remaining, padding } = self.state {
            self.skip_n(remaining)?;
            self.skip_n(padding)?;
        }
        self.state = State::BetweenEntries;
        Ok(())
    }

    fn read_pax_content(&mut self, size: i64) -> Result<BTreeMap<String, String>> {
        if size < 0 || size as u64 > MAX_PAX_SIZE {
            return Err(Error::PaxTooLarge(size.max(0) as u64));
        }
        let size = size as u64;
        let mut buf = vec![0u8; size as usize];
        self.read_exact_n(&mut buf)?;
        self.skip_n(header::padding_len(size))?;
        pax::parse_records(&buf)
    }

    /// Read the next entry's header, transparently applying any preceding
    /// PAX extended/global overrides. Returns `Ok(None)` at the archive
    /// terminator (two-zero-block marker; only the first is consumed here).
    pub fn next_header(&mut self) -> Result<Option<TarHeader>> {
        if matches!(self.state, State::Ended) {
            return Err(Error::InvalidState("next_header called after end-of-archive"));
        }

        self.finish_current_entry()?;

        loop {
            let block = self.read_block()?;
            if is_zero_block(&block) {
                self.state = State::Ended;
                return Ok(None);
            }

            let mut parsed = parse_block(&block)?;

            if parsed.entry_type.is_pax() {
                let records = self.read_pax_content(parsed.size)?;
                if parsed.entry_type == crate::header::EntryType::PaxGlobal {
                    self.global_overrides.extend(records);
                } else {
                    self.pending_local_overrides = Some(records);
                }
                continue;
            }

            if !self.global_overrides.is_empty() {
                pax::apply_overrides(&mut parsed, &self.global_overrides)?;
            }
            if let Some(local) = self.pending_local_overrides.take() {
                pax::apply_overrides(&mut parsed, &local)?;
            }

            let remaining = parsed.size.max(0) as u64;
            let padding = header::padding_len(remaining);
            self.state = State::InContent { remaining, padding };
            return Ok(Some(parsed));
        }
    }

    /// Copy up to `min(buf.len(), content_bytes_remaining)` bytes of the
    /// current entry's content into `buf`. Automatically consumes the
    /// entry's padding once content is exhausted.
    pub fn read_content(&mut self, buf: &mut [u8]) -> Result<usize> {
        let (remaining, padding) = match self.state {
            State::InContent { remaining, padding } => (remaining, padding),
            _ => return Err(Error::InvalidState("read_content outside of an entry")),
        };

        if remaining == 0 {
            self.skip_n(padding)?;
            self.state = State::BetweenEntries;
            return Ok(0);
        }

        let want = buf.len().min(remaining as usize);
        self.read_exact_n(&mut buf[..want])?;
        let remaining = remaining - want as u64;
        if remaining == 0 {
            self.skip_n(padding)?;
            self.state = State::BetweenEntries;
        } else {
            self.state = State::InContent { remaining, padding };
        }
        Ok(want)
    }

    /// Consume the remainder of the current entry's content plus padding.
    pub fn skip_remaining_content(&mut self) -> Result<()> {
        self.finish_current_entry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::TarWriter;

    #[test]
    fn short_round_trip() {
        let mut buf = Vec::new();
        {
            let mut w = TarWriter::new(&mut buf);
            w.write_directory("a/", 0o755, 0, 0, 0, "", "").unwrap();
            w.begin_file("a/b.txt", 13, 0o644, 0, 0, 0, "", "").unwrap();
            w.write_content(b"hello, world!").unwrap();
            w.finalize_entry().unwrap();
            w.finalize().unwrap();
        }

        let mut r = TarReader::new(std::io::Cursor::new(buf));
        let h1 = r.next_header().unwrap().unwrap();
        assert_eq!(h1.path, "a/");
        assert_eq!(h1.mode, 0o755);

        let h2 = r.next_header().unwrap().unwrap();
        assert_eq!(h2.path, "a/b.txt");
        let mut content = vec![0u8; 13];
        let n = r.read_content(&mut content).unwrap();
        assert_eq!(n, 13);
        assert_eq!(&content, b"hello, world!");
        assert_eq!(r.read_content(&mut [0u8; 4]).unwrap(), 0);

        assert!(r.next_header().unwrap().is_none());
    }

    #[test]
    fn pax_path_override_round_trips() {
        let long_path = format!("{}/{}", "x".repeat(150), "y".repeat(150));
        let mut buf = Vec::new();
        {
            let mut w = TarWriter::new(&mut buf);
            w.begin_file(&long_path, 3, 0o644, 0, 0, 0, "", "").unwrap();
            w.write_content(b"abc").unwrap();
            w.finalize_entry().unwrap();
            w.finalize().unwrap();
        }

        let mut r = TarReader::new(std::io::Cursor::new(buf));
        let header = r.next_header().unwrap().unwrap();
        assert_eq!(header.path, long_path);
    }
}
