//! Length-prefixed JSON envelope: a 4-byte big-endian length header followed
//! by that many bytes of JSON, mirroring the guest agent's existing framing.

use crate::error::{DecodeError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{Read, Write};

/// Refuses to allocate more than this many bytes for a single envelope body.
pub const MAX_ENVELOPE_BYTES: usize = 16 * 1024 * 1024;

pub fn write_envelope<W: Write, T: Serialize>(stream: &mut W, value: &T) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    let len = u32::try_from(body.len()).map_err(|_| DecodeError::TooLarge {
        len: body.len(),
        max: MAX_ENVELOPE_BYTES,
    })?;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(&body)?;
    stream.flush()?;
    Ok(())
}

/// Returns `Ok(None)` on a clean EOF before any header bytes arrive, and an
/// error on every other failure (including a short read mid-header).
pub fn read_envelope<R: Read, T: DeserializeOwned>(stream: &mut R) -> Result<Option<T>> {
    let mut header = [0u8; 4];
    match read_exact_or_eof(stream, &mut header)? {
        false => return Ok(None),
        true => {}
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_ENVELOPE_BYTES {
        return Err(DecodeError::TooLarge {
            len,
            max: MAX_ENVELOPE_BYTES,
        });
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    Ok(Some(serde_json::from_slice(&body)?))
}

/// Like `Read::read_exact`, but returns `Ok(false)` instead of an error when
/// EOF arrives before the first byte of `buf` is filled.
fn read_exact_or_eof<R: Read>(stream: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(DecodeError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "envelope header truncated",
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DecodeError::Io(e)),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Msg {
        a: u32,
        b: String,
    }

    #[test]
    fn round_trips_through_a_buffer() {
        let msg = Msg { a: 7, b: "hi".to_string() };
        let mut buf = Vec::new();
        write_envelope(&mut buf, &msg).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded: Option<Msg> = read_envelope(&mut cursor).unwrap();
        assert_eq!(decoded, Some(msg));
    }

    #[test]
    fn clean_eof_before_header_yields_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let decoded: Option<Msg> = read_envelope(&mut cursor).unwrap();
        assert_eq!(decoded, None);
    }

    #[test]
    fn oversized_length_header_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((MAX_ENVELOPE_BYTES as u32) + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let decoded: Result<Option<Msg>> = read_envelope(&mut cursor);
        assert!(matches!(decoded, Err(DecodeError::TooLarge { .. })));
    }
}
