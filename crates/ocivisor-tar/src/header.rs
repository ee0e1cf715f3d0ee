//! POSIX ustar header block: field layout, octal/string codec and checksum.
//!
//! Block layout (offsets into the 512-byte header):
//!
//! ```text
//! 0    name[100]
//! 100  mode[8]
//! 108  uid[8]
//! 116  gid[8]
//! 124  size[12]
//! 136  mtime[12]
//! 148  chksum[8]
//! 156  typeflag[1]
//! 157  linkname[100]
//! 257  magic[6]      "ustar\0"
//! 263  version[2]    "00"
//! 265  uname[32]
//! 297  gname[32]
//! 329  devmajor[8]
//! 337  devminor[8]
//! 345  prefix[155]
//! 500  pad[12]
//! ```

use crate::error::{Error, Result};

pub const BLOCK_SIZE: usize = 512;
pub const NAME_LEN: usize = 100;
pub const PREFIX_LEN: usize = 155;
pub const UGNAME_LEN: usize = 32;

pub const USTAR_MAGIC: &[u8; 6] = b"ustar\0";
pub const USTAR_VERSION: &[u8; 2] = b"00";

/// Traditional octal-field size cap: 8 GiB minus one byte (`0o77777777777`).
pub const MAX_USTAR_SIZE: i64 = 0o77777777777;
/// Traditional ustar uid/gid cap (7 octal digits of a field, minus NUL/space padding).
pub const MAX_USTAR_ID: u32 = 2_097_151;

const OFF_NAME: usize = 0;
const OFF_MODE: usize = 100;
const OFF_UID: usize = 108;
const OFF_GID: usize = 116;
const OFF_SIZE: usize = 124;
const OFF_MTIME: usize = 136;
const OFF_CHKSUM: usize = 148;
const OFF_TYPEFLAG: usize = 156;
const OFF_LINKNAME: usize = 157;
const OFF_MAGIC: usize = 257;
const OFF_VERSION: usize = 263;
const OFF_UNAME: usize = 265;
const OFF_GNAME: usize = 297;
const OFF_DEVMAJOR: usize = 329;
const OFF_DEVMINOR: usize = 337;
const OFF_PREFIX: usize = 345;

/// The single-byte ustar/PAX typeflag, modelled as a closed enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Regular,
    /// Some writers (older ustar) use NUL instead of `'0'` for a regular file.
    RegularAlt,
    HardLink,
    SymbolicLink,
    CharDevice,
    BlockDevice,
    Directory,
    Fifo,
    Contiguous,
    PaxExtended,
    PaxGlobal,
}

impl EntryType {
    pub fn type_flag(self) -> u8 {
        match self {
            EntryType::Regular => b'0',
            EntryType::RegularAlt => 0,
            EntryType::HardLink => b'1',
            EntryType::SymbolicLink => b'2',
            EntryType::CharDevice => b'3',
            EntryType::BlockDevice => b'4',
            EntryType::Directory => b'5',
            EntryType::Fifo => b'6',
            EntryType::Contiguous => b'7',
            EntryType::PaxExtended => b'x',
            EntryType::PaxGlobal => b'g',
        }
    }

    pub fn from_flag(flag: u8) -> Self {
        match flag {
            b'1' => EntryType::HardLink,
            b'2' => EntryType::SymbolicLink,
            b'3' => EntryType::CharDevice,
            b'4' => EntryType::BlockDevice,
            b'5' => EntryType::Directory,
            b'6' => EntryType::Fifo,
            b'7' => EntryType::Contiguous,
            b'x' => EntryType::PaxExtended,
            b'g' => EntryType::PaxGlobal,
            0 => EntryType::RegularAlt,
            _ => EntryType::Regular,
        }
    }

    pub fn is_pax(self) -> bool {
        matches!(self, EntryType::PaxExtended | EntryType::PaxGlobal)
    }
}

/// Abstract representation of a parsed or to-be-serialized tar entry header.
///
/// PAX overrides, once applied by the reader, are folded into this struct;
/// callers never see the PAX extended entry itself.
#[derive(Debug, Clone)]
pub struct TarHeader {
    pub path: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: i64,
    pub mtime: i64,
    pub entry_type: EntryType,
    pub link_name: String,
    pub uname: String,
    pub gname: String,
    pub devmajor: u32,
    pub devminor: u32,
}

impl Default for TarHeader {
    fn default() -> Self {
        Self {
            path: String::new(),
            mode: 0o644,
            uid: 0,
            gid: 0,
            size: 0,
            mtime: 0,
            entry_type: EntryType::Regular,
            link_name: String::new(),
            uname: String::new(),
            gname: String::new(),
            devmajor: 0,
            devminor: 0,
        }
    }
}

/// Whether `block` is entirely zero bytes (archive terminator marker).
pub fn is_zero_block(block: &[u8; BLOCK_SIZE]) -> bool {
    block.iter().all(|&b| b == 0)
}

/// Recompute the bytewise checksum of `block`, treating bytes [148..156) as spaces.
pub fn compute_checksum(block: &[u8; BLOCK_SIZE]) -> u32 {
    let mut sum: u32 = 0;
    for (i, &b) in block.iter().enumerate() {
        if (OFF_CHKSUM..OFF_CHKSUM + 8).contains(&i) {
            sum += b' ' as u32;
        } else {
            sum += b as u32;
        }
    }
    sum
}

/// Write the checksum field: 6-digit zero-padded octal, NUL, SPACE.
fn write_checksum(block: &mut [u8; BLOCK_SIZE], value: u32) {
    let field = &mut block[OFF_CHKSUM..OFF_CHKSUM + 8];
    field.fill(0);
    let digits = format!("{:06o}", value & 0o777_777);
    field[..6].copy_from_slice(digits.as_bytes());
    field[6] = 0;
    field[7] = b' ';
}

/// Parse an octal/GNU-binary numeric field per spec.md §4.1.
fn parse_numeric(field: &[u8]) -> Result<i64> {
    if field.is_empty() {
        return Ok(0);
    }
    if field[0] & 0x80 != 0 {
        // GNU binary extension: big-endian signed integer, high bit of the
        // first byte cleared before assembly.
        let mut bytes = field.to_vec();
        bytes[0] &= 0x7f;
        let mut value: i64 = 0;
        for &b in &bytes {
            value = (value << 8) | b as i64;
        }
        return Ok(value);
    }
    let trimmed: Vec<u8> = field
        .iter()
        .copied()
        .take_while(|&b| b != 0)
        .filter(|&b| b != b' ')
        .collect();
    if trimmed.is_empty() {
        return Ok(0);
    }
    let s = std::str::from_utf8(&trimmed)
        .map_err(|_| Error::InvalidHeader("non-UTF8 octal field".into()))?;
    i64::from_str_radix(s.trim(), 8)
        .map_err(|e| Error::InvalidHeader(format!("malformed octal field {:?}: {e}", s)))
}

/// Encode a non-negative numeric value as a NUL-terminated, space-padded octal field.
fn encode_octal(field: &mut [u8], value: i64) -> Result<()> {
    let width = field.len() - 1; // reserve trailing NUL
    let digits = format!("{:o}", value);
    if digits.len() > width {
        return Err(Error::HeaderSerializationFailed(format!(
            "value {value} does not fit in {width}-digit octal field"
        )));
    }
    field.fill(b'0');
    let start = field.len() - 1 - digits.len();
    field[start..field.len() - 1].copy_from_slice(digits.as_bytes());
    field[field.len() - 1] = 0;
    Ok(())
}

fn read_string_field(field: &[u8]) -> Result<String> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end])
        .map(|s| s.to_string())
        .map_err(|_| Error::InvalidHeader("non-UTF8 string field".into()))
}

fn write_string_field(field: &mut [u8], value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > field.len() {
        return Err(Error::HeaderSerializationFailed(format!(
            "string {:?} does not fit in {}-byte field",
            value,
            field.len()
        )));
    }
    field.fill(0);
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

/// Split `path` into ustar `(prefix, name)` if it fits the traditional 155+100 layout.
pub fn split_path_for_ustar(path: &str) -> Option<(String, String)> {
    if path.len() <= NAME_LEN {
        return Some((String::new(), path.to_string()));
    }
    if path.len() > PREFIX_LEN + 1 + NAME_LEN {
        return None;
    }
    let bytes = path.as_bytes();
    // Try every '/' from the right so the prefix stays as short as possible.
    for (i, &b) in bytes.iter().enumerate().rev() {
        if b != b'/' {
            continue;
        }
        let prefix = &path[..i];
        let name = &path[i + 1..];
        if prefix.len() <= PREFIX_LEN && !name.is_empty() && name.len() <= NAME_LEN {
            return Some((prefix.to_string(), name.to_string()));
        }
    }
    None
}

/// Parse a raw 512-byte header block into a [`TarHeader`], verifying its checksum.
///
/// Does not interpret PAX semantics; the reader applies PAX overrides separately.
pub fn parse_block(block: &[u8; BLOCK_SIZE]) -> Result<TarHeader> {
    let stored_checksum = parse_numeric(&block[OFF_CHKSUM..OFF_CHKSUM + 8])? as u32;
    let computed = compute_checksum(block);
    if stored_checksum != computed {
        return Err(Error::InvalidHeader(format!(
            "checksum mismatch: stored {stored_checksum:o}, computed {computed:o}"
        )));
    }

    let name = read_string_field(&block[OFF_NAME..OFF_NAME + NAME_LEN])?;
    let prefix = read_string_field(&block[OFF_PREFIX..OFF_PREFIX + PREFIX_LEN])?;
    let path = if prefix.is_empty() {
        name
    } else {
        format!("{prefix}/{name}")
    };

    let mode = parse_numeric(&block[OFF_MODE..OFF_MODE + 8])? as u32;
    let uid = parse_numeric(&block[OFF_UID..OFF_UID + 8])? as u32;
    let gid = parse_numeric(&block[OFF_GID..OFF_GID + 8])? as u32;
    let size = parse_numeric(&block[OFF_SIZE..OFF_SIZE + 12])?;
    let mtime = parse_numeric(&block[OFF_MTIME..OFF_MTIME + 12])?;
    let entry_type = EntryType::from_flag(block[OFF_TYPEFLAG]);
    let link_name = read_string_field(&block[OFF_LINKNAME..OFF_LINKNAME + NAME_LEN])?;
    let uname = read_string_field(&block[OFF_UNAME..OFF_UNAME + UGNAME_LEN])?;
    let gname = read_string_field(&block[OFF_GNAME..OFF_GNAME + UGNAME_LEN])?;
    let devmajor = parse_numeric(&block[OFF_DEVMAJOR..OFF_DEVMAJOR + 8])? as u32;
    let devminor = parse_numeric(&block[OFF_DEVMINOR..OFF_DEVMINOR + 8])? as u32;

    Ok(TarHeader {
        path,
        mode,
        uid,
        gid,
        size,
        mtime,
        entry_type,
        link_name,
        uname,
        gname,
        devmajor,
        devminor,
    })
}

/// Serialize `header` into a fresh 512-byte block, truncating `name`/`prefix`/
/// `link_name`/`size` to their ustar representations. Callers needing PAX
/// fallback (§4.2) must emit the preceding PAX entry themselves; this
/// function always produces a traditional ustar block, truncated if needed.
pub fn serialize_block(header: &TarHeader, name: &str, prefix: &str) -> Result<[u8; BLOCK_SIZE]> {
    let mut block = [0u8; BLOCK_SIZE];

    write_string_field(&mut block[OFF_NAME..OFF_NAME + NAME_LEN], name)?;
    write_string_field(&mut block[OFF_PREFIX..OFF_PREFIX + PREFIX_LEN], prefix)?;
    encode_octal(&mut block[OFF_MODE..OFF_MODE + 8], header.mode as i64)?;
    encode_octal(&mut block[OFF_UID..OFF_UID + 8], header.uid as i64)?;
    encode_octal(&mut block[OFF_GID..OFF_GID + 8], header.gid as i64)?;
    let clamped_size = header.size.min(MAX_USTAR_SIZE).max(0);
    encode_octal(&mut block[OFF_SIZE..OFF_SIZE + 12], clamped_size)?;
    encode_octal(&mut block[OFF_MTIME..OFF_MTIME + 12], header.mtime)?;
    block[OFF_TYPEFLAG] = header.entry_type.type_flag();

    let link_name = if header.link_name.len() > NAME_LEN {
        &header.link_name[header.link_name.len() - NAME_LEN..]
    } else {
        header.link_name.as_str()
    };
    write_string_field(&mut block[OFF_LINKNAME..OFF_LINKNAME + NAME_LEN], link_name)?;

    block[OFF_MAGIC..OFF_MAGIC + 6].copy_from_slice(USTAR_MAGIC);
    block[OFF_VERSION..OFF_VERSION + 2].copy_from_slice(USTAR_VERSION);

    write_string_field(&mut block[OFF_UNAME..OFF_UNAME + UGNAME_LEN], &header.uname)?;
    write_string_field(&mut block[OFF_GNAME..OFF_GNAME + UGNAME_LEN], &header.gname)?;
    encode_octal(&mut block[OFF_DEVMAJOR..OFF_DEVMAJOR + 8], header.devmajor as i64)?;
    encode_octal(&mut block[OFF_DEVMINOR..OFF_DEVMINOR + 8], header.devminor as i64)?;

    let checksum = compute_checksum(&block);
    write_checksum(&mut block, checksum);

    Ok(block)
}

/// True if `header` can be represented without PAX: short enough path/link,
/// size and ids within the traditional octal caps.
pub fn fits_in_ustar(header: &TarHeader) -> bool {
    split_path_for_ustar(&header.path).is_some()
        && header.link_name.len() <= NAME_LEN
        && header.size >= 0
        && header.size <= MAX_USTAR_SIZE
        && header.uid <= MAX_USTAR_ID
        && header.gid <= MAX_USTAR_ID
}

/// Number of 512-byte blocks needed to store `content_len` bytes of content,
/// including padding to the next block boundary.
pub fn padded_blocks(content_len: u64) -> u64 {
    (content_len + BLOCK_SIZE as u64 - 1) / BLOCK_SIZE as u64
}

/// Padding byte count to round `content_len` up to the next 512 boundary.
pub fn padding_len(content_len: u64) -> u64 {
    let rem = content_len % BLOCK_SIZE as u64;
    if rem == 0 {
        0
    } else {
        BLOCK_SIZE as u64 - rem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> TarHeader {
        TarHeader {
            path: "a/b.txt".to_string(),
            mode: 0o644,
            uid: 1000,
            gid: 1000,
            size: 13,
            mtime: 1_700_000_000,
            entry_type: EntryType::Regular,
            link_name: String::new(),
            uname: "root".to_string(),
            gname: "root".to_string(),
            devmajor: 0,
            devminor: 0,
        }
    }

    #[test]
    fn round_trip_simple_header() {
        let header = sample_header();
        let (prefix, name) = split_path_for_ustar(&header.path).unwrap();
        let block = serialize_block(&header, &name, &prefix).unwrap();
        let parsed = parse_block(&block).unwrap();
        assert_eq!(parsed.path, header.path);
        assert_eq!(parsed.mode, header.mode);
        assert_eq!(parsed.uid, header.uid);
        assert_eq!(parsed.gid, header.gid);
        assert_eq!(parsed.size, header.size);
        assert_eq!(parsed.mtime, header.mtime);
    }

    #[test]
    fn checksum_field_verifies() {
        let header = sample_header();
        let block = serialize_block(&header, "b.txt", "a").unwrap();
        let stored = parse_numeric(&block[OFF_CHKSUM..OFF_CHKSUM + 8]).unwrap() as u32;
        assert_eq!(stored, compute_checksum(&block));
    }

    #[test]
    fn split_path_prefers_shortest_prefix() {
        let path = "x".repeat(101) + "/y";
        assert!(split_path_for_ustar(&path).is_none());

        let path = format!("{}/{}", "a".repeat(150), "b".repeat(50));
        let (prefix, name) = split_path_for_ustar(&path).unwrap();
        assert_eq!(prefix.len(), 150);
        assert_eq!(name.len(), 50);
    }

    #[test]
    fn gnu_binary_size_extension() {
        let mut field = [0u8; 12];
        let value: i64 = 0x1_0000_0000;
        field[0] = 0x80;
        field[4..12].copy_from_slice(&value.to_be_bytes());
        assert_eq!(parse_numeric(&field).unwrap(), value);
    }

    #[test]
    fn fits_in_ustar_rejects_oversize() {
        let mut header = sample_header();
        header.size = MAX_USTAR_SIZE + 1;
        assert!(!fits_in_ustar(&header));

        let mut header = sample_header();
        header.uid = MAX_USTAR_ID + 1;
        assert!(!fits_in_ustar(&header));
    }
}
