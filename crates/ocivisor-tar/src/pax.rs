//! PAX extended header record codec.
//!
//! A record is the textual form `LENGTH SP KEY=VALUE LF`, where `LENGTH` is
//! the decimal byte count of the whole record, including `LENGTH`'s own
//! digits. Records concatenate into a PAX entry's content.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// One MiB cap on a PAX extended header's total content (spec.md §4.1).
pub const MAX_PAX_SIZE: u64 = 1024 * 1024;

/// Encode a single `key=value` PAX record, finding the self-referential
/// fixpoint length (the digit count of `LENGTH` can grow as `LENGTH` itself
/// grows, so it must be recomputed until it stabilizes).
pub fn encode_record(key: &str, value: &str) -> String {
    // " " + key + "=" + value + "\n"
    let suffix_len = 1 + key.len() + 1 + value.len() + 1;
    let mut len = suffix_len + 1; // seed with a 1-digit length
    loop {
        let digits = len.to_string().len();
        let candidate = digits + suffix_len;
        if candidate == len {
            break;
        }
        len = candidate;
    }
    format!("{len} {key}={value}\n")
}

/// Encode a map of PAX overrides into the concatenated record content.
pub fn encode_records(records: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (k, v) in records {
        out.push_str(&encode_record(k, v));
    }
    out
}

/// Parse the concatenated content of a PAX extended-header entry into
/// key/value overrides.
pub fn parse_records(content: &[u8]) -> Result<BTreeMap<String, String>> {
    let mut records = BTreeMap::new();
    let mut rest = content;

    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| Error::InvalidPax("missing length field".into()))?;
        let len_str = std::str::from_utf8(&rest[..space])
            .map_err(|_| Error::InvalidPax("non-UTF8 length field".into()))?;
        let len: usize = len_str
            .parse()
            .map_err(|_| Error::InvalidPax(format!("malformed length {len_str:?}")))?;
        if len == 0 || len > rest.len() {
            return Err(Error::InvalidPax(format!(
                "record length {len} exceeds remaining buffer {}",
                rest.len()
            )));
        }

        let record = &rest[..len];
        if record[len - 1] != b'\n' {
            return Err(Error::InvalidPax("record not newline-terminated".into()));
        }
        let body = &record[space + 1..len - 1];
        let eq = body
            .iter()
            .position(|&b| b == b'=')
            .ok_or_else(|| Error::InvalidPax("record missing '='".into()))?;
        let key = std::str::from_utf8(&body[..eq])
            .map_err(|_| Error::InvalidPax("non-UTF8 key".into()))?
            .to_string();
        let value = std::str::from_utf8(&body[eq + 1..])
            .map_err(|_| Error::InvalidPax("non-UTF8 value".into()))?
            .to_string();

        records.insert(key, value);
        rest = &rest[len..];
    }

    Ok(records)
}

/// Keys of [`crate::header::TarHeader`] fields the writer may have to
/// overflow into PAX records when the ustar encoding can't hold them.
pub const KEY_PATH: &str = "path";
pub const KEY_LINKPATH: &str = "linkpath";
pub const KEY_SIZE: &str = "size";
pub const KEY_UID: &str = "uid";
pub const KEY_GID: &str = "gid";

/// Apply PAX overrides to a just-parsed ustar header, consuming them exactly once.
pub fn apply_overrides(
    header: &mut crate::header::TarHeader,
    overrides: &BTreeMap<String, String>,
) -> Result<()> {
    if let Some(v) = overrides.get(KEY_PATH) {
        header.path = v.clone();
    }
    if let Some(v) = overrides.get(KEY_LINKPATH) {
        header.link_name = v.clone();
    }
    if let Some(v) = overrides.get(KEY_SIZE) {
        header.size = v
            .parse()
            .map_err(|_| Error::InvalidPax(format!("malformed size override {v:?}")))?;
    }
    if let Some(v) = overrides.get(KEY_UID) {
        header.uid = v
            .parse()
            .map_err(|_| Error::InvalidPax(format!("malformed uid override {v:?}")))?;
    }
    if let Some(v) = overrides.get(KEY_GID) {
        header.gid = v
            .parse()
            .map_err(|_| Error::InvalidPax(format!("malformed gid override {v:?}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_fixpoint_self_describes() {
        for value in ["x", "a much longer value that pushes past nine characters"] {
            let record = encode_record("path", value);
            let space = record.find(' ').unwrap();
            let declared_len: usize = record[..space].parse().unwrap();
            assert_eq!(declared_len, record.len());
        }
    }

    #[test]
    fn round_trip_disjoint_keys() {
        let mut map = BTreeMap::new();
        map.insert("path".to_string(), "x".repeat(200));
        map.insert("uid".to_string(), "70000".to_string());
        let encoded = encode_records(&map);
        let decoded = parse_records(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn decode_then_encode_is_byte_identical() {
        let record = encode_record("linkpath", "some/target");
        let decoded = parse_records(record.as_bytes()).unwrap();
        let mut map = BTreeMap::new();
        map.insert("linkpath".to_string(), "some/target".to_string());
        assert_eq!(decoded, map);
        assert_eq!(encode_records(&map), record);
    }
}
