//! Binary pair codec for the on-disk dictionary layout
//!
//! The layout is little-endian throughout: an `i32` pair count, then for
//! each pair an `i32`-length-prefixed UTF-8 JSON encoding of the key
//! followed by the same for the value. Decoding walks a cursor over the
//! whole file contents so length prefixes can be bounds-checked before
//! any allocation.

use std::collections::HashMap;
use std::hash::Hash;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Serialize the whole mapping into the on-disk layout.
///
/// Pair order follows the map's iteration order; the format does not
/// assign it meaning.
pub(crate) fn encode_pairs<K, V>(pairs: &HashMap<K, V>) -> Result<Vec<u8>>
where
    K: Eq + Hash + Serialize,
    V: Serialize,
{
    let count = i32::try_from(pairs.len())
        .map_err(|_| Error::InvalidArgument(format!("too many pairs: {}", pairs.len())))?;

    let mut buf = Vec::new();
    buf.write_i32::<LittleEndian>(count)?;
    for (key, value) in pairs {
        write_block(&mut buf, &encode_text(key)?)?;
        write_block(&mut buf, &encode_text(value)?)?;
    }
    Ok(buf)
}

/// Read the declared pair count from the front of the file.
pub(crate) fn decode_count(cursor: &mut Cursor<&[u8]>) -> Result<usize> {
    let count = cursor
        .read_i32::<LittleEndian>()
        .map_err(|_| Error::Corrupt("file too short for a pair count".into()))?;
    usize::try_from(count).map_err(|_| Error::Corrupt(format!("negative pair count: {count}")))
}

/// Decode the next key/value pair at the cursor.
pub(crate) fn decode_pair<K, V>(cursor: &mut Cursor<&[u8]>, index: usize) -> Result<(K, V)>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    let key = decode_text(take_block(cursor, index, "key")?, index, "key")?;
    let value = decode_text(take_block(cursor, index, "value")?, index, "value")?;
    Ok((key, value))
}

/// JSON-encode one key or value as UTF-8 bytes.
fn encode_text<T: Serialize + ?Sized>(item: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(item).map_err(|e| Error::InvalidArgument(format!("unencodable entry: {e}")))
}

fn decode_text<T: DeserializeOwned>(bytes: &[u8], index: usize, what: &str) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::Corrupt(format!("undecodable {what} in pair {index}: {e}")))
}

fn write_block(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = i32::try_from(bytes.len())
        .map_err(|_| Error::InvalidArgument(format!("entry too large: {} bytes", bytes.len())))?;
    buf.write_i32::<LittleEndian>(len)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Borrow the next length-prefixed block, bounds-checked against the
/// remaining file contents.
fn take_block<'a>(cursor: &mut Cursor<&'a [u8]>, index: usize, what: &str) -> Result<&'a [u8]> {
    let len = cursor
        .read_i32::<LittleEndian>()
        .map_err(|_| Error::Corrupt(format!("truncated {what} length in pair {index}")))?;
    let len = usize::try_from(len)
        .map_err(|_| Error::Corrupt(format!("negative {what} length in pair {index}: {len}")))?;

    let data = *cursor.get_ref();
    let start = usize::try_from(cursor.position())
        .map_err(|_| Error::Corrupt("cursor position overflow".into()))?;
    let remaining = data.len().saturating_sub(start);
    if len > remaining {
        return Err(Error::Corrupt(format!(
            "{what} in pair {index} declares {len} bytes but only {remaining} remain"
        )));
    }

    cursor.set_position((start + len) as u64);
    Ok(&data[start..start + len])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(map: &HashMap<String, String>) -> HashMap<String, String> {
        let bytes = encode_pairs(map).unwrap();
        let mut cursor = Cursor::new(bytes.as_slice());
        let count = decode_count(&mut cursor).unwrap();
        let mut out = HashMap::new();
        for i in 0..count {
            let (k, v) = decode_pair::<String, String>(&mut cursor, i).unwrap();
            out.insert(k, v);
        }
        out
    }

    #[test]
    fn encodes_and_decodes_pairs() {
        let mut map = HashMap::new();
        map.insert("alpha".to_string(), "1".to_string());
        map.insert("beta".to_string(), "two".to_string());
        assert_eq!(roundtrip(&map), map);
    }

    #[test]
    fn empty_map_is_a_bare_count() {
        let map: HashMap<String, String> = HashMap::new();
        let bytes = encode_pairs(&map).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0]);
    }

    #[test]
    fn count_is_little_endian() {
        let mut map = HashMap::new();
        map.insert("k".to_string(), "v".to_string());
        let bytes = encode_pairs(&map).unwrap();
        assert_eq!(&bytes[..4], &[1, 0, 0, 0]);
    }

    #[test]
    fn negative_count_is_corrupt() {
        let bytes = (-1i32).to_le_bytes();
        let mut cursor = Cursor::new(bytes.as_slice());
        let err = decode_count(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn short_file_is_corrupt() {
        let bytes = [1u8, 0];
        let mut cursor = Cursor::new(bytes.as_slice());
        let err = decode_count(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn overrunning_length_is_corrupt() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&100i32.to_le_bytes());
        bytes.extend_from_slice(b"\"k");
        let mut cursor = Cursor::new(bytes.as_slice());
        let err = decode_pair::<String, String>(&mut cursor, 0).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn bad_json_is_corrupt() {
        let payload = b"not json";
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&i32::try_from(payload.len()).unwrap().to_le_bytes());
        bytes.extend_from_slice(payload);
        let mut cursor = Cursor::new(bytes.as_slice());
        let err = decode_pair::<String, String>(&mut cursor, 0).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }
}
