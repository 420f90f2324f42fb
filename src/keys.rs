//! Todo key encoding
//!
//! A Todo is stored under the 8-byte big-endian form of its id, so byte
//! order of keys equals numeric order of ids.

/// Length of every valid Todo key
pub const KEY_LEN: usize = 8;

/// Encode an id as its bucket key
pub fn encode_id(id: u64) -> [u8; KEY_LEN] {
    id.to_be_bytes()
}

/// Decode a bucket key, or `None` for keys that are not Todo keys
pub fn decode_id(key: &[u8]) -> Option<u64> {
    let bytes: [u8; KEY_LEN] = key.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}
