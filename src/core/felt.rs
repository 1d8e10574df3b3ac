//! Field Element Helpers
//!
//! Everything that crosses the chain boundary is a Starknet field element.
//! These helpers convert between felts, small integers and the `0x`-hex
//! strings used in storage keys and JSON documents.

use serde::{Deserialize, Deserializer, Serializer};
pub use starknet_crypto::Felt;

/// Parse a felt from `0x`-prefixed hex or a decimal string.
pub fn parse_felt(raw: &str) -> Option<Felt> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        Felt::from_hex(&trimmed.to_ascii_lowercase()).ok()
    } else {
        Felt::from_dec_str(trimmed).ok()
    }
}

/// Narrow a felt to `u64`, failing if any high byte is set.
pub fn felt_to_u64(value: &Felt) -> Option<u64> {
    let bytes = value.to_bytes_be();
    if bytes[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&bytes[24..]);
    Some(u64::from_be_bytes(tail))
}

/// Narrow a felt to `u8`.
pub fn felt_to_u8(value: &Felt) -> Option<u8> {
    felt_to_u64(value).and_then(|v| u8::try_from(v).ok())
}

/// Canonical lowercase hex rendering used in storage keys.
///
/// Two spellings of the same address (`0x0ABC`, `0xabc`) map to one key.
pub fn felt_key(value: &Felt) -> String {
    value.to_hex_string()
}

/// Serde adapter: a felt as a `0x`-hex string.
pub mod felt_hex {
    use super::*;

    /// Serialize as hex.
    pub fn serialize<S: Serializer>(value: &Felt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_hex_string())
    }

    /// Deserialize from hex or decimal.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Felt, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_felt(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid felt: {raw}")))
    }
}

/// Serde adapter: a list of felts as hex strings.
pub mod felt_hex_vec {
    use super::*;
    use serde::ser::SerializeSeq;

    /// Serialize as a list of hex strings.
    pub fn serialize<S: Serializer>(values: &[Felt], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&value.to_hex_string())?;
        }
        seq.end()
    }

    /// Deserialize from a list of hex or decimal strings.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Felt>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|s| {
                parse_felt(s).ok_or_else(|| serde::de::Error::custom(format!("invalid felt: {s}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_and_decimal() {
        assert_eq!(parse_felt("0x10"), Some(Felt::from(16u64)));
        assert_eq!(parse_felt("16"), Some(Felt::from(16u64)));
        assert_eq!(parse_felt("0X0A"), Some(Felt::from(10u64)));
        assert_eq!(parse_felt(""), None);
        assert_eq!(parse_felt("0xzz"), None);
    }

    #[test]
    fn test_felt_to_small_ints() {
        assert_eq!(felt_to_u64(&Felt::from(42u64)), Some(42));
        assert_eq!(felt_to_u8(&Felt::from(9u64)), Some(9));
        assert_eq!(felt_to_u8(&Felt::from(300u64)), None);

        let big = parse_felt("0x10000000000000000").unwrap();
        assert_eq!(felt_to_u64(&big), None);
    }

    #[test]
    fn test_felt_key_is_canonical() {
        let a = parse_felt("0x0000ABC").unwrap();
        let b = parse_felt("0xabc").unwrap();
        assert_eq!(felt_key(&a), felt_key(&b));
        assert_eq!(felt_key(&a), "0xabc");
    }
}
