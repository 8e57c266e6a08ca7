//! Minimal EVM ABI helpers for token events and balance calls.

use num_bigint::BigUint;
use sha3::{Digest, Keccak256};

/// EVM zero address in lowercase hex
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

pub fn keccak256(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(message);
    hasher.finalize().into()
}

/// `0x`-prefixed keccak hash of an event signature, as found in `topics[0]`
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

/// First four bytes of the keccak hash of a function signature, hex encoded
pub fn function_selector(signature: &str) -> String {
    hex::encode(&keccak256(signature.as_bytes())[..4])
}

pub fn is_zero_address(address: &str) -> bool {
    address.eq_ignore_ascii_case(ZERO_ADDRESS)
}

fn strip_0x(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Splits the hex payload of a log into 32-byte words
pub fn words(data: &str) -> Vec<&str> {
    let data = strip_0x(data);
    (0..data.len() / 64).map(|i| &data[i * 64..(i + 1) * 64]).collect()
}

/// Address held in the low 20 bytes of a 32-byte word or topic
pub fn word_to_address(word: &str) -> Option<String> {
    let word = strip_0x(word);
    if word.len() != 64 {
        return None;
    }
    Some(format!("0x{}", word[24..].to_ascii_lowercase()))
}

/// Unsigned 256-bit word rendered as a decimal string
pub fn word_to_decimal(word: &str) -> Option<String> {
    let word = strip_0x(word);
    if word.is_empty() {
        return Some("0".to_string());
    }
    BigUint::parse_bytes(word.as_bytes(), 16).map(|n| n.to_string())
}

/// Decodes a dynamic `uint256[]` whose head offset is stored at `head_word`
pub fn decode_uint_array(data: &str, head_word: usize) -> Option<Vec<String>> {
    let all = words(data);
    let offset_bytes: usize = word_to_decimal(all.get(head_word)?)?.parse().ok()?;
    if offset_bytes % 32 != 0 {
        return None;
    }
    let start = offset_bytes / 32;
    let length: usize = word_to_decimal(all.get(start)?)?.parse().ok()?;
    (0..length)
        .map(|i| all.get(start + 1 + i).and_then(|w| word_to_decimal(w)))
        .collect()
}

/// Pads an address to a 32-byte ABI word
pub fn encode_address(address: &str) -> String {
    format!("{:0>64}", strip_0x(address).to_ascii_lowercase())
}

/// Encodes a decimal string as a 32-byte ABI word
pub fn encode_uint(decimal: &str) -> Option<String> {
    let value = BigUint::parse_bytes(decimal.as_bytes(), 10)?;
    let hex = value.to_str_radix(16);
    if hex.len() > 64 {
        return None;
    }
    Some(format!("{:0>64}", hex))
}

/// Calldata for `balanceOf(address)` or, with a token id, `balanceOf(address,uint256)`
pub fn balance_of_calldata(holder: &str, token_id: Option<&str>) -> Option<String> {
    match token_id {
        None => Some(format!(
            "0x{}{}",
            function_selector("balanceOf(address)"),
            encode_address(holder)
        )),
        Some(id) => Some(format!(
            "0x{}{}{}",
            function_selector("balanceOf(address,uint256)"),
            encode_address(holder),
            encode_uint(id)?
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_topic_matches_known_hash() {
        assert_eq!(
            event_topic("Transfer(address,address,uint256)"),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_balance_of_selectors() {
        assert_eq!(function_selector("balanceOf(address)"), "70a08231");
        assert_eq!(function_selector("balanceOf(address,uint256)"), "00fdd58e");
    }

    #[test]
    fn test_word_helpers() {
        let word = "000000000000000000000000aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        assert_eq!(
            word_to_address(word).as_deref(),
            Some("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );
        assert_eq!(
            word_to_decimal("0x00000000000000000000000000000000000000000000000000000000000003e8")
                .as_deref(),
            Some("1000")
        );
    }

    #[test]
    fn test_decode_uint_array() {
        // ids = [1, 2] at offset 0x40, values = [5, 9] at offset 0xa0
        let data = [
            "0000000000000000000000000000000000000000000000000000000000000040",
            "00000000000000000000000000000000000000000000000000000000000000a0",
            "0000000000000000000000000000000000000000000000000000000000000002",
            "0000000000000000000000000000000000000000000000000000000000000001",
            "0000000000000000000000000000000000000000000000000000000000000002",
            "0000000000000000000000000000000000000000000000000000000000000002",
            "0000000000000000000000000000000000000000000000000000000000000005",
            "0000000000000000000000000000000000000000000000000000000000000009",
        ]
        .concat();
        assert_eq!(
            decode_uint_array(&data, 0),
            Some(vec!["1".to_string(), "2".to_string()])
        );
        assert_eq!(
            decode_uint_array(&data, 1),
            Some(vec!["5".to_string(), "9".to_string()])
        );
        assert_eq!(decode_uint_array("0x", 0), None);
    }

    #[test]
    fn test_balance_of_calldata_with_token_id() {
        let calldata =
            balance_of_calldata("0x1111111111111111111111111111111111111111", Some("255")).unwrap();
        assert!(calldata.starts_with("0x00fdd58e"));
        assert!(calldata.ends_with("00ff"));
        assert_eq!(calldata.len(), 2 + 8 + 64 + 64);
    }
}
