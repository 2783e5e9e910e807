//! Minimal call-data encoding for EVM-style ledgers
//!
//! Only what the exchange contract needs: static `address` and `uint256`
//! arguments; `uint256` (up to 128 bits), `bool`, `address` and `string`
//! return values.

use sha3::{Digest, Keccak256};
use types::ids::Address;

use super::LedgerError;

/// Static ABI argument
#[derive(Debug, Clone, Copy)]
pub enum Token<'a> {
    Address(&'a Address),
    Uint(u128),
}

/// First four bytes of Keccak-256 over the canonical signature,
/// e.g. `approve(address,uint256)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// `0x`-prefixed call data for `signature(args...)`
pub fn encode_call(signature: &str, args: &[Token<'_>]) -> String {
    let mut data = String::with_capacity(10 + 64 * args.len());
    data.push_str("0x");
    data.push_str(&hex::encode(selector(signature)));
    for arg in args {
        match arg {
            Token::Address(address) => {
                data.push_str(&"0".repeat(24));
                data.push_str(address.hex_digits());
            }
            Token::Uint(value) => data.push_str(&format!("{value:064x}")),
        }
    }
    data
}

/// Decode the first 32-byte word of a call result as an unsigned integer
pub fn decode_uint(result: &str) -> Result<u128, LedgerError> {
    let digits = strip_hex(result)?;
    if digits.len() < 64 {
        return Err(LedgerError::Decode(format!("short uint256 word: {result}")));
    }
    let (high, low) = digits[..64].split_at(32);
    if high.chars().any(|c| c != '0') {
        return Err(LedgerError::Decode(format!("uint256 exceeds 128 bits: {result}")));
    }
    u128::from_str_radix(low, 16).map_err(|e| LedgerError::Decode(e.to_string()))
}

pub fn decode_bool(result: &str) -> Result<bool, LedgerError> {
    Ok(decode_uint(result)? != 0)
}

/// Decode the first 32-byte word of a call result as an address
pub fn decode_address(result: &str) -> Result<Address, LedgerError> {
    let digits = strip_hex(result)?;
    if digits.len() < 64 {
        return Err(LedgerError::Decode(format!("short address word: {result}")));
    }
    let (padding, address) = digits[..64].split_at(24);
    if padding.chars().any(|c| c != '0') {
        return Err(LedgerError::Decode(format!("dirty address padding: {result}")));
    }
    Address::parse(&format!("0x{address}")).map_err(|e| LedgerError::Decode(e.to_string()))
}

/// Decode a call result holding a single dynamic `string`
pub fn decode_string(result: &str) -> Result<String, LedgerError> {
    let bytes = hex::decode(strip_hex(result)?).map_err(|e| LedgerError::Decode(e.to_string()))?;
    let offset = word_as_usize(&bytes, 0)?;
    let len = word_as_usize(&bytes, offset)?;
    let data = offset
        .checked_add(32)
        .and_then(|start| Some(start..start.checked_add(len)?))
        .and_then(|range| bytes.get(range))
        .ok_or_else(|| LedgerError::Decode(format!("truncated string of {len} bytes")))?;
    String::from_utf8(data.to_vec()).map_err(|e| LedgerError::Decode(e.to_string()))
}

/// Big-endian word at byte offset `at` as a length or offset
fn word_as_usize(bytes: &[u8], at: usize) -> Result<usize, LedgerError> {
    let word = at
        .checked_add(32)
        .and_then(|end| bytes.get(at..end))
        .ok_or_else(|| LedgerError::Decode(format!("no word at offset {at}")))?;
    let (high, low) = word.split_at(24);
    if high.iter().any(|b| *b != 0) {
        return Err(LedgerError::Decode(format!("word at offset {at} is too large")));
    }
    let low: [u8; 8] = low
        .try_into()
        .map_err(|_| LedgerError::Decode(format!("bad word at offset {at}")))?;
    usize::try_from(u64::from_be_bytes(low)).map_err(|e| LedgerError::Decode(e.to_string()))
}

/// Decode a JSON-RPC hex quantity (`0x1a`)
pub fn decode_quantity(quantity: &str) -> Result<u128, LedgerError> {
    let digits = strip_hex(quantity)?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| LedgerError::Decode(format!("{quantity}: {e}")))
}

/// Encode a JSON-RPC hex quantity
pub fn encode_quantity(value: u128) -> String {
    format!("0x{value:x}")
}

fn strip_hex(s: &str) -> Result<&str, LedgerError> {
    s.strip_prefix("0x")
        .ok_or_else(|| LedgerError::Decode(format!("expected 0x-prefixed hex: {s}")))
}
