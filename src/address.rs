//! Recipient address validation
//!
//! Accepts `0x`-prefixed 20-byte hex. Single-case input carries no checksum
//! and is accepted as-is; mixed-case input must match its EIP-55 checksum.

use alloy::primitives::Address;
use std::str::FromStr;

use crate::{Error, Result};

/// Parse and validate a user-supplied recipient address
pub fn parse_recipient(input: &str) -> Result<Address> {
    let input = input.trim();
    let hex_part = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .ok_or_else(|| Error::InvalidAddress(format!("{} is missing the 0x prefix", input)))?;

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidAddress(format!(
            "{} is not a 20-byte hex address",
            input
        )));
    }

    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());

    if has_lower && has_upper {
        let normalized = format!("0x{}", hex_part);
        Address::parse_checksummed(&normalized, None)
            .map_err(|_| Error::InvalidAddress(format!("{} fails EIP-55 checksum", input)))
    } else {
        Address::from_str(hex_part).map_err(|e| Error::InvalidAddress(format!("{}: {}", input, e)))
    }
}

/// EIP-55 rendering
pub fn checksummed(address: &Address) -> String {
    address.to_checksum(None)
}

/// Shorten an address for display (`0x1234...5678`)
pub fn abbreviate_address(address: &str, start_chars: usize, end_chars: usize) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= start_chars + end_chars {
        return address.to_string();
    }
    let head: String = chars[..start_chars].iter().collect();
    let tail: String = chars[chars.len() - end_chars..].iter().collect();
    format!("{}...{}", head, tail)
}
