//! 20-byte account addresses.

use emberchain_derive::BinaryCodec;
use std::fmt;
use std::str::FromStr;

/// Address length in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Fixed-size 20-byte account identifier.
///
/// Derived from a secp256k1 public key as the last 20 bytes of the
/// Keccak-256 digest of the uncompressed point (see
/// [`crate::crypto::key_pair::PublicKey::address`]). Hex form is
/// `0x`-prefixed and case-insensitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec, Default, Hash, Ord, PartialOrd)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// The all-zero "hole" address.
    pub const fn zero() -> Address {
        Address([0u8; ADDRESS_LEN])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }

    pub const fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Creates an address from a slice of exactly [`ADDRESS_LEN`] bytes.
    pub fn from_slice(slice: &[u8]) -> Option<Address> {
        if slice.len() != ADDRESS_LEN {
            return None;
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(slice);
        Some(Address(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Failure to parse a hex address string.
#[derive(Debug, PartialEq, Eq)]
pub struct ParseAddressError;

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = decode_hex(hex).ok_or(ParseAddressError)?;
        Address::from_slice(&bytes).ok_or(ParseAddressError)
    }
}

/// Decodes a hex string of even length, case-insensitive.
pub(crate) fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let digits = hex.as_bytes();
    let mut out = Vec::with_capacity(hex.len() / 2);
    for pair in digits.chunks(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out.push((hi * 16 + lo) as u8);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_lowercase_hex_with_prefix() {
        let addr = Address([0xAB; ADDRESS_LEN]);
        assert_eq!(
            addr.to_string(),
            "0xabababababababababababababababababababab"
        );
    }

    #[test]
    fn parse_roundtrip() {
        let addr = Address([0x5F; ADDRESS_LEN]);
        assert_eq!(addr.to_string().parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn parse_is_case_insensitive_and_prefix_optional() {
        let lower = "0x5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f";
        let upper = "0X5F5F5F5F5F5F5F5F5F5F5F5F5F5F5F5F5F5F5F5F";
        let bare = "5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f";
        let addr = lower.parse::<Address>().unwrap();
        assert_eq!(upper.parse::<Address>().unwrap(), addr);
        assert_eq!(bare.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn parse_rejects_wrong_length_and_junk() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzz5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f5f".parse::<Address>().is_err());
    }

    #[test]
    fn zero_address() {
        assert!(Address::zero().is_zero());
        assert!(!Address([1; ADDRESS_LEN]).is_zero());
    }
}
