//! # Identities and Units
//!
//! Holders are identified by a 20-byte [`Address`]. Amounts of both the
//! native asset and shares are [`Amount`]s in the smallest denomination
//! (18 decimals, so `1.0` is `10^18`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Quantity in the smallest unit. Shares and native value share one type
/// because deposits mint 1:1.
pub type Amount = u128;

/// Number of decimals used by the native asset and the share token.
pub const DECIMALS: u8 = 18;

/// Length of an address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte account identity.
///
/// Displayed and serialized as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

/// Reasons an address string can fail to parse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid hex in address: {0}")]
    InvalidHex(String),

    #[error("address must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

impl Address {
    /// The zero address. Used as the counterparty of mint and burn transfers.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Builds an address whose last byte is `n`. Handy for fixtures and
    /// well-known devnet accounts.
    pub const fn from_low_u8(n: u8) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes[ADDRESS_LENGTH - 1] = n;
        Self(bytes)
    }

    /// Derives the address of a contract deployed by `deployer` at `nonce`:
    /// the last 20 bytes of `blake3(deployer || nonce_be)`.
    pub fn derive(deployer: &Address, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&deployer.0);
        hasher.update(&nonce.to_be_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest.as_bytes()[32 - ADDRESS_LENGTH..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let raw = hex::decode(digits).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        let bytes: [u8; ADDRESS_LENGTH] =
            raw.as_slice()
                .try_into()
                .map_err(|_| AddressError::InvalidLength {
                    expected: ADDRESS_LENGTH,
                    actual: raw.len(),
                })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Amount encoding
// ---------------------------------------------------------------------------

/// Serde adapter for [`Amount`] fields: written as a decimal string,
/// read from a string or a JSON integer.
///
/// Strings keep 128-bit values intact through JSON and through internally
/// tagged enums, whose buffered decoding has no `u128` support.
///
/// ```ignore
/// #[serde(with = "crate::types::amount_str")]
/// value: Amount,
/// ```
pub mod amount_str {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::Amount;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s
                .trim()
                .parse::<Amount>()
                .map_err(|e| de::Error::custom(format!("invalid amount {:?}: {}", s, e))),
            Raw::Number(n) => Ok(n as Amount),
        }
    }

    /// The same encoding for `Option<Amount>`, with `null` for `None`.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        use super::Amount;

        #[derive(Deserialize)]
        #[serde(transparent)]
        struct Wrapped(#[serde(with = "super")] Amount);

        pub fn serialize<S: Serializer>(
            amount: &Option<Amount>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match amount {
                Some(amount) => super::serialize(amount, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Amount>, D::Error> {
            Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(amount)| amount))
        }
    }
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Errors from decimal string conversion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("empty amount")]
    Empty,

    #[error("invalid digit in amount: {0:?}")]
    InvalidDigit(String),

    #[error("amount has more than {0} decimal places")]
    TooManyDecimals(u8),

    #[error("amount does not fit in 128 bits")]
    Overflow,
}

/// Parses a decimal string such as `"0.5"` into smallest units.
pub fn parse_units(s: &str, decimals: u8) -> Result<Amount, UnitsError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(UnitsError::Empty);
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(UnitsError::Empty);
    }
    if frac.len() > decimals as usize {
        return Err(UnitsError::TooManyDecimals(decimals));
    }
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) {
        return Err(UnitsError::InvalidDigit(s.to_string()));
    }

    let scale = 10u128
        .checked_pow(decimals as u32)
        .ok_or(UnitsError::Overflow)?;
    let whole_value: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| UnitsError::Overflow)?
    };

    let mut frac_value: u128 = 0;
    for (i, b) in frac.bytes().enumerate() {
        let digit = (b - b'0') as u128;
        let place = 10u128.pow((decimals as usize - i - 1) as u32);
        frac_value += digit * place;
    }

    whole_value
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or(UnitsError::Overflow)
}

/// Formats smallest units as a decimal string, trimming trailing zeros.
pub fn format_units(amount: Amount, decimals: u8) -> String {
    // Past 38 decimals the scale exceeds `u128::MAX`, so every amount is
    // purely fractional.
    let (whole, frac) = match 10u128.checked_pow(decimals as u32) {
        Some(scale) => (amount / scale, amount % scale),
        None => (0, amount),
    };
    if frac == 0 {
        return whole.to_string();
    }
    let frac_str = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac_str.trim_end_matches('0'))
}

/// `parse_units(s, 18)`.
pub fn parse_ether(s: &str) -> Result<Amount, UnitsError> {
    parse_units(s, DECIMALS)
}

/// `format_units(amount, 18)`.
pub fn format_ether(amount: Amount) -> String {
    format_units(amount, DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_hex_round_trip() {
        let addr = Address::from_low_u8(0xab);
        let text = addr.to_string();
        assert_eq!(text, "0x00000000000000000000000000000000000000ab");
        assert_eq!(text.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn address_parses_without_prefix() {
        let addr: Address = "00000000000000000000000000000000000000ff".parse().unwrap();
        assert_eq!(addr, Address::from_low_u8(0xff));
    }

    #[test]
    fn address_rejects_wrong_length() {
        let err = "0xdeadbeef".parse::<Address>().unwrap_err();
        assert_eq!(
            err,
            AddressError::InvalidLength {
                expected: 20,
                actual: 4
            }
        );
    }

    #[test]
    fn derived_addresses_differ_by_nonce() {
        let deployer = Address::from_low_u8(1);
        let a = Address::derive(&deployer, 0);
        let b = Address::derive(&deployer, 1);
        assert_ne!(a, b);
        assert_eq!(a, Address::derive(&deployer, 0));
        assert!(!a.is_zero());
    }

    #[test]
    fn address_serializes_as_string() {
        let json = serde_json::to_string(&Address::from_low_u8(2)).unwrap();
        assert_eq!(json, "\"0x0000000000000000000000000000000000000002\"");
    }

    #[test]
    fn parse_ether_handles_fractions() {
        assert_eq!(parse_ether("1.0").unwrap(), 1_000_000_000_000_000_000);
        assert_eq!(parse_ether("0.5").unwrap(), 500_000_000_000_000_000);
        assert_eq!(parse_ether(".25").unwrap(), 250_000_000_000_000_000);
        assert_eq!(parse_ether("3").unwrap(), 3_000_000_000_000_000_000);
        assert_eq!(parse_units("1.5", 6).unwrap(), 1_500_000);
    }

    #[test]
    fn parse_ether_rejects_garbage() {
        assert_eq!(parse_ether("").unwrap_err(), UnitsError::Empty);
        assert_eq!(parse_ether(".").unwrap_err(), UnitsError::Empty);
        assert!(matches!(
            parse_ether("1.2.3").unwrap_err(),
            UnitsError::InvalidDigit(_)
        ));
        assert!(matches!(
            parse_ether("-1").unwrap_err(),
            UnitsError::InvalidDigit(_)
        ));
        assert_eq!(
            parse_units("0.1234567", 6).unwrap_err(),
            UnitsError::TooManyDecimals(6)
        );
        assert_eq!(
            parse_ether("999999999999999999999999").unwrap_err(),
            UnitsError::Overflow
        );
    }

    #[test]
    fn format_ether_trims_trailing_zeros() {
        assert_eq!(format_ether(1_000_000_000_000_000_000), "1");
        assert_eq!(format_ether(500_000_000_000_000_000), "0.5");
        assert_eq!(format_ether(1), "0.000000000000000001");
        assert_eq!(format_ether(0), "0");
    }

    #[test]
    fn format_units_beyond_u128_scale_is_fractional() {
        assert_eq!(format_units(5, 40), format!("0.{}5", "0".repeat(39)));
        assert_eq!(format_units(0, 255), "0");
        assert!(format_units(Amount::MAX, 39).starts_with("0.3402823"));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Fields {
        #[serde(with = "amount_str")]
        value: Amount,
        #[serde(with = "amount_str::option", default)]
        payout: Option<Amount>,
    }

    #[test]
    fn amounts_travel_as_decimal_strings() {
        let fields = Fields {
            value: Amount::MAX,
            payout: Some(7),
        };
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["value"], Amount::MAX.to_string());
        assert_eq!(json["payout"], "7");
        assert_eq!(serde_json::from_value::<Fields>(json).unwrap(), fields);

        let parsed: Fields = serde_json::from_str(r#"{"value": 42, "payout": null}"#).unwrap();
        assert_eq!(parsed, Fields { value: 42, payout: None });
        assert!(serde_json::from_str::<Fields>(r#"{"value": "1.5"}"#).is_err());
    }
}
