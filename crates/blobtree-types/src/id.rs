use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Identifier of one stored item.
///
/// A `ContentId` is an arbitrary-precision non-negative integer handed out by
/// the store at creation time. It never changes for the lifetime of the item
/// and is exchanged with callers in its canonical decimal form.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(BigUint);

impl ContentId {
    /// Wrap an already-computed integer value.
    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    /// The identifier `0`, the first one ever allocated in an empty store.
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    /// The underlying integer.
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Consume the identifier and return the underlying integer.
    pub fn into_biguint(self) -> BigUint {
        self.0
    }

    /// The value as a `u64`, if it fits.
    pub fn to_u64(&self) -> Option<u64> {
        self.0.to_u64()
    }

    /// Parse a caller-supplied decimal string.
    ///
    /// Only ASCII digits are accepted: no sign, no whitespace, no radix
    /// prefix. Leading zeros are tolerated and dropped from the canonical form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() {
            return Err(TypeError::invalid_identifier(s, "empty string"));
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypeError::invalid_identifier(
                s,
                "only non-negative decimal numbers are supported",
            ));
        }
        BigUint::parse_bytes(s.as_bytes(), 10)
            .map(Self)
            .ok_or_else(|| TypeError::invalid_identifier(s, "not a decimal number"))
    }
}

impl From<u64> for ContentId {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<BigUint> for ContentId {
    fn from(value: BigUint) -> Self {
        Self(value)
    }
}

impl FromStr for ContentId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_small_values() {
        assert_eq!(ContentId::parse("0").unwrap(), ContentId::zero());
        assert_eq!(ContentId::parse("10").unwrap(), ContentId::from(10));
    }

    #[test]
    fn parse_beyond_u64() {
        let big = "340282366920938463463374607431768211456"; // 2^128
        let id = ContentId::parse(big).unwrap();
        assert!(id.to_u64().is_none());
        assert_eq!(id.to_string(), big);
    }

    #[test]
    fn leading_zeros_are_dropped() {
        let id = ContentId::parse("007").unwrap();
        assert_eq!(id, ContentId::from(7));
        assert_eq!(id.to_string(), "7");
    }

    #[test]
    fn rejects_malformed_strings() {
        for bad in ["", "-1", "+1", " 1", "1 ", "abc", "1.5", "0x10"] {
            let err = ContentId::parse(bad).unwrap_err();
            assert!(
                matches!(err, TypeError::InvalidIdentifier { .. }),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn from_str_matches_parse() {
        let id: ContentId = "42".parse().unwrap();
        assert_eq!(id.to_u64(), Some(42));
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(ContentId::from(9) < ContentId::from(10));
    }

    #[test]
    fn serde_as_decimal_string() {
        let id = ContentId::from(1234);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1234\"");
        let back: ContentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn serde_rejects_negative() {
        let err = serde_json::from_str::<ContentId>("\"-5\"");
        assert!(err.is_err());
    }

    #[test]
    fn debug_format() {
        assert_eq!(format!("{:?}", ContentId::from(3)), "ContentId(3)");
    }
}
