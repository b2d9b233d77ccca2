//! K-sortable unique identifiers for tracked decisions.
//!
//! Layout: 4 bytes of `unix_seconds - KSUID_EPOCH` (big-endian) followed by
//! 16 random bytes, rendered as a fixed-width 27-character base62 string.
//! Because the string is fixed-width and the alphabet is in ASCII order,
//! string order equals byte order equals timestamp order (for different
//! seconds).

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Custom epoch (2014-05-13T16:53:20Z); 32 unsigned bits then reach into 2150.
pub const KSUID_EPOCH: i64 = 1_400_000_000;
/// Length of the base62 form.
pub const KSUID_STRING_LENGTH: usize = 27;
/// Length of the random payload.
pub const KSUID_PAYLOAD_LENGTH: usize = 16;

const TIMESTAMP_LENGTH: usize = 4;
const BYTES_LENGTH: usize = TIMESTAMP_LENGTH + KSUID_PAYLOAD_LENGTH;
const BASE62: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// A KSUID in binary form.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ksuid([u8; BYTES_LENGTH]);

impl Ksuid {
    /// New id for the current second with a CSPRNG payload.
    pub fn generate() -> Result<Self> {
        let mut payload = [0u8; KSUID_PAYLOAD_LENGTH];
        rand::rng().fill(&mut payload);
        Self::from_parts(chrono::Utc::now().timestamp(), payload)
    }

    /// Build from explicit parts. Times outside the 32-bit window are rejected.
    pub fn from_parts(unix_seconds: i64, payload: [u8; KSUID_PAYLOAD_LENGTH]) -> Result<Self> {
        let offset = unix_seconds
            .checked_sub(KSUID_EPOCH)
            .and_then(|d| u32::try_from(d).ok())
            .ok_or_else(|| {
                Error::invalid_argument(format!("timestamp {unix_seconds} outside the KSUID range"))
            })?;
        let mut bytes = [0u8; BYTES_LENGTH];
        bytes[..TIMESTAMP_LENGTH].copy_from_slice(&offset.to_be_bytes());
        bytes[TIMESTAMP_LENGTH..].copy_from_slice(&payload);
        Ok(Self(bytes))
    }

    /// Wrap raw bytes.
    pub fn from_bytes(bytes: [u8; BYTES_LENGTH]) -> Self {
        Self(bytes)
    }

    /// All zero bytes.
    pub fn nil() -> Self {
        Self([0; BYTES_LENGTH])
    }

    /// All bytes set.
    pub fn max() -> Self {
        Self([0xff; BYTES_LENGTH])
    }

    /// Raw 20-byte form.
    pub fn as_bytes(&self) -> &[u8; BYTES_LENGTH] {
        &self.0
    }

    /// Unix seconds encoded in the id.
    pub fn timestamp(&self) -> i64 {
        let mut ts = [0u8; TIMESTAMP_LENGTH];
        ts.copy_from_slice(&self.0[..TIMESTAMP_LENGTH]);
        i64::from(u32::from_be_bytes(ts)) + KSUID_EPOCH
    }

    /// The 16 random bytes after the timestamp.
    pub fn payload(&self) -> &[u8] {
        &self.0[TIMESTAMP_LENGTH..]
    }

    fn encode(&self) -> [u8; KSUID_STRING_LENGTH] {
        let mut out = [b'0'; KSUID_STRING_LENGTH];
        let mut digits: Vec<u8> = self.0.to_vec();
        let mut pos = KSUID_STRING_LENGTH;
        // Long division of the base-256 number by 62, least significant digit first.
        while digits.iter().any(|&d| d != 0) && pos > 0 {
            let mut quotient = Vec::with_capacity(digits.len());
            let mut rem: u32 = 0;
            for &d in &digits {
                let acc = rem * 256 + u32::from(d);
                let q = acc / 62;
                rem = acc % 62;
                if !(quotient.is_empty() && q == 0) {
                    quotient.push(q as u8);
                }
            }
            pos -= 1;
            out[pos] = BASE62[rem as usize];
            digits = quotient;
        }
        out
    }
}

fn base62_digit(c: u8) -> Option<u32> {
    match c {
        b'0'..=b'9' => Some(u32::from(c - b'0')),
        b'A'..=b'Z' => Some(u32::from(c - b'A') + 10),
        b'a'..=b'z' => Some(u32::from(c - b'a') + 36),
        _ => None,
    }
}

impl FromStr for Ksuid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != KSUID_STRING_LENGTH {
            return Err(Error::invalid_argument(format!(
                "ksuid must be {KSUID_STRING_LENGTH} characters, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; BYTES_LENGTH];
        for c in s.bytes() {
            let mut carry = base62_digit(c)
                .ok_or_else(|| Error::invalid_argument(format!("invalid base62 character {:?}", c as char)))?;
            for b in bytes.iter_mut().rev() {
                let v = u32::from(*b) * 62 + carry;
                *b = (v & 0xff) as u8;
                carry = v >> 8;
            }
            if carry != 0 {
                return Err(Error::invalid_argument("ksuid value overflows 160 bits"));
            }
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for Ksuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.encode();
        // BASE62 is pure ASCII.
        f.write_str(std::str::from_utf8(&encoded).map_err(|_| fmt::Error)?)
    }
}

impl fmt::Debug for Ksuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ksuid({self})")
    }
}

impl Serialize for Ksuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ksuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
