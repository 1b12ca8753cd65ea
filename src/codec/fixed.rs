// SPDX-License-Identifier: GPL-3.0-only

//! Bounded fixed-length name fields
//!
//! Control-call records carry names in fixed byte arrays (`driver[16]`,
//! `card[32]`, ...). A name may fill the whole array, so the terminator is
//! optional: readers stop at the first NUL *or* at the array length,
//! whichever comes first.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Name does not fit the fixed field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Name of {len} bytes exceeds the {capacity}-byte field")]
pub struct NameTooLong {
    pub len: usize,
    pub capacity: usize,
}

/// A name stored in an `N`-byte array, NUL-padded when shorter than `N`
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedName<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> FixedName<N> {
    /// Field capacity in bytes
    pub const CAPACITY: usize = N;

    /// An all-zero (empty) name
    pub const fn empty() -> Self {
        Self { bytes: [0; N] }
    }

    /// Wrap raw bytes exactly as a device returned them
    pub const fn from_raw(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    /// Store `name`, refusing to truncate it
    pub fn try_new(name: &str) -> Result<Self, NameTooLong> {
        let src = name.as_bytes();
        if src.len() > N {
            return Err(NameTooLong {
                len: src.len(),
                capacity: N,
            });
        }
        let mut bytes = [0u8; N];
        bytes[..src.len()].copy_from_slice(src);
        Ok(Self { bytes })
    }

    /// Store `name`, explicitly cutting it to the first `N` bytes
    pub fn truncated(name: &str) -> Self {
        let src = name.as_bytes();
        let len = src.len().min(N);
        let mut bytes = [0u8; N];
        bytes[..len].copy_from_slice(&src[..len]);
        Self { bytes }
    }

    /// Raw field contents including padding
    pub fn raw(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Name bytes up to the first NUL or the end of the field
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.bytes.iter().position(|&c| c == 0).unwrap_or(N);
        &self.bytes[..len]
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode as UTF-8, replacing invalid sequences
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl<const N: usize> Default for FixedName<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> fmt::Display for FixedName<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl<const N: usize> fmt::Debug for FixedName<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl<const N: usize> PartialEq<&str> for FixedName<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> TryFrom<&str> for FixedName<N> {
    type Error = NameTooLong;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl<const N: usize> Serialize for FixedName<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedName<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::try_new(&name).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_length_name_without_terminator() {
        // Every byte used: no NUL anywhere in the field
        let name = FixedName::<4>::from_raw(*b"ABCD");
        assert_eq!(name.as_bytes(), b"ABCD");
        assert_eq!(name.len(), 4);
    }

    #[test]
    fn test_stops_at_first_nul() {
        let name = FixedName::<8>::from_raw(*b"uvc\0junk");
        assert_eq!(name.to_string_lossy(), "uvc");
    }

    #[test]
    fn test_refuses_to_truncate() {
        let err = FixedName::<16>::try_new("a driver name that is too long").unwrap_err();
        assert_eq!(err.capacity, 16);
        assert!(FixedName::<16>::try_new("exactly16bytes!!").is_ok());
    }

    #[test]
    fn test_serde_as_string() {
        let name = FixedName::<32>::try_new("Mock Card").unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"Mock Card\"");
        let back: FixedName<32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
        assert!(serde_json::from_str::<FixedName<2>>("\"abc\"").is_err());
    }
}
