//! Fixed-width values stored and served by key stores and directories.
//!
//! Widths are part of the compatibility surface and must be preserved
//! bit-exact:
//!
//! - [`Address`]: 20-byte caller/owner/store identifier
//! - [`PublicKey`]: 32-byte public key material
//! - [`Signature`]: 64 bytes, persisted as two 32-byte halves
//! - [`Username`]: 32 bytes, right-padded with zeros or truncated
//!
//! "Empty" always means all bytes zero. Text form is lowercase hex with a
//! `0x` prefix; the prefix is optional when parsing.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::EncodingError;

/// Width of an [`Address`] in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Width of a [`PublicKey`] in bytes.
pub const KEY_LEN: usize = 32;

/// Width of a [`Signature`] in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Width of a [`Username`] in bytes.
pub const USERNAME_LEN: usize = 32;

fn fixed<const N: usize>(field: &'static str, bytes: &[u8]) -> Result<[u8; N], EncodingError> {
    <[u8; N]>::try_from(bytes).map_err(|_| EncodingError::InvalidLength {
        field,
        expected: N,
        actual: bytes.len(),
    })
}

fn decode_hex(field: &'static str, text: &str) -> Result<Vec<u8>, EncodingError> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    hex::decode(digits).map_err(|e| EncodingError::InvalidHex { field, reason: e.to_string() })
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr, $field:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        pub struct $name([u8; $len]);

        impl $name {
            /// All-zero value.
            pub const ZERO: Self = Self([0; $len]);

            /// Wrap raw bytes.
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Decode from a slice that must be exactly the fixed width.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, EncodingError> {
                fixed($field, bytes).map(Self)
            }

            /// Raw bytes.
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Whether every byte is zero.
            pub fn is_zero(&self) -> bool {
                self.0 == [0; $len]
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({self})", stringify!($name))
            }
        }

        impl FromStr for $name {
            type Err = EncodingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_slice(&decode_hex($field, s)?)
            }
        }
    };
}

fixed_bytes!(
    /// Identity of a caller, an owner, or a deployed store.
    ///
    /// The zero address doubles as "absent" in directory lookups.
    Address,
    ADDRESS_LEN,
    "address"
);

fixed_bytes!(
    /// Public key material (identity, signed prekey, or one-time prekey).
    PublicKey,
    KEY_LEN,
    "public key"
);

/// Signature over the signed prekey.
///
/// Held as two 32-byte halves: the first half is bytes 0..32, the second
/// bytes 32..64. This store never verifies it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Signature([[u8; KEY_LEN]; 2]);

impl Signature {
    /// All-zero signature.
    pub const ZERO: Self = Self([[0; KEY_LEN]; 2]);

    /// Build from the two persisted halves.
    pub const fn from_halves(first: [u8; KEY_LEN], second: [u8; KEY_LEN]) -> Self {
        Self([first, second])
    }

    /// Split a contiguous 64-byte signature into halves.
    pub fn from_bytes(bytes: &[u8; SIGNATURE_LEN]) -> Self {
        let mut halves = [[0u8; KEY_LEN]; 2];
        halves[0].copy_from_slice(&bytes[..KEY_LEN]);
        halves[1].copy_from_slice(&bytes[KEY_LEN..]);
        Self(halves)
    }

    /// Decode from a slice that must be exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EncodingError> {
        fixed::<SIGNATURE_LEN>("signature", bytes).map(|b| Self::from_bytes(&b))
    }

    /// The two 32-byte halves, in order.
    pub const fn halves(&self) -> [[u8; KEY_LEN]; 2] {
        self.0
    }

    /// Contiguous 64-byte form.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        let mut out = [0u8; SIGNATURE_LEN];
        out[..KEY_LEN].copy_from_slice(&self.0[0]);
        out[KEY_LEN..].copy_from_slice(&self.0[1]);
        out
    }

    /// Whether both halves are all zero.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({self})")
    }
}

impl FromStr for Signature {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&decode_hex("signature", s)?)
    }
}

/// Human-readable label, canonicalized to 32 bytes.
///
/// Shorter input is right-padded with zeros, longer input is truncated. The
/// label is informational in a key store and the lookup key in a directory.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Username([u8; USERNAME_LEN]);

impl Username {
    /// Empty (all-zero) username.
    pub const EMPTY: Self = Self([0; USERNAME_LEN]);

    /// Canonicalize arbitrary bytes to the fixed width.
    pub fn new(bytes: &[u8]) -> Self {
        let mut out = [0u8; USERNAME_LEN];
        let n = bytes.len().min(USERNAME_LEN);
        out[..n].copy_from_slice(&bytes[..n]);
        Self(out)
    }

    /// Raw padded bytes.
    pub const fn as_bytes(&self) -> &[u8; USERNAME_LEN] {
        &self.0
    }

    /// Bytes with trailing zero padding removed.
    pub fn trimmed(&self) -> &[u8] {
        let end = self.0.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        &self.0[..end]
    }

    /// Whether the username is all zeros.
    pub fn is_empty(&self) -> bool {
        self.0 == [0; USERNAME_LEN]
    }
}

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.trimmed()))
    }
}

impl fmt::Debug for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Username({:?})", String::from_utf8_lossy(self.trimmed()))
    }
}
