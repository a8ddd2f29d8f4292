//! Shared types and identifiers for cairn.
//!
//! This crate defines the core types used across the cairn workspace:
//! identifiers ([`Cid`], [`PeerId`]), DAG structures ([`Node`], [`Link`],
//! [`Block`]), add-operation parameters ([`AddParams`], [`Layout`],
//! [`ShardThreshold`]) and the records handed to the cluster once an add
//! completes ([`Pin`], [`AddedOutput`], [`AddState`]).

use std::fmt;

use serde::{Deserialize, Serialize};

mod node;
mod params;
mod pin;

pub use node::{Block, CodecError, Link, Node, ShardBucket};
pub use params::{
    AddParams, DEFAULT_CHUNK_SIZE, DEFAULT_LAYER_REPEAT, DEFAULT_MAX_LINKS,
    DEFAULT_SHARD_FANOUT_BITS, DEFAULT_SHARD_SIZE, Layout, ParamsError, ShardThreshold,
};
pub use pin::{AddState, AddedOutput, Pin};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Create an ID by hashing arbitrary data with BLAKE3.
            pub fn from_data(data: &[u8]) -> Self {
                Self(blake3::hash(data).into())
            }

            /// Return the raw 32-byte representation.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Return the first 8 hex characters, for log lines.
            pub fn short(&self) -> String {
                self.to_string()[..8].to_string()
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.len() != 64 {
                    return Err(IdParseError::Length(s.len()));
                }
                let mut bytes = [0u8; 32];
                for (i, byte) in bytes.iter_mut().enumerate() {
                    *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                        .map_err(|_| IdParseError::NotHex(s.to_string()))?;
                }
                Ok(Self(bytes))
            }
        }
    };
}

define_id!(
    /// Content identifier for a DAG node: `blake3(postcard(node))`.
    Cid
);

define_id!(
    /// Identifier for a storage peer in the cluster.
    PeerId
);

/// Errors parsing a hex-encoded identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    /// The string is not 64 characters long.
    #[error("expected 64 hex characters, got {0}")]
    Length(usize),

    /// The string contains non-hex characters.
    #[error("invalid hex identifier: {0}")]
    NotHex(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cid_from_data_deterministic() {
        let data = b"hello world";
        assert_eq!(Cid::from_data(data), Cid::from_data(data));
    }

    #[test]
    fn test_cid_different_data_different_id() {
        assert_ne!(Cid::from_data(b"hello"), Cid::from_data(b"world"));
    }

    #[test]
    fn test_display_outputs_hex() {
        let bytes = [
            0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f, 0x60, 0x71, 0x82, 0x93, 0xa4, 0xb5, 0xc6, 0xd7,
            0xe8, 0xf9, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb,
            0xcc, 0xdd, 0xee, 0xff,
        ];
        let cid = Cid::from(bytes);
        assert_eq!(
            cid.to_string(),
            "0a1b2c3d4e5f60718293a4b5c6d7e8f900112233445566778899aabbccddeeff"
        );
        assert_eq!(cid.short(), "0a1b2c3d");
    }

    #[test]
    fn test_parse_hex_roundtrip() {
        let peer = PeerId::from_data(b"peer-1");
        let parsed: PeerId = peer.to_string().parse().unwrap();
        assert_eq!(peer, parsed);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!("abc".parse::<Cid>(), Err(IdParseError::Length(3)));
        let not_hex = "zz".repeat(32);
        assert!(matches!(
            not_hex.parse::<Cid>(),
            Err(IdParseError::NotHex(_))
        ));
    }

    #[test]
    fn test_debug_format() {
        let debug = format!("{:?}", PeerId::from([0u8; 32]));
        assert!(debug.starts_with("PeerId("));
        assert!(debug.ends_with(')'));
    }
}
