//! Tile buffers and checksums.

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::descriptor::TileDescriptor;

/// Payload sent for descriptors that could not be parsed.
pub const OCEAN_PAYLOAD: &[u8] = b"OCEAN\0";

/// 32-bit tile checksum: the first four bytes of the SHA-256 digest, big-endian.
pub fn checksum(bytes: &[u8]) -> u32 {
    let digest = Sha256::digest(bytes);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// One tile (or resource) as produced by the origin, held in the cache and
/// sent to the client.
///
/// For string tiles `checksum` is not a hash of `payload`: it is the
/// checksum of the geometry the labels were placed on, which is what ties a
/// string tile to its data tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileBuffer {
    pub descriptor: String,
    pub payload: Bytes,
    pub checksum: u32,
    pub empty: bool,
    /// False once a consistency check has failed for this buffer
    pub good: bool,
}

impl TileBuffer {
    /// Buffer whose checksum is the hash of its own payload.
    pub fn new(descriptor: impl Into<String>, payload: Bytes) -> Self {
        let checksum = checksum(&payload);
        let empty = payload.is_empty();
        Self {
            descriptor: descriptor.into(),
            payload,
            checksum,
            empty,
            good: true,
        }
    }

    /// Buffer with an externally supplied checksum.
    pub fn with_checksum(
        descriptor: impl Into<String>,
        payload: Bytes,
        checksum: u32,
        empty: bool,
    ) -> Self {
        Self {
            descriptor: descriptor.into(),
            payload,
            checksum,
            empty,
            good: true,
        }
    }

    /// Stand-in tile for a descriptor that could not be parsed.
    pub fn ocean(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            payload: Bytes::from_static(OCEAN_PAYLOAD),
            checksum: checksum(OCEAN_PAYLOAD),
            empty: true,
            good: true,
        }
    }

    /// Empty stand-in for a tile the client may not see or that could not
    /// be made consistent.
    pub fn placeholder(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            payload: Bytes::new(),
            checksum: 0,
            empty: true,
            good: true,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.empty && self.payload.is_empty()
    }

    /// Whether this buffer may be handed to the client.
    pub fn is_deliverable(&self) -> bool {
        self.good || self.is_placeholder()
    }

    pub fn mark_bad(&mut self) {
        self.good = false;
    }

    /// Parsed tile descriptor, if this buffer holds a tile.
    pub fn tile_descriptor(&self) -> Option<TileDescriptor> {
        TileDescriptor::parse(&self.descriptor)
    }
}
