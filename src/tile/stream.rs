//! Client batch protocol.
//!
//! A batch answer is a flat sequence of entries, in the order they were
//! produced:
//!
//! ```text
//! descriptor:cstring  size:u32 (big-endian)  payload:[u8; size]
//! ```
//!
//! The sender stops adding entries once its byte limit is reached; the
//! client simply re-requests whatever it did not receive.

use std::collections::HashSet;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::RecordError;

use super::buffer::TileBuffer;

/// Result of offering a buffer to a [`BatchOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    Added,
    /// The descriptor was already in the output
    Duplicate,
    /// Adding the entry would exceed the byte limit
    Full,
}

/// Accumulates the answer to one batch.
#[derive(Debug, Default)]
pub struct BatchOutput {
    buf: BytesMut,
    max_bytes: Option<usize>,
    descriptors: HashSet<String>,
}

impl BatchOutput {
    /// Output limited to `max_bytes`, if given. The first entry is always
    /// accepted so a tiny limit still makes progress.
    pub fn new(max_bytes: Option<usize>) -> Self {
        Self {
            buf: BytesMut::new(),
            max_bytes,
            descriptors: HashSet::new(),
        }
    }

    fn entry_len(buffer: &TileBuffer) -> usize {
        buffer.descriptor.len() + 1 + 4 + buffer.payload.len()
    }

    pub fn push(&mut self, buffer: &TileBuffer) -> PushResult {
        if self.descriptors.contains(&buffer.descriptor) {
            return PushResult::Duplicate;
        }
        if let Some(max) = self.max_bytes {
            if !self.buf.is_empty() && self.buf.len() + Self::entry_len(buffer) > max {
                return PushResult::Full;
            }
        }

        self.buf.reserve(Self::entry_len(buffer));
        self.buf.put_slice(buffer.descriptor.as_bytes());
        self.buf.put_u8(0);
        self.buf.put_u32(buffer.payload.len() as u32);
        self.buf.put_slice(&buffer.payload);
        self.descriptors.insert(buffer.descriptor.clone());
        PushResult::Added
    }

    pub fn contains(&self, descriptor: &str) -> bool {
        self.descriptors.contains(descriptor)
    }

    /// Number of entries added.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Encoded size so far.
    pub fn bytes(&self) -> usize {
        self.buf.len()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

/// One decoded batch entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub descriptor: String,
    pub payload: Bytes,
}

/// Decode a batch answer.
pub fn decode_batch(data: &Bytes) -> Result<Vec<BatchEntry>, RecordError> {
    let mut entries = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let len = data[offset..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(RecordError::UnterminatedString(offset))?;
        let descriptor = std::str::from_utf8(&data[offset..offset + len])
            .map_err(|_| RecordError::InvalidUtf8(offset))?
            .to_string();
        offset += len + 1;

        let header = data.get(offset..offset + 4).ok_or(RecordError::Truncated {
            offset,
            needed: 4,
            available: data.len() - offset,
        })?;
        let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        offset += 4;

        if data.len() - offset < size {
            return Err(RecordError::Truncated {
                offset,
                needed: size,
                available: data.len() - offset,
            });
        }
        entries.push(BatchEntry {
            descriptor,
            payload: data.slice(offset..offset + size),
        });
        offset += size;
    }
    Ok(entries)
}
