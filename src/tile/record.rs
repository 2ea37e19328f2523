//! Cache record codec.
//!
//! A cache record holds one importance group. All integers are big-endian:
//!
//! ```text
//! count:u32
//! repeated count times:
//!     payload_size:u32  checksum:u32  descriptor:cstring  is_empty:u8  payload
//! ```
//!
//! Payloads are sliced out of the record without copying.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::RecordError;

use super::buffer::TileBuffer;

/// Ordered buffers sharing one base descriptor, importance 0 first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntryGroup {
    buffers: Vec<TileBuffer>,
}

impl CacheEntryGroup {
    pub fn new(buffers: Vec<TileBuffer>) -> Self {
        Self { buffers }
    }

    pub fn single(buffer: TileBuffer) -> Self {
        Self {
            buffers: vec![buffer],
        }
    }

    pub fn buffers(&self) -> &[TileBuffer] {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut [TileBuffer] {
        &mut self.buffers
    }

    pub fn into_buffers(self) -> Vec<TileBuffer> {
        self.buffers
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn get(&self, importance: usize) -> Option<&TileBuffer> {
        self.buffers.get(importance)
    }

    pub fn all_good(&self) -> bool {
        self.buffers.iter().all(|b| b.good)
    }

    /// Total payload bytes held.
    pub fn payload_size(&self) -> usize {
        self.buffers.iter().map(|b| b.payload.len()).sum()
    }

    /// Serialize into the record layout.
    pub fn encode(&self) -> Bytes {
        let size = 4 + self
            .buffers
            .iter()
            .map(|b| 4 + 4 + b.descriptor.len() + 1 + 1 + b.payload.len())
            .sum::<usize>();
        let mut out = BytesMut::with_capacity(size);
        out.put_u32(self.buffers.len() as u32);
        for buffer in &self.buffers {
            out.put_u32(buffer.payload.len() as u32);
            out.put_u32(buffer.checksum);
            out.put_slice(buffer.descriptor.as_bytes());
            out.put_u8(0);
            out.put_u8(buffer.empty as u8);
            out.put_slice(&buffer.payload);
        }
        out.freeze()
    }

    /// Parse a record. Every decoded buffer is marked good.
    pub fn decode(record: &Bytes) -> Result<Self, RecordError> {
        let mut reader = RecordReader::new(record);
        let count = reader.u32()? as usize;
        // Each buffer needs at least 10 bytes; reject absurd counts up front.
        if count > record.len() / 10 {
            return Err(RecordError::Truncated {
                offset: 4,
                needed: count.saturating_mul(10),
                available: record.len().saturating_sub(4),
            });
        }

        let mut buffers = Vec::with_capacity(count);
        for _ in 0..count {
            let size = reader.u32()? as usize;
            let checksum = reader.u32()?;
            let descriptor = reader.cstring()?;
            let empty = reader.flag()?;
            let payload = reader.bytes(size)?;
            buffers.push(TileBuffer::with_checksum(descriptor, payload, checksum, empty));
        }

        let left = reader.remaining();
        if left > 0 {
            return Err(RecordError::TrailingBytes(left));
        }
        Ok(Self { buffers })
    }
}

struct RecordReader<'a> {
    data: &'a Bytes,
    offset: usize,
}

impl<'a> RecordReader<'a> {
    fn new(data: &'a Bytes) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], RecordError> {
        if self.remaining() < needed {
            return Err(RecordError::Truncated {
                offset: self.offset,
                needed,
                available: self.remaining(),
            });
        }
        let data: &'a [u8] = self.data;
        let slice = &data[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, RecordError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn flag(&mut self) -> Result<bool, RecordError> {
        let offset = self.offset;
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(RecordError::InvalidFlag { offset, value }),
        }
    }

    fn cstring(&mut self) -> Result<String, RecordError> {
        let start = self.offset;
        let data: &'a [u8] = self.data;
        let len = data[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(RecordError::UnterminatedString(start))?;
        let text = std::str::from_utf8(&data[start..start + len])
            .map_err(|_| RecordError::InvalidUtf8(start))?
            .to_string();
        self.offset += len + 1;
        Ok(text)
    }

    fn bytes(&mut self, size: usize) -> Result<Bytes, RecordError> {
        let start = self.offset;
        self.take(size)?;
        Ok(self.data.slice(start..start + size))
    }
}
