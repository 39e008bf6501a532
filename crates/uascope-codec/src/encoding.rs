// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Binary encoder and decoder primitives.
//!
//! OPC UA binary encoding (Part 6) is little-endian throughout. The
//! [`Encoder`] appends to a growable buffer; the [`Decoder`] walks a borrowed
//! slice with strict bounds checking so truncated or hostile input can never
//! read out of bounds or allocate unbounded memory.

use crate::error::{CodecError, CodecResult};

/// Maximum nesting depth for recursive structures (Variant, DiagnosticInfo).
pub const MAX_DECODING_DEPTH: u32 = 16;

// =============================================================================
// Encoder
// =============================================================================

/// Append-only binary encoder.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Creates an empty encoder.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Creates an encoder with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Consumes the encoder and returns the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Returns the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Writes a boolean as a single byte (0 or 1).
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    /// Writes a signed byte.
    pub fn write_i8(&mut self, value: i8) {
        self.buf.push(value as u8);
    }

    /// Writes a little-endian u16.
    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian i16.
    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian u32.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian i32.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian u64.
    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian i64.
    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian f32.
    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian f64.
    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an optional string: i32 byte length (-1 for null) + UTF-8 bytes.
    pub fn write_opt_string(&mut self, value: Option<&str>) -> CodecResult<()> {
        match value {
            None => {
                self.write_i32(-1);
                Ok(())
            }
            Some(s) => self.write_sized(s.as_bytes()),
        }
    }

    /// Writes a non-null string.
    pub fn write_string(&mut self, value: &str) -> CodecResult<()> {
        self.write_sized(value.as_bytes())
    }

    /// Writes an optional byte string: i32 length (-1 for null) + bytes.
    pub fn write_opt_byte_string(&mut self, value: Option<&[u8]>) -> CodecResult<()> {
        match value {
            None => {
                self.write_i32(-1);
                Ok(())
            }
            Some(b) => self.write_sized(b),
        }
    }

    /// Writes an array length prefix. `None` encodes as -1 (null array).
    pub fn write_array_len(&mut self, len: Option<usize>) -> CodecResult<()> {
        match len {
            None => {
                self.write_i32(-1);
                Ok(())
            }
            Some(n) => {
                let n = i32::try_from(n).map_err(|_| {
                    CodecError::not_encodable(format!("array length {n} exceeds i32::MAX"))
                })?;
                self.write_i32(n);
                Ok(())
            }
        }
    }

    fn write_sized(&mut self, bytes: &[u8]) -> CodecResult<()> {
        let len = i32::try_from(bytes.len()).map_err(|_| {
            CodecError::not_encodable(format!("field of {} bytes exceeds i32::MAX", bytes.len()))
        })?;
        self.write_i32(len);
        self.write_bytes(bytes);
        Ok(())
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// Bounds-checked binary decoder over a borrowed slice.
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: u32,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over the given input.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            depth: 0,
        }
    }

    /// Returns the current read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns `true` if all input has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Enters a nested structure, enforcing the depth limit.
    pub fn enter(&mut self) -> CodecResult<()> {
        self.depth += 1;
        if self.depth > MAX_DECODING_DEPTH {
            return Err(CodecError::DepthLimitExceeded {
                max: MAX_DECODING_DEPTH,
            });
        }
        Ok(())
    }

    /// Leaves a nested structure.
    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Reads exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                needed: n - self.remaining(),
                offset: self.pos,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads a boolean. Any non-zero byte decodes as `true`.
    pub fn read_bool(&mut self) -> CodecResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a signed byte.
    pub fn read_i8(&mut self) -> CodecResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads a little-endian u16.
    pub fn read_u16(&mut self) -> CodecResult<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Reads a little-endian i16.
    pub fn read_i16(&mut self) -> CodecResult<i16> {
        Ok(self.read_u16()? as i16)
    }

    /// Reads a little-endian u32.
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a little-endian i32.
    pub fn read_i32(&mut self) -> CodecResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Reads a little-endian u64.
    pub fn read_u64(&mut self) -> CodecResult<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads a little-endian i64.
    pub fn read_i64(&mut self) -> CodecResult<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Reads a little-endian f32.
    pub fn read_f32(&mut self) -> CodecResult<f32> {
        Ok(f32::from_le_bytes(self.read_bytes(4)?.try_into().unwrap()))
    }

    /// Reads a little-endian f64.
    pub fn read_f64(&mut self) -> CodecResult<f64> {
        Ok(f64::from_le_bytes(self.read_bytes(8)?.try_into().unwrap()))
    }

    /// Reads an optional string (i32 length prefix, -1 = null).
    pub fn read_opt_string(&mut self) -> CodecResult<Option<String>> {
        match self.read_sized()? {
            None => Ok(None),
            Some(bytes) => Ok(Some(String::from_utf8(bytes.to_vec())?)),
        }
    }

    /// Reads a string, mapping null to the empty string.
    pub fn read_string(&mut self) -> CodecResult<String> {
        Ok(self.read_opt_string()?.unwrap_or_default())
    }

    /// Reads an optional byte string (i32 length prefix, -1 = null).
    pub fn read_opt_byte_string(&mut self) -> CodecResult<Option<Vec<u8>>> {
        Ok(self.read_sized()?.map(<[u8]>::to_vec))
    }

    /// Reads a byte string, mapping null to empty.
    pub fn read_byte_string(&mut self) -> CodecResult<Vec<u8>> {
        Ok(self.read_opt_byte_string()?.unwrap_or_default())
    }

    /// Reads an array length prefix.
    ///
    /// Returns `None` for a null array (-1). The declared length is validated
    /// against the remaining input with a conservative one-byte-per-element
    /// bound, so a hostile length cannot trigger a huge allocation.
    pub fn read_array_len(&mut self) -> CodecResult<Option<usize>> {
        let len = self.read_i32()?;
        if len == -1 {
            return Ok(None);
        }
        if len < 0 {
            return Err(CodecError::InvalidLength { length: len });
        }
        let len = len as usize;
        if len > self.remaining() {
            return Err(CodecError::LengthExceedsInput {
                declared: len,
                remaining: self.remaining(),
            });
        }
        Ok(Some(len))
    }

    fn read_sized(&mut self) -> CodecResult<Option<&'a [u8]>> {
        let len = self.read_i32()?;
        if len == -1 {
            return Ok(None);
        }
        if len < 0 {
            return Err(CodecError::InvalidLength { length: len });
        }
        let len = len as usize;
        if len > self.remaining() {
            return Err(CodecError::LengthExceedsInput {
                declared: len,
                remaining: self.remaining(),
            });
        }
        Ok(Some(self.read_bytes(len)?))
    }
}

// =============================================================================
// Encode / Decode traits
// =============================================================================

/// A type encodable to OPC UA binary form.
pub trait BinaryEncode {
    /// Appends the binary form of `self` to the encoder.
    fn encode(&self, encoder: &mut Encoder) -> CodecResult<()>;

    /// Convenience helper returning the encoded bytes.
    fn encode_to_vec(&self) -> CodecResult<Vec<u8>> {
        let mut encoder = Encoder::new();
        self.encode(&mut encoder)?;
        Ok(encoder.finish())
    }
}

/// A type decodable from OPC UA binary form.
pub trait BinaryDecode: Sized {
    /// Decodes one value from the decoder.
    fn decode(decoder: &mut Decoder<'_>) -> CodecResult<Self>;

    /// Convenience helper decoding from a complete slice.
    fn decode_from_slice(bytes: &[u8]) -> CodecResult<Self> {
        let mut decoder = Decoder::new(bytes);
        Self::decode(&mut decoder)
    }
}

/// Encodes an optional array with an i32 length prefix (`None` = null array).
pub fn encode_array<T: BinaryEncode>(
    encoder: &mut Encoder,
    items: Option<&[T]>,
) -> CodecResult<()> {
    match items {
        None => encoder.write_array_len(None),
        Some(items) => {
            encoder.write_array_len(Some(items.len()))?;
            for item in items {
                item.encode(encoder)?;
            }
            Ok(())
        }
    }
}

/// Decodes an optional array with an i32 length prefix.
pub fn decode_array<T: BinaryDecode>(decoder: &mut Decoder<'_>) -> CodecResult<Option<Vec<T>>> {
    match decoder.read_array_len()? {
        None => Ok(None),
        Some(len) => {
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(T::decode(decoder)?);
            }
            Ok(Some(items))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_round_trip() {
        let mut enc = Encoder::new();
        enc.write_bool(true);
        enc.write_u8(0xAB);
        enc.write_i16(-2);
        enc.write_u32(0xDEAD_BEEF);
        enc.write_i64(-1234567890123);
        enc.write_f64(3.5);
        let bytes = enc.finish();

        let mut dec = Decoder::new(&bytes);
        assert!(dec.read_bool().unwrap());
        assert_eq!(dec.read_u8().unwrap(), 0xAB);
        assert_eq!(dec.read_i16().unwrap(), -2);
        assert_eq!(dec.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(dec.read_i64().unwrap(), -1234567890123);
        assert_eq!(dec.read_f64().unwrap(), 3.5);
        assert!(dec.is_exhausted());
    }

    #[test]
    fn test_little_endian_layout() {
        let mut enc = Encoder::new();
        enc.write_u32(0x0102_0304);
        assert_eq!(enc.finish(), vec![0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_string_null_and_empty_are_distinct() {
        let mut enc = Encoder::new();
        enc.write_opt_string(None).unwrap();
        enc.write_opt_string(Some("")).unwrap();
        enc.write_opt_string(Some("ua")).unwrap();
        let bytes = enc.finish();

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_opt_string().unwrap(), None);
        assert_eq!(dec.read_opt_string().unwrap(), Some(String::new()));
        assert_eq!(dec.read_opt_string().unwrap(), Some("ua".to_string()));
    }

    #[test]
    fn test_truncated_input_is_an_error() {
        let mut dec = Decoder::new(&[0x01, 0x02]);
        let err = dec.read_u32().unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_hostile_length_is_rejected() {
        // Declares a 1 GiB string with only 4 bytes of input.
        let bytes = 0x4000_0000_i32.to_le_bytes();
        let mut dec = Decoder::new(&bytes);
        let err = dec.read_opt_string().unwrap_err();
        assert!(matches!(err, CodecError::LengthExceedsInput { .. }));
    }

    #[test]
    fn test_negative_length_other_than_null_is_rejected() {
        let bytes = (-2_i32).to_le_bytes();
        let mut dec = Decoder::new(&bytes);
        let err = dec.read_opt_byte_string().unwrap_err();
        assert!(matches!(err, CodecError::InvalidLength { length: -2 }));
    }
}
