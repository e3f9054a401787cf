//! Sequential BSATN reader and writer.
//!
//! [`Writer`] appends values to a growable byte buffer; [`Reader`] consumes
//! values from a fixed slice, tracking a cursor. All multi-byte integers and
//! floats are little-endian and fixed width. Strings and byte blobs carry a
//! `u32` length prefix and no terminator. Optionals are one tag byte
//! (0 = absent, 1 = present) optionally followed by the payload. Sequences
//! are a `u32` element count followed by the elements.

use bytes::{BufMut, Bytes, BytesMut};
use ethnum::{I256, U256};

use crate::error::DecodeError;

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Appends BSATN-encoded values to a growable buffer.
#[derive(Debug, Default)]
pub struct Writer {
    buf: BytesMut,
}

macro_rules! put_le {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Writes a `", stringify!($ty), "` in little-endian encoding.")]
            #[inline]
            pub fn $name(&mut self, val: $ty) {
                self.buf.put_slice(&val.to_le_bytes());
            }
        )*
    };
}

impl Writer {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer with `capacity` bytes preallocated.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    put_le! {
        put_u8: u8,
        put_u16: u16,
        put_u32: u32,
        put_u64: u64,
        put_u128: u128,
        put_u256: U256,
        put_i8: i8,
        put_i16: i16,
        put_i32: i32,
        put_i64: i64,
        put_i128: i128,
        put_i256: I256,
        put_f32: f32,
        put_f64: f64,
    }

    /// Writes a bool as a single byte (1 = true, 0 = false).
    #[inline]
    pub fn put_bool(&mut self, val: bool) {
        self.put_u8(u8::from(val));
    }

    /// Writes raw bytes with no length prefix.
    ///
    /// Used for fixed-width fields whose length the schema supplies, such as
    /// 32-byte identities.
    #[inline]
    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Writes a `u32` element count for a sequence.
    ///
    /// Lengths above `u32::MAX` cannot be represented on the wire.
    #[inline]
    pub fn put_count(&mut self, count: usize) {
        debug_assert!(count <= u32::MAX as usize);
        self.put_u32(count as u32);
    }

    /// Writes a length-prefixed byte blob.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_count(bytes.len());
        self.buf.put_slice(bytes);
    }

    /// Writes a length-prefixed UTF-8 string with no terminator.
    pub fn put_str(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    /// Writes an optional's tag byte (0 = absent, 1 = present).
    ///
    /// When `present`, the caller writes the payload next.
    #[inline]
    pub fn put_option_tag(&mut self, present: bool) {
        self.put_u8(u8::from(present));
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Borrows the encoded bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer, freezing the buffer.
    #[must_use]
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Consumes BSATN-encoded values sequentially from a fixed buffer.
///
/// Every read advances an internal cursor. A read past the end of the buffer
/// fails with [`DecodeError::Truncated`] and the buffer must be discarded;
/// there is no resynchronization.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

macro_rules! get_le {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Reads a little-endian `", stringify!($ty), "`.")]
            ///
            /// # Errors
            ///
            /// Returns [`DecodeError::Truncated`] if the input is too short.
            #[inline]
            pub fn $name(&mut self) -> Result<$ty, DecodeError> {
                const N: usize = core::mem::size_of::<$ty>();
                let chunk = self.take(N, stringify!($ty))?;
                let mut le = [0u8; N];
                le.copy_from_slice(chunk);
                Ok(<$ty>::from_le_bytes(le))
            }
        )*
    };
}

impl<'a> Reader<'a> {
    /// Creates a reader over `buf` with the cursor at the start.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns `true` if the cursor has reached the end of the buffer.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Consumes `n` bytes, failing with context if fewer remain.
    fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        let remaining = self.remaining();
        if remaining < n {
            return Err(DecodeError::Truncated {
                context,
                needed: n - remaining,
                remaining,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    get_le! {
        get_u8: u8,
        get_u16: u16,
        get_u32: u32,
        get_u64: u64,
        get_u128: u128,
        get_u256: U256,
        get_i8: i8,
        get_i16: i16,
        get_i32: i32,
        get_i64: i64,
        get_i128: i128,
        get_i256: I256,
        get_f32: f32,
        get_f64: f64,
    }

    /// Reads a bool byte, rejecting anything other than 0 or 1.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidBool`] for any other byte, or
    /// [`DecodeError::Truncated`] if the input is exhausted.
    pub fn get_bool(&mut self) -> Result<bool, DecodeError> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            byte => Err(DecodeError::InvalidBool(byte)),
        }
    }

    /// Reads `n` raw bytes with no length prefix.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] if fewer than `n` bytes remain.
    pub fn get_raw(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.take(n, "raw bytes")
    }

    /// Reads a fixed-width byte array with no length prefix.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] if fewer than `N` bytes remain.
    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, "byte array")?);
        Ok(out)
    }

    /// Reads a `u32` sequence element count.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] if the input is too short.
    pub fn get_count(&mut self) -> Result<usize, DecodeError> {
        Ok(self.get_u32()? as usize)
    }

    /// Reads a length-prefixed byte blob.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] if the input is too short for the
    /// prefix or the payload.
    pub fn get_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.get_count()?;
        self.take(len, "byte blob")
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUtf8`] if the payload is not UTF-8, or
    /// [`DecodeError::Truncated`] if the input is too short.
    pub fn get_str(&mut self) -> Result<&'a str, DecodeError> {
        let bytes = self.get_bytes()?;
        core::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Reads a length-prefixed UTF-8 string into an owned `String`.
    ///
    /// # Errors
    ///
    /// Same as [`Reader::get_str`].
    pub fn get_string(&mut self) -> Result<String, DecodeError> {
        self.get_str().map(str::to_owned)
    }

    /// Reads an optional's tag byte, rejecting anything other than 0 or 1.
    ///
    /// Returns `true` if a payload follows.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidOptionTag`] for any other byte, or
    /// [`DecodeError::Truncated`] if the input is exhausted.
    pub fn get_option_tag(&mut self) -> Result<bool, DecodeError> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            byte => Err(DecodeError::InvalidOptionTag(byte)),
        }
    }

    /// Fails with [`DecodeError::TrailingBytes`] unless the buffer is fully
    /// consumed.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::TrailingBytes`] if bytes remain.
    pub fn expect_exhausted(&self) -> Result<(), DecodeError> {
        if self.is_exhausted() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes {
                remaining: self.remaining(),
            })
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_round_trip() {
        let mut w = Writer::new();
        w.put_u8(0xab);
        w.put_u16(0xbeef);
        w.put_u32(0xdead_beef);
        w.put_u64(u64::MAX);
        w.put_u128(u128::MAX - 1);
        w.put_i8(-5);
        w.put_i16(i16::MIN);
        w.put_i32(-1);
        w.put_i64(i64::MIN);
        w.put_i128(i128::MIN);
        w.put_f32(1.5);
        w.put_f64(-0.25);
        w.put_bool(true);
        w.put_bool(false);

        let bytes = w.finish();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.get_u8().unwrap(), 0xab);
        assert_eq!(r.get_u16().unwrap(), 0xbeef);
        assert_eq!(r.get_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.get_u64().unwrap(), u64::MAX);
        assert_eq!(r.get_u128().unwrap(), u128::MAX - 1);
        assert_eq!(r.get_i8().unwrap(), -5);
        assert_eq!(r.get_i16().unwrap(), i16::MIN);
        assert_eq!(r.get_i32().unwrap(), -1);
        assert_eq!(r.get_i64().unwrap(), i64::MIN);
        assert_eq!(r.get_i128().unwrap(), i128::MIN);
        assert_eq!(r.get_f32().unwrap(), 1.5);
        assert_eq!(r.get_f64().unwrap(), -0.25);
        assert!(r.get_bool().unwrap());
        assert!(!r.get_bool().unwrap());
        assert!(r.is_exhausted());
    }

    #[test]
    fn test_wide_integer_round_trip() {
        for val in [U256::ZERO, U256::ONE, U256::MAX] {
            let mut w = Writer::new();
            w.put_u256(val);
            assert_eq!(w.len(), 32);
            assert_eq!(Reader::new(w.as_slice()).get_u256().unwrap(), val);
        }
        for val in [I256::ZERO, I256::MIN, I256::MAX, I256::from(-1i32)] {
            let mut w = Writer::new();
            w.put_i256(val);
            assert_eq!(Reader::new(w.as_slice()).get_i256().unwrap(), val);
        }
    }

    #[test]
    fn test_little_endian_layout() {
        let mut w = Writer::new();
        w.put_u32(0x0403_0201);
        assert_eq!(w.as_slice(), &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_string_length_prefixed() {
        let mut w = Writer::new();
        w.put_str("eddy");
        assert_eq!(w.as_slice(), &[4, 0, 0, 0, b'e', b'd', b'd', b'y']);

        let bytes = w.finish();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.get_str().unwrap(), "eddy");
        assert!(r.is_exhausted());
    }

    #[test]
    fn test_empty_string_and_blob() {
        let mut w = Writer::new();
        w.put_str("");
        w.put_bytes(&[]);
        let bytes = w.finish();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.get_str().unwrap(), "");
        assert_eq!(r.get_bytes().unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_truncated_read_fails() {
        let mut r = Reader::new(&[0x01, 0x02]);
        let err = r.get_u32().unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                context: "u32",
                needed: 2,
                remaining: 2,
            }
        );
    }

    #[test]
    fn test_truncated_blob_fails() {
        // Length prefix says 10 bytes, only 2 present.
        let mut w = Writer::new();
        w.put_u32(10);
        w.put_raw(&[0xaa, 0xbb]);
        let bytes = w.finish();
        assert!(matches!(
            Reader::new(&bytes).get_bytes(),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_fails() {
        let mut w = Writer::new();
        w.put_bytes(&[0xff, 0xfe]);
        let bytes = w.finish();
        assert_eq!(Reader::new(&bytes).get_str(), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn test_invalid_bool_fails() {
        let mut r = Reader::new(&[2]);
        assert_eq!(r.get_bool(), Err(DecodeError::InvalidBool(2)));
    }

    #[test]
    fn test_option_tags() {
        let mut w = Writer::new();
        w.put_option_tag(false);
        w.put_option_tag(true);
        w.put_u8(7);
        let bytes = w.finish();
        let mut r = Reader::new(&bytes);
        assert!(!r.get_option_tag().unwrap());
        assert!(r.get_option_tag().unwrap());
        assert_eq!(r.get_u8().unwrap(), 7);

        assert_eq!(
            Reader::new(&[9]).get_option_tag(),
            Err(DecodeError::InvalidOptionTag(9))
        );
    }

    #[test]
    fn test_expect_exhausted() {
        let mut r = Reader::new(&[1, 2, 3]);
        r.get_u8().unwrap();
        assert_eq!(
            r.expect_exhausted(),
            Err(DecodeError::TrailingBytes { remaining: 2 })
        );
        r.get_u16().unwrap();
        assert!(r.expect_exhausted().is_ok());
    }

    #[test]
    fn test_fixed_width_array() {
        let mut w = Writer::new();
        w.put_raw(&[9u8; 16]);
        let bytes = w.finish();
        let arr: [u8; 16] = Reader::new(&bytes).get_array().unwrap();
        assert_eq!(arr, [9u8; 16]);
    }
}
