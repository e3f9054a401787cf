//! Dynamic value trees typed by [`AlgebraicType`].
//!
//! An [`AlgebraicValue`] mirrors the shape of its type but holds data. Values
//! are produced by decoding a byte buffer against a known type, or
//! constructed programmatically for encoding. Both the encode and decode
//! sites are exhaustive matches over the type tag; the schema supplies all
//! field boundaries, so the encoding itself carries no per-field metadata.

use bytes::Bytes;
use ethnum::{I256, U256};

use crate::buffer::{Reader, Writer};
use crate::error::DecodeError;
use crate::ty::AlgebraicType;

// ---------------------------------------------------------------------------
// AlgebraicValue
// ---------------------------------------------------------------------------

/// A dynamically-typed value whose shape mirrors an [`AlgebraicType`].
#[derive(Debug, Clone, PartialEq)]
pub enum AlgebraicValue {
    /// A bool.
    Bool(bool),
    /// An unsigned 8-bit integer.
    U8(u8),
    /// An unsigned 16-bit integer.
    U16(u16),
    /// An unsigned 32-bit integer.
    U32(u32),
    /// An unsigned 64-bit integer.
    U64(u64),
    /// An unsigned 128-bit integer.
    U128(u128),
    /// An unsigned 256-bit integer.
    U256(U256),
    /// A signed 8-bit integer.
    I8(i8),
    /// A signed 16-bit integer.
    I16(i16),
    /// A signed 32-bit integer.
    I32(i32),
    /// A signed 64-bit integer.
    I64(i64),
    /// A signed 128-bit integer.
    I128(i128),
    /// A signed 256-bit integer.
    I256(I256),
    /// A single-precision float.
    F32(f32),
    /// A double-precision float.
    F64(f64),
    /// A UTF-8 string.
    String(String),
    /// A raw byte blob.
    Bytes(Bytes),
    /// An ordered sequence of homogeneously-typed values.
    Array(Vec<AlgebraicValue>),
    /// Field values in declaration order.
    Product(ProductValue),
    /// A variant tag and the selected variant's payload.
    Sum(SumValue),
}

/// The field values of a product, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProductValue {
    /// One value per declared field.
    pub elements: Vec<AlgebraicValue>,
}

/// A sum value: which variant, and its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SumValue {
    /// Zero-based variant index; doubles as the wire tag byte.
    pub tag: u8,
    /// The selected variant's payload.
    pub value: Box<AlgebraicValue>,
}

impl ProductValue {
    /// Builds a product value from its field values.
    #[must_use]
    pub fn new(elements: Vec<AlgebraicValue>) -> Self {
        Self { elements }
    }
}

impl AlgebraicValue {
    /// The unit value: a product with no fields.
    #[must_use]
    pub fn unit() -> Self {
        Self::Product(ProductValue::default())
    }

    /// Builds a product value from its field values.
    #[must_use]
    pub fn product(elements: Vec<AlgebraicValue>) -> Self {
        Self::Product(ProductValue::new(elements))
    }

    /// Builds a sum value from a variant tag and payload.
    #[must_use]
    pub fn sum(tag: u8, value: AlgebraicValue) -> Self {
        Self::Sum(SumValue {
            tag,
            value: Box::new(value),
        })
    }

    /// The `none` optional value (tag 0, unit payload).
    #[must_use]
    pub fn option_none() -> Self {
        Self::sum(0, Self::unit())
    }

    /// A `some` optional value (tag 1) wrapping `value`.
    #[must_use]
    pub fn option_some(value: AlgebraicValue) -> Self {
        Self::sum(1, value)
    }

    /// Builds a string value.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    // -- encoding --

    /// Appends this value's BSATN encoding to `w`.
    ///
    /// Values carry enough structure to encode without consulting their
    /// type: products concatenate their fields, sums prepend their tag, and
    /// sequences prepend their count.
    pub fn encode(&self, w: &mut Writer) {
        match self {
            Self::Bool(v) => w.put_bool(*v),
            Self::U8(v) => w.put_u8(*v),
            Self::U16(v) => w.put_u16(*v),
            Self::U32(v) => w.put_u32(*v),
            Self::U64(v) => w.put_u64(*v),
            Self::U128(v) => w.put_u128(*v),
            Self::U256(v) => w.put_u256(*v),
            Self::I8(v) => w.put_i8(*v),
            Self::I16(v) => w.put_i16(*v),
            Self::I32(v) => w.put_i32(*v),
            Self::I64(v) => w.put_i64(*v),
            Self::I128(v) => w.put_i128(*v),
            Self::I256(v) => w.put_i256(*v),
            Self::F32(v) => w.put_f32(*v),
            Self::F64(v) => w.put_f64(*v),
            Self::String(v) => w.put_str(v),
            Self::Bytes(v) => w.put_bytes(v),
            Self::Array(elements) => {
                w.put_count(elements.len());
                for element in elements {
                    element.encode(w);
                }
            }
            Self::Product(product) => {
                for element in &product.elements {
                    element.encode(w);
                }
            }
            Self::Sum(sum) => {
                w.put_u8(sum.tag);
                sum.value.encode(w);
            }
        }
    }

    /// Encodes this value into a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.finish()
    }

    // -- decoding --

    /// Decodes one value of type `ty` from `r`, advancing the cursor.
    ///
    /// # Errors
    ///
    /// Any [`DecodeError`] is fatal for the buffer being decoded.
    pub fn decode(ty: &AlgebraicType, r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(match ty {
            AlgebraicType::Bool => Self::Bool(r.get_bool()?),
            AlgebraicType::U8 => Self::U8(r.get_u8()?),
            AlgebraicType::U16 => Self::U16(r.get_u16()?),
            AlgebraicType::U32 => Self::U32(r.get_u32()?),
            AlgebraicType::U64 => Self::U64(r.get_u64()?),
            AlgebraicType::U128 => Self::U128(r.get_u128()?),
            AlgebraicType::U256 => Self::U256(r.get_u256()?),
            AlgebraicType::I8 => Self::I8(r.get_i8()?),
            AlgebraicType::I16 => Self::I16(r.get_i16()?),
            AlgebraicType::I32 => Self::I32(r.get_i32()?),
            AlgebraicType::I64 => Self::I64(r.get_i64()?),
            AlgebraicType::I128 => Self::I128(r.get_i128()?),
            AlgebraicType::I256 => Self::I256(r.get_i256()?),
            AlgebraicType::F32 => Self::F32(r.get_f32()?),
            AlgebraicType::F64 => Self::F64(r.get_f64()?),
            AlgebraicType::String => Self::String(r.get_string()?),
            AlgebraicType::Bytes => Self::Bytes(Bytes::copy_from_slice(r.get_bytes()?)),
            AlgebraicType::Array(element_ty) => {
                let count = r.get_count()?;
                let mut elements = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    elements.push(Self::decode(element_ty, r)?);
                }
                Self::Array(elements)
            }
            AlgebraicType::Product(product_ty) => {
                let mut elements = Vec::with_capacity(product_ty.len());
                for element in &product_ty.elements {
                    elements.push(Self::decode(&element.ty, r)?);
                }
                Self::product(elements)
            }
            AlgebraicType::Sum(sum_ty) => {
                let tag = r.get_u8()?;
                let Some(variant) = sum_ty.variant(tag) else {
                    return Err(DecodeError::InvalidTag {
                        tag,
                        variants: sum_ty.len(),
                    });
                };
                Self::sum(tag, Self::decode(&variant.ty, r)?)
            }
        })
    }

    /// Decodes a complete buffer as one value of type `ty`, rejecting
    /// trailing bytes.
    ///
    /// # Errors
    ///
    /// Any [`DecodeError`] is fatal for `buf`, including
    /// [`DecodeError::TrailingBytes`] when `buf` holds more than one value.
    pub fn decode_exact(ty: &AlgebraicType, buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let value = Self::decode(ty, &mut r)?;
        r.expect_exhausted()?;
        Ok(value)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
