//! # Eddy Codec
//!
//! The BSATN binary encoding and the algebraic type/value model it encodes.
//!
//! BSATN is a compact, self-describing-by-schema encoding: fixed-width
//! little-endian primitives, length-prefixed strings and sequences, tag-byte
//! sums, and products whose field boundaries come entirely from the schema.
//! This crate provides:
//!
//! - [`Writer`] / [`Reader`] — sequential encode/decode over byte buffers.
//! - [`AlgebraicType`] — the closed, recursive schema description.
//! - [`AlgebraicValue`] — the dynamic value tree for untyped decoding.
//!
//! The round-trip law holds for every type `T` and value `v` of that type:
//! `decode(T, encode(T, v)) == v`.
//!
//! Decode failures ([`DecodeError`]) are fatal for the buffer being decoded;
//! a binary stream cannot be resynchronized after a framing error.

mod buffer;
mod error;
mod ty;
mod value;

pub use buffer::{Reader, Writer};
pub use error::DecodeError;
pub use ty::{AlgebraicType, ProductType, ProductTypeElement, SumType, SumTypeVariant};
pub use value::{AlgebraicValue, ProductValue, SumValue};

pub use ethnum::{I256, U256};
