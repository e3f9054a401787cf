//! Schema descriptions for the closed algebraic type system.
//!
//! An [`AlgebraicType`] describes the shape of wire data: primitive scalars,
//! arrays, products (named fields, encoded as the concatenation of field
//! encodings), and sums (named variants, encoded as a tag byte plus the
//! selected variant's payload). Types are immutable once constructed and are
//! used both as schemas for static bindings and to interpret untyped wire
//! data into [`AlgebraicValue`](crate::AlgebraicValue)s.

// ---------------------------------------------------------------------------
// AlgebraicType
// ---------------------------------------------------------------------------

/// The closed, recursive type tag.
///
/// `Option<T>` is not a distinct case: it is a two-variant sum (`none` at
/// tag 0, `some` at tag 1), so the optional encoding (one tag byte,
/// optionally followed by the payload) falls out of the sum encoding. The
/// unit type is the empty product, which encodes to zero bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlgebraicType {
    /// One byte, 0 or 1.
    Bool,
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
    /// Unsigned 128-bit integer.
    U128,
    /// Unsigned 256-bit integer.
    U256,
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// Signed 128-bit integer.
    I128,
    /// Signed 256-bit integer.
    I256,
    /// IEEE754 single-precision float.
    F32,
    /// IEEE754 double-precision float.
    F64,
    /// Length-prefixed UTF-8 string.
    String,
    /// Length-prefixed raw byte blob.
    Bytes,
    /// Homogeneous sequence with a `u32` count prefix.
    Array(Box<AlgebraicType>),
    /// Ordered named fields, encoded back to back with no per-field tags.
    Product(ProductType),
    /// Tagged union; one tag byte selects the variant.
    Sum(SumType),
}

impl AlgebraicType {
    /// Builds a product type from `(name, type)` pairs.
    pub fn product<'a>(elements: impl IntoIterator<Item = (&'a str, AlgebraicType)>) -> Self {
        Self::Product(ProductType::new(elements))
    }

    /// Builds a sum type from `(name, type)` pairs.
    pub fn sum<'a>(variants: impl IntoIterator<Item = (&'a str, AlgebraicType)>) -> Self {
        Self::Sum(SumType::new(variants))
    }

    /// Builds an array type over `element`.
    #[must_use]
    pub fn array(element: AlgebraicType) -> Self {
        Self::Array(Box::new(element))
    }

    /// The unit type: a product with no elements, encoding to zero bytes.
    #[must_use]
    pub fn unit() -> Self {
        Self::Product(ProductType { elements: Vec::new() })
    }

    /// Builds the optional type over `some`: a sum with `none` at tag 0 and
    /// `some` at tag 1, matching the codec's optional tag convention.
    #[must_use]
    pub fn option(some: AlgebraicType) -> Self {
        Self::sum([("none", Self::unit()), ("some", some)])
    }

    /// Returns the product type if this is a product.
    #[must_use]
    pub fn as_product(&self) -> Option<&ProductType> {
        match self {
            Self::Product(p) => Some(p),
            _ => None,
        }
    }

    /// Returns the sum type if this is a sum.
    #[must_use]
    pub fn as_sum(&self) -> Option<&SumType> {
        match self {
            Self::Sum(s) => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ProductType
// ---------------------------------------------------------------------------

/// An ordered list of named fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductType {
    /// The fields, in declaration (and encoding) order.
    pub elements: Vec<ProductTypeElement>,
}

/// One named field of a product type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductTypeElement {
    /// Field name.
    pub name: String,
    /// Field type.
    pub ty: AlgebraicType,
}

impl ProductType {
    /// Builds a product type from `(name, type)` pairs.
    pub fn new<'a>(elements: impl IntoIterator<Item = (&'a str, AlgebraicType)>) -> Self {
        Self {
            elements: elements
                .into_iter()
                .map(|(name, ty)| ProductTypeElement {
                    name: name.to_owned(),
                    ty,
                })
                .collect(),
        }
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the product has no fields (the unit type).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SumType
// ---------------------------------------------------------------------------

/// An ordered list of named variants; the wire tag is the zero-based index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SumType {
    /// The variants, in declaration order.
    pub variants: Vec<SumTypeVariant>,
}

/// One named variant of a sum type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SumTypeVariant {
    /// Variant name.
    pub name: String,
    /// Payload type.
    pub ty: AlgebraicType,
}

impl SumType {
    /// Builds a sum type from `(name, type)` pairs.
    ///
    /// Wire tags are single bytes, so a sum declares at most 256 variants.
    pub fn new<'a>(variants: impl IntoIterator<Item = (&'a str, AlgebraicType)>) -> Self {
        let variants: Vec<_> = variants
            .into_iter()
            .map(|(name, ty)| SumTypeVariant {
                name: name.to_owned(),
                ty,
            })
            .collect();
        debug_assert!(variants.len() <= 256);
        Self { variants }
    }

    /// Number of variants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Returns `true` if the sum has no variants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// The variant selected by `tag`, if in range.
    #[must_use]
    pub fn variant(&self, tag: u8) -> Option<&SumTypeVariant> {
        self.variants.get(tag as usize)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
