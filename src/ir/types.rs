//! IR type system.
//!
//! Only what the RNG legalization touches is modelled: integers with an
//! explicit signedness, statically shaped integer tensors, and rank-0
//! memrefs that name a single storage cell.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Widest integer the IR can describe.
pub const MAX_INT_BITS: u32 = 128;

/// Integer signedness semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signedness {
    /// `iN`: no signedness attached, interpretation chosen by each op
    Signless,
    /// `siN`
    Signed,
    /// `uiN`
    Unsigned,
}

/// An integer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntType {
    /// Width in bits (1..=128)
    pub bits: u32,
    /// Signedness semantics
    pub signedness: Signedness,
}

impl IntType {
    /// Signless integer of the given width.
    pub const fn signless(bits: u32) -> Self {
        Self { bits, signedness: Signedness::Signless }
    }

    /// Signed integer of the given width.
    pub const fn signed(bits: u32) -> Self {
        Self { bits, signedness: Signedness::Signed }
    }

    /// Unsigned integer of the given width.
    pub const fn unsigned(bits: u32) -> Self {
        Self { bits, signedness: Signedness::Unsigned }
    }

    /// Same width with the signedness dropped.
    pub fn to_signless(self) -> Self {
        Self::signless(self.bits)
    }

    /// Is this width representable?
    pub fn is_valid(self) -> bool {
        self.bits >= 1 && self.bits <= MAX_INT_BITS
    }

    /// All-ones mask for this width.
    pub fn mask(self) -> u128 {
        mask_for_bits(self.bits)
    }

    /// Is the type explicitly signed?
    pub fn is_signed(self) -> bool {
        self.signedness == Signedness::Signed
    }
}

/// All-ones mask covering the low `bits` bits.
pub fn mask_for_bits(bits: u32) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

impl fmt::Display for IntType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signedness {
            Signedness::Signless => write!(f, "i{}", self.bits),
            Signedness::Signed => write!(f, "si{}", self.bits),
            Signedness::Unsigned => write!(f, "ui{}", self.bits),
        }
    }
}

/// A value type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Scalar integer
    Int(IntType),
    /// Statically shaped tensor of integers; an empty shape is rank 0
    Tensor { shape: Vec<u64>, elem: IntType },
    /// Rank-0 memref holding one integer
    MemRef { elem: IntType },
}

impl Type {
    /// Signless integer type `iN`.
    pub fn int(bits: u32) -> Self {
        Type::Int(IntType::signless(bits))
    }

    /// Tensor type with the given shape.
    pub fn tensor(shape: impl Into<Vec<u64>>, elem: IntType) -> Self {
        Type::Tensor { shape: shape.into(), elem }
    }

    /// Rank-0 memref of the given element.
    pub fn memref(elem: IntType) -> Self {
        Type::MemRef { elem }
    }

    /// Get as a scalar integer if applicable.
    pub fn as_int(&self) -> Option<IntType> {
        match self {
            Type::Int(ty) => Some(*ty),
            _ => None,
        }
    }

    /// Element type of a tensor or memref, or the type itself for integers.
    pub fn element_type(&self) -> IntType {
        match self {
            Type::Int(ty) => *ty,
            Type::Tensor { elem, .. } | Type::MemRef { elem } => *elem,
        }
    }

    /// Bit width of the (element) integer.
    pub fn bit_width(&self) -> u32 {
        self.element_type().bits
    }

    /// Tensor shape, if this is a tensor.
    pub fn shape(&self) -> Option<&[u64]> {
        match self {
            Type::Tensor { shape, .. } => Some(shape),
            _ => None,
        }
    }

    /// Number of elements (product of dims), saturating at `u64::MAX`.
    /// Scalars and memrefs count as one.
    pub fn num_elements(&self) -> u64 {
        self.checked_num_elements().unwrap_or(u64::MAX)
    }

    /// Number of elements, or `None` if the product overflows.
    pub fn checked_num_elements(&self) -> Option<u64> {
        match self {
            Type::Tensor { shape, .. } => shape.iter().try_fold(1u64, |acc, &dim| acc.checked_mul(dim)),
            _ => Some(1),
        }
    }

    /// Total bits of all elements, or `None` on overflow.
    pub fn packed_bits(&self) -> Option<u64> {
        self.checked_num_elements()?.checked_mul(self.bit_width() as u64)
    }

    /// Is this a tensor type?
    pub fn is_tensor(&self) -> bool {
        matches!(self, Type::Tensor { .. })
    }

    /// Is this a memref type?
    pub fn is_memref(&self) -> bool {
        matches!(self, Type::MemRef { .. })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int(ty) => write!(f, "{}", ty),
            Type::Tensor { shape, elem } => {
                write!(f, "tensor<")?;
                for dim in shape {
                    write!(f, "{}x", dim)?;
                }
                write!(f, "{}>", elem)
            }
            Type::MemRef { elem } => write!(f, "memref<{}>", elem),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_display() {
        assert_eq!(Type::int(128).to_string(), "i128");
        assert_eq!(Type::Int(IntType::unsigned(32)).to_string(), "ui32");
        assert_eq!(Type::Int(IntType::signed(8)).to_string(), "si8");
        assert_eq!(Type::tensor(vec![4], IntType::unsigned(32)).to_string(), "tensor<4xui32>");
        assert_eq!(Type::tensor(vec![2, 3], IntType::signless(16)).to_string(), "tensor<2x3xi16>");
        assert_eq!(Type::tensor(vec![], IntType::signless(64)).to_string(), "tensor<i64>");
        assert_eq!(Type::memref(IntType::signless(128)).to_string(), "memref<i128>");
    }

    #[test]
    fn test_num_elements() {
        assert_eq!(Type::tensor(vec![4], IntType::unsigned(32)).num_elements(), 4);
        assert_eq!(Type::tensor(vec![2, 3], IntType::unsigned(8)).num_elements(), 6);
        assert_eq!(Type::tensor(vec![], IntType::unsigned(8)).num_elements(), 1);
        assert_eq!(Type::tensor(vec![0, 3], IntType::unsigned(8)).num_elements(), 0);
    }

    #[test]
    fn test_num_elements_overflow() {
        let huge = Type::tensor(vec![1 << 32, 1 << 32], IntType::signless(32));
        assert_eq!(huge.checked_num_elements(), None);
        assert_eq!(huge.num_elements(), u64::MAX);
        assert_eq!(huge.packed_bits(), None);
        assert_eq!(Type::tensor(vec![4], IntType::signless(32)).packed_bits(), Some(128));
        assert_eq!(Type::tensor(vec![u64::MAX], IntType::signless(2)).packed_bits(), None);
    }

    #[test]
    fn test_mask() {
        assert_eq!(IntType::signless(32).mask(), 0xFFFF_FFFF);
        assert_eq!(IntType::signless(1).mask(), 1);
        assert_eq!(IntType::signless(128).mask(), u128::MAX);
    }

    #[test]
    fn test_signless_conversion() {
        let ty = IntType::unsigned(32);
        assert_eq!(ty.to_signless(), IntType::signless(32));
        assert!(!ty.is_signed());
        assert!(IntType::signed(32).is_signed());
        assert!(!IntType::signless(0).is_valid());
        assert!(!IntType::signless(129).is_valid());
    }
}
