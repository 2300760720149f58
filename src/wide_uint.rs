//! Wide Unsigned Integers
//!
//! The Dutch orchestrator packs its ordered pairing criteria into a single lexicographic
//! edge weight, which can exceed any built-in width once every score group contributes a
//! field. [`WideUint`] is a dynamically-sized unsigned integer covering exactly the
//! operations that weight construction needs; [`EdgeWeight`] is the arithmetic seam that
//! lets the matching solver run on either a built-in unsigned or a [`WideUint`].
//!
//! A [`WideUint`] keeps an explicit width (its limb count). Plain shifts preserve the
//! width and discard bits shifted past it; [`WideUint::shift_grow`] widens the value first
//! so no high bits are lost. Comparisons are by numeric value regardless of width.
//!

use std::fmt;
use std::ops::{AddAssign, BitAndAssign, BitOrAssign, ShlAssign, ShrAssign, SubAssign};

use serde::{Deserialize, Serialize};

const LIMB_BITS: u32 = u64::BITS;

/// The arithmetic required of a matching edge weight. The solver performs comparisons,
/// additions and subtractions, doubling and halving, and parity checks; everything else
/// about the weight encoding belongs to the orchestrators.
pub trait EdgeWeight:
    Clone
    + Ord
    + Default
    + fmt::Debug
    + for<'a> AddAssign<&'a Self>
    + for<'a> SubAssign<&'a Self>
    + ShlAssign<u32>
    + ShrAssign<u32>
{
    fn from_usize(value: usize) -> Self;
    fn is_zero(&self) -> bool;
    fn is_even(&self) -> bool;
    fn increment(&mut self);
    /// Whether two more doublings cannot overflow the representation. The solver stores
    /// weights doubled and compares against a doubled sentinel, so user weights must leave
    /// two spare high bits.
    fn has_headroom(&self) -> bool;
}

macro_rules! impl_edge_weight_for_primitive {
    ($t:ty) => {
        impl EdgeWeight for $t {
            fn from_usize(value: usize) -> Self {
                value as $t
            }
            fn is_zero(&self) -> bool {
                *self == 0
            }
            fn is_even(&self) -> bool {
                *self & 1 == 0
            }
            fn increment(&mut self) {
                *self += 1;
            }
            fn has_headroom(&self) -> bool {
                *self >> (<$t>::BITS - 2) == 0
            }
        }
    };
}

impl_edge_weight_for_primitive!(u32);
impl_edge_weight_for_primitive!(u64);
impl_edge_weight_for_primitive!(u128);

/// A dynamically-sized unsigned integer stored as little-endian 64-bit limbs.
#[derive(Clone, Serialize, Deserialize)]
pub struct WideUint {
    limbs: Vec<u64>,
}

impl WideUint {
    pub fn new() -> Self {
        Self { limbs: vec![0] }
    }

    /// A zero value with the same width as `self`, used to build addends that will be
    /// combined back into values of this width.
    pub fn zero_like(&self) -> Self {
        Self {
            limbs: vec![0; self.limbs.len()],
        }
    }

    pub fn is_zero(&self) -> bool {
        self.limbs.iter().all(|&limb| limb == 0)
    }

    pub fn is_even(&self) -> bool {
        self.limbs.first().map_or(true, |&limb| limb & 1 == 0)
    }

    /// The current width in limbs.
    pub fn width(&self) -> usize {
        self.limbs.len()
    }

    /// The number of significant bits in the value.
    pub fn bit_length(&self) -> usize {
        for (position, &limb) in self.limbs.iter().enumerate().rev() {
            if limb != 0 {
                return position * LIMB_BITS as usize + (LIMB_BITS - limb.leading_zeros()) as usize;
            }
        }
        0
    }

    /// Left-shift, widening the representation first so that no set bit is discarded.
    pub fn shift_grow(&mut self, shift: u32) {
        let needed_bits = self.bit_length() + shift as usize;
        let needed_limbs = (needed_bits + LIMB_BITS as usize - 1) / LIMB_BITS as usize;
        while self.limbs.len() < needed_limbs.max(1) {
            self.limbs.push(0);
        }
        *self <<= shift;
    }

    fn grow_to(&mut self, width: usize) {
        while self.limbs.len() < width {
            self.limbs.push(0);
        }
    }
}

impl Default for WideUint {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for WideUint {
    fn from(value: u64) -> Self {
        Self { limbs: vec![value] }
    }
}

impl fmt::Debug for WideUint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // highest limb first, matching how the packed criteria read
        write!(f, "0x")?;
        let mut significant = false;
        for &limb in self.limbs.iter().rev() {
            if significant {
                write!(f, "{:016x}", limb)?;
            } else if limb != 0 {
                write!(f, "{:x}", limb)?;
                significant = true;
            }
        }
        if !significant {
            write!(f, "0")?;
        }
        Ok(())
    }
}

impl PartialEq for WideUint {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for WideUint {}

impl PartialOrd for WideUint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WideUint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let max_width = self.limbs.len().max(other.limbs.len());
        for position in (0..max_width).rev() {
            let left = self.limbs.get(position).copied().unwrap_or(0);
            let right = other.limbs.get(position).copied().unwrap_or(0);
            if left != right {
                return left.cmp(&right);
            }
        }
        std::cmp::Ordering::Equal
    }
}

impl BitOrAssign<u64> for WideUint {
    fn bitor_assign(&mut self, value: u64) {
        self.limbs[0] |= value;
    }
}

impl BitOrAssign<&WideUint> for WideUint {
    fn bitor_assign(&mut self, other: &WideUint) {
        self.grow_to(other.limbs.len());
        for (position, limb) in self.limbs.iter_mut().enumerate() {
            *limb |= other.limbs.get(position).copied().unwrap_or(0);
        }
    }
}

impl BitAndAssign<u64> for WideUint {
    fn bitand_assign(&mut self, value: u64) {
        self.limbs[0] &= value;
        for limb in self.limbs.iter_mut().skip(1) {
            *limb = 0;
        }
    }
}

impl ShlAssign<u32> for WideUint {
    fn shl_assign(&mut self, shift: u32) {
        let width = self.limbs.len();
        let limb_shift = (shift / LIMB_BITS) as usize;
        let bit_shift = shift % LIMB_BITS;
        if limb_shift >= width {
            self.limbs.iter_mut().for_each(|limb| *limb = 0);
            return;
        }
        for position in (0..width).rev() {
            let mut limb = if position >= limb_shift {
                self.limbs[position - limb_shift] << bit_shift
            } else {
                0
            };
            if bit_shift != 0 && position > limb_shift {
                limb |= self.limbs[position - limb_shift - 1] >> (LIMB_BITS - bit_shift);
            }
            self.limbs[position] = limb;
        }
    }
}

impl ShrAssign<u32> for WideUint {
    fn shr_assign(&mut self, shift: u32) {
        let width = self.limbs.len();
        let limb_shift = (shift / LIMB_BITS) as usize;
        let bit_shift = shift % LIMB_BITS;
        if limb_shift >= width {
            self.limbs.iter_mut().for_each(|limb| *limb = 0);
            return;
        }
        for position in 0..width {
            let mut limb = if position + limb_shift < width {
                self.limbs[position + limb_shift] >> bit_shift
            } else {
                0
            };
            if bit_shift != 0 && position + limb_shift + 1 < width {
                limb |= self.limbs[position + limb_shift + 1] << (LIMB_BITS - bit_shift);
            }
            self.limbs[position] = limb;
        }
    }
}

impl AddAssign<&WideUint> for WideUint {
    fn add_assign(&mut self, other: &WideUint) {
        self.grow_to(other.limbs.len());
        let mut carry = 0u64;
        for (position, limb) in self.limbs.iter_mut().enumerate() {
            let addend = other.limbs.get(position).copied().unwrap_or(0);
            let (sum, overflow1) = limb.overflowing_add(addend);
            let (sum, overflow2) = sum.overflowing_add(carry);
            *limb = sum;
            carry = (overflow1 || overflow2) as u64;
        }
        if carry != 0 {
            self.limbs.push(carry);
        }
    }
}

impl AddAssign<u64> for WideUint {
    fn add_assign(&mut self, value: u64) {
        let mut carry = value;
        for limb in self.limbs.iter_mut() {
            if carry == 0 {
                return;
            }
            let (sum, overflow) = limb.overflowing_add(carry);
            *limb = sum;
            carry = overflow as u64;
        }
        if carry != 0 {
            self.limbs.push(carry);
        }
    }
}

impl SubAssign<&WideUint> for WideUint {
    fn sub_assign(&mut self, other: &WideUint) {
        debug_assert!(&*self >= other, "wide uint subtraction underflow");
        let mut borrow = 0u64;
        for (position, limb) in self.limbs.iter_mut().enumerate() {
            let subtrahend = other.limbs.get(position).copied().unwrap_or(0);
            let (difference, underflow1) = limb.overflowing_sub(subtrahend);
            let (difference, underflow2) = difference.overflowing_sub(borrow);
            *limb = difference;
            borrow = (underflow1 || underflow2) as u64;
        }
        debug_assert_eq!(borrow, 0, "wide uint subtraction underflow");
    }
}

impl SubAssign<u64> for WideUint {
    fn sub_assign(&mut self, value: u64) {
        let mut borrow = value;
        for limb in self.limbs.iter_mut() {
            if borrow == 0 {
                return;
            }
            let (difference, underflow) = limb.overflowing_sub(borrow);
            *limb = difference;
            borrow = underflow as u64;
        }
        debug_assert_eq!(borrow, 0, "wide uint subtraction underflow");
    }
}

impl EdgeWeight for WideUint {
    fn from_usize(value: usize) -> Self {
        Self::from(value as u64)
    }
    fn is_zero(&self) -> bool {
        WideUint::is_zero(self)
    }
    fn is_even(&self) -> bool {
        WideUint::is_even(self)
    }
    fn increment(&mut self) {
        *self += 1u64;
    }
    fn has_headroom(&self) -> bool {
        // additions grow the limb vector on carry, so doubling never truncates
        true
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn wide_uint_shift_and_compare_1() {
        // cargo test wide_uint_shift_and_compare_1 -- --nocapture
        let mut value = WideUint::from(1);
        value.shift_grow(130);
        assert_eq!(value.width(), 3);
        assert_eq!(value.bit_length(), 131);
        let mut copy = value.clone();
        copy >>= 130;
        assert_eq!(copy, WideUint::from(1));
        assert!(copy < value);
        // plain shifts preserve width and drop overflowing bits
        let mut narrow = WideUint::from(1 << 63);
        narrow <<= 1;
        assert!(narrow.is_zero());
    }

    #[test]
    fn wide_uint_add_sub_carry_1() {
        // cargo test wide_uint_add_sub_carry_1 -- --nocapture
        let mut value = WideUint::from(u64::MAX);
        value += 1u64;
        assert_eq!(value.width(), 2);
        assert_eq!(value.bit_length(), 65);
        value -= 1u64;
        assert_eq!(value, WideUint::from(u64::MAX));
        let mut sum = WideUint::from(u64::MAX);
        let other = WideUint::from(u64::MAX);
        sum += &other;
        sum -= &other;
        assert_eq!(sum, WideUint::from(u64::MAX));
    }

    #[test]
    fn wide_uint_width_independent_ordering_1() {
        // cargo test wide_uint_width_independent_ordering_1 -- --nocapture
        let mut wide_zero = WideUint::from(7);
        wide_zero.shift_grow(200);
        wide_zero &= 0;
        assert_eq!(wide_zero, WideUint::from(0));
        assert!(wide_zero.is_zero());
        assert!(wide_zero < WideUint::from(1));
        let mut rebuilt = wide_zero.zero_like();
        rebuilt |= 3;
        assert_eq!(rebuilt, WideUint::from(3));
    }

    #[test]
    fn wide_uint_parity_1() {
        // cargo test wide_uint_parity_1 -- --nocapture
        let mut value = WideUint::from(2);
        assert!(value.is_even());
        value.increment();
        assert!(!value.is_even());
        value <<= 1u32;
        assert!(value.is_even());
        value >>= 1u32;
        assert_eq!(value, WideUint::from(3));
    }
}
