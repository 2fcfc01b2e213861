// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stateless classifiers that turn one arithmetic result (and, for some
//! kinds, its operands and operation) into a set of event flags. Everything
//! here is pure and total over well-formed IEEE-754 bit patterns.

use crate::event::{EventKind, EventSet};
use num_derive::FromPrimitive;

/// Fraction of the exponent range treated as "almost overflowed" or "almost
/// underflowed" when classifying latent events.
pub const DEFAULT_DANGER_ZONE: f64 = 0.05;

/// A result must drop more than this many binary orders of magnitude below
/// the larger operand to count as a catastrophic cancellation (~9 decimal
/// digits).
const CANCELLATION_THRESHOLD_BITS: i64 = 30;

/// Operation kinds as encoded by the instrumentation layer. The raw codes
/// match the operation table instrumented binaries emit.
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum Operation {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    Cmp = 4,
    Rem = 5,
    Call = 6,
}

impl Operation {
    /// Maps a raw operation code to its kind. Unknown codes yield `None`
    /// rather than a panic: the instrumentation layer may be newer than this
    /// runtime.
    pub fn from_raw(code: i32) -> Option<Operation> {
        num_traits::FromPrimitive::from_i32(code)
    }
}

mod private {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Bit-level view of an IEEE-754 value, parametric over width. The two
/// widths behave identically modulo field sizes (8/23 bits for f32, 11/52
/// bits for f64).
pub trait FloatBits: Copy + private::Sealed {
    /// Number of distinct exponent-field values (2^w for a w-bit exponent).
    const EXPONENT_CARDINALITY: u64;
    /// All-ones exponent field, shared by infinities and NaNs.
    const EXPONENT_ALL_ONES: u64;

    fn exponent_field(self) -> u64;
    fn mantissa_field(self) -> u64;
    fn is_sign_positive(self) -> bool;
    fn is_zero(self) -> bool;
}

impl FloatBits for f32 {
    const EXPONENT_CARDINALITY: u64 = 1 << 8;
    const EXPONENT_ALL_ONES: u64 = 0xff;

    fn exponent_field(self) -> u64 {
        ((self.to_bits() >> 23) & 0xff) as u64
    }

    fn mantissa_field(self) -> u64 {
        (self.to_bits() & 0x007f_ffff) as u64
    }

    fn is_sign_positive(self) -> bool {
        f32::is_sign_positive(self)
    }

    fn is_zero(self) -> bool {
        self == 0.0
    }
}

impl FloatBits for f64 {
    const EXPONENT_CARDINALITY: u64 = 1 << 11;
    const EXPONENT_ALL_ONES: u64 = 0x7ff;

    fn exponent_field(self) -> u64 {
        (self.to_bits() >> 52) & 0x7ff
    }

    fn mantissa_field(self) -> u64 {
        self.to_bits() & 0x000f_ffff_ffff_ffff
    }

    fn is_sign_positive(self) -> bool {
        f64::is_sign_positive(self)
    }

    fn is_zero(self) -> bool {
        self == 0.0
    }
}

pub fn is_infinity<F: FloatBits>(x: F) -> bool {
    x.exponent_field() == F::EXPONENT_ALL_ONES && x.mantissa_field() == 0
}

pub fn is_infinity_pos<F: FloatBits>(x: F) -> bool {
    is_infinity(x) && x.is_sign_positive()
}

pub fn is_infinity_neg<F: FloatBits>(x: F) -> bool {
    is_infinity(x) && !x.is_sign_positive()
}

/// True for every bit pattern with an all-ones exponent and a nonzero
/// mantissa, regardless of sign or payload.
pub fn is_nan<F: FloatBits>(x: F) -> bool {
    x.exponent_field() == F::EXPONENT_ALL_ONES && x.mantissa_field() != 0
}

/// True underflow: a subnormal value. Zero has the same exponent field but
/// is not an anomaly.
pub fn is_underflow<F: FloatBits>(x: F) -> bool {
    !x.is_zero() && x.exponent_field() == 0
}

/// "Almost overflow": a finite nonzero value whose exponent sits in the top
/// `danger_zone` fraction of the exponent range.
pub fn is_latent_infinity<F: FloatBits>(x: F, danger_zone: f64) -> bool {
    if x.is_zero() || x.exponent_field() == F::EXPONENT_ALL_ONES {
        return false;
    }
    let high = F::EXPONENT_CARDINALITY - (danger_zone * F::EXPONENT_CARDINALITY as f64) as u64;
    x.exponent_field() >= high
}

pub fn is_latent_infinity_pos<F: FloatBits>(x: F, danger_zone: f64) -> bool {
    is_latent_infinity(x, danger_zone) && x.is_sign_positive()
}

pub fn is_latent_infinity_neg<F: FloatBits>(x: F, danger_zone: f64) -> bool {
    is_latent_infinity(x, danger_zone) && !x.is_sign_positive()
}

/// "Almost underflow": a nonzero value whose exponent sits in the bottom
/// `danger_zone` fraction of the exponent range. Subnormals qualify too.
pub fn is_latent_underflow<F: FloatBits>(x: F, danger_zone: f64) -> bool {
    if x.is_zero() {
        return false;
    }
    let low = (danger_zone * F::EXPONENT_CARDINALITY as f64) as u64;
    x.exponent_field() <= low
}

pub fn is_division_by_zero<F: FloatBits>(dividend: F, divisor: F, op: Operation) -> bool {
    op == Operation::Div && divisor.is_zero() && !dividend.is_zero()
}

/// Catastrophic cancellation heuristic: for additive operations, the number
/// of cancelled binary digits is `max(exponent(a), exponent(b)) -
/// exponent(result)`.
pub fn is_cancellation<F: FloatBits>(result: F, op1: F, op2: F, op: Operation) -> bool {
    if !matches!(op, Operation::Add | Operation::Sub) {
        return false;
    }
    let e1 = op1.exponent_field() as i64;
    let e2 = op2.exponent_field() as i64;
    let re = result.exponent_field() as i64;
    e1.max(e2) - re > CANCELLATION_THRESHOLD_BITS
}

/// Every floating-point equality test is flagged as fragile, independent of
/// the compared values.
pub fn is_comparison(op: Operation) -> bool {
    op == Operation::Cmp
}

/// Composes all classifiers for one observation. Infinity and NaN are
/// mutually exclusive terminal magnitude states: when either holds, the
/// underflow and latent checks are skipped. Division-by-zero, cancellation
/// and comparison depend on the operation kind rather than the result's
/// magnitude class, so they are evaluated regardless.
pub fn classify<F: FloatBits>(
    result: F,
    op1: F,
    op2: F,
    op: Operation,
    danger_zone: f64,
) -> EventSet {
    let mut flags = EventSet::EMPTY;

    if is_infinity(result) {
        if result.is_sign_positive() {
            flags.insert(EventKind::InfinityPos);
        } else {
            flags.insert(EventKind::InfinityNeg);
        }
    } else if is_nan(result) {
        flags.insert(EventKind::Nan);
    } else {
        if is_underflow(result) {
            flags.insert(EventKind::Underflow);
        }
        if is_latent_infinity_pos(result, danger_zone) {
            flags.insert(EventKind::LatentInfinityPos);
        }
        if is_latent_infinity_neg(result, danger_zone) {
            flags.insert(EventKind::LatentInfinityNeg);
        }
        if is_latent_underflow(result, danger_zone) {
            flags.insert(EventKind::LatentUnderflow);
        }
    }

    if is_division_by_zero(op1, op2, op) {
        flags.insert(EventKind::DivisionZero);
    }
    if is_cancellation(result, op1, op2, op) {
        flags.insert(EventKind::Cancellation);
    }
    if is_comparison(op) {
        flags.insert(EventKind::Comparison);
    }

    flags
}
