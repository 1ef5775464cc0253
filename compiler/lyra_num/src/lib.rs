//! Numeric tower for the Lyra Scheme runtime.
//!
//! A closed set of numeric representations with rank-ordered cross-type
//! dispatch: fixed-precision integers (machine word), arbitrary-precision
//! integers, exact rationals, inexact reals (IEEE-754 doubles) and complex
//! numbers. Binary operations dispatch on the higher-ranked operand and
//! promote the lower-ranked operand to match, so only same-rank pairs ever
//! perform arithmetic directly.
//!
//! Exactness is tracked through every operation: fixint arithmetic promotes
//! to bigint on overflow instead of wrapping, bigint results shrink back to
//! fixint when they fit, and rationals are always kept in lowest terms with
//! a positive denominator. A zero denominator encodes the exact infinity
//! and not-a-number sentinels.

mod complex;
mod error;
mod int;
mod number;
mod rational;
pub mod real;

pub use complex::Complex;
pub use error::NumError;
pub use int::Int;
pub use number::{
    exact_decimal, Number, RANK_BIG, RANK_COMPLEX, RANK_FIX, RANK_RATIO, RANK_REAL,
};
pub use rational::Rational;
