//! Arithmetic faults surfaced to the evaluator.

use thiserror::Error;

/// Error raised by a numeric-tower operation.
///
/// These are Scheme-level faults: the evaluator turns them into positioned
/// runtime errors at the instruction that triggered them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumError {
    #[error("value is not an integer")]
    NotAnInteger,
    #[error("division by zero")]
    DivisionByZero,
    #[error("complex numbers are not ordered")]
    ComplexCompare,
    #[error("complex number does not have a sign")]
    ComplexSign,
    #[error("complex number has no numerator/denominator")]
    ComplexParts,
    #[error("exponent out of range")]
    ExponentOverflow,
    #[error("complex power not implemented")]
    ComplexPower,
    #[error("invalid radix for an inexact number")]
    InvalidRadix,
    #[error("value out of range")]
    OutOfRange,
}
