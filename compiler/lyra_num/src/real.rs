//! Bit-level conversions between IEEE-754 doubles and exact numbers.

use num_bigint::BigInt;
use num_traits::One;

use crate::int::Int;
use crate::number::Number;
use crate::rational::Rational;
use crate::NumError;

pub const EXP_BIT_MASK: u64 = 0x7FF0_0000_0000_0000;
pub const EXP_BIAS: i32 = 1023;
pub const MANTISSA_WIDTH: i32 = 52;
pub const MANTISSA_BIT_MASK: u64 = 0x000F_FFFF_FFFF_FFFF;
pub const SIGN_BIT_MASK: u64 = 0x8000_0000_0000_0000;

/// Convert a double to an exact number with no precision loss.
///
/// Decomposes the raw bits into sign, mantissa and biased exponent,
/// handling subnormals, and produces an integer (for non-negative binary
/// exponents) or a rational `mant / 2^-exp`. Infinities and NaN map to the
/// exact rational sentinels.
pub fn to_exact(value: f64) -> Number {
    let db = value.to_bits();

    if db & !SIGN_BIT_MASK == 0 {
        return Number::Int(Int::ZERO);
    }

    let mut mant = (db & MANTISSA_BIT_MASK) as i64;
    let mut exp: i32;

    if db & EXP_BIT_MASK == EXP_BIT_MASK {
        return if mant == 0 {
            if db & SIGN_BIT_MASK == 0 {
                Rational::pos_inf()
            } else {
                Rational::neg_inf()
            }
        } else {
            Rational::nan()
        };
    } else if db & EXP_BIT_MASK != 0 {
        // Normalized: restore the implicit leading one.
        exp = ((db & EXP_BIT_MASK) >> MANTISSA_WIDTH) as i32 - EXP_BIAS - MANTISSA_WIDTH;
        mant += 1i64 << MANTISSA_WIDTH;
    } else {
        // Subnormal.
        exp = -EXP_BIAS + 1 - MANTISSA_WIDTH;
    }

    // Strip trailing zero bits while the exponent is still negative.
    while exp < 0 && mant & 1 == 0 {
        mant >>= 1;
        exp += 1;
    }

    if db & SIGN_BIT_MASK != 0 {
        mant = -mant;
    }

    if exp >= 0 {
        let mut num = BigInt::from(mant);
        if exp > 0 {
            num <<= exp as usize;
        }
        Number::Int(Int::from_big(num))
    } else {
        let denom = BigInt::one() << (-exp) as usize;
        Rational::make(Int::Fix(mant), Int::from_big(denom))
    }
}

/// Convert an integral double to an exact integer.
///
/// Fails when the value has a fractional part or is not finite.
pub fn to_integer(value: f64) -> Result<Int, NumError> {
    let lv = value as i64;
    if lv as f64 == value {
        return Ok(Int::Fix(lv));
    }
    if value.floor() != value || !value.is_finite() {
        return Err(NumError::NotAnInteger);
    }
    // Integral but outside the fixint range: go through the exact form.
    match to_exact(value) {
        Number::Int(i) => Ok(i),
        _ => Err(NumError::NotAnInteger),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn nrat(a: i64, b: i64) -> Number {
        Rational::make(Int::Fix(a), Int::Fix(b))
    }

    #[test]
    fn test_to_exact_simple() {
        assert_eq!(to_exact(0.0), Number::Int(Int::ZERO));
        assert_eq!(to_exact(-0.0), Number::Int(Int::ZERO));
        assert_eq!(to_exact(1.0), Number::Int(Int::Fix(1)));
        assert_eq!(to_exact(2.0), Number::Int(Int::Fix(2)));
        assert_eq!(to_exact(-2.0), Number::Int(Int::Fix(-2)));
        assert_eq!(to_exact(0.5), nrat(1, 2));
        assert_eq!(to_exact(10.5), nrat(21, 2));
        assert_eq!(to_exact(-10.5), nrat(-21, 2));
    }

    #[test]
    fn test_to_exact_sentinels() {
        assert_eq!(to_exact(f64::NAN), Rational::nan());
        assert_eq!(to_exact(f64::INFINITY), Rational::pos_inf());
        assert_eq!(to_exact(f64::NEG_INFINITY), Rational::neg_inf());
    }

    #[test]
    fn test_to_exact_round_trips_denormals() {
        let d1 = f64::from_bits(1u64 << 51);
        assert_eq!(to_exact(d1).to_f64(), d1);

        let d2 = f64::from_bits((1u64 << 51) + 100);
        assert_eq!(to_exact(d2).to_inexact(), Number::Real(d2));

        // Smallest positive subnormal.
        let d3 = f64::from_bits(1);
        assert_eq!(to_exact(d3).to_f64(), d3);
    }

    #[test]
    fn test_to_exact_round_trips_arbitrary() {
        for v in [
            1.5,
            0.1,
            1.0 / 3.0,
            12345.6789,
            -98765.4321,
            f64::MAX,
            f64::MIN_POSITIVE,
        ] {
            assert_eq!(to_exact(v).to_f64(), v, "round trip failed for {v}");
        }
    }

    #[test]
    fn test_to_integer() {
        assert_eq!(to_integer(0.0), Ok(Int::ZERO));
        assert_eq!(to_integer(32768.0), Ok(Int::Fix(32768)));
        assert_eq!(to_integer(1.2), Err(NumError::NotAnInteger));
        assert_eq!(to_integer(f64::NAN), Err(NumError::NotAnInteger));
        // 2^80 is integral but outside the i64 range
        let v = (2f64).powi(80);
        let i = to_integer(v).unwrap();
        assert_eq!(i.to_f64(), v);
    }
}
