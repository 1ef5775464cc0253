//! Exact rationals, kept in lowest terms with a positive denominator.

use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;

use crate::int::Int;
use crate::number::Number;
use crate::real;

/// An exact ratio of two integers.
///
/// Invariants maintained by [`Rational::make`]: the denominator is
/// non-negative and coprime with the numerator, the numerator carries the
/// sign, and a denominator of one never reaches this type (it collapses to
/// a plain integer). A zero denominator encodes the sentinels: `1/0` is
/// positive infinity, `-1/0` negative infinity and `0/0` not-a-number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rational {
    pub num: Int,
    pub den: Int,
}

impl Rational {
    /// Build a number from a numerator and denominator, normalizing.
    pub fn make(mut num: Int, mut den: Int) -> Number {
        if num.is_zero() {
            // 0/0 = NaN, 0/x = 0
            return if den.is_zero() {
                Rational::nan()
            } else {
                Number::Int(Int::ZERO)
            };
        }
        if den.is_zero() {
            return if num.signum() >= 0 {
                Rational::pos_inf()
            } else {
                Rational::neg_inf()
            };
        }

        // The denominator must be positive; the numerator expresses the sign.
        if den.signum() < 0 {
            num = num.neg();
            den = den.neg();
        }
        if den.is_one() {
            return Number::Int(num);
        }

        let gcd = num.gcd(&den);
        if !gcd.is_one() {
            num = num.div_exact(&gcd);
            den = den.div_exact(&gcd);
        }

        if den.is_one() {
            Number::Int(num)
        } else {
            Number::Ratio(Rc::new(Rational { num, den }))
        }
    }

    pub fn nan() -> Number {
        Number::Ratio(Rc::new(Rational {
            num: Int::ZERO,
            den: Int::ZERO,
        }))
    }

    pub fn pos_inf() -> Number {
        Number::Ratio(Rc::new(Rational {
            num: Int::ONE,
            den: Int::ZERO,
        }))
    }

    pub fn neg_inf() -> Number {
        Number::Ratio(Rc::new(Rational {
            num: Int::MINUS_ONE,
            den: Int::ZERO,
        }))
    }

    pub fn is_zero(&self) -> bool {
        self.num.is_zero()
    }

    pub fn signum(&self) -> i32 {
        self.num.signum()
    }

    /// Compare against another rational. Denominators are positive, so
    /// cross-multiplying cannot flip the ordering.
    pub fn cmp_ratio(&self, o: &Rational) -> Ordering {
        self.num.mul(&o.den).cmp_int(&self.den.mul(&o.num))
    }

    /// Compare against a plain integer.
    pub fn cmp_int(&self, o: &Int) -> Ordering {
        self.num.cmp_int(&self.den.mul(o))
    }

    pub fn to_f64(&self) -> f64 {
        // Fast path when both parts fit into the double mantissa.
        if let (Int::Fix(n), Int::Fix(d)) = (&self.num, &self.den) {
            const M: i64 = real::MANTISSA_BIT_MASK as i64;
            if *n >= -M && *n <= M && *d >= -M && *d <= M {
                return *n as f64 / *d as f64;
            }
        }
        big_ratio_to_f64(&self.num.big(), &self.den.big())
    }
}

/// Convert `n/d` to a double without overflowing intermediate conversions.
///
/// Scales the numerator so the integer quotient carries ~55 bits, converts
/// that, then applies the binary scale in bounded steps so values in the
/// subnormal range survive. Power-of-two denominators (the `to_exact`
/// output shape) convert exactly.
fn big_ratio_to_f64(n: &BigInt, d: &BigInt) -> f64 {
    use num_traits::{Signed, ToPrimitive, Zero};

    if n.is_zero() {
        return 0.0;
    }
    if d.is_zero() {
        return if n.is_negative() {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }
    let neg = n.is_negative() != d.is_negative();
    let n = n.abs();
    let d = d.abs();

    let shift = n.bits() as i64 - d.bits() as i64 - 55;
    let (n, d): (BigInt, BigInt) = if shift >= 0 {
        (n, d << shift as usize)
    } else {
        (n << (-shift) as usize, d)
    };
    let q = (&n / &d).to_f64().unwrap_or(f64::INFINITY);

    let val = mul_pow2(q, shift);
    if neg {
        -val
    } else {
        val
    }
}

/// `v * 2^e`, stepped so that only the final multiplication can land in the
/// subnormal range.
fn mul_pow2(mut v: f64, mut e: i64) -> f64 {
    while e > 0 {
        let step = e.min(1000);
        v *= 2f64.powi(step as i32);
        e -= step;
    }
    while e < 0 {
        let step = (-e).min(1000);
        v *= 2f64.powi(-(step as i32));
        e += step;
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn nrat(a: i64, b: i64) -> Number {
        Rational::make(Int::Fix(a), Int::Fix(b))
    }

    #[test]
    fn test_make_lowest_terms() {
        assert_eq!(nrat(2, 4), nrat(1, 2));
        assert_eq!(nrat(6, 4), nrat(3, 2));
        // denominator one collapses to an integer
        assert_eq!(nrat(4, 2), Number::Int(Int::Fix(2)));
        assert_eq!(nrat(4, 4), Number::Int(Int::Fix(1)));
    }

    #[test]
    fn test_make_sign_normalization() {
        match nrat(1, -2) {
            Number::Ratio(r) => {
                assert_eq!(r.num, Int::Fix(-1));
                assert_eq!(r.den, Int::Fix(2));
            }
            other => panic!("expected a rational, got {other:?}"),
        }
        assert_eq!(nrat(-1, -2), nrat(1, 2));
    }

    #[test]
    fn test_make_sentinels() {
        assert_eq!(nrat(0, 0), Rational::nan());
        assert_eq!(nrat(5, 0), Rational::pos_inf());
        assert_eq!(nrat(-5, 0), Rational::neg_inf());
        assert_eq!(nrat(0, 5), Number::Int(Int::ZERO));
    }

    #[test]
    fn test_cmp() {
        let half = Rational {
            num: Int::Fix(1),
            den: Int::Fix(2),
        };
        let third = Rational {
            num: Int::Fix(1),
            den: Int::Fix(3),
        };
        assert_eq!(half.cmp_ratio(&third), Ordering::Greater);
        assert_eq!(half.cmp_int(&Int::Fix(1)), Ordering::Less);
        assert_eq!(half.cmp_int(&Int::Fix(0)), Ordering::Greater);
    }

    #[test]
    fn test_to_f64() {
        match nrat(1, 2) {
            Number::Ratio(r) => assert_eq!(r.to_f64(), 0.5),
            other => panic!("expected a rational, got {other:?}"),
        }
    }
}
