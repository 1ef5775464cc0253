//! Exact integers: machine-word fixints with transparent bigint promotion.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::NumError;

/// Largest power of ten that fits a fixint.
const MAX_FIX_POW10: u32 = 18;

/// An exact integer.
///
/// `Big` never holds a value that fits in an `i64`: every constructor that
/// produces a bigint goes through [`Int::from_big`], which shrinks back down
/// to `Fix` when possible. Structural equality is therefore value equality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Int {
    Fix(i64),
    Big(Rc<BigInt>),
}

impl Int {
    pub const ZERO: Int = Int::Fix(0);
    pub const ONE: Int = Int::Fix(1);
    pub const MINUS_ONE: Int = Int::Fix(-1);

    /// Normalizing bigint constructor: shrinks to `Fix` when the value fits.
    pub fn from_big(value: BigInt) -> Int {
        match value.to_i64() {
            Some(v) => Int::Fix(v),
            None => Int::Big(Rc::new(value)),
        }
    }

    /// The value as a `BigInt`, cloning on the fixint path.
    pub fn big(&self) -> BigInt {
        match self {
            Int::Fix(v) => BigInt::from(*v),
            Int::Big(b) => (**b).clone(),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Int::Fix(v) => *v == 0,
            Int::Big(_) => false, // a bigint zero would have shrunk
        }
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Int::Fix(1))
    }

    pub fn signum(&self) -> i32 {
        match self {
            Int::Fix(v) => match v.cmp(&0) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            },
            Int::Big(b) => match b.sign() {
                num_bigint::Sign::Minus => -1,
                num_bigint::Sign::NoSign => 0,
                num_bigint::Sign::Plus => 1,
            },
        }
    }

    pub fn neg(&self) -> Int {
        match self {
            Int::Fix(v) => match v.checked_neg() {
                Some(n) => Int::Fix(n),
                None => Int::from_big(-BigInt::from(*v)),
            },
            Int::Big(b) => Int::from_big(-(**b).clone()),
        }
    }

    pub fn add(&self, o: &Int) -> Int {
        match (self, o) {
            (Int::Fix(a), Int::Fix(b)) => match a.checked_add(*b) {
                Some(v) => Int::Fix(v),
                None => Int::from_big(BigInt::from(*a) + BigInt::from(*b)),
            },
            _ => Int::from_big(self.big() + o.big()),
        }
    }

    pub fn sub(&self, o: &Int) -> Int {
        match (self, o) {
            (Int::Fix(a), Int::Fix(b)) => match a.checked_sub(*b) {
                Some(v) => Int::Fix(v),
                None => Int::from_big(BigInt::from(*a) - BigInt::from(*b)),
            },
            _ => Int::from_big(self.big() - o.big()),
        }
    }

    pub fn mul(&self, o: &Int) -> Int {
        match (self, o) {
            (Int::Fix(a), Int::Fix(b)) => match a.checked_mul(*b) {
                Some(v) => Int::Fix(v),
                None => Int::from_big(BigInt::from(*a) * BigInt::from(*b)),
            },
            _ => Int::from_big(self.big() * o.big()),
        }
    }

    /// Truncating division (C99 semantics, like `i64` division).
    pub fn quotient(&self, o: &Int) -> Result<Int, NumError> {
        if o.is_zero() {
            return Err(NumError::DivisionByZero);
        }
        match (self, o) {
            (Int::Fix(a), Int::Fix(b)) => match a.checked_div(*b) {
                Some(v) => Ok(Int::Fix(v)),
                // i64::MIN / -1 overflows the fixint range
                None => Ok(Int::from_big(BigInt::from(*a) / BigInt::from(*b))),
            },
            _ => Ok(Int::from_big(self.big() / o.big())),
        }
    }

    /// Truncating remainder; the result has the sign of the dividend.
    pub fn remainder(&self, o: &Int) -> Result<Int, NumError> {
        if o.is_zero() {
            return Err(NumError::DivisionByZero);
        }
        match (self, o) {
            (Int::Fix(a), Int::Fix(b)) => match a.checked_rem(*b) {
                Some(v) => Ok(Int::Fix(v)),
                None => Ok(Int::Fix(0)), // i64::MIN % -1
            },
            _ => Ok(Int::from_big(self.big() % o.big())),
        }
    }

    /// Exact division by a known non-zero divisor (used after GCD reduction).
    pub(crate) fn div_exact(&self, o: &Int) -> Int {
        match (self, o) {
            (Int::Fix(a), Int::Fix(b)) => match a.checked_div(*b) {
                Some(v) => Int::Fix(v),
                None => Int::from_big(BigInt::from(*a) / BigInt::from(*b)),
            },
            _ => Int::from_big(self.big() / o.big()),
        }
    }

    /// Non-negative greatest common divisor.
    pub fn gcd(&self, o: &Int) -> Int {
        match (self, o) {
            (Int::Fix(a), Int::Fix(b)) => {
                let mut a = a.unsigned_abs();
                let mut b = b.unsigned_abs();
                while b != 0 {
                    let t = b;
                    b = a % b;
                    a = t;
                }
                match i64::try_from(a) {
                    Ok(v) => Int::Fix(v),
                    Err(_) => Int::from_big(BigInt::from(a)),
                }
            }
            _ => {
                let mut a = self.big().abs();
                let mut b = o.big().abs();
                while !b.is_zero() {
                    let t = &a % &b;
                    a = b;
                    b = t;
                }
                Int::from_big(a)
            }
        }
    }

    /// Raise to a non-negative power.
    pub fn pow(&self, exp: u32) -> Int {
        if exp == 0 {
            return Int::ONE;
        }
        Int::from_big(num_traits::pow(self.big(), exp as usize))
    }

    /// `10^exp`, staying in the fixint range when possible.
    pub fn pow10(exp: u32) -> Int {
        if exp <= MAX_FIX_POW10 {
            Int::Fix(10i64.pow(exp))
        } else {
            Int::from_big(num_traits::pow(BigInt::from(10), exp as usize))
        }
    }

    /// Accumulate unsigned digits in the given radix, promoting to bigint
    /// when the value outgrows a fixint. `digits` must contain only valid
    /// digit characters for the radix.
    pub fn from_digits(radix: u32, digits: &str) -> Int {
        let mut val: i64 = 0;
        for ch in digits.chars() {
            let d = i64::from(ch.to_digit(radix).unwrap_or(0));
            match val
                .checked_mul(i64::from(radix))
                .and_then(|v| v.checked_add(d))
            {
                Some(v) => val = v,
                None => {
                    let text = digits.to_ascii_lowercase();
                    let big = BigInt::parse_bytes(text.as_bytes(), radix)
                        .unwrap_or_else(BigInt::zero);
                    return Int::from_big(big);
                }
            }
        }
        Int::Fix(val)
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Int::Fix(v) => *v as f64,
            Int::Big(b) => b.to_f64().unwrap_or_else(|| {
                if b.is_negative() {
                    f64::NEG_INFINITY
                } else {
                    f64::INFINITY
                }
            }),
        }
    }

    pub fn to_i64(&self) -> Result<i64, NumError> {
        match self {
            Int::Fix(v) => Ok(*v),
            Int::Big(_) => Err(NumError::OutOfRange),
        }
    }

    pub fn to_u32(&self) -> Result<u32, NumError> {
        match self {
            Int::Fix(v) => u32::try_from(*v).map_err(|_| NumError::OutOfRange),
            Int::Big(_) => Err(NumError::OutOfRange),
        }
    }

    pub fn to_usize(&self) -> Result<usize, NumError> {
        match self {
            Int::Fix(v) => usize::try_from(*v).map_err(|_| NumError::OutOfRange),
            Int::Big(_) => Err(NumError::OutOfRange),
        }
    }

    pub fn cmp_int(&self, o: &Int) -> Ordering {
        match (self, o) {
            (Int::Fix(a), Int::Fix(b)) => a.cmp(b),
            (Int::Fix(a), Int::Big(b)) => BigInt::from(*a).cmp(b),
            (Int::Big(a), Int::Fix(b)) => (**a).cmp(&BigInt::from(*b)),
            (Int::Big(a), Int::Big(b)) => a.cmp(b),
        }
    }

    /// Render in the given radix (digits are lowercase, sign leading).
    pub fn to_str_radix(&self, radix: u32) -> String {
        match self {
            Int::Fix(v) => BigInt::from(*v).to_str_radix(radix),
            Int::Big(b) => b.to_str_radix(radix),
        }
    }
}

impl From<i64> for Int {
    fn from(v: i64) -> Int {
        Int::Fix(v)
    }
}

impl fmt::Display for Int {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Int::Fix(v) => write!(f, "{v}"),
            Int::Big(b) => write!(f, "{b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_overflow_promotes_to_big() {
        let max = Int::Fix(i64::MAX);
        let sum = max.add(&Int::ONE);
        assert!(matches!(sum, Int::Big(_)));
        assert_eq!(sum, Int::from_big(BigInt::from(i64::MAX) + 1));
        // and back down
        assert_eq!(sum.sub(&Int::ONE), max);
    }

    #[test]
    fn test_mul_overflow_bit_exact() {
        let a = Int::Fix(i64::MAX / 2 + 1);
        let b = Int::Fix(4);
        let prod = a.mul(&b);
        assert_eq!(prod, Int::from_big(BigInt::from(i64::MAX / 2 + 1) * 4));
    }

    #[test]
    fn test_neg_min() {
        let n = Int::Fix(i64::MIN).neg();
        assert_eq!(n, Int::from_big(-BigInt::from(i64::MIN)));
        assert_eq!(n.neg(), Int::Fix(i64::MIN));
    }

    #[test]
    fn test_quotient_remainder_truncate() {
        let q = |a: i64, b: i64| Int::Fix(a).quotient(&Int::Fix(b)).unwrap();
        let r = |a: i64, b: i64| Int::Fix(a).remainder(&Int::Fix(b)).unwrap();
        assert_eq!(q(42, 8), Int::Fix(5));
        assert_eq!(q(-42, 8), Int::Fix(-5));
        assert_eq!(q(42, -8), Int::Fix(-5));
        assert_eq!(r(42, 8), Int::Fix(2));
        assert_eq!(r(-42, 8), Int::Fix(-2));
        assert_eq!(r(42, -8), Int::Fix(2));
        assert_eq!(
            Int::Fix(1).quotient(&Int::ZERO),
            Err(NumError::DivisionByZero)
        );
    }

    #[test]
    fn test_gcd_non_negative() {
        assert_eq!(Int::Fix(12).gcd(&Int::Fix(-8)), Int::Fix(4));
        assert_eq!(Int::Fix(-12).gcd(&Int::Fix(-8)), Int::Fix(4));
        assert_eq!(Int::Fix(0).gcd(&Int::Fix(7)), Int::Fix(7));
    }

    #[test]
    fn test_from_digits_radix() {
        assert_eq!(Int::from_digits(10, "12345"), Int::Fix(12345));
        assert_eq!(Int::from_digits(16, "ff"), Int::Fix(255));
        assert_eq!(Int::from_digits(2, "1010"), Int::Fix(10));
        assert_eq!(Int::from_digits(8, "777"), Int::Fix(511));
        // 20 nines overflows i64
        let big = Int::from_digits(10, "99999999999999999999");
        assert_eq!(
            big,
            Int::from_big(BigInt::parse_bytes(b"99999999999999999999", 10).unwrap())
        );
    }

    #[test]
    fn test_pow10() {
        assert_eq!(Int::pow10(0), Int::Fix(1));
        assert_eq!(Int::pow10(18), Int::Fix(1_000_000_000_000_000_000));
        assert_eq!(
            Int::pow10(19),
            Int::from_big(num_traits::pow(BigInt::from(10), 19))
        );
    }
}
