//! Complex numbers: a pair of same-tower reals.

use std::rc::Rc;

use crate::number::Number;

/// A complex number in rectangular form.
///
/// Both parts are non-complex tower members. [`Complex::make`] collapses to
/// the real part alone whenever the imaginary part is zero, so a `Complex`
/// value always has a non-zero imaginary part.
#[derive(Clone, Debug, PartialEq)]
pub struct Complex {
    pub re: Number,
    pub im: Number,
}

impl Complex {
    pub fn make(re: Number, im: Number) -> Number {
        if im.is_zero() {
            re
        } else {
            Number::Complex(Rc::new(Complex { re, im }))
        }
    }

    pub fn is_exact(&self) -> bool {
        self.re.is_exact() && self.im.is_exact()
    }

    pub fn is_zero(&self) -> bool {
        self.re.is_zero() && self.im.is_zero()
    }

    pub fn neg(&self) -> Number {
        Complex::make(self.re.neg(), self.im.neg())
    }

    pub(crate) fn add(&self, o: &Number) -> Number {
        if o.is_zero() {
            return Number::Complex(Rc::new(self.clone()));
        }
        if let Number::Complex(x) = o {
            Complex::make(self.re.add(&x.re), self.im.add(&x.im))
        } else {
            Complex::make(self.re.add(o), self.im.clone())
        }
    }

    pub(crate) fn sub(&self, o: &Number) -> Number {
        if o.is_zero() {
            return Number::Complex(Rc::new(self.clone()));
        }
        if let Number::Complex(x) = o {
            Complex::make(self.re.sub(&x.re), self.im.sub(&x.im))
        } else {
            Complex::make(self.re.sub(o), self.im.clone())
        }
    }

    /// Computes `o - self` for a lower-ranked `o`.
    pub(crate) fn sub_r(&self, o: &Number) -> Number {
        Complex::make(o.sub(&self.re), self.im.neg())
    }

    pub(crate) fn mul(&self, o: &Number) -> Number {
        if let Number::Complex(x) = o {
            let (c, d) = (&x.re, &x.im);
            Complex::make(
                self.re.mul(c).sub(&self.im.mul(d)),
                self.im.mul(c).add(&self.re.mul(d)),
            )
        } else {
            Complex::make(self.re.mul(o), self.im.mul(o))
        }
    }

    pub(crate) fn div(&self, o: &Number) -> Number {
        if let Number::Complex(x) = o {
            let (c, d) = (&x.re, &x.im);
            let norm = c.mul(c).add(&d.mul(d));
            Complex::make(
                self.re.mul(c).add(&self.im.mul(d)).div(&norm),
                self.im.mul(c).sub(&self.re.mul(d)).div(&norm),
            )
        } else {
            let norm = o.mul(o);
            Complex::make(self.re.mul(o).div(&norm), self.im.mul(o).div(&norm))
        }
    }

    /// Computes `o / self` for a lower-ranked `o`.
    pub(crate) fn div_r(&self, o: &Number) -> Number {
        let norm = self.re.mul(&self.re).add(&self.im.mul(&self.im));
        Complex::make(
            o.mul(&self.re).div(&norm),
            o.mul(&self.im).neg().div(&norm),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Int;
    use pretty_assertions::assert_eq;

    fn c(re: i64, im: i64) -> Number {
        Complex::make(Number::Int(Int::Fix(re)), Number::Int(Int::Fix(im)))
    }

    #[test]
    fn test_make_collapses_zero_imaginary() {
        assert_eq!(c(3, 0), Number::Int(Int::Fix(3)));
        assert!(matches!(c(3, 4), Number::Complex(_)));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(c(1, 2).add(&c(3, 4)), c(4, 6));
        assert_eq!(c(3, 4).sub(&c(1, 2)), c(2, 2));
        // (1+2i)(3+4i) = 3+4i+6i-8 = -5+10i
        assert_eq!(c(1, 2).mul(&c(3, 4)), c(-5, 10));
        // (i)(i) = -1 collapses to a real integer
        assert_eq!(c(0, 1).mul(&c(0, 1)), Number::Int(Int::Fix(-1)));
        // (-5+10i)/(3+4i) = 1+2i
        assert_eq!(c(-5, 10).div(&c(3, 4)), c(1, 2));
    }

    #[test]
    fn test_mixed_rank() {
        assert_eq!(c(1, 2).add(&Number::Int(Int::Fix(10))), c(11, 2));
        assert_eq!(c(2, 4).mul(&Number::Int(Int::Fix(2))), c(4, 8));
    }
}
