//! The `Number` sum type and rank-ordered cross-type dispatch.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::complex::Complex;
use crate::int::Int;
use crate::rational::Rational;
use crate::real;
use crate::NumError;

pub const RANK_FIX: u8 = 0;
pub const RANK_BIG: u8 = 1;
pub const RANK_RATIO: u8 = 2;
pub const RANK_REAL: u8 = 3;
pub const RANK_COMPLEX: u8 = 4;

/// A member of the numeric tower.
///
/// Binary operations dispatch on the higher-ranked operand: when the other
/// operand outranks `self`, the operation is delegated to it (with the
/// mirrored `sub_r`/`div_r` entry points for the non-commutative cases), so
/// each match arm below only ever sees operands of equal or lower rank.
#[derive(Clone, Debug, PartialEq)]
pub enum Number {
    Int(Int),
    Ratio(Rc<Rational>),
    Real(f64),
    Complex(Rc<Complex>),
}

impl Number {
    pub fn fix(v: i64) -> Number {
        Number::Int(Int::Fix(v))
    }

    pub fn rank(&self) -> u8 {
        match self {
            Number::Int(Int::Fix(_)) => RANK_FIX,
            Number::Int(Int::Big(_)) => RANK_BIG,
            Number::Ratio(_) => RANK_RATIO,
            Number::Real(_) => RANK_REAL,
            Number::Complex(_) => RANK_COMPLEX,
        }
    }

    pub fn is_exact(&self) -> bool {
        match self {
            Number::Int(_) | Number::Ratio(_) => true,
            Number::Real(_) => false,
            Number::Complex(c) => c.is_exact(),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::Int(a) => a.is_zero(),
            Number::Ratio(r) => r.is_zero(),
            Number::Real(v) => *v == 0.0,
            Number::Complex(c) => c.is_zero(),
        }
    }

    pub fn signum(&self) -> Result<i32, NumError> {
        match self {
            Number::Int(a) => Ok(a.signum()),
            Number::Ratio(r) => Ok(r.signum()),
            Number::Real(v) => Ok(match v.total_cmp(&0.0) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            }),
            Number::Complex(_) => Err(NumError::ComplexSign),
        }
    }

    /// Lossy conversion to a double. Only meaningful for non-complex values;
    /// dispatch never routes a complex operand here.
    pub fn to_f64(&self) -> f64 {
        match self {
            Number::Int(a) => a.to_f64(),
            Number::Ratio(r) => r.to_f64(),
            Number::Real(v) => *v,
            Number::Complex(_) => f64::NAN,
        }
    }

    /// The exact integer value, failing for anything with a fractional part.
    pub fn to_integer(&self) -> Result<Int, NumError> {
        match self {
            Number::Int(a) => Ok(a.clone()),
            Number::Ratio(r) => {
                if r.den.is_one() {
                    Ok(r.num.clone())
                } else {
                    Err(NumError::NotAnInteger)
                }
            }
            Number::Real(v) => real::to_integer(*v),
            Number::Complex(_) => Err(NumError::NotAnInteger),
        }
    }

    pub fn to_exact(&self) -> Number {
        match self {
            Number::Int(_) | Number::Ratio(_) => self.clone(),
            Number::Real(v) => real::to_exact(*v),
            Number::Complex(c) => Complex::make(c.re.to_exact(), c.im.to_exact()),
        }
    }

    pub fn to_inexact(&self) -> Number {
        match self {
            Number::Int(a) => Number::Real(a.to_f64()),
            Number::Ratio(r) => Number::Real(r.to_f64()),
            Number::Real(_) => self.clone(),
            Number::Complex(c) => Complex::make(c.re.to_inexact(), c.im.to_inexact()),
        }
    }

    pub fn neg(&self) -> Number {
        match self {
            Number::Int(a) => Number::Int(a.neg()),
            Number::Ratio(r) => Number::Ratio(Rc::new(Rational {
                num: r.num.neg(),
                den: r.den.clone(),
            })),
            Number::Real(v) => {
                if *v == 0.0 {
                    self.clone()
                } else {
                    Number::Real(-v)
                }
            }
            Number::Complex(c) => c.neg(),
        }
    }

    pub fn add(&self, o: &Number) -> Number {
        if o.rank() > self.rank() {
            return o.add(self);
        }
        match self {
            Number::Int(a) => Number::Int(a.add(o.as_int())),
            Number::Ratio(r) => match o {
                Number::Ratio(x) => Rational::make(
                    r.num.mul(&x.den).add(&r.den.mul(&x.num)),
                    r.den.mul(&x.den),
                ),
                _ => Rational::make(r.num.add(&r.den.mul(o.as_int())), r.den.clone()),
            },
            Number::Real(v) => Number::Real(v + o.to_f64()),
            Number::Complex(c) => c.add(o),
        }
    }

    pub fn sub(&self, o: &Number) -> Number {
        if o.rank() > self.rank() {
            return o.sub_r(self);
        }
        match self {
            Number::Int(a) => Number::Int(a.sub(o.as_int())),
            Number::Ratio(r) => match o {
                Number::Ratio(x) => Rational::make(
                    r.num.mul(&x.den).sub(&r.den.mul(&x.num)),
                    r.den.mul(&x.den),
                ),
                _ => Rational::make(r.num.sub(&r.den.mul(o.as_int())), r.den.clone()),
            },
            Number::Real(v) => Number::Real(v - o.to_f64()),
            Number::Complex(c) => c.sub(o),
        }
    }

    /// Reversed subtraction: computes `o - self` where `self` outranks `o`.
    fn sub_r(&self, o: &Number) -> Number {
        match self {
            Number::Int(a) => Number::Int(o.as_int().sub(a)),
            Number::Ratio(r) => {
                Rational::make(r.den.mul(o.as_int()).sub(&r.num), r.den.clone())
            }
            Number::Real(v) => Number::Real(o.to_f64() - v),
            Number::Complex(c) => c.sub_r(o),
        }
    }

    pub fn mul(&self, o: &Number) -> Number {
        if o.rank() > self.rank() {
            return o.mul(self);
        }
        match self {
            Number::Int(a) => Number::Int(a.mul(o.as_int())),
            Number::Ratio(r) => match o {
                Number::Ratio(x) => {
                    Rational::make(r.num.mul(&x.num), r.den.mul(&x.den))
                }
                _ => Rational::make(r.num.mul(o.as_int()), r.den.clone()),
            },
            Number::Real(v) => Number::Real(v * o.to_f64()),
            Number::Complex(c) => c.mul(o),
        }
    }

    pub fn div(&self, o: &Number) -> Number {
        if o.rank() > self.rank() {
            return o.div_r(self);
        }
        match self {
            Number::Int(a) => Rational::make(a.clone(), o.as_int().clone()),
            Number::Ratio(r) => match o {
                Number::Ratio(x) => {
                    Rational::make(r.num.mul(&x.den), r.den.mul(&x.num))
                }
                _ => Rational::make(r.num.clone(), r.den.mul(o.as_int())),
            },
            Number::Real(v) => Number::Real(v / o.to_f64()),
            Number::Complex(c) => c.div(o),
        }
    }

    /// Reversed division: computes `o / self` where `self` outranks `o`.
    fn div_r(&self, o: &Number) -> Number {
        match self {
            Number::Int(a) => Rational::make(o.as_int().clone(), a.clone()),
            Number::Ratio(r) => Rational::make(r.den.mul(o.as_int()), r.num.clone()),
            Number::Real(v) => Number::Real(o.to_f64() / v),
            Number::Complex(c) => c.div_r(o),
        }
    }

    /// Numeric comparison. Fails for complex operands with a non-zero
    /// imaginary part, which are unordered.
    pub fn cmp_num(&self, o: &Number) -> Result<Ordering, NumError> {
        if o.rank() > self.rank() {
            return o.cmp_num(self).map(Ordering::reverse);
        }
        match self {
            Number::Int(a) => Ok(a.cmp_int(o.as_int())),
            Number::Ratio(r) => Ok(match o {
                Number::Ratio(x) => r.cmp_ratio(x),
                _ => r.cmp_int(o.as_int()),
            }),
            Number::Real(v) => Ok(v.total_cmp(&o.to_f64())),
            Number::Complex(_) => Err(NumError::ComplexCompare),
        }
    }

    pub fn expt(&self, power: &Number) -> Result<Number, NumError> {
        match self {
            Number::Int(a) => match power {
                Number::Int(p) => {
                    if p.is_zero() {
                        Ok(Number::Int(Int::ONE))
                    } else if p.signum() > 0 {
                        Ok(Number::Int(a.pow(p.to_u32()?)))
                    } else {
                        // Negative power: 1 / a^(-p)
                        Ok(Rational::make(Int::ONE, a.pow(p.neg().to_u32()?)))
                    }
                }
                _ => self.to_inexact().expt(power),
            },
            Number::Ratio(r) => match power {
                Number::Int(p) => {
                    if p.is_zero() {
                        Ok(Number::Int(Int::ONE))
                    } else if p.signum() > 0 {
                        let e = p.to_u32()?;
                        Ok(Rational::make(r.num.pow(e), r.den.pow(e)))
                    } else {
                        let e = p.neg().to_u32()?;
                        Ok(Rational::make(r.den.pow(e), r.num.pow(e)))
                    }
                }
                _ => self.to_inexact().expt(power),
            },
            Number::Real(v) => {
                if power.rank() == RANK_COMPLEX {
                    return Err(NumError::ComplexPower);
                }
                Ok(Number::Real(v.powf(power.to_f64())))
            }
            Number::Complex(c) => {
                if c.im.is_zero() {
                    c.re.expt(power)
                } else {
                    Err(NumError::ComplexPower)
                }
            }
        }
    }

    pub fn numerator(&self) -> Result<Number, NumError> {
        match self {
            Number::Int(_) => Ok(self.clone()),
            Number::Ratio(r) => Ok(Number::Int(r.num.clone())),
            Number::Real(_) => Ok(self.to_exact().numerator()?.to_inexact()),
            Number::Complex(_) => Err(NumError::ComplexParts),
        }
    }

    pub fn denominator(&self) -> Result<Number, NumError> {
        match self {
            Number::Int(_) => Ok(Number::Int(Int::ONE)),
            Number::Ratio(r) => Ok(Number::Int(r.den.clone())),
            Number::Real(_) => Ok(self.to_exact().denominator()?.to_inexact()),
            Number::Complex(_) => Err(NumError::ComplexParts),
        }
    }

    pub fn real_part(&self) -> Number {
        match self {
            Number::Complex(c) => c.re.clone(),
            _ => self.clone(),
        }
    }

    pub fn imag_part(&self) -> Number {
        match self {
            Number::Complex(c) => c.im.clone(),
            Number::Real(_) => Number::Real(0.0),
            _ => Number::Int(Int::ZERO),
        }
    }

    /// Render as an external literal in the given radix. Inexact values only
    /// support radix 10.
    pub fn to_literal(&self, radix: u32) -> Result<String, NumError> {
        match self {
            Number::Int(i) => Ok(i.to_str_radix(radix)),
            Number::Ratio(r) => Ok(format!(
                "{}/{}",
                r.num.to_str_radix(radix),
                r.den.to_str_radix(radix)
            )),
            Number::Real(v) => {
                if radix != 10 {
                    return Err(NumError::InvalidRadix);
                }
                Ok(fmt_f64(*v))
            }
            Number::Complex(c) => {
                let re = c.re.to_literal(radix)?;
                let im = c.im.to_literal(radix)?;
                if im.starts_with('+') || im.starts_with('-') {
                    Ok(format!("{re}{im}i"))
                } else {
                    Ok(format!("{re}+{im}i"))
                }
            }
        }
    }

    /// The operand as an exact integer; rank dispatch guarantees the variant.
    fn as_int(&self) -> &Int {
        match self {
            Number::Int(i) => i,
            _ => unreachable!("rank dispatch guarantees an integer operand"),
        }
    }
}

/// Build the exact value of a decimal literal `whole.fract * 10^exponent`
/// by exact integer scaling. `fract_digits` is the number of textual digits
/// in the fraction (leading zeros included).
pub fn exact_decimal(
    whole: Int,
    fract: Int,
    fract_digits: u32,
    exponent: i32,
    negative: bool,
) -> Number {
    let flen = fract_digits as i32;
    let mut scaled = whole.mul(&Int::pow10(fract_digits)).add(&fract);
    if negative {
        scaled = scaled.neg();
    }
    if exponent >= flen {
        Number::Int(scaled.mul(&Int::pow10((exponent - flen) as u32)))
    } else {
        Rational::make(scaled, Int::pow10((flen - exponent) as u32))
    }
}

fn fmt_f64(v: f64) -> String {
    if v.is_nan() {
        return "+nan.0".to_owned();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+inf.0" } else { "-inf.0" }.to_owned();
    }
    let s = format!("{v}");
    if s.contains('.') || s.contains('e') {
        s
    } else {
        format!("{s}.0")
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Number {
        Number::fix(v)
    }
}

impl From<Int> for Number {
    fn from(v: Int) -> Number {
        Number::Int(v)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_literal(10) {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("#<number>"),
        }
    }
}
