//! Numeric literal scanning.
//!
//! Handles the full tower: radix and exactness prefixes, integers,
//! rationals, decimals with exponent suffixes and mantissa-width
//! annotations, signed infinities and NaN, and rectangular complex
//! literals. The polar `@` form is recognized and reported as
//! unimplemented.

use lyra_num::{exact_decimal, Complex, Int, Number, Rational};

use crate::{digit_value, is_base_digit, is_delimiter, Lexer, Token};

/// Largest exponent magnitude accepted in a decimal literal.
const MAX_EXPONENT: i32 = 100_000;

/// An unsigned integer plus the digit text it was scanned from. The text
/// length (leading zeros included) is what decimal scaling needs.
struct ScannedInt {
    value: Int,
    digits: String,
}

impl Lexer {
    /// Entered with the current character one of `0-9 . # + -`.
    /// Returns `None` after an unrecoverable literal error; the caller
    /// resumes token scanning.
    pub(crate) fn scan_number(&mut self) -> Option<Token> {
        let mut base: u32 = 0;
        let mut exact: i32 = 0; // -1 inexact, +1 exact

        while self.cur == Some('#') {
            self.next_char();
            match self.cur.map(|c| c.to_ascii_lowercase()) {
                Some('i') => {
                    if exact != 0 {
                        self.error("More than one exactness #prefix in a number");
                    }
                    exact = -1;
                }
                Some('e') => {
                    if exact != 0 {
                        self.error("More than one exactness #prefix in a number");
                    }
                    exact = 1;
                }
                Some('b') => {
                    if base != 0 {
                        self.error("More than one base #prefix in a number");
                    }
                    base = 2;
                }
                Some('o') => {
                    if base != 0 {
                        self.error("More than one base #prefix in a number");
                    }
                    base = 8;
                }
                Some('d') => {
                    if base != 0 {
                        self.error("More than one base #prefix in a number");
                    }
                    base = 10;
                }
                Some('x') => {
                    if base != 0 {
                        self.error("More than one base #prefix in a number");
                    }
                    base = 16;
                }
                _ => self.error("Invalid number prefix"),
            }
            self.next_char();
        }

        if base == 0 {
            base = 10;
        }

        let res = self.scan_complex(base, exact)?;

        if !is_delimiter(self.cur) {
            self.error("No delimiter after number");
        }

        self.value_number = Some(res);
        Some(Token::Number)
    }

    fn scan_complex(&mut self, base: u32, exact: i32) -> Option<Number> {
        let mut save_sign: Option<char> = None;

        if self.cur == Some('+') || self.cur == Some('-') {
            save_sign = self.cur;
            self.next_char();
            // `+i` / `-i` alone — but only when the `i` ends the literal,
            // so `+inf.0` still reaches the infinity path below.
            if matches!(self.cur, Some(c) if c.to_ascii_lowercase() == 'i')
                && is_delimiter(self.peek_ahead())
            {
                self.next_char();
                let one = if exact >= 0 {
                    Number::fix(if save_sign == Some('+') { 1 } else { -1 })
                } else {
                    Number::Real(if save_sign == Some('+') { 1.0 } else { -1.0 })
                };
                let zero = if exact >= 0 {
                    Number::fix(0)
                } else {
                    Number::Real(0.0)
                };
                return Some(Complex::make(zero, one));
            }
            if let Some(sign) = save_sign {
                self.unget_char(sign);
            }
        }

        let a = self.scan_real(base, exact)?;

        match self.cur {
            Some('@') => {
                self.next_char();
                let _angle = self.scan_real(base, exact)?;
                self.error("@ (polar) number notation not implemented");
                None
            }

            Some('i') | Some('I') => {
                // `+ai` / `-ai`: a pure imaginary value; the sign is
                // required and was already applied by scan_real.
                if save_sign.is_none() {
                    self.error("Invalid complex number format");
                }
                self.next_char();
                let exact = if exact == 0 {
                    if a.is_exact() {
                        1
                    } else {
                        -1
                    }
                } else {
                    exact
                };
                let zero = if exact > 0 {
                    Number::fix(0)
                } else {
                    Number::Real(0.0)
                };
                Some(Complex::make(zero, a))
            }

            Some(sign @ ('+' | '-')) => {
                self.next_char();
                if matches!(self.cur, Some(c) if c.to_ascii_lowercase() == 'i')
                    && is_delimiter(self.peek_ahead())
                {
                    // `a+i` / `a-i`
                    self.next_char();
                    let exact = if exact == 0 {
                        if a.is_exact() {
                            1
                        } else {
                            -1
                        }
                    } else {
                        exact
                    };
                    let one = if exact > 0 {
                        Number::fix(if sign == '+' { 1 } else { -1 })
                    } else {
                        Number::Real(if sign == '+' { 1.0 } else { -1.0 })
                    };
                    Some(Complex::make(a, one))
                } else {
                    // `a+bi` / `a-bi`; scan_real reparses the sign.
                    self.unget_char(sign);
                    let b = self.scan_real(base, exact)?;
                    if matches!(self.cur, Some(c) if c.to_ascii_lowercase() == 'i') {
                        self.next_char();
                    } else {
                        self.error("Invalid complex number format");
                    }
                    Some(Complex::make(a, b))
                }
            }

            _ => Some(a),
        }
    }

    fn scan_real(&mut self, base: u32, exact: i32) -> Option<Number> {
        let mut sign = 1i32;
        let mut saw_sign = false;

        if self.cur == Some('-') {
            sign = -1;
            saw_sign = true;
            self.next_char();
        } else if self.cur == Some('+') {
            saw_sign = true;
            self.next_char();
        }

        // +inf.0 / -inf.0 / +nan.0 scan as identifiers after the sign.
        if saw_sign
            && matches!(self.cur, Some(c) if matches!(c.to_ascii_lowercase(), 'i' | 'n'))
        {
            let save = self.cur.unwrap_or(' ');
            self.next_char();
            self.scan_rest_identifier(&save.to_string());
            let name = self
                .value_ident
                .take()
                .map(|s| s.name().to_owned())
                .unwrap_or_default();

            if name.eq_ignore_ascii_case("inf.0") {
                return Some(if exact > 0 {
                    if sign > 0 {
                        Rational::pos_inf()
                    } else {
                        Rational::neg_inf()
                    }
                } else if sign > 0 {
                    Number::Real(f64::INFINITY)
                } else {
                    Number::Real(f64::NEG_INFINITY)
                });
            }
            if name.eq_ignore_ascii_case("nan.0") {
                return Some(if exact > 0 {
                    Rational::nan()
                } else {
                    Number::Real(f64::NAN)
                });
            }

            self.error(&format!("Unsupported number syntax \"{name}\""));
            return None;
        }

        self.scan_ureal(base, exact, sign)
    }

    fn scan_ureal(&mut self, base: u32, exact: i32, sign: i32) -> Option<Number> {
        if self.cur == Some('.') {
            return self.scan_decimal(base, exact, sign, None);
        }

        let whole = self.scan_uinteger(base)?;

        match self.cur {
            Some('.' | 'e' | 'E' | 's' | 'S' | 'f' | 'F' | 'd' | 'D' | 'l' | 'L' | '|') => {
                return self.scan_decimal(base, exact, sign, Some(whole));
            }
            Some('/') => {
                self.next_char();
                let denom = self.scan_uinteger(base)?;
                let mut num = whole.value;
                if sign < 0 {
                    num = num.neg();
                }
                return Some(if exact >= 0 {
                    Rational::make(num, denom.value)
                } else {
                    Number::Int(num)
                        .to_inexact()
                        .div(&Number::Int(denom.value).to_inexact())
                });
            }
            _ => {}
        }

        let mut value = whole.value;
        if sign < 0 {
            value = value.neg();
        }
        Some(if exact >= 0 {
            Number::Int(value)
        } else {
            Number::Int(value).to_inexact()
        })
    }

    fn scan_decimal(
        &mut self,
        base: u32,
        exact: i32,
        sign: i32,
        whole: Option<ScannedInt>,
    ) -> Option<Number> {
        if base != 10 {
            self.error("Real numbers must use base 10");
        }

        let fract: Option<ScannedInt>;
        if whole.is_none() {
            // `.` <digits> <suffix>
            debug_assert_eq!(self.cur, Some('.'));
            self.next_char();
            fract = Some(self.scan_uinteger(10)?);
        } else if self.cur == Some('.') {
            self.next_char();
            if is_base_digit(10, self.cur) {
                fract = Some(self.scan_uinteger(10)?);
            } else {
                fract = None;
            }
        } else {
            fract = None;
        }

        // Exponent suffix; every precision marker maps to a double.
        let mut exponent_sign = 1i32;
        let mut exponent = 0i32;
        if matches!(
            self.cur,
            Some('e' | 'E' | 's' | 'S' | 'f' | 'F' | 'd' | 'D' | 'l' | 'L')
        ) {
            self.next_char();
            if self.cur == Some('+') {
                self.next_char();
            } else if self.cur == Some('-') {
                exponent_sign = -1;
                self.next_char();
            }
            exponent = self.scan_small_nonneg_int10()?;
            if exponent > MAX_EXPONENT {
                self.error("Number exponent is too large");
                exponent = 0;
            }
        }
        let exponent = exponent * exponent_sign;

        // Mantissa width annotation, accepted and ignored.
        if self.cur == Some('|') {
            self.next_char();
            let _width = self.scan_small_nonneg_int10()?;
        }

        if exact > 0 {
            // An exact result was requested: scale integers, never round
            // through a double.
            let (fract_value, fract_digits) = match &fract {
                Some(f) => (f.value.clone(), f.digits.len() as u32),
                None => (Int::ZERO, 0),
            };
            let whole_value = whole.map_or(Int::ZERO, |w| w.value);
            Some(exact_decimal(
                whole_value,
                fract_value,
                fract_digits,
                exponent,
                sign < 0,
            ))
        } else {
            // Inexact: round through the host float parser, preserving the
            // textual digits (leading fraction zeros matter).
            let mut buf = String::with_capacity(16);
            if sign < 0 {
                buf.push('-');
            }
            match &whole {
                Some(w) => buf.push_str(&w.digits),
                None => buf.push('0'),
            }
            if let Some(f) = &fract {
                buf.push('.');
                buf.push_str(&f.digits);
            }
            if exponent != 0 {
                buf.push('e');
                buf.push_str(&exponent.to_string());
            }

            match buf.parse::<f64>() {
                Ok(v) => Some(Number::Real(v)),
                Err(_) => {
                    self.error("Invalid real number");
                    Some(Number::Real(1.0))
                }
            }
        }
    }

    /// Scan an unsigned integer in the given radix. `None` when the current
    /// character is not a digit (reported).
    fn scan_uinteger(&mut self, radix: u32) -> Option<ScannedInt> {
        if !is_base_digit(radix, self.cur) {
            self.error("Invalid number");
            return None;
        }

        let mut digits = String::with_capacity(16);
        loop {
            digits.push(self.cur.unwrap_or('0'));
            self.next_char();
            if !is_base_digit(radix, self.cur) {
                break;
            }
        }

        Some(ScannedInt {
            value: Int::from_digits(radix, &digits),
            digits,
        })
    }

    /// Scan a small non-negative base-10 integer (exponents, widths).
    fn scan_small_nonneg_int10(&mut self) -> Option<i32> {
        if !is_base_digit(10, self.cur) {
            self.error("Invalid number");
            return None;
        }

        let mut val: i32 = digit_value(self.cur.unwrap_or('0')) as i32;
        loop {
            self.next_char();
            if !is_base_digit(10, self.cur) {
                break;
            }
            let digit = digit_value(self.cur.unwrap_or('0')) as i32;
            match val.checked_mul(10).and_then(|v| v.checked_add(digit)) {
                Some(v) => val = v,
                None => {
                    self.error("Number overflow");
                    // Consume the rest of the number.
                    loop {
                        self.next_char();
                        if !is_base_digit(10, self.cur) {
                            break;
                        }
                    }
                    return Some(0);
                }
            }
        }

        Some(val)
    }
}
