//! Host-implemented base procedures.
//!
//! These are ordinary procedures registered under their Scheme names and
//! invoked through the same environment-slot convention as interpreted
//! closures: argument N sits at slot `RESERVED_SLOTS + N`, and a rest
//! parameter arrives as a (possibly empty) list in the slot after the
//! declared ones. They return a datum or fail with a message, which the
//! evaluator turns into a positioned runtime error at the call site.

use std::cell::Cell;
use std::io::Write as _;
use std::rc::Rc;

use lyra_ir::{Datum, Frame, Lambda, Symbol, SymbolTable};
use lyra_num::Number;

/// `(display datum)` — print the datum to standard output.
pub fn display(name: Symbol) -> Rc<Lambda> {
    Rc::new(Lambda::native(
        Some(name),
        1,
        false,
        Rc::new(|frame: &Frame| {
            print!("{}", frame.arg(0));
            let _ = std::io::stdout().flush();
            Ok(Datum::Unspec)
        }),
    ))
}

/// `(gentemp)` — a fresh uninterned-looking symbol, `__%1`, `__%2`, ...
///
/// The counter is shared with the interpreter so generated names never
/// collide across compilation units.
pub fn gentemp(
    name: Symbol,
    symbols: Rc<SymbolTable>,
    counter: Rc<Cell<u32>>,
) -> Rc<Lambda> {
    Rc::new(Lambda::native(
        Some(name),
        0,
        false,
        Rc::new(move |_frame: &Frame| {
            let n = counter.get() + 1;
            counter.set(n);
            Ok(Datum::Sym(symbols.intern(&format!("__%{n}"))))
        }),
    ))
}

/// `(__%string-append str . strs)` — concatenate strings.
pub fn string_append(name: Symbol) -> Rc<Lambda> {
    Rc::new(Lambda::native(
        Some(name),
        1,
        true,
        Rc::new(|frame: &Frame| {
            let mut res = match frame.arg(0) {
                Datum::Str(s) => s.borrow().clone(),
                other => {
                    return Err(format!(
                        "string-append: string required, but got {other}"
                    ))
                }
            };
            for d in frame.arg(1).list_iter() {
                match d {
                    Datum::Str(s) => res.push_str(&s.borrow()),
                    other => {
                        return Err(format!(
                            "string-append: string required, but got {other}"
                        ))
                    }
                }
            }
            Ok(Datum::string(res))
        }),
    ))
}

/// `(__%number->string n [radix [precision]])`.
///
/// The radix must be 2, 8, 10 or 16; a non-10 radix is only valid for
/// exact numbers. The precision argument is validated but not used.
pub fn number_to_string(name: Symbol) -> Rc<Lambda> {
    Rc::new(Lambda::native(
        Some(name),
        1,
        true,
        Rc::new(|frame: &Frame| {
            let n = match frame.arg(0) {
                Datum::Num(n) => n,
                other => {
                    return Err(format!(
                        "number->string: number required, but got {other}"
                    ))
                }
            };

            let mut radix = 10u32;
            let mut rest = frame.arg(1);

            if let Datum::Pair(p) = &rest {
                let t = small_int(&p.car(), "radix")?;
                match t {
                    2 | 8 | 10 | 16 => radix = t as u32,
                    _ => {
                        return Err(format!("number->string: invalid radix {t}"))
                    }
                }
                rest = p.cdr();
            }
            if let Datum::Pair(p) = &rest {
                let t = small_int(&p.car(), "precision")?;
                if t < 0 {
                    return Err(format!("number->string: invalid precision {t}"));
                }
                rest = p.cdr();
            }
            if !rest.is_nil() {
                return Err("number->string: more than 3 parameters".to_owned());
            }

            if radix != 10 && !n.is_exact() {
                return Err(
                    "number->string: invalid radix for inexact number".to_owned()
                );
            }

            n.to_literal(radix)
                .map(Datum::string)
                .map_err(|e| format!("number->string: {e}"))
        }),
    ))
}

fn small_int(d: &Datum, what: &str) -> Result<i64, String> {
    match d {
        Datum::Num(n) => match n {
            Number::Int(i) => i
                .to_i64()
                .map_err(|e| format!("number->string: {what}: {e}")),
            _ => Err(format!("number->string: invalid {what} {n}")),
        },
        other => Err(format!("number->string: invalid {what} {other}")),
    }
}
