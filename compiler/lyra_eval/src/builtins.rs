//! Fixed-arity primitive operations and their registry.
//!
//! The registry maps builtin-invocation names (the `Name` in
//! `(__%builtin Name args...)`) to their instruction kind and declared
//! signature; the compiler checks arity against it and bakes the kind
//! into the instruction. `Apply` and `CallCC` are listed here for the
//! signature check but compile to dedicated instruction variants, so
//! [`eval_builtin`] never sees them.

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::rc::Rc;

use lyra_ir::{
    BuiltinKind, BuiltinSig, Datum, EnvRef, Instr, Symbol, SymbolTable,
};
use lyra_num::{Int, Number};
use rustc_hash::FxHashMap;

use crate::error::{EvalError, EvalErrorKind, EvalResult, Signal};
use crate::eval::{eval_value, Vm};

/// The builtin-invocation table: name, kind, required parameters, rest flag.
const DEFS: &[(&str, BuiltinKind, u32, bool)] = &[
    ("NullPred", BuiltinKind::NullPred, 1, false),
    ("PairPred", BuiltinKind::PairPred, 1, false),
    ("BooleanPred", BuiltinKind::BooleanPred, 1, false),
    ("SymbolPred", BuiltinKind::SymbolPred, 1, false),
    ("CharPred", BuiltinKind::CharPred, 1, false),
    ("StringPred", BuiltinKind::StringPred, 1, false),
    ("ProcedurePred", BuiltinKind::ProcedurePred, 1, false),
    ("VectorPred", BuiltinKind::VectorPred, 1, false),
    ("NumberPred", BuiltinKind::NumberPred, 1, false),
    ("ComplexPred", BuiltinKind::ComplexPred, 1, false),
    ("RealPred", BuiltinKind::RealPred, 1, false),
    ("RationalPred", BuiltinKind::RationalPred, 1, false),
    ("IntegerPred", BuiltinKind::IntegerPred, 1, false),
    ("ExactPred", BuiltinKind::ExactPred, 1, false),
    ("Eq", BuiltinKind::Eq, 2, false),
    ("Eqv", BuiltinKind::Eqv, 2, false),
    ("NumberLE", BuiltinKind::NumberLe, 2, false),
    ("NumberLT", BuiltinKind::NumberLt, 2, false),
    ("NumberEQ", BuiltinKind::NumberEq, 2, false),
    ("Add", BuiltinKind::Add, 2, false),
    ("Sub", BuiltinKind::Sub, 2, false),
    ("Mul", BuiltinKind::Mul, 2, false),
    ("Div", BuiltinKind::Div, 2, false),
    ("Quotient", BuiltinKind::Quotient, 2, false),
    ("Remainder", BuiltinKind::Remainder, 2, false),
    ("Cons", BuiltinKind::Cons, 2, false),
    ("SetCar", BuiltinKind::SetCar, 2, false),
    ("SetCdr", BuiltinKind::SetCdr, 2, false),
    ("Car", BuiltinKind::Car, 1, false),
    ("Cdr", BuiltinKind::Cdr, 1, false),
    ("SymbolToString", BuiltinKind::SymbolToString, 1, false),
    ("Compare2Strings", BuiltinKind::CompareStrings, 2, false),
    ("StringLength", BuiltinKind::StringLength, 1, false),
    ("StringRef", BuiltinKind::StringRef, 2, false),
    ("StringUpcase", BuiltinKind::StringUpcase, 1, false),
    ("StringDowncase", BuiltinKind::StringDowncase, 1, false),
    ("CharToInteger", BuiltinKind::CharToInteger, 1, false),
    ("CharDowncase", BuiltinKind::CharDowncase, 1, false),
    ("Exact", BuiltinKind::Exact, 1, false),
    ("Inexact", BuiltinKind::Inexact, 1, false),
    ("Numerator", BuiltinKind::Numerator, 1, false),
    ("Denominator", BuiltinKind::Denominator, 1, false),
    ("RealPart", BuiltinKind::RealPart, 1, false),
    ("ImagPart", BuiltinKind::ImagPart, 1, false),
    ("Expt", BuiltinKind::Expt, 2, false),
    ("MakeVector", BuiltinKind::MakeVector, 2, false),
    ("VectorLen", BuiltinKind::VectorLen, 1, false),
    ("VectorRef", BuiltinKind::VectorRef, 2, false),
    ("VectorSet", BuiltinKind::VectorSet, 3, false),
    ("Vector", BuiltinKind::Vector, 0, true),
    ("LitUnspec", BuiltinKind::LitUnspec, 0, false),
    ("Error", BuiltinKind::Error, 2, true),
    ("SyntaxError", BuiltinKind::SyntaxError, 2, false),
    ("Apply", BuiltinKind::Apply, 2, true),
    ("CallCC", BuiltinKind::CallCc, 1, false),
];

/// Build the name-to-signature table against a symbol table.
pub fn builtin_registry(symbols: &SymbolTable) -> FxHashMap<Symbol, BuiltinSig> {
    let mut map = FxHashMap::default();
    for &(name, kind, param_count, have_rest) in DEFS {
        map.insert(
            symbols.intern(name),
            BuiltinSig {
                kind,
                param_count,
                have_rest,
            },
        );
    }
    map
}

pub(crate) fn type_name(d: &Datum) -> &'static str {
    match d {
        Datum::Nil => "empty list",
        Datum::Unspec => "unspecified",
        Datum::Eof => "eof object",
        Datum::Bool(_) => "boolean",
        Datum::Char(_) => "character",
        Datum::Num(_) => "number",
        Datum::Str(_) => "string",
        Datum::Sym(_) => "symbol",
        Datum::Pair(_) => "pair",
        Datum::Vector(_) => "vector",
        Datum::Closure(_) => "procedure",
    }
}

fn type_err(expected: &'static str, got: &Datum) -> Signal {
    Signal::error(EvalErrorKind::TypeMismatch {
        expected,
        got: type_name(got),
    })
}

fn as_num(d: &Datum) -> Result<&Number, Signal> {
    d.as_number().ok_or_else(|| type_err("number", d))
}

fn as_int(d: &Datum) -> Result<&Int, Signal> {
    match d {
        Datum::Num(Number::Int(i)) => Ok(i),
        _ => Err(type_err("integer", d)),
    }
}

fn as_index(d: &Datum) -> Result<usize, Signal> {
    Ok(as_num(d)?.to_integer()?.to_usize()?)
}

fn as_char(d: &Datum) -> Result<char, Signal> {
    match d {
        Datum::Char(c) => Ok(*c),
        _ => Err(type_err("character", d)),
    }
}

fn as_str(d: &Datum) -> Result<String, Signal> {
    match d {
        Datum::Str(s) => Ok(s.borrow().clone()),
        _ => Err(type_err("string", d)),
    }
}

/// Evaluate the arguments of a fixed-arity builtin, one or two at a time.
fn one(args: &[Rc<Instr>], env: &EnvRef, vm: &mut Vm) -> EvalResult {
    eval_value(&args[0], env, vm)
}

fn two(
    args: &[Rc<Instr>],
    env: &EnvRef,
    vm: &mut Vm,
) -> Result<(Datum, Datum), Signal> {
    let a = eval_value(&args[0], env, vm)?;
    let b = eval_value(&args[1], env, vm)?;
    Ok((a, b))
}

/// Execute one primitive operation. The compiler has already checked the
/// argument count against the registry signature.
pub fn eval_builtin(
    kind: BuiltinKind,
    args: &[Rc<Instr>],
    env: &EnvRef,
    vm: &mut Vm,
) -> EvalResult {
    use BuiltinKind as B;
    match kind {
        B::NullPred => Ok(Datum::Bool(one(args, env, vm)?.is_nil())),
        B::PairPred => {
            Ok(Datum::Bool(matches!(one(args, env, vm)?, Datum::Pair(_))))
        }
        B::BooleanPred => {
            Ok(Datum::Bool(matches!(one(args, env, vm)?, Datum::Bool(_))))
        }
        B::SymbolPred => {
            Ok(Datum::Bool(matches!(one(args, env, vm)?, Datum::Sym(_))))
        }
        B::CharPred => {
            Ok(Datum::Bool(matches!(one(args, env, vm)?, Datum::Char(_))))
        }
        B::StringPred => {
            Ok(Datum::Bool(matches!(one(args, env, vm)?, Datum::Str(_))))
        }
        B::ProcedurePred => Ok(Datum::Bool(matches!(
            one(args, env, vm)?,
            Datum::Closure(_)
        ))),
        B::VectorPred => Ok(Datum::Bool(matches!(
            one(args, env, vm)?,
            Datum::Vector(_)
        ))),
        B::NumberPred | B::ComplexPred => {
            Ok(Datum::Bool(matches!(one(args, env, vm)?, Datum::Num(_))))
        }
        B::RealPred => Ok(Datum::Bool(matches!(
            one(args, env, vm)?,
            Datum::Num(n) if !matches!(n, Number::Complex(_))
        ))),
        B::RationalPred => Ok(Datum::Bool(matches!(
            one(args, env, vm)?,
            Datum::Num(Number::Int(_) | Number::Ratio(_))
        ))),
        B::IntegerPred => Ok(Datum::Bool(matches!(
            one(args, env, vm)?,
            Datum::Num(Number::Int(_))
        ))),
        B::ExactPred => Ok(Datum::Bool(matches!(
            one(args, env, vm)?,
            Datum::Num(n) if n.is_exact()
        ))),

        B::Eq => {
            let (a, b) = two(args, env, vm)?;
            Ok(Datum::Bool(a.eq(&b)))
        }
        B::Eqv => {
            let (a, b) = two(args, env, vm)?;
            Ok(Datum::Bool(a.eqv(&b)))
        }

        B::NumberLe | B::NumberLt | B::NumberEq => {
            let (a, b) = two(args, env, vm)?;
            let ord = as_num(&a)?
                .cmp_num(as_num(&b)?)
                .map_err(Signal::from)?;
            Ok(Datum::Bool(match kind {
                B::NumberLe => ord != Ordering::Greater,
                B::NumberLt => ord == Ordering::Less,
                _ => ord == Ordering::Equal,
            }))
        }

        B::Add => {
            let (a, b) = two(args, env, vm)?;
            Ok(Datum::Num(as_num(&a)?.add(as_num(&b)?)))
        }
        B::Sub => {
            let (a, b) = two(args, env, vm)?;
            Ok(Datum::Num(as_num(&a)?.sub(as_num(&b)?)))
        }
        B::Mul => {
            let (a, b) = two(args, env, vm)?;
            Ok(Datum::Num(as_num(&a)?.mul(as_num(&b)?)))
        }
        B::Div => {
            let (a, b) = two(args, env, vm)?;
            Ok(Datum::Num(as_num(&a)?.div(as_num(&b)?)))
        }
        B::Quotient => {
            let (a, b) = two(args, env, vm)?;
            Ok(Datum::Num(Number::Int(as_int(&a)?.quotient(as_int(&b)?)?)))
        }
        B::Remainder => {
            let (a, b) = two(args, env, vm)?;
            Ok(Datum::Num(Number::Int(as_int(&a)?.remainder(as_int(&b)?)?)))
        }

        B::Cons => {
            let (a, b) = two(args, env, vm)?;
            Ok(Datum::cons(a, b))
        }
        B::Car => match one(args, env, vm)? {
            Datum::Nil => Err(Signal::error(EvalErrorKind::CarOfNull)),
            Datum::Pair(p) => Ok(p.car()),
            other => Err(type_err("pair", &other)),
        },
        B::Cdr => match one(args, env, vm)? {
            Datum::Nil => Err(Signal::error(EvalErrorKind::CdrOfNull)),
            Datum::Pair(p) => Ok(p.cdr()),
            other => Err(type_err("pair", &other)),
        },
        B::SetCar => {
            let (a, b) = two(args, env, vm)?;
            match &a {
                Datum::Pair(p) => {
                    p.set_car(b);
                    Ok(Datum::Unspec)
                }
                _ => Err(type_err("pair", &a)),
            }
        }
        B::SetCdr => {
            let (a, b) = two(args, env, vm)?;
            match &a {
                Datum::Pair(p) => {
                    p.set_cdr(b);
                    Ok(Datum::Unspec)
                }
                _ => Err(type_err("pair", &a)),
            }
        }

        B::SymbolToString => match one(args, env, vm)? {
            Datum::Sym(s) => Ok(Datum::string(s.name())),
            other => Err(type_err("symbol", &other)),
        },
        B::CompareStrings => {
            let (a, b) = two(args, env, vm)?;
            let ord = as_str(&a)?.cmp(&as_str(&b)?);
            Ok(Datum::fix(match ord {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            }))
        }
        B::StringLength => {
            let s = as_str(&one(args, env, vm)?)?;
            Ok(Datum::fix(s.chars().count() as i64))
        }
        B::StringRef => {
            let (a, b) = two(args, env, vm)?;
            let s = as_str(&a)?;
            let index = as_index(&b)?;
            s.chars().nth(index).map(Datum::Char).ok_or_else(|| {
                Signal::error(EvalErrorKind::IndexOutOfBounds {
                    index,
                    len: s.chars().count(),
                })
            })
        }
        B::StringUpcase => {
            Ok(Datum::string(as_str(&one(args, env, vm)?)?.to_uppercase()))
        }
        B::StringDowncase => {
            Ok(Datum::string(as_str(&one(args, env, vm)?)?.to_lowercase()))
        }
        B::CharToInteger => {
            let c = as_char(&one(args, env, vm)?)?;
            Ok(Datum::fix(i64::from(u32::from(c))))
        }
        B::CharDowncase => {
            let c = as_char(&one(args, env, vm)?)?;
            Ok(Datum::Char(c.to_lowercase().next().unwrap_or(c)))
        }

        B::Exact => Ok(Datum::Num(as_num(&one(args, env, vm)?)?.to_exact())),
        B::Inexact => Ok(Datum::Num(as_num(&one(args, env, vm)?)?.to_inexact())),
        B::Numerator => Ok(Datum::Num(as_num(&one(args, env, vm)?)?.numerator()?)),
        B::Denominator => {
            Ok(Datum::Num(as_num(&one(args, env, vm)?)?.denominator()?))
        }
        B::RealPart => Ok(Datum::Num(as_num(&one(args, env, vm)?)?.real_part())),
        B::ImagPart => Ok(Datum::Num(as_num(&one(args, env, vm)?)?.imag_part())),
        B::Expt => {
            let (a, b) = two(args, env, vm)?;
            Ok(Datum::Num(as_num(&a)?.expt(as_num(&b)?)?))
        }

        B::MakeVector => {
            let (a, b) = two(args, env, vm)?;
            let len = as_index(&a)?;
            Ok(Datum::vector(vec![b; len]))
        }
        B::VectorLen => match one(args, env, vm)? {
            Datum::Vector(v) => Ok(Datum::fix(v.borrow().len() as i64)),
            other => Err(type_err("vector", &other)),
        },
        B::VectorRef => {
            let (a, b) = two(args, env, vm)?;
            let index = as_index(&b)?;
            match &a {
                Datum::Vector(v) => {
                    v.borrow().get(index).cloned().ok_or_else(|| {
                        Signal::error(EvalErrorKind::IndexOutOfBounds {
                            index,
                            len: v.borrow().len(),
                        })
                    })
                }
                _ => Err(type_err("vector", &a)),
            }
        }
        B::VectorSet => {
            let a = eval_value(&args[0], env, vm)?;
            let b = eval_value(&args[1], env, vm)?;
            let c = eval_value(&args[2], env, vm)?;
            let index = as_index(&b)?;
            match &a {
                Datum::Vector(v) => {
                    let mut v = v.borrow_mut();
                    let len = v.len();
                    match v.get_mut(index) {
                        Some(slot) => {
                            *slot = c;
                            Ok(Datum::Unspec)
                        }
                        None => Err(Signal::error(
                            EvalErrorKind::IndexOutOfBounds { index, len },
                        )),
                    }
                }
                _ => Err(type_err("vector", &a)),
            }
        }
        B::Vector => {
            let mut res = Vec::with_capacity(args.len());
            for a in args {
                res.push(eval_value(a, env, vm)?);
            }
            Ok(Datum::vector(res))
        }

        B::LitUnspec => Ok(Datum::Unspec),

        B::Error => {
            let who = one(args, env, vm)?;
            let message = eval_value(&args[1], env, vm)?;
            let mut res = String::from("Application error:");
            if who.is_true() {
                let _ = write!(res, "{who}:");
            }
            let _ = write!(res, "{message}");
            if args.len() > 2 {
                res.push('(');
                for (i, a) in args[2..].iter().enumerate() {
                    if i > 0 {
                        res.push(' ');
                    }
                    let v = eval_value(a, env, vm)?;
                    let _ = write!(res, "{v}");
                }
                res.push(')');
            }
            Err(Signal::error(EvalErrorKind::Application { message: res }))
        }
        B::SyntaxError => {
            let (a, b) = two(args, env, vm)?;
            let mut err = EvalError::new(EvalErrorKind::Syntax {
                message: b.to_string(),
            });
            if let Datum::Pair(p) = &a {
                if p.coords().is_known() {
                    err.coords = Some(p.coords().clone());
                }
            }
            Err(err.into())
        }

        B::Apply | B::CallCc => {
            unreachable!("compiled as dedicated instructions")
        }
    }
}
