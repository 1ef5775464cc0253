//! The universe of runtime values.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use lyra_num::{Int, Number};

use crate::coords::Coords;
use crate::instr::Closure;
use crate::symbol::Symbol;

/// A mutable cons cell, optionally carrying the source coordinates of the
/// form it was read from.
#[derive(Debug)]
pub struct PairCell {
    car: RefCell<Datum>,
    cdr: RefCell<Datum>,
    coords: Coords,
}

impl PairCell {
    pub fn car(&self) -> Datum {
        self.car.borrow().clone()
    }

    pub fn cdr(&self) -> Datum {
        self.cdr.borrow().clone()
    }

    pub fn set_car(&self, value: Datum) {
        *self.car.borrow_mut() = value;
    }

    pub fn set_cdr(&self, value: Datum) {
        *self.cdr.borrow_mut() = value;
    }

    pub fn coords(&self) -> &Coords {
        &self.coords
    }
}

/// Any value in the interpreted language.
///
/// Pairs, vectors and strings are shared, mutable reference types; the
/// empty list and the unspecified value are unit variants compared by
/// variant. Everything else is an immutable value.
#[derive(Clone, Debug)]
pub enum Datum {
    /// The unique empty list.
    Nil,
    /// The "unspecified" value returned by side-effecting forms.
    Unspec,
    /// End of input, produced by the reader layer.
    Eof,
    Bool(bool),
    Char(char),
    Num(Number),
    Str(Rc<RefCell<String>>),
    Sym(Symbol),
    Pair(Rc<PairCell>),
    Vector(Rc<RefCell<Vec<Datum>>>),
    Closure(Rc<Closure>),
}

impl Datum {
    pub fn cons(car: Datum, cdr: Datum) -> Datum {
        Datum::cons_at(Coords::NONE, car, cdr)
    }

    pub fn cons_at(coords: Coords, car: Datum, cdr: Datum) -> Datum {
        Datum::Pair(Rc::new(PairCell {
            car: RefCell::new(car),
            cdr: RefCell::new(cdr),
            coords,
        }))
    }

    pub fn string(s: impl Into<String>) -> Datum {
        Datum::Str(Rc::new(RefCell::new(s.into())))
    }

    pub fn vector(items: Vec<Datum>) -> Datum {
        Datum::Vector(Rc::new(RefCell::new(items)))
    }

    pub fn fix(v: i64) -> Datum {
        Datum::Num(Number::Int(Int::Fix(v)))
    }

    /// Build a proper list from the items, in order.
    pub fn list<I>(items: I) -> Datum
    where
        I: IntoIterator<Item = Datum>,
        I::IntoIter: DoubleEndedIterator,
    {
        let mut res = Datum::Nil;
        for item in items.into_iter().rev() {
            res = Datum::cons(item, res);
        }
        res
    }

    /// Everything but `#f` is true.
    pub fn is_true(&self) -> bool {
        !matches!(self, Datum::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Datum::Nil)
    }

    pub fn as_pair(&self) -> Option<&Rc<PairCell>> {
        match self {
            Datum::Pair(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Datum::Sym(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Datum::Num(n) => Some(n),
            _ => None,
        }
    }

    /// Iterate over the cars of a list, stopping at the first non-pair tail.
    pub fn list_iter(&self) -> ListIter {
        ListIter {
            cur: self.clone(),
        }
    }

    /// Shallow identity equality.
    ///
    /// Small exact integers compare by value, mirroring an interned
    /// small-integer cache; heap values compare by reference.
    pub fn eq(&self, o: &Datum) -> bool {
        match (self, o) {
            (Datum::Nil, Datum::Nil)
            | (Datum::Unspec, Datum::Unspec)
            | (Datum::Eof, Datum::Eof) => true,
            (Datum::Bool(a), Datum::Bool(b)) => a == b,
            (Datum::Char(a), Datum::Char(b)) => a == b,
            (Datum::Sym(a), Datum::Sym(b)) => a == b,
            (Datum::Num(Number::Int(Int::Fix(a))), Datum::Num(Number::Int(Int::Fix(b)))) => {
                a == b
            }
            (Datum::Str(a), Datum::Str(b)) => Rc::ptr_eq(a, b),
            (Datum::Pair(a), Datum::Pair(b)) => Rc::ptr_eq(a, b),
            (Datum::Vector(a), Datum::Vector(b)) => Rc::ptr_eq(a, b),
            (Datum::Closure(a), Datum::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `eq` extended with numeric equivalence.
    pub fn eqv(&self, o: &Datum) -> bool {
        if self.eq(o) {
            return true;
        }
        match (self, o) {
            (Datum::Num(a), Datum::Num(b)) => {
                matches!(a.cmp_num(b), Ok(Ordering::Equal))
            }
            _ => false,
        }
    }
}

pub struct ListIter {
    cur: Datum,
}

impl Iterator for ListIter {
    type Item = Datum;

    fn next(&mut self) -> Option<Datum> {
        let (car, cdr) = match &self.cur {
            Datum::Pair(p) => (p.car(), p.cdr()),
            _ => return None,
        };
        self.cur = cdr;
        Some(car)
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut visited = HashSet::new();
        fmt_datum(self, f, &mut visited)
    }
}

/// Render a datum, guarding against cyclic pairs and vectors.
fn fmt_datum(
    d: &Datum,
    f: &mut fmt::Formatter<'_>,
    visited: &mut HashSet<usize>,
) -> fmt::Result {
    match d {
        Datum::Nil => f.write_str("()"),
        Datum::Unspec => f.write_str("#<unspecified>"),
        Datum::Eof => f.write_str("#<eof>"),
        Datum::Bool(true) => f.write_str("#t"),
        Datum::Bool(false) => f.write_str("#f"),
        Datum::Char(c) => write!(f, "{c}"),
        Datum::Num(n) => write!(f, "{n}"),
        Datum::Str(s) => f.write_str(&s.borrow()),
        Datum::Sym(s) => write!(f, "{s}"),
        Datum::Vector(v) => {
            let key = Rc::as_ptr(v) as usize;
            f.write_str("#(")?;
            if visited.insert(key) {
                for (i, item) in v.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    fmt_datum(item, f, visited)?;
                }
                visited.remove(&key);
            } else {
                f.write_str("@rc@")?;
            }
            f.write_str(")")
        }
        Datum::Pair(first) => {
            let key = Rc::as_ptr(first) as usize;
            f.write_str("(")?;
            if visited.insert(key) {
                let mut spine = vec![key];
                let mut p = Rc::clone(first);
                loop {
                    fmt_datum(&p.car(), f, visited)?;
                    match p.cdr() {
                        Datum::Nil => break,
                        Datum::Pair(next) => {
                            let next_key = Rc::as_ptr(&next) as usize;
                            if !visited.insert(next_key) {
                                f.write_str(" @rc@")?;
                                break;
                            }
                            spine.push(next_key);
                            f.write_str(" ")?;
                            p = next;
                        }
                        other => {
                            f.write_str(" . ")?;
                            fmt_datum(&other, f, visited)?;
                            break;
                        }
                    }
                }
                for k in spine {
                    visited.remove(&k);
                }
            } else {
                f.write_str("@rc@")?;
            }
            f.write_str(")")
        }
        Datum::Closure(c) => write!(f, "{}", c.lambda),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_list_construction_and_display() {
        let syms = SymbolTable::new();
        let l = Datum::list([
            Datum::Sym(syms.intern("a")),
            Datum::fix(1),
            Datum::string("x"),
        ]);
        assert_eq!(l.to_string(), "(a 1 x)");
        assert_eq!(Datum::Nil.to_string(), "()");
        let improper = Datum::cons(Datum::fix(1), Datum::fix(2));
        assert_eq!(improper.to_string(), "(1 . 2)");
    }

    #[test]
    fn test_cyclic_display_terminates() {
        let p = Datum::cons(Datum::fix(1), Datum::Nil);
        if let Datum::Pair(cell) = &p {
            cell.set_cdr(p.clone());
        }
        let rendered = p.to_string();
        assert!(rendered.contains("@rc@"), "got {rendered}");
    }

    #[test]
    fn test_shared_structure_is_not_flagged_as_cyclic() {
        let x = Datum::list([Datum::fix(1)]);
        let both = Datum::list([x.clone(), x]);
        assert_eq!(both.to_string(), "((1) (1))");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Datum::Bool(false).is_true());
        assert!(Datum::Bool(true).is_true());
        assert!(Datum::Nil.is_true());
        assert!(Datum::fix(0).is_true());
        assert!(Datum::Unspec.is_true());
    }

    #[test]
    fn test_eq_and_eqv() {
        let syms = SymbolTable::new();
        let a = Datum::Sym(syms.intern("a"));
        let a2 = Datum::Sym(syms.intern("a"));
        assert!(a.eq(&a2));

        // small integers compare by value under eq
        assert!(Datum::fix(5).eq(&Datum::fix(5)));

        // pairs by identity
        let p1 = Datum::cons(Datum::fix(1), Datum::Nil);
        let p2 = Datum::cons(Datum::fix(1), Datum::Nil);
        assert!(!p1.eq(&p2));
        assert!(p1.eq(&p1.clone()));

        // eqv equates numerically across representations
        let exact = Datum::fix(1);
        let inexact = Datum::Num(Number::Real(1.0));
        assert!(!exact.eq(&inexact));
        assert!(exact.eqv(&inexact));
    }

    #[test]
    fn test_list_iter() {
        let l = Datum::list([Datum::fix(1), Datum::fix(2), Datum::fix(3)]);
        let items: Vec<_> = l.list_iter().collect();
        assert_eq!(items.len(), 3);
        assert!(items[2].eqv(&Datum::fix(3)));
    }
}
