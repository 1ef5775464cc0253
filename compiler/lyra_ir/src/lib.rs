//! Core data model for the Lyra Scheme runtime.
//!
//! This crate holds everything that flows between the reader, the compiler
//! and the evaluator:
//!
//! - [`Datum`] — the universe of runtime values (booleans, characters,
//!   strings, the numeric tower, symbols, pairs, vectors, closures)
//! - [`Symbol`] / [`SymbolTable`] — interned symbols with their compile-time
//!   special-form classification
//! - [`ScopeArena`] — compile-time lexical frames mapping symbols to
//!   variable and macro bindings with slot assignment
//! - [`Instr`] — the compiled, immutable instruction tree
//! - [`Frame`] — the runtime environment: a slot array with a parent link
//! - [`Coords`] — compact source coordinates for error reporting

mod coords;
mod datum;
mod env;
mod instr;
mod scope;
mod symbol;

pub use coords::Coords;
pub use datum::{Datum, PairCell};
pub use env::{EnvRef, Frame, PARENT_SLOT, RESERVED_SLOTS};
pub use instr::{
    BuiltinKind, BuiltinSig, Closure, Instr, Lambda, LambdaBody, NativeFn,
    OneShot, Op,
};
pub use scope::{
    Binding, MacroBinding, ScopeArena, ScopeId, ScopeOverflow, VarBinding,
};
pub use symbol::{SymCode, Symbol, SymbolTable};
