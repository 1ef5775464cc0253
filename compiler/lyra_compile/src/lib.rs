//! Compiler and macro expander for the Lyra Scheme runtime.
//!
//! Transforms a top-level sequence of S-expression datums into a single
//! instruction tree: every variable reference is resolved to a (depth,
//! slot) pair at compile time, user macros are expanded by evaluating
//! their transformers against a separate macro world, and malformed
//! forms are reported with form-local recovery so their siblings still
//! compile.
//!
//! The crate also hosts [`Interp`], the facade that owns the symbol
//! table, builtin registry, top-level scopes and environments, and ties
//! the reader, compiler and evaluator into parse/compile/eval entry
//! points.

mod compiler;
mod interp;

pub use interp::{Interp, InterpBuilder, LyraError, ParseErrors};

#[cfg(test)]
mod tests;
