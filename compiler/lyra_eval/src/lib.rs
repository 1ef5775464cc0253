//! Instruction evaluator for the Lyra Scheme runtime.
//!
//! Executes the compiled instruction tree against a chain of runtime
//! environments. The central pieces:
//!
//! - the dual value/continuation evaluation protocol ([`eval_value`] and
//!   [`eval_step`]) and the trampoline that turns chains of tail calls
//!   into a loop instead of host-stack recursion
//! - procedure application with the trailing-argument-list convention
//!   shared by ordinary calls and the `apply` primitive
//! - restricted, one-shot, upward-only continuation capture
//! - the fixed-arity builtin operations and their registry
//! - host-implemented base procedures (`display` and friends)
//!
//! Faults travel as [`Signal::Error`] and pick up the source coordinates
//! of enclosing instructions while unwinding; continuation invocation
//! travels as [`Signal::Transfer`] and is never touched by that
//! translation.

mod builtins;
mod error;
mod eval;
pub mod natives;

pub use builtins::{builtin_registry, eval_builtin};
pub use error::{EvalError, EvalErrorKind, EvalResult, Signal};
pub use eval::{eval_step, eval_value, Step, Vm};
