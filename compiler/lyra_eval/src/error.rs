//! The evaluator's error channel.
//!
//! Everything that is not a value travels through [`Signal`]: runtime
//! faults as positioned [`EvalError`]s, and continuation invocation as a
//! [`Signal::Transfer`] that is passed through every fault-translation
//! layer untouched until the matching capture site catches it by identity.

use std::fmt;

use lyra_ir::{Coords, Datum};
use lyra_num::NumError;

pub type EvalResult = Result<Datum, Signal>;

/// Non-value outcome of evaluating an instruction.
#[derive(Debug)]
pub enum Signal {
    /// A runtime fault.
    Error(Box<EvalError>),
    /// Control transfer to the continuation capture identified by `id`,
    /// carrying the value that capture should return.
    Transfer { id: u64, value: Datum },
}

impl Signal {
    pub fn error(kind: EvalErrorKind) -> Signal {
        Signal::Error(Box::new(EvalError::new(kind)))
    }
}

impl From<EvalError> for Signal {
    fn from(e: EvalError) -> Signal {
        Signal::Error(Box::new(e))
    }
}

impl From<NumError> for Signal {
    fn from(e: NumError) -> Signal {
        Signal::error(EvalErrorKind::Num(e))
    }
}

/// A runtime fault, positioned when source coordinates were available at
/// the instruction that raised or first translated it.
#[derive(Debug)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    /// Where the fault occurred, when known.
    pub coords: Option<Coords>,
    /// Positions of enclosing instructions crossed while unwinding,
    /// innermost first.
    pub trace: Vec<Coords>,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind) -> EvalError {
        EvalError {
            kind,
            coords: None,
            trace: Vec::new(),
        }
    }

    pub fn at(kind: EvalErrorKind, coords: Coords) -> EvalError {
        EvalError {
            kind,
            coords: Some(coords),
            trace: Vec::new(),
        }
    }

    /// Attach the coordinates of an enclosing instruction: position an
    /// unpositioned error, or grow the pseudo stack trace of one that is
    /// already positioned.
    pub fn position(&mut self, coords: &Coords) {
        if !coords.is_known() {
            return;
        }
        if self.coords.is_some() {
            self.trace.push(coords.clone());
        } else {
            self.coords = Some(coords.clone());
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(coords) = &self.coords {
            write!(f, "{coords}:")?;
        }
        write!(f, "{}", self.kind)?;
        for c in &self.trace {
            write!(f, "\n{c}")?;
        }
        Ok(())
    }
}

impl std::error::Error for EvalError {}

/// The closed set of runtime fault categories.
#[derive(Debug)]
pub enum EvalErrorKind {
    NotAProcedure,
    CallCcNotProcedure,
    CallCcArity,
    Arity {
        name: String,
        required: u32,
        have_rest: bool,
    },
    ApplyLastNotList,
    ApplyLastImproper,
    ContinuationReused,
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    CarOfNull,
    CdrOfNull,
    IndexOutOfBounds {
        index: usize,
        len: usize,
    },
    Num(NumError),
    /// Raised by the `error` builtin; the message carries the full
    /// user-supplied rendering.
    Application {
        message: String,
    },
    /// Raised by the `syntax-error` builtin.
    Syntax {
        message: String,
    },
    /// A fault raised by a host-implemented procedure.
    Host {
        message: String,
    },
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAProcedure => f.write_str("Call of non-procedure"),
            Self::CallCcNotProcedure => {
                f.write_str("call/cc with non-procedure parameter")
            }
            Self::CallCcArity => {
                f.write_str("call/cc lambda must take one parameter")
            }
            Self::Arity {
                name,
                required,
                have_rest,
            } => write!(
                f,
                "Call to {name} expects {}{required} parameters",
                if *have_rest { "at least " } else { "" }
            ),
            Self::ApplyLastNotList => {
                f.write_str("Last parameter of (apply...) is not a list")
            }
            Self::ApplyLastImproper => {
                f.write_str("Last parameter of (apply...) is not a proper list")
            }
            Self::ContinuationReused => {
                f.write_str("Invalid attempt to reuse continuation")
            }
            Self::TypeMismatch { expected, got } => {
                write!(f, "{expected} required, but got {got}")
            }
            Self::CarOfNull => f.write_str("car of null"),
            Self::CdrOfNull => f.write_str("cdr of null"),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds (length {len})")
            }
            Self::Num(e) => write!(f, "{e}"),
            Self::Application { message }
            | Self::Syntax { message }
            | Self::Host { message } => f.write_str(message),
        }
    }
}
