//! The compiled instruction tree.
//!
//! Instructions are the executable representation of Scheme code: an
//! immutable expression tree built once by the compiler and re-executed on
//! every call. Each node carries optional source coordinates for error
//! reporting. Variable references are resolved to (depth, slot) pairs at
//! compile time, so evaluation never looks names up.
//!
//! Nodes are shared through [`Rc`]: the evaluator's continuation protocol
//! hands out owning references to the next instruction to run (a closure
//! body, a conditional branch), which may belong to a different tree than
//! the one currently being walked.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::coords::Coords;
use crate::datum::Datum;
use crate::env::{EnvRef, Frame, RESERVED_SLOTS};
use crate::symbol::Symbol;

/// A host-implemented procedure body. Receives the freshly built call
/// frame; argument N sits at slot `RESERVED_SLOTS + N`.
pub type NativeFn = Rc<dyn Fn(&Frame) -> Result<Datum, String>>;

/// State of a one-shot escape continuation.
///
/// Created by continuation capture and invalidated when the capturing call
/// returns by any path. Invoking the continuation after that is an error.
#[derive(Debug)]
pub struct OneShot {
    id: u64,
    used: Cell<bool>,
}

impl OneShot {
    pub fn new(id: u64) -> OneShot {
        OneShot {
            id,
            used: Cell::new(false),
        }
    }

    /// Identity of this capture; the capture site catches only transfers
    /// carrying its own id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_used(&self) -> bool {
        self.used.get()
    }

    pub fn invalidate(&self) {
        self.used.set(true);
    }
}

/// The body of a procedure: compiled code, a host function, or a captured
/// escape continuation.
#[derive(Clone)]
pub enum LambdaBody {
    Code(Rc<Instr>),
    Native(NativeFn),
    Escape(Rc<OneShot>),
}

/// Compiled procedure metadata.
#[derive(Clone)]
pub struct Lambda {
    /// The name the lambda was defined under, when known. Informational.
    pub name: Option<Symbol>,
    /// Number of regular parameters, excluding any rest parameter.
    pub param_count: u32,
    /// Whether a trailing rest parameter collects extra arguments.
    pub have_rest: bool,
    /// Total size of the invocation environment, parameters included.
    pub env_size: u32,
    pub body: LambdaBody,
}

impl Lambda {
    /// Wrap a host function as a procedure with the standard slot layout.
    pub fn native(
        name: Option<Symbol>,
        param_count: u32,
        have_rest: bool,
        func: NativeFn,
    ) -> Lambda {
        let env_size =
            RESERVED_SLOTS as u32 + param_count + u32::from(have_rest);
        Lambda {
            name,
            param_count,
            have_rest,
            env_size,
            body: LambdaBody::Native(func),
        }
    }

    /// A one-parameter procedure that transfers control back to the
    /// continuation capture identified by `state`.
    pub fn escape(state: Rc<OneShot>) -> Lambda {
        Lambda {
            name: None,
            param_count: 1,
            have_rest: false,
            env_size: RESERVED_SLOTS as u32 + 1,
            body: LambdaBody::Escape(state),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.body, LambdaBody::Native(_))
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<lambda:")?;
        if let Some(name) = &self.name {
            write!(f, "{name}")?;
        }
        write!(
            f,
            ":{}:{}>",
            self.param_count,
            if self.have_rest { 't' } else { 'f' }
        )
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// A procedure paired with its captured defining environment.
///
/// The pairing is immutable; the captured environment is shared by
/// reference, so `set!` through one closure is visible to every closure
/// capturing the same frame.
pub struct Closure {
    pub env: EnvRef,
    pub lambda: Rc<Lambda>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<closure:({})>", self.lambda)
    }
}

/// Identifies a fixed-arity primitive operation.
///
/// The compiler resolves `(__%builtin Name args...)` forms against the
/// builtin registry and bakes the kind into a [`Op::Builtin`] instruction.
/// `Apply` and `CallCc` get dedicated instruction variants instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    NullPred,
    PairPred,
    BooleanPred,
    SymbolPred,
    CharPred,
    StringPred,
    ProcedurePred,
    VectorPred,
    NumberPred,
    ComplexPred,
    RealPred,
    RationalPred,
    IntegerPred,
    ExactPred,
    Eq,
    Eqv,
    NumberLe,
    NumberLt,
    NumberEq,
    Add,
    Sub,
    Mul,
    Div,
    Quotient,
    Remainder,
    Cons,
    SetCar,
    SetCdr,
    Car,
    Cdr,
    SymbolToString,
    CompareStrings,
    StringLength,
    StringRef,
    StringUpcase,
    StringDowncase,
    CharToInteger,
    CharDowncase,
    Exact,
    Inexact,
    Numerator,
    Denominator,
    RealPart,
    ImagPart,
    Expt,
    MakeVector,
    VectorLen,
    VectorRef,
    VectorSet,
    Vector,
    LitUnspec,
    Error,
    SyntaxError,
    Apply,
    CallCc,
}

/// A builtin's registry entry: its kind and declared signature.
#[derive(Clone, Copy, Debug)]
pub struct BuiltinSig {
    pub kind: BuiltinKind,
    pub param_count: u32,
    pub have_rest: bool,
}

/// One executable construct.
#[derive(Debug)]
pub struct Instr {
    pub coords: Coords,
    pub op: Op,
}

/// The closed set of instruction variants.
#[derive(Debug)]
pub enum Op {
    /// A literal datum.
    Lit(Datum),
    /// A resolved variable reference: `depth` environments up, then `slot`.
    Var {
        depth: u32,
        slot: u32,
        name: Symbol,
    },
    /// Assignment to a resolved variable; yields the unspecified value.
    SetVar {
        depth: u32,
        slot: u32,
        name: Symbol,
        value: Rc<Instr>,
    },
    If {
        cond: Rc<Instr>,
        then: Rc<Instr>,
        els: Rc<Instr>,
    },
    /// Capture the current environment into a closure.
    MakeClosure(Rc<Lambda>),
    /// Evaluate in order, yielding the final value.
    Begin(Box<[Rc<Instr>]>),
    /// Build a vector from element instructions.
    MakeVector(Box<[Rc<Instr>]>),
    /// Generic application: target, positional arguments, and a final
    /// argument that must evaluate to a (possibly empty) list of further
    /// arguments.
    Apply(Box<[Rc<Instr>]>),
    /// Restricted continuation capture.
    CallCc(Box<[Rc<Instr>]>),
    /// Fixed-arity primitive invocation.
    Builtin {
        kind: BuiltinKind,
        args: Box<[Rc<Instr>]>,
    },
    /// Marks a subtree that may contain a tail call; driven iteratively.
    Tramp(Rc<Instr>),
}

impl Instr {
    pub fn new(coords: Coords, op: Op) -> Rc<Instr> {
        Rc::new(Instr { coords, op })
    }

    pub fn lit(coords: Coords, datum: Datum) -> Rc<Instr> {
        Instr::new(coords, Op::Lit(datum))
    }

    /// An unspecified-value literal, used as the error-recovery placeholder.
    pub fn unspec() -> Rc<Instr> {
        Instr::lit(Coords::NONE, Datum::Unspec)
    }

    /// An empty-list literal, the trailing-argument sentinel for calls.
    pub fn nil_lit() -> Rc<Instr> {
        Instr::lit(Coords::NONE, Datum::Nil)
    }

    /// Whether this is the empty-list literal sentinel.
    pub fn is_nil_lit(&self) -> bool {
        matches!(&self.op, Op::Lit(Datum::Nil))
    }
}
