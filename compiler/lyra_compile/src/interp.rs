//! The interpreter facade: symbol table, builtin registry, top-level
//! scope and environment, the macro world, and the parse/compile/eval
//! entry points tying the pipeline together.
//!
//! Macro transformers run during compilation against a separate "macro
//! world": a second top-level scope and environment seeded with the same
//! base library and prelude as the regular one. User code reaches it
//! through `define-macro` (whose transformer is compiled and evaluated
//! there) and the `macro-env` escape form.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use lyra_diagnostic::{CollectingReporter, ErrorInfo, Reporter, TooManyErrors};
use lyra_eval::{
    builtin_registry, eval_value, natives, EvalError, EvalErrorKind, Signal, Vm,
};
use lyra_ir::{
    BuiltinSig, Closure, Coords, Datum, EnvRef, Frame, Instr, Lambda,
    ScopeArena, ScopeId, Symbol, SymbolTable,
};
use lyra_lexer::{Lexer, Token};
use lyra_parse::DatumParser;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::compiler::Compiler;

/// Base procedures defined over the builtin invocation forms, evaluated
/// into both worlds before any user code runs.
const PRELUDE: &str = include_str!("prelude.scm");

/// Everything that went wrong in one parse/compile pass.
#[derive(Debug)]
pub struct ParseErrors {
    pub errors: Vec<ErrorInfo>,
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}

/// Failure of one evaluation request.
#[derive(Debug, Error)]
pub enum LyraError {
    #[error(transparent)]
    Parse(ParseErrors),
    #[error(transparent)]
    Eval(EvalError),
}

/// Tunables for [`Interp`] construction.
pub struct InterpBuilder {
    env_size: u32,
    max_errors: usize,
}

impl InterpBuilder {
    /// Size of the top-level environment, bounding the number of
    /// top-level bindings.
    pub fn env_size(mut self, env_size: u32) -> InterpBuilder {
        self.env_size = env_size;
        self
    }

    /// Errors tolerated before a parse or compile pass aborts.
    pub fn max_errors(mut self, max_errors: usize) -> InterpBuilder {
        self.max_errors = max_errors;
        self
    }

    pub fn build(self) -> Interp {
        let symbols = Rc::new(SymbolTable::new());
        let builtins = builtin_registry(&symbols);
        let mut arena = ScopeArena::new();
        let top_scope = arena.push(None, false, self.env_size);
        let macro_scope = arena.push(None, false, self.env_size);

        let mut interp = Interp {
            symbols,
            builtins,
            arena,
            top_scope,
            top_env: Frame::new(None, self.env_size as usize),
            macro_scope,
            macro_env: Frame::new(None, self.env_size as usize),
            vm: Vm::new(),
            temp_counter: Rc::new(Cell::new(0)),
            max_errors: self.max_errors,
        };
        interp.define_std_lib();
        interp.bootstrap();
        interp
    }
}

pub struct Interp {
    symbols: Rc<SymbolTable>,
    builtins: FxHashMap<Symbol, BuiltinSig>,
    arena: ScopeArena,
    top_scope: ScopeId,
    top_env: EnvRef,
    macro_scope: ScopeId,
    macro_env: EnvRef,
    vm: Vm,
    temp_counter: Rc<Cell<u32>>,
    max_errors: usize,
}

impl Interp {
    pub fn builder() -> InterpBuilder {
        InterpBuilder {
            env_size: 1024,
            max_errors: 10,
        }
    }

    pub fn new() -> Interp {
        Interp::builder().build()
    }

    pub fn symbols(&self) -> &Rc<SymbolTable> {
        &self.symbols
    }

    /// Parse, compile and evaluate one source string.
    pub fn eval_str(&mut self, src: &str) -> Result<Datum, LyraError> {
        self.eval_source(src, None)
    }

    /// Like [`Self::eval_str`], with a file name for error positions.
    pub fn eval_source(
        &mut self,
        src: &str,
        file: Option<&str>,
    ) -> Result<Datum, LyraError> {
        let reporter = Rc::new(CollectingReporter::new(self.max_errors));
        let datums = self.parse(src, file, &reporter);
        let instr = self.compile(&datums, &reporter);
        if reporter.error_count() > 0 {
            return Err(LyraError::Parse(ParseErrors {
                errors: reporter.errors(),
            }));
        }

        match instr {
            None => Ok(Datum::Unspec),
            Some(instr) => eval_value(&instr, &self.top_env, &mut self.vm)
                .map_err(|sig| LyraError::Eval(into_eval_error(sig))),
        }
    }

    /// Whether `src` holds a complete s-expression: parenthesis-balanced,
    /// or containing an error the caller will discover by evaluating it.
    /// Intended for interactive use, where more input may follow.
    pub fn is_complete_expr(&self, src: &str) -> bool {
        let fail_fast: Rc<dyn Reporter> = Rc::new(FailFast);
        let mut lex = Lexer::new(
            src,
            Some("<string>"),
            Rc::clone(&self.symbols),
            fail_fast,
        );
        let mut level: i32 = 0;
        loop {
            let tok = lex.next_token();
            match tok {
                Token::Eof => break,
                Token::LParen | Token::LSquare => level += 1,
                Token::RParen | Token::RSquare => level -= 1,
                _ => {}
            }
        }
        if lex.aborted() {
            // Any lexical error: report the expression complete, so the
            // caller re-parses it and sees the error immediately.
            return true;
        }
        level <= 0
    }

    fn parse(
        &self,
        src: &str,
        file: Option<&str>,
        reporter: &Rc<CollectingReporter>,
    ) -> Vec<Datum> {
        let dyn_reporter: Rc<dyn Reporter> = Rc::clone(reporter) as Rc<dyn Reporter>;
        let lexer = Lexer::new(src, file, Rc::clone(&self.symbols), dyn_reporter);
        DatumParser::new(lexer).parse_program()
    }

    fn compile(
        &mut self,
        datums: &[Datum],
        reporter: &Rc<CollectingReporter>,
    ) -> Option<Rc<Instr>> {
        if reporter.error_count() > 0 {
            return None;
        }
        let body = Datum::list(datums.iter().cloned());
        let dyn_reporter: Rc<dyn Reporter> = Rc::clone(reporter) as Rc<dyn Reporter>;
        let mut compiler = Compiler::new(
            &self.builtins,
            &mut self.arena,
            &dyn_reporter,
            self.macro_scope,
            &self.macro_env,
            &mut self.vm,
        );
        compiler
            .compile_top_level(&body, self.top_scope, true)
            .unwrap_or(None)
    }

    /// Register the host-implemented base procedures in both worlds.
    fn define_std_lib(&mut self) {
        let names: [(&str, fn(&Interp, Symbol) -> Rc<Lambda>); 4] = [
            ("display", |_, name| natives::display(name)),
            ("gentemp", |interp, name| {
                natives::gentemp(
                    name,
                    Rc::clone(&interp.symbols),
                    Rc::clone(&interp.temp_counter),
                )
            }),
            ("__%string-append", |_, name| natives::string_append(name)),
            ("__%number->string", |_, name| natives::number_to_string(name)),
        ];
        for (name, make) in names {
            let sym = self.symbols.intern(name);
            let lambda = make(self, sym.clone());
            self.define_native(self.top_scope, &Rc::clone(&self.top_env), &sym, &lambda);
            self.define_native(
                self.macro_scope,
                &Rc::clone(&self.macro_env),
                &sym,
                &lambda,
            );
        }
    }

    fn define_native(
        &mut self,
        scope: ScopeId,
        env: &EnvRef,
        sym: &Symbol,
        lambda: &Rc<Lambda>,
    ) {
        let vb = self
            .arena
            .bind_var(scope, sym)
            .expect("the top level has room for the base library");
        env.local_set(
            vb.index as usize,
            Datum::Closure(Rc::new(Closure {
                env: Rc::clone(env),
                lambda: Rc::clone(lambda),
            })),
        );
    }

    /// Compile the prelude against the regular top level, then seed the
    /// macro world with the same bindings and evaluate it in both.
    fn bootstrap(&mut self) {
        let reporter = Rc::new(CollectingReporter::new(self.max_errors));
        let datums = self.parse(PRELUDE, Some("<prelude>"), &reporter);
        let instr = self.compile(&datums, &reporter);
        assert!(
            reporter.error_count() == 0,
            "the prelude failed to compile: {}",
            ParseErrors {
                errors: reporter.errors()
            }
        );

        self.arena.copy_bindings(self.top_scope, self.macro_scope);

        if let Some(instr) = instr {
            for env in [Rc::clone(&self.macro_env), Rc::clone(&self.top_env)] {
                if let Err(sig) = eval_value(&instr, &env, &mut self.vm) {
                    panic!(
                        "the prelude failed to evaluate: {}",
                        into_eval_error(sig)
                    );
                }
            }
        }
    }

    /// Compile one source string and hand back the instruction tree,
    /// without evaluating it.
    #[cfg(test)]
    pub(crate) fn compile_str(&mut self, src: &str) -> Option<Rc<Instr>> {
        let reporter = Rc::new(CollectingReporter::new(self.max_errors));
        let datums = self.parse(src, None, &reporter);
        let instr = self.compile(&datums, &reporter);
        assert!(
            reporter.error_count() == 0,
            "compile_str: {}",
            ParseErrors {
                errors: reporter.errors()
            }
        );
        instr
    }
}

impl Default for Interp {
    fn default() -> Interp {
        Interp::new()
    }
}

fn into_eval_error(sig: Signal) -> EvalError {
    match sig {
        Signal::Error(e) => *e,
        Signal::Transfer { .. } => EvalError::new(EvalErrorKind::Host {
            message: "continuation transfer escaped to the top level".to_owned(),
        }),
    }
}

/// A reporter that aborts on the first error without recording it, for
/// completeness probing.
struct FailFast;

impl Reporter for FailFast {
    fn error(
        &self,
        _coords: Option<&Coords>,
        _cause: Option<&str>,
        _message: &str,
    ) -> Result<(), TooManyErrors> {
        Err(TooManyErrors)
    }

    fn error_count(&self) -> usize {
        0
    }
}
