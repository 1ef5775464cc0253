//! The compiler: S-expression datums to the instruction tree.
//!
//! One compilation unit is a top-level sequence of forms. Bodies are
//! processed in two phases:
//!
//! 1. `expand_body` expands identifier and combination macros to a fixed
//!    point, splices declaration-position `begin`s into the surrounding
//!    sequence, binds every `define`d symbol immediately (so recursive and
//!    forward references within the body resolve) and remembers the
//!    resolved binding, and installs `define-macro` family transformers by
//!    compiling and evaluating them in the macro world.
//! 2. `compile_body` compiles the expanded sequence: every non-final form
//!    for effect only, the final form for its result, wrapped in a
//!    trampoline marker when a tail call was recorded at lambda or
//!    library level.
//!
//! Error recovery is form-local: the first structural error in a form is
//! reported once, the form's substructure is abandoned and replaced with
//! an unspecified-value placeholder, and its siblings still compile. Only
//! an exhausted error budget or a scope slot overflow aborts the unit.

use std::mem;
use std::rc::Rc;

use lyra_diagnostic::Reporter;
use lyra_eval::{eval_value, Signal, Vm};
use lyra_ir::{
    BuiltinKind, BuiltinSig, Closure, Coords, Datum, EnvRef, Instr, Lambda,
    LambdaBody, Op, PairCell, ScopeArena, ScopeId, SymCode, Symbol, VarBinding,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

/// The unit was abandoned: too many errors, or a scope slot overflow.
/// The reporter already holds everything worth showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Aborted;

/// How a compilation failed past the point of form-local recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CErr {
    /// The current form was reported and abandoned; siblings continue.
    Invalid,
    /// The unit is unrecoverable: the error budget is exhausted or a
    /// scope ran out of slots.
    Fatal,
}

type CResult<T> = Result<T, CErr>;

/// Where a body sits; lambda and library bodies own the trampoline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyLevel {
    Library,
    Lambda,
    Inner,
}

/// One form of an expanded body, positioned by a synthetic spine pair.
struct EForm {
    cell: Rc<PairCell>,
    /// The binding resolved for a `define` at expansion time. A macro
    /// re-binding the name later must not move where the definition
    /// lands.
    define: Option<Rc<VarBinding>>,
}

pub(crate) struct Compiler<'a> {
    builtins: &'a FxHashMap<Symbol, BuiltinSig>,
    arena: &'a mut ScopeArena,
    reporter: &'a Rc<dyn Reporter>,
    macro_scope: ScopeId,
    macro_env: &'a EnvRef,
    vm: &'a mut Vm,
    /// Set when a call occurs in tail context anywhere in the unit being
    /// compiled; tells `compile_body` to emit the trampoline wrapper.
    have_tail_call: bool,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(
        builtins: &'a FxHashMap<Symbol, BuiltinSig>,
        arena: &'a mut ScopeArena,
        reporter: &'a Rc<dyn Reporter>,
        macro_scope: ScopeId,
        macro_env: &'a EnvRef,
        vm: &'a mut Vm,
    ) -> Compiler<'a> {
        Compiler {
            builtins,
            arena,
            reporter,
            macro_scope,
            macro_env,
            vm,
            have_tail_call: false,
        }
    }

    /// Compile a top-level sequence against `scope`. Returns `None` when
    /// the unit is empty, or `Err` when compilation aborted entirely.
    pub(crate) fn compile_top_level(
        &mut self,
        body: &Datum,
        scope: ScopeId,
        need_result: bool,
    ) -> Result<Option<Rc<Instr>>, Aborted> {
        match self.compile_body(true, BodyLevel::Library, scope, body, need_result, false)
        {
            Ok(instr) => Ok(instr),
            Err(CErr::Fatal) => Err(Aborted),
            Err(CErr::Invalid) => {
                unreachable!("compile_body recovers form-local errors")
            }
        }
    }

    // ----- error reporting ------------------------------------------------

    fn report(&mut self, coords: &Coords, message: &str) -> CResult<()> {
        let at = coords.is_known().then_some(coords);
        self.reporter
            .error(at, None, message)
            .map_err(|_| CErr::Fatal)
    }

    /// Report and abandon the current form.
    fn form_err<T>(&mut self, coords: &Coords, message: &str) -> CResult<T> {
        self.report(coords, message)?;
        Err(CErr::Invalid)
    }

    // ----- structural helpers ---------------------------------------------

    /// The cdr of a spine pair, which must keep the list proper.
    fn cdr_cell(&mut self, p: &Rc<PairCell>) -> CResult<Datum> {
        match p.cdr() {
            t @ (Datum::Nil | Datum::Pair(_)) => Ok(t),
            _ => {
                let coords = p.coords().clone();
                self.form_err(&coords, "Syntax must be a proper list")
            }
        }
    }

    /// Like [`Self::cdr_cell`], but the list must not end here.
    fn ncdr_cell(&mut self, p: &Rc<PairCell>) -> CResult<Rc<PairCell>> {
        if p.cdr().is_nil() {
            let coords = p.coords().clone();
            return self.form_err(&coords, "Invalid syntax - list is too short");
        }
        match self.cdr_cell(p)? {
            Datum::Pair(next) => Ok(next),
            Datum::Nil => unreachable!("emptiness was checked above"),
            _ => unreachable!("cdr_cell validated the shape"),
        }
    }

    fn car_symbol(&mut self, p: &Rc<PairCell>) -> CResult<Symbol> {
        match p.car() {
            Datum::Sym(s) => Ok(s),
            _ => {
                let coords = p.coords().clone();
                self.form_err(&coords, "Invalid syntax: symbol required")
            }
        }
    }

    /// The car of `p`, which must be a (possibly empty) list.
    fn car_pair(&mut self, p: &Rc<PairCell>) -> CResult<Datum> {
        match p.car() {
            t @ (Datum::Nil | Datum::Pair(_)) => Ok(t),
            _ => {
                let coords = p.coords().clone();
                self.form_err(&coords, "Invalid syntax: list required")
            }
        }
    }

    /// The car of `p` as a binding pair `(name value)`.
    fn binding_pair(&mut self, p: &Rc<PairCell>) -> CResult<Rc<PairCell>> {
        match self.car_pair(p)? {
            Datum::Pair(cell) => Ok(cell),
            _ => {
                let coords = p.coords().clone();
                self.form_err(&coords, "Invalid syntax: symbol required")
            }
        }
    }

    fn need_null_cdr(&mut self, p: &Rc<PairCell>) -> CResult<()> {
        if p.cdr().is_nil() {
            Ok(())
        } else {
            let coords = p.coords().clone();
            self.form_err(&coords, "Invalid syntax: list is too long")
        }
    }

    /// If the datum is an unshadowed symbol, its special-form code.
    fn check_special(&self, scope: ScopeId, d: &Datum) -> SymCode {
        match d {
            Datum::Sym(sym) if self.arena.lookup_any(scope, sym).is_none() => {
                sym.code()
            }
            _ => SymCode::None,
        }
    }

    /// Resolve a binding to its (depth, slot) pair relative to `scope`.
    fn resolve(&self, scope: ScopeId, vb: &VarBinding) -> (u32, u32) {
        let cur = self.arena.env_level(scope);
        let owner = self.arena.env_level(vb.scope);
        assert!(cur >= owner, "binding referenced from an enclosing scope");
        (cur - owner, vb.index)
    }

    /// Bind a variable; running out of slots is fatal for the unit.
    fn bind_var(
        &mut self,
        scope: ScopeId,
        sym: &Symbol,
        coords: &Coords,
    ) -> CResult<Rc<VarBinding>> {
        match self.arena.bind_var(scope, sym) {
            Ok(vb) => Ok(vb),
            Err(overflow) => {
                let _ = self.report(coords, &overflow.to_string());
                Err(CErr::Fatal)
            }
        }
    }

    // ----- body processing ------------------------------------------------

    fn compile_body(
        &mut self,
        decl: bool,
        level: BodyLevel,
        scope: ScopeId,
        body: &Datum,
        need_result: bool,
        tail: bool,
    ) -> CResult<Option<Rc<Instr>>> {
        let forms = self.expand_body(level, scope, body, decl)?;

        let mut block: Vec<Rc<Instr>> = Vec::new();
        if let Some((last, init)) = forms.split_last() {
            for form in init {
                let t = self.compile_form(decl, scope, form, false, false)?;
                splice_instr(&mut block, t);
            }

            if let Some(t) = self.compile_form(decl, scope, last, need_result, tail)? {
                // The trampoline goes only at the outer level, and only
                // when a tail call was recorded somewhere in the unit.
                let t = if matches!(level, BodyLevel::Lambda | BodyLevel::Library)
                    && self.have_tail_call
                {
                    Instr::new(t.coords.clone(), Op::Tramp(t))
                } else {
                    t
                };
                splice_instr(&mut block, Some(t));
            }
        }
        Ok(make_body(block, need_result))
    }

    /// Compile one expanded form, recovering from form-local errors.
    fn compile_form(
        &mut self,
        decl: bool,
        scope: ScopeId,
        form: &EForm,
        need_result: bool,
        tail: bool,
    ) -> CResult<Option<Rc<Instr>>> {
        let res = match &form.define {
            Some(binding) => {
                let binding = Rc::clone(binding);
                self.compile_define(scope, &form.cell, &binding, need_result)
            }
            None => {
                return self.compile_value(decl, scope, &form.cell, need_result, tail)
            }
        };
        match res {
            Err(CErr::Invalid) => Ok(Some(Instr::unspec())),
            other => other,
        }
    }

    /// Expand macros and process declarations across one body sequence.
    fn expand_body(
        &mut self,
        level: BodyLevel,
        scope: ScopeId,
        body: &Datum,
        mut decl: bool,
    ) -> CResult<Vec<EForm>> {
        trace!(body = %body, "expanding body");
        let mut out = Vec::new();
        self.expand_body_into(level, scope, body, &mut decl, &mut out)?;
        Ok(out)
    }

    fn expand_body_into(
        &mut self,
        level: BodyLevel,
        scope: ScopeId,
        body: &Datum,
        decl: &mut bool,
        out: &mut Vec<EForm>,
    ) -> CResult<()> {
        let mut cur = body.clone();
        loop {
            let cell = match &cur {
                Datum::Pair(p) => Rc::clone(p),
                _ => break,
            };
            match self.expand_form(level, scope, &cell, decl, out) {
                Ok(()) | Err(CErr::Invalid) => {}
                Err(CErr::Fatal) => return Err(CErr::Fatal),
            }
            cur = match self.cdr_cell(&cell) {
                Ok(d) => d,
                Err(CErr::Invalid) => break,
                Err(CErr::Fatal) => return Err(CErr::Fatal),
            };
        }
        Ok(())
    }

    fn expand_form(
        &mut self,
        level: BodyLevel,
        scope: ScopeId,
        cell: &Rc<PairCell>,
        decl: &mut bool,
        out: &mut Vec<EForm>,
    ) -> CResult<()> {
        let datum = self.expand_datum(scope, cell, cell.car())?;
        let mut define = None;

        if let Datum::Pair(pair) = &datum {
            match self.check_special(scope, &pair.car()) {
                SymCode::Begin => {
                    // A begin in declaration position splices its body
                    // into the surrounding sequence. The declaration flag
                    // is passed down by value, not shared.
                    let rest = self.cdr_cell(pair)?;
                    let mut inner_decl = *decl;
                    return self.expand_body_into(
                        level,
                        scope,
                        &rest,
                        &mut inner_decl,
                        out,
                    );
                }

                SymCode::Define => {
                    if !*decl && level != BodyLevel::Library {
                        let coords = pair.coords().clone();
                        self.report(&coords, "Declaration in expression context")?;
                    }
                    // Bind the defined symbol now, so the rest of the
                    // body can refer to it.
                    let t = self.ncdr_cell(pair)?;
                    let vb = match t.car() {
                        Datum::Sym(sym) => {
                            let coords = t.coords().clone();
                            self.bind_var(scope, &sym, &coords)?
                        }
                        Datum::Pair(t1) => {
                            let sym = self.car_symbol(&t1)?;
                            let coords = t1.coords().clone();
                            self.bind_var(scope, &sym, &coords)?
                        }
                        _ => {
                            let coords = t.coords().clone();
                            return self
                                .form_err(&coords, "Invalid syntax: list required");
                        }
                    };
                    define = Some(vb);
                }

                SymCode::DefineMacro
                | SymCode::DefineIdentifierMacro
                | SymCode::DefineSetMacro => {
                    self.define_macro(scope, pair)?;
                    return Ok(());
                }

                SymCode::MacroEnv => {
                    // Evaluate arbitrary code against the macro world,
                    // for bootstrapping macro-writing macros.
                    let rest = self.ncdr_cell(pair)?;
                    let saved = mem::replace(&mut self.have_tail_call, false);
                    let compiled = self.compile_body(
                        true,
                        BodyLevel::Library,
                        self.macro_scope,
                        &Datum::Pair(rest),
                        false,
                        false,
                    );
                    self.have_tail_call = saved;
                    let coords = pair.coords().clone();
                    self.eval_in_macro_world(&coords, compiled?)?;
                    return Ok(());
                }

                _ => {
                    *decl = false;
                }
            }
        } else {
            *decl = false;
        }

        out.push(EForm {
            cell: synthetic_cell(cell.coords().clone(), datum),
            define,
        });
        Ok(())
    }

    // ----- macro expansion ------------------------------------------------

    /// Expand the datum while it is a macro use; repeat for the result.
    fn expand_datum(
        &mut self,
        scope: ScopeId,
        cell: &Rc<PairCell>,
        datum: Datum,
    ) -> CResult<Datum> {
        let mut datum = datum;
        loop {
            match &datum {
                Datum::Sym(sym) => {
                    let expander = self
                        .arena
                        .lookup_macro(scope, sym)
                        .and_then(|mb| mb.identifier.borrow().clone());
                    if let Some(closure) = expander {
                        trace!(name = %sym, "expanding identifier macro");
                        // The identifier itself is the single parameter.
                        let arg = Instr::lit(cell.coords().clone(), datum.clone());
                        datum = self.eval_macro(cell, &closure, vec![arg])?;
                        continue;
                    }
                }
                Datum::Pair(pair) => {
                    if let Datum::Sym(head) = pair.car() {
                        let expander = self
                            .arena
                            .lookup_macro(scope, &head)
                            .and_then(|mb| mb.combination.borrow().clone());
                        if let Some(closure) = expander {
                            trace!(name = %head, before = %datum, "expanding macro");
                            let pair = Rc::clone(pair);
                            datum = match self.expand_combination(&pair, &closure) {
                                Ok(d) => d,
                                Err(CErr::Invalid) => Datum::Unspec,
                                Err(CErr::Fatal) => return Err(CErr::Fatal),
                            };
                            trace!(after = %datum, "expanded macro");
                            continue;
                        }
                    }
                }
                _ => {}
            }
            break;
        }
        Ok(datum)
    }

    fn expand_combination(
        &mut self,
        pair: &Rc<PairCell>,
        closure: &Rc<Closure>,
    ) -> CResult<Datum> {
        // The raw argument datums are wrapped as literals so the
        // transformer receives them as data, not as evaluated values.
        let mut params = Vec::new();
        let mut cur = self.cdr_cell(pair)?;
        loop {
            let p = match &cur {
                Datum::Pair(p) => Rc::clone(p),
                _ => break,
            };
            params.push(Instr::lit(p.coords().clone(), p.car()));
            cur = self.cdr_cell(&p)?;
        }
        self.eval_macro(pair, closure, params)
    }

    fn expand_set_macro(
        &mut self,
        form: &Rc<PairCell>,
        closure: &Rc<Closure>,
    ) -> CResult<Datum> {
        let p2 = self.ncdr_cell(form)?;
        let params = vec![
            Instr::lit(form.coords().clone(), form.car()),
            Instr::lit(p2.coords().clone(), p2.car()),
        ];
        self.eval_macro(form, closure, params)
    }

    /// Run a macro transformer by building a synthetic application over
    /// its closure and evaluating it immediately in the macro world.
    fn eval_macro(
        &mut self,
        src: &Rc<PairCell>,
        closure: &Rc<Closure>,
        params: Vec<Rc<Instr>>,
    ) -> CResult<Datum> {
        let coords = src.coords().clone();

        let mut apply_params = Vec::with_capacity(params.len() + 2);
        apply_params.push(Instr::lit(
            coords.clone(),
            Datum::Closure(Rc::clone(closure)),
        ));
        apply_params.extend(params);
        apply_params.push(Instr::nil_lit());
        let call = Instr::new(coords.clone(), Op::Apply(apply_params.into_boxed_slice()));

        let res = self.eval_in_macro_world(&coords, Some(call))?;

        if expansion_is_cyclic(&res) {
            return self.form_err(&coords, "Macro expansion returned a recursive list");
        }
        Ok(res)
    }

    /// Evaluate an instruction against the macro world. A fault raised by
    /// the transformer becomes a compile error at the use site and the
    /// expansion is replaced with the unspecified value.
    fn eval_in_macro_world(
        &mut self,
        src: &Coords,
        instr: Option<Rc<Instr>>,
    ) -> CResult<Datum> {
        let Some(instr) = instr else {
            return Ok(Datum::Unspec);
        };
        match eval_value(&instr, self.macro_env, self.vm) {
            Ok(d) => Ok(d),
            Err(Signal::Error(e)) => {
                self.report(src, &format!("Macro raised an error:{e}"))?;
                Ok(Datum::Unspec)
            }
            Err(Signal::Transfer { .. }) => {
                self.report(
                    src,
                    "Macro raised an error:continuation escaped the transformer",
                )?;
                Ok(Datum::Unspec)
            }
        }
    }

    /// Process a `define-macro` / `define-identifier-macro` /
    /// `define-set-macro` form: compile the transformer against the macro
    /// world, evaluate it there, and install the resulting closure.
    fn define_macro(&mut self, scope: ScopeId, next: &Rc<PairCell>) -> CResult<()> {
        let form_sym = match next.car() {
            Datum::Sym(s) => s,
            _ => unreachable!("dispatched on the head symbol"),
        };
        let pair = match self.cdr_cell(next)? {
            Datum::Pair(p) => p,
            Datum::Nil => {
                let coords = next.coords().clone();
                self.report(&coords, &format!("Bad ({form_sym}) form syntax"))?;
                return Ok(());
            }
            _ => unreachable!("cdr_cell validated the shape"),
        };

        let sym: Symbol;
        let mut value: Option<Rc<Instr>> = None;

        match pair.car() {
            Datum::Sym(s) => {
                sym = s;
                if !pair.cdr().is_nil() {
                    let vp = self.ncdr_cell(&pair)?;
                    let saved = mem::replace(&mut self.have_tail_call, false);
                    let res =
                        self.compile_value(false, self.macro_scope, &vp, true, false);
                    self.have_tail_call = saved;
                    value = res?;
                    self.need_null_cdr(&vp)?;
                }
            }
            Datum::Pair(inner) => {
                sym = self.car_symbol(&inner)?;
                let body = self.cdr_cell(&pair)?;
                if body.is_nil() {
                    let coords = pair.coords().clone();
                    self.report(
                        &coords,
                        &format!("Bad ({form_sym} ()) form syntax: missing body"),
                    )?;
                    return Ok(());
                }
                let coords = pair.coords().clone();
                value = self.compile_lambda(
                    self.macro_scope,
                    &coords,
                    &inner.cdr(),
                    &body,
                    true,
                    Some(sym.clone()),
                )?;
            }
            _ => {
                let coords = pair.coords().clone();
                self.report(&coords, &format!("Bad ({form_sym}) form syntax"))?;
                return Ok(());
            }
        }

        let coords = next.coords().clone();
        let tmp = self.eval_in_macro_world(&coords, value)?;
        let Datum::Closure(closure) = tmp else {
            self.report(
                &coords,
                &format!("({form_sym}) body did not evaluate to a closure"),
            )?;
            return Ok(());
        };

        let mb = self.arena.bind_macro(scope, &sym);
        match form_sym.code() {
            SymCode::DefineMacro => *mb.combination.borrow_mut() = Some(closure),
            SymCode::DefineIdentifierMacro => {
                *mb.identifier.borrow_mut() = Some(closure);
            }
            SymCode::DefineSetMacro => *mb.set.borrow_mut() = Some(closure),
            _ => unreachable!("dispatched on the form code"),
        }
        Ok(())
    }

    // ----- per-form compilation -------------------------------------------

    /// Compile the datum held by `cell` for its value, recovering from
    /// form-local errors with an unspecified-value placeholder.
    fn compile_value(
        &mut self,
        decl: bool,
        scope: ScopeId,
        cell: &Rc<PairCell>,
        need_result: bool,
        tail: bool,
    ) -> CResult<Option<Rc<Instr>>> {
        match self.compile_value_inner(decl, scope, cell, need_result, tail) {
            Err(CErr::Invalid) => Ok(Some(Instr::unspec())),
            other => other,
        }
    }

    /// Like [`Self::compile_value`] with `need_result`, unwrapping the
    /// always-present instruction.
    fn compile_value_req(
        &mut self,
        scope: ScopeId,
        cell: &Rc<PairCell>,
        tail: bool,
    ) -> CResult<Rc<Instr>> {
        Ok(self
            .compile_value(false, scope, cell, true, tail)?
            .unwrap_or_else(Instr::unspec))
    }

    fn compile_value_inner(
        &mut self,
        decl: bool,
        scope: ScopeId,
        cell: &Rc<PairCell>,
        need_result: bool,
        tail: bool,
    ) -> CResult<Option<Rc<Instr>>> {
        let mut datum = cell.car();
        if !decl {
            // Macros in declaration context were already expanded.
            datum = self.expand_datum(scope, cell, datum)?;
        }

        match &datum {
            Datum::Sym(sym) => {
                let Some(vb) = self.arena.lookup_var(scope, sym) else {
                    let coords = cell.coords().clone();
                    return self.form_err(&coords, &format!("Unbound variable {sym}"));
                };
                if !need_result {
                    return Ok(None);
                }
                let (depth, slot) = self.resolve(scope, &vb);
                Ok(Some(Instr::new(
                    cell.coords().clone(),
                    Op::Var {
                        depth,
                        slot,
                        name: sym.clone(),
                    },
                )))
            }

            Datum::Unspec => {
                Ok(need_result.then(Instr::unspec))
            }

            Datum::Vector(_) => self.compile_vector(scope, cell, &datum, need_result),

            Datum::Nil => {
                let coords = cell.coords().clone();
                self.form_err(&coords, "Invalid syntax")
            }

            Datum::Pair(form) => {
                let form = Rc::clone(form);
                match self.check_special(scope, &form.car()) {
                    SymCode::Begin => {
                        // Declaration-position begins were spliced by
                        // expand_body; this one is an expression.
                        let rest = self.cdr_cell(&form)?;
                        self.compile_body(
                            false,
                            BodyLevel::Inner,
                            scope,
                            &rest,
                            need_result,
                            tail,
                        )
                    }
                    SymCode::If => self.compile_if(scope, &form, tail),
                    SymCode::Lambda => {
                        self.compile_lambda_form(scope, &form, need_result)
                    }
                    SymCode::Builtin => self.compile_builtin(scope, &form),
                    SymCode::SetBang => {
                        self.compile_setbang(scope, &form, need_result, tail)
                    }
                    SymCode::Let => self.compile_let(scope, &form, need_result, tail),
                    SymCode::Letrec | SymCode::LetrecStar => {
                        self.compile_letrec_star(scope, &form, need_result, tail)
                    }
                    SymCode::Quote => self.compile_quote(&form),

                    SymCode::Define => {
                        let coords = form.coords().clone();
                        self.form_err(
                            &coords,
                            "(define ...) not allowed in expression context",
                        )
                    }

                    SymCode::MacroEnv
                    | SymCode::DefineMacro
                    | SymCode::DefineIdentifierMacro
                    | SymCode::DefineSetMacro => {
                        let coords = form.coords().clone();
                        self.form_err(
                            &coords,
                            "Macro definitions not allowed in expression context",
                        )
                    }

                    SymCode::Syntax
                    | SymCode::Quasisyntax
                    | SymCode::Unsyntax
                    | SymCode::UnsyntaxSplicing => {
                        let coords = form.coords().clone();
                        self.form_err(&coords, "Not implemented")
                    }

                    SymCode::None => self.compile_call(scope, &form, tail),
                }
            }

            // Everything else is self-evaluating, including datums a
            // macro expansion handed back (closures among them).
            _ => Ok(need_result
                .then(|| Instr::lit(cell.coords().clone(), datum.clone()))),
        }
    }

    fn compile_quote(&mut self, form: &Rc<PairCell>) -> CResult<Option<Rc<Instr>>> {
        let pair = self.ncdr_cell(form)?;
        let value = Instr::lit(pair.coords().clone(), pair.car());
        self.need_null_cdr(&pair)?;
        Ok(Some(value))
    }

    fn compile_if(
        &mut self,
        scope: ScopeId,
        form: &Rc<PairCell>,
        tail: bool,
    ) -> CResult<Option<Rc<Instr>>> {
        let cond = self.ncdr_cell(form)?;
        let then = self.ncdr_cell(&cond)?;
        let pelse = self.cdr_cell(&then)?;
        if let Datum::Pair(pe) = &pelse {
            let pe = Rc::clone(pe);
            self.need_null_cdr(&pe)?;
        }

        let cond_i = self.compile_value_req(scope, &cond, false)?;
        let then_i = self.compile_value_req(scope, &then, tail)?;
        let else_i = match &pelse {
            Datum::Pair(pe) => {
                let pe = Rc::clone(pe);
                self.compile_value_req(scope, &pe, tail)?
            }
            _ => Instr::unspec(),
        };

        Ok(Some(Instr::new(
            form.coords().clone(),
            Op::If {
                cond: cond_i,
                then: then_i,
                els: else_i,
            },
        )))
    }

    fn compile_call(
        &mut self,
        scope: ScopeId,
        form: &Rc<PairCell>,
        tail: bool,
    ) -> CResult<Option<Rc<Instr>>> {
        let mut params: SmallVec<[Rc<Instr>; 8]> = SmallVec::new();

        // The call target, then every actual parameter.
        params.push(self.compile_value_req(scope, form, false)?);
        let mut cur = self.cdr_cell(form)?;
        loop {
            let p = match &cur {
                Datum::Pair(p) => Rc::clone(p),
                _ => break,
            };
            params.push(self.compile_value_req(scope, &p, false)?);
            cur = self.cdr_cell(&p)?;
        }

        // The trailing argument-list sentinel, per apply's contract.
        params.push(Instr::nil_lit());

        if tail {
            self.have_tail_call = true;
        }

        Ok(Some(Instr::new(
            form.coords().clone(),
            Op::Apply(params.into_vec().into_boxed_slice()),
        )))
    }

    fn compile_builtin(
        &mut self,
        scope: ScopeId,
        form: &Rc<PairCell>,
    ) -> CResult<Option<Rc<Instr>>> {
        let symp = self.ncdr_cell(form)?;
        let sym = self.car_symbol(&symp)?;

        let Some(&sig) = self.builtins.get(&sym) else {
            let coords = symp.coords().clone();
            return self.form_err(&coords, &format!("{sym} is not a builtin"));
        };

        let mut params: SmallVec<[Rc<Instr>; 8]> = SmallVec::new();
        let mut cur = self.cdr_cell(&symp)?;
        loop {
            let p = match &cur {
                Datum::Pair(p) => Rc::clone(p),
                _ => break,
            };
            params.push(self.compile_value_req(scope, &p, false)?);
            cur = self.cdr_cell(&p)?;
        }

        let n = params.len() as u32;
        if n < sig.param_count || (n > sig.param_count && !sig.have_rest) {
            let coords = symp.coords().clone();
            return self.form_err(
                &coords,
                &format!(
                    "Builtin {sym} expects {}{} parameters",
                    if sig.have_rest { "at least " } else { "" },
                    sig.param_count
                ),
            );
        }

        let args = params.into_vec().into_boxed_slice();
        let op = match sig.kind {
            BuiltinKind::Apply => {
                self.have_tail_call = true;
                Op::Apply(args)
            }
            BuiltinKind::CallCc => Op::CallCc(args),
            kind => Op::Builtin { kind, args },
        };
        Ok(Some(Instr::new(form.coords().clone(), op)))
    }

    fn compile_setbang(
        &mut self,
        scope: ScopeId,
        form: &Rc<PairCell>,
        need_result: bool,
        tail: bool,
    ) -> CResult<Option<Rc<Instr>>> {
        let symp = self.ncdr_cell(form)?;
        let sym = self.car_symbol(&symp)?;
        let valp = self.ncdr_cell(&symp)?;
        self.need_null_cdr(&valp)?;

        // A set-macro intercepts the whole form.
        let set_expander = self
            .arena
            .lookup_macro(scope, &sym)
            .and_then(|mb| mb.set.borrow().clone());
        if let Some(closure) = set_expander {
            let datum = match self.expand_set_macro(form, &closure) {
                Ok(d) => d,
                Err(CErr::Invalid) => Datum::Unspec,
                Err(CErr::Fatal) => return Err(CErr::Fatal),
            };
            let cell = synthetic_cell(form.coords().clone(), datum);
            return self.compile_value(false, scope, &cell, need_result, tail);
        }

        let Some(vb) = self.arena.lookup_var(scope, &sym) else {
            let coords = symp.coords().clone();
            return self.form_err(&coords, &format!("Unbound variable {sym} in set!"));
        };

        let value = self.compile_value_req(scope, &valp, false)?;
        let (depth, slot) = self.resolve(scope, &vb);
        Ok(Some(Instr::new(
            form.coords().clone(),
            Op::SetVar {
                depth,
                slot,
                name: sym,
                value,
            },
        )))
    }

    fn compile_vector(
        &mut self,
        scope: ScopeId,
        cell: &Rc<PairCell>,
        datum: &Datum,
        need_result: bool,
    ) -> CResult<Option<Rc<Instr>>> {
        let items = match datum {
            Datum::Vector(v) => v.borrow().clone(),
            _ => unreachable!("dispatched on the vector variant"),
        };

        let mut ast = Vec::with_capacity(items.len());
        for d in items {
            let elem = synthetic_cell(cell.coords().clone(), d);
            ast.push(self.compile_value(false, scope, &elem, need_result, false)?);
        }

        if need_result {
            let values: Vec<Rc<Instr>> = ast
                .into_iter()
                .map(|a| a.unwrap_or_else(Instr::unspec))
                .collect();
            Ok(Some(Instr::new(
                cell.coords().clone(),
                Op::MakeVector(values.into_boxed_slice()),
            )))
        } else {
            // Evaluate the elements for their side effects only.
            let block: Vec<Rc<Instr>> = ast
                .into_iter()
                .flatten()
                .filter(|a| !matches!(a.op, Op::Lit(_)))
                .collect();
            Ok(make_body(block, false))
        }
    }

    /// Compile a `(lambda formals body...)` form.
    fn compile_lambda_form(
        &mut self,
        scope: ScopeId,
        form: &Rc<PairCell>,
        need_result: bool,
    ) -> CResult<Option<Rc<Instr>>> {
        let rest = self.cdr_cell(form)?;
        let p = match &rest {
            Datum::Pair(p) if !p.cdr().is_nil() => Rc::clone(p),
            _ => {
                let coords = form.coords().clone();
                return self.form_err(&coords, "Lambda without a body");
            }
        };
        let formals = p.car();
        let body = self.cdr_cell(&p)?;
        let coords = form.coords().clone();
        self.compile_lambda(scope, &coords, &formals, &body, need_result, None)
    }

    /// Compile a procedure from its formal-parameter list and body. Runs
    /// in a fresh physical scope, and records tail calls independently
    /// from the enclosing compilation unit.
    fn compile_lambda(
        &mut self,
        scope: ScopeId,
        error_coords: &Coords,
        formals: &Datum,
        body: &Datum,
        need_result: bool,
        name: Option<Symbol>,
    ) -> CResult<Option<Rc<Instr>>> {
        if body.is_nil() {
            return self.form_err(error_coords, "Lambda without a body");
        }

        let saved = mem::replace(&mut self.have_tail_call, false);
        let res =
            self.compile_lambda_inner(scope, error_coords, formals, body, name);
        self.have_tail_call = saved;

        // Even when the result is not needed, the body was compiled so
        // its errors are still reported.
        match res? {
            Some(lambda) if need_result => Ok(Some(Instr::new(
                error_coords.clone(),
                Op::MakeClosure(lambda),
            ))),
            _ => Ok(None),
        }
    }

    fn compile_lambda_inner(
        &mut self,
        scope: ScopeId,
        error_coords: &Coords,
        formals: &Datum,
        body: &Datum,
        name: Option<Symbol>,
    ) -> CResult<Option<Rc<Lambda>>> {
        let lambda_scope = self.arena.push(Some(scope), false, u32::MAX);
        let Some((param_count, have_rest)) =
            self.check_params(lambda_scope, error_coords, formals)?
        else {
            return Ok(None);
        };

        let body_instr = self
            .compile_body(true, BodyLevel::Lambda, lambda_scope, body, true, true)?
            .unwrap_or_else(Instr::unspec);
        let env_size = self.arena.binding_count(lambda_scope);

        Ok(Some(Rc::new(Lambda {
            name,
            param_count,
            have_rest,
            env_size,
            body: LambdaBody::Code(body_instr),
        })))
    }

    /// Bind the formal parameters: a possibly empty list of symbols,
    /// optionally ending in a rest-parameter symbol. Returns `None` after
    /// reporting a parameter error.
    fn check_params(
        &mut self,
        lambda_scope: ScopeId,
        error_coords: &Coords,
        formals: &Datum,
    ) -> CResult<Option<(u32, bool)>> {
        let mut param_count = 0u32;
        let mut cur = formals.clone();
        loop {
            match &cur {
                Datum::Pair(p) => {
                    let p = Rc::clone(p);
                    let sym = match self.car_symbol(&p) {
                        Ok(s) => s,
                        Err(CErr::Invalid) => return Ok(None),
                        Err(CErr::Fatal) => return Err(CErr::Fatal),
                    };
                    if self.arena.local_lookup_var(lambda_scope, &sym).is_some() {
                        let coords = p.coords().clone();
                        self.report(
                            &coords,
                            &format!("Duplicated formal parameter {sym}"),
                        )?;
                        return Ok(None);
                    }
                    let coords = p.coords().clone();
                    self.bind_var(lambda_scope, &sym, &coords)?;
                    param_count += 1;
                    cur = p.cdr();
                }
                Datum::Nil => return Ok(Some((param_count, false))),
                Datum::Sym(sym) => {
                    let sym = sym.clone();
                    self.bind_var(lambda_scope, &sym, error_coords)?;
                    return Ok(Some((param_count, true)));
                }
                _ => {
                    self.report(error_coords, "<rest> parameter is not a symbol")?;
                    return Ok(None);
                }
            }
        }
    }

    fn compile_let(
        &mut self,
        scope: ScopeId,
        form: &Rc<PairCell>,
        need_result: bool,
        tail: bool,
    ) -> CResult<Option<Rc<Instr>>> {
        let t = self.ncdr_cell(form)?;

        // A let always gets a lexical frame of its own; the runtime
        // environment is shared with the enclosing physical scope.
        let scope = self.arena.push(Some(scope), true, u32::MAX);

        let (name, bindings_cell) = match t.car() {
            Datum::Sym(name) => (Some(name), self.ncdr_cell(&t)?),
            _ => (None, t),
        };
        let body = self.cdr_cell(&bindings_cell)?;

        // Compile the initializers before any name is bound.
        let mut compiled: Vec<(Coords, Symbol, Rc<Instr>)> = Vec::new();
        let mut cur = self.car_pair(&bindings_cell)?;
        loop {
            let cb = match &cur {
                Datum::Pair(p) => Rc::clone(p),
                _ => break,
            };
            let symp = self.binding_pair(&cb)?;
            let sym = self.car_symbol(&symp)?;
            let valuep = self.ncdr_cell(&symp)?;
            self.need_null_cdr(&valuep)?;
            let cv = self.compile_value_req(scope, &valuep, false)?;
            compiled.push((symp.coords().clone(), sym, cv));
            cur = self.cdr_cell(&cb)?;
        }

        let mut res: Vec<Rc<Instr>> = Vec::new();
        let form_coords = form.coords().clone();

        if let Some(name) = name {
            // Named let: the call's actual parameters are built before
            // the self-binding is installed, so an initializer cannot
            // accidentally capture the loop procedure.
            let mut cp: Vec<Rc<Instr>> = Vec::with_capacity(compiled.len() + 2);
            cp.push(Instr::unspec()); // target slot, patched below
            for (_, _, cv) in &compiled {
                cp.push(Rc::clone(cv));
            }
            cp.push(Instr::nil_lit());

            let lambda_binding = self.bind_var(scope, &name, &form_coords)?;

            // A synthetic formal-parameter list from the binding names.
            let mut formals = Datum::Nil;
            for (coords, sym, _) in compiled.iter().rev() {
                formals =
                    Datum::cons_at(coords.clone(), Datum::Sym(sym.clone()), formals);
            }

            let mk_lambda = self
                .compile_lambda(
                    scope,
                    &form_coords,
                    &formals,
                    &body,
                    true,
                    Some(name.clone()),
                )?
                .unwrap_or_else(Instr::unspec);

            let (depth, slot) = self.resolve(scope, &lambda_binding);
            res.push(Instr::new(
                form_coords.clone(),
                Op::SetVar {
                    depth,
                    slot,
                    name: name.clone(),
                    value: mk_lambda,
                },
            ));
            cp[0] = Instr::new(
                form_coords.clone(),
                Op::Var {
                    depth,
                    slot,
                    name,
                },
            );

            if tail {
                self.have_tail_call = true;
            }
            res.push(Instr::new(form_coords, Op::Apply(cp.into_boxed_slice())));

            Ok(make_body(res, need_result))
        } else {
            // Plain let: declare the names and initialize their slots.
            for (coords, sym, cv) in compiled {
                if self.arena.local_lookup_var(scope, &sym).is_some() {
                    return self.form_err(
                        &coords,
                        &format!("Duplicate binding for variable {sym}"),
                    );
                }
                let binding = self.bind_var(scope, &sym, &coords)?;
                let (depth, slot) = self.resolve(scope, &binding);
                res.push(Instr::new(
                    cv.coords.clone(),
                    Op::SetVar {
                        depth,
                        slot,
                        name: sym,
                        value: cv,
                    },
                ));
            }

            let b = self.compile_body(
                true,
                BodyLevel::Inner,
                scope,
                &body,
                need_result,
                tail,
            )?;
            Ok(append_instr(res, b))
        }
    }

    /// `letrec` / `letrec*`: every binding is declared and slot-assigned
    /// before any initializer is compiled, permitting forward and mutual
    /// reference; initializers then run and assign in declaration order.
    /// Reading a binding before its initializer ran yields the
    /// unspecified value.
    fn compile_letrec_star(
        &mut self,
        scope: ScopeId,
        form: &Rc<PairCell>,
        need_result: bool,
        tail: bool,
    ) -> CResult<Option<Rc<Instr>>> {
        let bindings_cell = self.ncdr_cell(form)?;
        let body = self.cdr_cell(&bindings_cell)?;

        let scope = self.arena.push(Some(scope), true, u32::MAX);
        let mut res: Vec<Rc<Instr>> = Vec::new();

        // Declare every variable; the fresh slots start out unspecified.
        let mut cur = self.car_pair(&bindings_cell)?;
        loop {
            let cb = match &cur {
                Datum::Pair(p) => Rc::clone(p),
                _ => break,
            };
            let symp = self.binding_pair(&cb)?;
            let sym = self.car_symbol(&symp)?;
            let valuep = self.ncdr_cell(&symp)?;
            self.need_null_cdr(&valuep)?;

            if self.arena.local_lookup_var(scope, &sym).is_some() {
                let coords = symp.coords().clone();
                return self.form_err(
                    &coords,
                    &format!("Duplicate binding for variable {sym}"),
                );
            }
            let coords = symp.coords().clone();
            self.bind_var(scope, &sym, &coords)?;
            cur = self.cdr_cell(&cb)?;
        }

        // Compile the initializers and assign in order.
        let mut cur = self.car_pair(&bindings_cell)?;
        loop {
            let cb = match &cur {
                Datum::Pair(p) => Rc::clone(p),
                _ => break,
            };
            let symp = self.binding_pair(&cb)?;
            let sym = self.car_symbol(&symp)?;
            let valuep = self.ncdr_cell(&symp)?;

            let binding = self
                .arena
                .local_lookup_var(scope, &sym)
                .expect("bound in the declaration pass");
            let cv = self.compile_value_req(scope, &valuep, false)?;
            let (depth, slot) = self.resolve(scope, &binding);
            res.push(Instr::new(
                cv.coords.clone(),
                Op::SetVar {
                    depth,
                    slot,
                    name: sym,
                    value: cv,
                },
            ));
            cur = self.cdr_cell(&cb)?;
        }

        let b =
            self.compile_body(true, BodyLevel::Inner, scope, &body, need_result, tail)?;
        Ok(append_instr(res, b))
    }

    /// Compile a `define` whose binding was resolved during expansion.
    fn compile_define(
        &mut self,
        scope: ScopeId,
        cell: &Rc<PairCell>,
        binding: &Rc<VarBinding>,
        need_result: bool,
    ) -> CResult<Option<Rc<Instr>>> {
        let form = match cell.car() {
            Datum::Pair(p) => p,
            _ => unreachable!("define forms are pairs"),
        };
        let t = self.ncdr_cell(&form)?;

        let value: Option<Rc<Instr>> = match t.car() {
            Datum::Sym(_) => {
                if t.cdr().is_nil() {
                    None
                } else {
                    let vp = self.ncdr_cell(&t)?;
                    let v = self.compile_value_req(scope, &vp, false)?;
                    self.need_null_cdr(&vp)?;
                    Some(v)
                }
            }
            Datum::Pair(inner) => {
                let body = self.cdr_cell(&t)?;
                if body.is_nil() {
                    let coords = t.coords().clone();
                    return self.form_err(
                        &coords,
                        "Bad (define ()) form syntax: missing body",
                    );
                }
                let coords = t.coords().clone();
                Some(
                    self.compile_lambda(
                        scope,
                        &coords,
                        &inner.cdr(),
                        &body,
                        true,
                        Some(binding.sym.clone()),
                    )?
                    .unwrap_or_else(Instr::unspec),
                )
            }
            _ => {
                let coords = t.coords().clone();
                return self.form_err(&coords, "Bad (define) form syntax");
            }
        };

        match value {
            Some(value) => {
                let (depth, slot) = self.resolve(scope, binding);
                Ok(Some(Instr::new(
                    form.coords().clone(),
                    Op::SetVar {
                        depth,
                        slot,
                        name: binding.sym.clone(),
                        value,
                    },
                )))
            }
            None => Ok(need_result.then(Instr::unspec)),
        }
    }
}

// ----- free helpers -------------------------------------------------------

/// Wrap a datum in a positioned single-element spine pair.
fn synthetic_cell(coords: Coords, datum: Datum) -> Rc<PairCell> {
    match Datum::cons_at(coords, datum, Datum::Nil) {
        Datum::Pair(p) => p,
        _ => unreachable!("cons always builds a pair"),
    }
}

/// Append an instruction to a block, inlining a `begin`'s children.
fn splice_instr(block: &mut Vec<Rc<Instr>>, t: Option<Rc<Instr>>) {
    if let Some(t) = t {
        if let Op::Begin(body) = &t.op {
            block.extend(body.iter().map(Rc::clone));
        } else {
            block.push(t);
        }
    }
}

fn make_body(block: Vec<Rc<Instr>>, need_result: bool) -> Option<Rc<Instr>> {
    match block.len() {
        0 => need_result.then(Instr::unspec),
        1 => block.into_iter().next(),
        _ => {
            let coords = block[0].coords.clone();
            Some(Instr::new(coords, Op::Begin(block.into_boxed_slice())))
        }
    }
}

/// Combine prefix instructions with a compiled body.
fn append_instr(mut res: Vec<Rc<Instr>>, b: Option<Rc<Instr>>) -> Option<Rc<Instr>> {
    splice_instr(&mut res, b);
    Some(match res.len() {
        0 => Instr::unspec(),
        1 => res.into_iter().next().unwrap_or_else(Instr::unspec),
        _ => {
            let coords = res[0].coords.clone();
            Instr::new(coords, Op::Begin(res.into_boxed_slice()))
        }
    })
}

/// Cycle detection on macro-expansion output.
///
/// This is a stub that always reports "no cycle": a transformer that
/// returns a self-referential list will loop the compiler downstream
/// instead of being rejected here.
fn expansion_is_cyclic(_datum: &Datum) -> bool {
    false
}
