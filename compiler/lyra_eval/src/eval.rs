//! The tree-walking executor with its dual evaluation protocol.
//!
//! Every instruction can be evaluated two ways:
//!
//! - [`eval_value`] fully evaluates an instruction to a [`Datum`], using
//!   the host call stack for recursion. This is used everywhere except
//!   where tail position matters.
//! - [`eval_step`] evaluates only as far as is safe without growing the
//!   control stack, returning a [`Step`] that either says "no further
//!   simplification, evaluate for value" or names the next instruction
//!   and environment to continue with. Only conditionals, sequences,
//!   generic application and the trampoline wrapper do anything beyond
//!   the default.
//!
//! A [`Op::Tramp`] node drives `eval_step` in a loop until no further
//! simplification is possible, then evaluates the last instruction for
//! value once. A chain of tail calls thus becomes a loop: the host stack
//! stays flat no matter how many calls the chain makes.

use std::rc::Rc;

use lyra_ir::{
    Closure, Coords, Datum, EnvRef, Frame, Instr, Lambda, LambdaBody, OneShot,
    Op, RESERVED_SLOTS,
};

use crate::builtins::eval_builtin;
use crate::error::{EvalErrorKind, EvalResult, Signal};

/// Mutable evaluation state threaded through every instruction.
///
/// The only state the evaluator itself needs is the counter handing out
/// continuation-capture identities.
#[derive(Debug, Default)]
pub struct Vm {
    next_continuation: u64,
}

impl Vm {
    pub fn new() -> Vm {
        Vm::default()
    }

    fn fresh_continuation(&mut self) -> u64 {
        self.next_continuation += 1;
        self.next_continuation
    }
}

/// Outcome of one continuation-seeking evaluation step.
#[derive(Debug)]
pub enum Step {
    /// No tail simplification is possible; evaluate the instruction for
    /// value normally.
    Done,
    /// Continue the trampoline at `instr` in `env`.
    Jump { instr: Rc<Instr>, env: EnvRef },
    /// The tail call completed immediately (a host procedure ran).
    Value(Datum),
}

/// Attach an instruction's coordinates to a fault crossing its boundary.
/// Transfers always pass through unmodified.
pub(crate) fn reposition(sig: Signal, coords: &Coords) -> Signal {
    match sig {
        Signal::Transfer { .. } => sig,
        Signal::Error(mut e) => {
            e.position(coords);
            Signal::Error(e)
        }
    }
}

/// Fully evaluate `instr` to a datum.
pub fn eval_value(instr: &Instr, env: &EnvRef, vm: &mut Vm) -> EvalResult {
    match &instr.op {
        Op::Lit(d) => Ok(d.clone()),
        Op::Var { depth, slot, .. } => Ok(env.get(*depth, *slot)),
        Op::SetVar {
            depth, slot, value, ..
        } => {
            let v = eval_value(value, env, vm)?;
            env.set(*depth, *slot, v);
            Ok(Datum::Unspec)
        }
        Op::If { cond, then, els } => {
            if eval_value(cond, env, vm)?.is_true() {
                eval_value(then, env, vm)
            } else {
                eval_value(els, env, vm)
            }
        }
        Op::MakeClosure(lambda) => Ok(Datum::Closure(Rc::new(Closure {
            env: Rc::clone(env),
            lambda: Rc::clone(lambda),
        }))),
        Op::Begin(body) => match body.split_last() {
            None => Ok(Datum::Unspec),
            Some((last, init)) => {
                for i in init {
                    eval_value(i, env, vm)?;
                }
                eval_value(last, env, vm)
            }
        },
        Op::MakeVector(items) => {
            let mut res = Vec::with_capacity(items.len());
            for i in items {
                res.push(eval_value(i, env, vm)?);
            }
            Ok(Datum::vector(res))
        }
        Op::Apply(parts) => {
            apply_value(parts, env, vm).map_err(|s| reposition(s, &instr.coords))
        }
        Op::CallCc(parts) => {
            call_cc(parts, env, vm).map_err(|s| reposition(s, &instr.coords))
        }
        Op::Builtin { kind, args } => eval_builtin(*kind, args, env, vm)
            .map_err(|s| reposition(s, &instr.coords)),
        Op::Tramp(inner) => trampoline(inner, env, vm),
    }
}

/// Evaluate one continuation-seeking step of `instr`.
pub fn eval_step(instr: &Instr, env: &EnvRef, vm: &mut Vm) -> Result<Step, Signal> {
    match &instr.op {
        Op::If { cond, then, els } => {
            let branch = if eval_value(cond, env, vm)?.is_true() {
                then
            } else {
                els
            };
            Ok(Step::Jump {
                instr: Rc::clone(branch),
                env: Rc::clone(env),
            })
        }
        Op::Begin(body) => match body.split_last() {
            None => Ok(Step::Value(Datum::Unspec)),
            Some((last, init)) => {
                for i in init {
                    eval_value(i, env, vm)?;
                }
                Ok(Step::Jump {
                    instr: Rc::clone(last),
                    env: Rc::clone(env),
                })
            }
        },
        Op::Apply(parts) => apply_step(parts, env, vm),
        Op::Tramp(inner) => Ok(Step::Jump {
            instr: Rc::clone(inner),
            env: Rc::clone(env),
        }),
        _ => Ok(Step::Done),
    }
}

/// Drive `eval_step` to a fixed point, then evaluate for value once.
fn trampoline(start: &Rc<Instr>, env: &EnvRef, vm: &mut Vm) -> EvalResult {
    let mut cur = Rc::clone(start);
    let mut cur_env = Rc::clone(env);
    loop {
        match eval_step(&cur, &cur_env, vm)
            .map_err(|s| reposition(s, &cur.coords))?
        {
            Step::Done => break,
            Step::Jump { instr, env: next } => {
                cur = instr;
                cur_env = next;
            }
            Step::Value(d) => return Ok(d),
        }
    }
    eval_value(&cur, &cur_env, vm).map_err(|s| reposition(s, &cur.coords))
}

fn eval_target(
    instr: &Instr,
    env: &EnvRef,
    vm: &mut Vm,
    kind: EvalErrorKind,
) -> Result<Rc<Closure>, Signal> {
    match eval_value(instr, env, vm)? {
        Datum::Closure(c) => Ok(c),
        _ => Err(Signal::error(kind)),
    }
}

/// Build the invocation environment for a generic call.
///
/// `parts` is the compiled argument layout: the target, the positional
/// arguments, and a final argument that must evaluate to a (possibly
/// empty) list of further arguments. The trailing list supports the
/// `apply` primitive; ordinary calls pass the empty-list literal there,
/// which is recognized without being evaluated.
fn build_call_frame(
    parts: &[Rc<Instr>],
    env: &EnvRef,
    vm: &mut Vm,
    closure: &Closure,
) -> Result<EnvRef, Signal> {
    let lambda = &closure.lambda;
    let positional = parts.len() - 2;
    let trailing = &parts[parts.len() - 1];

    let mut rest_args = Datum::Nil;
    let mut rest_count = 0usize;
    if !trailing.is_nil_lit() {
        let t = eval_value(trailing, env, vm)?;
        match &t {
            Datum::Nil | Datum::Pair(_) => {}
            _ => return Err(Signal::error(EvalErrorKind::ApplyLastNotList)),
        }
        let mut cur = t.clone();
        loop {
            match cur {
                Datum::Nil => break,
                Datum::Pair(p) => {
                    rest_count += 1;
                    cur = p.cdr();
                }
                _ => return Err(Signal::error(EvalErrorKind::ApplyLastImproper)),
            }
        }
        rest_args = t;
    }

    let actual = positional + rest_count;
    let param_count = lambda.param_count as usize;
    if actual < param_count || (actual > param_count && !lambda.have_rest) {
        return Err(Signal::error(EvalErrorKind::Arity {
            name: lambda.to_string(),
            required: lambda.param_count,
            have_rest: lambda.have_rest,
        }));
    }

    let frame = Frame::new(Some(Rc::clone(&closure.env)), lambda.env_size as usize);

    // Required parameters, left to right; once the positional arguments
    // run out the remainder comes from the trailing list.
    let mut rest = rest_args;
    for i in 0..param_count {
        let v = if i < positional {
            eval_value(&parts[i + 1], env, vm)?
        } else {
            match rest {
                Datum::Pair(p) => {
                    let v = p.car();
                    rest = p.cdr();
                    v
                }
                _ => unreachable!("arity was checked against the trailing list"),
            }
        };
        frame.local_set(RESERVED_SLOTS + i, v);
    }

    if lambda.have_rest {
        // Extra positional arguments are evaluated in order and consed
        // onto the remaining trailing list, back to front.
        let mut extra = Vec::with_capacity(positional.saturating_sub(param_count));
        for i in param_count..positional {
            extra.push(eval_value(&parts[i + 1], env, vm)?);
        }
        for v in extra.into_iter().rev() {
            rest = Datum::cons(v, rest);
        }
        frame.local_set(RESERVED_SLOTS + param_count, rest);
    }

    // Remaining slots (internal locals) start out unspecified, which is
    // how Frame::new initializes them.
    Ok(frame)
}

fn call_closure(closure: &Closure, frame: EnvRef, vm: &mut Vm) -> EvalResult {
    match &closure.lambda.body {
        LambdaBody::Code(body) => eval_value(body, &frame, vm),
        LambdaBody::Native(f) => f(&frame)
            .map_err(|message| Signal::error(EvalErrorKind::Host { message })),
        LambdaBody::Escape(state) => Err(invoke_escape(state, &frame)),
    }
}

fn invoke_escape(state: &OneShot, frame: &Frame) -> Signal {
    if state.is_used() {
        Signal::error(EvalErrorKind::ContinuationReused)
    } else {
        Signal::Transfer {
            id: state.id(),
            value: frame.arg(0),
        }
    }
}

pub(crate) fn apply_value(
    parts: &[Rc<Instr>],
    env: &EnvRef,
    vm: &mut Vm,
) -> EvalResult {
    let closure = eval_target(&parts[0], env, vm, EvalErrorKind::NotAProcedure)?;
    let frame = build_call_frame(parts, env, vm, &closure)?;
    call_closure(&closure, frame, vm)
}

/// The tail-position version of application: instead of recursing into
/// the callee's body, hand it to the trampoline as the next instruction.
fn apply_step(
    parts: &[Rc<Instr>],
    env: &EnvRef,
    vm: &mut Vm,
) -> Result<Step, Signal> {
    let closure = eval_target(&parts[0], env, vm, EvalErrorKind::NotAProcedure)?;
    let frame = build_call_frame(parts, env, vm, &closure)?;
    match &closure.lambda.body {
        LambdaBody::Code(body) => Ok(Step::Jump {
            instr: Rc::clone(body),
            env: frame,
        }),
        LambdaBody::Native(f) => f(&frame)
            .map(Step::Value)
            .map_err(|message| Signal::error(EvalErrorKind::Host { message })),
        LambdaBody::Escape(state) => Err(invoke_escape(state, &frame)),
    }
}

/// Restricted continuation capture: one-shot, upward-only.
///
/// The target must take exactly one parameter (or a rest parameter
/// alone). A fresh escape procedure is bound to it; invoking that
/// procedure raises a transfer that only this capture site catches, by
/// identity. The capture is invalidated when this call returns by any
/// path, so the continuation cannot resume a finished computation.
pub(crate) fn call_cc(parts: &[Rc<Instr>], env: &EnvRef, vm: &mut Vm) -> EvalResult {
    let closure =
        eval_target(&parts[0], env, vm, EvalErrorKind::CallCcNotProcedure)?;
    let lambda = &closure.lambda;
    if (lambda.param_count == 0 && !lambda.have_rest) || lambda.param_count > 1 {
        return Err(Signal::error(EvalErrorKind::CallCcArity));
    }

    let state = Rc::new(OneShot::new(vm.fresh_continuation()));
    tracing::trace!(id = state.id(), "capturing one-shot continuation");
    let cont = Datum::Closure(Rc::new(Closure {
        env: Rc::clone(env),
        lambda: Rc::new(Lambda::escape(Rc::clone(&state))),
    }));

    let frame = Frame::new(Some(Rc::clone(&closure.env)), lambda.env_size as usize);
    let param_count = lambda.param_count as usize;
    for i in 0..param_count {
        frame.local_set(RESERVED_SLOTS + i, cont.clone());
    }
    if lambda.have_rest {
        let rest = if param_count == 0 {
            Datum::cons(cont.clone(), Datum::Nil)
        } else {
            Datum::Nil
        };
        frame.local_set(RESERVED_SLOTS + param_count, rest);
    }

    let res = call_closure(&closure, frame, vm);
    state.invalidate();
    match res {
        Err(Signal::Transfer { id, value }) if id == state.id() => Ok(value),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyra_ir::{BuiltinKind, Coords, SymbolTable};
    use pretty_assertions::assert_eq;

    fn fix(v: i64) -> Rc<Instr> {
        Instr::lit(Coords::NONE, Datum::fix(v))
    }

    fn var(depth: u32, slot: u32, name: &str, syms: &SymbolTable) -> Rc<Instr> {
        Instr::new(
            Coords::NONE,
            Op::Var {
                depth,
                slot,
                name: syms.intern(name),
            },
        )
    }

    fn builtin(kind: BuiltinKind, args: Vec<Rc<Instr>>) -> Rc<Instr> {
        Instr::new(
            Coords::NONE,
            Op::Builtin {
                kind,
                args: args.into_boxed_slice(),
            },
        )
    }

    fn apply(parts: Vec<Rc<Instr>>) -> Rc<Instr> {
        Instr::new(Coords::NONE, Op::Apply(parts.into_boxed_slice()))
    }

    fn expect_num(res: EvalResult, v: i64) {
        match res {
            Ok(d) => assert!(d.eqv(&Datum::fix(v)), "expected {v}, got {d}"),
            Err(Signal::Error(e)) => panic!("error: {e}"),
            Err(Signal::Transfer { .. }) => panic!("unexpected transfer"),
        }
    }

    #[test]
    fn test_literals_and_variables() {
        let syms = SymbolTable::new();
        let mut vm = Vm::new();
        let env = Frame::new(None, 3);
        env.local_set(1, Datum::fix(10));

        expect_num(eval_value(&fix(5), &env, &mut vm), 5);
        expect_num(eval_value(&var(0, 1, "x", &syms), &env, &mut vm), 10);
    }

    #[test]
    fn test_set_var_yields_unspec() {
        let syms = SymbolTable::new();
        let mut vm = Vm::new();
        let env = Frame::new(None, 3);
        let set = Instr::new(
            Coords::NONE,
            Op::SetVar {
                depth: 0,
                slot: 1,
                name: syms.intern("x"),
                value: fix(7),
            },
        );
        let res = eval_value(&set, &env, &mut vm).unwrap();
        assert!(matches!(res, Datum::Unspec));
        assert!(env.local_get(1).eqv(&Datum::fix(7)));
    }

    #[test]
    fn test_if_branches() {
        let mut vm = Vm::new();
        let env = Frame::new(None, 1);
        let mk = |cond: Datum| {
            Instr::new(
                Coords::NONE,
                Op::If {
                    cond: Instr::lit(Coords::NONE, cond),
                    then: fix(1),
                    els: fix(2),
                },
            )
        };
        expect_num(eval_value(&mk(Datum::Bool(true)), &env, &mut vm), 1);
        expect_num(eval_value(&mk(Datum::Bool(false)), &env, &mut vm), 2);
        // anything but #f is true
        expect_num(eval_value(&mk(Datum::Nil), &env, &mut vm), 1);
    }

    /// A hand-built `(define (f x) (if (= x 0) 0 (f (- x 1))))` applied to
    /// a large count: the trampoline must keep the host stack flat.
    #[test]
    fn test_tail_recursion_is_bounded() {
        let syms = SymbolTable::new();
        let mut vm = Vm::new();
        let top = Frame::new(None, 2);

        // Lambda frame: slot 1 = x; the closure itself lives in the top
        // frame at slot 1, one environment up.
        let body = Instr::new(
            Coords::NONE,
            Op::Tramp(Instr::new(
                Coords::NONE,
                Op::If {
                    cond: builtin(
                        BuiltinKind::NumberEq,
                        vec![var(0, 1, "x", &syms), fix(0)],
                    ),
                    then: fix(0),
                    els: apply(vec![
                        var(1, 1, "f", &syms),
                        builtin(BuiltinKind::Sub, vec![var(0, 1, "x", &syms), fix(1)]),
                        Instr::nil_lit(),
                    ]),
                },
            )),
        );
        let lambda = Rc::new(Lambda {
            name: Some(syms.intern("f")),
            param_count: 1,
            have_rest: false,
            env_size: 2,
            body: LambdaBody::Code(body),
        });
        top.local_set(
            1,
            Datum::Closure(Rc::new(Closure {
                env: Rc::clone(&top),
                lambda,
            })),
        );

        let call = apply(vec![var(0, 1, "f", &syms), fix(1_000_000), Instr::nil_lit()]);
        expect_num(eval_value(&call, &top, &mut vm), 0);
    }

    #[test]
    fn test_arity_errors() {
        let syms = SymbolTable::new();
        let mut vm = Vm::new();
        let top = Frame::new(None, 2);

        let lambda = Rc::new(Lambda {
            name: Some(syms.intern("g")),
            param_count: 2,
            have_rest: false,
            env_size: 3,
            body: LambdaBody::Code(var(0, 1, "a", &syms)),
        });
        top.local_set(
            1,
            Datum::Closure(Rc::new(Closure {
                env: Rc::clone(&top),
                lambda,
            })),
        );

        let call1 = apply(vec![var(0, 1, "g", &syms), fix(1), Instr::nil_lit()]);
        let call3 = apply(vec![
            var(0, 1, "g", &syms),
            fix(1),
            fix(2),
            fix(3),
            Instr::nil_lit(),
        ]);
        let call2 = apply(vec![var(0, 1, "g", &syms), fix(1), fix(2), Instr::nil_lit()]);

        for bad in [call1, call3] {
            match eval_value(&bad, &top, &mut vm) {
                Err(Signal::Error(e)) => {
                    assert!(matches!(e.kind, EvalErrorKind::Arity { .. }), "{e}");
                }
                other => panic!("expected an arity error, got {other:?}"),
            }
        }
        expect_num(eval_value(&call2, &top, &mut vm), 1);
    }

    #[test]
    fn test_call_of_non_procedure() {
        let mut vm = Vm::new();
        let env = Frame::new(None, 1);
        let call = apply(vec![fix(3), Instr::nil_lit()]);
        match eval_value(&call, &env, &mut vm) {
            Err(Signal::Error(e)) => {
                assert!(matches!(e.kind, EvalErrorKind::NotAProcedure));
            }
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[test]
    fn test_trailing_list_feeds_parameters() {
        let syms = SymbolTable::new();
        let mut vm = Vm::new();
        let top = Frame::new(None, 2);

        // (define (g a b) a), applied as (apply g '(5 6))
        let lambda = Rc::new(Lambda {
            name: Some(syms.intern("g")),
            param_count: 2,
            have_rest: false,
            env_size: 3,
            body: LambdaBody::Code(var(0, 2, "b", &syms)),
        });
        top.local_set(
            1,
            Datum::Closure(Rc::new(Closure {
                env: Rc::clone(&top),
                lambda,
            })),
        );

        let trailing = Instr::lit(
            Coords::NONE,
            Datum::list([Datum::fix(5), Datum::fix(6)]),
        );
        let call = apply(vec![var(0, 1, "g", &syms), trailing]);
        expect_num(eval_value(&call, &top, &mut vm), 6);
    }

    #[test]
    fn test_rest_parameter_collects() {
        let syms = SymbolTable::new();
        let mut vm = Vm::new();
        let top = Frame::new(None, 2);

        // (define (g . rest) rest) called with three arguments
        let lambda = Rc::new(Lambda {
            name: Some(syms.intern("g")),
            param_count: 0,
            have_rest: true,
            env_size: 2,
            body: LambdaBody::Code(var(0, 1, "rest", &syms)),
        });
        top.local_set(
            1,
            Datum::Closure(Rc::new(Closure {
                env: Rc::clone(&top),
                lambda,
            })),
        );

        let call = apply(vec![
            var(0, 1, "g", &syms),
            fix(1),
            fix(2),
            fix(3),
            Instr::nil_lit(),
        ]);
        let res = eval_value(&call, &top, &mut vm).unwrap();
        assert_eq!(res.to_string(), "(1 2 3)");
    }

    /// `(call/cc (lambda (k) (+ 1 (k 42))))` escapes past the addition.
    #[test]
    fn test_call_cc_escapes() {
        let syms = SymbolTable::new();
        let mut vm = Vm::new();
        let top = Frame::new(None, 1);

        let body = builtin(
            BuiltinKind::Add,
            vec![
                fix(1),
                apply(vec![var(0, 1, "k", &syms), fix(42), Instr::nil_lit()]),
            ],
        );
        let lambda = Rc::new(Lambda {
            name: None,
            param_count: 1,
            have_rest: false,
            env_size: 2,
            body: LambdaBody::Code(body),
        });
        let target = Instr::lit(
            Coords::NONE,
            Datum::Closure(Rc::new(Closure {
                env: Rc::clone(&top),
                lambda,
            })),
        );

        let cc = Instr::new(
            Coords::NONE,
            Op::CallCc(vec![target].into_boxed_slice()),
        );
        expect_num(eval_value(&cc, &top, &mut vm), 42);
    }

    /// Invoking a continuation after its capture returned is an error.
    #[test]
    fn test_one_shot_continuation_reuse_fails() {
        let syms = SymbolTable::new();
        let mut vm = Vm::new();
        let top = Frame::new(None, 3); // slot 2 saves the continuation

        // (call/cc (lambda (k) (set! saved k) 1)) then (saved 2)
        let body = Instr::new(
            Coords::NONE,
            Op::Begin(
                vec![
                    Instr::new(
                        Coords::NONE,
                        Op::SetVar {
                            depth: 1,
                            slot: 2,
                            name: syms.intern("saved"),
                            value: var(0, 1, "k", &syms),
                        },
                    ),
                    fix(1),
                ]
                .into_boxed_slice(),
            ),
        );
        let lambda = Rc::new(Lambda {
            name: None,
            param_count: 1,
            have_rest: false,
            env_size: 2,
            body: LambdaBody::Code(body),
        });
        let target = Instr::lit(
            Coords::NONE,
            Datum::Closure(Rc::new(Closure {
                env: Rc::clone(&top),
                lambda,
            })),
        );
        let cc = Instr::new(
            Coords::NONE,
            Op::CallCc(vec![target].into_boxed_slice()),
        );
        expect_num(eval_value(&cc, &top, &mut vm), 1);

        let reuse = apply(vec![var(0, 2, "saved", &syms), fix(2), Instr::nil_lit()]);
        match eval_value(&reuse, &top, &mut vm) {
            Err(Signal::Error(e)) => {
                assert!(matches!(e.kind, EvalErrorKind::ContinuationReused), "{e}");
            }
            other => panic!("expected a reuse error, got {other:?}"),
        }
    }

    #[test]
    fn test_faults_pick_up_coordinates() {
        let mut vm = Vm::new();
        let env = Frame::new(None, 1);
        let coords = Coords::new(Some("t.scm".into()), 4, 2);
        let bad = Instr::new(
            coords.clone(),
            Op::Builtin {
                kind: BuiltinKind::Car,
                args: vec![Instr::nil_lit()].into_boxed_slice(),
            },
        );
        match eval_value(&bad, &env, &mut vm) {
            Err(Signal::Error(e)) => {
                assert_eq!(e.coords, Some(coords));
                assert!(matches!(e.kind, EvalErrorKind::CarOfNull));
            }
            other => panic!("expected an error, got {other:?}"),
        }
    }
}
