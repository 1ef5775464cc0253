use lyra_ir::{Datum, LambdaBody, Op};
use pretty_assertions::assert_eq;

use crate::{Interp, LyraError};

fn eval(src: &str) -> Datum {
    Interp::new()
        .eval_str(src)
        .unwrap_or_else(|e| panic!("{src:?} failed: {e}"))
}

fn rendered(src: &str) -> String {
    eval(src).to_string()
}

fn compile_error(src: &str) -> String {
    match Interp::builder().max_errors(20).build().eval_str(src) {
        Err(LyraError::Parse(p)) => p.to_string(),
        Ok(d) => panic!("expected a compile error for {src:?}, got {d}"),
        Err(LyraError::Eval(e)) => {
            panic!("expected a compile error for {src:?}, got runtime {e}")
        }
    }
}

#[test]
fn test_literals_and_arithmetic() {
    assert_eq!(rendered("1"), "1");
    assert_eq!(rendered("(+ 1 2)"), "3");
    assert_eq!(rendered("(* 2 3 4)"), "24");
    assert_eq!(rendered("(- 10 1 2)"), "7");
    assert_eq!(rendered("(- 5)"), "-5");
    assert_eq!(rendered("(/ 2)"), "1/2");
}

#[test]
fn test_quote_and_vector_literals() {
    assert_eq!(rendered("'a"), "a");
    assert_eq!(rendered("'(1 2)"), "(1 2)");
    assert_eq!(rendered("#(1 2 3)"), "#(1 2 3)");
    // Vector elements in expression position are compiled, not quoted.
    assert_eq!(rendered("#(1 (+ 1 1))"), "#(1 2)");
    assert_eq!(rendered("'#(1 2)"), "#(1 2)");
}

#[test]
fn test_define_set_and_if() {
    assert_eq!(
        rendered("(define var 10) (set! var (+ var 1)) (+ var 2)"),
        "13"
    );
    assert_eq!(rendered("(if #t 1 -1)"), "1");
    assert_eq!(rendered("(if #f 1 -1)"), "-1");
    assert!(matches!(eval("(if #f 1)"), Datum::Unspec));
}

#[test]
fn test_lexical_addressing_is_stable_across_later_defines() {
    // The (depth, slot) resolved for `a` inside f must keep addressing
    // the same binding no matter how many definitions follow.
    assert_eq!(
        rendered(
            "(define a 1)
             (define (f) a)
             (define b 2)
             (define c 3)
             (set! a 42)
             (f)"
        ),
        "42"
    );
}

#[test]
fn test_parameter_shadowing() {
    assert_eq!(rendered("(define x 1) (define (f x) x) (f 9)"), "9");
}

#[test]
fn test_closures_share_their_defining_environment() {
    let src = "(define (make-counter init step)
                 (define (next)
                   (define res init)
                   (set! init (+ init step))
                   res)
                 next)
               (define c1 (make-counter 0 2))
               (define c2 (make-counter 10 10))
               (c1) (c1)
               (list (c1) (c2))";
    assert_eq!(rendered(src), "(4 10)");
}

#[test]
fn test_begin_splices_declarations() {
    assert_eq!(rendered("(begin (define y 7)) y"), "7");
    assert_eq!(
        rendered("(define (f) (begin (define x 1)) x) (f)"),
        "1"
    );
}

#[test]
fn test_named_let_initializer_sees_the_outer_binding() {
    // The actual parameters are built before the loop name is bound, so
    // the initializer refers to the enclosing variable.
    assert_eq!(rendered("(define loop 99) (let loop ((x loop)) x)"), "99");
}

#[test]
fn test_letrec_star_mutual_recursion() {
    let src = "(letrec* ((even? (lambda (n) (if (= n 0) #t (odd? (- n 1)))))
                         (odd? (lambda (n) (if (= n 0) #f (even? (- n 1))))))
                 (even? 10))";
    assert!(matches!(eval(src), Datum::Bool(true)));
}

#[test]
fn test_letrec_star_use_before_init_reads_unspecified() {
    // No error is raised; the read just sees the unspecified value.
    assert!(matches!(
        eval("(letrec* ((a b) (b 10)) a)"),
        Datum::Unspec
    ));
    assert_eq!(rendered("(letrec* ((a b) (b 10)) b)"), "10");
}

#[test]
fn test_trampoline_wraps_tail_recursive_bodies() {
    let mut interp = Interp::new();
    let instr = interp.compile_str("(define (f x) (f x))").unwrap();
    let Op::SetVar { value, .. } = &instr.op else {
        panic!("expected the define assignment, got {:?}", instr.op);
    };
    let Op::MakeClosure(lambda) = &value.op else {
        panic!("expected a closure construction, got {:?}", value.op);
    };
    let LambdaBody::Code(body) = &lambda.body else {
        panic!("expected compiled code");
    };
    assert!(
        matches!(body.op, Op::Tramp(_)),
        "tail-recursive body should be trampoline-wrapped, got {:?}",
        body.op
    );
}

#[test]
fn test_no_trampoline_without_a_tail_call() {
    let mut interp = Interp::new();
    let instr = interp.compile_str("(define (g x) x)").unwrap();
    let Op::SetVar { value, .. } = &instr.op else {
        panic!("expected the define assignment");
    };
    let Op::MakeClosure(lambda) = &value.op else {
        panic!("expected a closure construction");
    };
    let LambdaBody::Code(body) = &lambda.body else {
        panic!("expected compiled code");
    };
    assert!(matches!(body.op, Op::Var { .. }), "got {:?}", body.op);
}

#[test]
fn test_unbound_variable_is_a_compile_error() {
    assert!(compile_error("nosuch").contains("Unbound variable nosuch"));
    assert!(
        compile_error("(set! nosuch 1)").contains("Unbound variable nosuch in set!")
    );
}

#[test]
fn test_error_recovery_compiles_siblings() {
    // Both malformed forms are reported; recovery continued past the
    // first one.
    let msg = compile_error("(if) (set! nope 1)");
    assert!(msg.contains("list is too short"), "{msg}");
    assert!(msg.contains("Unbound variable nope"), "{msg}");
}

#[test]
fn test_duplicate_bindings_are_rejected() {
    assert!(
        compile_error("(let ((x 1) (x 2)) x)").contains("Duplicate binding")
    );
    assert!(compile_error("((lambda (x x) x) 1 2)")
        .contains("Duplicated formal parameter"));
}

#[test]
fn test_builtin_invocations_are_arity_checked() {
    assert!(compile_error("(__%builtin Add 1)")
        .contains("Builtin Add expects 2 parameters"));
    assert!(compile_error("(__%builtin Nope 1)").contains("Nope is not a builtin"));
}

#[test]
fn test_define_macro() {
    assert_eq!(
        rendered("(define-macro (double x) (* x 2)) (double 5)"),
        "10"
    );
}

#[test]
fn test_macro_expansion_reaches_a_fixed_point() {
    // A macro expanding to another macro use: the result is re-expanded
    // until no macro remains.
    let src = "(define-macro (dbl x) (list '* x 2))
               (define-macro (quad x) (list 'dbl (list 'dbl x)))
               (quad 3)";
    assert_eq!(rendered(src), "12");
}

#[test]
fn test_identifier_macro() {
    assert_eq!(
        rendered(
            "(define-identifier-macro seven (lambda (id) 7))
             (+ seven 1)"
        ),
        "8"
    );
}

#[test]
fn test_set_macro_intercepts_assignment() {
    assert_eq!(
        rendered(
            "(define-set-macro foo (lambda (s i) ''ok))
             (set! foo 5)"
        ),
        "ok"
    );
}

#[test]
fn test_macro_env_defines_compile_time_helpers() {
    let src = "(macro-env (define (helper x) (* x 3)))
               (define-macro (triple x) (helper x))
               (triple 4)";
    assert_eq!(rendered(src), "12");
}

#[test]
fn test_macro_fault_is_reported_at_the_use_site() {
    let msg = compile_error("(define-macro (boom) (car '())) (boom)");
    assert!(msg.contains("Macro raised an error"), "{msg}");
}

#[test]
fn test_macro_body_must_be_a_procedure() {
    let msg = compile_error("(define-macro nope 42) (nope)");
    assert!(msg.contains("did not evaluate to a closure"), "{msg}");
}

#[test]
fn test_top_level_persists_across_units() {
    let mut interp = Interp::new();
    interp.eval_str("(define q 5)").unwrap();
    let res = interp.eval_str("(+ q 1)").unwrap();
    assert_eq!(res.to_string(), "6");
}

#[test]
fn test_is_complete_expr() {
    let interp = Interp::new();
    assert!(interp.is_complete_expr("(+ 1 2)"));
    assert!(interp.is_complete_expr("12"));
    assert!(!interp.is_complete_expr("(define (f x)"));
    assert!(interp.is_complete_expr("(f 1))"));
}
