//! End-to-end compile-and-run scenarios.

use lyra_compile::{Interp, LyraError};
use lyra_ir::Datum;
use lyra_num::{Int, Number};
use pretty_assertions::assert_eq;

fn eval(src: &str) -> Datum {
    Interp::new()
        .eval_str(src)
        .unwrap_or_else(|e| panic!("{src:?} failed: {e}"))
}

fn eval_error(src: &str) -> String {
    match Interp::new().eval_str(src) {
        Err(LyraError::Eval(e)) => e.to_string(),
        Ok(d) => panic!("expected a runtime error for {src:?}, got {d}"),
        Err(LyraError::Parse(p)) => {
            panic!("expected a runtime error for {src:?}, got compile errors: {p}")
        }
    }
}

#[test]
fn test_simple_addition_yields_an_exact_integer() {
    let res = eval("(+ 1 2)");
    match res {
        Datum::Num(Number::Int(Int::Fix(3))) => {}
        other => panic!("expected exact 3, got {other}"),
    }
}

#[test]
fn test_named_let_loop_sums_without_stack_growth() {
    let res = eval(
        "(let loop ((i 1) (acc 0))
           (if (<= i 1000)
               (loop (+ i 1) (+ acc i))
               acc))",
    );
    assert_eq!(res.to_string(), "500500");
}

#[test]
fn test_deep_tail_recursion_completes() {
    // A million self-tail-calls; a naively recursive evaluator would
    // blow the host stack long before finishing.
    let res = eval(
        "(define (f x) (if (= x 0) 0 (f (- x 1))))
         (f 1000000)",
    );
    assert_eq!(res.to_string(), "0");
}

#[test]
fn test_call_cc_escapes_the_surrounding_computation() {
    let res = eval("(call/cc (lambda (k) (+ 1 (k 42))))");
    assert_eq!(res.to_string(), "42");
}

#[test]
fn test_call_cc_falls_through_when_unused() {
    let res = eval("(call/cc (lambda (k) (+ 1 2)))");
    assert_eq!(res.to_string(), "3");
}

#[test]
fn test_exact_inexact_round_trip() {
    // (/ 1 3) is an exact rational; its double approximation converts
    // back to the bit-precise rational of the double, not to 1/3.
    let third = eval("(inexact (/ 1 3))");
    match &third {
        Datum::Num(Number::Real(v)) => {
            assert!((v - 1.0 / 3.0).abs() < 1e-15, "got {v}");
        }
        other => panic!("expected an inexact real, got {other}"),
    }
    assert!(matches!(
        eval("(= (exact (inexact (/ 1 3))) (/ 1 3))"),
        Datum::Bool(false)
    ));
    assert!(matches!(
        eval("(= (inexact (exact (inexact (/ 1 3)))) (inexact (/ 1 3)))"),
        Datum::Bool(true)
    ));
}

#[test]
fn test_macro_use_expands_at_compile_time() {
    let res = eval("(define-macro (double x) (* x 2)) (double 5)");
    match res {
        Datum::Num(Number::Int(Int::Fix(10))) => {}
        other => panic!("expected exact 10, got {other}"),
    }
}

#[test]
fn test_arity_is_enforced_at_call_time() {
    let msg = eval_error("(define (f a b) a) (f 1)");
    assert!(msg.contains("expects 2 parameters"), "{msg}");
    let msg = eval_error("(define (f a b) a) (f 1 2 3)");
    assert!(msg.contains("expects 2 parameters"), "{msg}");
    assert_eq!(eval("(define (f a b) a) (f 1 2)").to_string(), "1");
}

#[test]
fn test_rest_parameters_collect_extra_arguments() {
    assert_eq!(eval("(define (f a . r) r) (f 1 2 3)").to_string(), "(2 3)");
    assert_eq!(eval("(define (f a . r) r) (f 1)").to_string(), "()");
    let msg = eval_error("(define (f a . r) r) (f)");
    assert!(msg.contains("at least 1"), "{msg}");
}

#[test]
fn test_apply_spreads_its_trailing_list() {
    assert_eq!(eval("(apply + (list 1 2 3))").to_string(), "6");
    assert_eq!(eval("(apply list (list 1 2))").to_string(), "(1 2)");
}

#[test]
fn test_one_shot_continuation_cannot_be_reused() {
    let msg = eval_error(
        "(define saved 0)
         (call/cc (lambda (k) (set! saved k) 1))
         (saved 2)",
    );
    assert!(msg.contains("reuse continuation"), "{msg}");
}

#[test]
fn test_continuation_unwinds_from_nested_calls() {
    let res = eval(
        "(define (inner k) (k 7))
         (define (outer k) (+ 100 (inner k)))
         (+ 1 (call/cc (lambda (k) (outer k))))",
    );
    assert_eq!(res.to_string(), "8");
}

#[test]
fn test_set_bang_is_visible_through_shared_environments() {
    let res = eval(
        "(define (make-cell)
           (define value 0)
           (list (lambda () value)
                 (lambda (v) (set! value v))))
         (define cell (make-cell))
         ((cadr cell) 42)
         ((car cell))",
    );
    assert_eq!(res.to_string(), "42");
}

#[test]
fn test_numeric_tower_flows_through_evaluation() {
    assert_eq!(eval("(/ 1 3)").to_string(), "1/3");
    assert_eq!(eval("(+ (/ 1 3) (/ 2 3))").to_string(), "1");
    assert_eq!(eval("(expt 2 100)").to_string(), "1267650600228229401496703205376");
    assert_eq!(eval("(* 1/2 4)").to_string(), "2");
    assert_eq!(eval("(+ 1 0.5)").to_string(), "1.5");
    assert!(matches!(eval("(exact? (/ 1 3))"), Datum::Bool(true)));
    assert!(matches!(eval("(exact? 0.5)"), Datum::Bool(false)));
}

#[test]
fn test_user_errors_carry_their_message() {
    let msg = eval_error("(error \"who\" \"it broke\")");
    assert!(msg.contains("Application error:"), "{msg}");
    assert!(msg.contains("it broke"), "{msg}");
}

#[test]
fn test_runtime_faults_carry_source_positions() {
    let mut interp = Interp::new();
    let err = match interp.eval_source("(car\n  '())", Some("fault.scm")) {
        Err(LyraError::Eval(e)) => e,
        other => panic!("expected a runtime error, got {other:?}"),
    };
    assert!(err.to_string().contains("car of null"), "{err}");
    assert!(err.coords.is_some(), "fault should be positioned: {err}");
}

#[test]
fn test_deep_non_tail_recursion_still_works_moderately() {
    // Non-tail recursion uses the host stack; moderate depths are fine.
    let res = eval(
        "(define (sum n) (if (= n 0) 0 (+ n (sum (- n 1)))))
         (sum 1000)",
    );
    assert_eq!(res.to_string(), "500500");
}

#[test]
fn test_gentemp_symbols_are_distinct() {
    assert!(matches!(
        eval("(eq? (gentemp) (gentemp))"),
        Datum::Bool(false)
    ));
}

#[test]
fn test_string_procedures() {
    assert_eq!(
        eval("(string-append \"foo\" \"bar\" \"baz\")").to_string(),
        "foobarbaz"
    );
    assert_eq!(eval("(number->string 255 16)").to_string(), "ff");
    assert_eq!(eval("(string-upcase \"ab\")").to_string(), "AB");
}
