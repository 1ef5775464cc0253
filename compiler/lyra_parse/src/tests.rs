use std::rc::Rc;

use lyra_diagnostic::{CollectingReporter, Reporter};
use lyra_ir::{Datum, SymbolTable};
use lyra_lexer::Lexer;
use pretty_assertions::assert_eq;

use crate::DatumParser;

fn parser(src: &str) -> (DatumParser, Rc<CollectingReporter>) {
    let reporter = Rc::new(CollectingReporter::new(50));
    let lex = Lexer::new(
        src,
        Some("<test>"),
        Rc::new(SymbolTable::new()),
        reporter.clone(),
    );
    (DatumParser::new(lex), reporter)
}

/// Parse a whole program and render each datum, asserting no errors.
fn rendered(src: &str) -> Vec<String> {
    let (mut p, reporter) = parser(src);
    let out: Vec<String> = p.parse_program().iter().map(Datum::to_string).collect();
    assert_eq!(reporter.error_count(), 0, "errors parsing {src:?}");
    out
}

fn rendered_one(src: &str) -> String {
    let all = rendered(src);
    assert_eq!(all.len(), 1, "expected one datum from {src:?}");
    all.into_iter().next().unwrap()
}

#[test]
fn test_atoms() {
    assert_eq!(
        rendered("42 #t #f x \"hi\" 1/2 2.5"),
        vec!["42", "#t", "#f", "x", "hi", "1/2", "2.5"]
    );
}

#[test]
fn test_proper_list() {
    assert_eq!(rendered_one("(1 2 3)"), "(1 2 3)");
    assert_eq!(rendered_one("()"), "()");
    assert_eq!(rendered_one("(a (b c) d)"), "(a (b c) d)");
}

#[test]
fn test_square_brackets() {
    assert_eq!(rendered_one("[a b]"), "(a b)");
    assert_eq!(rendered_one("(let ([x 1]) x)"), "(let ((x 1)) x)");
}

#[test]
fn test_dotted_pair() {
    assert_eq!(rendered_one("(1 . 2)"), "(1 . 2)");
    assert_eq!(rendered_one("(1 2 . 3)"), "(1 2 . 3)");
}

#[test]
fn test_vector() {
    assert_eq!(rendered_one("#(1 2 3)"), "#(1 2 3)");
    assert_eq!(rendered_one("#()"), "#()");
    assert_eq!(rendered_one("#(a #(b) c)"), "#(a #(b) c)");
}

#[test]
fn test_abbreviations() {
    assert_eq!(rendered_one("'x"), "(quote x)");
    assert_eq!(rendered_one("`x"), "(quasiquote x)");
    assert_eq!(rendered_one(",x"), "(unquote x)");
    assert_eq!(rendered_one(",@x"), "(unquote-splicing x)");
    assert_eq!(rendered_one("#'x"), "(syntax x)");
    assert_eq!(rendered_one("''x"), "(quote (quote x))");
    assert_eq!(rendered_one("'(1 2)"), "(quote (1 2))");
}

#[test]
fn test_datum_comment() {
    assert_eq!(rendered("#;(a b) c"), vec!["c"]);
    assert_eq!(rendered_one("(1 #;2 3)"), "(1 3)");
    assert_eq!(rendered_one("(1 #;(2 2) 3)"), "(1 3)");
    assert_eq!(rendered_one("#(1 #;2 3)"), "#(1 3)");
}

#[test]
fn test_block_comment_through_reader() {
    assert_eq!(rendered("(a #| nested #| comment |# |# b)"), vec!["(a b)"]);
}

#[test]
fn test_coordinates_on_pairs() {
    // Each spine pair is positioned at its element's first token.
    let (mut p, _) = parser("\n  (a b)");
    let d = p.parse_datum().unwrap();
    let pair = d.as_pair().expect("a pair");
    assert_eq!(pair.coords().line(), 2);
    assert_eq!(pair.coords().column(), 4);
}

#[test]
fn test_eof_is_none() {
    let (mut p, _) = parser("  ; just a comment\n");
    assert!(p.parse_datum().is_none());
}

#[test]
fn test_stray_terminator_recovers() {
    let (mut p, reporter) = parser(") x");
    let d = p.parse_datum().unwrap();
    assert_eq!(d.to_string(), "x");
    assert_eq!(reporter.error_count(), 1);
    assert!(reporter.errors()[0].message.contains("isn't allowed here"));
}

#[test]
fn test_unterminated_list_reports() {
    let (mut p, reporter) = parser("(1 2");
    let d = p.parse_datum().unwrap();
    assert!(d.is_nil(), "recovery yields the empty list");
    assert!(reporter
        .errors()
        .iter()
        .any(|e| e.message.contains("Unterminated list")));
}

#[test]
fn test_bad_dot_tail_reports() {
    let (mut p, reporter) = parser("(1 . 2 3)");
    p.parse_datum();
    assert!(reporter
        .errors()
        .iter()
        .any(|e| e.message.contains("Expected )")));
}
