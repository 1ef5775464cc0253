use std::rc::Rc;

use lyra_diagnostic::{CollectingReporter, Reporter};
use lyra_ir::SymbolTable;
use lyra_num::{Int, Number, Rational};
use pretty_assertions::assert_eq;

use crate::{Lexer, Token};

fn lexer(src: &str) -> (Lexer, Rc<CollectingReporter>) {
    let reporter = Rc::new(CollectingReporter::new(50));
    let lex = Lexer::new(
        src,
        Some("<test>"),
        Rc::new(SymbolTable::new()),
        reporter.clone(),
    );
    (lex, reporter)
}

fn tokens(src: &str) -> Vec<Token> {
    let (mut lex, _) = lexer(src);
    let mut out = Vec::new();
    loop {
        let tok = lex.next_token();
        if tok == Token::Eof {
            break;
        }
        out.push(tok);
    }
    out
}

fn number(src: &str) -> Number {
    let (mut lex, reporter) = lexer(src);
    assert_eq!(lex.next_token(), Token::Number, "not a number: {src}");
    assert_eq!(reporter.error_count(), 0, "errors scanning {src}");
    lex.value_number.clone().unwrap()
}

fn nrat(a: i64, b: i64) -> Number {
    Rational::make(Int::Fix(a), Int::Fix(b))
}

#[test]
fn test_basic_tokens() {
    assert_eq!(
        tokens("(a b) [c] #(1) 'x `y ,z ,@w #;q ."),
        vec![
            Token::LParen,
            Token::Ident,
            Token::Ident,
            Token::RParen,
            Token::LSquare,
            Token::Ident,
            Token::RSquare,
            Token::HashLParen,
            Token::Number,
            Token::RParen,
            Token::Quote,
            Token::Ident,
            Token::Backquote,
            Token::Ident,
            Token::Comma,
            Token::Ident,
            Token::CommaAt,
            Token::Ident,
            Token::DatumComment,
            Token::Ident,
            Token::Dot,
        ]
    );
}

#[test]
fn test_identifiers() {
    let (mut lex, _) = lexer("list->vector + - ... set! string<=? ->x");
    let mut names = Vec::new();
    while lex.next_token() == Token::Ident {
        names.push(lex.value_ident.clone().unwrap().name().to_owned());
    }
    assert_eq!(
        names,
        vec!["list->vector", "+", "-", "...", "set!", "string<=?", "->x"]
    );
}

#[test]
fn test_booleans() {
    let (mut lex, _) = lexer("#t #f #T #F");
    let mut values = Vec::new();
    while lex.next_token() == Token::Bool {
        values.push(lex.value_bool);
    }
    assert_eq!(values, vec![true, false, true, false]);
}

#[test]
fn test_integers_and_radix() {
    assert_eq!(number("42"), Number::fix(42));
    assert_eq!(number("-17"), Number::fix(-17));
    assert_eq!(number("+5"), Number::fix(5));
    assert_eq!(number("#xff"), Number::fix(255));
    assert_eq!(number("#b1010"), Number::fix(10));
    assert_eq!(number("#o777"), Number::fix(511));
    assert_eq!(number("#d99"), Number::fix(99));
    assert_eq!(number("#x-10"), Number::fix(-16));
    // bigint literal
    assert_eq!(
        number("99999999999999999999"),
        Number::Int(Int::from_digits(10, "99999999999999999999"))
    );
}

#[test]
fn test_rationals() {
    assert_eq!(number("1/3"), nrat(1, 3));
    assert_eq!(number("-6/4"), nrat(-3, 2));
    assert_eq!(number("4/2"), Number::fix(2));
    // inexactness prefix forces the division through doubles
    assert_eq!(number("#i1/2"), Number::Real(0.5));
}

#[test]
fn test_decimals() {
    assert_eq!(number("0.5"), Number::Real(0.5));
    assert_eq!(number(".5"), Number::Real(0.5));
    assert_eq!(number("0.05"), Number::Real(0.05));
    assert_eq!(number("-2.5e2"), Number::Real(-250.0));
    assert_eq!(number("1e3"), Number::Real(1000.0));
    assert_eq!(number("1.5|53"), Number::Real(1.5));
}

#[test]
fn test_exact_decimals_scale_exactly() {
    assert_eq!(number("#e0.5"), nrat(1, 2));
    assert_eq!(number("#e0.05"), nrat(1, 20));
    assert_eq!(number("#e1.5e1"), Number::fix(15));
    assert_eq!(number("#e-0.25"), nrat(-1, 4));
    assert_eq!(number("#i5"), Number::Real(5.0));
}

#[test]
fn test_infinities_and_nan() {
    assert_eq!(number("+inf.0"), Number::Real(f64::INFINITY));
    assert_eq!(number("-inf.0"), Number::Real(f64::NEG_INFINITY));
    let nan = number("+nan.0");
    assert!(matches!(nan, Number::Real(v) if v.is_nan()));
    assert_eq!(number("#e+inf.0"), Rational::pos_inf());
    assert_eq!(number("#e-inf.0"), Rational::neg_inf());
    assert_eq!(number("#e+nan.0"), Rational::nan());
}

#[test]
fn test_complex_literals() {
    use lyra_num::Complex;
    assert_eq!(
        number("1+2i"),
        Complex::make(Number::fix(1), Number::fix(2))
    );
    assert_eq!(
        number("1-2i"),
        Complex::make(Number::fix(1), Number::fix(-2))
    );
    assert_eq!(
        number("+i"),
        Complex::make(Number::fix(0), Number::fix(1))
    );
    assert_eq!(
        number("-i"),
        Complex::make(Number::fix(0), Number::fix(-1))
    );
    assert_eq!(
        number("+2i"),
        Complex::make(Number::fix(0), Number::fix(2))
    );
    assert_eq!(
        number("1.5+0.5i"),
        Complex::make(Number::Real(1.5), Number::Real(0.5))
    );
    assert_eq!(
        number("3+i"),
        Complex::make(Number::fix(3), Number::fix(1))
    );
}

#[test]
fn test_polar_form_reports_unimplemented() {
    let (mut lex, reporter) = lexer("1@2");
    lex.next_token();
    assert!(reporter
        .errors()
        .iter()
        .any(|e| e.message.contains("polar")));
}

#[test]
fn test_characters() {
    let cases = [
        ("#\\a", 'a'),
        ("#\\A", 'A'),
        ("#\\(", '('),
        ("#\\space", ' '),
        ("#\\newline", '\n'),
        ("#\\tab", '\t'),
        ("#\\nul", '\0'),
        ("#\\x41", 'A'),
        ("#\\x3bb", '\u{3bb}'),
    ];
    for (src, expected) in cases {
        let (mut lex, reporter) = lexer(src);
        assert_eq!(lex.next_token(), Token::Char, "scanning {src}");
        assert_eq!(reporter.error_count(), 0, "errors scanning {src}");
        assert_eq!(lex.value_char, expected, "value of {src}");
    }
}

#[test]
fn test_strings() {
    let (mut lex, _) = lexer(r#""hello" "a\nb" "q\"q" "\x41;BC""#);
    let mut values = Vec::new();
    while lex.next_token() == Token::Str {
        values.push(lex.value_string.clone());
    }
    assert_eq!(values, vec!["hello", "a\nb", "q\"q", "ABC"]);
}

#[test]
fn test_string_line_continuation() {
    let (mut lex, _) = lexer("\"ab\\   \n   cd\"");
    assert_eq!(lex.next_token(), Token::Str);
    assert_eq!(lex.value_string, "abcd");
}

#[test]
fn test_comments() {
    assert_eq!(
        tokens("a ; a line comment\nb #| nested #| deeper |# still |# c"),
        vec![Token::Ident, Token::Ident, Token::Ident]
    );
}

#[test]
fn test_unterminated_nested_comment_reports() {
    let (mut lex, reporter) = lexer("#| never closed");
    assert_eq!(lex.next_token(), Token::Eof);
    assert!(reporter
        .errors()
        .iter()
        .any(|e| e.message.contains("EOF in comment")));
}

#[test]
fn test_token_coordinates() {
    let (mut lex, _) = lexer("a\n  bc");
    lex.next_token();
    assert_eq!(lex.tok_coords.line(), 1);
    assert_eq!(lex.tok_coords.column(), 1);
    lex.next_token();
    assert_eq!(lex.tok_coords.line(), 2);
    assert_eq!(lex.tok_coords.column(), 3);
}

#[test]
fn test_error_recovery_continues() {
    let (mut lex, reporter) = lexer("#z abc");
    // the bad lexeme is reported, scanning continues with the identifier
    assert_eq!(lex.next_token(), Token::Ident);
    assert_eq!(reporter.error_count(), 1);
}
