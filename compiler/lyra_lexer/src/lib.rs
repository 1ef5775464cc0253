//! Hand-written scanner for Scheme source text.
//!
//! Produces one token at a time; literal values are left in the `value_*`
//! fields of the scanner, and the coordinates of the current token in
//! [`Lexer::tok_coords`]. Errors are reported through the shared
//! [`Reporter`] sink and the scanner recovers and keeps going; if the sink
//! aborts, the scanner yields end-of-input from then on.
//!
//! Numeric literals cover the whole tower: radix prefixes (`#b #o #d #x`),
//! exactness prefixes (`#e #i`), rationals, decimals with exponent
//! suffixes, signed infinities and NaN, and rectangular complex numbers.
//! Exact decimal literals are converted by exact integer scaling, never
//! through a float round-trip.

mod scan_number;

use std::rc::Rc;

use lyra_diagnostic::Reporter;
use lyra_ir::{Coords, Symbol, SymbolTable};
use lyra_num::Number;

/// Token kinds. The nested-comment pair is internal to the scanner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    Eof,
    Ident,
    Bool,
    Number,
    Char,
    Str,
    LParen,
    RParen,
    LSquare,
    RSquare,
    HashLParen,
    Quote,
    Backquote,
    Comma,
    CommaAt,
    Dot,
    HashQuote,
    HashBackquote,
    HashComma,
    HashCommaAt,
    DatumComment,
    NestedCommentStart,
    NestedCommentEnd,
}

impl Token {
    /// Human-readable form for error messages.
    pub fn repr(self) -> &'static str {
        match self {
            Token::Eof => "<EOF>",
            Token::Ident => "identifier",
            Token::Bool => "#t or #f",
            Token::Number => "number",
            Token::Char => "character",
            Token::Str => "string",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LSquare => "[",
            Token::RSquare => "]",
            Token::HashLParen => "#(",
            Token::Quote => "'",
            Token::Backquote => "`",
            Token::Comma => ",",
            Token::CommaAt => ",@",
            Token::Dot => ".",
            Token::HashQuote => "#'",
            Token::HashBackquote => "#`",
            Token::HashComma => "#,",
            Token::HashCommaAt => "#,@",
            Token::DatumComment => "#;",
            Token::NestedCommentStart => "#|",
            Token::NestedCommentEnd => "|#",
        }
    }
}

const U_NEXT_LINE: char = '\u{85}';
const U_LINE_SEP: char = '\u{2028}';
const U_PARA_SEP: char = '\u{2029}';

pub struct Lexer {
    input: Vec<char>,
    pos: usize,

    symbols: Rc<SymbolTable>,
    reporter: Rc<dyn Reporter>,
    /// Set while scanning inside a nested comment, where errors are ignored.
    suppress_errors: bool,
    in_nested_comment: bool,
    /// The reporter hit its bound; keep yielding EOF.
    aborted: bool,

    /// Current character; `None` at end of input.
    cur: Option<char>,
    /// One character of caller-level lookahead (see `unget_char`).
    unget: Option<char>,
    /// Character saved internally while collapsing CR LF.
    saved: Option<char>,

    file: Option<Rc<str>>,
    line: u32,
    column: u32,

    /// Coordinates of the current token.
    pub tok_coords: Coords,
    pub cur_token: Token,

    pub value_bool: bool,
    pub value_char: char,
    pub value_ident: Option<Symbol>,
    pub value_string: String,
    pub value_number: Option<Number>,
}

impl Lexer {
    pub fn new(
        src: &str,
        file_name: Option<&str>,
        symbols: Rc<SymbolTable>,
        reporter: Rc<dyn Reporter>,
    ) -> Lexer {
        let mut lexer = Lexer {
            input: src.chars().collect(),
            pos: 0,
            symbols,
            reporter,
            suppress_errors: false,
            in_nested_comment: false,
            aborted: false,
            cur: Some('\0'), // replaced by the first next_char below
            unget: None,
            saved: None,
            file: file_name.map(Rc::from),
            line: 1,
            column: 0,
            tok_coords: Coords::NONE,
            cur_token: Token::Eof,
            value_bool: false,
            value_char: '\0',
            value_ident: None,
            value_string: String::new(),
            value_number: None,
        };
        lexer.next_char();
        lexer
    }

    pub fn symbols(&self) -> &Rc<SymbolTable> {
        &self.symbols
    }

    pub fn reporter(&self) -> &Rc<dyn Reporter> {
        &self.reporter
    }

    pub fn aborted(&self) -> bool {
        self.aborted
    }

    /// Coordinates of the current character.
    fn coords(&self) -> Coords {
        Coords::new(self.file.clone(), self.line, self.column)
    }

    pub(crate) fn error(&mut self, message: &str) {
        if self.suppress_errors {
            return;
        }
        let coords = self.coords();
        if self.reporter.error(Some(&coords), None, message).is_err() {
            self.aborted = true;
        }
    }

    fn read_code_point(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    /// The next unconsumed character, without advancing.
    fn peek_ahead(&self) -> Option<char> {
        if let Some(u) = self.unget {
            return Some(u);
        }
        if let Some(s) = self.saved {
            return Some(s);
        }
        self.input.get(self.pos).copied()
    }

    /// Replace the current character, keeping it for the next `next_char`.
    /// Must not be used to unget a line feed.
    pub(crate) fn unget_char(&mut self, ch: char) {
        debug_assert!(self.unget.is_none());
        self.unget = self.cur;
        self.cur = Some(ch);
        self.column = self.column.saturating_sub(1);
    }

    /// Advance to the next character, translating every line-end form to
    /// `\n` and tracking line/column.
    pub(crate) fn next_char(&mut self) -> Option<char> {
        if let Some(u) = self.unget.take() {
            self.cur = Some(u);
            self.column += 1;
            return self.cur;
        }

        let mut ch = match self.saved.take() {
            Some(s) => Some(s),
            None => self.read_code_point(),
        };

        match ch {
            Some('\r') => {
                // Collapse CR LF and CR U+0085 into a single line end.
                let next = self.read_code_point();
                if !(next == Some('\n') || next == Some(U_NEXT_LINE)) {
                    self.saved = next;
                }
                ch = Some('\n');
                self.line += 1;
                self.column = 0;
            }
            Some(U_NEXT_LINE) | Some(U_LINE_SEP) => {
                ch = Some('\n');
                self.line += 1;
                self.column = 0;
            }
            Some('\n') => {
                self.line += 1;
                self.column = 0;
            }
            Some(_) => {
                self.column += 1;
            }
            None => {}
        }

        self.cur = ch;
        ch
    }

    fn save_coords(&mut self) {
        self.tok_coords = self.coords();
    }

    pub fn next_token(&mut self) -> Token {
        self.cur_token = self.scan_token();
        self.cur_token
    }

    fn scan_token(&mut self) -> Token {
        loop {
            if self.aborted {
                return Token::Eof;
            }
            self.save_coords();
            match self.cur {
                None => return Token::Eof,

                Some('(') => {
                    self.next_char();
                    return Token::LParen;
                }
                Some(')') => {
                    self.next_char();
                    return Token::RParen;
                }
                Some('[') => {
                    self.next_char();
                    return Token::LSquare;
                }
                Some(']') => {
                    self.next_char();
                    return Token::RSquare;
                }
                Some('\'') => {
                    self.next_char();
                    return Token::Quote;
                }
                Some('`') => {
                    self.next_char();
                    return Token::Backquote;
                }

                Some('|') => {
                    self.next_char();
                    if !self.in_nested_comment || self.cur != Some('#') {
                        self.error("\"|\" cannot start a lexeme");
                    } else {
                        self.next_char();
                        return Token::NestedCommentEnd;
                    }
                }

                Some(',') => {
                    self.next_char();
                    if self.cur == Some('@') {
                        self.next_char();
                        return Token::CommaAt;
                    }
                    return Token::Comma;
                }

                Some('"') => {
                    self.next_char();
                    return self.scan_string();
                }

                Some(';') => {
                    // Line comment: skip to line end or EOF.
                    loop {
                        self.next_char();
                        match self.cur {
                            None | Some('\n') | Some(U_PARA_SEP) => break,
                            _ => {}
                        }
                    }
                }

                Some(c) if c.is_ascii_digit() => {
                    if let Some(tok) = self.scan_number() {
                        return tok;
                    }
                }

                Some('#') => {
                    self.next_char();
                    match self.cur {
                        Some(c) if matches!(
                            c.to_ascii_lowercase(),
                            'i' | 'e' | 'b' | 'o' | 'd' | 'x'
                        ) =>
                        {
                            self.unget_char('#');
                            if let Some(tok) = self.scan_number() {
                                return tok;
                            }
                        }
                        Some('|') => {
                            self.next_char();
                            if self.in_nested_comment {
                                return Token::NestedCommentStart;
                            }
                            self.scan_nested_comment();
                        }
                        Some(';') => {
                            self.next_char();
                            return Token::DatumComment;
                        }
                        Some('(') => {
                            self.next_char();
                            return Token::HashLParen;
                        }
                        Some('\'') => {
                            self.next_char();
                            return Token::HashQuote;
                        }
                        Some('`') => {
                            self.next_char();
                            return Token::HashBackquote;
                        }
                        Some(',') => {
                            self.next_char();
                            if self.cur == Some('@') {
                                self.next_char();
                                return Token::HashCommaAt;
                            }
                            return Token::HashComma;
                        }
                        Some('t') | Some('T') => {
                            self.next_char();
                            if !is_delimiter(self.cur) {
                                self.error("Bad #t form");
                            }
                            self.value_bool = true;
                            return Token::Bool;
                        }
                        Some('f') | Some('F') => {
                            self.next_char();
                            if !is_delimiter(self.cur) {
                                self.error("Bad #f form");
                            }
                            self.value_bool = false;
                            return Token::Bool;
                        }
                        Some('\\') => {
                            self.next_char();
                            if let Some(tok) = self.scan_character() {
                                return tok;
                            }
                        }
                        other => {
                            let shown = other.map_or(String::new(), |c| c.to_string());
                            self.error(&format!("Illegal lexeme \"#{shown}\""));
                            self.next_char();
                        }
                    }
                }

                // <special initial>
                Some(
                    c @ ('!' | '$' | '%' | '&' | '*' | '/' | ':' | '<' | '=' | '>'
                    | '?' | '^' | '_' | '~'),
                ) => {
                    self.next_char();
                    return self.scan_rest_identifier(&c.to_string());
                }

                Some('+') => {
                    self.next_char();
                    if is_delimiter(self.cur) {
                        return self.identifier("+");
                    }
                    self.unget_char('+');
                    if let Some(tok) = self.scan_number() {
                        return tok;
                    }
                }

                Some('-') => {
                    self.next_char();
                    if is_delimiter(self.cur) {
                        return self.identifier("-");
                    }
                    if self.cur == Some('>') {
                        self.next_char();
                        return self.scan_rest_identifier("->");
                    }
                    self.unget_char('-');
                    if let Some(tok) = self.scan_number() {
                        return tok;
                    }
                }

                Some('.') => {
                    self.next_char();
                    if is_delimiter(self.cur) {
                        return Token::Dot;
                    }
                    if matches!(self.cur, Some(c) if c.is_ascii_digit()) {
                        self.unget_char('.');
                        if let Some(tok) = self.scan_number() {
                            return tok;
                        }
                    } else {
                        return self.scan_rest_identifier(".");
                    }
                }

                Some('\\') => {
                    self.next_char();
                    if self.cur == Some('x') {
                        self.next_char();
                        let first = self.scan_inline_hex_escape();
                        return self.scan_rest_identifier(&first.to_string());
                    }
                    self.error("\"\\\" cannot start a lexeme");
                }

                Some(c) if c.is_whitespace() => {
                    while matches!(self.cur, Some(c) if c.is_whitespace()) {
                        self.next_char();
                    }
                }

                Some(c) if c.is_alphabetic() => {
                    self.next_char();
                    return self.scan_rest_identifier(&c.to_string());
                }

                Some(c) => {
                    self.error(&format!("\"{c}\" cannot start a lexeme"));
                    self.next_char();
                }
            }
        }
    }

    /// Scan a nested `#| ... |#` comment, which may itself nest. Errors
    /// inside the comment are ignored; only an unterminated comment is
    /// reported, after the scanner state is restored.
    fn scan_nested_comment(&mut self) {
        let start_line = self.tok_coords.line();
        debug_assert!(!self.in_nested_comment);

        let saved_suppress = self.suppress_errors;
        self.suppress_errors = true;
        self.in_nested_comment = true;

        let mut level = 1u32;
        loop {
            match self.next_token() {
                Token::NestedCommentStart => level += 1,
                Token::NestedCommentEnd => {
                    level -= 1;
                    if level == 0 {
                        break;
                    }
                }
                Token::Eof => break,
                _ => {}
            }
        }

        self.suppress_errors = saved_suppress;
        self.in_nested_comment = false;

        if self.cur_token == Token::Eof {
            self.error(&format!("EOF in comment started on line {start_line}"));
        }
    }

    fn scan_string(&mut self) -> Token {
        let mut buf = String::with_capacity(8);

        'outer: loop {
            match self.cur {
                Some('"') => {
                    self.next_char();
                    break;
                }
                None => {
                    self.error("Unterminated string lexeme at end of input");
                    break;
                }
                Some('\\') => {
                    self.next_char();
                    match self.cur {
                        None => {
                            self.error("Unterminated string escape at end of input");
                            break 'outer;
                        }
                        Some('a') => {
                            buf.push('\u{7}');
                            self.next_char();
                        }
                        Some('b') => {
                            buf.push('\u{8}');
                            self.next_char();
                        }
                        Some('t') => {
                            buf.push('\t');
                            self.next_char();
                        }
                        Some('n') => {
                            buf.push('\n');
                            self.next_char();
                        }
                        Some('v') => {
                            buf.push('\u{b}');
                            self.next_char();
                        }
                        Some('f') => {
                            buf.push('\u{c}');
                            self.next_char();
                        }
                        Some('r') => {
                            buf.push('\r');
                            self.next_char();
                        }
                        Some('"') => {
                            buf.push('"');
                            self.next_char();
                        }
                        Some('\\') => {
                            buf.push('\\');
                            self.next_char();
                        }
                        Some('x') => {
                            self.next_char();
                            buf.push(self.scan_inline_hex_escape());
                        }
                        Some(_) => {
                            // `\ <intraline whitespace> \n <intraline
                            // whitespace>` is a line continuation.
                            while matches!(self.cur, Some(c) if c != '\n' && c.is_whitespace())
                            {
                                self.next_char();
                            }
                            if self.cur != Some('\n') {
                                self.error("Invalid string escape");
                                break 'outer;
                            }
                            self.next_char();
                            while matches!(self.cur, Some(c) if c != '\n' && c.is_whitespace())
                            {
                                self.next_char();
                            }
                        }
                    }
                }
                Some(c) => {
                    buf.push(c);
                    self.next_char();
                }
            }
        }

        self.value_string = buf;
        Token::Str
    }

    pub(crate) fn scan_rest_identifier(&mut self, prefix: &str) -> Token {
        let mut buf = String::with_capacity(16);
        buf.push_str(prefix);

        loop {
            match self.cur {
                Some(
                    c @ ('0'..='9'
                    | '+' | '-' | '.' | '@'
                    | '!' | '$' | '%' | '&' | '*' | '/' | ':' | '<' | '='
                    | '>' | '?' | '^' | '_' | '~'),
                ) => {
                    buf.push(c);
                    self.next_char();
                }
                Some('\\') => {
                    self.next_char();
                    if self.cur == Some('x') {
                        self.next_char();
                        buf.push(self.scan_inline_hex_escape());
                    } else {
                        self.error("Invalid escape in an identifier");
                    }
                }
                Some(c) if c.is_alphabetic() => {
                    buf.push(c);
                    self.next_char();
                }
                _ => break,
            }
        }

        if !is_delimiter(self.cur) {
            self.error(&format!("Identifier \"{buf}\" not terminated by a delimiter"));
        }

        self.identifier(&buf)
    }

    fn identifier(&mut self, name: &str) -> Token {
        self.value_ident = Some(self.symbols.intern(name));
        Token::Ident
    }

    /// Scan the rest of `\x...;` and return the validated character.
    fn scan_inline_hex_escape(&mut self) -> char {
        if !is_base_digit(16, self.cur) {
            self.error("Invalid inline hex escape");
            return ' ';
        }

        let mut value: u32 = 0;
        let mut err = false;
        loop {
            if !err {
                match value
                    .checked_mul(16)
                    .map(|v| v + digit_value(self.cur.unwrap_or('0')))
                {
                    Some(v) if v <= 0x10_FFFF => value = v,
                    _ => {
                        self.error("Inline hex character overflow");
                        err = true;
                        value = u32::from(b' ');
                    }
                }
            }
            self.next_char();
            if !is_base_digit(16, self.cur) {
                break;
            }
        }

        if self.cur == Some(';') {
            self.next_char();
        } else {
            self.error("Inline hex character must be terminated with ;");
            value = u32::from(b' ');
        }

        self.validate_char(value)
    }

    fn validate_char(&mut self, value: u32) -> char {
        match char::from_u32(value) {
            Some(c) => c,
            None => {
                self.error(&format!("Invalid Unicode character 0x{value:04x}"));
                ' '
            }
        }
    }

    fn scan_character(&mut self) -> Option<Token> {
        // The first character can be anything, even a delimiter; the rest
        // end at a delimiter.
        let first = match self.cur {
            Some(c) => c,
            None => {
                self.error("Unterminated character lexeme at end of input");
                return None;
            }
        };
        let mut name = String::new();
        name.push(first);

        self.next_char();
        if !is_delimiter(self.cur) {
            name.push(self.cur.unwrap_or(' '));
            self.next_char();
        }

        let mut chars = name.chars();
        let (c0, c1) = (chars.next(), chars.next());

        let result: u32;
        if c0 == Some('x') && is_base_digit(16, c1) {
            // Hex-encoded character.
            let mut value = digit_value(c1.unwrap_or('0'));
            let mut err = false;
            while !is_delimiter(self.cur) {
                if !err {
                    if !is_base_digit(16, self.cur) {
                        self.error("Invalid hex digit in #\\x");
                        err = true;
                    } else {
                        value = (value << 4) + digit_value(self.cur.unwrap_or('0'));
                        if value > 0x10_FFFF {
                            self.error("Character value overflow");
                            err = true;
                        }
                    }
                }
                self.next_char();
            }
            result = if err { u32::from(b' ') } else { value };
        } else {
            // A plain character or a named one.
            while !is_delimiter(self.cur) {
                name.push(self.cur.unwrap_or(' '));
                self.next_char();
            }

            if name.chars().count() == 1 {
                result = u32::from(first);
            } else {
                match char_name_value(&name) {
                    Some(v) => result = v,
                    None => {
                        self.error(&format!("Invalid character #\\{name}"));
                        result = u32::from(b' ');
                    }
                }
            }
        }

        self.value_char = self.validate_char(result);
        Some(Token::Char)
    }
}

fn char_name_value(name: &str) -> Option<u32> {
    Some(match name {
        "nul" => 0,
        "alarm" => 7,
        "backspace" => 8,
        "tab" => 9,
        "linefeed" | "newline" => 10,
        "vtab" => 11,
        "page" => 12,
        "return" => 13,
        "esc" => 0x1B,
        "space" => 32,
        "delete" => 0x7F,
        _ => return None,
    })
}

pub(crate) fn is_delimiter(ch: Option<char>) -> bool {
    match ch {
        None => true,
        Some('(' | ')' | '[' | ']' | '"' | ';' | '#') => true,
        Some(c) => c.is_whitespace(),
    }
}

pub(crate) fn is_base_digit(base: u32, ch: Option<char>) -> bool {
    match ch {
        Some(c) => c.is_digit(base),
        None => false,
    }
}

pub(crate) fn digit_value(c: char) -> u32 {
    c.to_digit(16).unwrap_or(0)
}

#[cfg(test)]
mod tests;
