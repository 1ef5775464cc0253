//! The datum reader: turns a token stream into positioned S-expressions.
//!
//! The parser consumes tokens from a [`Lexer`] and produces [`Datum`]
//! values for the compiler. Pairs remember the source coordinates of their
//! first token, which is what positioned compile and runtime errors point
//! at later.
//!
//! Errors are reported through the lexer's shared reporter and the parser
//! recovers: an out-of-place token is reported once and skipped until a
//! terminator that encloses the current construct is found, so sibling
//! datums still parse. List construction uses an explicit accumulator and
//! a final reverse fold, so reading a long list does not consume stack
//! proportional to its length.

use lyra_ir::{Coords, Datum, Symbol};
use lyra_lexer::{Lexer, Token};

/// Result of reading one datum.
enum Parsed {
    Datum(Datum),
    Eof,
    /// A `#;` datum comment was consumed, including the datum it hides.
    Comment,
}

/// A small set of terminator tokens, one bit per [`Token`] variant.
type TermSet = u32;

fn set_add(set: TermSet, tok: Token) -> TermSet {
    set | (1 << tok as u32)
}

fn set_contains(set: TermSet, tok: Token) -> bool {
    set & (1 << tok as u32) != 0
}

pub struct DatumParser {
    lex: Lexer,
    /// The reporter hit its bound; yield end-of-input from then on.
    aborted: bool,
}

impl DatumParser {
    pub fn new(mut lex: Lexer) -> DatumParser {
        lex.next_token();
        DatumParser {
            lex,
            aborted: false,
        }
    }

    /// Read the next datum, or `None` at end of input.
    pub fn parse_datum(&mut self) -> Option<Datum> {
        loop {
            match self.read(0) {
                Parsed::Comment => {}
                Parsed::Eof => return None,
                Parsed::Datum(d) => return Some(d),
            }
        }
    }

    /// Read every remaining datum in order.
    pub fn parse_program(&mut self) -> Vec<Datum> {
        let mut out = Vec::new();
        while let Some(d) = self.parse_datum() {
            out.push(d);
        }
        out
    }

    fn next(&mut self) {
        self.lex.next_token();
    }

    fn error(&mut self, message: &str) {
        if self.aborted {
            return;
        }
        let coords = self.lex.tok_coords.clone();
        let reporter = self.lex.reporter().clone();
        if reporter.error(Some(&coords), None, message).is_err() {
            self.aborted = true;
        }
    }

    fn read(&mut self, term_set: TermSet) -> Parsed {
        let mut in_error = false;
        loop {
            if self.aborted {
                return Parsed::Eof;
            }
            match self.lex.cur_token {
                Token::Eof => return Parsed::Eof,

                Token::Bool => {
                    let d = Datum::Bool(self.lex.value_bool);
                    self.next();
                    return Parsed::Datum(d);
                }
                Token::Number => {
                    let d = self
                        .lex
                        .value_number
                        .clone()
                        .map_or(Datum::Unspec, Datum::Num);
                    self.next();
                    return Parsed::Datum(d);
                }
                Token::Char => {
                    let d = Datum::Char(self.lex.value_char);
                    self.next();
                    return Parsed::Datum(d);
                }
                Token::Str => {
                    let d = Datum::string(self.lex.value_string.clone());
                    self.next();
                    return Parsed::Datum(d);
                }
                Token::Ident => {
                    let d = self
                        .lex
                        .value_ident
                        .clone()
                        .map_or(Datum::Unspec, Datum::Sym);
                    self.next();
                    return Parsed::Datum(d);
                }

                Token::LParen
                | Token::LSquare
                | Token::HashLParen
                | Token::Quote
                | Token::Backquote
                | Token::Comma
                | Token::CommaAt
                | Token::HashQuote
                | Token::HashBackquote
                | Token::HashComma
                | Token::HashCommaAt => return self.compound(term_set),

                Token::DatumComment => {
                    self.next();
                    // Read and discard the hidden datum.
                    self.read(term_set);
                    return Parsed::Comment;
                }

                tok @ (Token::Dot
                | Token::RParen
                | Token::RSquare
                | Token::NestedCommentStart
                | Token::NestedCommentEnd) => {
                    // Skip invalid tokens, reporting only the first one.
                    if !in_error {
                        self.error(&format!("'{}' isn't allowed here", tok.repr()));
                        in_error = true;
                    }
                    if set_contains(term_set, tok) {
                        return Parsed::Datum(Datum::Nil);
                    }
                    self.next();
                }
            }
        }
    }

    fn read_skip_comments(&mut self, term_set: TermSet) -> Parsed {
        loop {
            match self.read(term_set) {
                Parsed::Comment => {}
                other => return other,
            }
        }
    }

    fn compound(&mut self, term_set: TermSet) -> Parsed {
        match self.lex.cur_token {
            Token::LParen => {
                self.next();
                Parsed::Datum(self.list(Token::RParen, term_set))
            }
            Token::LSquare => {
                self.next();
                Parsed::Datum(self.list(Token::RSquare, term_set))
            }
            Token::HashLParen => {
                self.next();
                Parsed::Datum(self.vector(Token::RParen, term_set))
            }

            tok => {
                let syms = self.lex.symbols();
                let sym = match tok {
                    Token::Quote => syms.sym_quote.clone(),
                    Token::Backquote => syms.sym_quasiquote.clone(),
                    Token::Comma => syms.sym_unquote.clone(),
                    Token::CommaAt => syms.sym_unquote_splicing.clone(),
                    Token::HashQuote => syms.sym_syntax.clone(),
                    Token::HashBackquote => syms.sym_quasisyntax.clone(),
                    Token::HashComma => syms.sym_unsyntax.clone(),
                    Token::HashCommaAt => syms.sym_unsyntax_splicing.clone(),
                    _ => unreachable!("read() only dispatches compound tokens here"),
                };
                Parsed::Datum(self.abbrev(sym, term_set))
            }
        }
    }

    /// Expand `'x` and friends to `(sym x)`, keeping the abbreviation
    /// token's coordinates on the outer pair.
    fn abbrev(&mut self, sym: Symbol, term_set: TermSet) -> Datum {
        let coords = self.lex.tok_coords.clone();
        self.next();

        let inner_coords = self.lex.tok_coords.clone();
        let datum = match self.read_skip_comments(term_set) {
            Parsed::Datum(d) => d,
            Parsed::Eof => {
                self.error("Unterminated abbreviation");
                Datum::Eof
            }
            Parsed::Comment => unreachable!("comments were skipped"),
        };

        Datum::cons_at(
            coords,
            Datum::Sym(sym),
            Datum::cons_at(inner_coords, datum, Datum::Nil),
        )
    }

    /// Read list elements up to `terminator`, handling a dotted tail.
    /// Elements are accumulated and folded into pairs at the end.
    fn list(&mut self, terminator: Token, term_set: TermSet) -> Datum {
        let term_set = set_add(term_set, terminator);
        let car_term = set_add(term_set, Token::Dot);

        let mut items: Vec<(Coords, Datum)> = Vec::new();
        let mut tail = Datum::Nil;

        loop {
            if self.lex.cur_token == terminator {
                self.next();
                break;
            }

            let coords = self.lex.tok_coords.clone();
            let car = match self.read(car_term) {
                Parsed::Comment => continue,
                Parsed::Eof => {
                    self.error("Unterminated list");
                    return Datum::Nil;
                }
                Parsed::Datum(d) => d,
            };
            items.push((coords, car));

            if self.lex.cur_token == Token::Dot {
                self.next();
                tail = match self.read_skip_comments(term_set) {
                    Parsed::Datum(d) => d,
                    Parsed::Eof => {
                        self.error("Unterminated list");
                        return Datum::Nil;
                    }
                    Parsed::Comment => unreachable!("comments were skipped"),
                };
                if self.lex.cur_token != terminator {
                    self.error(&format!("Expected {}", terminator.repr()));
                }
                self.next();
                break;
            }
        }

        items
            .into_iter()
            .rev()
            .fold(tail, |acc, (coords, d)| Datum::cons_at(coords, d, acc))
    }

    fn vector(&mut self, terminator: Token, term_set: TermSet) -> Datum {
        let term_set = set_add(term_set, terminator);
        let mut items = Vec::new();

        while self.lex.cur_token != terminator {
            match self.read(term_set) {
                Parsed::Comment => {}
                Parsed::Eof => {
                    self.error("Unterminated vector");
                    // An empty vector, just for error recovery.
                    return Datum::vector(Vec::new());
                }
                Parsed::Datum(d) => items.push(d),
            }
        }
        self.next();

        Datum::vector(items)
    }
}

#[cfg(test)]
mod tests;
