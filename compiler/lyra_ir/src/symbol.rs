//! Interned symbols and their compile-time classification.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use rustc_hash::FxHashMap;

/// Compile-time classification of a symbol.
///
/// Special-form symbols carry their form code; everything else is `None`.
/// The code only matters while the symbol is not shadowed by a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymCode {
    None,
    Quote,
    Syntax,
    Quasisyntax,
    Unsyntax,
    UnsyntaxSplicing,
    If,
    Begin,
    Lambda,
    Define,
    SetBang,
    Let,
    Letrec,
    LetrecStar,
    Builtin,
    DefineMacro,
    DefineIdentifierMacro,
    DefineSetMacro,
    MacroEnv,
}

#[derive(Debug)]
struct SymbolData {
    name: Box<str>,
    code: SymCode,
}

/// An interned symbol.
///
/// There is exactly one symbol per distinct name for the lifetime of its
/// owning [`SymbolTable`], so equality is identity equality.
#[derive(Clone, Debug)]
pub struct Symbol(Rc<SymbolData>);

impl Symbol {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn code(&self) -> SymCode {
        self.0.code
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Symbol) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// The interner. Also owns the well-known symbols the reader needs to
/// expand abbreviations (`'x` → `(quote x)` and friends).
pub struct SymbolTable {
    map: RefCell<FxHashMap<Box<str>, Symbol>>,
    pub sym_quote: Symbol,
    pub sym_quasiquote: Symbol,
    pub sym_unquote: Symbol,
    pub sym_unquote_splicing: Symbol,
    pub sym_syntax: Symbol,
    pub sym_quasisyntax: Symbol,
    pub sym_unsyntax: Symbol,
    pub sym_unsyntax_splicing: Symbol,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        let map = RefCell::new(FxHashMap::default());
        let special = |map: &RefCell<FxHashMap<Box<str>, Symbol>>,
                       name: &str,
                       code: SymCode| {
            let sym = Symbol(Rc::new(SymbolData {
                name: name.into(),
                code,
            }));
            map.borrow_mut().insert(name.into(), sym.clone());
            sym
        };

        let sym_quote = special(&map, "quote", SymCode::Quote);
        // quasiquote/unquote are expanded by library macros, not the compiler
        let sym_quasiquote = special(&map, "quasiquote", SymCode::None);
        let sym_unquote = special(&map, "unquote", SymCode::None);
        let sym_unquote_splicing = special(&map, "unquote-splicing", SymCode::None);
        let sym_syntax = special(&map, "syntax", SymCode::Syntax);
        let sym_quasisyntax = special(&map, "quasisyntax", SymCode::Quasisyntax);
        let sym_unsyntax = special(&map, "unsyntax", SymCode::Unsyntax);
        let sym_unsyntax_splicing =
            special(&map, "unsyntax-splicing", SymCode::UnsyntaxSplicing);

        special(&map, "if", SymCode::If);
        special(&map, "begin", SymCode::Begin);
        special(&map, "lambda", SymCode::Lambda);
        special(&map, "define", SymCode::Define);
        special(&map, "set!", SymCode::SetBang);
        special(&map, "let", SymCode::Let);
        special(&map, "letrec", SymCode::Letrec);
        special(&map, "letrec*", SymCode::LetrecStar);
        special(&map, "__%builtin", SymCode::Builtin);
        special(&map, "define-macro", SymCode::DefineMacro);
        special(&map, "define-identifier-macro", SymCode::DefineIdentifierMacro);
        special(&map, "define-set-macro", SymCode::DefineSetMacro);
        special(&map, "macro-env", SymCode::MacroEnv);

        SymbolTable {
            map,
            sym_quote,
            sym_quasiquote,
            sym_unquote,
            sym_unquote_splicing,
            sym_syntax,
            sym_quasisyntax,
            sym_unsyntax,
            sym_unsyntax_splicing,
        }
    }

    /// Intern a name, returning the unique symbol for it.
    pub fn intern(&self, name: &str) -> Symbol {
        if let Some(sym) = self.map.borrow().get(name) {
            return sym.clone();
        }
        let sym = Symbol(Rc::new(SymbolData {
            name: name.into(),
            code: SymCode::None,
        }));
        self.map.borrow_mut().insert(name.into(), sym.clone());
        sym
    }

    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.borrow().is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}
