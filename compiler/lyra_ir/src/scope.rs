//! Compile-time lexical scopes and bindings.
//!
//! Scopes exist only while a compilation unit is being processed; their
//! effect persists solely through the (depth, slot) pairs baked into
//! instructions. They are stored in an arena and referenced by index, so
//! parent links never outlive the compilation pass that created them.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::instr::Closure;
use crate::symbol::Symbol;

/// Index of a scope within its [`ScopeArena`].
pub type ScopeId = usize;

/// Raised when a physical scope runs out of variable slots. Fatal for the
/// compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("binding count exceeds {max}")]
pub struct ScopeOverflow {
    pub max: u32,
}

/// A compile-time fact about a symbol within a scope.
#[derive(Clone, Debug)]
pub enum Binding {
    Var(Rc<VarBinding>),
    Macro(Rc<MacroBinding>),
}

/// A variable bound to a slot in its owning physical scope's environment.
#[derive(Debug)]
pub struct VarBinding {
    /// The physical scope owning the slot.
    pub scope: ScopeId,
    pub sym: Symbol,
    /// Slot index in the runtime environment, unique within the scope.
    pub index: u32,
}

/// A macro bound at compile time. The three expanders are installed after
/// the binding is created, as each transformer finishes evaluating.
#[derive(Debug, Default)]
pub struct MacroBinding {
    pub combination: RefCell<Option<Rc<Closure>>>,
    pub identifier: RefCell<Option<Rc<Closure>>>,
    pub set: RefCell<Option<Rc<Closure>>>,
}

/// One lexical frame.
///
/// A scope is either physical (it introduces a runtime environment frame
/// and bumps the lexical nesting level) or lexical-only (it shares its
/// parent's frame — `let` bodies that need no environment of their own).
#[derive(Debug)]
pub struct Scope {
    parent: Option<ScopeId>,
    /// Lexical-only scopes delegate slot allocation to their parent.
    pub lexical: bool,
    /// Physical nesting level; lexical-only scopes share their parent's.
    pub env_level: u32,
    max_bindings: u32,
    /// Next slot to assign, starting after the reserved slots.
    binding_count: u32,
    table: FxHashMap<Symbol, Binding>,
}

/// Arena of scopes for one compiler instance.
#[derive(Debug, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    pub fn new() -> ScopeArena {
        ScopeArena { scopes: Vec::new() }
    }

    /// Create a scope. A lexical-only scope must have a parent.
    pub fn push(
        &mut self,
        parent: Option<ScopeId>,
        lexical: bool,
        max_bindings: u32,
    ) -> ScopeId {
        debug_assert!(!lexical || parent.is_some(), "lexical scope needs a parent");
        let env_level = match parent {
            Some(p) => self.scopes[p].env_level + u32::from(!lexical),
            None => 0,
        };
        self.scopes.push(Scope {
            parent,
            lexical,
            env_level,
            max_bindings,
            binding_count: crate::env::RESERVED_SLOTS as u32,
            table: FxHashMap::default(),
        });
        self.scopes.len() - 1
    }

    pub fn env_level(&self, id: ScopeId) -> u32 {
        self.scopes[id].env_level
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.scopes[id].parent
    }

    pub fn is_top_level(&self, id: ScopeId) -> bool {
        self.scopes[id].parent.is_none()
    }

    /// The slot count of the nearest physical scope.
    pub fn binding_count(&self, id: ScopeId) -> u32 {
        let scope = &self.scopes[id];
        if scope.lexical {
            match scope.parent {
                Some(p) => self.binding_count(p),
                None => unreachable!("lexical scope without a parent"),
            }
        } else {
            scope.binding_count
        }
    }

    /// Search this scope and its ancestors; first match wins.
    pub fn lookup_any(&self, id: ScopeId, sym: &Symbol) -> Option<Binding> {
        let scope = &self.scopes[id];
        if let Some(b) = scope.table.get(sym) {
            return Some(b.clone());
        }
        scope.parent.and_then(|p| self.lookup_any(p, sym))
    }

    pub fn lookup_var(&self, id: ScopeId, sym: &Symbol) -> Option<Rc<VarBinding>> {
        match self.lookup_any(id, sym) {
            Some(Binding::Var(vb)) => Some(vb),
            _ => None,
        }
    }

    pub fn lookup_macro(&self, id: ScopeId, sym: &Symbol) -> Option<Rc<MacroBinding>> {
        match self.lookup_any(id, sym) {
            Some(Binding::Macro(mb)) => Some(mb),
            _ => None,
        }
    }

    /// Search this scope's own table only.
    pub fn local_lookup_var(&self, id: ScopeId, sym: &Symbol) -> Option<Rc<VarBinding>> {
        match self.scopes[id].table.get(sym) {
            Some(Binding::Var(vb)) => Some(Rc::clone(vb)),
            _ => None,
        }
    }

    /// Allocate a slot in the nearest physical scope.
    fn new_var_binding(
        &mut self,
        id: ScopeId,
        sym: &Symbol,
    ) -> Result<Rc<VarBinding>, ScopeOverflow> {
        if self.scopes[id].lexical {
            let parent = match self.scopes[id].parent {
                Some(p) => p,
                None => unreachable!("lexical scope without a parent"),
            };
            return self.new_var_binding(parent, sym);
        }
        let scope = &mut self.scopes[id];
        if scope.binding_count == scope.max_bindings {
            return Err(ScopeOverflow {
                max: scope.max_bindings,
            });
        }
        let vb = Rc::new(VarBinding {
            scope: id,
            sym: sym.clone(),
            index: scope.binding_count,
        });
        scope.binding_count += 1;
        Ok(vb)
    }

    /// Bind a symbol in this scope, assigning it a slot in the nearest
    /// physical scope's environment. Re-binding an already-bound variable
    /// returns the existing binding without allocating a new slot.
    pub fn bind_var(
        &mut self,
        id: ScopeId,
        sym: &Symbol,
    ) -> Result<Rc<VarBinding>, ScopeOverflow> {
        if let Some(Binding::Var(vb)) = self.scopes[id].table.get(sym) {
            return Ok(Rc::clone(vb));
        }
        let vb = self.new_var_binding(id, sym)?;
        self.scopes[id]
            .table
            .insert(sym.clone(), Binding::Var(Rc::clone(&vb)));
        Ok(vb)
    }

    /// Bind a macro in this scope, or return the existing macro binding.
    pub fn bind_macro(&mut self, id: ScopeId, sym: &Symbol) -> Rc<MacroBinding> {
        if let Some(Binding::Macro(mb)) = self.scopes[id].table.get(sym) {
            return Rc::clone(mb);
        }
        let mb = Rc::new(MacroBinding::default());
        self.scopes[id]
            .table
            .insert(sym.clone(), Binding::Macro(Rc::clone(&mb)));
        mb
    }

    /// Copy every binding of `from` into `to` (used to seed the macro
    /// world's top level from the regular one).
    pub fn copy_bindings(&mut self, from: ScopeId, to: ScopeId) {
        let bindings: Vec<(Symbol, Binding)> = self.scopes[from]
            .table
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let count = self.scopes[from].binding_count;
        let scope = &mut self.scopes[to];
        scope.table.extend(bindings);
        scope.binding_count = scope.binding_count.max(count);
    }
}
