//! The symbol environment: a stack of lexical scopes supporting both
//! shadowing and overloading.
//!
//! Shaped after the "name maps to decl(s)" lookup-table pattern used
//! throughout this crate's other lookup tables (`builtins.rs`'s signature
//! map), generalized into a scope stack.

use crate::ast::NodeId;
use std::collections::HashMap;

/// What introduced a scope, used by `enclosing_func_or_shader`/
/// `enclosing_loop` to walk outward looking for the right kind of owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOwner {
    /// The file-level scope; no owner node.
    Global,
    FuncOrShader(NodeId),
    Loop(NodeId),
    /// A plain block scope (`{ ... }`) that is neither a function body nor
    /// a loop body in its own right.
    Block,
}

struct Scope {
    owner: ScopeOwner,
    /// Each name maps to one or more declarations. `allow_overload` is
    /// tracked per-binding since a name like `f` might first be declared
    /// non-overloadable then legitimately clash; the environment always
    /// records what it was told.
    bindings: HashMap<String, Vec<(NodeId, bool)>>,
}

pub enum InsertOutcome {
    /// No prior binding for this name in the current scope.
    Fresh,
    /// Appended as an overload of an existing binding in the current
    /// scope.
    Overloaded,
    /// A binding exists in the current scope and at least one of the two
    /// (existing, new) is not overloadable — the caller must report a
    /// redefinition diagnostic.
    Redefinition(NodeId),
    /// No binding in the current scope, but one exists in an outer scope —
    /// succeeds, caller should emit a shadow warning.
    Shadows(NodeId),
}

pub struct Environment {
    scopes: Vec<Scope>,
}

impl Environment {
    pub fn new() -> Self {
        Environment { scopes: vec![Scope { owner: ScopeOwner::Global, bindings: HashMap::new() }] }
    }

    pub fn push(&mut self, owner: ScopeOwner) {
        self.scopes.push(Scope { owner, bindings: HashMap::new() });
    }

    pub fn pop(&mut self) {
        assert!(self.scopes.len() > 1, "cannot pop the global scope");
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Searches outward; returns `Some` only if the innermost scope
    /// containing `name` has exactly one binding for it.
    pub fn find_one(&self, name: &str) -> Option<NodeId> {
        for scope in self.scopes.iter().rev() {
            if let Some(bindings) = scope.bindings.get(name) {
                return if bindings.len() == 1 { Some(bindings[0].0) } else { None };
            }
        }
        None
    }

    /// Returns every binding for `name` across all enclosing scopes, outer
    /// scopes appended after inner ones.
    pub fn find_all(&self, name: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        for scope in self.scopes.iter().rev() {
            if let Some(bindings) = scope.bindings.get(name) {
                out.extend(bindings.iter().map(|(id, _)| *id));
            }
        }
        out
    }

    /// Inserts `decl` under `name` in the current (innermost) scope.
    pub fn insert(&mut self, name: &str, decl: NodeId, allow_overload: bool) -> InsertOutcome {
        let current = self.scopes.last_mut().expect("environment always has a scope");
        if let Some(existing) = current.bindings.get_mut(name) {
            let (last_id, last_overloadable) = *existing.last().unwrap();
            if last_overloadable && allow_overload {
                existing.push((decl, allow_overload));
                return InsertOutcome::Overloaded;
            }
            return InsertOutcome::Redefinition(last_id);
        }
        current.bindings.insert(name.to_string(), vec![(decl, allow_overload)]);

        for scope in self.scopes[..self.scopes.len() - 1].iter().rev() {
            if let Some(bindings) = scope.bindings.get(name) {
                return InsertOutcome::Shadows(bindings.last().unwrap().0);
            }
        }
        InsertOutcome::Fresh
    }

    /// Walks outward through scope owners looking for the nearest function
    /// or shader.
    pub fn enclosing_func_or_shader(&self) -> Option<NodeId> {
        for scope in self.scopes.iter().rev() {
            if let ScopeOwner::FuncOrShader(id) = scope.owner {
                return Some(id);
            }
        }
        None
    }

    /// Walks outward through scope owners looking for the nearest loop.
    pub fn enclosing_loop(&self) -> Option<NodeId> {
        for scope in self.scopes.iter().rev() {
            match scope.owner {
                ScopeOwner::Loop(id) => return Some(id),
                // A function/shader boundary stops the search: a loop in
                // an outer function does not enclose a `break` inside an
                // inner one (there are no nested functions in this
                // language, but the rule still holds in principle).
                ScopeOwner::FuncOrShader(_) => return None,
                _ => {}
            }
        }
        None
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_insert_in_empty_scope() {
        let mut env = Environment::new();
        matches!(env.insert("x", NodeId(0), false), InsertOutcome::Fresh);
    }

    #[test]
    fn redefinition_without_overload_flag() {
        let mut env = Environment::new();
        env.insert("x", NodeId(0), false);
        assert!(matches!(env.insert("x", NodeId(1), false), InsertOutcome::Redefinition(_)));
    }

    #[test]
    fn overloadable_names_coexist() {
        let mut env = Environment::new();
        env.insert("f", NodeId(0), true);
        assert!(matches!(env.insert("f", NodeId(1), true), InsertOutcome::Overloaded));
        assert_eq!(env.find_all("f"), vec![NodeId(0), NodeId(1)]);
    }

    #[test]
    fn shadow_in_inner_scope_succeeds_with_warning_outcome() {
        let mut env = Environment::new();
        env.insert("x", NodeId(0), false);
        env.push(ScopeOwner::Block);
        assert!(matches!(env.insert("x", NodeId(1), false), InsertOutcome::Shadows(NodeId(0))));
        assert_eq!(env.find_one("x"), Some(NodeId(1)));
    }

    #[test]
    fn find_one_returns_none_when_overloaded() {
        let mut env = Environment::new();
        env.insert("f", NodeId(0), true);
        env.insert("f", NodeId(1), true);
        assert_eq!(env.find_one("f"), None);
    }

    #[test]
    fn find_all_outer_scopes_appended_after_inner() {
        let mut env = Environment::new();
        env.insert("f", NodeId(0), true);
        env.push(ScopeOwner::Block);
        env.insert("f", NodeId(1), true);
        assert_eq!(env.find_all("f"), vec![NodeId(1), NodeId(0)]);
    }

    #[test]
    fn enclosing_loop_stops_at_function_boundary() {
        let mut env = Environment::new();
        env.push(ScopeOwner::Loop(NodeId(0)));
        env.push(ScopeOwner::FuncOrShader(NodeId(1)));
        assert_eq!(env.enclosing_loop(), None);
    }
}
