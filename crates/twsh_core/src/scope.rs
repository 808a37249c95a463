//! Variable scopes for function locals.
//!
//! A stack of name→value maps: the bottom scope is global and can never be
//! popped; each function call pushes one scope and pops it on return.
//! Lookup walks the stack top-down so a `local` shadows outer bindings for
//! the duration of the call.

use crate::error::{ShellError, ShellResult};
use std::collections::HashMap;

/// One binding frame, named for diagnostics (`global`, or the function name).
#[derive(Debug, Clone)]
pub struct VariableScope {
    pub name: String,
    vars: HashMap<String, String>,
}

impl VariableScope {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: HashMap::new(),
        }
    }
}

/// Owns the scope stack. Invariant: never empty; index 0 is the global scope.
#[derive(Debug, Clone)]
pub struct ScopeManager {
    stack: Vec<VariableScope>,
}

impl Default for ScopeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeManager {
    pub fn new() -> Self {
        Self {
            stack: vec![VariableScope::new("global")],
        }
    }

    /// Number of scopes on the stack; 1 means global only.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// True while executing inside at least one function call.
    pub fn in_function(&self) -> bool {
        self.stack.len() > 1
    }

    pub fn push_scope(&mut self, name: impl Into<String>) {
        let scope = VariableScope::new(name);
        tracing::trace!(scope = %scope.name, depth = self.stack.len() + 1, "push scope");
        self.stack.push(scope);
    }

    /// Pop the innermost scope. Popping the global scope is an engine error,
    /// never silently ignored.
    pub fn pop_scope(&mut self) -> ShellResult<()> {
        if self.stack.len() == 1 {
            return Err(ShellError::internal("attempt to pop the global scope"));
        }
        if let Some(scope) = self.stack.pop() {
            tracing::trace!(scope = %scope.name, "pop scope");
        }
        Ok(())
    }

    /// Look a name up, innermost scope first.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.stack
            .iter()
            .rev()
            .find_map(|scope| scope.vars.get(name).map(String::as_str))
    }

    /// Assign a variable.
    ///
    /// With `local`, or when only the global scope exists, the write lands
    /// in the current scope. Otherwise a name already present in the current
    /// (function) scope is updated there; anything else targets the global
    /// scope — the bash rule that plain assignment inside a function is
    /// global unless shadowed.
    pub fn set_variable(&mut self, name: &str, value: &str, local: bool) {
        let top = self.stack.len() - 1;
        let target = if local || top == 0 || self.stack[top].vars.contains_key(name) {
            top
        } else {
            0
        };
        self.stack[target]
            .vars
            .insert(name.to_string(), value.to_string());
    }

    /// Declare a function-local binding. Usage error outside a function.
    pub fn create_local(&mut self, name: &str, value: &str) -> ShellResult<()> {
        if !self.in_function() {
            return Err(ShellError::scope("local: can only be used in a function"));
        }
        let top = self.stack.len() - 1;
        self.stack[top]
            .vars
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Remove the innermost binding of `name`; unsetting a local re-exposes
    /// the binding it shadowed.
    pub fn unset(&mut self, name: &str) {
        for scope in self.stack.iter_mut().rev() {
            if scope.vars.remove(name).is_some() {
                return;
            }
        }
    }

    /// All visible bindings, outer scopes first so shadowing wins on
    /// collision. Used to synthesize child environments.
    pub fn visible(&self) -> HashMap<&str, &str> {
        let mut out = HashMap::new();
        for scope in &self.stack {
            for (k, v) in &scope.vars {
                out.insert(k.as_str(), v.as_str());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_scope_cannot_be_popped() {
        let mut scopes = ScopeManager::new();
        assert!(scopes.pop_scope().is_err());
        scopes.push_scope("f");
        assert!(scopes.pop_scope().is_ok());
        assert!(scopes.pop_scope().is_err());
    }

    #[test]
    fn local_shadows_and_unshadows() {
        let mut scopes = ScopeManager::new();
        scopes.set_variable("x", "5", false);
        scopes.push_scope("f");
        scopes.create_local("x", "1").unwrap();
        assert_eq!(scopes.get("x"), Some("1"));
        scopes.pop_scope().unwrap();
        assert_eq!(scopes.get("x"), Some("5"));
    }

    #[test]
    fn plain_assignment_in_function_targets_global() {
        let mut scopes = ScopeManager::new();
        scopes.push_scope("f");
        scopes.set_variable("y", "7", false);
        scopes.pop_scope().unwrap();
        assert_eq!(scopes.get("y"), Some("7"));
    }

    #[test]
    fn assignment_updates_existing_local_in_place() {
        let mut scopes = ScopeManager::new();
        scopes.set_variable("x", "outer", false);
        scopes.push_scope("f");
        scopes.create_local("x", "inner").unwrap();
        scopes.set_variable("x", "updated", false);
        assert_eq!(scopes.get("x"), Some("updated"));
        scopes.pop_scope().unwrap();
        assert_eq!(scopes.get("x"), Some("outer"));
    }

    #[test]
    fn create_local_outside_function_is_a_usage_error() {
        let mut scopes = ScopeManager::new();
        assert!(scopes.create_local("x", "1").is_err());
    }

    #[test]
    fn unset_removes_innermost_binding_only() {
        let mut scopes = ScopeManager::new();
        scopes.set_variable("x", "outer", false);
        scopes.push_scope("f");
        scopes.create_local("x", "inner").unwrap();
        scopes.unset("x");
        assert_eq!(scopes.get("x"), Some("outer"));
    }
}
