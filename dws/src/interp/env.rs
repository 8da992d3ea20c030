//! Environment for variable bindings
//!
//! Names are case-insensitive: every key goes through [`normalize`].

use super::Value;
use crate::util::normalize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared reference to an environment
pub type EnvRef = Rc<RefCell<Environment>>;

/// Environment holding variable bindings
#[derive(Debug, Clone)]
pub struct Environment {
    /// Variable bindings in this scope, keyed by normalized name
    bindings: HashMap<String, Value>,
    /// Parent environment for lexical scoping
    parent: Option<EnvRef>,
}

impl Environment {
    /// Create a new global environment
    pub fn new() -> Self {
        Environment {
            bindings: HashMap::new(),
            parent: None,
        }
    }

    /// Create a new environment with a parent
    pub fn with_parent(parent: EnvRef) -> Self {
        Environment {
            bindings: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Wrap in Rc<RefCell<>>
    pub fn into_ref(self) -> EnvRef {
        Rc::new(RefCell::new(self))
    }

    /// The root scope has no parent
    pub fn is_global(&self) -> bool {
        self.parent.is_none()
    }

    /// Define a new variable in the current scope
    pub fn define(&mut self, name: &str, value: Value) {
        self.bindings.insert(normalize(name), value);
    }

    /// Look up a variable in the scope chain
    pub fn get(&self, name: &str) -> Option<Value> {
        self.lookup(&normalize(name)).map(|(v, _)| v)
    }

    /// Look up a variable, also reporting whether it was found in the
    /// global scope
    pub fn get_scoped(&self, name: &str) -> Option<(Value, bool)> {
        self.lookup(&normalize(name))
    }

    fn lookup(&self, key: &str) -> Option<(Value, bool)> {
        if let Some(value) = self.bindings.get(key) {
            Some((value.clone(), self.parent.is_none()))
        } else if let Some(parent) = &self.parent {
            parent.borrow().lookup(key)
        } else {
            None
        }
    }

    /// Binding in this scope only
    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.bindings.get(&normalize(name)).cloned()
    }

    /// Set/update a variable in the scope chain
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        self.assign(&normalize(name), value)
    }

    fn assign(&mut self, key: &str, value: Value) -> bool {
        if let Some(slot) = self.bindings.get_mut(key) {
            *slot = value;
            true
        } else if let Some(parent) = &self.parent {
            parent.borrow_mut().assign(key, value)
        } else {
            false
        }
    }

    /// Check if a variable exists in the scope chain
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(&normalize(name)).is_some()
    }

    /// Get all bindings (for debugging and the REPL)
    pub fn bindings(&self) -> &HashMap<String, Value> {
        &self.bindings
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a child environment from a parent reference
pub fn child_env(parent: &EnvRef) -> EnvRef {
    Environment::with_parent(Rc::clone(parent)).into_ref()
}

/// The scope in the chain that holds `name`
pub fn owner_of(env: &EnvRef, name: &str) -> Option<EnvRef> {
    let key = normalize(name);
    let mut current = Rc::clone(env);
    loop {
        let next = {
            let scope = current.borrow();
            if scope.bindings.contains_key(&key) {
                None
            } else {
                match &scope.parent {
                    Some(parent) => Some(Rc::clone(parent)),
                    None => return None,
                }
            }
        };
        match next {
            Some(parent) => current = parent,
            None => return Some(current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_get() {
        let mut env = Environment::new();
        env.define("x", Value::Int(42));
        assert_eq!(env.get("x"), Some(Value::Int(42)));
        assert_eq!(env.get("y"), None);
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let mut env = Environment::new();
        env.define("Counter", Value::Int(1));
        assert_eq!(env.get("COUNTER"), Some(Value::Int(1)));
        assert!(env.set("counter", Value::Int(2)));
        assert_eq!(env.get("Counter"), Some(Value::Int(2)));
    }

    #[test]
    fn test_scope_chain() {
        let parent = Environment::new().into_ref();
        parent.borrow_mut().define("x", Value::Int(1));

        let child = child_env(&parent);
        child.borrow_mut().define("y", Value::Int(2));

        assert_eq!(child.borrow().get("x"), Some(Value::Int(1)));
        assert_eq!(child.borrow().get("y"), Some(Value::Int(2)));
        assert_eq!(parent.borrow().get("y"), None);
    }

    #[test]
    fn test_get_scoped_reports_global() {
        let global = Environment::new().into_ref();
        global.borrow_mut().define("g", Value::Int(1));
        let local = child_env(&global);
        local.borrow_mut().define("l", Value::Int(2));

        assert_eq!(local.borrow().get_scoped("g"), Some((Value::Int(1), true)));
        assert_eq!(local.borrow().get_scoped("l"), Some((Value::Int(2), false)));
    }

    #[test]
    fn test_shadowing() {
        let parent = Environment::new().into_ref();
        parent.borrow_mut().define("x", Value::Int(1));

        let child = child_env(&parent);
        child.borrow_mut().define("x", Value::Int(2));

        assert_eq!(child.borrow().get("x"), Some(Value::Int(2)));
        assert_eq!(parent.borrow().get("x"), Some(Value::Int(1)));
    }

    #[test]
    fn test_set_nonexistent_variable() {
        let mut env = Environment::new();
        assert!(!env.set("x", Value::Int(1)));
    }

    #[test]
    fn test_set_in_parent_scope() {
        let parent = Environment::new().into_ref();
        parent.borrow_mut().define("x", Value::Int(1));

        let child = child_env(&parent);
        assert!(child.borrow_mut().set("x", Value::Int(99)));
        assert_eq!(parent.borrow().get("x"), Some(Value::Int(99)));
    }

    #[test]
    fn test_owner_of() {
        let parent = Environment::new().into_ref();
        parent.borrow_mut().define("x", Value::Int(1));
        let child = child_env(&parent);

        let owner = owner_of(&child, "X");
        assert!(owner.is_some_and(|o| Rc::ptr_eq(&o, &parent)));
        assert!(owner_of(&child, "missing").is_none());
    }
}
