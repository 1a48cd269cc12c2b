//! Lexical scopes: a chain of shared, mutable binding maps.

use super::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type ScopeRef = Rc<RefCell<Scope>>;

#[derive(Debug, Default)]
pub struct Scope {
    bindings: HashMap<String, Value>,
    parent: Option<ScopeRef>,
}

impl Scope {
    pub fn root() -> ScopeRef {
        Rc::new(RefCell::new(Scope::default()))
    }

    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            bindings: HashMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    /// Introduce or shadow a binding in this scope.
    pub fn define(&mut self, name: String, value: Value) {
        self.bindings.insert(name, value);
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.bindings.get(name) {
            Some(v.clone())
        } else if let Some(parent) = &self.parent {
            parent.borrow().lookup(name)
        } else {
            None
        }
    }

    /// Update the nearest existing binding. Returns false if `name` is
    /// bound nowhere in the chain.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if self.bindings.contains_key(name) {
            self.bindings.insert(name.to_string(), value);
            true
        } else if let Some(parent) = &self.parent {
            parent.borrow_mut().assign(name, value)
        } else {
            false
        }
    }

    /// All visible bindings, innermost shadowing outer, sorted by name.
    /// Lowering temporaries (names starting with `%`) are skipped.
    pub fn flatten(&self) -> Vec<(String, Value)> {
        let mut out: HashMap<String, Value> = HashMap::new();
        self.collect(&mut out);
        let mut pairs: Vec<_> = out
            .into_iter()
            .filter(|(name, _)| !name.starts_with('%'))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }

    fn collect(&self, out: &mut HashMap<String, Value>) {
        if let Some(parent) = &self.parent {
            parent.borrow().collect(out);
        }
        for (k, v) in &self.bindings {
            out.insert(k.clone(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_lookup() {
        let scope = Scope::root();
        scope.borrow_mut().define("x".into(), Value::Int(1));
        assert_eq!(scope.borrow().lookup("x"), Some(Value::Int(1)));
        assert_eq!(scope.borrow().lookup("y"), None);
    }

    #[test]
    fn test_chain_and_shadowing() {
        let outer = Scope::root();
        outer.borrow_mut().define("x".into(), Value::Int(1));
        let inner = Scope::child(&outer);
        assert_eq!(inner.borrow().lookup("x"), Some(Value::Int(1)));

        inner.borrow_mut().define("x".into(), Value::Int(2));
        assert_eq!(inner.borrow().lookup("x"), Some(Value::Int(2)));
        assert_eq!(outer.borrow().lookup("x"), Some(Value::Int(1)));
    }

    #[test]
    fn test_assign_updates_nearest() {
        let outer = Scope::root();
        outer.borrow_mut().define("x".into(), Value::Int(1));
        let inner = Scope::child(&outer);
        assert!(inner.borrow_mut().assign("x", Value::Int(9)));
        assert_eq!(outer.borrow().lookup("x"), Some(Value::Int(9)));
        assert!(!inner.borrow_mut().assign("missing", Value::Unit));
    }

    #[test]
    fn test_flatten_hides_temporaries() {
        let outer = Scope::root();
        outer.borrow_mut().define("a".into(), Value::Int(1));
        let inner = Scope::child(&outer);
        inner.borrow_mut().define("%t0".into(), Value::Int(5));
        inner.borrow_mut().define("a".into(), Value::Int(2));
        inner.borrow_mut().define("b".into(), Value::Int(3));
        let flat = inner.borrow().flatten();
        assert_eq!(
            flat,
            vec![
                ("a".to_string(), Value::Int(2)),
                ("b".to_string(), Value::Int(3)),
            ]
        );
    }
}
