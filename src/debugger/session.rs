//! Stored call binding sets and the session header.

use crate::interp::Value;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// The captured, ordered argument bindings of one specific call,
/// immutable once stored and correlated with its replacement expression
/// by identifier. Reclaimed only when the session is dropped.
#[derive(Debug, Clone, Serialize)]
pub struct CallBindingSet {
    pub id: Uuid,
    pub callee: String,
    pub bindings: Vec<(String, Value)>,
}

impl CallBindingSet {
    pub fn new(callee: impl Into<String>, bindings: Vec<(String, Value)>) -> Self {
        CallBindingSet {
            id: Uuid::new_v4(),
            callee: callee.into(),
            bindings,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn names(&self) -> Vec<&str> {
        self.bindings.iter().map(|(n, _)| n.as_str()).collect()
    }
}

/// Header facts the prompt surface shows above the input line: the
/// currently displayed frame and zero-or-one pending warning.
#[derive(Debug, Clone, Default)]
pub struct HeaderState {
    pub displayed: Option<String>,
    pub warning: Option<String>,
}

impl HeaderState {
    pub fn warn(&mut self, text: impl Into<String>) {
        self.warning = Some(text.into());
    }

    pub fn take_warning(&mut self) -> Option<String> {
        self.warning.take()
    }
}

/// Pure key-value store for binding sets. No expiry.
#[derive(Debug, Default)]
pub struct SessionStore {
    stashes: HashMap<Uuid, CallBindingSet>,
    pub header: HeaderState,
}

impl SessionStore {
    pub fn store(&mut self, set: CallBindingSet) -> Uuid {
        let id = set.id;
        self.stashes.insert(id, set);
        id
    }

    pub fn lookup(&self, id: &Uuid) -> Option<&CallBindingSet> {
        self.stashes.get(id)
    }

    /// Look up by the textual identifier a bind-expression carries.
    pub fn lookup_text(&self, id: &str) -> Option<&CallBindingSet> {
        let id = Uuid::parse_str(id).ok()?;
        self.stashes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.stashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stashes.is_empty()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.stashes.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_lookup() {
        let mut store = SessionStore::default();
        let set = CallBindingSet::new("f", vec![("x".into(), Value::Int(3))]);
        let id = store.store(set);
        let found = store.lookup(&id).expect("stored set is found");
        assert_eq!(found.callee, "f");
        assert_eq!(found.get("x"), Some(&Value::Int(3)));
        assert_eq!(found.get("y"), None);
    }

    #[test]
    fn test_lookup_text_rejects_garbage() {
        let store = SessionStore::default();
        assert!(store.lookup_text("not-a-uuid").is_none());
    }

    #[test]
    fn test_lookup_text_round_trip() {
        let mut store = SessionStore::default();
        let id = store.store(CallBindingSet::new("f", vec![]));
        assert!(store.lookup_text(&id.to_string()).is_some());
    }

    #[test]
    fn test_header_warning_is_taken_once() {
        let mut header = HeaderState::default();
        header.warn("something");
        assert_eq!(header.take_warning().as_deref(), Some("something"));
        assert!(header.take_warning().is_none());
    }
}
