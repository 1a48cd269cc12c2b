//! Per-code breakpoint state keyed by op index.

use crate::parser::ast::Expr;
use std::collections::BTreeMap;

/// A breakpoint condition: the parsed predicate plus the raw text it was
/// parsed from, kept for display.
#[derive(Debug, Clone)]
pub struct Condition {
    pub text: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, Default)]
pub struct Breakpoint {
    pub active: bool,
    pub condition: Option<Condition>,
}

impl Breakpoint {
    /// An inactive, condition-free breakpoint is equivalent to absence.
    pub fn is_material(&self) -> bool {
        self.active || self.condition.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleMode {
    Remove,
    Disable,
    Enable,
}

#[derive(Debug, Default)]
pub struct BreakpointTable {
    slots: BTreeMap<usize, Breakpoint>,
}

impl BreakpointTable {
    /// Install an active breakpoint at an op index.
    pub fn set(&mut self, index: usize, condition: Option<Condition>) {
        self.slots.insert(
            index,
            Breakpoint {
                active: true,
                condition,
            },
        );
    }

    /// The materially set breakpoint at `index`, if any.
    pub fn at(&self, index: usize) -> Option<&Breakpoint> {
        self.slots.get(&index).filter(|bp| bp.is_material())
    }

    /// Apply a toggle mode over an inclusive index range. Only existing,
    /// materially set breakpoints are touched; all operations are
    /// idempotent.
    pub fn toggle_range(&mut self, lo: usize, hi: usize, mode: ToggleMode) -> usize {
        let mut touched = 0;
        for index in lo..=hi {
            let material = self.slots.get(&index).is_some_and(|bp| bp.is_material());
            if !material {
                continue;
            }
            touched += 1;
            match mode {
                ToggleMode::Remove => {
                    self.slots.remove(&index);
                }
                ToggleMode::Disable => {
                    if let Some(bp) = self.slots.get_mut(&index) {
                        bp.active = false;
                    }
                }
                ToggleMode::Enable => {
                    if let Some(bp) = self.slots.get_mut(&index) {
                        bp.active = true;
                    }
                }
            }
        }
        self.prune();
        touched
    }

    /// Indices carrying a materially set breakpoint.
    pub fn indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|(_, bp)| bp.is_material())
            .map(|(idx, _)| *idx)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.values().all(|bp| !bp.is_material())
    }

    // Immaterial entries behave as absent everywhere; drop them so the
    // table stays observably equal to one that never held them.
    fn prune(&mut self) {
        self.slots.retain(|_, bp| bp.is_material());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expr_text;

    fn cond(text: &str) -> Condition {
        Condition {
            text: text.to_string(),
            expr: parse_expr_text(text).expect("condition should parse"),
        }
    }

    #[test]
    fn test_set_and_at() {
        let mut table = BreakpointTable::default();
        table.set(4, None);
        assert!(table.at(4).is_some());
        assert!(table.at(5).is_none());
    }

    #[test]
    fn test_enable_touches_only_material_entries() {
        let mut table = BreakpointTable::default();
        // Range [5, 7] with an existing, disabled breakpoint at 6 only.
        table.set(6, None);
        table.toggle_range(6, 6, ToggleMode::Disable);
        // Disabling an unconditional breakpoint removes its last material
        // trace, so re-seed with a condition to keep it material.
        table.set(6, Some(cond("x > 0")));
        table.toggle_range(6, 6, ToggleMode::Disable);

        table.toggle_range(5, 7, ToggleMode::Enable);
        assert!(table.at(5).is_none(), "index 5 had no breakpoint");
        assert!(table.at(7).is_none(), "index 7 had no breakpoint");
        let bp = table.at(6).expect("index 6 keeps its breakpoint");
        assert!(bp.active);
    }

    #[test]
    fn test_toggle_idempotence() {
        let mut table = BreakpointTable::default();
        table.set(3, Some(cond("n == 2")));

        table.toggle_range(3, 3, ToggleMode::Disable);
        let once = table.at(3).expect("still material").active;
        table.toggle_range(3, 3, ToggleMode::Disable);
        let twice = table.at(3).expect("still material").active;
        assert_eq!(once, twice);
        assert!(!twice);

        table.toggle_range(3, 3, ToggleMode::Enable);
        table.toggle_range(3, 3, ToggleMode::Enable);
        assert!(table.at(3).expect("still material").active);

        table.toggle_range(3, 3, ToggleMode::Remove);
        table.toggle_range(3, 3, ToggleMode::Remove);
        assert!(table.at(3).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_disabled_unconditional_equals_absent() {
        let mut table = BreakpointTable::default();
        table.set(2, None);
        table.toggle_range(2, 2, ToggleMode::Disable);
        assert!(table.at(2).is_none());
        assert!(table.indices().is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_set_is_idempotent_for_repeat_set() {
        let mut table = BreakpointTable::default();
        table.set(1, None);
        table.set(1, None);
        assert_eq!(table.indices(), vec![1]);
    }
}
