//! Evaluation faults and the call-chain records they carry.

use super::Value;
use crate::debugger::program::FnInfo;
use std::rc::Rc;
use thiserror::Error;

/// One level of the call chain active when a fault was raised. `seq` is
/// the call's sequence number within its evaluation, used to re-trap the
/// same call on a deterministic re-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    pub callee: String,
    pub seq: u32,
}

/// A call intercepted by a trap: the resolved callee and its fully
/// promoted argument bindings (defaults and keywords applied).
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub callee: String,
    pub info: Option<Rc<FnInfo>>,
    pub bindings: Vec<(String, Value)>,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EvalFault {
    pub kind: FaultKind,
    pub message: String,
    /// Calls the fault unwound through, innermost first.
    chain: Vec<ChainEntry>,
}

#[derive(Debug, Clone)]
pub enum FaultKind {
    UndefinedVariable,
    UndefinedFunction,
    TypeError,
    DivisionByZero,
    Arity,
    Keyword,
    Unsupported,
    Raised,
    StashMissing,
    BindMismatch,
    /// Not a real fault: a trap fired and interception unwinds through
    /// the error channel.
    Trapped(Box<CapturedCall>),
}

impl PartialEq for FaultKind {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl PartialEq for EvalFault {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl EvalFault {
    fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        EvalFault {
            kind,
            message: message.into(),
            chain: Vec::new(),
        }
    }

    pub fn undefined_variable(name: &str) -> Self {
        Self::new(
            FaultKind::UndefinedVariable,
            format!("undefined variable `{name}`"),
        )
    }

    pub fn undefined_function(name: &str) -> Self {
        Self::new(
            FaultKind::UndefinedFunction,
            format!("undefined function `{name}`"),
        )
    }

    pub fn type_error(expected: &str, got: &str) -> Self {
        Self::new(
            FaultKind::TypeError,
            format!("type error: expected {expected}, got {got}"),
        )
    }

    pub fn division_by_zero() -> Self {
        Self::new(FaultKind::DivisionByZero, "division by zero")
    }

    pub fn arity(callee: &str, expected: usize, got: usize) -> Self {
        Self::new(
            FaultKind::Arity,
            format!("`{callee}` expects {expected} argument(s), got {got}"),
        )
    }

    pub fn missing_argument(callee: &str, param: &str) -> Self {
        Self::new(
            FaultKind::Arity,
            format!("missing argument `{param}` in call to `{callee}`"),
        )
    }

    pub fn unknown_keyword(callee: &str, name: &str) -> Self {
        Self::new(
            FaultKind::Keyword,
            format!("`{callee}` has no parameter named `{name}`"),
        )
    }

    pub fn duplicate_argument(callee: &str, name: &str) -> Self {
        Self::new(
            FaultKind::Keyword,
            format!("argument `{name}` given twice in call to `{callee}`"),
        )
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Unsupported, message)
    }

    pub fn raised(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Raised, message)
    }

    pub fn stash_missing(id: &str) -> Self {
        Self::new(
            FaultKind::StashMissing,
            format!("no stored binding set under identifier `{id}`"),
        )
    }

    pub fn bind_mismatch(name: &str, callee: &str) -> Self {
        Self::new(
            FaultKind::BindMismatch,
            format!("stored bindings for `{callee}` have no entry named `{name}`"),
        )
    }

    pub fn trapped(captured: CapturedCall) -> Self {
        let callee = captured.callee.clone();
        Self::new(
            FaultKind::Trapped(Box::new(captured)),
            format!("intercepted call to `{callee}`"),
        )
    }

    /// Record that this fault unwound through a call. Trap interceptions
    /// pass through unchanged.
    pub fn through_call(mut self, callee: &str, seq: u32) -> Self {
        if !matches!(self.kind, FaultKind::Trapped(_)) {
            self.chain.push(ChainEntry {
                callee: callee.to_string(),
                seq,
            });
        }
        self
    }

    /// The faulting call chain, outermost call first.
    pub fn call_chain(&self) -> impl Iterator<Item = &ChainEntry> {
        self.chain.iter().rev()
    }

    pub fn is_trap(&self) -> bool {
        matches!(self.kind, FaultKind::Trapped(_))
    }

    pub fn into_captured(self) -> Result<CapturedCall, EvalFault> {
        match self.kind {
            FaultKind::Trapped(captured) => Ok(*captured),
            kind => Err(EvalFault {
                kind,
                message: self.message,
                chain: self.chain,
            }),
        }
    }
}

pub type EvalResult<T> = Result<T, EvalFault>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_order_outermost_first() {
        let fault = EvalFault::division_by_zero()
            .through_call("inner", 3)
            .through_call("outer", 1);
        let chain: Vec<_> = fault.call_chain().map(|e| e.callee.as_str()).collect();
        assert_eq!(chain, vec!["outer", "inner"]);
    }

    #[test]
    fn test_trap_does_not_accumulate_chain() {
        let captured = CapturedCall {
            callee: "f".into(),
            info: None,
            bindings: Vec::new(),
        };
        let fault = EvalFault::trapped(captured).through_call("outer", 1);
        assert_eq!(fault.call_chain().count(), 0);
        assert!(fault.is_trap());
    }

    #[test]
    fn test_into_captured_round_trip() {
        let captured = CapturedCall {
            callee: "f".into(),
            info: None,
            bindings: vec![("x".into(), Value::Int(3))],
        };
        let captured = EvalFault::trapped(captured)
            .into_captured()
            .expect("trap unwraps");
        assert_eq!(captured.callee, "f");

        let err = EvalFault::division_by_zero().into_captured();
        assert!(err.is_err());
    }

    #[test]
    fn test_kind_equality_by_discriminant() {
        assert_eq!(FaultKind::TypeError, FaultKind::TypeError);
        assert_ne!(FaultKind::TypeError, FaultKind::Arity);
    }
}
