//! Capture-and-rewrite: freeze a call's resolved arguments into a stored
//! binding set and emit a re-evaluable scope-binding expression over the
//! callee's body text.
//!
//! Buffer evaluation always runs in a fresh scope, so a fault partway
//! through leaves nothing behind; the caller keeps its draft buffer on
//! every failure path.

mod stacktrace;

pub use stacktrace::capture_stacktrace;

use crate::debugger::code::FrameCode;
use crate::debugger::program::Program;
use crate::debugger::render::History;
use crate::debugger::session::{CallBindingSet, SessionStore};
use crate::interp::{
    run_code, CapturedCall, EvalCtx, EvalFault, Scope, ScopeRef, Trap, Value,
};
use crate::parser::ast::{BindExpr, ExprKind, Stmt, StmtKind};
use crate::parser::{call_at, parse_snippet};
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Recoverable capture failures. All four are converted to a transient
/// warning at the surface boundary; nothing is retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    /// The traced call site was never reached by the preceding code.
    #[error("the call to `{0}` was never reached by the preceding code")]
    StashingFailed(String),
    /// The cursor was not over a call, or the buffer failed to parse.
    #[error("{0}")]
    ParseOrStep(String),
    /// Evaluating the preceding code faulted before the target call.
    #[error("evaluating the buffer failed: {fault} (while running `{text}`)")]
    Eval { fault: EvalFault, text: String },
    /// The callee has no retrievable source body.
    #[error("no source body is available for `{0}`")]
    DefMissing(String),
}

/// The emitted scope-binding expression plus the identifiers the surface
/// needs to correlate it.
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    pub text: String,
    pub stash_id: Uuid,
    pub callee: String,
}

/// Capture the call under the cursor: resolve its arguments by running
/// the buffer up to the call, stash them, and emit the replacement
/// expression wrapping the callee's body verbatim.
pub fn capture_call(
    program: &Program,
    store: &mut SessionStore,
    history: &mut dyn History,
    text: &str,
    cursor: usize,
) -> Result<Replacement, CaptureError> {
    let stmts = parse_snippet(text)
        .map_err(|e| CaptureError::ParseOrStep(format!("could not parse the buffer: {e}")))?;
    let call = call_at(&stmts, cursor).ok_or_else(|| {
        CaptureError::ParseOrStep("the cursor is not inside a call expression".to_string())
    })?;
    let span = call.span;
    let captured = run_trapped(program, store, &stmts, text, Trap::CallSpan(span))?;
    build_replacement(program, store, history, captured)
}

/// Evaluate a buffer to its value, with bind-expressions honored at the
/// top level.
pub fn eval_buffer(
    program: &Program,
    store: &SessionStore,
    text: &str,
) -> Result<Value, CaptureError> {
    let stmts = parse_snippet(text)
        .map_err(|e| CaptureError::ParseOrStep(format!("could not parse the buffer: {e}")))?;
    run_buffer(program, store, &stmts, text, None).map_err(|fault| CaptureError::Eval {
        fault,
        text: text.to_string(),
    })
}

/// A buffer is either a sole bind-expression over stored bindings or a
/// plain statement sequence; either way it becomes code plus a seed
/// scope a navigator or evaluation can run.
pub(crate) fn instantiate(
    store: &SessionStore,
    stmts: &[Stmt],
    text: &str,
) -> Result<(Rc<FrameCode>, ScopeRef), EvalFault> {
    if let Some(bind) = sole_bind(stmts) {
        let set = store
            .lookup_text(&bind.stash_id)
            .ok_or_else(|| EvalFault::stash_missing(&bind.stash_id))?;
        let scope = Scope::root();
        for name in &bind.names {
            let value = set
                .get(name)
                .ok_or_else(|| EvalFault::bind_mismatch(name, &set.callee))?;
            scope.borrow_mut().define(name.clone(), value.clone());
        }
        let code = FrameCode::lower(set.callee.clone(), &bind.body.stmts, Rc::from(text));
        Ok((Rc::new(code), scope))
    } else {
        let code = FrameCode::lower("buffer", stmts, Rc::from(text));
        Ok((Rc::new(code), Scope::root()))
    }
}

fn sole_bind(stmts: &[Stmt]) -> Option<&BindExpr> {
    let [stmt] = stmts else {
        return None;
    };
    let (StmtKind::Tail(expr) | StmtKind::Expr(expr)) = &stmt.kind else {
        return None;
    };
    match &expr.kind {
        ExprKind::Bind(bind) => Some(bind),
        _ => None,
    }
}

pub(crate) fn run_buffer(
    program: &Program,
    store: &SessionStore,
    stmts: &[Stmt],
    text: &str,
    trap: Option<Trap>,
) -> Result<Value, EvalFault> {
    let (code, scope) = instantiate(store, stmts, text)?;
    let mut ctx = EvalCtx::new(program);
    ctx.trap = trap;
    run_code(code, scope, &mut ctx)
}

/// Run a buffer under a trap and hand back the interception. Completing
/// without reaching the trap means the surrounding code path never made
/// the call.
pub(crate) fn run_trapped(
    program: &Program,
    store: &SessionStore,
    stmts: &[Stmt],
    text: &str,
    trap: Trap,
) -> Result<CapturedCall, CaptureError> {
    match run_buffer(program, store, stmts, text, Some(trap)) {
        Ok(_) => Err(CaptureError::StashingFailed(describe_trap(&trap, stmts))),
        Err(fault) if fault.is_trap() => fault.into_captured().map_err(|fault| {
            CaptureError::Eval {
                fault,
                text: text.to_string(),
            }
        }),
        Err(fault) => Err(CaptureError::Eval {
            fault,
            text: text.to_string(),
        }),
    }
}

fn describe_trap(trap: &Trap, stmts: &[Stmt]) -> String {
    if let Trap::CallSpan(span) = trap {
        if let Some(expr) = call_at(stmts, span.start) {
            if let ExprKind::Call(call) = &expr.kind {
                return call.callee.clone();
            }
        }
    }
    "the traced call".to_string()
}

/// Steps (3)-(5): resolve the callee's body text, stash the binding set
/// under a fresh identifier, emit the bind-expression, and append it to
/// history.
pub(crate) fn build_replacement(
    program: &Program,
    store: &mut SessionStore,
    history: &mut dyn History,
    captured: CapturedCall,
) -> Result<Replacement, CaptureError> {
    let Some(info) = &captured.info else {
        return Err(CaptureError::DefMissing(captured.callee));
    };
    let body = program.body_text(info).trim_matches('\n');
    let set = CallBindingSet::new(captured.callee.clone(), captured.bindings);
    let names = set.names().join(", ");
    let stash_id = set.id;
    let text = format!("bind \"{stash_id}\" ({names}) {{\n{body}\n}}");
    debug!(%stash_id, callee = %set.callee, "binding set stashed");
    store.store(set);
    history.record(&text);
    Ok(Replacement {
        text,
        stash_id,
        callee: captured.callee,
    })
}
