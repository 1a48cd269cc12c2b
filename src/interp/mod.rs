//! The Rill interpreter: values, scopes, faults, and the op-stepping
//! execution engine the debugger drives.

mod eval;
mod fault;
mod scope;
mod value;

pub use eval::{
    bind_params, call_builtin, check_breakpoint, enter_call, eval_expr, is_builtin, run_code,
    run_frame, step_op, BreakpointHit, EvalCtx, FrameOutcome, StepSignal, Trap,
};
pub use fault::{CapturedCall, ChainEntry, EvalFault, EvalResult, FaultKind};
pub use scope::{Scope, ScopeRef};
pub use value::Value;
