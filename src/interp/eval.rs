//! The execution engine: evaluates call-free expressions and drives
//! frames op by op. Calls are executed by pushing a child frame and
//! running it; a trap can intercept a specific call after its arguments
//! are resolved, and armed breakpoints can pause execution at any depth.

use super::fault::{CapturedCall, EvalFault, EvalResult};
use super::scope::{Scope, ScopeRef};
use super::value::Value;
use crate::debugger::code::{FrameCode, Op};
use crate::debugger::frame::Frame;
use crate::debugger::program::{FnInfo, Program};
use crate::parser::ast::{Arg, BinOp, Expr, ExprKind, Span, UnaryOp};
use std::rc::Rc;

/// Interception point for a trapped evaluation: a call site by span
/// within the evaluated buffer, or the n-th call made during the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    CallSpan(Span),
    CallSeq(u32),
}

pub struct EvalCtx<'a> {
    pub program: &'a Program,
    pub trap: Option<Trap>,
    /// When set, frames consult their breakpoint tables while running.
    pub breakpoints_armed: bool,
    call_seq: u32,
}

impl<'a> EvalCtx<'a> {
    pub fn new(program: &'a Program) -> Self {
        EvalCtx {
            program,
            trap: None,
            breakpoints_armed: false,
            call_seq: 0,
        }
    }

    pub fn with_trap(program: &'a Program, trap: Trap) -> Self {
        EvalCtx {
            trap: Some(trap),
            ..EvalCtx::new(program)
        }
    }

    pub fn stepping(program: &'a Program) -> Self {
        EvalCtx {
            breakpoints_armed: true,
            ..EvalCtx::new(program)
        }
    }
}

/// Why a breakpoint matched. A faulting condition matches deliberately
/// (fail-open) so the operator can inspect the fault.
#[derive(Debug, Clone)]
pub struct BreakpointHit {
    pub condition_fault: Option<EvalFault>,
}

pub enum StepSignal {
    Advanced,
    Returned(Value),
    /// Execution paused inside a callee: the materialized descendant
    /// frames, outermost first, innermost being the paused one.
    Paused {
        frames: Vec<Frame>,
        hit: BreakpointHit,
    },
}

pub enum FrameOutcome {
    Returned(Value),
    /// Paused at a breakpoint. `frames` are descendants of the frame
    /// being run (empty when it paused at its own statement).
    Hit {
        frames: Vec<Frame>,
        hit: BreakpointHit,
    },
}

/// Consult the frame's breakpoint table at its current op.
pub fn check_breakpoint(frame: &Frame, ctx: &mut EvalCtx) -> Option<BreakpointHit> {
    let bp = frame.code.breakpoints().at(frame.pc).cloned()?;
    if !bp.active {
        return None;
    }
    match &bp.condition {
        None => Some(BreakpointHit {
            condition_fault: None,
        }),
        Some(cond) => match eval_expr(&cond.expr, &frame.scope, ctx) {
            Ok(v) if v.is_truthy() => Some(BreakpointHit {
                condition_fault: None,
            }),
            Ok(_) => None,
            Err(fault) => Some(BreakpointHit {
                condition_fault: Some(fault),
            }),
        },
    }
}

/// Run a frame until it returns or pauses at a breakpoint. Pass
/// `skip_first_check` when resuming from a stop at the current op so the
/// same breakpoint does not immediately re-fire.
pub fn run_frame(
    frame: &mut Frame,
    ctx: &mut EvalCtx,
    mut skip_first_check: bool,
) -> EvalResult<FrameOutcome> {
    loop {
        if ctx.breakpoints_armed && !skip_first_check {
            if let Some(hit) = check_breakpoint(frame, ctx) {
                return Ok(FrameOutcome::Hit {
                    frames: Vec::new(),
                    hit,
                });
            }
        }
        skip_first_check = false;
        match step_op(frame, ctx)? {
            StepSignal::Advanced => {}
            StepSignal::Returned(v) => return Ok(FrameOutcome::Returned(v)),
            StepSignal::Paused { frames, hit } => {
                return Ok(FrameOutcome::Hit { frames, hit })
            }
        }
    }
}

/// Execute exactly one op of `frame`. A `Call` op runs its callee to
/// completion unless a breakpoint pauses it partway.
pub fn step_op(frame: &mut Frame, ctx: &mut EvalCtx) -> EvalResult<StepSignal> {
    let Some(op) = frame.current_op().cloned() else {
        return Ok(StepSignal::Returned(Value::Unit));
    };
    match op {
        Op::Assign { dst, value } => {
            let v = eval_expr(&value, &frame.scope, ctx)?;
            frame.store(&dst, v)?;
            frame.pc += 1;
            Ok(StepSignal::Advanced)
        }
        Op::Branch { cond, on_false } => {
            let v = eval_expr(&cond, &frame.scope, ctx)?;
            frame.pc = if v.is_truthy() { frame.pc + 1 } else { on_false };
            Ok(StepSignal::Advanced)
        }
        Op::Jump { target } => {
            frame.pc = target;
            Ok(StepSignal::Advanced)
        }
        Op::Return { value } => {
            let v = match value {
                Some(e) => eval_expr(&e, &frame.scope, ctx)?,
                None => Value::Unit,
            };
            Ok(StepSignal::Returned(v))
        }
        Op::Call {
            dst,
            callee,
            args,
            span,
        } => {
            let (pos, kw) = eval_args(&args, &frame.scope, ctx)?;
            ctx.call_seq += 1;
            let seq = ctx.call_seq;
            let info = ctx.program.function(&callee).map(Rc::clone);

            let trapped = match ctx.trap {
                Some(Trap::CallSpan(s)) => s == span,
                Some(Trap::CallSeq(n)) => n == seq,
                None => false,
            };
            if trapped {
                let bindings = match &info {
                    Some(info) => bind_params(info, pos, kw, ctx)?,
                    None if is_builtin(&callee) => Vec::new(),
                    None => return Err(EvalFault::undefined_function(&callee)),
                };
                return Err(EvalFault::trapped(CapturedCall {
                    callee,
                    info,
                    bindings,
                }));
            }

            match info {
                Some(info) => {
                    let bindings = bind_params(&info, pos, kw, ctx)?;
                    let mut child = Frame::enter(Rc::clone(&info.code), bindings);
                    let outcome = run_frame(&mut child, ctx, false)
                        .map_err(|f| f.through_call(&callee, seq))?;
                    match outcome {
                        FrameOutcome::Returned(v) => {
                            frame.store(&dst, v)?;
                            frame.pc += 1;
                            Ok(StepSignal::Advanced)
                        }
                        FrameOutcome::Hit { mut frames, hit } => {
                            frame.awaiting_call = true;
                            frames.insert(0, child);
                            Ok(StepSignal::Paused { frames, hit })
                        }
                    }
                }
                None => {
                    if let Some((name, _)) = kw.first() {
                        return Err(EvalFault::unknown_keyword(&callee, name));
                    }
                    let v = call_builtin(&callee, pos)
                        .map_err(|f| f.through_call(&callee, seq))?;
                    frame.store(&dst, v)?;
                    frame.pc += 1;
                    Ok(StepSignal::Advanced)
                }
            }
        }
    }
}

/// Prepare entry into the user call at the frame's current op, for an
/// explicit step-in. Returns `None` when the op is not an enterable
/// call (not a call, or a builtin without a body).
pub fn enter_call(frame: &mut Frame, ctx: &mut EvalCtx) -> EvalResult<Option<Frame>> {
    let Some(Op::Call { callee, args, .. }) = frame.current_op().cloned() else {
        return Ok(None);
    };
    let Some(info) = ctx.program.function(&callee).map(Rc::clone) else {
        return Ok(None);
    };
    let (pos, kw) = eval_args(&args, &frame.scope, ctx)?;
    ctx.call_seq += 1;
    let bindings = bind_params(&info, pos, kw, ctx)?;
    let child = Frame::enter(Rc::clone(&info.code), bindings);
    frame.awaiting_call = true;
    Ok(Some(child))
}

/// Run lowered code non-interactively and hand back its value.
pub fn run_code(code: Rc<FrameCode>, scope: ScopeRef, ctx: &mut EvalCtx) -> EvalResult<Value> {
    let mut frame = Frame::new(code, scope);
    match run_frame(&mut frame, ctx, false)? {
        FrameOutcome::Returned(v) => Ok(v),
        // Unreachable without armed breakpoints.
        FrameOutcome::Hit { .. } => Ok(Value::Unit),
    }
}

fn eval_args(
    args: &[Arg],
    scope: &ScopeRef,
    ctx: &mut EvalCtx,
) -> EvalResult<(Vec<Value>, Vec<(String, Value)>)> {
    let mut pos = Vec::new();
    let mut kw = Vec::new();
    for arg in args {
        let v = eval_expr(&arg.value, scope, ctx)?;
        match &arg.name {
            Some(name) => kw.push((name.clone(), v)),
            None => pos.push(v),
        }
    }
    Ok((pos, kw))
}

/// Resolve a call's full bindings: positionals fill parameters in order,
/// keywords fill by name, remaining defaults evaluate left to right with
/// earlier parameters in scope.
pub fn bind_params(
    info: &FnInfo,
    pos: Vec<Value>,
    kw: Vec<(String, Value)>,
    ctx: &mut EvalCtx,
) -> EvalResult<Vec<(String, Value)>> {
    if pos.len() > info.params.len() {
        return Err(EvalFault::arity(&info.name, info.params.len(), pos.len()));
    }
    let mut slots: Vec<Option<Value>> = pos.into_iter().map(Some).collect();
    slots.resize(info.params.len(), None);
    for (name, v) in kw {
        let Some(idx) = info.params.iter().position(|p| p.name == name) else {
            return Err(EvalFault::unknown_keyword(&info.name, &name));
        };
        if slots[idx].is_some() {
            return Err(EvalFault::duplicate_argument(&info.name, &name));
        }
        slots[idx] = Some(v);
    }
    let scope = Scope::root();
    let mut out = Vec::with_capacity(info.params.len());
    for (slot, param) in slots.into_iter().zip(&info.params) {
        let v = match slot {
            Some(v) => v,
            None => match &param.default {
                Some(default) => eval_expr(default, &scope, ctx)?,
                None => return Err(EvalFault::missing_argument(&info.name, &param.name)),
            },
        };
        scope.borrow_mut().define(param.name.clone(), v.clone());
        out.push((param.name.clone(), v));
    }
    Ok(out)
}

/// Evaluate a call-free expression in a scope. Lowering hoists calls out
/// of expressions, so a call here is either a breakpoint condition doing
/// something unsupported or a bind-expression outside the top level;
/// both fault.
pub fn eval_expr(expr: &Expr, scope: &ScopeRef, ctx: &mut EvalCtx) -> EvalResult<Value> {
    match &expr.kind {
        ExprKind::Int(n) => Ok(Value::Int(*n)),
        ExprKind::Float(x) => Ok(Value::Float(*x)),
        ExprKind::Bool(b) => Ok(Value::Bool(*b)),
        ExprKind::Str(s) => Ok(Value::Str(s.clone())),
        ExprKind::Var(name) => scope
            .borrow()
            .lookup(name)
            .ok_or_else(|| EvalFault::undefined_variable(name)),
        ExprKind::Unary { op, rhs } => {
            let v = eval_expr(rhs, scope, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                UnaryOp::Neg => match v {
                    Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
                    Value::Float(x) => Ok(Value::Float(-x)),
                    other => Err(EvalFault::type_error("a number", other.type_name())),
                },
            }
        }
        ExprKind::Binary { op, lhs, rhs } => match op {
            // Short-circuit forms yield the deciding operand.
            BinOp::And => {
                let l = eval_expr(lhs, scope, ctx)?;
                if l.is_truthy() {
                    eval_expr(rhs, scope, ctx)
                } else {
                    Ok(l)
                }
            }
            BinOp::Or => {
                let l = eval_expr(lhs, scope, ctx)?;
                if l.is_truthy() {
                    Ok(l)
                } else {
                    eval_expr(rhs, scope, ctx)
                }
            }
            _ => {
                let l = eval_expr(lhs, scope, ctx)?;
                let r = eval_expr(rhs, scope, ctx)?;
                eval_binary(*op, l, r)
            }
        },
        ExprKind::Call(call) => Err(EvalFault::unsupported(format!(
            "call to `{}` is not supported in this context",
            call.callee
        ))),
        ExprKind::Bind(_) => Err(EvalFault::unsupported(
            "a bind expression is only valid at the top level of a submitted buffer",
        )),
    }
}

fn eval_binary(op: BinOp, l: Value, r: Value) -> EvalResult<Value> {
    match op {
        BinOp::Eq => Ok(Value::Bool(l == r)),
        BinOp::Ne => Ok(Value::Bool(l != r)),
        BinOp::Add => match (&l, &r) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            _ => numeric(op, &l, &r),
        },
        BinOp::Sub | BinOp::Mul => match (&l, &r) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(match op {
                BinOp::Sub => a.wrapping_sub(*b),
                _ => a.wrapping_mul(*b),
            })),
            _ => numeric(op, &l, &r),
        },
        BinOp::Div | BinOp::Rem => match (&l, &r) {
            (Value::Int(_), Value::Int(0)) => Err(EvalFault::division_by_zero()),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(match op {
                BinOp::Div => a.wrapping_div(*b),
                _ => a.wrapping_rem(*b),
            })),
            _ => numeric(op, &l, &r),
        },
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => compare(op, &l, &r),
        BinOp::And | BinOp::Or => unreachable!("short-circuit ops are handled by eval_expr"),
    }
}

fn numeric(op: BinOp, l: &Value, r: &Value) -> EvalResult<Value> {
    let (Some(a), Some(b)) = (l.as_number(), r.as_number()) else {
        return Err(EvalFault::type_error(
            "numeric operands",
            if l.as_number().is_none() {
                l.type_name()
            } else {
                r.type_name()
            },
        ));
    };
    let v = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
        _ => return Err(EvalFault::type_error("numeric operands", "incomparable")),
    };
    Ok(Value::Float(v))
}

fn compare(op: BinOp, l: &Value, r: &Value) -> EvalResult<Value> {
    let ordering = match (l, r) {
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        _ => match (l.as_number(), r.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(EvalFault::type_error(
                    "comparable operands",
                    &format!("{} and {}", l.type_name(), r.type_name()),
                ))
            }
        },
    };
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        BinOp::Ge => ordering.is_ge(),
        _ => false,
    };
    Ok(Value::Bool(result))
}

pub fn is_builtin(name: &str) -> bool {
    matches!(name, "print" | "len" | "abs" | "str" | "fail")
}

/// Builtins have no retrievable source body; they are the canonical
/// producers of the missing-definition capture failure.
pub fn call_builtin(name: &str, args: Vec<Value>) -> EvalResult<Value> {
    let arity = |expected: usize| -> EvalResult<()> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(EvalFault::arity(name, expected, args.len()))
        }
    };
    match name {
        "print" => {
            let text: Vec<String> = args.iter().map(|v| v.to_string()).collect();
            println!("{}", text.join(" "));
            Ok(Value::Unit)
        }
        "len" => {
            arity(1)?;
            match &args[0] {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(EvalFault::type_error("str", other.type_name())),
            }
        }
        "abs" => {
            arity(1)?;
            match &args[0] {
                Value::Int(n) => Ok(Value::Int(n.wrapping_abs())),
                Value::Float(x) => Ok(Value::Float(x.abs())),
                other => Err(EvalFault::type_error("a number", other.type_name())),
            }
        }
        "str" => {
            arity(1)?;
            Ok(Value::Str(args[0].to_string()))
        }
        "fail" => {
            arity(1)?;
            Err(EvalFault::raised(args[0].to_string()))
        }
        other => Err(EvalFault::undefined_function(other)),
    }
}
