//! Flat per-callable statement code shared by every frame of one callable.
//!
//! Bodies are lowered once into a list of ops in evaluation order, with
//! calls hoisted out of expressions into dedicated `Call` ops. Stepping
//! granularity is exactly one op. The breakpoint table is the only
//! mutable substructure and must only be touched from the single
//! controlling thread.

use super::breakpoints::BreakpointTable;
use crate::parser::ast::{Arg, BinOp, Expr, ExprKind, Span, Stmt, StmtKind, UnaryOp};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

/// Where an op's value lands in the frame scope.
#[derive(Debug, Clone)]
pub enum Dst {
    /// Define (or shadow) a binding.
    Let(String),
    /// Update an existing binding; faults if undefined.
    Set(String),
    Discard,
}

#[derive(Debug, Clone)]
pub enum Op {
    /// Evaluate a call-free expression and store it.
    Assign { dst: Dst, value: Expr },
    /// Invoke a callable; the only op that can push a child frame.
    Call {
        dst: Dst,
        callee: String,
        args: Vec<Arg>,
        span: Span,
    },
    /// Fall through when the condition is truthy, jump otherwise.
    Branch { cond: Expr, on_false: usize },
    Jump { target: usize },
    Return { value: Option<Expr> },
}

/// One line-table row: op index to 1-based source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub stmt: usize,
    pub line: u32,
}

#[derive(Debug)]
pub struct FrameCode {
    pub name: String,
    /// The text this code was lowered from; line numbers index into it.
    pub source: Rc<str>,
    pub ops: Vec<Op>,
    pub line_table: Vec<LineEntry>,
    breakpoints: RefCell<BreakpointTable>,
}

impl FrameCode {
    /// Lower a statement sequence. A trailing `Tail` expression becomes
    /// the code's return value.
    pub fn lower(name: impl Into<String>, stmts: &[Stmt], source: Rc<str>) -> FrameCode {
        let fallback_line = stmts.first().map(|s| s.line).unwrap_or(1);
        let mut lowerer = Lowerer::default();
        lowerer.lower_stmts(stmts, true);
        let last_line = lowerer.lines.last().copied().unwrap_or(fallback_line);
        lowerer.push(Op::Return { value: None }, last_line);
        let line_table = lowerer
            .lines
            .iter()
            .enumerate()
            .map(|(stmt, line)| LineEntry { stmt, line: *line })
            .collect();
        FrameCode {
            name: name.into(),
            source,
            ops: lowerer.ops,
            line_table,
            breakpoints: RefCell::new(BreakpointTable::default()),
        }
    }

    pub fn line_of(&self, pc: usize) -> u32 {
        self.line_table
            .get(pc)
            .or_else(|| self.line_table.last())
            .map(|e| e.line)
            .unwrap_or(1)
    }

    /// Inclusive (first, last) source lines covered by this code.
    pub fn line_extent(&self) -> (u32, u32) {
        let mut lo = u32::MAX;
        let mut hi = 1;
        for entry in &self.line_table {
            lo = lo.min(entry.line);
            hi = hi.max(entry.line);
        }
        if lo == u32::MAX {
            (1, 1)
        } else {
            (lo, hi)
        }
    }

    pub fn source_line(&self, line: u32) -> Option<&str> {
        if line == 0 {
            return None;
        }
        self.source.lines().nth(line as usize - 1)
    }

    pub fn breakpoints(&self) -> Ref<'_, BreakpointTable> {
        self.breakpoints.borrow()
    }

    pub fn breakpoints_mut(&self) -> RefMut<'_, BreakpointTable> {
        self.breakpoints.borrow_mut()
    }

    /// Locator range for a source line, recomputed on every use.
    pub fn statement_range(&self, line: u32) -> (usize, usize) {
        statement_range(&self.line_table, line)
    }

    pub fn breakpoint_lines(&self) -> Vec<u32> {
        self.breakpoints()
            .indices()
            .into_iter()
            .map(|idx| self.line_of(idx))
            .collect()
    }
}

/// Map a source line to the contiguous op range attributable to it.
///
/// The upper bound is the first entry whose line reaches the target; the
/// lower bound is one past the first entry reaching the previous line,
/// which excludes that line's statements. If the upper-bound search lands
/// on the first entry the range collapses to the first statement. Lines
/// are not assumed monotonic: loop back-edges repeat and go backward.
pub fn statement_range(table: &[LineEntry], line: u32) -> (usize, usize) {
    if table.is_empty() {
        return (0, 0);
    }
    let ub = table.partition_point(|e| e.line < line);
    if ub == 0 {
        return (0, 0);
    }
    let hi = if ub == table.len() { table.len() - 1 } else { ub };
    let lb = table.partition_point(|e| e.line < line.saturating_sub(1));
    let lo = (lb + 1).min(hi);
    (lo, hi)
}

#[derive(Default)]
struct Lowerer {
    ops: Vec<Op>,
    lines: Vec<u32>,
    temps: u32,
}

impl Lowerer {
    fn push(&mut self, op: Op, line: u32) -> usize {
        self.ops.push(op);
        self.lines.push(line);
        self.ops.len() - 1
    }

    fn temp(&mut self) -> String {
        let name = format!("%t{}", self.temps);
        self.temps += 1;
        name
    }

    fn here(&self) -> usize {
        self.ops.len()
    }

    fn lower_stmts(&mut self, stmts: &[Stmt], fn_level: bool) {
        let last = stmts.len().saturating_sub(1);
        for (i, stmt) in stmts.iter().enumerate() {
            self.lower_stmt(stmt, fn_level && i == last);
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt, returning_tail: bool) {
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                self.lower_into(Dst::Let(name.clone()), value, stmt.line);
            }
            StmtKind::Assign { name, value } => {
                self.lower_into(Dst::Set(name.clone()), value, stmt.line);
            }
            StmtKind::Expr(e) => {
                self.lower_into(Dst::Discard, e, stmt.line);
            }
            StmtKind::Tail(e) => {
                if returning_tail {
                    self.lower_return(Some(e), stmt.line);
                } else {
                    self.lower_into(Dst::Discard, e, stmt.line);
                }
            }
            StmtKind::Return(value) => {
                self.lower_return(value.as_ref(), stmt.line);
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.hoist(cond);
                let branch = self.push(
                    Op::Branch {
                        cond,
                        on_false: 0,
                    },
                    stmt.line,
                );
                self.lower_stmts(&then_block.stmts, false);
                match else_block {
                    Some(else_block) => {
                        let jump = self.push(Op::Jump { target: 0 }, stmt.line);
                        self.patch_branch(branch, self.here());
                        self.lower_stmts(&else_block.stmts, false);
                        self.patch_jump(jump, self.here());
                    }
                    None => {
                        self.patch_branch(branch, self.here());
                    }
                }
            }
            StmtKind::While { cond, body } => {
                let head = self.here();
                let cond = self.hoist(cond);
                let branch = self.push(
                    Op::Branch {
                        cond,
                        on_false: 0,
                    },
                    stmt.line,
                );
                self.lower_stmts(&body.stmts, false);
                self.push(Op::Jump { target: head }, stmt.line);
                self.patch_branch(branch, self.here());
            }
        }
    }

    fn patch_branch(&mut self, index: usize, target: usize) {
        if let Some(Op::Branch { on_false, .. }) = self.ops.get_mut(index) {
            *on_false = target;
        }
    }

    fn patch_jump(&mut self, index: usize, target: usize) {
        if let Some(Op::Jump { target: t }) = self.ops.get_mut(index) {
            *t = target;
        }
    }

    fn lower_return(&mut self, value: Option<&Expr>, line: u32) {
        match value {
            None => {
                self.push(Op::Return { value: None }, line);
            }
            Some(e) => {
                if let ExprKind::Call(_) = &e.kind {
                    let tmp = self.temp();
                    self.lower_into(Dst::Let(tmp.clone()), e, line);
                    self.push(
                        Op::Return {
                            value: Some(var(tmp, e.span, e.line)),
                        },
                        line,
                    );
                } else {
                    let e = self.hoist(e);
                    self.push(Op::Return { value: Some(e) }, line);
                }
            }
        }
    }

    /// Lower a value-producing expression into `dst`. A bare call lands
    /// directly in a `Call` op so stepping sees it as one statement.
    fn lower_into(&mut self, dst: Dst, value: &Expr, line: u32) {
        if let ExprKind::Call(call) = &value.kind {
            let args = call
                .args
                .iter()
                .map(|a| Arg {
                    name: a.name.clone(),
                    value: self.hoist(&a.value),
                })
                .collect();
            self.push(
                Op::Call {
                    dst,
                    callee: call.callee.clone(),
                    args,
                    span: value.span,
                },
                value.line,
            );
        } else {
            let value = self.hoist(value);
            self.push(Op::Assign { dst, value }, line);
        }
    }

    /// Replace every call subexpression with a temporary fed by a
    /// preceding `Call` op. Short-circuit operands that contain calls
    /// are lowered through branches so the calls stay conditional.
    fn hoist(&mut self, expr: &Expr) -> Expr {
        match &expr.kind {
            ExprKind::Call(call) => {
                let args = call
                    .args
                    .iter()
                    .map(|a| Arg {
                        name: a.name.clone(),
                        value: self.hoist(&a.value),
                    })
                    .collect();
                let tmp = self.temp();
                self.push(
                    Op::Call {
                        dst: Dst::Let(tmp.clone()),
                        callee: call.callee.clone(),
                        args,
                        span: expr.span,
                    },
                    expr.line,
                );
                var(tmp, expr.span, expr.line)
            }
            ExprKind::Unary { op, rhs } => Expr {
                kind: ExprKind::Unary {
                    op: *op,
                    rhs: Box::new(self.hoist(rhs)),
                },
                span: expr.span,
                line: expr.line,
            },
            ExprKind::Binary { op, lhs, rhs }
                if matches!(op, BinOp::And | BinOp::Or) && contains_call(rhs) =>
            {
                self.hoist_short_circuit(*op, lhs, rhs, expr)
            }
            ExprKind::Binary { op, lhs, rhs } => Expr {
                kind: ExprKind::Binary {
                    op: *op,
                    lhs: Box::new(self.hoist(lhs)),
                    rhs: Box::new(self.hoist(rhs)),
                },
                span: expr.span,
                line: expr.line,
            },
            _ => expr.clone(),
        }
    }

    fn hoist_short_circuit(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, whole: &Expr) -> Expr {
        let tmp = self.temp();
        let lhs = self.hoist(lhs);
        self.push(
            Op::Assign {
                dst: Dst::Let(tmp.clone()),
                value: lhs,
            },
            whole.line,
        );
        // `&&` skips the rhs when the accumulator is falsy, `||` when truthy.
        let cond = match op {
            BinOp::And => var(tmp.clone(), whole.span, whole.line),
            _ => Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    rhs: Box::new(var(tmp.clone(), whole.span, whole.line)),
                },
                span: whole.span,
                line: whole.line,
            },
        };
        let branch = self.push(
            Op::Branch { cond, on_false: 0 },
            whole.line,
        );
        let rhs = self.hoist(rhs);
        self.push(
            Op::Assign {
                dst: Dst::Set(tmp.clone()),
                value: rhs,
            },
            whole.line,
        );
        self.patch_branch(branch, self.here());
        var(tmp, whole.span, whole.line)
    }
}

fn var(name: String, span: Span, line: u32) -> Expr {
    Expr {
        kind: ExprKind::Var(name),
        span,
        line,
    }
}

fn contains_call(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Call(_) => true,
        ExprKind::Unary { rhs, .. } => contains_call(rhs),
        ExprKind::Binary { lhs, rhs, .. } => contains_call(lhs) || contains_call(rhs),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_snippet;

    fn lower(src: &str) -> FrameCode {
        let stmts = parse_snippet(src).expect("snippet should parse");
        FrameCode::lower("test", &stmts, Rc::from(src))
    }

    #[test]
    fn test_lower_hoists_nested_calls_in_order() {
        let code = lower("let a = f(g(1), 2) + 3;");
        let calls: Vec<_> = code
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Call { callee, .. } => Some(callee.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec!["g", "f"], "inner call should be hoisted first");
    }

    #[test]
    fn test_lower_bare_call_lands_in_dst() {
        let code = lower("let a = f(1);");
        assert!(
            matches!(&code.ops[0], Op::Call { dst: Dst::Let(n), .. } if n == "a"),
            "a bare call should store straight into its binding"
        );
    }

    #[test]
    fn test_lower_tail_becomes_return() {
        let code = lower("let a = 1;\na + 2");
        assert!(matches!(
            &code.ops[1],
            Op::Return { value: Some(_) }
        ));
    }

    #[test]
    fn test_lower_while_has_backward_jump() {
        let code = lower("let i = 0;\nwhile i < 3 {\n    i = i + 1;\n}\ni");
        let back = code.ops.iter().any(
            |op| matches!(op, Op::Jump { target } if *target == 1),
        );
        assert!(back, "while should jump back to its condition");
        // The back-edge makes line numbers non-monotonic.
        let lines: Vec<u32> = code.line_table.iter().map(|e| e.line).collect();
        assert!(lines.windows(2).any(|w| w[1] < w[0]));
    }

    #[test]
    fn test_lower_if_else_targets() {
        let code = lower("if x > 0 {\n    y = 1;\n} else {\n    y = 2;\n}");
        let Op::Branch { on_false, .. } = &code.ops[0] else {
            panic!("first op should be the branch");
        };
        // on_false must point at the else arm, past the then-arm's jump.
        assert!(matches!(&code.ops[*on_false], Op::Assign { dst: Dst::Set(n), .. } if n == "y"));
        assert!(matches!(&code.ops[on_false - 1], Op::Jump { .. }));
    }

    #[test]
    fn test_short_circuit_call_stays_conditional() {
        let code = lower("let a = x > 0 && f(x);");
        // There must be a branch guarding the hoisted call.
        let branch_at = code
            .ops
            .iter()
            .position(|op| matches!(op, Op::Branch { .. }))
            .expect("short-circuit lowering emits a branch");
        let call_at = code
            .ops
            .iter()
            .position(|op| matches!(op, Op::Call { .. }))
            .expect("call is hoisted");
        assert!(branch_at < call_at);
    }

    #[test]
    fn test_statement_range_collapses_before_first_line() {
        let table = vec![
            LineEntry { stmt: 0, line: 3 },
            LineEntry { stmt: 1, line: 4 },
        ];
        assert_eq!(statement_range(&table, 1), (0, 0));
        assert_eq!(statement_range(&table, 3), (0, 0));
    }

    #[test]
    fn test_statement_range_is_contiguous_and_nonempty() {
        let table: Vec<LineEntry> = [1, 1, 2, 2, 3, 5]
            .iter()
            .enumerate()
            .map(|(stmt, line)| LineEntry {
                stmt,
                line: *line,
            })
            .collect();
        for line in 1..=6 {
            let (lo, hi) = statement_range(&table, line);
            assert!(lo <= hi, "range must be non-empty for line {line}");
            assert!(hi < table.len());
        }
    }

    #[test]
    fn test_statement_range_past_last_line_clamps() {
        let table = vec![
            LineEntry { stmt: 0, line: 1 },
            LineEntry { stmt: 1, line: 2 },
        ];
        let (_, hi) = statement_range(&table, 9);
        assert_eq!(hi, 1);
    }

    #[test]
    fn test_line_extent_and_source_line() {
        let code = lower("let a = 1;\nlet b = 2;");
        assert_eq!(code.line_extent(), (1, 2));
        assert_eq!(code.source_line(2), Some("let b = 2;"));
        assert_eq!(code.source_line(0), None);
        assert_eq!(code.source_line(9), None);
    }
}
