//! The interpreter frame navigator: a state machine over a stack of
//! paused frames, driven by decoded commands.

use crate::debugger::breakpoints::{Condition, ToggleMode};
use crate::debugger::frame::Frame;
use crate::debugger::program::Program;
use crate::debugger::render::{Command, DebugView, FrameView, InputSource, SourceLine};
use crate::interp::{
    self, BreakpointHit, EvalCtx, EvalFault, FrameOutcome, ScopeRef, StepSignal, Value,
};
use crate::debugger::code::FrameCode;
use crate::parser::parse_expr_text;
use std::rc::Rc;
use tracing::debug;

/// Lines shown on each side of the current line.
const WINDOW: u32 = 3;

const HELP_LINE: &str = "space/enter: step | c: continue | right: step in | left: finish | \
up/down: view caller/callee | b [cond]: set breakpoint | r/d/e [line]: remove/disable/enable | \
q: abort | ?: help";

/// How a session ended: the root frame's value, none for an abort, or
/// the fault that tore the session down.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(Option<Value>),
    Fault(EvalFault),
}

/// A running navigator owns the frame stack (root first) and a display
/// offset; a terminated one owns only its outcome.
#[derive(Debug)]
pub struct Navigator {
    frames: Vec<Frame>,
    view_offset: usize,
    status: Option<String>,
    last_value: Option<Value>,
    last_fault: Option<EvalFault>,
    drawn_lines: usize,
    outcome: Option<Outcome>,
}

impl Navigator {
    /// Seed a running session paused at the first statement.
    pub fn new(code: Rc<FrameCode>, scope: ScopeRef) -> Self {
        Navigator {
            frames: vec![Frame::new(code, scope)],
            view_offset: 0,
            status: None,
            last_value: None,
            last_fault: None,
            drawn_lines: 0,
            outcome: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.outcome.is_none()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn view_offset(&self) -> usize {
        self.view_offset
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn last_fault(&self) -> Option<&EvalFault> {
        self.last_fault.as_ref()
    }

    /// The most recently captured frame return value.
    pub fn last_value(&self) -> Option<&Value> {
        self.last_value.as_ref()
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// The frame the display offset points at, and what the renderer
    /// draws: a window of source lines around the current one.
    pub fn view(&self) -> Option<FrameView> {
        let idx = self.frames.len().checked_sub(1 + self.view_offset)?;
        let frame = self.frames.get(idx)?;
        let line = frame.current_line();
        let (first, last) = frame.code.line_extent();
        let marked = frame.code.breakpoint_lines();
        let lo = line.saturating_sub(WINDOW).max(first).max(1);
        let hi = (line + WINDOW).min(last);
        let mut window = Vec::new();
        for number in lo..=hi {
            window.push(SourceLine {
                number,
                text: frame
                    .code
                    .source_line(number)
                    .unwrap_or_default()
                    .to_string(),
                current: number == line,
                breakpoint: marked.contains(&number),
            });
        }
        Some(FrameView {
            callee: frame.code.name.clone(),
            depth: self.frames.len(),
            view_offset: self.view_offset,
            line,
            window,
            locals: frame.locals(),
            status: self.status.clone(),
        })
    }

    /// Drive the session to termination: render, suspend for the next
    /// command, dispatch, repeat.
    pub fn run(
        &mut self,
        program: &Program,
        input: &mut dyn InputSource,
        view_sink: &mut dyn DebugView,
    ) -> Outcome {
        loop {
            if let Some(outcome) = &self.outcome {
                return outcome.clone();
            }
            let Some(view) = self.view() else {
                let outcome = Outcome::Value(None);
                self.outcome = Some(outcome.clone());
                return outcome;
            };
            self.drawn_lines = view_sink.render(&view, self.drawn_lines);
            let command = input.next_command(&view);
            self.dispatch(command, program);
        }
    }

    /// Apply one command. View commands adjust the display offset only;
    /// every control command re-zeroes it first.
    pub fn dispatch(&mut self, command: Command, program: &Program) {
        if self.outcome.is_some() {
            return;
        }
        self.status = None;
        match &command {
            Command::ViewCaller => {
                if self.view_offset + 1 < self.frames.len() {
                    self.view_offset += 1;
                } else {
                    self.status = Some("already viewing the outermost frame".into());
                }
                return;
            }
            Command::ViewCallee => {
                if self.view_offset > 0 {
                    self.view_offset -= 1;
                } else {
                    self.status = Some("already viewing the execution point".into());
                }
                return;
            }
            Command::Help => {
                self.status = Some(HELP_LINE.into());
                return;
            }
            _ => self.view_offset = 0,
        }

        let mut ctx = EvalCtx::stepping(program);
        match command {
            Command::Step => self.step(&mut ctx),
            Command::StepIn => self.step_in(&mut ctx),
            Command::Finish => self.finish(&mut ctx),
            Command::Continue => self.run_to_breakpoint(&mut ctx),
            Command::SetBreakpoint { condition } => self.set_breakpoint(condition),
            Command::Toggle { mode, line } => self.toggle(mode, line),
            Command::Abort => {
                debug!("session aborted");
                self.frames.clear();
                self.outcome = Some(Outcome::Value(None));
            }
            Command::ViewCaller | Command::ViewCallee | Command::Help => {}
        }
    }

    fn step(&mut self, ctx: &mut EvalCtx) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        match interp::step_op(frame, ctx) {
            Ok(StepSignal::Advanced) => {}
            Ok(StepSignal::Returned(value)) => self.pop_with(value),
            Ok(StepSignal::Paused { frames, hit }) => self.absorb_pause(frames, hit),
            Err(fault) => self.terminate_with_fault(fault),
        }
    }

    fn step_in(&mut self, ctx: &mut EvalCtx) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        match interp::enter_call(frame, ctx) {
            Ok(Some(child)) => {
                let name = child.code.name.clone();
                self.frames.push(child);
                self.status = Some(format!("entered `{name}`"));
            }
            Ok(None) => {
                self.step(ctx);
                if self.status.is_none() {
                    self.status = Some("no enterable call here; stepped instead".into());
                }
            }
            Err(fault) => self.terminate_with_fault(fault),
        }
    }

    fn finish(&mut self, ctx: &mut EvalCtx) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        match interp::run_frame(frame, ctx, true) {
            Ok(FrameOutcome::Returned(value)) => self.pop_with(value),
            Ok(FrameOutcome::Hit { frames, hit }) => self.absorb_pause(frames, hit),
            Err(fault) => self.terminate_with_fault(fault),
        }
    }

    fn run_to_breakpoint(&mut self, ctx: &mut EvalCtx) {
        let mut skip_first = true;
        while self.outcome.is_none() {
            let Some(frame) = self.frames.last_mut() else {
                return;
            };
            match interp::run_frame(frame, ctx, skip_first) {
                Ok(FrameOutcome::Returned(value)) => {
                    self.pop_with(value);
                    skip_first = false;
                }
                Ok(FrameOutcome::Hit { frames, hit }) => {
                    self.absorb_pause(frames, hit);
                    return;
                }
                Err(fault) => {
                    self.terminate_with_fault(fault);
                    return;
                }
            }
        }
    }

    fn set_breakpoint(&mut self, condition: Option<String>) {
        let Some(frame) = self.frames.last() else {
            return;
        };
        let condition = match condition {
            None => None,
            Some(text) => match parse_expr_text(&text) {
                Ok(expr) => Some(Condition { text, expr }),
                Err(err) => {
                    // Unparseable conditions install nothing.
                    self.status = Some(format!("breakpoint not set: {err}"));
                    return;
                }
            },
        };
        frame.code.breakpoints_mut().set(frame.pc, condition);
        debug!(pc = frame.pc, code = %frame.code.name, "breakpoint set");
        self.status = Some(format!(
            "breakpoint set at line {} of `{}`",
            frame.current_line(),
            frame.code.name
        ));
    }

    fn toggle(&mut self, mode: ToggleMode, line: Option<u32>) {
        let Some(frame) = self.frames.last() else {
            return;
        };
        let line = line.unwrap_or_else(|| frame.current_line());
        let (lo, hi) = frame.code.statement_range(line);
        let touched = frame.code.breakpoints_mut().toggle_range(lo, hi, mode);
        let verb = match mode {
            ToggleMode::Remove => "removed",
            ToggleMode::Disable => "disabled",
            ToggleMode::Enable => "enabled",
        };
        debug!(line, lo, hi, touched, "breakpoints {verb}");
        self.status = Some(format!("{verb} {touched} breakpoint(s) on line {line}"));
    }

    fn pop_with(&mut self, value: Value) {
        let name = match self.frames.pop() {
            Some(frame) => frame.code.name.clone(),
            None => return,
        };
        debug!(frame = %name, value = %value, "frame completed");
        self.last_value = Some(value.clone());
        match self.frames.last_mut() {
            Some(parent) => {
                let shown = value.clone();
                if let Err(fault) = parent.complete_call(value) {
                    self.terminate_with_fault(fault);
                    return;
                }
                self.status = Some(format!("`{name}` returned {shown}"));
            }
            None => {
                self.outcome = Some(Outcome::Value(Some(value)));
            }
        }
    }

    fn absorb_pause(&mut self, frames: Vec<Frame>, hit: BreakpointHit) {
        self.frames.extend(frames);
        let line = self
            .frames
            .last()
            .map(|f| f.current_line())
            .unwrap_or_default();
        match hit.condition_fault {
            Some(fault) => {
                self.status = Some(format!(
                    "breakpoint condition faulted at line {line}: {fault}; stopping"
                ));
                self.last_fault = Some(fault);
            }
            None => {
                self.status = Some(format!("hit breakpoint at line {line}"));
            }
        }
        debug!(line, "paused at breakpoint");
    }

    fn terminate_with_fault(&mut self, fault: EvalFault) {
        debug!(%fault, "session terminated by fault");
        self.frames.clear();
        self.last_fault = Some(fault.clone());
        self.outcome = Some(Outcome::Fault(fault));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::render::{RecordingView, ScriptedInput};
    use crate::interp::Scope;
    use crate::parser::parse_snippet;

    fn navigator_for(buffer: &str) -> Navigator {
        let stmts = parse_snippet(buffer).expect("buffer should parse");
        let code = Rc::new(FrameCode::lower("buffer", &stmts, Rc::from(buffer)));
        Navigator::new(code, Scope::root())
    }

    fn run_commands(
        program: &Program,
        nav: &mut Navigator,
        commands: impl IntoIterator<Item = Command>,
    ) -> Outcome {
        let mut input = ScriptedInput::new(commands);
        let mut view = RecordingView::default();
        nav.run(program, &mut input, &mut view)
    }

    #[test]
    fn test_step_to_completion() {
        let program = Program::default();
        let mut nav = navigator_for("let a = 1;\nlet b = 2;\na + b");
        nav.dispatch(Command::Step, &program);
        nav.dispatch(Command::Step, &program);
        assert!(nav.is_running());
        nav.dispatch(Command::Step, &program);
        assert_eq!(nav.outcome(), Some(&Outcome::Value(Some(Value::Int(3)))));
    }

    #[test]
    fn test_step_over_call_stays_at_depth_one() {
        let program = Program::load("fn f(x) {\n    x * 2\n}").expect("should load");
        let mut nav = navigator_for("let a = f(2);\na + 1");
        nav.dispatch(Command::Step, &program);
        assert_eq!(nav.depth(), 1, "stepping over a call must not push a frame");
        nav.dispatch(Command::Step, &program);
        assert_eq!(nav.outcome(), Some(&Outcome::Value(Some(Value::Int(5)))));
    }

    #[test]
    fn test_step_in_and_finish() {
        let program = Program::load("fn f(x) {\n    let y = x * 2;\n    y\n}").expect("load");
        let mut nav = navigator_for("let a = f(2);\na + 1");
        nav.dispatch(Command::StepIn, &program);
        assert_eq!(nav.depth(), 2);
        assert_eq!(
            nav.current_frame().expect("running").code.name,
            "f"
        );
        // The callee's arguments are already bound.
        assert_eq!(
            nav.current_frame()
                .expect("running")
                .scope
                .borrow()
                .lookup("x"),
            Some(Value::Int(2))
        );
        nav.dispatch(Command::Finish, &program);
        assert_eq!(nav.depth(), 1);
        assert!(nav.status().expect("status").contains("returned 4"));
        assert_eq!(nav.last_value(), Some(&Value::Int(4)));
        nav.dispatch(Command::Finish, &program);
        assert_eq!(nav.outcome(), Some(&Outcome::Value(Some(Value::Int(5)))));
    }

    #[test]
    fn test_step_in_on_non_call_steps() {
        let program = Program::default();
        let mut nav = navigator_for("let a = 1;\na");
        nav.dispatch(Command::StepIn, &program);
        assert!(nav.is_running());
        assert_eq!(nav.depth(), 1);
        assert!(nav.status().expect("status").contains("stepped instead"));
    }

    #[test]
    fn test_repeated_finish_terminates_from_nested_state() {
        let program = Program::load(
            "fn outer(x) {\n    inner(x) + 1\n}\nfn inner(x) {\n    x * 2\n}",
        )
        .expect("load");
        let mut nav = navigator_for("outer(3)");
        nav.dispatch(Command::StepIn, &program);
        nav.dispatch(Command::StepIn, &program);
        assert_eq!(nav.depth(), 3);
        let mut guard = 0;
        while nav.is_running() {
            nav.dispatch(Command::Finish, &program);
            guard += 1;
            assert!(guard < 10, "finish must terminate");
        }
        assert_eq!(nav.outcome(), Some(&Outcome::Value(Some(Value::Int(7)))));
    }

    #[test]
    fn test_continue_stops_at_breakpoint_then_runs_out() {
        let program = Program::default();
        let mut nav = navigator_for("let a = 1;\nlet b = 2;\nlet c = 3;\na + b + c");
        // A breakpoint at the op we are already stopped on must not
        // re-fire on continue.
        nav.dispatch(Command::SetBreakpoint { condition: None }, &program);
        nav.dispatch(Command::Continue, &program);
        assert_eq!(nav.outcome(), Some(&Outcome::Value(Some(Value::Int(6)))));
    }

    #[test]
    fn test_continue_pauses_inside_stepped_over_call() {
        let program = Program::load("fn f(x) {\n    let y = x + 1;\n    y * 2\n}").expect("load");
        let info = program.function("f").expect("defined");
        // Breakpoint on f's second statement.
        info.code.breakpoints_mut().set(1, None);

        let mut nav = navigator_for("let a = f(1);\na");
        nav.dispatch(Command::Continue, &program);
        assert!(nav.is_running());
        assert_eq!(nav.depth(), 2, "the callee frame must be materialized");
        assert_eq!(nav.current_frame().expect("running").pc, 1);
        assert!(nav.status().expect("status").contains("hit breakpoint"));

        nav.dispatch(Command::Continue, &program);
        assert_eq!(nav.outcome(), Some(&Outcome::Value(Some(Value::Int(4)))));
    }

    #[test]
    fn test_step_over_call_pauses_on_interior_breakpoint() {
        let program = Program::load("fn f(x) {\n    let y = x + 1;\n    y\n}").expect("load");
        program.function("f").expect("defined").code.breakpoints_mut().set(0, None);

        let mut nav = navigator_for("let a = f(1);\na");
        nav.dispatch(Command::Step, &program);
        assert_eq!(nav.depth(), 2, "step must surface the interior breakpoint");
        assert!(nav.is_running());
    }

    #[test]
    fn test_conditional_breakpoint_only_fires_when_true() {
        let program = Program::load("fn f(x) {\n    let y = x;\n    y\n}").expect("load");
        let info = program.function("f").expect("defined");
        info.code.breakpoints_mut().set(
            1,
            Some(Condition {
                text: "x > 10".into(),
                expr: parse_expr_text("x > 10").expect("condition parses"),
            }),
        );

        let mut nav = navigator_for("let a = f(1);\nlet b = f(20);\na + b");
        nav.dispatch(Command::Continue, &program);
        assert!(nav.is_running(), "second call matches the condition");
        assert_eq!(nav.depth(), 2);
        assert_eq!(
            nav.current_frame().expect("running").scope.borrow().lookup("x"),
            Some(Value::Int(20))
        );
        nav.dispatch(Command::Continue, &program);
        assert_eq!(nav.outcome(), Some(&Outcome::Value(Some(Value::Int(21)))));
    }

    #[test]
    fn test_faulting_condition_stops_with_fault_recorded() {
        let program = Program::load("fn f(x) {\n    let y = x;\n    y\n}").expect("load");
        let info = program.function("f").expect("defined");
        info.code.breakpoints_mut().set(
            1,
            Some(Condition {
                text: "nope > 1".into(),
                expr: parse_expr_text("nope > 1").expect("condition parses"),
            }),
        );

        let mut nav = navigator_for("f(1)");
        nav.dispatch(Command::Continue, &program);
        assert!(nav.is_running(), "a faulting condition stops, not skips");
        let fault = nav.last_fault().expect("fault recorded");
        assert!(fault.message.contains("nope"));
        assert!(nav.status().expect("status").contains("condition faulted"));
    }

    #[test]
    fn test_view_offset_rezeroed_by_control_command() {
        let program = Program::load("fn f(x) {\n    let y = x;\n    y\n}").expect("load");
        let mut nav = navigator_for("f(1)");
        nav.dispatch(Command::StepIn, &program);
        assert_eq!(nav.depth(), 2);

        nav.dispatch(Command::ViewCaller, &program);
        assert_eq!(nav.view_offset(), 1);
        let view = nav.view().expect("running");
        assert_eq!(view.callee, "buffer", "viewing the caller frame");

        nav.dispatch(Command::Step, &program);
        assert_eq!(nav.view_offset(), 0, "control commands re-zero the offset");

        nav.dispatch(Command::ViewCallee, &program);
        assert!(nav.status().expect("status").contains("execution point"));
    }

    #[test]
    fn test_view_caller_at_root_warns() {
        let program = Program::default();
        let mut nav = navigator_for("1");
        nav.dispatch(Command::ViewCaller, &program);
        assert_eq!(nav.view_offset(), 0);
        assert!(nav.status().expect("status").contains("outermost"));
    }

    #[test]
    fn test_abort_discards_frames() {
        let program = Program::default();
        let mut nav = navigator_for("let a = 1;\na");
        nav.dispatch(Command::Abort, &program);
        assert_eq!(nav.outcome(), Some(&Outcome::Value(None)));
        assert_eq!(nav.depth(), 0);
    }

    #[test]
    fn test_fault_during_step_terminates_with_fault() {
        let program = Program::default();
        let mut nav = navigator_for("let a = 1 / 0;\na");
        nav.dispatch(Command::Step, &program);
        match nav.outcome() {
            Some(Outcome::Fault(fault)) => {
                assert!(fault.message.contains("division"));
            }
            other => panic!("expected a fault outcome, got {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_breakpoint_condition_installs_nothing() {
        let program = Program::default();
        let mut nav = navigator_for("let a = 1;\na");
        nav.dispatch(
            Command::SetBreakpoint {
                condition: Some("let nope".into()),
            },
            &program,
        );
        assert!(nav.status().expect("status").contains("not set"));
        let frame = nav.current_frame().expect("running");
        assert!(frame.code.breakpoints().at(0).is_none());
    }

    #[test]
    fn test_run_with_scripted_input() {
        let program = Program::load("fn f(x) {\n    x * 3\n}").expect("load");
        let mut nav = navigator_for("let a = f(2);\na + 1");
        let outcome = run_commands(
            &program,
            &mut nav,
            [Command::Step, Command::Step],
        );
        assert_eq!(outcome, Outcome::Value(Some(Value::Int(7))));
    }

    #[test]
    fn test_run_renders_window_with_current_line() {
        let program = Program::default();
        let mut nav = navigator_for("let a = 1;\nlet b = 2;\na + b");
        let mut input = ScriptedInput::new([Command::Step, Command::Abort]);
        let mut sink = RecordingView::default();
        nav.run(&program, &mut input, &mut sink);
        assert!(sink.views.len() >= 2);
        let first = &sink.views[0];
        assert_eq!(first.line, 1);
        let current: Vec<_> = first.window.iter().filter(|l| l.current).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].text, "let a = 1;");
        let second = &sink.views[1];
        assert_eq!(second.line, 2);
    }
}
