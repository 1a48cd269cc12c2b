//! The seams between the engine and its surroundings: commands coming
//! in, frame views going out, history going sideways. The blocking
//! prompt loop of an interactive terminal lives behind these traits so a
//! scripted command sequence can drive the navigator deterministically.

use super::breakpoints::ToggleMode;
use crate::interp::Value;
use std::collections::VecDeque;

/// A navigator command, already decoded from whatever key or escape
/// sequence the surface read.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Advance one statement (space / enter).
    Step,
    /// Run to the next matching breakpoint (`c`).
    Continue,
    /// Enter the call at the current statement (right arrow).
    StepIn,
    /// Run the current frame to completion and pop it (left arrow).
    Finish,
    /// View one frame outward; display only (up arrow).
    ViewCaller,
    /// View one frame inward; display only (down arrow).
    ViewCallee,
    /// Install a breakpoint at the current statement (`b [condition]`).
    SetBreakpoint { condition: Option<String> },
    /// Remove/disable/enable breakpoints on a line (`r`/`d`/`e [line]`),
    /// defaulting to the current line.
    Toggle {
        mode: ToggleMode,
        line: Option<u32>,
    },
    /// Show the key table (`?`).
    Help,
    /// Discard the frame tree (`q`).
    Abort,
}

/// One rendered source line of the view window.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    pub number: u32,
    pub text: String,
    pub current: bool,
    pub breakpoint: bool,
}

/// What the renderer needs for one navigation step: the highlighted
/// current line inside a fixed window, plus at most one status line.
#[derive(Debug, Clone)]
pub struct FrameView {
    pub callee: String,
    /// Stack depth, root counted as 1.
    pub depth: usize,
    /// How many levels above the execution point are merely displayed.
    pub view_offset: usize,
    pub line: u32,
    pub window: Vec<SourceLine>,
    pub locals: Vec<(String, Value)>,
    pub status: Option<String>,
}

/// Renders a view and reports how many terminal lines it consumed, so
/// the next draw knows how much to clear.
pub trait DebugView {
    fn render(&mut self, view: &FrameView, clear: usize) -> usize;
}

/// Supplies the next command; the suspension point of the stepping loop.
pub trait InputSource {
    fn next_command(&mut self, view: &FrameView) -> Command;
}

/// Append-only history sink; the core never reads it back.
pub trait History {
    fn record(&mut self, text: &str);
}

/// Scripted command feed for deterministic tests. Aborts when drained.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    commands: VecDeque<Command>,
}

impl ScriptedInput {
    pub fn new(commands: impl IntoIterator<Item = Command>) -> Self {
        ScriptedInput {
            commands: commands.into_iter().collect(),
        }
    }
}

impl InputSource for ScriptedInput {
    fn next_command(&mut self, _view: &FrameView) -> Command {
        self.commands.pop_front().unwrap_or(Command::Abort)
    }
}

/// Captures every rendered view for inspection.
#[derive(Debug, Default)]
pub struct RecordingView {
    pub views: Vec<FrameView>,
}

impl DebugView for RecordingView {
    fn render(&mut self, view: &FrameView, _clear: usize) -> usize {
        self.views.push(view.clone());
        view.window.len() + 2
    }
}

#[derive(Debug, Default)]
pub struct VecHistory {
    pub entries: Vec<String>,
}

impl History for VecHistory {
    fn record(&mut self, text: &str) {
        self.entries.push(text.to_string());
    }
}
