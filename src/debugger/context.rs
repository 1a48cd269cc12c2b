//! The session context object threaded through every core call: the
//! loaded program, the binding-set store with its header, and history.
//! Created at session start, dropped at session end; stashed binding
//! sets live exactly that long.

use super::program::Program;
use super::render::{DebugView, InputSource, VecHistory};
use super::session::SessionStore;
use crate::capture::{self, CaptureError, Replacement};
use crate::executor::{Navigator, Outcome};
use crate::interp::Value;
use crate::parser::{parse_snippet, ParseError};
use tracing::debug;

pub struct Debugger {
    pub program: Program,
    pub store: SessionStore,
    pub history: VecHistory,
}

impl Debugger {
    pub fn new(program: Program) -> Self {
        Debugger {
            program,
            store: SessionStore::default(),
            history: VecHistory::default(),
        }
    }

    pub fn load(src: &str) -> Result<Self, ParseError> {
        Ok(Debugger::new(Program::load(src)?))
    }

    /// Capture the call under the cursor in an editing buffer. On
    /// success the replacement text is what the surface splices in; the
    /// draft buffer itself is never consumed.
    pub fn capture(&mut self, text: &str, cursor: usize) -> Result<Replacement, CaptureError> {
        capture::capture_call(
            &self.program,
            &mut self.store,
            &mut self.history,
            text,
            cursor,
        )
    }

    /// Surface-boundary wrapper: failures become a pending header
    /// warning instead of an error, and the caller keeps its draft.
    pub fn capture_or_warn(&mut self, text: &str, cursor: usize) -> Option<Replacement> {
        match self.capture(text, cursor) {
            Ok(replacement) => Some(replacement),
            Err(err) => {
                debug!(%err, "capture failed");
                self.store.header.warn(err.to_string());
                None
            }
        }
    }

    pub fn capture_stacktrace(&mut self, text: &str) -> Result<Vec<Replacement>, CaptureError> {
        capture::capture_stacktrace(&self.program, &mut self.store, &mut self.history, text)
    }

    /// Evaluate a buffer outside the stepping loop.
    pub fn eval(&self, text: &str) -> Result<Value, CaptureError> {
        capture::eval_buffer(&self.program, &self.store, text)
    }

    /// Seed a navigator from a buffer, typically a previously emitted
    /// bind-expression.
    pub fn enter(&mut self, text: &str) -> Result<Navigator, CaptureError> {
        let stmts = parse_snippet(text)
            .map_err(|e| CaptureError::ParseOrStep(format!("could not parse the buffer: {e}")))?;
        let (code, scope) =
            capture::instantiate(&self.store, &stmts, text).map_err(|fault| CaptureError::Eval {
                fault,
                text: text.to_string(),
            })?;
        self.store.header.displayed = Some(format!("stepping `{}`", code.name));
        Ok(Navigator::new(code, scope))
    }

    /// Enter a buffer and drive it to termination with the supplied
    /// input source and renderer.
    pub fn run_session(
        &mut self,
        text: &str,
        input: &mut dyn InputSource,
        view: &mut dyn DebugView,
    ) -> Result<Outcome, CaptureError> {
        let mut navigator = self.enter(text)?;
        let outcome = navigator.run(&self.program, input, view);
        self.store.header.displayed = Some(match &outcome {
            Outcome::Value(Some(v)) => format!("session finished with {v}"),
            Outcome::Value(None) => "session aborted".to_string(),
            Outcome::Fault(fault) => format!("session faulted: {fault}"),
        });
        Ok(outcome)
    }
}
