//! One paused, in-progress call under interpretation.

use super::code::{Dst, FrameCode, Op};
use crate::interp::{EvalFault, Scope, ScopeRef, Value};
use std::rc::Rc;

/// A frame owns its program counter and local scope and shares its
/// `FrameCode` with every other frame of the same callable. Frames never
/// own their caller; the navigator holds the stack, root first.
#[derive(Debug)]
pub struct Frame {
    pub code: Rc<FrameCode>,
    pub pc: usize,
    pub scope: ScopeRef,
    /// True while a child frame pushed for the `Call` op at `pc` is
    /// still outstanding.
    pub awaiting_call: bool,
}

impl Frame {
    pub fn new(code: Rc<FrameCode>, scope: ScopeRef) -> Self {
        Frame {
            code,
            pc: 0,
            scope,
            awaiting_call: false,
        }
    }

    /// Enter a callable with its promoted argument bindings.
    pub fn enter(code: Rc<FrameCode>, bindings: Vec<(String, Value)>) -> Self {
        let scope = Scope::root();
        for (name, value) in bindings {
            scope.borrow_mut().define(name, value);
        }
        Frame::new(code, scope)
    }

    pub fn current_line(&self) -> u32 {
        self.code.line_of(self.pc)
    }

    pub fn current_op(&self) -> Option<&Op> {
        self.code.ops.get(self.pc)
    }

    pub fn store(&mut self, dst: &Dst, value: Value) -> Result<(), EvalFault> {
        match dst {
            Dst::Let(name) => {
                self.scope.borrow_mut().define(name.clone(), value);
                Ok(())
            }
            Dst::Set(name) => {
                if self.scope.borrow_mut().assign(name, value) {
                    Ok(())
                } else {
                    Err(EvalFault::undefined_variable(name))
                }
            }
            Dst::Discard => Ok(()),
        }
    }

    /// Hand a finished child frame's value to the awaiting `Call` op and
    /// advance past it.
    pub fn complete_call(&mut self, value: Value) -> Result<(), EvalFault> {
        let dst = match self.current_op() {
            Some(Op::Call { dst, .. }) => dst.clone(),
            _ => Dst::Discard,
        };
        self.store(&dst, value)?;
        self.pc += 1;
        self.awaiting_call = false;
        Ok(())
    }

    /// Visible locals for rendering, temporaries excluded.
    pub fn locals(&self) -> Vec<(String, Value)> {
        self.scope.borrow().flatten()
    }
}
