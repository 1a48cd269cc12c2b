//! A loaded Rill script: per-callable code plus the source it came from.

use super::code::FrameCode;
use crate::parser::ast::{Item, Param, Span};
use crate::parser::{parse_program, ParseError};
use std::collections::HashMap;
use std::rc::Rc;

/// Everything known about one defined callable. The lowered `FrameCode`
/// is shared by every frame ever instantiated for it, so breakpoints
/// installed once outlive individual debug sessions.
#[derive(Debug)]
pub struct FnInfo {
    pub name: String,
    pub params: Vec<Param>,
    /// Span of the body text between the braces, for verbatim slicing.
    pub body_span: Span,
    pub line: u32,
    pub code: Rc<FrameCode>,
}

#[derive(Debug)]
pub struct Program {
    pub source: Rc<str>,
    functions: HashMap<String, Rc<FnInfo>>,
}

impl Default for Program {
    fn default() -> Self {
        Program {
            source: Rc::from(""),
            functions: HashMap::new(),
        }
    }
}

impl Program {
    /// Parse and lower a script. Only function definitions are allowed
    /// at the top level; statements belong in editing buffers.
    pub fn load(src: &str) -> Result<Program, ParseError> {
        let items = parse_program(src)?;
        let source: Rc<str> = Rc::from(src);
        let mut functions = HashMap::new();
        for item in items {
            match item {
                Item::Fn(def) => {
                    let code = Rc::new(FrameCode::lower(
                        def.name.clone(),
                        &def.body.stmts,
                        Rc::clone(&source),
                    ));
                    let info = FnInfo {
                        name: def.name.clone(),
                        params: def.params,
                        body_span: def.body_span,
                        line: def.line,
                        code,
                    };
                    functions.insert(def.name, Rc::new(info));
                }
                Item::Stmt(stmt) => {
                    return Err(ParseError::new(
                        "only function definitions are allowed at the top level of a script",
                        stmt.line,
                    ))
                }
            }
        }
        Ok(Program { source, functions })
    }

    pub fn function(&self, name: &str) -> Option<&Rc<FnInfo>> {
        self.functions.get(name)
    }

    /// The callee's body source, verbatim between its braces.
    pub fn body_text(&self, info: &FnInfo) -> &str {
        &self.source[info.body_span.start..info.body_span.end]
    }

    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}
