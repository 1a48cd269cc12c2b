//! An interactive source-level debugger for the Rill expression
//! language. Programs are interpreted statement by statement from
//! lowered syntax; a call can be frozen into a stored binding set and a
//! re-evaluable scope-binding expression, and paused frames are driven
//! with step/continue/step-in/finish commands.

pub mod capture;
pub mod debugger;
pub mod executor;
pub mod interp;
pub mod parser;
pub mod surface;
