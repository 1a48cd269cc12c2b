//! Debugger state: per-callable code and breakpoints, frames, stored
//! binding sets, the session context, and the surface seams.

pub mod breakpoints;
pub mod code;
pub mod context;
pub mod frame;
pub mod program;
pub mod render;
pub mod session;

pub use context::Debugger;
pub use frame::Frame;
