//! Line-delimited JSON wire surface for editor front ends.

mod protocol;
mod server;

pub use protocol::{SurfaceContent, SurfaceMessage};
pub use server::{serve, SurfaceServer};
