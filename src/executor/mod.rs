mod navigator;

pub use navigator::{Navigator, Outcome};
