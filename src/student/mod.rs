#[cfg(feature = "desktop")]
pub mod commands;
pub mod flow;

pub use flow::{StepOutcome, StudentFlow};
