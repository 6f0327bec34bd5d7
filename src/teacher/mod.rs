#[cfg(feature = "desktop")]
pub mod commands;
pub mod controller;
pub mod state;

pub use controller::TeacherSessionController;
pub use state::{TeacherError, TeacherState};
