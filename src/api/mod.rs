pub mod client;
pub mod error;
mod types;

pub use client::{ApiClient, AttendanceForm};
pub use error::ApiError;
