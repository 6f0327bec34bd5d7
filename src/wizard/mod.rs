pub mod camera;
pub mod controller;
pub mod state;

pub use camera::{Camera, CameraGuard, CameraStream, CaptureError, Frame};
pub use controller::{AttendanceWizard, PendingSubmission};
pub use state::{Device, LocationError, Route, WizardError, WizardState, WizardStep};
