pub mod capture;
pub mod identity;
pub mod session;
pub mod submission;

pub use capture::{CaptureArtifact, Coordinates, Photo};
pub use identity::{Identity, Role, StudentIdentity, TeacherIdentity};
pub use session::{live_session, ClassDetails, Session, SessionId};
pub use submission::{SubmissionResult, Verdict};
