use serde::Serialize;
use thiserror::Error;

use crate::{
    api::ApiError,
    models::{CaptureArtifact, Coordinates, Session, SubmissionResult},
};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum WizardStep {
    Idle,
    LocationGranted,
    PhotoCaptured,
    Submitted,
}

impl Default for WizardStep {
    fn default() -> Self {
        WizardStep::Idle
    }
}

/// Screen the UI should show.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Route {
    Dashboard,
    Location,
    Camera,
    Review,
}

impl WizardStep {
    pub fn route(self) -> Route {
        match self {
            WizardStep::Idle => Route::Location,
            WizardStep::LocationGranted => Route::Camera,
            WizardStep::PhotoCaptured => Route::Review,
            WizardStep::Submitted => Route::Dashboard,
        }
    }
}

/// Each variant carries only what is valid at that stage.
#[derive(Debug, Clone, PartialEq)]
pub enum WizardState {
    Idle,
    LocationGranted {
        session: Session,
        location: Coordinates,
    },
    PhotoCaptured {
        artifact: CaptureArtifact,
    },
    Submitted {
        artifact: CaptureArtifact,
        result: SubmissionResult,
    },
}

impl Default for WizardState {
    fn default() -> Self {
        WizardState::Idle
    }
}

impl WizardState {
    pub fn step(&self) -> WizardStep {
        match self {
            WizardState::Idle => WizardStep::Idle,
            WizardState::LocationGranted { .. } => WizardStep::LocationGranted,
            WizardState::PhotoCaptured { .. } => WizardStep::PhotoCaptured,
            WizardState::Submitted { .. } => WizardStep::Submitted,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            WizardState::Idle => None,
            WizardState::LocationGranted { session, .. } => Some(session),
            WizardState::PhotoCaptured { artifact } | WizardState::Submitted { artifact, .. } => {
                Some(&artifact.session)
            }
        }
    }

    pub fn location(&self) -> Option<Coordinates> {
        match self {
            WizardState::Idle => None,
            WizardState::LocationGranted { location, .. } => Some(*location),
            WizardState::PhotoCaptured { artifact } | WizardState::Submitted { artifact, .. } => {
                Some(artifact.location)
            }
        }
    }

    pub fn artifact(&self) -> Option<&CaptureArtifact> {
        match self {
            WizardState::PhotoCaptured { artifact } | WizardState::Submitted { artifact, .. } => {
                Some(artifact)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Device {
    Geolocation,
    Camera,
}

/// Why the device did not hand over a location fix.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LocationError {
    #[error("location permission denied")]
    Denied,
    #[error("location unavailable: {0}")]
    Unavailable(String),
    #[error("timed out waiting for a location fix")]
    Timeout,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum WizardError {
    #[error("no active session to mark attendance for")]
    NoActiveSession,
    #[error("location must be granted before taking a photo")]
    LocationRequired,
    #[error("a photo is required before submitting")]
    PhotoRequired,
    #[error("{device:?} permission denied: {reason}")]
    Permission { device: Device, reason: String },
    #[error("camera capture failed: {0}")]
    Capture(String),
    #[error("{0}")]
    Validation(String),
    #[error("cannot {action} while {step:?}")]
    OutOfOrder {
        step: WizardStep,
        action: &'static str,
    },
    #[error("submission was abandoned")]
    Abandoned,
    #[error(transparent)]
    Submission(#[from] ApiError),
}

impl WizardError {
    /// Where the UI must navigate after this error. `None` keeps the current screen.
    pub fn redirect(&self) -> Option<Route> {
        match self {
            WizardError::NoActiveSession => Some(Route::Dashboard),
            WizardError::LocationRequired => Some(Route::Location),
            WizardError::PhotoRequired => Some(Route::Camera),
            WizardError::Permission { device, .. } => Some(match device {
                Device::Geolocation => Route::Location,
                Device::Camera => Route::Camera,
            }),
            WizardError::Capture(_)
            | WizardError::Validation(_)
            | WizardError::OutOfOrder { .. }
            | WizardError::Abandoned
            | WizardError::Submission(_) => None,
        }
    }
}

impl From<LocationError> for WizardError {
    fn from(err: LocationError) -> Self {
        match err {
            LocationError::Denied => WizardError::Permission {
                device: Device::Geolocation,
                reason: "allow location access to mark attendance".into(),
            },
            other => WizardError::Permission {
                device: Device::Geolocation,
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_location_redirects_to_location_step() {
        assert_eq!(WizardError::LocationRequired.redirect(), Some(Route::Location));
        assert_eq!(
            WizardError::from(LocationError::Timeout).redirect(),
            Some(Route::Location)
        );
        assert_eq!(
            WizardError::Submission(ApiError::Network("down".into())).redirect(),
            None
        );
    }

    #[test]
    fn steps_serialize_for_the_ui() {
        let json = serde_json::to_string(&WizardStep::PhotoCaptured).unwrap();
        assert_eq!(json, "\"photoCaptured\"");
        assert_eq!(WizardState::default().step().route(), Route::Location);
    }
}
