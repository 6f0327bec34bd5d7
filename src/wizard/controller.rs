use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};
use tokio::sync::mpsc;

use super::{
    camera::{Camera, CameraGuard},
    state::{LocationError, Route, WizardError, WizardState, WizardStep},
};
use crate::{
    api::ApiError,
    models::{CaptureArtifact, Coordinates, Photo, Session, StudentIdentity, SubmissionResult},
    submission::SubmissionClient,
};

/// Artifact handed out for an in-flight submission. Finishing it only lands if the
/// wizard has not moved on in the meantime.
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    pub artifact: CaptureArtifact,
    generation: u64,
}

#[derive(Debug, Default)]
struct Inner {
    state: WizardState,
    generation: u64,
    in_flight: Option<u64>,
}

/// One student's capture run.
#[derive(Clone, Default)]
pub struct AttendanceWizard {
    inner: Arc<Mutex<Inner>>,
    listener: Option<mpsc::UnboundedSender<WizardStep>>,
}

impl AttendanceWizard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every step the wizard enters is also sent to `listener`.
    pub fn with_listener(listener: mpsc::UnboundedSender<WizardStep>) -> Self {
        Self {
            inner: Arc::default(),
            listener: Some(listener),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.lock().state.step()
    }

    pub fn route(&self) -> Route {
        self.step().route()
    }

    pub fn state(&self) -> WizardState {
        self.lock().state.clone()
    }

    pub fn location(&self) -> Option<Coordinates> {
        self.lock().state.location()
    }

    pub fn artifact(&self) -> Option<CaptureArtifact> {
        self.lock().state.artifact().cloned()
    }

    pub fn is_submitting(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    fn transition(&self, inner: &mut Inner, next: WizardState) -> WizardStep {
        let from = inner.state.step();
        inner.state = next;
        inner.generation += 1;
        let to = inner.state.step();
        info!("attendance wizard {from:?} -> {to:?}");
        if let Some(listener) = &self.listener {
            let _ = listener.send(to);
        }
        to
    }

    /// Records the consent outcome. A failed fix leaves the wizard Idle.
    pub fn grant_location(
        &self,
        session: Option<&Session>,
        fix: Result<Coordinates, LocationError>,
    ) -> Result<WizardStep, WizardError> {
        let mut inner = self.lock();
        let step = inner.state.step();
        if step != WizardStep::Idle {
            return Err(WizardError::OutOfOrder {
                step,
                action: "grant location",
            });
        }

        let session = match session {
            Some(session) if session.is_live() => session.clone(),
            _ => return Err(WizardError::NoActiveSession),
        };
        let location = fix.map_err(|err| {
            warn!("location consent failed: {err}");
            WizardError::from(err)
        })?;
        location.validate().map_err(WizardError::Validation)?;

        Ok(self.transition(&mut inner, WizardState::LocationGranted { session, location }))
    }

    /// Fails closed unless a location is held and no photo has been taken yet.
    pub fn ensure_can_capture(&self) -> Result<(), WizardError> {
        match self.lock().state.step() {
            WizardStep::LocationGranted => Ok(()),
            WizardStep::Idle => Err(WizardError::LocationRequired),
            step => Err(WizardError::OutOfOrder {
                step,
                action: "capture a photo",
            }),
        }
    }

    pub fn capture_photo(&self, photo: Photo) -> Result<WizardStep, WizardError> {
        if photo.is_empty() {
            return Err(WizardError::PhotoRequired);
        }

        let mut inner = self.lock();
        let (session, location) = match &inner.state {
            WizardState::LocationGranted { session, location } => (session.clone(), *location),
            WizardState::Idle => return Err(WizardError::LocationRequired),
            other => {
                return Err(WizardError::OutOfOrder {
                    step: other.step(),
                    action: "capture a photo",
                })
            }
        };

        let artifact = CaptureArtifact {
            session,
            location,
            photo,
        };
        Ok(self.transition(&mut inner, WizardState::PhotoCaptured { artifact }))
    }

    /// Opens the camera only once capturing is allowed; the stream is released
    /// before this returns whatever the outcome.
    pub fn capture_with(&self, camera: &dyn Camera, quality: u8) -> Result<WizardStep, WizardError> {
        self.ensure_can_capture()?;
        let photo = CameraGuard::open(camera)?.capture(quality)?;
        self.capture_photo(photo)
    }

    /// Drops the photo and goes back to the camera. The location stays.
    pub fn retake(&self) -> Result<WizardStep, WizardError> {
        let mut inner = self.lock();
        let (session, location) = match &inner.state {
            WizardState::PhotoCaptured { artifact } => {
                (artifact.session.clone(), artifact.location)
            }
            other => {
                return Err(WizardError::OutOfOrder {
                    step: other.step(),
                    action: "retake",
                })
            }
        };
        inner.in_flight = None;
        Ok(self.transition(&mut inner, WizardState::LocationGranted { session, location }))
    }

    pub fn begin_submit(&self) -> Result<PendingSubmission, WizardError> {
        let mut inner = self.lock();
        let artifact = match &inner.state {
            WizardState::PhotoCaptured { artifact } => artifact.clone(),
            WizardState::Idle => return Err(WizardError::LocationRequired),
            WizardState::LocationGranted { .. } => return Err(WizardError::PhotoRequired),
            WizardState::Submitted { .. } => {
                return Err(WizardError::OutOfOrder {
                    step: WizardStep::Submitted,
                    action: "submit",
                })
            }
        };
        if inner.in_flight.is_some() {
            return Err(WizardError::OutOfOrder {
                step: WizardStep::PhotoCaptured,
                action: "submit twice",
            });
        }

        inner.in_flight = Some(inner.generation);
        Ok(PendingSubmission {
            artifact,
            generation: inner.generation,
        })
    }

    /// Applies the service response. Success passes through Submitted and lands on
    /// Idle; failure leaves the captured artifact in place for a retry.
    pub fn finish_submit(
        &self,
        pending: PendingSubmission,
        outcome: Result<SubmissionResult, ApiError>,
    ) -> Result<SubmissionResult, WizardError> {
        let mut inner = self.lock();
        if inner.generation != pending.generation || inner.in_flight != Some(pending.generation) {
            info!("dropping submission result for an abandoned capture");
            return Err(WizardError::Abandoned);
        }
        inner.in_flight = None;

        let result = outcome?;
        self.transition(
            &mut inner,
            WizardState::Submitted {
                artifact: pending.artifact,
                result: result.clone(),
            },
        );
        self.transition(&mut inner, WizardState::Idle);
        Ok(result)
    }

    pub async fn submit(
        &self,
        client: &SubmissionClient,
        student: &StudentIdentity,
    ) -> Result<SubmissionResult, WizardError> {
        let pending = self.begin_submit()?;
        let outcome = client
            .submit(&pending.artifact, student, pending.artifact.session.id)
            .await;
        self.finish_submit(pending, outcome)
    }

    /// Discards every artifact. Also abandons any in-flight submission.
    pub fn reset(&self) -> WizardStep {
        let mut inner = self.lock();
        inner.in_flight = None;
        if inner.state == WizardState::Idle {
            return WizardStep::Idle;
        }
        self.transition(&mut inner, WizardState::Idle)
    }
}
