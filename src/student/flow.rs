use log::{info, warn};
use serde::Serialize;

use crate::{
    cache::SessionCache,
    models::{Coordinates, Photo, Session, StudentIdentity},
    notification::Notification,
    submission::SubmissionClient,
    sync::SessionStateStore,
    wizard::{AttendanceWizard, Camera, LocationError, Route, WizardError, WizardStep},
};

/// What the UI needs after each user action.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step: WizardStep,
    pub route: Route,
    pub notification: Option<Notification>,
}

/// Binds a signed-in student to the session store and one wizard.
/// Every failure comes back as a notification; nothing here returns an error.
#[derive(Clone)]
pub struct StudentFlow {
    student: StudentIdentity,
    store: SessionStateStore,
    wizard: AttendanceWizard,
    submission: SubmissionClient,
    cache: Option<SessionCache>,
    photo_quality: u8,
}

impl StudentFlow {
    pub fn new(
        student: StudentIdentity,
        store: SessionStateStore,
        wizard: AttendanceWizard,
        submission: SubmissionClient,
        cache: Option<SessionCache>,
        photo_quality: u8,
    ) -> Self {
        Self {
            student,
            store,
            wizard,
            submission,
            cache,
            photo_quality,
        }
    }

    pub fn student(&self) -> &StudentIdentity {
        &self.student
    }

    pub fn wizard(&self) -> &AttendanceWizard {
        &self.wizard
    }

    pub fn current_session(&self) -> Option<Session> {
        self.store.current_session()
    }

    pub fn outcome(&self) -> StepOutcome {
        let step = self.wizard.step();
        StepOutcome {
            step,
            route: step.route(),
            notification: None,
        }
    }

    fn failed(&self, err: &WizardError) -> StepOutcome {
        warn!("attendance step failed for {}: {err}", self.student.reg_no);
        let step = self.wizard.step();
        StepOutcome {
            step,
            route: err.redirect().unwrap_or_else(|| step.route()),
            notification: Some(Notification::from(err)),
        }
    }

    fn settle(&self, result: Result<WizardStep, WizardError>) -> StepOutcome {
        match result {
            Ok(_) => self.outcome(),
            Err(err) => self.failed(&err),
        }
    }

    pub async fn consent_location(&self, fix: Result<Coordinates, LocationError>) -> StepOutcome {
        let session = self.store.current_session();
        if let Err(err) = self.wizard.grant_location(session.as_ref(), fix) {
            return self.failed(&err);
        }

        if let (Some(cache), Some(session)) = (&self.cache, session) {
            if let Err(err) = cache.set_submission_session_id(session.id).await {
                warn!("could not remember submission session {}: {err}", session.id);
            }
        }
        self.outcome()
    }

    pub fn capture_photo(&self, photo: Photo) -> StepOutcome {
        self.settle(self.wizard.capture_photo(photo))
    }

    pub fn capture_with(&self, camera: &dyn Camera) -> StepOutcome {
        self.settle(self.wizard.capture_with(camera, self.photo_quality))
    }

    pub fn retake(&self) -> StepOutcome {
        self.settle(self.wizard.retake())
    }

    pub async fn submit(&self) -> StepOutcome {
        let result = match self.wizard.submit(&self.submission, &self.student).await {
            Ok(result) => result,
            Err(err) => return self.failed(&err),
        };

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.clear_submission_session_id().await {
                warn!("could not clear submission session: {err}");
            }
        }
        info!(
            "{} submitted attendance: {:?}",
            self.student.reg_no, result.verdict
        );

        StepOutcome {
            step: self.wizard.step(),
            route: Route::Dashboard,
            notification: Some(Notification::for_submission(&result)),
        }
    }

    /// "Go back": abandons the run and any pending result.
    pub fn leave(&self) -> StepOutcome {
        self.wizard.reset();
        StepOutcome {
            step: WizardStep::Idle,
            route: Route::Dashboard,
            notification: None,
        }
    }
}
