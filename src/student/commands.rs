use chrono::{DateTime, Utc};
use tauri::State;

use crate::{
    models::{Coordinates, Photo, Session},
    student::{StepOutcome, StudentFlow},
    sync::PushPublisher,
    wizard::LocationError,
    AppState, SignedIn,
};

async fn flow_from_state(state: &State<'_, AppState>) -> Result<(StudentFlow, PushPublisher), String> {
    match state.signed_in.lock().await.as_ref() {
        Some(SignedIn::Student { flow, push, .. }) => Ok((flow.clone(), push.clone())),
        _ => Err("sign in as a student first".into()),
    }
}

#[tauri::command]
pub async fn current_session(state: State<'_, AppState>) -> Result<Option<Session>, String> {
    let (flow, _) = flow_from_state(&state).await?;
    Ok(flow.current_session())
}

/// Feeds a server push received by the webview into the session store.
#[tauri::command]
pub async fn push_session(
    state: State<'_, AppState>,
    session: Option<Session>,
    sent_at: Option<DateTime<Utc>>,
) -> Result<bool, String> {
    let (_, push) = flow_from_state(&state).await?;
    Ok(push.publish(session, sent_at))
}

#[tauri::command]
pub async fn wizard_state(state: State<'_, AppState>) -> Result<StepOutcome, String> {
    let (flow, _) = flow_from_state(&state).await?;
    Ok(flow.outcome())
}

#[tauri::command]
pub async fn consent_location(
    state: State<'_, AppState>,
    latitude: f64,
    longitude: f64,
) -> Result<StepOutcome, String> {
    let (flow, _) = flow_from_state(&state).await?;
    let fix = Ok(Coordinates {
        latitude,
        longitude,
    });
    Ok(flow.consent_location(fix).await)
}

/// The webview could not get a fix; `denied` distinguishes a refused prompt.
#[tauri::command]
pub async fn location_unavailable(
    state: State<'_, AppState>,
    denied: bool,
    reason: Option<String>,
) -> Result<StepOutcome, String> {
    let (flow, _) = flow_from_state(&state).await?;
    let err = if denied {
        LocationError::Denied
    } else {
        LocationError::Unavailable(reason.unwrap_or_else(|| "no fix".into()))
    };
    Ok(flow.consent_location(Err(err)).await)
}

#[tauri::command]
pub async fn capture_photo(
    state: State<'_, AppState>,
    jpeg: Vec<u8>,
) -> Result<StepOutcome, String> {
    let (flow, _) = flow_from_state(&state).await?;
    Ok(flow.capture_photo(Photo::jpeg(jpeg)))
}

#[tauri::command]
pub async fn retake_photo(state: State<'_, AppState>) -> Result<StepOutcome, String> {
    let (flow, _) = flow_from_state(&state).await?;
    Ok(flow.retake())
}

#[tauri::command]
pub async fn submit_attendance(state: State<'_, AppState>) -> Result<StepOutcome, String> {
    let (flow, _) = flow_from_state(&state).await?;
    Ok(flow.submit().await)
}

#[tauri::command]
pub async fn leave_wizard(state: State<'_, AppState>) -> Result<StepOutcome, String> {
    let (flow, _) = flow_from_state(&state).await?;
    Ok(flow.leave())
}

