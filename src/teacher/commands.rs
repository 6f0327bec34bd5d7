use tauri::{Manager, State};

use crate::{
    models::{ClassDetails, Coordinates, Session, SessionId},
    teacher::{TeacherError, TeacherSessionController, TeacherState},
    AppState, SignedIn,
};

async fn controller_from_state(
    state: &State<'_, AppState>,
) -> Result<TeacherSessionController, String> {
    match state.signed_in.lock().await.as_ref() {
        Some(SignedIn::Teacher(controller)) => Ok(controller.clone()),
        _ => Err(TeacherError::NotSignedIn.to_string()),
    }
}

#[tauri::command]
pub async fn teacher_state(state: State<'_, AppState>) -> Result<TeacherState, String> {
    let controller = controller_from_state(&state).await?;
    Ok(controller.get_state().await)
}

#[tauri::command]
pub fn default_classroom_location(state: State<'_, AppState>) -> Coordinates {
    state.client_settings().default_classroom_location
}

#[tauri::command]
pub async fn open_session(
    state: State<'_, AppState>,
    details: ClassDetails,
) -> Result<Session, String> {
    let controller = controller_from_state(&state).await?;
    controller.open(details).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn close_session(
    state: State<'_, AppState>,
    session_id: SessionId,
) -> Result<(), String> {
    let controller = controller_from_state(&state).await?;
    controller.close(session_id).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn toggle_session(
    state: State<'_, AppState>,
    details: ClassDetails,
) -> Result<Option<Session>, String> {
    let controller = controller_from_state(&state).await?;
    controller.toggle(details).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn export_attendance(
    app: tauri::AppHandle,
    state: State<'_, AppState>,
    session_id: SessionId,
) -> Result<String, String> {
    let controller = controller_from_state(&state).await?;
    let dir = app.path().download_dir().map_err(|e| e.to_string())?;
    let path = controller
        .export_attendance(session_id, &dir)
        .await
        .map_err(|e| e.to_string())?;
    Ok(path.display().to_string())
}
