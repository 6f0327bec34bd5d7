pub mod api;
pub mod auth;
pub mod cache;
pub mod db;
pub mod models;
pub mod notification;
pub mod settings;
pub mod student;
pub mod submission;
pub mod sync;
pub mod teacher;
mod utils;
pub mod wizard;

pub use api::{ApiClient, ApiError};
pub use cache::{CacheError, ContextId, SessionCache};
pub use notification::{Notification, NotificationLevel};
pub use student::{StepOutcome, StudentFlow};
pub use submission::SubmissionClient;
pub use sync::{SessionSource, SessionStateStore, Subscription};
pub use teacher::{TeacherError, TeacherSessionController};
pub use wizard::AttendanceWizard;

/// Reads `RUST_LOG`, defaulting to `info`. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

#[cfg(feature = "desktop")]
pub use desktop::run;

#[cfg(feature = "desktop")]
pub(crate) use desktop::{AppState, SignedIn};

#[cfg(feature = "desktop")]
mod desktop {
    use std::sync::Arc;

    use log::{info, warn};
    use tauri::{AppHandle, Emitter, Manager, State};
    use tokio::sync::{mpsc, Mutex};

    use crate::{
        api::ApiClient,
        auth,
        cache::{ContextId, SessionCache},
        db::Database,
        models::{Identity, StudentIdentity, TeacherIdentity},
        settings::{ClientSettings, SettingsStore},
        student::{
            commands::{
                capture_photo, consent_location, current_session, leave_wizard,
                location_unavailable, push_session, retake_photo, submit_attendance,
                wizard_state,
            },
            StudentFlow,
        },
        submission::SubmissionClient,
        sync::{
            CacheSource, PollSource, PushPublisher, PushSource, SessionSource, SessionStateStore,
            Subscription,
        },
        teacher::{
            commands::{
                close_session, default_classroom_location, export_attendance, open_session,
                teacher_state, toggle_session,
            },
            TeacherSessionController,
        },
        wizard::AttendanceWizard,
    };

    const PUSH_CAPACITY: usize = 16;

    pub(crate) enum SignedIn {
        Student {
            flow: StudentFlow,
            push: PushPublisher,
            _subscription: Subscription,
        },
        Teacher(TeacherSessionController),
    }

    pub(crate) struct AppState {
        pub(crate) settings: SettingsStore,
        pub(crate) cache: SessionCache,
        pub(crate) signed_in: Mutex<Option<SignedIn>>,
    }

    impl AppState {
        pub(crate) fn client_settings(&self) -> ClientSettings {
            self.settings.client().with_env_overrides()
        }

        pub(crate) fn api(&self) -> Result<ApiClient, String> {
            let settings = self.client_settings();
            ApiClient::new(settings.api_base_url, settings.request_timeout())
                .map_err(|e| e.to_string())
        }
    }

    async fn start_student(
        app: &AppHandle,
        state: &AppState,
        student: StudentIdentity,
    ) -> Result<SignedIn, String> {
        let settings = state.client_settings();
        let api = state.api()?;

        let (push, publisher) = PushSource::new(PUSH_CAPACITY);
        let sources: Vec<Arc<dyn SessionSource>> = vec![
            Arc::new(
                PollSource::new(api.clone(), student.reg_no.clone(), settings.poll_interval())
                    .with_jitter(settings.poll_jitter()),
            ),
            Arc::new(CacheSource::new(
                state.cache.clone(),
                settings.cache_watch_interval(),
            )),
            Arc::new(push),
        ];
        let store = SessionStateStore::open(sources, Some(state.cache.clone())).await;

        let handle = app.clone();
        let subscription = store.subscribe(move |session| {
            if let Err(err) = handle.emit("session-changed", session) {
                warn!("failed to emit session-changed: {err}");
            }
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = app.clone();
        tauri::async_runtime::spawn(async move {
            while let Some(step) = rx.recv().await {
                let _ = handle.emit("wizard-step-changed", step);
            }
        });

        let flow = StudentFlow::new(
            student,
            store,
            AttendanceWizard::with_listener(tx),
            SubmissionClient::new(api),
            Some(state.cache.clone()),
            settings.photo_jpeg_quality,
        );
        Ok(SignedIn::Student {
            flow,
            push: publisher,
            _subscription: subscription,
        })
    }

    async fn start_teacher(
        app: &AppHandle,
        state: &AppState,
        teacher: TeacherIdentity,
    ) -> Result<SignedIn, String> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = app.clone();
        tauri::async_runtime::spawn(async move {
            while let Some(snapshot) = rx.recv().await {
                let _ = handle.emit("teacher-session-changed", snapshot);
            }
        });

        let controller =
            TeacherSessionController::new(teacher, state.api()?, Some(state.cache.clone()))
                .with_listener(tx);
        if let Err(err) = controller.recover().await {
            warn!("could not check for an open session: {err}");
        }
        Ok(SignedIn::Teacher(controller))
    }

    async fn sign_in(app: &AppHandle, state: &AppState, identity: Identity) -> Result<(), String> {
        let signed_in = match identity {
            Identity::Student(student) => start_student(app, state, student).await?,
            Identity::Teacher(teacher) => start_teacher(app, state, teacher).await?,
        };
        // Replacing drops the previous subscription, which stops its sources.
        *state.signed_in.lock().await = Some(signed_in);
        Ok(())
    }

    #[tauri::command]
    async fn login(
        email: String,
        password: String,
        app: AppHandle,
        state: State<'_, AppState>,
    ) -> Result<Identity, String> {
        let api = state.api()?;
        let identity = auth::login(&api, Some(&state.cache), &email, &password)
            .await
            .map_err(|e| crate::Notification::from(&e).message)?;
        sign_in(&app, &state, identity.clone()).await?;
        Ok(identity)
    }

    #[tauri::command]
    async fn restore_session(
        app: AppHandle,
        state: State<'_, AppState>,
    ) -> Result<Option<Identity>, String> {
        let Some(identity) = auth::restore(&state.cache).await else {
            return Ok(None);
        };
        sign_in(&app, &state, identity.clone()).await?;
        Ok(Some(identity))
    }

    #[tauri::command]
    async fn logout(state: State<'_, AppState>) -> Result<(), String> {
        state.signed_in.lock().await.take();
        auth::logout(&state.cache).await;
        Ok(())
    }

    #[tauri::command]
    fn get_client_settings(state: State<'_, AppState>) -> ClientSettings {
        state.settings.client()
    }

    #[tauri::command]
    fn set_client_settings(
        settings: ClientSettings,
        state: State<'_, AppState>,
    ) -> Result<(), String> {
        state.settings.update(settings).map_err(|e| e.to_string())
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        crate::init_logging();
        info!("attendance client starting up...");

        let result = tauri::Builder::default()
            .setup(|app| {
                let result = (|| -> anyhow::Result<()> {
                    let app_data_dir = app
                        .path()
                        .app_data_dir()
                        .map_err(|err| anyhow::anyhow!(err))?;
                    std::fs::create_dir_all(&app_data_dir)?;

                    let database = Database::new(app_data_dir.join("attendance.sqlite3"))?;
                    let context = ContextId::new();
                    info!("cache context {context}");

                    let settings = SettingsStore::new(app_data_dir.join("settings.json"))?;

                    app.manage(AppState {
                        settings,
                        cache: SessionCache::new(database, context),
                        signed_in: Mutex::new(None),
                    });
                    Ok(())
                })();

                result.map_err(|err| err.into())
            })
            .invoke_handler(tauri::generate_handler![
                login,
                restore_session,
                logout,
                get_client_settings,
                set_client_settings,
                current_session,
                push_session,
                wizard_state,
                consent_location,
                location_unavailable,
                capture_photo,
                retake_photo,
                submit_attendance,
                leave_wizard,
                teacher_state,
                default_classroom_location,
                open_session,
                close_session,
                toggle_session,
                export_attendance,
            ])
            .run(tauri::generate_context!());

        if let Err(err) = result {
            log::error!("error while running tauri application: {err}");
            std::process::exit(1);
        }
    }
}
