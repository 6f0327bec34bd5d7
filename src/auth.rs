//! Sign-in against the attendance service and the cached identity.

use log::{info, warn};

use crate::{
    api::{ApiClient, ApiError},
    cache::SessionCache,
    models::{Identity, Role},
};

/// Routes to the student or faculty login by address and caches the result.
pub async fn login(
    api: &ApiClient,
    cache: Option<&SessionCache>,
    email: &str,
    password: &str,
) -> Result<Identity, ApiError> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::Auth("email and password are required".into()));
    }

    let identity = match Role::for_email(email) {
        Role::Teacher => Identity::Teacher(api.login_teacher(email, password).await?),
        Role::Student => Identity::Student(api.login_student(email, password).await?),
    };
    info!("signed in {} as {:?}", identity.display_name(), identity.role());

    if let Some(cache) = cache {
        if let Err(err) = cache.set_user(&identity).await {
            warn!("could not cache signed-in user: {err}");
        }
    }
    Ok(identity)
}

/// Forgets the user and any half-finished submission.
pub async fn logout(cache: &SessionCache) {
    if let Err(err) = cache.clear_user().await {
        warn!("could not clear cached user: {err}");
    }
    if let Err(err) = cache.clear_submission_session_id().await {
        warn!("could not clear submission session: {err}");
    }
    info!("signed out");
}

/// Identity left behind by an earlier run. Unreadable entries count as signed out.
pub async fn restore(cache: &SessionCache) -> Option<Identity> {
    match cache.user().await {
        Ok(identity) => identity,
        Err(err) => {
            warn!("ignoring cached user: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use crate::cache::ContextId;
    use crate::db::Database;
    use crate::models::SessionId;

    fn cache(dir: &TempDir) -> SessionCache {
        let db = Database::new(dir.path().join("attendance.sqlite3")).unwrap();
        SessionCache::new(db, ContextId::new())
    }

    #[tokio::test]
    async fn professors_use_the_teacher_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/teacher"))
            .and(query_param("email", "rao.professor@campus.edu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "teacher_id": "T01", "name": "Dr. Rao", "email": "rao.professor@campus.edu"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let api = ApiClient::new(server.uri(), Duration::from_secs(5)).unwrap();

        let identity = login(&api, Some(&cache), "rao.professor@campus.edu", "secret")
            .await
            .unwrap();
        assert_eq!(identity.role(), Role::Teacher);
        assert_eq!(restore(&cache).await, Some(identity));
    }

    #[tokio::test]
    async fn rejected_credentials_are_auth_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/student"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "Invalid credentials"})),
            )
            .mount(&server)
            .await;
        let api = ApiClient::new(server.uri(), Duration::from_secs(5)).unwrap();

        let err = login(&api, None, "asha@campus.edu", "wrong").await.unwrap_err();
        assert_eq!(err, ApiError::Auth("Invalid credentials".into()));
    }

    #[tokio::test]
    async fn logout_clears_user_and_pending_submission() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache
            .set_user(&Identity::Teacher(crate::models::TeacherIdentity {
                teacher_id: "T01".into(),
                name: "Dr. Rao".into(),
                email: String::new(),
            }))
            .await
            .unwrap();
        cache.set_submission_session_id(SessionId(3)).await.unwrap();

        logout(&cache).await;
        assert_eq!(restore(&cache).await, None);
        assert_eq!(cache.submission_session_id().await.unwrap(), None);
    }
}
