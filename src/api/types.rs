//! Wire shapes returned by the attendance service.

use serde::Deserialize;

use crate::models::{Session, SessionId};

/// `GET /student/session/{reg_no}` answers with a session, an empty object, a
/// `{"message": ..}` when nothing is open, or `{"error": ..}` for unknown students.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SessionLookup {
    Active(Session),
    Failed { error: String },
    Empty {},
}

#[derive(Debug, Deserialize)]
pub(crate) struct StartSessionResponse {
    pub session_id: SessionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_variants() {
        let active: SessionLookup = serde_json::from_str(
            r#"{"session_id": 42, "course_id": "CSE3021", "block": "AB1", "room": "301"}"#,
        )
        .unwrap();
        assert!(matches!(active, SessionLookup::Active(ref s) if s.id == SessionId(42)));

        let empty: SessionLookup = serde_json::from_str("{}").unwrap();
        assert!(matches!(empty, SessionLookup::Empty {}));

        let none: SessionLookup =
            serde_json::from_str(r#"{"message": "No active session"}"#).unwrap();
        assert!(matches!(none, SessionLookup::Empty {}));

        let failed: SessionLookup =
            serde_json::from_str(r#"{"error": "Student not found"}"#).unwrap();
        assert!(matches!(failed, SessionLookup::Failed { .. }));
    }
}
