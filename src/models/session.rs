use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::Coordinates;

/// Server-assigned session identifier. Stable for the lifetime of the session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse::<i64>().map(SessionId)
    }
}

fn default_active() -> bool {
    true
}

/// One open attendance window, mirrored from the server. Never mutated locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    #[serde(rename = "session_id", alias = "id")]
    pub id: SessionId,
    pub course_id: String,
    #[serde(default)]
    pub section: String,
    pub block: String,
    pub room: String,
    #[serde(default)]
    pub teacher_id: String,
    /// Registered room location, when the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Geofence radius in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<NaiveTime>,
    #[serde(default = "default_active", alias = "is_active")]
    pub active: bool,
}

impl Session {
    pub fn is_live(&self) -> bool {
        self.active
    }

    pub fn location(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    /// "AB1 - Room 301"
    pub fn venue(&self) -> String {
        format!("{} - Room {}", self.block, self.room)
    }
}

/// Collapses inactive sessions into "no session".
pub fn live_session(session: Option<Session>) -> Option<Session> {
    session.filter(Session::is_live)
}

/// Instructor input for opening a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassDetails {
    pub course_id: String,
    pub section: String,
    pub block: String,
    pub room: String,
    #[serde(default)]
    pub starts_at: Option<NaiveTime>,
    #[serde(default)]
    pub ends_at: Option<NaiveTime>,
    pub location: Coordinates,
}

impl ClassDetails {
    pub fn into_session(self, id: SessionId, teacher_id: &str) -> Session {
        Session {
            id,
            course_id: self.course_id,
            section: self.section,
            block: self.block,
            room: self.room,
            teacher_id: teacher_id.to_string(),
            latitude: Some(self.location.latitude),
            longitude: Some(self.location.longitude),
            radius: None,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            active: true,
        }
    }
}
