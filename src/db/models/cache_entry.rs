use chrono::{DateTime, Utc};

/// One row of the shared key/value cache. `value` is `None` once the key was cleared,
/// so watchers still see the revision bump.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Option<String>,
    pub writer: String,
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}
