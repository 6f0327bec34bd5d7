use serde::{Deserialize, Serialize};

/// Geofence verdict computed by the verification service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Verdict {
    Present,
    Absent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionResult {
    #[serde(rename = "status")]
    pub verdict: Verdict,
    pub distance_meters: f64,
}

impl SubmissionResult {
    pub fn is_present(&self) -> bool {
        self.verdict == Verdict::Present
    }
}
