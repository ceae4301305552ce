use serde::Serialize;

/// Lifecycle of an enhancement as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Done,
    Failed,
}

impl JobState {
    /// Maps a vendor state or legacy status label onto the four-state
    /// lifecycle. Topaz responses carry either a `state` with the canonical
    /// names or an older `status` string; both go through here.
    pub fn from_label(label: &str) -> Option<JobState> {
        let label = label.trim();
        if label.eq_ignore_ascii_case("pending") || label.eq_ignore_ascii_case("queued") {
            Some(JobState::Pending)
        } else if label.eq_ignore_ascii_case("processing") || label.eq_ignore_ascii_case("running")
        {
            Some(JobState::Processing)
        } else if label.eq_ignore_ascii_case("done") || label.eq_ignore_ascii_case("completed") {
            Some(JobState::Done)
        } else if label.eq_ignore_ascii_case("failed")
            || label.eq_ignore_ascii_case("error")
            || label.eq_ignore_ascii_case("cancelled")
            || label.eq_ignore_ascii_case("canceled")
        {
            Some(JobState::Failed)
        } else {
            None
        }
    }
}

/// Normalized status body for GET /api/v1/status/{process_id}.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Percent complete, clamped to 0..=100.
    pub progress: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits: Option<f64>,
}

impl StatusReport {
    /// Report for a directly processed result: finished the moment it was
    /// cached, so there is nothing left to poll.
    pub fn direct_done() -> Self {
        StatusReport {
            state: JobState::Done,
            status: Some("completed".to_string()),
            progress: 100,
            error: None,
            output_width: None,
            output_height: None,
            output_format: None,
            credits: None,
        }
    }
}
