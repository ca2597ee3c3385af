/// Campaign row and its lifecycle state machine
use serde::{Deserialize, Serialize};

/// Lifecycle: `queued -> running <-> paused`, and `running` can end in
/// `completed`, `stopped` or `error`. Terminal states are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CampaignStatus {
    Queued,
    Running,
    Paused,
    Completed,
    Stopped,
    Error,
}

impl CampaignStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "stopped" => Some(Self::Stopped),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Error)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Campaign {
    pub id: String,
    pub owner_id: String,
    pub status: CampaignStatus,
    pub total_count: i64,
    pub sent_count: i64,
    pub failed_count: i64,
    pub delay_min_ms: i64,
    pub delay_max_ms: i64,
    pub subject_template: String,
    pub body_template: String,
    pub from_address: String,
    pub from_name: Option<String>,
    pub track_opens: bool,
    /// Serialized relay credentials, present only while the campaign is
    /// live and no fast-path cache entry is available (degraded mode).
    pub relay_snapshot: Option<String>,
    /// Unix millis hint for "next send at" countdowns; advisory only.
    pub next_email_at: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub paused_at: Option<i64>,
    pub completed_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for s in [
            CampaignStatus::Queued,
            CampaignStatus::Running,
            CampaignStatus::Paused,
            CampaignStatus::Completed,
            CampaignStatus::Stopped,
            CampaignStatus::Error,
        ] {
            assert_eq!(CampaignStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(CampaignStatus::from_str("deleted"), None);
    }

    #[test]
    fn terminal_states_are_flagged() {
        assert!(CampaignStatus::Completed.is_terminal());
        assert!(CampaignStatus::Stopped.is_terminal());
        assert!(CampaignStatus::Error.is_terminal());
        assert!(!CampaignStatus::Running.is_terminal());
        assert!(!CampaignStatus::Paused.is_terminal());
        assert!(!CampaignStatus::Queued.is_terminal());
    }
}
