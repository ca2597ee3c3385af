use serde::{Deserialize, Serialize};

/// Permanent vs. temporary delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BounceKind {
    Hard,
    Soft,
}

impl BounceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
        }
    }
}

/// At most one live record per (owner, address); a newer bounce overwrites
/// the kind/reason/timestamp of an older one.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BounceRecord {
    pub owner_id: String,
    pub email: String,
    pub kind: BounceKind,
    pub reason: String,
    pub campaign_id: Option<String>,
    pub bounced_at: i64,
}
