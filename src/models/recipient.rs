use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A recipient leaves `pending` exactly once; the guarded UPDATEs in the
/// delivery path depend on that for at-least-once dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CampaignRecipient {
    pub id: String,
    pub campaign_id: String,
    pub email: String,
    /// JSON object of personalization variables, as supplied at creation.
    pub variables: String,
    /// Truncated hex sha256 of the lowercased address; correlates tracking
    /// events back to the row without storing the token payload.
    pub email_hash: String,
    pub status: RecipientStatus,
    pub sort_order: i64,
    pub tracking_token: Option<String>,
    pub sent_at: Option<i64>,
    pub failed_at: Option<i64>,
    pub opened_at: Option<i64>,
    pub clicked_at: Option<i64>,
    pub error_message: Option<String>,
}

impl CampaignRecipient {
    /// Parse the stored variables JSON into a flat string map. Non-string
    /// values are stringified; a corrupt blob yields just the address.
    pub fn variables_map(&self) -> HashMap<String, String> {
        let mut vars: HashMap<String, String> =
            match serde_json::from_str::<HashMap<String, serde_json::Value>>(&self.variables) {
                Ok(raw) => raw
                    .into_iter()
                    .map(|(k, v)| match v {
                        serde_json::Value::String(s) => (k, s),
                        other => (k, other.to_string()),
                    })
                    .collect(),
                Err(_) => HashMap::new(),
            };
        vars.entry("email".to_string())
            .or_insert_with(|| self.email.clone());
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient(variables: &str) -> CampaignRecipient {
        CampaignRecipient {
            id: "r1".into(),
            campaign_id: "c1".into(),
            email: "ada@example.com".into(),
            variables: variables.into(),
            email_hash: String::new(),
            status: RecipientStatus::Pending,
            sort_order: 0,
            tracking_token: None,
            sent_at: None,
            failed_at: None,
            opened_at: None,
            clicked_at: None,
            error_message: None,
        }
    }

    #[test]
    fn variables_map_stringifies_and_adds_email() {
        let r = recipient(r#"{"name":"Ada Lovelace","score":7}"#);
        let vars = r.variables_map();
        assert_eq!(vars.get("name").map(String::as_str), Some("Ada Lovelace"));
        assert_eq!(vars.get("score").map(String::as_str), Some("7"));
        assert_eq!(
            vars.get("email").map(String::as_str),
            Some("ada@example.com")
        );
    }

    #[test]
    fn corrupt_variables_fall_back_to_email_only() {
        let vars = recipient("not json").variables_map();
        assert_eq!(vars.len(), 1);
        assert!(vars.contains_key("email"));
    }
}
