// src/models/auth.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The minimal set of fields needed to rebuild a refreshable authenticated
/// session against the token endpoint. Cached in the session at OAuth
/// callback time and read back by the upload workflow.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenBundle {
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(|token| !token.is_empty())
            .unwrap_or(false)
    }

    /// True when the access token is stale or will go stale within the next
    /// five minutes. An unknown expiry counts as stale.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => expiry < now + Duration::minutes(5),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(refresh: Option<&str>, expires_at: Option<DateTime<Utc>>) -> TokenBundle {
        TokenBundle {
            access_token: "ya29.token".to_string(),
            refresh_token: refresh.map(|r| r.to_string()),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/youtube.upload".to_string()],
            expires_at,
        }
    }

    #[test]
    fn test_empty_refresh_token_counts_as_missing() {
        assert!(!bundle(None, None).has_refresh_token());
        assert!(!bundle(Some(""), None).has_refresh_token());
        assert!(bundle(Some("1//refresh"), None).has_refresh_token());
    }

    #[test]
    fn test_needs_refresh_inside_expiry_margin() {
        let now = Utc::now();
        // Expires in two minutes: inside the five-minute margin
        assert!(bundle(Some("r"), Some(now + Duration::minutes(2))).needs_refresh(now));
        // Expires in an hour: still fresh
        assert!(!bundle(Some("r"), Some(now + Duration::hours(1))).needs_refresh(now));
        // Unknown expiry is treated as stale
        assert!(bundle(Some("r"), None).needs_refresh(now));
    }
}
