//! OAuth connection model
//!
//! Stored access/refresh tokens that allow publishing to a user's social
//! account. Tokens are never serialized into API responses.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::Platform;

/// Seconds subtracted from `expires_at` so a token is refreshed before the
/// platform starts rejecting it.
const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConnection {
    pub id: i64,
    pub user_id: i64,
    pub platform: Platform,
    /// Platform account the token acts as (page id, IG user id, open id, channel id)
    pub account_id: String,
    pub account_name: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub scopes: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OAuthConnection {
    /// Whether the access token is (about to be) expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - Duration::seconds(EXPIRY_SKEW_SECONDS) <= now,
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_ref().is_some_and(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(expires_at: Option<DateTime<Utc>>) -> OAuthConnection {
        let now = Utc::now();
        OAuthConnection {
            id: 1,
            user_id: 1,
            platform: Platform::YouTube,
            account_id: "UC123".into(),
            account_name: None,
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            scopes: String::new(),
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_expiry_with_skew() {
        let now = Utc::now();
        assert!(!connection(None).is_expired(now));
        assert!(!connection(Some(now + Duration::hours(1))).is_expired(now));
        assert!(connection(Some(now + Duration::seconds(30))).is_expired(now));
        assert!(connection(Some(now - Duration::seconds(1))).is_expired(now));
    }

    #[test]
    fn test_tokens_not_serialized() {
        let json = serde_json::to_string(&connection(None)).unwrap();
        assert!(!json.contains("\"access_token\""));
        assert!(!json.contains("\"refresh_token\""));
        assert!(json.contains("\"platform\":\"youtube\""));
    }
}
