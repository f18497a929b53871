//! API error responses
//!
//! Every handler error becomes `{ "error": { code, message, details? } }`.
//! The HTTP status is derived from the code, and each service error type
//! converts into an `ApiError` here so handlers can use `?` directly.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::platforms::PlatformError;
use crate::providers::ProviderError;
use crate::services::{
    AnalyticsError, AssetError, BillingError, CampaignServiceError, CreditError, GenerationError,
    OAuthError, PublishError, UserServiceError,
};

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: u64) -> Self {
        Self::with_details("RATE_LIMIT", message, json!({ "retry_after": retry_after }))
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new("NOT_CONFIGURED", message)
    }

    pub fn provider_error(message: impl Into<String>) -> Self {
        Self::new("PROVIDER_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and hide it from the client
    fn internal(error: &anyhow::Error) -> Self {
        tracing::error!(error = ?error, "Internal error");
        Self::internal_error("Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "INSUFFICIENT_CREDITS" => StatusCode::PAYMENT_REQUIRED,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            "PROVIDER_ERROR" => StatusCode::BAD_GATEWAY,
            "NOT_CONFIGURED" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => Self::unauthorized(msg),
            UserServiceError::ValidationError(msg) => Self::validation_error(msg),
            UserServiceError::UserExists(msg) => Self::conflict(msg),
            UserServiceError::InternalError(e) => Self::internal(&e),
        }
    }
}

impl From<CampaignServiceError> for ApiError {
    fn from(e: CampaignServiceError) -> Self {
        match e {
            CampaignServiceError::NotFound(_) => Self::not_found(e.to_string()),
            CampaignServiceError::ValidationError(msg) => Self::validation_error(msg),
            CampaignServiceError::NotEditable(status) => Self::with_details(
                "CONFLICT",
                e.to_string(),
                json!({ "status": status }),
            ),
            CampaignServiceError::Conflict(_) => Self::conflict(e.to_string()),
            CampaignServiceError::InvalidTransition { from, to } => Self::with_details(
                "CONFLICT",
                e.to_string(),
                json!({ "from": from, "to": to }),
            ),
            CampaignServiceError::InternalError(e) => Self::internal(&e),
        }
    }
}

impl From<CreditError> for ApiError {
    fn from(e: CreditError) -> Self {
        match e {
            CreditError::InsufficientCredits {
                required,
                available,
            } => Self::with_details(
                "INSUFFICIENT_CREDITS",
                e.to_string(),
                json!({ "required": required, "available": available }),
            ),
            CreditError::UserNotFound(_) => Self::not_found(e.to_string()),
            CreditError::InvalidAmount(_) => Self::validation_error(e.to_string()),
            CreditError::InternalError(e) => Self::internal(&e),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotConfigured(_) => Self::not_configured(e.to_string()),
            ProviderError::Unsupported { .. } => Self::validation_error(e.to_string()),
            _ => Self::provider_error(e.to_string()),
        }
    }
}

impl From<PlatformError> for ApiError {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::MediaRequired(_) | PlatformError::NoAccount(_) => {
                Self::validation_error(e.to_string())
            }
            _ => Self::provider_error(e.to_string()),
        }
    }
}

impl From<AssetError> for ApiError {
    fn from(e: AssetError) -> Self {
        match e {
            AssetError::NotFound(_) => Self::not_found(e.to_string()),
            AssetError::InternalError(e) => Self::internal(&e),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Campaign(e) => e.into(),
            GenerationError::Credit(e) => e.into(),
            GenerationError::Provider(e) => e.into(),
            GenerationError::Asset(e) => e.into(),
            GenerationError::NotAllowed(status) => Self::with_details(
                "CONFLICT",
                e.to_string(),
                json!({ "status": status }),
            ),
            GenerationError::RateLimited => {
                Self::rate_limited("Too many generation requests, slow down", 60)
            }
            GenerationError::InternalError(e) => Self::internal(&e),
        }
    }
}

impl From<OAuthError> for ApiError {
    fn from(e: OAuthError) -> Self {
        match e {
            OAuthError::NotConfigured(_) => Self::not_configured(e.to_string()),
            OAuthError::InvalidState => Self::validation_error(e.to_string()),
            OAuthError::NotConnected(_) => Self::not_found(e.to_string()),
            OAuthError::ReconnectRequired(platform) => Self::with_details(
                "FORBIDDEN",
                e.to_string(),
                json!({ "reconnect": platform }),
            ),
            OAuthError::Platform(e) => e.into(),
            OAuthError::InternalError(e) => Self::internal(&e),
        }
    }
}

impl From<PublishError> for ApiError {
    fn from(e: PublishError) -> Self {
        match e {
            PublishError::Campaign(e) => e.into(),
            PublishError::OAuth(e) => e.into(),
            PublishError::Platform(e) => e.into(),
            PublishError::Asset(e) => e.into(),
            PublishError::NotPublishable(_) | PublishError::AssetNotHosted(_) => {
                Self::conflict(e.to_string())
            }
            PublishError::ValidationError(msg) => Self::validation_error(msg),
            PublishError::InternalError(e) => Self::internal(&e),
        }
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(e: AnalyticsError) -> Self {
        match e {
            AnalyticsError::Campaign(e) => e.into(),
            AnalyticsError::ValidationError(msg) => Self::validation_error(msg),
            AnalyticsError::InternalError(e) => Self::internal(&e),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::NotConfigured => Self::not_configured(e.to_string()),
            BillingError::NoPriceForTier(_)
            | BillingError::InvalidSignature(_)
            | BillingError::InvalidPayload(_) => Self::validation_error(e.to_string()),
            BillingError::UserNotFound(_) => Self::not_found(e.to_string()),
            BillingError::Stripe { .. } => Self::provider_error(e.to_string()),
            BillingError::Credit(e) => e.into(),
            BillingError::InternalError(e) => Self::internal(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CampaignStatus, Platform};

    #[test]
    fn test_status_mapping() {
        let cases = [
            ("UNAUTHORIZED", StatusCode::UNAUTHORIZED),
            ("NOT_FOUND", StatusCode::NOT_FOUND),
            ("VALIDATION_ERROR", StatusCode::BAD_REQUEST),
            ("INSUFFICIENT_CREDITS", StatusCode::PAYMENT_REQUIRED),
            ("RATE_LIMIT", StatusCode::TOO_MANY_REQUESTS),
            ("PROVIDER_ERROR", StatusCode::BAD_GATEWAY),
            ("NOT_CONFIGURED", StatusCode::SERVICE_UNAVAILABLE),
            ("SOMETHING_ELSE", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, status) in cases {
            assert_eq!(ApiError::new(code, "x").status(), status, "{}", code);
        }
    }

    #[test]
    fn test_insufficient_credits_details() {
        let err: ApiError = CreditError::InsufficientCredits {
            required: 20,
            available: 3,
        }
        .into();
        assert_eq!(err.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(err.error.details, Some(json!({"required": 20, "available": 3})));
    }

    #[test]
    fn test_nested_errors_keep_their_code() {
        let err: ApiError =
            GenerationError::Campaign(CampaignServiceError::NotFound(7)).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = PublishError::OAuth(OAuthError::ReconnectRequired(Platform::TikTok)).into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.error.details, Some(json!({"reconnect": "tiktok"})));

        let err: ApiError = CampaignServiceError::InvalidTransition {
            from: CampaignStatus::Draft,
            to: CampaignStatus::Published,
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_internal_errors_are_hidden() {
        let err: ApiError = AssetError::InternalError(anyhow::anyhow!("disk on fire")).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.error.message.contains("disk"));
    }
}
