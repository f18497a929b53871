//! Common API utilities and shared types

use axum::http::{header, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

/// Session cookie lifetime, matching the session expiry
pub const SESSION_MAX_AGE_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Default page number (1-indexed)
pub fn default_page() -> i64 {
    1
}

/// Default page size
pub fn default_per_page() -> i64 {
    20
}

/// Pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

/// `?limit=` for history style listings
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Paginated list response
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> From<crate::models::PagedResult<T>> for PaginatedResponse<T> {
    fn from(result: crate::models::PagedResult<T>) -> Self {
        Self {
            total_pages: result.total_pages(),
            items: result.items,
            total: result.total,
            page: result.page,
            per_page: result.per_page,
        }
    }
}

/// `Set-Cookie` headers carrying a session token (or clearing it)
pub fn session_cookie(token: Option<&str>) -> HeaderMap {
    let cookie = match token {
        Some(token) => format!(
            "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            token, SESSION_MAX_AGE_SECONDS
        ),
        None => "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0".to_string(),
    };

    let mut headers = HeaderMap::new();
    // Tokens are uuids, so the header value is always valid
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.insert(header::SET_COOKIE, value);
    }
    headers
}

/// Client IP from proxy headers
pub fn client_ip(headers: &HeaderMap) -> Option<std::net::IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .and_then(|ip| ip.trim().parse().ok())
}
