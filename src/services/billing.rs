//! Stripe billing
//!
//! Checkout sessions upgrade a user's tier; webhooks keep tier and credit
//! allowance in sync with the subscription. Webhook payloads are verified
//! against the `Stripe-Signature` header and processed at most once.

use super::credits::{CreditError, CreditService};
use crate::config::BillingConfig;
use crate::db::repositories::{BillingEventRepository, UserRepository};
use crate::models::{SubscriptionTier, User};
use anyhow::Context;
use chrono::Utc;
use data_encoding::HEXLOWER_PERMISSIVE;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const INVOICE_PAID: &str = "invoice.paid";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Billing is not configured")]
    NotConfigured,

    #[error("No price is configured for the {0} plan")]
    NoPriceForTier(SubscriptionTier),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Stripe API error ({status}): {message}")]
    Stripe { status: u16, message: String },

    #[error(transparent)]
    Credit(#[from] CreditError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    Processed,
    Duplicate,
    Ignored,
}

/// Check a `Stripe-Signature` header (`t=...,v1=...[,v1=...]`).
///
/// Any `v1` entry matching HMAC-SHA256 of `"{t}.{payload}"` is accepted;
/// timestamps older than `tolerance` seconds are rejected.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance: i64,
) -> Result<(), BillingError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp_str =
        timestamp.ok_or_else(|| BillingError::InvalidSignature("missing timestamp".into()))?;
    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| BillingError::InvalidSignature("malformed timestamp".into()))?;
    if signatures.is_empty() {
        return Err(BillingError::InvalidSignature("missing v1 signature".into()));
    }
    if now - timestamp > tolerance {
        return Err(BillingError::InvalidSignature(
            "timestamp outside the tolerance window".into(),
        ));
    }

    for signature in signatures {
        let Ok(expected) = HEXLOWER_PERMISSIVE.decode(signature.as_bytes()) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| BillingError::InternalError(anyhow::anyhow!("HMAC key: {}", e)))?;
        mac.update(timestamp_str.as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }
    Err(BillingError::InvalidSignature("no matching signature".into()))
}

pub struct BillingService {
    users: Arc<dyn UserRepository>,
    events: Arc<dyn BillingEventRepository>,
    credits: Arc<CreditService>,
    config: BillingConfig,
    client: reqwest::Client,
}

impl BillingService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        events: Arc<dyn BillingEventRepository>,
        credits: Arc<CreditService>,
        config: BillingConfig,
        client: reqwest::Client,
    ) -> Self {
        Self {
            users,
            events,
            credits,
            config,
            client,
        }
    }

    /// Start a subscription checkout for `tier`
    pub async fn create_checkout(
        &self,
        user_id: i64,
        tier: SubscriptionTier,
    ) -> Result<CheckoutSession, BillingError> {
        if self.config.stripe_secret_key.is_empty() {
            return Err(BillingError::NotConfigured);
        }
        let price = self
            .config
            .prices
            .get(&tier)
            .filter(|_| tier != SubscriptionTier::Free)
            .ok_or(BillingError::NoPriceForTier(tier))?;
        let user = self.user(user_id).await?;

        let user_id = user.id.to_string();
        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "subscription"),
            ("line_items[0][price]", price.as_str()),
            ("line_items[0][quantity]", "1"),
            ("client_reference_id", user_id.as_str()),
            ("metadata[tier]", tier.as_str()),
            ("metadata[price]", price.as_str()),
            ("success_url", self.config.success_url.as_str()),
            ("cancel_url", self.config.cancel_url.as_str()),
        ];
        // Stripe rejects customer and customer_email together
        match &user.stripe_customer_id {
            Some(customer) => form.push(("customer", customer.as_str())),
            None => form.push(("customer_email", user.email.as_str())),
        }

        let response = self
            .client
            .post(format!(
                "{}/v1/checkout/sessions",
                self.config.api_base.trim_end_matches('/')
            ))
            .bearer_auth(&self.config.stripe_secret_key)
            .form(&form)
            .send()
            .await
            .context("Stripe request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Stripe checkout failed");
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or(body);
            return Err(BillingError::Stripe {
                status: status.as_u16(),
                message,
            });
        }

        let session: CheckoutSession = response
            .json()
            .await
            .context("Failed to parse Stripe checkout session")?;
        info!(user_id = user.id, %tier, session_id = %session.id, "Created checkout session");
        Ok(session)
    }

    /// Verify and process a raw webhook body
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<EventOutcome, BillingError> {
        if self.config.stripe_webhook_secret.is_empty() {
            return Err(BillingError::NotConfigured);
        }
        verify_signature(
            payload,
            signature_header,
            &self.config.stripe_webhook_secret,
            Utc::now().timestamp(),
            self.config.webhook_tolerance_seconds,
        )?;
        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;
        self.handle_event(&event).await
    }

    /// Apply an event once; repeats of a processed event id are no-ops
    pub async fn handle_event(&self, event: &StripeEvent) -> Result<EventOutcome, BillingError> {
        if !matches!(
            event.event_type.as_str(),
            CHECKOUT_COMPLETED | INVOICE_PAID | SUBSCRIPTION_DELETED
        ) {
            return Ok(EventOutcome::Ignored);
        }
        if !self
            .events
            .record(&event.id, &event.event_type)
            .await
            .context("Failed to claim billing event")?
        {
            info!(event_id = %event.id, "Skipping duplicate billing event");
            return Ok(EventOutcome::Duplicate);
        }

        let object = &event.data.object;
        let result = match event.event_type.as_str() {
            CHECKOUT_COMPLETED => self.checkout_completed(object).await,
            INVOICE_PAID => self.invoice_paid(object).await,
            _ => self.subscription_deleted(object).await,
        };

        // Unapplied events stay deliverable
        if !matches!(result, Ok(EventOutcome::Processed)) {
            if let Err(e) = self.events.release(&event.id).await {
                warn!(event_id = %event.id, error = %e, "Failed to release billing event");
            }
        }
        result
    }

    async fn checkout_completed(&self, session: &Value) -> Result<EventOutcome, BillingError> {
        let user_id = str_field(session, "/client_reference_id")
            .and_then(|id| id.parse::<i64>().ok())
            .ok_or_else(|| BillingError::InvalidPayload("missing client_reference_id".into()))?;
        let tier = str_field(session, "/metadata/tier")
            .and_then(|t| t.parse::<SubscriptionTier>().ok())
            .or_else(|| {
                str_field(session, "/metadata/price").and_then(|p| self.config.tier_for_price(p))
            })
            .ok_or_else(|| BillingError::InvalidPayload("cannot determine plan tier".into()))?;

        let mut user = self.user(user_id).await?;
        user.tier = tier;
        if let Some(customer) = str_field(session, "/customer") {
            user.stripe_customer_id = Some(customer.to_string());
        }
        self.users
            .update(&user)
            .await
            .context("Failed to update subscription")?;
        let balance = self.credits.reset_to_allowance(user.id, tier).await?;

        info!(user_id, %tier, balance, "Subscription started");
        Ok(EventOutcome::Processed)
    }

    async fn invoice_paid(&self, invoice: &Value) -> Result<EventOutcome, BillingError> {
        let Some(mut user) = self.customer(invoice).await? else {
            return Ok(EventOutcome::Ignored);
        };
        let invoiced_tier = str_field(invoice, "/lines/data/0/price/id")
            .and_then(|price| self.config.tier_for_price(price));
        if let Some(tier) = invoiced_tier.filter(|t| *t != user.tier) {
            user.tier = tier;
            self.users
                .update(&user)
                .await
                .context("Failed to update subscription")?;
        }

        let balance = self.credits.reset_to_allowance(user.id, user.tier).await?;
        info!(user_id = user.id, tier = %user.tier, balance, "Invoice paid, credits renewed");
        Ok(EventOutcome::Processed)
    }

    async fn subscription_deleted(&self, subscription: &Value) -> Result<EventOutcome, BillingError> {
        let Some(mut user) = self.customer(subscription).await? else {
            return Ok(EventOutcome::Ignored);
        };
        user.tier = SubscriptionTier::Free;
        self.users
            .update(&user)
            .await
            .context("Failed to update subscription")?;
        info!(user_id = user.id, "Subscription cancelled");
        Ok(EventOutcome::Processed)
    }

    async fn customer(&self, object: &Value) -> Result<Option<User>, BillingError> {
        let Some(customer) = str_field(object, "/customer") else {
            return Err(BillingError::InvalidPayload("missing customer".into()));
        };
        let user = self
            .users
            .get_by_stripe_customer(customer)
            .await
            .context("Failed to look up Stripe customer")?;
        if user.is_none() {
            warn!(customer, "Billing event for unknown customer");
        }
        Ok(user)
    }

    async fn user(&self, user_id: i64) -> Result<User, BillingError> {
        self.users
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(BillingError::UserNotFound(user_id))
    }
}

fn str_field<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Build a valid `Stripe-Signature` header
#[cfg(test)]
pub(crate) fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let signature = data_encoding::HEXLOWER.encode(&mac.finalize().into_bytes());
    format!("t={},v1={}", timestamp, signature)
}
