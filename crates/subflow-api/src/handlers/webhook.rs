//! RevenueCat webhook handler.
//!
//! RevenueCat POSTs one JSON envelope per store event. The handler verifies
//! the shared secret, maps the event onto an [`EntitlementUpdate`], and hands
//! it to the entitlement service. The response is always 200 for accepted
//! events so RevenueCat stops re-delivering; duplicates are detected by
//! transaction id and acknowledged without a second credit write.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use subflow_models::{
    is_credit_package, CustomerSnapshot, EntitlementSnapshot, PeriodType, SubscriptionStatus,
};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::middleware::require_shared_secret;
use crate::services::EntitlementUpdate;
use crate::state::AppState;

/// Webhook envelope as delivered by RevenueCat.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub api_version: Option<String>,
    pub event: WebhookEvent,
}

/// One store event inside the envelope. Unknown fields are ignored.
#[derive(Debug, Deserialize, Validate)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[validate(length(min = 1, max = 128))]
    pub app_user_id: String,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub entitlement_ids: Option<Vec<String>>,
    /// NORMAL, TRIAL or INTRO.
    #[serde(default)]
    pub period_type: Option<String>,
    #[serde(default)]
    pub expiration_at_ms: Option<i64>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub store: Option<String>,
}

/// Acknowledgement returned to RevenueCat.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub event_type: String,
    pub strategy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits: Option<u32>,
    pub duplicate: bool,
}

/// POST /webhooks/revenuecat
pub async fn revenuecat_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(envelope): Json<WebhookEnvelope>,
) -> ApiResult<Json<WebhookAck>> {
    if let Err(e) = require_shared_secret(&headers, state.config.webhook_auth_token.as_deref()) {
        metrics::record_webhook_rejected("auth");
        return Err(e);
    }

    let event = envelope.event;
    event.validate().map_err(|e| {
        metrics::record_webhook_rejected("validation");
        ApiError::Validation(e.to_string())
    })?;

    metrics::record_webhook_event(&event.event_type);
    info!(
        event_type = %event.event_type,
        user_id = %event.app_user_id,
        product_id = ?event.product_id,
        store = ?event.store,
        "Webhook event received"
    );

    let update = match build_update(&state.config.entitlement_id, &event) {
        Some(update) => update,
        None => {
            // Events with no entitlement consequence (billing issues, ...)
            // are acknowledged without processing.
            return Ok(Json(WebhookAck {
                received: true,
                event_type: event.event_type,
                strategy: "none".to_string(),
                credits: None,
                duplicate: false,
            }));
        }
    };

    let processed = state.entitlements.process_update(update).await.map_err(|e| {
        warn!(
            user_id = %event.app_user_id,
            event_type = %event.event_type,
            error = %e,
            "Webhook processing failed"
        );
        e
    })?;

    Ok(Json(WebhookAck {
        received: true,
        event_type: event.event_type,
        strategy: processed.strategy.as_str().to_string(),
        credits: processed.credits_after,
        duplicate: processed.duplicate,
    }))
}

/// Map a store event onto a service-level update. Returns `None` for event
/// types this service does not act on.
fn build_update(entitlement_id: &str, event: &WebhookEvent) -> Option<EntitlementUpdate> {
    let trial = matches!(event.period_type.as_deref(), Some("TRIAL"));
    let (entitlement_active, status) = match event.event_type.as_str() {
        "INITIAL_PURCHASE" | "RENEWAL" | "PRODUCT_CHANGE" | "UNCANCELLATION" => {
            let status = if trial {
                SubscriptionStatus::Trial
            } else {
                SubscriptionStatus::Premium
            };
            (true, status)
        }
        "CANCELLATION" => {
            // Auto-renew turned off; access continues until expiration.
            let status = if trial {
                SubscriptionStatus::TrialCanceled
            } else {
                SubscriptionStatus::PremiumCanceled
            };
            (true, status)
        }
        "EXPIRATION" => (false, SubscriptionStatus::Expired),
        "NON_RENEWING_PURCHASE" => {
            // Consumable credit packages do not grant an entitlement; other
            // non-renewing purchases do, for their period.
            let consumable = is_credit_package(event.product_id.as_deref());
            (!consumable, SubscriptionStatus::Premium)
        }
        "TRANSFER" | "SUBSCRIPTION_PAUSED" => (true, SubscriptionStatus::Premium),
        // Billing issues and test events carry no entitlement change.
        _ => return None,
    };

    // Only events carrying a fresh store transaction are purchases; the rest
    // re-check the status an existing balance was already granted under, so
    // they must never reset or top up credits.
    let is_status_sync = matches!(
        event.event_type.as_str(),
        "CANCELLATION" | "UNCANCELLATION" | "EXPIRATION" | "TRANSFER" | "SUBSCRIPTION_PAUSED"
    );

    let mut customer = CustomerSnapshot::default();
    customer.app_user_id = Some(event.app_user_id.clone());
    if entitlement_active {
        if let Some(product_id) = &event.product_id {
            let snapshot = EntitlementSnapshot {
                product_identifier: product_id.clone(),
                expiration_date: event.expiration_at_ms.and_then(ms_to_rfc3339),
                will_renew: status == SubscriptionStatus::Premium
                    || status == SubscriptionStatus::Trial,
                is_active: true,
                period_type: if trial {
                    PeriodType::Trial
                } else {
                    PeriodType::Normal
                },
            };
            customer
                .entitlements
                .insert(entitlement_id.to_string(), snapshot);
        }
    }

    Some(EntitlementUpdate {
        user_id: event.app_user_id.clone(),
        customer,
        status,
        is_status_sync,
        purchase_id: event.transaction_id.clone(),
        purchased_product_id: event.product_id.clone(),
    })
}

/// Convert epoch milliseconds to an RFC 3339 timestamp string.
fn ms_to_rfc3339(ms: i64) -> Option<String> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str) -> WebhookEvent {
        WebhookEvent {
            event_type: event_type.to_string(),
            app_user_id: "user-1".to_string(),
            product_id: Some("premium_monthly".to_string()),
            entitlement_ids: Some(vec!["premium".to_string()]),
            period_type: Some("NORMAL".to_string()),
            expiration_at_ms: Some(1_735_689_600_000),
            transaction_id: Some("txn-1".to_string()),
            store: Some("APP_STORE".to_string()),
        }
    }

    #[test]
    fn test_initial_purchase_maps_to_premium() {
        let update = build_update("premium", &event("INITIAL_PURCHASE")).unwrap();
        assert_eq!(update.status, SubscriptionStatus::Premium);
        assert!(!update.is_status_sync);
        assert!(update.customer.active_entitlement("premium").is_some());
        assert_eq!(update.purchase_id.as_deref(), Some("txn-1"));
    }

    #[test]
    fn test_trial_period_maps_to_trial_status() {
        let mut ev = event("INITIAL_PURCHASE");
        ev.period_type = Some("TRIAL".to_string());
        let update = build_update("premium", &ev).unwrap();
        assert_eq!(update.status, SubscriptionStatus::Trial);
    }

    #[test]
    fn test_cancellation_keeps_entitlement_active() {
        let update = build_update("premium", &event("CANCELLATION")).unwrap();
        assert_eq!(update.status, SubscriptionStatus::PremiumCanceled);
        assert!(update.is_status_sync);
        assert!(update.customer.active_entitlement("premium").is_some());
    }

    #[test]
    fn test_uncancellation_is_status_sync() {
        let update = build_update("premium", &event("UNCANCELLATION")).unwrap();
        assert_eq!(update.status, SubscriptionStatus::Premium);
        assert!(update.is_status_sync);
    }

    #[test]
    fn test_expiration_clears_entitlement() {
        let update = build_update("premium", &event("EXPIRATION")).unwrap();
        assert_eq!(update.status, SubscriptionStatus::Expired);
        assert!(update.is_status_sync);
        assert!(update.customer.active_entitlement("premium").is_none());
    }

    #[test]
    fn test_expiration_preserves_spent_balance() {
        use subflow_models::{allocate, CreditAllocationParams, CreditDocument};

        // Stores re-deliver EXPIRATION without a transaction id, so the
        // idempotency history cannot catch it; the allocation itself must
        // leave a partially spent balance alone.
        let mut ev = event("EXPIRATION");
        ev.transaction_id = None;
        let update = build_update("premium", &ev).unwrap();

        let existing = CreditDocument {
            credits: 40,
            processed_purchases: vec!["txn-old".to_string()],
        };
        let params = CreditAllocationParams {
            status: update.status,
            is_status_sync: update.is_status_sync,
            existing: Some(existing),
            credit_limit: 100,
            is_subscription_active: false,
            product_id: update.purchased_product_id.clone(),
        };
        assert_eq!(allocate(&params, 5), 40);
    }

    #[test]
    fn test_transfer_is_status_sync() {
        let update = build_update("premium", &event("TRANSFER")).unwrap();
        assert!(update.is_status_sync);
    }

    #[test]
    fn test_credit_package_purchase_has_no_entitlement() {
        let mut ev = event("NON_RENEWING_PURCHASE");
        ev.product_id = Some("credit_pack_50".to_string());
        let update = build_update("premium", &ev).unwrap();
        assert!(update.customer.active_entitlement("premium").is_none());
        assert_eq!(update.purchased_product_id.as_deref(), Some("credit_pack_50"));
    }

    #[test]
    fn test_billing_issue_is_ignored() {
        assert!(build_update("premium", &event("BILLING_ISSUE")).is_none());
    }

    #[test]
    fn test_ms_to_rfc3339() {
        let ts = ms_to_rfc3339(1_735_689_600_000).unwrap();
        assert!(ts.starts_with("2025-01-01T00:00:00"));
    }

    #[test]
    fn test_envelope_parses_wire_format() {
        let json = r#"{
            "api_version": "1.0",
            "event": {
                "type": "RENEWAL",
                "app_user_id": "user-9",
                "product_id": "premium_yearly",
                "entitlement_ids": ["premium"],
                "period_type": "NORMAL",
                "expiration_at_ms": 1735689600000,
                "transaction_id": "txn-42",
                "store": "PLAY_STORE",
                "environment": "PRODUCTION"
            }
        }"#;
        let envelope: WebhookEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.event.event_type, "RENEWAL");
        assert_eq!(envelope.event.app_user_id, "user-9");
    }
}
