//! Entitlement snapshot types.
//!
//! These mirror the subscriber info the purchase provider reports: a map of
//! named entitlements ("premium", ...), each carrying the product that grants
//! it, its expiration, and renewal flags. Field names follow the provider's
//! camelCase wire format.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Billing period type of the transaction granting an entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeriodType {
    /// Regular paid period.
    #[default]
    Normal,
    /// Free trial period.
    Trial,
    /// Introductory-price period.
    Intro,
}

/// A single named entitlement grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSnapshot {
    /// Product identifier that granted this entitlement.
    pub product_identifier: String,

    /// Expiration as an RFC 3339 timestamp string; `None` for lifetime
    /// products.
    #[serde(default)]
    pub expiration_date: Option<String>,

    /// Whether the store expects the subscription to renew.
    #[serde(default)]
    pub will_renew: bool,

    /// Whether the entitlement is currently active.
    #[serde(default)]
    pub is_active: bool,

    /// Billing period type of the granting transaction.
    #[serde(default)]
    pub period_type: PeriodType,
}

impl EntitlementSnapshot {
    /// Create an active, renewing entitlement for a product.
    pub fn active(product_identifier: impl Into<String>, expiration_date: Option<String>) -> Self {
        Self {
            product_identifier: product_identifier.into(),
            expiration_date,
            will_renew: true,
            is_active: true,
            period_type: PeriodType::Normal,
        }
    }

    /// True while the entitlement is in a trial period.
    pub fn is_trial(&self) -> bool {
        self.period_type == PeriodType::Trial
    }
}

/// Snapshot of a subscriber's entitlements at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSnapshot {
    /// Entitlements keyed by entitlement identifier (e.g. "premium").
    #[serde(default)]
    pub entitlements: HashMap<String, EntitlementSnapshot>,

    /// Provider-side user identifier, when known.
    #[serde(default)]
    pub app_user_id: Option<String>,
}

impl CustomerSnapshot {
    /// Build a snapshot holding a single entitlement.
    pub fn with_entitlement(
        entitlement_id: impl Into<String>,
        entitlement: EntitlementSnapshot,
    ) -> Self {
        let mut entitlements = HashMap::new();
        entitlements.insert(entitlement_id.into(), entitlement);
        Self {
            entitlements,
            app_user_id: None,
        }
    }

    /// Look up an entitlement by id, returning it only if active.
    pub fn active_entitlement(&self, entitlement_id: &str) -> Option<&EntitlementSnapshot> {
        self.entitlements
            .get(entitlement_id)
            .filter(|e| e.is_active)
    }

    /// True if any entitlement is active.
    pub fn has_active_entitlement(&self) -> bool {
        self.entitlements.values().any(|e| e.is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_entitlement_filters_inactive() {
        let mut ent = EntitlementSnapshot::active("monthly_plan", None);
        ent.is_active = false;
        let snapshot = CustomerSnapshot::with_entitlement("premium", ent);

        assert!(snapshot.active_entitlement("premium").is_none());
        assert!(!snapshot.has_active_entitlement());
    }

    #[test]
    fn test_active_entitlement_missing_id() {
        let snapshot = CustomerSnapshot::with_entitlement(
            "premium",
            EntitlementSnapshot::active("monthly_plan", None),
        );
        assert!(snapshot.active_entitlement("pro").is_none());
        assert!(snapshot.active_entitlement("premium").is_some());
    }

    #[test]
    fn test_wire_format_field_names() {
        let json = r#"{
            "entitlements": {
                "premium": {
                    "productIdentifier": "yearly_plan",
                    "expirationDate": "2025-01-01T00:00:00Z",
                    "willRenew": true,
                    "isActive": true,
                    "periodType": "NORMAL"
                }
            },
            "appUserId": "user-1"
        }"#;
        let snapshot: CustomerSnapshot = serde_json::from_str(json).unwrap();
        let ent = snapshot.active_entitlement("premium").unwrap();
        assert_eq!(ent.product_identifier, "yearly_plan");
        assert_eq!(
            ent.expiration_date.as_deref(),
            Some("2025-01-01T00:00:00Z")
        );
        assert!(ent.will_renew);
    }

    #[test]
    fn test_trial_period_type() {
        let mut ent = EntitlementSnapshot::active("monthly_plan", None);
        ent.period_type = PeriodType::Trial;
        assert!(ent.is_trial());
    }
}
