//! Renewal and plan-change detection.
//!
//! Given the last-observed `(expiration, product)` pair for a user and a
//! fresh customer snapshot, classifies the transition as a renewal (same
//! product, expiration moved strictly forward), a plan change (different
//! product, upgrade/downgrade by package tier), or neither.
//!
//! The detector is pure and never fails: malformed expiration strings and
//! missing entitlements degrade to "nothing detected" rather than erroring.
//! Each call returns the outcome paired with the next state to store, so the
//! detect-then-commit protocol cannot be half-applied.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entitlement::CustomerSnapshot;
use crate::package_tier::PackageTier;

/// Last-observed entitlement snapshot for one user.
///
/// Lives in memory for the process lifetime only; losing it on restart means
/// the next observation is treated as a cold start, never as a renewal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RenewalState {
    /// Expiration seen on the previous evaluation (RFC 3339 string).
    pub previous_expiration: Option<String>,
    /// Product identifier seen on the previous evaluation.
    pub previous_product_id: Option<String>,
}

impl RenewalState {
    /// State for a user observed for the first time.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if no prior observation exists.
    pub fn is_cold_start(&self) -> bool {
        self.previous_expiration.is_none() || self.previous_product_id.is_none()
    }
}

/// Classification of one entitlement transition. Derived per evaluation,
/// never stored.
///
/// At most one of `is_renewal` / `is_plan_change` is true. `is_upgrade` and
/// `is_downgrade` are mutually exclusive and only meaningful when
/// `is_plan_change` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RenewalOutcome {
    /// Same product, expiration moved strictly forward.
    pub is_renewal: bool,
    /// Product identifier changed within the entitlement.
    pub is_plan_change: bool,
    /// Plan change to a strictly higher package tier.
    pub is_upgrade: bool,
    /// Plan change to a strictly lower package tier.
    pub is_downgrade: bool,
    /// Product granting the entitlement now, if any.
    pub product_id: Option<String>,
    /// Product observed on the previous evaluation.
    pub previous_product_id: Option<String>,
    /// Current expiration (RFC 3339 string), if any.
    pub new_expiration: Option<String>,
}

impl RenewalOutcome {
    /// Outcome for "no active entitlement": all flags false, no product.
    fn noop(previous_product_id: Option<String>) -> Self {
        Self {
            previous_product_id,
            ..Self::default()
        }
    }

    /// The state a caller must store after this evaluation.
    pub fn next_state(&self) -> RenewalState {
        RenewalState {
            previous_expiration: self.new_expiration.clone(),
            previous_product_id: self.product_id.clone(),
        }
    }
}

/// Parse an RFC 3339 expiration string, treating failures as absent.
fn parse_expiration(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Classify the transition from `state` to the entitlement named
/// `entitlement_id` in `customer`.
///
/// Returns the outcome together with the state the caller must commit.
/// State transition rules, in order:
///
/// 1. No active matching entitlement: no-op outcome.
/// 2. Cold start (either previous field missing): carry the new
///    product/expiration, set no flags. The first sighting of a subscription
///    is never a renewal, even when the dates would suggest one.
/// 3. Current expiration absent (lifetime product): not a renewal.
/// 4. Different product: plan change; package tiers decide
///    upgrade/downgrade, equal tiers set neither.
/// 5. Same product: renewal iff the new expiration parses and is strictly
///    later than the previous one. Either side failing to parse means no
///    renewal.
pub fn detect(
    state: &RenewalState,
    customer: &CustomerSnapshot,
    entitlement_id: &str,
) -> (RenewalOutcome, RenewalState) {
    let Some(entitlement) = customer.active_entitlement(entitlement_id) else {
        let outcome = RenewalOutcome::noop(state.previous_product_id.clone());
        let next = outcome.next_state();
        return (outcome, next);
    };

    let product_id = entitlement.product_identifier.clone();
    let new_expiration = entitlement.expiration_date.clone();

    let mut outcome = RenewalOutcome {
        product_id: Some(product_id.clone()),
        previous_product_id: state.previous_product_id.clone(),
        new_expiration: new_expiration.clone(),
        ..RenewalOutcome::default()
    };

    if state.is_cold_start() {
        let next = outcome.next_state();
        return (outcome, next);
    }

    let Some(current_raw) = new_expiration.as_deref() else {
        // Lifetime products have no expiration to move forward.
        let next = outcome.next_state();
        return (outcome, next);
    };

    // is_cold_start() above guarantees both previous fields are present.
    let previous_product = state.previous_product_id.as_deref().unwrap_or_default();
    let previous_raw = state.previous_expiration.as_deref().unwrap_or_default();

    if product_id != previous_product {
        outcome.is_plan_change = true;
        let old_tier = PackageTier::classify(Some(previous_product));
        let new_tier = PackageTier::classify(Some(&product_id));
        outcome.is_upgrade = new_tier > old_tier;
        outcome.is_downgrade = new_tier < old_tier;
    } else {
        // Same product: extended iff both timestamps parse and the new one is
        // strictly later. Malformed data is not a renewal signal.
        let extended = match (parse_expiration(previous_raw), parse_expiration(current_raw)) {
            (Some(prev), Some(current)) => current > prev,
            _ => false,
        };
        outcome.is_renewal = extended;
    }

    let next = outcome.next_state();
    (outcome, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::EntitlementSnapshot;

    const ENTITLEMENT: &str = "premium";

    fn state(expiration: &str, product: &str) -> RenewalState {
        RenewalState {
            previous_expiration: Some(expiration.to_string()),
            previous_product_id: Some(product.to_string()),
        }
    }

    fn customer(product: &str, expiration: Option<&str>) -> CustomerSnapshot {
        CustomerSnapshot::with_entitlement(
            ENTITLEMENT,
            EntitlementSnapshot::active(product, expiration.map(|s| s.to_string())),
        )
    }

    #[test]
    fn test_no_active_entitlement_is_noop() {
        let state = state("2024-01-01T00:00:00Z", "monthly_plan");
        let (outcome, next) = detect(&state, &CustomerSnapshot::default(), ENTITLEMENT);

        assert!(!outcome.is_renewal);
        assert!(!outcome.is_plan_change);
        assert!(outcome.product_id.is_none());
        // State commits the no-op observation.
        assert_eq!(next, RenewalState::empty());
    }

    #[test]
    fn test_cold_start_never_classifies() {
        let customer = customer("monthly_plan", Some("2024-02-01T00:00:00Z"));
        let (outcome, next) = detect(&RenewalState::empty(), &customer, ENTITLEMENT);

        assert!(!outcome.is_renewal);
        assert!(!outcome.is_plan_change);
        assert_eq!(outcome.product_id.as_deref(), Some("monthly_plan"));
        assert_eq!(
            next.previous_expiration.as_deref(),
            Some("2024-02-01T00:00:00Z")
        );
        assert_eq!(next.previous_product_id.as_deref(), Some("monthly_plan"));
    }

    #[test]
    fn test_cold_start_with_partial_state() {
        // Only one previous field present still counts as cold start.
        let partial = RenewalState {
            previous_expiration: Some("2024-01-01T00:00:00Z".to_string()),
            previous_product_id: None,
        };
        let customer = customer("monthly_plan", Some("2024-02-01T00:00:00Z"));
        let (outcome, _) = detect(&partial, &customer, ENTITLEMENT);
        assert!(!outcome.is_renewal);
        assert!(!outcome.is_plan_change);
    }

    #[test]
    fn test_lifetime_product_is_not_a_renewal() {
        let state = state("2024-01-01T00:00:00Z", "lifetime_unlock");
        let customer = customer("lifetime_unlock", None);
        let (outcome, next) = detect(&state, &customer, ENTITLEMENT);

        assert!(!outcome.is_renewal);
        assert!(!outcome.is_plan_change);
        assert_eq!(outcome.product_id.as_deref(), Some("lifetime_unlock"));
        assert!(next.previous_expiration.is_none());
    }

    #[test]
    fn test_same_product_later_expiration_is_renewal() {
        let state = state("2024-01-01T00:00:00Z", "monthly_plan");
        let customer = customer("monthly_plan", Some("2024-02-01T00:00:00Z"));
        let (outcome, _) = detect(&state, &customer, ENTITLEMENT);

        assert!(outcome.is_renewal);
        assert!(!outcome.is_plan_change);
        assert!(!outcome.is_upgrade);
        assert!(!outcome.is_downgrade);
    }

    #[test]
    fn test_equal_expiration_is_not_a_renewal() {
        let state = state("2024-01-01T00:00:00Z", "monthly_plan");
        let customer = customer("monthly_plan", Some("2024-01-01T00:00:00Z"));
        let (outcome, _) = detect(&state, &customer, ENTITLEMENT);
        assert!(!outcome.is_renewal);
    }

    #[test]
    fn test_earlier_expiration_is_not_a_renewal() {
        let state = state("2024-03-01T00:00:00Z", "monthly_plan");
        let customer = customer("monthly_plan", Some("2024-02-01T00:00:00Z"));
        let (outcome, _) = detect(&state, &customer, ENTITLEMENT);
        assert!(!outcome.is_renewal);
    }

    #[test]
    fn test_malformed_dates_degrade_to_no_renewal() {
        let bad_previous = state("not-a-date", "monthly_plan");
        let fresh = customer("monthly_plan", Some("2024-02-01T00:00:00Z"));
        let (outcome, _) = detect(&bad_previous, &fresh, ENTITLEMENT);
        assert!(!outcome.is_renewal);

        let good_previous = state("2024-01-01T00:00:00Z", "monthly_plan");
        let garbage = customer("monthly_plan", Some("garbage"));
        let (outcome, _) = detect(&good_previous, &garbage, ENTITLEMENT);
        assert!(!outcome.is_renewal);
    }

    #[test]
    fn test_plan_change_upgrade() {
        let state = state("2024-01-01T00:00:00Z", "monthly_plan");
        let customer = customer("yearly_plan", Some("2025-01-01T00:00:00Z"));
        let (outcome, _) = detect(&state, &customer, ENTITLEMENT);

        assert!(outcome.is_plan_change);
        assert!(outcome.is_upgrade);
        assert!(!outcome.is_downgrade);
        assert!(!outcome.is_renewal);
        assert_eq!(outcome.previous_product_id.as_deref(), Some("monthly_plan"));
    }

    #[test]
    fn test_plan_change_downgrade() {
        let state = state("2025-01-01T00:00:00Z", "yearly_plan");
        let customer = customer("weekly_plan", Some("2025-01-08T00:00:00Z"));
        let (outcome, _) = detect(&state, &customer, ENTITLEMENT);

        assert!(outcome.is_plan_change);
        assert!(outcome.is_downgrade);
        assert!(!outcome.is_upgrade);
    }

    #[test]
    fn test_plan_change_equal_tier_sets_neither() {
        let state = state("2024-01-01T00:00:00Z", "monthly_plan");
        let customer = customer("monthly_plus", Some("2024-02-01T00:00:00Z"));
        let (outcome, _) = detect(&state, &customer, ENTITLEMENT);

        assert!(outcome.is_plan_change);
        assert!(!outcome.is_upgrade);
        assert!(!outcome.is_downgrade);
        assert!(!outcome.is_renewal);
    }

    #[test]
    fn test_plan_change_and_renewal_mutually_exclusive() {
        // Product change with a forward-moving date is still only a plan
        // change, never also a renewal.
        let state = state("2024-01-01T00:00:00Z", "monthly_plan");
        let customer = customer("yearly_plan", Some("2026-01-01T00:00:00Z"));
        let (outcome, _) = detect(&state, &customer, ENTITLEMENT);
        assert!(outcome.is_plan_change);
        assert!(!outcome.is_renewal);
    }

    #[test]
    fn test_next_state_carries_outcome_fields() {
        let state = state("2024-01-01T00:00:00Z", "monthly_plan");
        let customer = customer("monthly_plan", Some("2024-02-01T00:00:00Z"));
        let (outcome, next) = detect(&state, &customer, ENTITLEMENT);

        assert_eq!(next.previous_expiration, outcome.new_expiration);
        assert_eq!(next.previous_product_id, outcome.product_id);
    }

    #[test]
    fn test_detection_is_stateless() {
        // Same inputs, same outputs; the detector itself mutates nothing.
        let state = state("2024-01-01T00:00:00Z", "monthly_plan");
        let customer = customer("monthly_plan", Some("2024-02-01T00:00:00Z"));
        let first = detect(&state, &customer, ENTITLEMENT);
        let second = detect(&state, &customer, ENTITLEMENT);
        assert_eq!(first, second);
    }
}
