//! Credit allocation strategies.
//!
//! Every entitlement event ends in exactly one credit decision: what should
//! the user's balance be now? The three strategies are a closed sum type with
//! exhaustive dispatch; selection is total, so a decision always exists.
//!
//! - `StatusSync`: passive re-check, initialize new users but never clobber
//!   an existing positive balance.
//! - `Trial`: fixed trial grant, existing balance is irrelevant.
//! - `Purchase`: consumable packages top up cumulatively, plan purchases
//!   reset the balance to the plan's limit.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::status::SubscriptionStatus;

/// Stored per-user credit document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreditDocument {
    /// Current credit balance.
    pub credits: u32,
    /// Store transaction ids already applied, for idempotency.
    #[serde(default)]
    pub processed_purchases: Vec<String>,
}

impl CreditDocument {
    /// Create a document with a balance and no purchase history.
    pub fn with_credits(credits: u32) -> Self {
        Self {
            credits,
            processed_purchases: Vec::new(),
        }
    }

    /// True if this purchase id was already applied.
    pub fn has_processed(&self, purchase_id: &str) -> bool {
        self.processed_purchases.iter().any(|p| p == purchase_id)
    }
}

/// Inputs to one allocation decision.
#[derive(Debug, Clone, Default)]
pub struct CreditAllocationParams {
    /// Subscription status at decision time.
    pub status: SubscriptionStatus,
    /// True for passive status re-checks, false for fresh purchase events.
    pub is_status_sync: bool,
    /// Previously stored credit document, if one exists.
    pub existing: Option<CreditDocument>,
    /// Credits granted by the current plan or package.
    pub credit_limit: u32,
    /// Whether the subscription is currently active.
    pub is_subscription_active: bool,
    /// Product identifier driving the decision, when known.
    pub product_id: Option<String>,
}

/// True if the product is a consumable credit package rather than a
/// subscription plan. Same silent substring mechanism as the package tier
/// classifier.
pub fn is_credit_package(product_id: Option<&str>) -> bool {
    product_id
        .map(|id| id.to_ascii_lowercase().contains("credit"))
        .unwrap_or(false)
}

/// Credits granted by a consumable credit package, parsed from the trailing
/// number in the product identifier (`credit_pack_50` grants 50). Packages
/// without a numeric suffix grant nothing.
pub fn credit_package_amount(product_id: &str) -> Option<u32> {
    let digits: String = product_id
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.chars().rev().collect::<String>().parse().ok()
}

/// The closed set of allocation strategies, dispatched exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Passive status sync: initialize or preserve.
    StatusSync,
    /// Trial statuses: fixed grant.
    Trial,
    /// Fresh purchase: top up or reset. Always matches, guaranteeing
    /// selection is total.
    Purchase,
}

impl AllocationStrategy {
    /// Pick the strategy for a decision. First match wins; `Purchase` is the
    /// unconditional fallback.
    pub fn select(params: &CreditAllocationParams) -> Self {
        if params.is_status_sync {
            AllocationStrategy::StatusSync
        } else if params.status.is_trial() {
            AllocationStrategy::Trial
        } else {
            AllocationStrategy::Purchase
        }
    }

    /// Compute the new balance. `trial_grant` is the configured trial credit
    /// amount (see `PlanCatalog`).
    pub fn apply(self, params: &CreditAllocationParams, trial_grant: u32) -> u32 {
        match self {
            AllocationStrategy::StatusSync => {
                let no_purchase_history = params
                    .existing
                    .as_ref()
                    .map_or(true, |doc| doc.processed_purchases.is_empty());

                if params.is_subscription_active && no_purchase_history {
                    // First-ever sync for an active subscriber.
                    return params.credit_limit;
                }

                // Never zero out a balance the user already holds.
                match &params.existing {
                    Some(doc) if doc.credits > 0 => doc.credits,
                    _ => params.credit_limit,
                }
            }
            AllocationStrategy::Trial => trial_grant,
            AllocationStrategy::Purchase => {
                if is_credit_package(params.product_id.as_deref()) {
                    // Consumable top-up: cumulative.
                    let current = params.existing.as_ref().map(|d| d.credits).unwrap_or(0);
                    current.saturating_add(params.credit_limit)
                } else {
                    // Plan purchase: balance resets to the plan's grant.
                    params.credit_limit
                }
            }
        }
    }

    /// Strategy name for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStrategy::StatusSync => "status_sync",
            AllocationStrategy::Trial => "trial",
            AllocationStrategy::Purchase => "purchase",
        }
    }
}

/// Select and apply in one step.
pub fn allocate(params: &CreditAllocationParams, trial_grant: u32) -> u32 {
    AllocationStrategy::select(params).apply(params, trial_grant)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_params(existing: Option<CreditDocument>, active: bool) -> CreditAllocationParams {
        CreditAllocationParams {
            status: SubscriptionStatus::Premium,
            is_status_sync: true,
            existing,
            credit_limit: 100,
            is_subscription_active: active,
            product_id: Some("monthly_plan".to_string()),
        }
    }

    #[test]
    fn test_credit_package_amount() {
        assert_eq!(credit_package_amount("credit_pack_50"), Some(50));
        assert_eq!(credit_package_amount("credits_200"), Some(200));
        assert_eq!(credit_package_amount("credit_pack"), None);
        assert_eq!(credit_package_amount(""), None);
    }

    #[test]
    fn test_selection_order() {
        // Status sync wins even during a trial.
        let params = CreditAllocationParams {
            status: SubscriptionStatus::Trial,
            is_status_sync: true,
            ..CreditAllocationParams::default()
        };
        assert_eq!(
            AllocationStrategy::select(&params),
            AllocationStrategy::StatusSync
        );

        let params = CreditAllocationParams {
            status: SubscriptionStatus::TrialCanceled,
            ..CreditAllocationParams::default()
        };
        assert_eq!(AllocationStrategy::select(&params), AllocationStrategy::Trial);

        let params = CreditAllocationParams {
            status: SubscriptionStatus::Premium,
            ..CreditAllocationParams::default()
        };
        assert_eq!(
            AllocationStrategy::select(&params),
            AllocationStrategy::Purchase
        );
    }

    #[test]
    fn test_sync_first_ever_grants_full_limit() {
        // No stored document at all.
        let params = sync_params(None, true);
        assert_eq!(allocate(&params, 5), 100);

        // Document exists but has no purchase history.
        let params = sync_params(Some(CreditDocument::with_credits(0)), true);
        assert_eq!(allocate(&params, 5), 100);
    }

    #[test]
    fn test_sync_preserves_positive_balance() {
        let doc = CreditDocument {
            credits: 40,
            processed_purchases: vec!["txn-1".to_string()],
        };
        let params = sync_params(Some(doc), true);
        assert_eq!(allocate(&params, 5), 40);
    }

    #[test]
    fn test_sync_zero_balance_with_history_falls_back_to_limit() {
        let doc = CreditDocument {
            credits: 0,
            processed_purchases: vec!["txn-1".to_string()],
        };
        let params = sync_params(Some(doc), true);
        assert_eq!(allocate(&params, 5), 100);
    }

    #[test]
    fn test_sync_inactive_subscription_preserves_balance() {
        let doc = CreditDocument {
            credits: 12,
            processed_purchases: vec!["txn-1".to_string()],
        };
        let params = sync_params(Some(doc), false);
        assert_eq!(allocate(&params, 5), 12);
    }

    #[test]
    fn test_trial_ignores_existing_balance() {
        for existing in [None, Some(CreditDocument::with_credits(500))] {
            let params = CreditAllocationParams {
                status: SubscriptionStatus::Trial,
                existing,
                credit_limit: 100,
                is_subscription_active: true,
                ..CreditAllocationParams::default()
            };
            assert_eq!(allocate(&params, 5), 5);
        }
    }

    #[test]
    fn test_purchase_plan_resets_balance() {
        let params = CreditAllocationParams {
            status: SubscriptionStatus::Premium,
            existing: Some(CreditDocument::with_credits(7)),
            credit_limit: 100,
            is_subscription_active: true,
            product_id: Some("yearly_plan".to_string()),
            ..CreditAllocationParams::default()
        };
        assert_eq!(allocate(&params, 5), 100);
    }

    #[test]
    fn test_purchase_credit_package_tops_up() {
        let params = CreditAllocationParams {
            status: SubscriptionStatus::Premium,
            existing: Some(CreditDocument::with_credits(40)),
            credit_limit: 25,
            is_subscription_active: true,
            product_id: Some("credit_pack_25".to_string()),
            ..CreditAllocationParams::default()
        };
        assert_eq!(allocate(&params, 5), 65);
    }

    #[test]
    fn test_purchase_credit_package_without_existing_doc() {
        let params = CreditAllocationParams {
            status: SubscriptionStatus::Premium,
            credit_limit: 25,
            is_subscription_active: true,
            product_id: Some("credit_pack_25".to_string()),
            ..CreditAllocationParams::default()
        };
        assert_eq!(allocate(&params, 5), 25);
    }

    #[test]
    fn test_purchase_top_up_saturates() {
        let params = CreditAllocationParams {
            status: SubscriptionStatus::Premium,
            existing: Some(CreditDocument::with_credits(u32::MAX)),
            credit_limit: 25,
            is_subscription_active: true,
            product_id: Some("credit_pack_25".to_string()),
            ..CreditAllocationParams::default()
        };
        assert_eq!(allocate(&params, 5), u32::MAX);
    }

    #[test]
    fn test_is_credit_package() {
        assert!(is_credit_package(Some("credit_pack_25")));
        assert!(is_credit_package(Some("Extra_Credits_100")));
        assert!(!is_credit_package(Some("monthly_plan")));
        assert!(!is_credit_package(None));
    }

    #[test]
    fn test_has_processed() {
        let doc = CreditDocument {
            credits: 10,
            processed_purchases: vec!["a".to_string(), "b".to_string()],
        };
        assert!(doc.has_processed("a"));
        assert!(!doc.has_processed("c"));
    }
}
