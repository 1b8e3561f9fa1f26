//! Entitlement service: renewal detection, credit allocation, persistence.
//!
//! This is the write path behind the webhook. For each update it:
//! 1. Runs the renewal detector against the last-observed state for the user
//!    and commits the returned state in the same step.
//! 2. Selects a credit allocation strategy and applies it inside the
//!    optimistic-locking loop of `CreditDocRepository`, skipping store
//!    transactions that were already recorded (webhook re-deliveries).
//! 3. Notifies the registered observer about renewals, plan changes and
//!    access tier transitions.
//!
//! Renewal state lives in an in-process map owned by the service. Losing it
//! on restart is acceptable: the detector treats the next observation as a
//! cold start and never reports a spurious renewal.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use subflow_firestore::{CreditDocRepository, CreditUpdate, FirestoreClient};
use subflow_models::{
    allocation, renewal, AccessTier, AllocationStrategy, CreditAllocationParams, CreditDocument,
    CustomerSnapshot, PlanCatalog, RenewalOutcome, RenewalState, SubscriptionStatus,
};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Hook for side effects triggered by entitlement transitions. All methods
/// default to no-ops so implementors override only what they need.
pub trait EntitlementObserver: Send + Sync {
    /// A subscription renewed: same product, expiration moved forward.
    fn on_renewal_detected(&self, user_id: &str, outcome: &RenewalOutcome) {
        let _ = (user_id, outcome);
    }

    /// The user switched products within the entitlement.
    fn on_plan_change(&self, user_id: &str, outcome: &RenewalOutcome) {
        let _ = (user_id, outcome);
    }

    /// The user's access tier changed since the last processed update.
    fn on_premium_status_changed(&self, user_id: &str, tier: AccessTier) {
        let _ = (user_id, tier);
    }
}

/// Observer that does nothing. Used until a real one is registered.
struct NoopObserver;

impl EntitlementObserver for NoopObserver {}

/// One entitlement update to process, already decoupled from the wire format.
#[derive(Debug, Clone)]
pub struct EntitlementUpdate {
    /// User the update applies to.
    pub user_id: String,
    /// Entitlement snapshot reported by the store.
    pub customer: CustomerSnapshot,
    /// Subscription status derived from the event.
    pub status: SubscriptionStatus,
    /// True for passive re-checks (transfers, restores), false for fresh
    /// purchase events.
    pub is_status_sync: bool,
    /// Store transaction id, when the event carries one. Used for
    /// idempotent credit writes.
    pub purchase_id: Option<String>,
    /// Product purchased in this event. For consumable credit packages this
    /// differs from the entitlement product.
    pub purchased_product_id: Option<String>,
}

/// Summary of one processed update.
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    /// Renewal / plan-change classification.
    pub outcome: RenewalOutcome,
    /// Strategy that decided the credit balance.
    pub strategy: AllocationStrategy,
    /// Balance after the write, absent when the write was skipped.
    pub credits_after: Option<u32>,
    /// Access tier after this update.
    pub access_tier: AccessTier,
    /// True when the purchase was already recorded and no write happened.
    pub duplicate: bool,
}

/// Service owning renewal state and the credit write path.
#[derive(Clone)]
pub struct EntitlementService {
    firestore: Arc<FirestoreClient>,
    catalog: PlanCatalog,
    entitlement_id: String,
    renewal_states: Arc<RwLock<HashMap<String, RenewalState>>>,
    last_tiers: Arc<RwLock<HashMap<String, AccessTier>>>,
    observer: Arc<dyn EntitlementObserver>,
}

impl EntitlementService {
    /// Create a new entitlement service.
    pub fn new(
        firestore: Arc<FirestoreClient>,
        catalog: PlanCatalog,
        entitlement_id: String,
    ) -> Self {
        Self {
            firestore,
            catalog,
            entitlement_id,
            renewal_states: Arc::new(RwLock::new(HashMap::new())),
            last_tiers: Arc::new(RwLock::new(HashMap::new())),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Replace the observer. Intended to be called once during startup.
    pub fn with_observer(mut self, observer: Arc<dyn EntitlementObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Process one entitlement update end to end.
    pub async fn process_update(&self, update: EntitlementUpdate) -> ApiResult<ProcessedEvent> {
        let user_id = update.user_id.clone();

        // Detect against the last-observed state and commit the next state
        // before anything that can fail, so a Firestore error cannot leave
        // the detector one observation behind.
        let previous = {
            let states = self.renewal_states.read().await;
            states.get(&user_id).cloned().unwrap_or_default()
        };
        let (outcome, next_state) = renewal::detect(&previous, &update.customer, &self.entitlement_id);
        {
            let mut states = self.renewal_states.write().await;
            states.insert(user_id.clone(), next_state);
        }

        if outcome.is_renewal {
            metrics::record_renewal();
            self.observer.on_renewal_detected(&user_id, &outcome);
            info!(
                user_id = %user_id,
                product_id = ?outcome.product_id,
                expires = ?outcome.new_expiration,
                "Subscription renewal detected"
            );
        }
        if outcome.is_plan_change {
            let direction = plan_change_direction(&outcome);
            metrics::record_plan_change(direction);
            self.observer.on_plan_change(&user_id, &outcome);
            info!(
                user_id = %user_id,
                from = ?outcome.previous_product_id,
                to = ?outcome.product_id,
                direction = direction,
                "Plan change detected"
            );
        }

        // Allocate credits. Selection only depends on the event, so it is
        // computed once; the balance depends on the stored document and is
        // recomputed inside the locking loop.
        let product_id = update
            .purchased_product_id
            .clone()
            .or_else(|| outcome.product_id.clone());
        let credit_limit = resolve_credit_limit(&self.catalog, product_id.as_deref());
        let is_subscription_active = update
            .customer
            .active_entitlement(&self.entitlement_id)
            .is_some();

        let base_params = CreditAllocationParams {
            status: update.status,
            is_status_sync: update.is_status_sync,
            existing: None,
            credit_limit,
            is_subscription_active,
            product_id: product_id.clone(),
        };
        let strategy = AllocationStrategy::select(&base_params);
        let trial_grant = self.catalog.trial_credits;

        let repo = CreditDocRepository::new((*self.firestore).clone(), &user_id);
        let purchase_id = update.purchase_id.clone();
        let write = repo
            .apply(|existing: Option<&CreditDocument>| {
                if let Some(pid) = &purchase_id {
                    if existing.map_or(false, |doc| doc.has_processed(pid)) {
                        return None;
                    }
                }
                let params = CreditAllocationParams {
                    existing: existing.cloned(),
                    ..base_params.clone()
                };
                let credits = strategy.apply(&params, trial_grant);
                Some(CreditUpdate {
                    credits,
                    record_purchase: purchase_id.clone(),
                })
            })
            .await
            .map_err(|e| {
                warn!(user_id = %user_id, error = %e, "Credit write failed");
                ApiError::from(e)
            })?;

        let duplicate = write.is_none();
        if duplicate {
            debug!(
                user_id = %user_id,
                purchase_id = ?update.purchase_id,
                "Purchase already processed, skipping credit write"
            );
        } else {
            metrics::record_allocation(strategy);
        }

        // Tier transition, compared against the last processed update. Bare
        // consumable purchases carry no entitlement and say nothing about
        // the subscription, so they never move the tier.
        let access_tier = AccessTier::from_status(update.status);
        let tier_relevant = !update.customer.entitlements.is_empty()
            || update.status == SubscriptionStatus::Expired;
        if tier_relevant {
            let tier_changed = {
                let mut tiers = self.last_tiers.write().await;
                tiers.insert(user_id.clone(), access_tier) != Some(access_tier)
            };
            if tier_changed {
                self.observer.on_premium_status_changed(&user_id, access_tier);
                info!(user_id = %user_id, tier = %access_tier, "Access tier changed");
            }
        }

        Ok(ProcessedEvent {
            outcome,
            strategy,
            credits_after: write.map(|w| w.credits_after),
            access_tier,
            duplicate,
        })
    }

    /// Fetch the stored credit document for a user.
    pub async fn credit_balance(&self, user_id: &str) -> ApiResult<Option<CreditDocument>> {
        let repo = CreditDocRepository::new((*self.firestore).clone(), user_id);
        Ok(repo.get().await?)
    }

    /// Last-observed renewal state for a user, if any. Exposed for
    /// diagnostics.
    pub async fn renewal_state(&self, user_id: &str) -> Option<RenewalState> {
        self.renewal_states.read().await.get(user_id).cloned()
    }
}

/// Credits granted by the product driving an event: plans grant their tier's
/// limit, consumable packages grant the amount encoded in their identifier.
fn resolve_credit_limit(catalog: &PlanCatalog, product_id: Option<&str>) -> u32 {
    if allocation::is_credit_package(product_id) {
        product_id
            .and_then(allocation::credit_package_amount)
            .unwrap_or(0)
    } else {
        catalog.credit_limit_for_product(product_id)
    }
}

/// Label for plan-change metrics.
fn plan_change_direction(outcome: &RenewalOutcome) -> &'static str {
    if outcome.is_upgrade {
        "upgrade"
    } else if outcome.is_downgrade {
        "downgrade"
    } else {
        "lateral"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subflow_models::plan::{MONTHLY_PLAN_CREDITS, YEARLY_PLAN_CREDITS};

    #[test]
    fn test_resolve_credit_limit_for_plans() {
        let catalog = PlanCatalog::default();
        assert_eq!(
            resolve_credit_limit(&catalog, Some("premium_monthly")),
            MONTHLY_PLAN_CREDITS
        );
        assert_eq!(
            resolve_credit_limit(&catalog, Some("premium_yearly")),
            YEARLY_PLAN_CREDITS
        );
        assert_eq!(resolve_credit_limit(&catalog, None), 0);
    }

    #[test]
    fn test_resolve_credit_limit_for_packages() {
        let catalog = PlanCatalog::default();
        assert_eq!(resolve_credit_limit(&catalog, Some("credit_pack_50")), 50);
        // Unparseable package grants nothing rather than a plan limit.
        assert_eq!(resolve_credit_limit(&catalog, Some("credit_pack")), 0);
    }

    #[test]
    fn test_plan_change_direction_labels() {
        let outcome = RenewalOutcome {
            is_plan_change: true,
            is_upgrade: true,
            ..RenewalOutcome::default()
        };
        assert_eq!(plan_change_direction(&outcome), "upgrade");

        let outcome = RenewalOutcome {
            is_plan_change: true,
            is_downgrade: true,
            ..RenewalOutcome::default()
        };
        assert_eq!(plan_change_direction(&outcome), "downgrade");

        let outcome = RenewalOutcome {
            is_plan_change: true,
            ..RenewalOutcome::default()
        };
        assert_eq!(plan_change_direction(&outcome), "lateral");
    }
}
