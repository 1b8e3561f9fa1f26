//! Plan configuration: credit grants per package tier.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::package_tier::PackageTier;

/// Monthly-equivalent credit grant per plan tier.
pub const WEEKLY_PLAN_CREDITS: u32 = 25;
pub const MONTHLY_PLAN_CREDITS: u32 = 100;
pub const YEARLY_PLAN_CREDITS: u32 = 1200;

/// Default credit grant for trial subscribers.
///
/// Two values historically existed for this constant (0 and 5); 5 is the one
/// the live paywall shipped with, and deployments can override it via
/// configuration.
pub const DEFAULT_TRIAL_CREDITS: u32 = 5;

/// Credit grants configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlanCatalog {
    /// Grant for weekly plans.
    pub weekly_credits: u32,
    /// Grant for monthly plans.
    pub monthly_credits: u32,
    /// Grant for yearly plans.
    pub yearly_credits: u32,
    /// Fixed grant for trial subscribers.
    pub trial_credits: u32,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self {
            weekly_credits: WEEKLY_PLAN_CREDITS,
            monthly_credits: MONTHLY_PLAN_CREDITS,
            yearly_credits: YEARLY_PLAN_CREDITS,
            trial_credits: DEFAULT_TRIAL_CREDITS,
        }
    }
}

impl PlanCatalog {
    /// Credit limit granted by a plan of the given tier. Unknown tiers grant
    /// nothing.
    pub fn credit_limit_for(&self, tier: PackageTier) -> u32 {
        match tier {
            PackageTier::Unknown => 0,
            PackageTier::Weekly => self.weekly_credits,
            PackageTier::Monthly => self.monthly_credits,
            PackageTier::Yearly => self.yearly_credits,
        }
    }

    /// Credit limit for a product identifier.
    pub fn credit_limit_for_product(&self, product_id: Option<&str>) -> u32 {
        self.credit_limit_for(PackageTier::classify(product_id))
    }
}
