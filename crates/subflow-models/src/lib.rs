//! Shared data models for the Subflow entitlement backend.
//!
//! This crate provides Serde-serializable types and the pure decision core:
//! - Package tier classification for subscription products
//! - Renewal and plan-change detection
//! - Credit allocation strategies
//! - Subscription status and access tiers
//! - Plan credit grants

pub mod allocation;
pub mod entitlement;
pub mod package_tier;
pub mod plan;
pub mod renewal;
pub mod status;

// Re-export common types
pub use allocation::{
    allocate, credit_package_amount, is_credit_package, AllocationStrategy, CreditAllocationParams,
    CreditDocument,
};
pub use entitlement::{CustomerSnapshot, EntitlementSnapshot, PeriodType};
pub use package_tier::PackageTier;
pub use plan::{PlanCatalog, DEFAULT_TRIAL_CREDITS};
pub use renewal::{detect, RenewalOutcome, RenewalState};
pub use status::{AccessTier, SubscriptionStatus};
