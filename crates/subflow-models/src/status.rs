//! Subscription status and access tier.
//!
//! The status enum mirrors the lifecycle the purchase provider reports for a
//! subscriber; the access tier is the coarse gate the product surface cares
//! about (guest/freemium/premium), derived from denormalized flags.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a user's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Anonymous user, never signed in.
    Guest,
    /// Signed-in user without an active subscription.
    #[default]
    Freemium,
    /// Active free trial.
    Trial,
    /// Trial canceled but still within the trial period.
    TrialCanceled,
    /// Active paid subscription.
    Premium,
    /// Paid subscription canceled but still within the paid period.
    PremiumCanceled,
    /// Subscription lapsed past its expiration date.
    Expired,
}

impl SubscriptionStatus {
    /// Returns the status as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Guest => "guest",
            SubscriptionStatus::Freemium => "freemium",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::TrialCanceled => "trial_canceled",
            SubscriptionStatus::Premium => "premium",
            SubscriptionStatus::PremiumCanceled => "premium_canceled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// Parse from string (case-insensitive). Unrecognized values degrade to
    /// `Freemium`.
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "guest" => SubscriptionStatus::Guest,
            "trial" => SubscriptionStatus::Trial,
            "trial_canceled" => SubscriptionStatus::TrialCanceled,
            "premium" => SubscriptionStatus::Premium,
            "premium_canceled" => SubscriptionStatus::PremiumCanceled,
            "expired" => SubscriptionStatus::Expired,
            _ => SubscriptionStatus::Freemium,
        }
    }

    /// True for `Trial` and `TrialCanceled`.
    pub fn is_trial(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trial | SubscriptionStatus::TrialCanceled
        )
    }

    /// True while the subscription still grants premium access.
    pub fn has_premium_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trial
                | SubscriptionStatus::TrialCanceled
                | SubscriptionStatus::Premium
                | SubscriptionStatus::PremiumCanceled
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse access gate derived from subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessTier {
    /// Anonymous, no account.
    Guest,
    /// Account without premium entitlement.
    #[default]
    Freemium,
    /// Active premium entitlement (paid or trial).
    Premium,
}

impl AccessTier {
    /// Derive the tier from denormalized flags.
    pub fn from_flags(is_anonymous: bool, has_active_entitlement: bool) -> Self {
        if has_active_entitlement {
            AccessTier::Premium
        } else if is_anonymous {
            AccessTier::Guest
        } else {
            AccessTier::Freemium
        }
    }

    /// Derive the tier from a subscription status.
    pub fn from_status(status: SubscriptionStatus) -> Self {
        if status.has_premium_access() {
            AccessTier::Premium
        } else if status == SubscriptionStatus::Guest {
            AccessTier::Guest
        } else {
            AccessTier::Freemium
        }
    }

    /// Returns the tier name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::Guest => "guest",
            AccessTier::Freemium => "freemium",
            AccessTier::Premium => "premium",
        }
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
