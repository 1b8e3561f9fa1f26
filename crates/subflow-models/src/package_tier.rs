//! Package tier classification for subscription products.
//!
//! Product identifiers coming from the store ("com.app.premium_monthly",
//! "yearly_pro", ...) are mapped onto an ordinal tier so that plan changes
//! can be classified as upgrades or downgrades:
//!
//! - `Unknown`: unrecognized or missing identifier
//! - `Weekly`: identifier contains "weekly"
//! - `Monthly`: identifier contains "monthly"
//! - `Yearly`: identifier contains "yearly"

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Billing-period tier of a subscription package.
///
/// Ordering follows billing-period length, so `Weekly < Monthly < Yearly`.
/// `Unknown` sorts below every recognized tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PackageTier {
    /// Identifier missing or not recognized.
    #[default]
    Unknown,
    /// Weekly billing period.
    Weekly,
    /// Monthly billing period.
    Monthly,
    /// Yearly billing period.
    Yearly,
}

impl PackageTier {
    /// All tiers in ascending order.
    pub const ALL: &'static [PackageTier] = &[
        PackageTier::Unknown,
        PackageTier::Weekly,
        PackageTier::Monthly,
        PackageTier::Yearly,
    ];

    /// Classify a product identifier by case-insensitive substring match.
    ///
    /// Total and silent: `None` and unrecognized identifiers degrade to
    /// `Unknown` rather than erroring.
    pub fn classify(product_id: Option<&str>) -> Self {
        let Some(id) = product_id else {
            return PackageTier::Unknown;
        };
        let id = id.to_ascii_lowercase();
        if id.contains("yearly") {
            PackageTier::Yearly
        } else if id.contains("monthly") {
            PackageTier::Monthly
        } else if id.contains("weekly") {
            PackageTier::Weekly
        } else {
            PackageTier::Unknown
        }
    }

    /// Ordinal rank used for upgrade/downgrade comparison.
    pub fn ordinal(&self) -> u8 {
        match self {
            PackageTier::Unknown => 0,
            PackageTier::Weekly => 1,
            PackageTier::Monthly => 2,
            PackageTier::Yearly => 3,
        }
    }

    /// Returns the tier name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageTier::Unknown => "unknown",
            PackageTier::Weekly => "weekly",
            PackageTier::Monthly => "monthly",
            PackageTier::Yearly => "yearly",
        }
    }
}

impl fmt::Display for PackageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
