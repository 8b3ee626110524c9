use serde::{Deserialize, Serialize};

/// Sentinel stored in `scans_remaining` for tiers without a scan allotment
pub const UNLIMITED_SCANS: i32 = -1;

/// Subscription level controlling the scan allotment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tier {
    #[default]
    #[serde(alias = "free")]
    Free,
    #[serde(alias = "essential")]
    Essential,
    #[serde(alias = "premium")]
    Premium,
}

/// Static pricing and allotment for one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierConfig {
    /// Monthly price in whole US dollars
    pub price: u32,
    /// Scan allotment, or [`UNLIMITED_SCANS`]
    pub scans: i32,
    pub label: &'static str,
    /// Checkout link; configured per deployment, see `Config::payment_link`
    pub payment_link: Option<&'static str>,
}

const FREE: TierConfig = TierConfig {
    price: 0,
    scans: 10,
    label: "Free Trial",
    payment_link: None,
};

const ESSENTIAL: TierConfig = TierConfig {
    price: 9,
    scans: 50,
    label: "Essential",
    payment_link: None,
};

const PREMIUM: TierConfig = TierConfig {
    price: 19,
    scans: UNLIMITED_SCANS,
    label: "Premium (Unlimited)",
    payment_link: None,
};

impl Tier {
    pub fn config(&self) -> &'static TierConfig {
        match self {
            Tier::Free => &FREE,
            Tier::Essential => &ESSENTIAL,
            Tier::Premium => &PREMIUM,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "Free",
            Tier::Essential => "Essential",
            Tier::Premium => "Premium",
        }
    }

    pub fn all() -> Vec<Tier> {
        vec![Tier::Free, Tier::Essential, Tier::Premium]
    }

    pub fn is_unlimited(&self) -> bool {
        self.config().scans == UNLIMITED_SCANS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_table() {
        assert_eq!(Tier::Free.config().scans, 10);
        assert_eq!(Tier::Essential.config().scans, 50);
        assert_eq!(Tier::Essential.config().price, 9);
        assert!(Tier::Premium.is_unlimited());
        assert!(!Tier::Free.is_unlimited());
    }

    #[test]
    fn test_tier_round_trips_through_profile_json() {
        let tier: Tier = serde_json::from_str("\"Essential\"").unwrap();
        assert_eq!(tier, Tier::Essential);
        let tier: Tier = serde_json::from_str("\"premium\"").unwrap();
        assert_eq!(tier, Tier::Premium);
    }
}
