//! Gift tier ladder.
//!
//! Maps a gift's total value onto one of seven tiers. Each threshold is
//! inclusive: a value equal to a threshold belongs to the higher tier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lower bounds of tiers 2 through 7.
pub const TIER_THRESHOLDS: [u64; 6] = [10, 50, 100, 500, 1000, 5000];

/// Highest tier on the ladder.
pub const MAX_TIER: u8 = 7;

/// A gift classification from 1 (smallest) to 7 (largest).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GiftTier(u8);

impl GiftTier {
    /// Classify a gift value.
    #[must_use]
    pub fn classify(value: u64) -> Self {
        let passed = TIER_THRESHOLDS.iter().take_while(|&&t| value >= t).count();
        Self(1 + u8::try_from(passed).unwrap_or(MAX_TIER - 1))
    }

    /// Numeric tier, 1..=7.
    #[must_use]
    pub fn level(self) -> u8 {
        self.0
    }

    /// Reaction asset tag for this tier.
    #[must_use]
    pub fn motion_tag(self) -> String {
        format!("gift_level_{}", self.0)
    }
}

impl fmt::Display for GiftTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier {}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
