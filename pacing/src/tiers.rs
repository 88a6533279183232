//! The four-tier adaptive wait policy.
//!
//! The tier is a pure function of how many consecutive rounds the target has
//! been out of first place. Each tier carries an inclusive wait range; the
//! actual wait is drawn uniformly per iteration so the submission cadence
//! never settles into a detectable period.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wait-time regime keyed by the consecutive-behind count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingTier {
    /// Target is in first place.
    Standard,
    /// Behind for 1–4 consecutive rounds.
    InitialAccelerated,
    /// Behind for 5–9 consecutive rounds.
    Accelerated,
    /// Behind for 10 or more consecutive rounds.
    SuperAccelerated,
}

impl PacingTier {
    /// Classify a consecutive-behind count into its tier.
    pub fn for_behind_count(count: u64) -> Self {
        match count {
            0 => Self::Standard,
            1..=4 => Self::InitialAccelerated,
            5..=9 => Self::Accelerated,
            _ => Self::SuperAccelerated,
        }
    }

    /// Inclusive wait range in seconds for this tier.
    pub fn wait_range(self) -> (u64, u64) {
        match self {
            Self::Standard => (53, 67),
            Self::InitialAccelerated => (14, 37),
            Self::Accelerated => (7, 16),
            Self::SuperAccelerated => (3, 10),
        }
    }

    /// Draw a wait uniformly from this tier's range.
    pub fn draw_wait<R: Rng + ?Sized>(self, rng: &mut R) -> u64 {
        let (lo, hi) = self.wait_range();
        rng.gen_range(lo..=hi)
    }

    /// Whether this tier means the target is currently behind.
    pub fn is_behind(self) -> bool {
        !matches!(self, Self::Standard)
    }
}

impl fmt::Display for PacingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::InitialAccelerated => write!(f, "initial_accelerated"),
            Self::Accelerated => write!(f, "accelerated"),
            Self::SuperAccelerated => write!(f, "super_accelerated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries_exact() {
        assert_eq!(PacingTier::for_behind_count(0), PacingTier::Standard);
        assert_eq!(
            PacingTier::for_behind_count(1),
            PacingTier::InitialAccelerated
        );
        assert_eq!(
            PacingTier::for_behind_count(4),
            PacingTier::InitialAccelerated
        );
        assert_eq!(PacingTier::for_behind_count(5), PacingTier::Accelerated);
        assert_eq!(PacingTier::for_behind_count(9), PacingTier::Accelerated);
        assert_eq!(
            PacingTier::for_behind_count(10),
            PacingTier::SuperAccelerated
        );
        assert_eq!(
            PacingTier::for_behind_count(1_000),
            PacingTier::SuperAccelerated
        );
    }

    #[test]
    fn test_wait_ranges() {
        assert_eq!(PacingTier::Standard.wait_range(), (53, 67));
        assert_eq!(PacingTier::InitialAccelerated.wait_range(), (14, 37));
        assert_eq!(PacingTier::Accelerated.wait_range(), (7, 16));
        assert_eq!(PacingTier::SuperAccelerated.wait_range(), (3, 10));
    }

    #[test]
    fn test_draw_wait_stays_in_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            for tier in [
                PacingTier::Standard,
                PacingTier::InitialAccelerated,
                PacingTier::Accelerated,
                PacingTier::SuperAccelerated,
            ] {
                let (lo, hi) = tier.wait_range();
                let w = tier.draw_wait(&mut rng);
                assert!(w >= lo && w <= hi, "{tier}: {w} outside [{lo}, {hi}]");
            }
        }
    }

    #[test]
    fn test_is_behind() {
        assert!(!PacingTier::Standard.is_behind());
        assert!(PacingTier::InitialAccelerated.is_behind());
        assert!(PacingTier::Accelerated.is_behind());
        assert!(PacingTier::SuperAccelerated.is_behind());
    }

    #[test]
    fn test_display_matches_journal_vocabulary() {
        assert_eq!(PacingTier::Standard.to_string(), "standard");
        assert_eq!(
            PacingTier::InitialAccelerated.to_string(),
            "initial_accelerated"
        );
        assert_eq!(PacingTier::Accelerated.to_string(), "accelerated");
        assert_eq!(PacingTier::SuperAccelerated.to_string(), "super_accelerated");
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&PacingTier::SuperAccelerated).unwrap();
        assert_eq!(json, "\"super_accelerated\"");
        let tier: PacingTier = serde_json::from_str("\"initial_accelerated\"").unwrap();
        assert_eq!(tier, PacingTier::InitialAccelerated);
    }
}
