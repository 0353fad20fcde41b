//! Client tiers and per-tier policy values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client priority class. Ordered by business priority, enterprise highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free = 0,
    Premium = 1,
    Enterprise = 2,
}

impl Tier {
    /// All tiers, highest priority first.
    pub const ALL: [Tier; 3] = [Tier::Enterprise, Tier::Premium, Tier::Free];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enterprise => "enterprise",
            Self::Premium => "premium",
            Self::Free => "free",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown tier: {0}")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enterprise" => Ok(Self::Enterprise),
            "premium" => Ok(Self::Premium),
            "free" => Ok(Self::Free),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

/// One value per tier.
///
/// Access is an exhaustive match, so a new tier fails to compile until every
/// table is extended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerTier<T> {
    pub enterprise: T,
    pub premium: T,
    pub free: T,
}

impl<T> PerTier<T> {
    pub const fn new(enterprise: T, premium: T, free: T) -> Self {
        Self { enterprise, premium, free }
    }

    pub fn get(&self, tier: Tier) -> &T {
        match tier {
            Tier::Enterprise => &self.enterprise,
            Tier::Premium => &self.premium,
            Tier::Free => &self.free,
        }
    }

    pub fn get_mut(&mut self, tier: Tier) -> &mut T {
        match tier {
            Tier::Enterprise => &mut self.enterprise,
            Tier::Premium => &mut self.premium,
            Tier::Free => &mut self.free,
        }
    }

    /// Iterate in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (Tier, &T)> {
        Tier::ALL.into_iter().map(move |t| (t, self.get(t)))
    }

    pub fn map<U>(&self, mut f: impl FnMut(Tier, &T) -> U) -> PerTier<U> {
        PerTier {
            enterprise: f(Tier::Enterprise, &self.enterprise),
            premium: f(Tier::Premium, &self.premium),
            free: f(Tier::Free, &self.free),
        }
    }
}

impl<T: Copy + std::iter::Sum<T>> PerTier<T> {
    pub fn total(&self) -> T {
        [self.enterprise, self.premium, self.free].into_iter().sum()
    }
}

impl PerTier<usize> {
    pub fn increment(&mut self, tier: Tier) {
        *self.get_mut(tier) += 1;
    }

    pub fn decrement(&mut self, tier: Tier) {
        let slot = self.get_mut(tier);
        *slot = slot.saturating_sub(1);
    }
}

/// Static per-tier scheduling policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPolicy {
    pub base_priority: PerTier<f64>,
    /// Target share of concurrent slots.
    pub weight: PerTier<f64>,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            base_priority: PerTier::new(30.0, 20.0, 10.0),
            weight: PerTier::new(0.7, 0.2, 0.1),
        }
    }
}

impl TierPolicy {
    /// `floor(max_concurrent * weight)` for one tier.
    pub fn target_share(&self, tier: Tier, max_concurrent: usize) -> usize {
        (max_concurrent as f64 * self.weight.get(tier)).floor().max(0.0) as usize
    }

    /// Target shares for every tier.
    pub fn allocation(&self, max_concurrent: usize) -> PerTier<usize> {
        self.weight.map(|t, _| self.target_share(t, max_concurrent))
    }
}
