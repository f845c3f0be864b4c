//! Platform fee calculation.
//!
//! Pure given a cache snapshot: `(organization tier, subtotal) -> fee`.
//! Tier configuration is read through a TTL cache over an injected
//! [`TierSource`]; on cache miss failure or a backing-store error the
//! calculator falls back to the hard-coded default tier, because a pricing
//! lookup must never block checkout.

use crate::error::StoreError;
use crate::store::DirectoryStore;
use crate::types::{Money, OrgId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// A fee tier: percentage (basis points) plus a fixed per-order amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeTier {
    /// Percentage of the subtotal, in basis points (500 = 5%).
    pub percent_bps: u32,
    /// Fixed fee per order, in cents.
    pub fixed_cents: u64,
}

impl FeeTier {
    /// The default tier applied when no configuration is reachable:
    /// 5% + 30 cents.
    pub const DEFAULT: Self = Self {
        percent_bps: 500,
        fixed_cents: 30,
    };

    /// Fee for a subtotal under this tier. The percentage component is
    /// rounded half-up.
    #[must_use]
    pub fn fee(&self, subtotal: Money) -> Money {
        let percent =
            (u128::from(subtotal.cents()) * u128::from(self.percent_bps) + 5_000) / 10_000;
        let cents = u64::try_from(percent)
            .unwrap_or(u64::MAX)
            .saturating_add(self.fixed_cents);
        Money::from_cents(cents)
    }
}

/// Source of per-organization tier configuration.
#[async_trait]
pub trait TierSource: Send + Sync {
    /// The tier configured for an organization, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read. Callers treat
    /// this the same as a miss.
    async fn tier_for(&self, org_id: OrgId) -> Result<Option<FeeTier>, StoreError>;
}

/// Adapter exposing a [`DirectoryStore`] as a [`TierSource`].
pub struct StoreTierSource<S: ?Sized>(pub Arc<S>);

#[async_trait]
impl<S: DirectoryStore + ?Sized> TierSource for StoreTierSource<S> {
    async fn tier_for(&self, org_id: OrgId) -> Result<Option<FeeTier>, StoreError> {
        self.0.org_tier(org_id).await
    }
}

struct CachedTier {
    tier: FeeTier,
    fetched_at: Instant,
}

/// Platform fee calculator with a bounded-staleness tier cache.
///
/// Process-wide state with an explicit TTL and explicit invalidation,
/// injected as a dependency so it can be faked in tests.
pub struct FeeCalculator {
    source: Arc<dyn TierSource>,
    cache: RwLock<HashMap<OrgId, CachedTier>>,
    ttl: Duration,
}

impl FeeCalculator {
    /// Default refresh interval for tier configuration.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    /// Creates a calculator over the given tier source.
    #[must_use]
    pub fn new(source: Arc<dyn TierSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Computes the platform fee for an order subtotal.
    ///
    /// Never fails: a miss or a backing-store error falls back to
    /// [`FeeTier::DEFAULT`].
    pub async fn platform_fee(&self, org_id: OrgId, subtotal: Money) -> Money {
        self.tier(org_id).await.fee(subtotal)
    }

    /// Resolves the effective tier for an organization.
    pub async fn tier(&self, org_id: OrgId) -> FeeTier {
        if let Some(tier) = self.cached(org_id) {
            return tier;
        }

        let tier = match self.source.tier_for(org_id).await {
            Ok(Some(tier)) => tier,
            Ok(None) => FeeTier::DEFAULT,
            Err(error) => {
                tracing::warn!(
                    org_id = %org_id,
                    error = %error,
                    "Tier lookup failed, using default tier"
                );
                FeeTier::DEFAULT
            }
        };

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(
                org_id,
                CachedTier {
                    tier,
                    fetched_at: Instant::now(),
                },
            );
        }
        tier
    }

    /// Drops the cached tier for one organization.
    pub fn invalidate(&self, org_id: OrgId) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(&org_id);
        }
    }

    /// Drops every cached tier.
    pub fn invalidate_all(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    fn cached(&self, org_id: OrgId) -> Option<FeeTier> {
        let cache = self.cache.read().ok()?;
        let entry = cache.get(&org_id)?;
        (entry.fetched_at.elapsed() < self.ttl).then_some(entry.tier)
    }
}
