//! Keyed TTL cache for weather alert dedup.
//!
//! Remembers which (patient, urgency) alerts went out recently so a sweep
//! that re-evaluates the same forecast does not text the patient again.
//! Uses [`moka`] so entries expire and the cache stays bounded.

use crate::config::DedupConfig;
use crate::scheduler::policy::WeatherUrgency;
use moka::future::Cache;
use std::time::Duration;

/// Dedup key: one alert per patient per urgency tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    patient_id: String,
    urgency: WeatherUrgency,
}

impl AlertKey {
    #[must_use]
    pub fn new(patient_id: &str, urgency: WeatherUrgency) -> Self {
        Self {
            patient_id: patient_id.trim().to_owned(),
            urgency,
        }
    }
}

/// Bounded, expiring record of recently sent alerts.
#[derive(Clone)]
pub struct AlertDedupCache {
    cache: Cache<AlertKey, ()>,
}

impl AlertDedupCache {
    #[must_use]
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(Duration::from_secs(config.ttl_secs))
                .build(),
        }
    }

    /// Record `key`. Returns `true` if it was not already present.
    pub async fn first_seen(&self, key: AlertKey) -> bool {
        let entry = self.cache.entry(key).or_insert(()).await;
        entry.is_fresh()
    }

    /// Forget `key`, e.g. when the alert could not be delivered.
    pub async fn forget(&self, key: &AlertKey) {
        self.cache.invalidate(key).await;
    }
}
