//! Quote key resolution
//!
//! Services name algorithms their own way. A quote key matches a workload
//! whose `price_id` equals the key, or, when the workload has no `price_id`,
//! whose algorithm equals the key after translation.

use std::collections::HashMap;

use switchyard_common::{Workload, WorkloadId};

/// Per-service algorithm key translations
#[derive(Debug, Clone, Default)]
pub struct KeyMap {
    translations: HashMap<String, String>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate a service key to a catalog algorithm name
    pub fn with_translation(mut self, service_key: &str, algo: &str) -> Self {
        self.translations
            .insert(service_key.to_string(), algo.to_string());
        self
    }

    /// Catalog algorithm name for a service key
    pub fn algo_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.translations.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Whether a quote key addresses the workload
    pub fn matches(&self, key: &str, workload: &Workload) -> bool {
        match workload.price_id.as_deref() {
            Some(price_id) => price_id == key,
            None => workload.algo == self.algo_name(key),
        }
    }

    /// First workload among `candidates` addressed by `key`
    pub fn resolve<'a, I>(&self, key: &str, candidates: I) -> Option<WorkloadId>
    where
        I: IntoIterator<Item = &'a Workload>,
    {
        candidates
            .into_iter()
            .find(|w| self.matches(key, w))
            .map(|w| w.id)
    }
}
