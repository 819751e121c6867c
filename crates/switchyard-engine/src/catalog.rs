//! Workload catalog
//!
//! Owns every workload and the service table. Ids are assigned `1..=N` in
//! insertion order and never change; insertion order is also the tie-break
//! order when ranking.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use switchyard_common::{
    MiningMode, PowerPricing, PricingError, ServiceId, ServiceKind, ServiceRef, Workload, WorkloadId,
};
use switchyard_pricing::{KeyMap, StalePolicy};
use tracing::debug;

/// Runtime state of one pricing service
#[derive(Debug, Clone)]
pub struct ServiceState {
    pub reference: ServiceRef,
    /// Key translations for this service's quotes
    pub keys: KeyMap,
    /// Sum of the workload balances last reported
    pub balance: Decimal,
    /// Last successful price update
    pub last_updated: Option<DateTime<Utc>>,
}

impl ServiceState {
    pub fn name(&self) -> &str {
        &self.reference.name
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkloadCatalog {
    services: Vec<ServiceState>,
    workloads: Vec<Workload>,
}

impl WorkloadCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pricing service
    pub fn add_service(
        &mut self,
        name: impl Into<String>,
        kind: ServiceKind,
        keys: KeyMap,
    ) -> ServiceRef {
        let reference = ServiceRef {
            id: ServiceId(self.services.len()),
            name: name.into(),
            kind,
        };
        self.services.push(ServiceState {
            reference: reference.clone(),
            keys,
            balance: Decimal::ZERO,
            last_updated: None,
        });
        reference
    }

    /// Append a workload under `service`, assigning the next id
    pub fn add_workload(
        &mut self,
        service: &ServiceRef,
        algo: impl Into<String>,
        name: impl Into<String>,
    ) -> &mut Workload {
        let id = WorkloadId(self.workloads.len() as u32 + 1);
        self.workloads
            .push(Workload::new(id, algo, name, service.clone()));
        let index = self.workloads.len() - 1;
        &mut self.workloads[index]
    }

    pub fn len(&self) -> usize {
        self.workloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workloads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Workload> {
        self.workloads.iter()
    }

    pub fn get(&self, id: WorkloadId) -> Option<&Workload> {
        let index = (id.0 as usize).checked_sub(1)?;
        self.workloads.get(index).filter(|w| w.id == id)
    }

    pub fn get_mut(&mut self, id: WorkloadId) -> Option<&mut Workload> {
        let index = (id.0 as usize).checked_sub(1)?;
        self.workloads.get_mut(index).filter(|w| w.id == id)
    }

    pub fn services(&self) -> &[ServiceState] {
        &self.services
    }

    pub fn service(&self, id: ServiceId) -> Option<&ServiceState> {
        self.services.get(id.0)
    }

    pub fn service_mut(&mut self, id: ServiceId) -> Option<&mut ServiceState> {
        self.services.get_mut(id.0)
    }

    /// Workloads owned by a service, in catalog order
    pub fn workloads_of(&self, service: ServiceId) -> impl Iterator<Item = &Workload> {
        self.workloads
            .iter()
            .filter(move |w| w.service.id == service)
    }

    /// Workload running `algo` owned by `service`, else the last one running `algo`
    pub fn find(&self, service: &str, algo: &str) -> Option<WorkloadId> {
        self.workloads
            .iter()
            .find(|w| w.service_name() == service && w.algo == algo)
            .or_else(|| self.workloads.iter().rev().find(|w| w.algo == algo))
            .map(|w| w.id)
    }

    /// Whether any workload can run in donation mode
    pub fn has_donation_commands(&self) -> bool {
        self.workloads
            .iter()
            .any(|w| w.has_command(MiningMode::Donation))
    }

    /// Workloads that are not banned, not dead, above the price floor and
    /// have a command for `mode`
    pub fn filter_usable(
        &self,
        now: DateTime<Utc>,
        dead_time: Duration,
        mode: MiningMode,
    ) -> Vec<&Workload> {
        self.workloads
            .iter()
            .filter(|w| w.is_usable(now, dead_time, mode))
            .collect()
    }

    /// Descending by net earn (or net average); ties keep catalog order
    pub fn rank<'a>(
        usable: Vec<&'a Workload>,
        by_average: bool,
        pricing: &PowerPricing,
    ) -> Result<Vec<&'a Workload>, PricingError> {
        let mut scored = usable
            .into_iter()
            .map(|w| w.net_for_ranking(pricing, by_average).map(|net| (net, w)))
            .collect::<Result<Vec<(Decimal, &Workload)>, PricingError>>()?;
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().map(|(_, w)| w).collect())
    }

    /// Flip the ban flag on every workload of the named service
    ///
    /// Returns the number of workloads toggled.
    pub fn toggle_ban(&mut self, service: &str) -> usize {
        let mut toggled = 0;
        for workload in self
            .workloads
            .iter_mut()
            .filter(|w| w.service_name() == service)
        {
            workload.banned = !workload.banned;
            toggled += 1;
        }
        toggled
    }

    /// Recompute the price-floor flag of every workload
    pub fn tag_price_floor(
        &mut self,
        min_price: Decimal,
        pricing: &PowerPricing,
    ) -> Result<(), PricingError> {
        for workload in &mut self.workloads {
            workload.below_min_price = workload.net_earn(pricing)? < min_price;
        }
        Ok(())
    }

    /// Clear dead markers whose cooldown has elapsed
    pub fn clear_decayed_dead(&mut self, now: DateTime<Utc>, dead_time: Duration) -> usize {
        let mut cleared = 0;
        for workload in &mut self.workloads {
            if workload.dead_since.is_some() && !workload.is_dead(now, dead_time) {
                debug!(workload = %workload.id, "Dead cooldown elapsed");
                workload.dead_since = None;
                cleared += 1;
            }
        }
        cleared
    }

    /// Clear every dead marker
    pub fn clear_dead_times(&mut self) {
        for workload in &mut self.workloads {
            workload.dead_since = None;
        }
    }

    /// Zero the prices of a service whose last update is older than the
    /// policy window
    pub fn clear_stale_prices(
        &mut self,
        service: ServiceId,
        policy: &StalePolicy,
        now: DateTime<Utc>,
    ) -> bool {
        let stale = self
            .service(service)
            .map(|s| policy.is_stale(s.last_updated, now))
            .unwrap_or(false);
        if !stale {
            return false;
        }
        for workload in self.workloads.iter_mut().filter(|w| w.service.id == service) {
            workload.price = Decimal::ZERO;
            workload.average_price = None;
            workload.outlier = false;
        }
        true
    }

    /// Total accumulated mining time, excluding any current run
    pub fn total_time_mining(&self) -> Duration {
        self.workloads
            .iter()
            .fold(Duration::zero(), |acc, w| acc + w.time_mining)
    }
}
