//! Catalog construction from configuration
//!
//! Expands each service's algorithm entries into workloads, substituting
//! account and parameter placeholders into the launch templates, and builds
//! the price service behind each service.

use std::sync::Arc;

use switchyard_common::{ExecSpec, Result, ServiceId, ServiceKind, SwitchyardError};
use switchyard_engine::WorkloadCatalog;
use switchyard_pricing::{JsonFileService, KeyMap, ManualService, PriceQuote, PriceService};
use tracing::debug;

use crate::config::{AlgorithmSettings, DaemonConfig, ServiceSettings};

/// Display names of well-known algorithms
const KNOWN_ALGORITHMS: &[(&str, &str)] = &[
    ("x11", "X11"),
    ("x13", "X13"),
    ("x14", "X14"),
    ("x15", "X15"),
    ("scrypt", "Scrypt"),
    ("scryptn", "Scrypt-N"),
    ("sha256", "SHA256"),
    ("nist5", "Nist5"),
    ("keccak", "Keccak"),
    ("quark", "Quark"),
    ("neoscrypt", "NeoScrypt"),
];

/// Display name for an algorithm: explicit, then the known table, then the key
pub fn display_name(algorithm: &AlgorithmSettings) -> String {
    if let Some(display) = algorithm.display.as_deref().filter(|d| !d.trim().is_empty()) {
        return display.to_string();
    }
    KNOWN_ALGORITHMS
        .iter()
        .find(|(key, _)| *key == algorithm.name)
        .map(|(_, display)| display.to_string())
        .unwrap_or_else(|| algorithm.name.clone())
}

/// Placeholder values for one service and algorithm
struct Substitution<'a> {
    account: &'a str,
    worker: &'a str,
    service: &'a ServiceSettings,
    algorithm: &'a AlgorithmSettings,
}

impl Substitution<'_> {
    fn apply(&self, raw: &str) -> String {
        let params = [
            &self.service.param1,
            &self.service.param2,
            &self.service.param3,
        ];
        let aparams = [
            &self.algorithm.aparam1,
            &self.algorithm.aparam2,
            &self.algorithm.aparam3,
        ];

        let mut out = raw
            .replace("_ACCOUNT_", self.account)
            .replace("_WORKER_", self.worker);
        for (n, value) in params.iter().enumerate() {
            out = out
                .replace(&format!("_PARAM{}_", n + 1), value)
                .replace(&format!("_SPARAM{}_", n + 1), value);
        }
        for (n, value) in aparams.iter().enumerate() {
            out = out.replace(&format!("_APARAM{}_", n + 1), value);
        }
        out
    }

    fn exec(&self, folder: &str, command: &str, arguments: &str) -> ExecSpec {
        ExecSpec::new(self.apply(folder), self.apply(command), self.apply(arguments))
    }
}

/// Catalog plus the price service of each registered service
pub struct LoadedCatalog {
    pub catalog: WorkloadCatalog,
    pub services: Vec<(ServiceId, Arc<dyn PriceService>)>,
}

/// Build the catalog and price services described by `config`
pub fn build(config: &DaemonConfig) -> Result<LoadedCatalog> {
    let mut catalog = WorkloadCatalog::new();
    let mut services: Vec<(ServiceId, Arc<dyn PriceService>)> = Vec::new();

    for settings in &config.services {
        let keys = settings
            .translations
            .iter()
            .fold(KeyMap::new(), |keys, (from, to)| {
                keys.with_translation(&from.to_lowercase(), to)
            });
        let reference = catalog.add_service(settings.name.clone(), settings.kind, keys);
        let mut manual_prices = Vec::new();

        for entry in &settings.algos {
            let algorithm = config.algorithm(&entry.algo).ok_or_else(|| {
                SwitchyardError::Config(format!(
                    "service '{}' references unknown algorithm '{}'",
                    settings.name, entry.algo
                ))
            })?;

            let normal = Substitution {
                account: &settings.account,
                worker: &settings.worker,
                service: settings,
                algorithm,
            };
            let donation = (!settings.donation_account.trim().is_empty()).then(|| Substitution {
                account: &settings.donation_account,
                worker: &settings.donation_worker,
                service: settings,
                algorithm,
            });

            let workload = catalog.add_workload(&reference, &entry.algo, display_name(algorithm));
            workload.price_id = entry.price_id.clone().filter(|p| !p.trim().is_empty());
            workload.hashrate = algorithm.hashrate;
            workload.power = algorithm.power;
            workload.priority = algorithm.priority.clone();
            workload.affinity = algorithm.affinity;
            workload.weight = settings.weight;
            workload.min_profit = settings.min_profit;
            workload.use_window = entry.use_window;
            workload.normal = normal.exec(&entry.folder, &entry.command, &entry.arguments);
            if let Some(donation) = donation {
                workload.donation = donation.exec(&entry.folder, &entry.command, &entry.arguments);
            }

            if let Some(price) = entry.price {
                let key = workload
                    .price_id
                    .clone()
                    .unwrap_or_else(|| entry.algo.clone());
                manual_prices.push(PriceQuote::new(key, price));
            }
        }

        let service: Arc<dyn PriceService> = match settings.kind {
            ServiceKind::Manual => Arc::new(ManualService::new(&settings.name, manual_prices)),
            ServiceKind::JsonFile => {
                let path = settings.path.clone().ok_or_else(|| {
                    SwitchyardError::Config(format!("service '{}' needs a path", settings.name))
                })?;
                let mut service = JsonFileService::new(&settings.name, path);
                if let Some(multiplier) = settings.price_multiplier {
                    service = service.with_price_multiplier(multiplier);
                }
                Arc::new(service)
            }
        };
        debug!(
            service = %settings.name,
            workloads = settings.algos.len(),
            "Service registered"
        );
        services.push((reference.id, service));
    }

    Ok(LoadedCatalog { catalog, services })
}
