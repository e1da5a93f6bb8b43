use crate::audit::{AuditAction, AuditRecorder, AuditStore, MemoryAuditStore};
use crate::cache::{CacheKey, SearchCache};
use crate::config::{self, ServiceConfig};
use crate::errors::EngineError;
use crate::filter::{self, ExclusionReport};
use crate::graph::CircuitGraph;
use crate::path::{self, ProtectionStatus};
use crate::pricing::{self, PricingContext, PricingResponse};
use crate::types::{
    Carrier, Circuit, ExchangeRate, Location, LocationStatus, NetworkDataset, PathResult,
    PricingLogicConfig, PricingRequest, PromoRule, RouteRequest, MTU_CEILING,
};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const MAX_CACHE_CAPACITY: u64 = 10_000;

/// Dataset snapshot compiled into lookup form. Swapped whole on reload;
/// a request only ever sees one snapshot end to end.
#[derive(Debug, Clone)]
pub struct CompiledDataset {
    pub revision: String,
    pub locations: HashMap<String, Location>,
    pub carriers: HashMap<String, Carrier>,
    pub rates: HashMap<String, ExchangeRate>,
    pub promos: Vec<PromoRule>,
    pub circuits: Vec<Circuit>,
    pub raw: NetworkDataset,
}

fn dataset_revision(doc: &NetworkDataset) -> Result<String, EngineError> {
    let bytes = serde_json::to_vec(doc).map_err(anyhow::Error::from)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());
    Ok(digest[..16].to_string())
}

fn compile_dataset(doc: &NetworkDataset) -> Result<CompiledDataset, EngineError> {
    let revision = dataset_revision(doc)?;

    let mut locations = HashMap::with_capacity(doc.locations.len());
    for location in &doc.locations {
        if locations
            .insert(location.code.clone(), location.clone())
            .is_some()
        {
            tracing::warn!(code = location.code, "duplicate location code; last wins");
        }
    }

    let carriers: HashMap<String, Carrier> = doc
        .carriers
        .iter()
        .map(|carrier| (carrier.name.to_ascii_lowercase(), carrier.clone()))
        .collect();
    if !carriers.is_empty() {
        for circuit in &doc.circuits {
            if !carriers.contains_key(&circuit.carrier.to_ascii_lowercase()) {
                tracing::warn!(
                    circuit = circuit.id,
                    carrier = circuit.carrier,
                    "circuit carrier not in carrier list"
                );
            }
        }
    }

    let rates: HashMap<String, ExchangeRate> = doc
        .exchange_rates
        .iter()
        .map(|rate| (rate.code.to_ascii_uppercase(), rate.clone()))
        .collect();

    Ok(CompiledDataset {
        revision,
        locations,
        carriers,
        rates,
        promos: doc.promo_rules.clone(),
        circuits: doc.circuits.clone(),
        raw: doc.clone(),
    })
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSearchResponse {
    pub request_id: String,
    pub source: String,
    pub destination: String,
    pub primary_path: PathResult,
    pub protection_path: Option<PathResult>,
    pub protection_status: Option<ProtectionStatus>,
    pub exclusion_reasons: ExclusionReport,
    pub dataset_revision: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub dataset_revision: String,
    pub locations: usize,
    pub circuits: usize,
    pub path_searches: u64,
    pub no_route: u64,
    pub pricing_calculations: u64,
    pub cache_hit_ratio: f32,
}

#[derive(Debug, Default, Clone)]
struct EngineMetrics {
    counters: Arc<DashMap<&'static str, u64>>,
}

impl EngineMetrics {
    fn bump(&self, key: &'static str) {
        self.counters
            .entry(key)
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn get(&self, key: &'static str) -> u64 {
        self.counters.get(key).map(|entry| *entry.value()).unwrap_or(0)
    }
}

pub struct DesignEngine {
    dataset_path: PathBuf,
    dataset: ArcSwap<CompiledDataset>,
    pricing: ArcSwap<PricingLogicConfig>,
    cache: SearchCache,
    audit: AuditRecorder,
    metrics: EngineMetrics,
}

impl DesignEngine {
    pub fn bootstrap(cfg: &ServiceConfig) -> Result<Self, EngineError> {
        cfg.pricing.validate()?;
        let compiled = compile_dataset(&cfg.dataset)?;
        tracing::info!(
            revision = compiled.revision,
            locations = compiled.locations.len(),
            circuits = compiled.circuits.len(),
            "dataset compiled"
        );
        Ok(Self {
            dataset_path: cfg.dataset_path.clone(),
            dataset: ArcSwap::from_pointee(compiled),
            pricing: ArcSwap::from_pointee(cfg.pricing.clone()),
            cache: SearchCache::new(MAX_CACHE_CAPACITY, cfg.cache_ttl_ms),
            audit: AuditRecorder::new(Arc::new(MemoryAuditStore::new())),
            metrics: EngineMetrics::default(),
        })
    }

    pub fn audit_store(&self) -> Arc<dyn AuditStore> {
        self.audit.store()
    }

    pub fn dataset_revision(&self) -> String {
        self.dataset.load().revision.clone()
    }

    pub fn pricing_config(&self) -> PricingLogicConfig {
        self.pricing.load().as_ref().clone()
    }

    /// Replace the pricing config as one snapshot. Readers mid-request
    /// keep the snapshot they loaded; nobody ever sees a half-applied
    /// update.
    pub fn set_pricing_config(&self, cfg: PricingLogicConfig) -> Result<(), EngineError> {
        cfg.validate()?;
        self.pricing.store(Arc::new(cfg));
        Ok(())
    }

    pub async fn reload_dataset(&self) -> Result<String, EngineError> {
        let doc = config::load_dataset(&self.dataset_path)?;
        let compiled = compile_dataset(&doc)?;
        let revision = compiled.revision.clone();
        self.dataset.store(Arc::new(compiled));
        self.cache.clear().await;
        tracing::info!(revision, "dataset reloaded");
        Ok(revision)
    }

    pub async fn find_path(
        &self,
        mut req: RouteRequest,
    ) -> Result<RouteSearchResponse, EngineError> {
        let started = Instant::now();
        if req.request_id.is_empty() {
            req.request_id = Uuid::new_v4().to_string();
        }
        let dataset = self.dataset.load();
        self.validate_route_request(&req, &dataset)?;

        let key = CacheKey::derive(&dataset.revision, &req);
        if let Some(hit) = self.cache.get(&key).await {
            self.metrics.bump("path_searches");
            self.metrics.bump("cache_hits");
            let mut response = (*hit).clone();
            response.request_id = req.request_id.clone();
            self.record_search(&req, Ok(&response), started);
            return Ok(response);
        }

        let graph = CircuitGraph::build(&dataset.locations, &dataset.circuits);
        let filtered = filter::apply(&graph, &req, &dataset.locations);
        let outcome = match path::find_route(&graph, &filtered, &req, &dataset.locations) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.metrics.bump("path_searches");
                self.metrics.bump("no_route");
                self.record_search(&req, Err(&err), started);
                return Err(err);
            }
        };

        let response = RouteSearchResponse {
            request_id: req.request_id.clone(),
            source: req.source.clone(),
            destination: req.destination.clone(),
            primary_path: outcome.primary,
            protection_path: outcome.protection,
            protection_status: outcome.protection_status,
            exclusion_reasons: filtered.report,
            dataset_revision: dataset.revision.clone(),
        };

        self.cache.insert(key, Arc::new(response.clone())).await;
        self.metrics.bump("path_searches");
        self.record_search(&req, Ok(&response), started);
        Ok(response)
    }

    pub fn calculate_pricing(
        &self,
        mut req: PricingRequest,
    ) -> Result<PricingResponse, EngineError> {
        let started = Instant::now();
        if req.request_id.is_empty() {
            req.request_id = Uuid::new_v4().to_string();
        }
        let dataset = self.dataset.load();
        let config = self.pricing.load();
        let ctx = PricingContext {
            config: &config,
            rates: &dataset.rates,
            locations: &dataset.locations,
            promos: &dataset.promos,
        };

        let result = pricing::price_paths(&ctx, &req);
        self.metrics.bump("pricing_calculations");
        let output = match &result {
            Ok(response) => serde_json::to_value(response).unwrap_or(Value::Null),
            Err(err) => error_payload(err),
        };
        self.audit.record(
            req.user.as_deref(),
            AuditAction::PricingCalculation,
            serde_json::to_value(&req).unwrap_or(Value::Null),
            output,
            started.elapsed(),
        );
        result
    }

    pub fn stats(&self) -> EngineStats {
        let dataset = self.dataset.load();
        let searches = self.metrics.get("path_searches");
        let hits = self.metrics.get("cache_hits");
        EngineStats {
            dataset_revision: dataset.revision.clone(),
            locations: dataset.locations.len(),
            circuits: dataset.circuits.len(),
            path_searches: searches,
            no_route: self.metrics.get("no_route"),
            pricing_calculations: self.metrics.get("pricing_calculations"),
            cache_hit_ratio: if searches == 0 {
                0.0
            } else {
                hits as f32 / searches as f32
            },
        }
    }

    fn validate_route_request(
        &self,
        req: &RouteRequest,
        dataset: &CompiledDataset,
    ) -> Result<(), EngineError> {
        if req.bandwidth_mbps <= 0.0 {
            return Err(EngineError::InvalidRequest(
                "bandwidth_mbps must be positive".into(),
            ));
        }
        if req.mtu == 0 || req.mtu > MTU_CEILING {
            return Err(EngineError::InvalidRequest(format!(
                "mtu must be between 1 and {MTU_CEILING}"
            )));
        }
        if req.source == req.destination {
            return Err(EngineError::InvalidRequest(
                "source and destination must differ".into(),
            ));
        }
        for code in [&req.source, &req.destination] {
            let location = dataset
                .locations
                .get(code)
                .ok_or_else(|| EngineError::UnknownLocation(code.clone()))?;
            if location.status == LocationStatus::Decommissioned {
                return Err(EngineError::InvalidRequest(format!(
                    "location {code} is decommissioned"
                )));
            }
        }
        if !dataset.carriers.is_empty() {
            for name in &req.avoid_carriers {
                if !dataset.carriers.contains_key(&name.to_ascii_lowercase()) {
                    tracing::warn!(carrier = name, "avoidance names unknown carrier");
                }
            }
        }
        Ok(())
    }

    fn record_search(
        &self,
        req: &RouteRequest,
        result: Result<&RouteSearchResponse, &EngineError>,
        started: Instant,
    ) {
        let output = match result {
            Ok(response) => serde_json::to_value(response).unwrap_or(Value::Null),
            Err(err) => error_payload(err),
        };
        self.audit.record(
            req.user.as_deref(),
            AuditAction::PathSearch,
            serde_json::to_value(req).unwrap_or(Value::Null),
            output,
            started.elapsed(),
        );
    }
}

fn error_payload(err: &EngineError) -> Value {
    let mut payload = serde_json::json!({
        "error": err.code().as_str(),
        "message": err.to_string(),
    });
    if let (Some(details), Some(map)) = (err.details(), payload.as_object_mut()) {
        map.insert("details".into(), details);
    }
    payload
}
