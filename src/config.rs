use anyhow::{Context, Result};
use std::{
    env,
    path::{Path, PathBuf},
};

use crate::types::{NetworkDataset, PricingLogicConfig};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub workers: usize,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub dataset_path: PathBuf,
    pub pricing_path: PathBuf,
    pub cache_ttl_ms: u64,
    pub dataset: NetworkDataset,
    pub pricing: PricingLogicConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("NETDESIGN_BIND").unwrap_or_else(|_| "0.0.0.0:9480".to_string());
        let workers = env::var("NETDESIGN_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(num_cpus::get_physical);

        let dataset_path = PathBuf::from(
            env::var("NETDESIGN_DATASET_PATH").unwrap_or_else(|_| "./configs/dataset.json".into()),
        );
        let pricing_path = PathBuf::from(
            env::var("NETDESIGN_PRICING_PATH").unwrap_or_else(|_| "./configs/pricing.json".into()),
        );
        let cache_ttl_ms = env::var("NETDESIGN_CACHE_TTL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15_000);

        let dataset = load_dataset(&dataset_path)?;
        let pricing = load_pricing(&pricing_path)?;

        Ok(Self {
            server: ServerConfig { bind_addr, workers },
            dataset_path,
            pricing_path,
            cache_ttl_ms,
            dataset,
            pricing,
        })
    }
}

pub fn load_dataset(path: &Path) -> Result<NetworkDataset> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read dataset file at {:?}", path))?;
    let dataset: NetworkDataset = serde_json::from_str(&raw)
        .or_else(|_| serde_yaml::from_str(&raw))
        .with_context(|| "parse network dataset")?;
    Ok(dataset)
}

pub fn load_pricing(path: &Path) -> Result<PricingLogicConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read pricing config at {:?}", path))?;
    let pricing: PricingLogicConfig = serde_json::from_str(&raw)
        .or_else(|_| serde_yaml::from_str(&raw))
        .with_context(|| "parse pricing config")?;
    Ok(pricing)
}
