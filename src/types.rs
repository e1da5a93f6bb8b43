use crate::errors::EngineError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

pub type Currency = String;

pub const DEFAULT_MTU: u32 = 1500;
pub const MTU_CEILING: u32 = 9000;
pub const VALID_CONTRACT_TERMS: [u32; 3] = [12, 24, 36];

/// Circuit capacity: a numeric Mbps figure, or dark fiber which is
/// treated as unconstrained for bandwidth filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BandwidthSpec {
    Mbps(f64),
    DarkFiber,
}

static BANDWIDTH_PATTERN: OnceLock<Regex> = OnceLock::new();

fn bandwidth_pattern() -> &'static Regex {
    BANDWIDTH_PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^([0-9]+(?:\.[0-9]+)?)\s*(g|m)?(?:b(?:ps)?)?$").expect("static pattern")
    })
}

impl BandwidthSpec {
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("dark fiber") {
            return Ok(BandwidthSpec::DarkFiber);
        }
        let captures = bandwidth_pattern()
            .captures(trimmed)
            .ok_or_else(|| EngineError::InvalidBandwidthSpec(raw.to_string()))?;
        let value: f64 = captures[1]
            .parse()
            .map_err(|_| EngineError::InvalidBandwidthSpec(raw.to_string()))?;
        let scale = match captures.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
            Some(unit) if unit == "g" => 1000.0,
            _ => 1.0,
        };
        Ok(BandwidthSpec::Mbps(value * scale))
    }

    /// Whether an edge with this capacity can carry the requested bandwidth.
    pub fn meets(&self, required_mbps: f64) -> bool {
        match self {
            BandwidthSpec::DarkFiber => true,
            BandwidthSpec::Mbps(capacity) => *capacity >= required_mbps,
        }
    }

    pub fn mbps(&self) -> Option<f64> {
        match self {
            BandwidthSpec::Mbps(value) => Some(*value),
            BandwidthSpec::DarkFiber => None,
        }
    }
}

impl Serialize for BandwidthSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BandwidthSpec::Mbps(value) => serializer.serialize_f64(*value),
            BandwidthSpec::DarkFiber => serializer.serialize_str("Dark Fiber"),
        }
    }
}

impl<'de> Deserialize<'de> for BandwidthSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(f64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Num(value) if value >= 0.0 => Ok(BandwidthSpec::Mbps(value)),
            Raw::Num(value) => Err(serde::de::Error::custom(format!(
                "negative bandwidth: {value}"
            ))),
            Raw::Text(text) => BandwidthSpec::parse(&text).map_err(serde::de::Error::custom),
        }
    }
}

/// The four pricing tiers locations and promo rules are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandwidthTier {
    Under100,
    From100,
    From1000,
    From3000,
}

impl BandwidthTier {
    pub fn for_mbps(mbps: f64) -> Self {
        if mbps < 100.0 {
            BandwidthTier::Under100
        } else if mbps < 1000.0 {
            BandwidthTier::From100
        } else if mbps < 3000.0 {
            BandwidthTier::From1000
        } else {
            BandwidthTier::From3000
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BandwidthTier::Under100 => "<100Mb",
            BandwidthTier::From100 => "100-999Mb",
            BandwidthTier::From1000 => "1000-2999Mb",
            BandwidthTier::From3000 => "3000Mb+",
        }
    }
}

/// Per-tier monthly price figures, USD. Used both for location floors and
/// promo flat prices; a zero entry means "not set" for that tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierPrices {
    #[serde(default)]
    pub under_100: f64,
    #[serde(default)]
    pub from_100: f64,
    #[serde(default)]
    pub from_1000: f64,
    #[serde(default)]
    pub from_3000: f64,
}

impl TierPrices {
    pub fn for_tier(&self, tier: BandwidthTier) -> f64 {
        match tier {
            BandwidthTier::Under100 => self.under_100,
            BandwidthTier::From100 => self.from_100,
            BandwidthTier::From1000 => self.from_1000,
            BandwidthTier::From3000 => self.from_3000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    #[default]
    Active,
    UnderConstruction,
    Decommissioned,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatacenterInfo {
    pub provider: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub code: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub pop_type: Option<String>,
    #[serde(default)]
    pub status: LocationStatus,
    #[serde(default)]
    pub minimum_prices: TierPrices,
    #[serde(default)]
    pub datacenter: Option<DatacenterInfo>,
}

/// Undirected point-to-point connection between two locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Circuit {
    pub id: String,
    pub a_end: String,
    pub b_end: String,
    pub bandwidth: BandwidthSpec,
    pub latency_ms: f64,
    pub carrier: String,
    #[serde(default)]
    pub a_loop_carrier: Option<String>,
    #[serde(default)]
    pub b_loop_carrier: Option<String>,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    #[serde(default)]
    pub equipment: Option<String>,
    #[serde(default)]
    pub special: bool,
    pub monthly_cost: f64,
    #[serde(default = "default_currency")]
    pub cost_currency: Currency,
    #[serde(default)]
    pub utilization_pct: f32,
}

fn default_mtu() -> u32 {
    DEFAULT_MTU
}

fn default_currency() -> Currency {
    "USD".into()
}

fn default_term() -> u32 {
    12
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Carrier {
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Units of the currency per 1 USD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub code: Currency,
    pub rate: f64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Administrator-defined flat-price override for specific source and
/// destination location sets, per bandwidth tier. Rule order is creation
/// order and is significant: the first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoRule {
    pub name: String,
    pub sources: HashSet<String>,
    pub destinations: HashSet<String>,
    pub tier_prices: TierPrices,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TermPolicy {
    pub min_margin_pct: f64,
    pub suggested_margin_pct: f64,
    pub nrc_usd: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UtilizationFactors {
    pub primary: f64,
    pub protection: f64,
}

impl Default for UtilizationFactors {
    fn default() -> Self {
        Self {
            primary: 1.0,
            protection: 1.0,
        }
    }
}

fn default_rate_age() -> i64 {
    72
}

/// Admin-editable pricing knobs, read on every calculation. Swapped as a
/// whole snapshot; never mutated field by field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingLogicConfig {
    pub terms: HashMap<u32, TermPolicy>,
    pub ull_premium_pct: f64,
    pub protection_path_multiplier: f64,
    #[serde(default)]
    pub utilization_factors: UtilizationFactors,
    #[serde(default = "default_rate_age")]
    pub max_rate_age_hours: i64,
}

impl PricingLogicConfig {
    pub fn term_policy(&self, term: u32) -> Option<&TermPolicy> {
        self.terms.get(&term)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        for (term, policy) in &self.terms {
            if !VALID_CONTRACT_TERMS.contains(term) {
                return Err(EngineError::InvalidPricingConfig(format!(
                    "unsupported contract term: {term}"
                )));
            }
            if !(0.0..100.0).contains(&policy.min_margin_pct)
                || !(0.0..100.0).contains(&policy.suggested_margin_pct)
                || policy.min_margin_pct >= policy.suggested_margin_pct
            {
                return Err(EngineError::InvalidPricingConfig(format!(
                    "term {term}: margins must satisfy 0 <= min < suggested < 100"
                )));
            }
            if policy.nrc_usd < 0.0 {
                return Err(EngineError::InvalidPricingConfig(format!(
                    "term {term}: negative NRC"
                )));
            }
        }
        if self.protection_path_multiplier <= 0.0 {
            return Err(EngineError::InvalidPricingConfig(
                "protection_path_multiplier must be positive".into(),
            ));
        }
        if self.utilization_factors.primary <= 0.0 || self.utilization_factors.protection <= 0.0 {
            return Err(EngineError::InvalidPricingConfig(
                "utilization factors must be positive".into(),
            ));
        }
        if self.ull_premium_pct < 0.0 {
            return Err(EngineError::InvalidPricingConfig(
                "ull_premium_pct must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Everything a routing/pricing request computes over, loaded as one
/// document and swapped atomically on reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkDataset {
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    pub locations: Vec<Location>,
    pub circuits: Vec<Circuit>,
    #[serde(default)]
    pub carriers: Vec<Carrier>,
    #[serde(default)]
    pub exchange_rates: Vec<ExchangeRate>,
    #[serde(default)]
    pub promo_rules: Vec<PromoRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    #[serde(default)]
    pub request_id: String,
    pub source: String,
    pub destination: String,
    pub bandwidth_mbps: f64,
    #[serde(default)]
    pub protection_required: bool,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    #[serde(default)]
    pub include_ull: bool,
    #[serde(default)]
    pub include_cisco: bool,
    #[serde(default)]
    pub avoid_carriers: HashSet<String>,
    #[serde(default = "default_term")]
    pub contract_term: u32,
    #[serde(default = "default_currency")]
    pub currency: Currency,
    #[serde(default)]
    pub user: Option<String>,
}

impl Default for RouteRequest {
    fn default() -> Self {
        Self {
            request_id: String::new(),
            source: String::new(),
            destination: String::new(),
            bandwidth_mbps: 0.0,
            protection_required: false,
            mtu: DEFAULT_MTU,
            include_ull: false,
            include_cisco: false,
            avoid_carriers: HashSet::new(),
            contract_term: 12,
            currency: "USD".into(),
            user: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathType {
    Primary,
    Protection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSegment {
    pub circuit_id: String,
    pub from: String,
    pub to: String,
    pub latency_ms: f64,
    pub bandwidth: BandwidthSpec,
    pub carrier: String,
    pub special: bool,
    pub monthly_cost: f64,
    pub cost_currency: Currency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathResult {
    pub path_type: PathType,
    pub segments: Vec<PathSegment>,
    /// Ordered location codes, endpoints included.
    pub nodes: Vec<String>,
    pub total_latency_ms: f64,
    pub hop_count: u32,
}

impl PathResult {
    pub fn source(&self) -> Option<&str> {
        self.nodes.first().map(String::as_str)
    }

    pub fn destination(&self) -> Option<&str> {
        self.nodes.last().map(String::as_str)
    }

    pub fn circuit_ids(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .map(|segment| segment.circuit_id.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingRequest {
    #[serde(default)]
    pub request_id: String,
    pub paths: Vec<PathResult>,
    pub bandwidth_mbps: f64,
    #[serde(default = "default_term")]
    pub contract_term: u32,
    #[serde(default = "default_currency")]
    pub currency: Currency,
    #[serde(default)]
    pub protection_required: bool,
    #[serde(default)]
    pub include_ull: bool,
    #[serde(default)]
    pub user: Option<String>,
}
