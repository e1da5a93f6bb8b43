use crate::errors::EngineError;
use crate::promo;
use crate::types::{
    BandwidthTier, Currency, ExchangeRate, Location, PathResult, PathType, PricingLogicConfig,
    PricingRequest, PromoRule, TermPolicy,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::HashMap;

/// Currency conversion with USD as the pivot: amounts always pass through
/// USD, never rate-to-rate. Rates are units of the currency per 1 USD.
pub struct CurrencyTable<'a> {
    rates: &'a HashMap<String, ExchangeRate>,
    max_age_hours: i64,
}

impl<'a> CurrencyTable<'a> {
    pub fn new(rates: &'a HashMap<String, ExchangeRate>, max_age_hours: i64) -> Self {
        Self {
            rates,
            max_age_hours,
        }
    }

    fn rate_for(&self, code: &str) -> Result<f64, EngineError> {
        let upper = code.to_ascii_uppercase();
        if upper == "USD" {
            return Ok(1.0);
        }
        let entry = self
            .rates
            .get(&upper)
            .ok_or_else(|| EngineError::MissingExchangeRate(upper.clone()))?;
        if entry.rate <= 0.0 {
            return Err(EngineError::MissingExchangeRate(upper));
        }
        if let Some(updated) = entry.updated_at {
            let age_hours = (Utc::now() - updated).num_hours();
            if age_hours > self.max_age_hours {
                tracing::warn!(currency = upper, age_hours, "exchange rate is stale");
            }
        }
        Ok(entry.rate)
    }

    pub fn to_usd(&self, amount: f64, code: &str) -> Result<f64, EngineError> {
        Ok(amount / self.rate_for(code)?)
    }

    pub fn from_usd(&self, amount: f64, code: &str) -> Result<f64, EngineError> {
        Ok(amount * self.rate_for(code)?)
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromoApplication {
    pub used: bool,
    pub rule_name: Option<String>,
    pub tier: Option<BandwidthTier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingResult {
    pub path_type: PathType,
    pub allocated_cost: f64,
    pub minimum_price: f64,
    pub suggested_price: f64,
    pub min_margin_pct: f64,
    pub suggested_margin_pct: f64,
    pub nrc: f64,
    pub currency: Currency,
    /// True when a location floor overrode the computed margin price.
    pub margin_enforced: bool,
    pub promo_pricing: PromoApplication,
}

/// Combined protected-service price: 100% of the primary plus the
/// protection path scaled by the configured multiplier, not a plain sum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionPricing {
    pub minimum_price: f64,
    pub suggested_price: f64,
    pub nrc: f64,
    pub currency: Currency,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractTermDetails {
    pub term_months: u32,
    pub min_margin_pct: f64,
    pub suggested_margin_pct: f64,
    pub nrc_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingResponse {
    pub results: Vec<PricingResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection_pricing: Option<ProtectionPricing>,
    pub contract_term: ContractTermDetails,
    pub currency: Currency,
}

pub struct PricingContext<'a> {
    pub config: &'a PricingLogicConfig,
    pub rates: &'a HashMap<String, ExchangeRate>,
    pub locations: &'a HashMap<String, Location>,
    pub promos: &'a [PromoRule],
}

/// The two ways a path gets priced. Collapsed into the same
/// `PricingResult` fields at the boundary so consumers never branch.
enum PricingOutcome {
    Promo {
        rule_name: String,
        tier: BandwidthTier,
        flat_usd: f64,
    },
    Margin {
        minimum_usd: f64,
        suggested_usd: f64,
        margin_enforced: bool,
    },
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn endpoints(path: &PathResult) -> Result<(&str, &str), EngineError> {
    match (path.source(), path.destination()) {
        (Some(source), Some(destination)) if path.nodes.len() >= 2 => Ok((source, destination)),
        _ => Err(EngineError::InvalidRequest(
            "path must contain at least two nodes".into(),
        )),
    }
}

fn location_floor(
    locations: &HashMap<String, Location>,
    source: &str,
    destination: &str,
    tier: BandwidthTier,
) -> Result<f64, EngineError> {
    let a = locations
        .get(source)
        .ok_or_else(|| EngineError::UnknownLocation(source.to_string()))?;
    let b = locations
        .get(destination)
        .ok_or_else(|| EngineError::UnknownLocation(destination.to_string()))?;
    Ok(a.minimum_prices
        .for_tier(tier)
        .max(b.minimum_prices.for_tier(tier)))
}

pub fn price_paths(
    ctx: &PricingContext<'_>,
    req: &PricingRequest,
) -> Result<PricingResponse, EngineError> {
    let policy = ctx
        .config
        .term_policy(req.contract_term)
        .copied()
        .ok_or(EngineError::InvalidContractTerm(req.contract_term))?;
    if req.paths.is_empty() {
        return Err(EngineError::InvalidRequest("no paths to price".into()));
    }
    let tier = BandwidthTier::for_mbps(req.bandwidth_mbps);
    let table = CurrencyTable::new(ctx.rates, ctx.config.max_rate_age_hours);

    let mut results = Vec::with_capacity(req.paths.len());
    for path in &req.paths {
        results.push(price_path(ctx, &table, &policy, path, tier, req)?);
    }

    let protection_pricing = if req.protection_required {
        let primary = results
            .iter()
            .find(|result| result.path_type == PathType::Primary);
        let protection = results
            .iter()
            .find(|result| result.path_type == PathType::Protection);
        match (primary, protection) {
            (Some(p), Some(q)) => {
                let multiplier = ctx.config.protection_path_multiplier;
                Some(ProtectionPricing {
                    minimum_price: round2(p.minimum_price + q.minimum_price * multiplier),
                    suggested_price: round2(p.suggested_price + q.suggested_price * multiplier),
                    nrc: round2(p.nrc + q.nrc),
                    currency: req.currency.clone(),
                    multiplier,
                })
            }
            _ => None,
        }
    } else {
        None
    };

    Ok(PricingResponse {
        results,
        protection_pricing,
        contract_term: ContractTermDetails {
            term_months: req.contract_term,
            min_margin_pct: policy.min_margin_pct,
            suggested_margin_pct: policy.suggested_margin_pct,
            nrc_usd: policy.nrc_usd,
        },
        currency: req.currency.clone(),
    })
}

fn price_path(
    ctx: &PricingContext<'_>,
    table: &CurrencyTable<'_>,
    policy: &TermPolicy,
    path: &PathResult,
    tier: BandwidthTier,
    req: &PricingRequest,
) -> Result<PricingResult, EngineError> {
    let (source, destination) = endpoints(path)?;

    let mut cost_usd = 0.0;
    for segment in &path.segments {
        cost_usd += table.to_usd(segment.monthly_cost, &segment.cost_currency)?;
    }
    let factor = match path.path_type {
        PathType::Primary => ctx.config.utilization_factors.primary,
        PathType::Protection => ctx.config.utilization_factors.protection,
    };
    let allocated_usd = cost_usd * factor;

    // Promo pricing takes precedence over margin pricing, primary only;
    // protection paths never consult promo rules.
    let outcome = match path.path_type {
        PathType::Primary => promo::match_promo(ctx.promos, source, destination, tier).map(
            |(rule, flat_usd)| PricingOutcome::Promo {
                rule_name: rule.name.clone(),
                tier,
                flat_usd,
            },
        ),
        PathType::Protection => None,
    };

    let outcome = match outcome {
        Some(promo) => promo,
        None => {
            let mut minimum_usd = allocated_usd / (1.0 - policy.min_margin_pct / 100.0);
            let mut suggested_usd = allocated_usd / (1.0 - policy.suggested_margin_pct / 100.0);
            let floor = location_floor(ctx.locations, source, destination, tier)?;
            let mut margin_enforced = false;
            if floor > minimum_usd {
                let ratio = if minimum_usd > 0.0 {
                    floor / minimum_usd
                } else {
                    1.0
                };
                minimum_usd = floor;
                if suggested_usd < floor {
                    suggested_usd = (suggested_usd * ratio).max(floor);
                }
                margin_enforced = true;
            }
            if req.include_ull && path.segments.iter().any(|segment| segment.special) {
                let premium = 1.0 + ctx.config.ull_premium_pct / 100.0;
                minimum_usd *= premium;
                suggested_usd *= premium;
            }
            PricingOutcome::Margin {
                minimum_usd,
                suggested_usd,
                margin_enforced,
            }
        }
    };

    let allocated_cost = round2(table.from_usd(allocated_usd, &req.currency)?);
    let nrc = round2(table.from_usd(policy.nrc_usd, &req.currency)?);

    let result = match outcome {
        PricingOutcome::Promo {
            rule_name,
            tier,
            flat_usd,
        } => {
            let flat = round2(table.from_usd(flat_usd, &req.currency)?);
            PricingResult {
                path_type: path.path_type,
                allocated_cost,
                minimum_price: flat,
                suggested_price: flat,
                min_margin_pct: policy.min_margin_pct,
                suggested_margin_pct: policy.suggested_margin_pct,
                nrc,
                currency: req.currency.clone(),
                margin_enforced: false,
                promo_pricing: PromoApplication {
                    used: true,
                    rule_name: Some(rule_name),
                    tier: Some(tier),
                },
            }
        }
        PricingOutcome::Margin {
            minimum_usd,
            suggested_usd,
            margin_enforced,
        } => PricingResult {
            path_type: path.path_type,
            allocated_cost,
            minimum_price: round2(table.from_usd(minimum_usd, &req.currency)?),
            suggested_price: round2(table.from_usd(suggested_usd, &req.currency)?),
            min_margin_pct: policy.min_margin_pct,
            suggested_margin_pct: policy.suggested_margin_pct,
            nrc,
            currency: req.currency.clone(),
            margin_enforced,
            promo_pricing: PromoApplication::default(),
        },
    };

    Ok(result)
}
