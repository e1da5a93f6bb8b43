use netdesign::errors::EngineError;
use netdesign::pricing::{self, CurrencyTable, PricingContext};
use netdesign::types::{
    BandwidthSpec, BandwidthTier, ExchangeRate, Location, LocationStatus, PathResult, PathSegment,
    PathType, PricingLogicConfig, PricingRequest, PromoRule, TermPolicy, TierPrices,
    UtilizationFactors,
};
use std::collections::{HashMap, HashSet};

const EPS: f64 = 0.01;

fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < EPS
}

fn pricing_config() -> PricingLogicConfig {
    let mut terms = HashMap::new();
    terms.insert(
        12,
        TermPolicy {
            min_margin_pct: 30.0,
            suggested_margin_pct: 40.0,
            nrc_usd: 1000.0,
        },
    );
    terms.insert(
        24,
        TermPolicy {
            min_margin_pct: 25.0,
            suggested_margin_pct: 35.0,
            nrc_usd: 500.0,
        },
    );
    terms.insert(
        36,
        TermPolicy {
            min_margin_pct: 20.0,
            suggested_margin_pct: 30.0,
            nrc_usd: 250.0,
        },
    );
    PricingLogicConfig {
        terms,
        ull_premium_pct: 15.0,
        protection_path_multiplier: 0.5,
        utilization_factors: UtilizationFactors::default(),
        max_rate_age_hours: 72,
    }
}

fn location(code: &str) -> Location {
    Location {
        code: code.into(),
        city: String::new(),
        country: String::new(),
        pop_type: None,
        status: LocationStatus::Active,
        minimum_prices: TierPrices::default(),
        datacenter: None,
    }
}

fn segment(id: &str, from: &str, to: &str, cost: f64, currency: &str) -> PathSegment {
    PathSegment {
        circuit_id: id.into(),
        from: from.into(),
        to: to.into(),
        latency_ms: 10.0,
        bandwidth: BandwidthSpec::Mbps(1000.0),
        carrier: "TestNet".into(),
        special: false,
        monthly_cost: cost,
        cost_currency: currency.into(),
    }
}

fn path(path_type: PathType, segments: Vec<PathSegment>) -> PathResult {
    let mut nodes = vec![segments[0].from.clone()];
    nodes.extend(segments.iter().map(|seg| seg.to.clone()));
    let total_latency_ms = segments.iter().map(|seg| seg.latency_ms).sum();
    PathResult {
        path_type,
        hop_count: segments.len() as u32,
        total_latency_ms,
        segments,
        nodes,
    }
}

fn primary(cost: f64) -> PathResult {
    path(
        PathType::Primary,
        vec![segment("NL-001", "NYC4", "LON1", cost, "USD")],
    )
}

fn pricing_request(paths: Vec<PathResult>, bandwidth_mbps: f64) -> PricingRequest {
    PricingRequest {
        request_id: "test".into(),
        paths,
        bandwidth_mbps,
        contract_term: 12,
        currency: "USD".into(),
        protection_required: false,
        include_ull: false,
        user: None,
    }
}

struct Fixture {
    config: PricingLogicConfig,
    rates: HashMap<String, ExchangeRate>,
    locations: HashMap<String, Location>,
    promos: Vec<PromoRule>,
}

impl Fixture {
    fn new() -> Self {
        let rates = [("EUR", 0.9), ("GBP", 0.8)]
            .into_iter()
            .map(|(code, rate)| {
                (
                    code.to_string(),
                    ExchangeRate {
                        code: code.to_string(),
                        rate,
                        updated_at: None,
                    },
                )
            })
            .collect();
        let locations = ["NYC4", "LON1", "FRA2"]
            .into_iter()
            .map(|code| (code.to_string(), location(code)))
            .collect();
        Self {
            config: pricing_config(),
            rates,
            locations,
            promos: Vec::new(),
        }
    }

    fn ctx(&self) -> PricingContext<'_> {
        PricingContext {
            config: &self.config,
            rates: &self.rates,
            locations: &self.locations,
            promos: &self.promos,
        }
    }
}

fn promo_rule(source: &str, destination: &str, from_100: f64) -> PromoRule {
    PromoRule {
        name: "transatlantic-launch".into(),
        sources: HashSet::from([source.to_string()]),
        destinations: HashSet::from([destination.to_string()]),
        tier_prices: TierPrices {
            from_100,
            ..TierPrices::default()
        },
    }
}

#[test]
fn margin_pricing_from_allocated_cost() {
    let fixture = Fixture::new();
    let req = pricing_request(vec![primary(2000.0)], 100.0);
    let response = pricing::price_paths(&fixture.ctx(), &req).expect("priced");

    let result = &response.results[0];
    assert_eq!(result.allocated_cost, 2000.0);
    assert!(close(result.minimum_price, 2857.14));
    assert!(close(result.suggested_price, 3333.33));
    assert_eq!(result.nrc, 1000.0);
    assert!(!result.margin_enforced);
    assert!(!result.promo_pricing.used);
    assert_eq!(response.contract_term.term_months, 12);
}

#[test]
fn promo_flat_price_is_final() {
    let mut fixture = Fixture::new();
    fixture.promos.push(promo_rule("NYC4", "LON1", 4000.0));

    let mut req = pricing_request(
        vec![path(
            PathType::Primary,
            vec![{
                let mut seg = segment("NL-ULL", "NYC4", "LON1", 2000.0, "USD");
                seg.special = true;
                seg
            }],
        )],
        100.0,
    );
    req.include_ull = true;

    let response = pricing::price_paths(&fixture.ctx(), &req).expect("priced");
    let result = &response.results[0];
    // no margin, no floor, no ULL premium on top of a promo price
    assert_eq!(result.minimum_price, 4000.0);
    assert_eq!(result.suggested_price, 4000.0);
    assert!(result.promo_pricing.used);
    assert_eq!(
        result.promo_pricing.rule_name.as_deref(),
        Some("transatlantic-launch")
    );
    assert_eq!(result.promo_pricing.tier, Some(BandwidthTier::From100));
    assert!(!result.margin_enforced);
}

#[test]
fn promo_match_is_direction_sensitive() {
    let mut fixture = Fixture::new();
    fixture.promos.push(promo_rule("NYC4", "LON1", 4000.0));

    let reversed = path(
        PathType::Primary,
        vec![segment("NL-001", "LON1", "NYC4", 2000.0, "USD")],
    );
    let req = pricing_request(vec![reversed], 100.0);
    let response = pricing::price_paths(&fixture.ctx(), &req).expect("priced");
    assert!(!response.results[0].promo_pricing.used);
    assert!(close(response.results[0].minimum_price, 2857.14));
}

#[test]
fn promo_with_zero_tier_price_is_skipped() {
    let mut fixture = Fixture::new();
    fixture.promos.push(promo_rule("NYC4", "LON1", 4000.0));

    // 50M falls in the under-100 tier, which this rule does not price
    let req = pricing_request(vec![primary(2000.0)], 50.0);
    let response = pricing::price_paths(&fixture.ctx(), &req).expect("priced");
    assert!(!response.results[0].promo_pricing.used);
}

#[test]
fn protection_paths_never_use_promos() {
    let mut fixture = Fixture::new();
    fixture.promos.push(promo_rule("NYC4", "LON1", 4000.0));

    let protection = path(
        PathType::Protection,
        vec![segment("NF-001", "NYC4", "LON1", 2000.0, "USD")],
    );
    let req = pricing_request(vec![protection], 100.0);
    let response = pricing::price_paths(&fixture.ctx(), &req).expect("priced");
    assert!(!response.results[0].promo_pricing.used);
    assert!(close(response.results[0].minimum_price, 2857.14));
}

#[test]
fn location_floor_raises_minimum_and_suggested() {
    let mut fixture = Fixture::new();
    fixture
        .locations
        .get_mut("NYC4")
        .unwrap()
        .minimum_prices
        .from_100 = 5000.0;

    let req = pricing_request(vec![primary(2100.0)], 100.0);
    let response = pricing::price_paths(&fixture.ctx(), &req).expect("priced");
    let result = &response.results[0];
    // margin floor would be 3000/3500; the POP floor lifts both proportionally
    assert!(close(result.minimum_price, 5000.0));
    assert!(close(result.suggested_price, 5833.33));
    assert!(result.margin_enforced);
    assert!(result.minimum_price <= result.suggested_price);
}

#[test]
fn ull_premium_applies_to_special_segments() {
    let fixture = Fixture::new();
    let mut seg = segment("NL-ULL", "NYC4", "LON1", 2000.0, "USD");
    seg.special = true;
    let mut req = pricing_request(vec![path(PathType::Primary, vec![seg])], 100.0);
    req.include_ull = true;

    let response = pricing::price_paths(&fixture.ctx(), &req).expect("priced");
    let result = &response.results[0];
    assert!(close(result.minimum_price, 3285.71));
    assert!(close(result.suggested_price, 3833.33));
}

#[test]
fn combined_protection_price_scales_the_backup() {
    let fixture = Fixture::new();
    let protection = path(
        PathType::Protection,
        vec![segment("NF-001", "NYC4", "LON1", 1500.0, "USD")],
    );
    let mut req = pricing_request(vec![primary(2000.0), protection], 100.0);
    req.protection_required = true;

    let response = pricing::price_paths(&fixture.ctx(), &req).expect("priced");
    let combined = response.protection_pricing.expect("combined pricing");
    assert_eq!(combined.multiplier, 0.5);
    // primary 2857.14 + half of protection 2142.86
    assert!(close(combined.minimum_price, 3928.57));
    assert!(close(combined.suggested_price, 3333.33 + 2500.0 * 0.5));
    assert_eq!(combined.nrc, 2000.0);
}

#[test]
fn foreign_currency_pivots_through_usd() {
    let fixture = Fixture::new();
    let mut req = pricing_request(vec![primary(2000.0)], 100.0);
    req.currency = "EUR".into();

    let response = pricing::price_paths(&fixture.ctx(), &req).expect("priced");
    let result = &response.results[0];
    assert_eq!(result.currency, "EUR");
    assert!(close(result.minimum_price, 2571.43));
    assert!(close(result.nrc, 900.0));
}

#[test]
fn mixed_cost_currencies_are_normalized() {
    let fixture = Fixture::new();
    let route = path(
        PathType::Primary,
        vec![
            segment("NF-001", "NYC4", "FRA2", 1200.0, "USD"),
            segment("FL-001", "FRA2", "LON1", 720.0, "EUR"),
        ],
    );
    let req = pricing_request(vec![route], 100.0);
    let response = pricing::price_paths(&fixture.ctx(), &req).expect("priced");
    // 720 EUR at 0.9 per USD is 800 USD of cost
    assert!(close(response.results[0].allocated_cost, 2000.0));
}

#[test]
fn missing_exchange_rate_is_an_error() {
    let fixture = Fixture::new();
    let mut req = pricing_request(vec![primary(2000.0)], 100.0);
    req.currency = "JPY".into();

    let err = pricing::price_paths(&fixture.ctx(), &req).expect_err("no JPY rate");
    assert!(matches!(err, EngineError::MissingExchangeRate(code) if code == "JPY"));
}

#[test]
fn unsupported_contract_term_is_rejected() {
    let fixture = Fixture::new();
    let mut req = pricing_request(vec![primary(2000.0)], 100.0);
    req.contract_term = 18;

    let err = pricing::price_paths(&fixture.ctx(), &req).expect_err("18 months");
    assert!(matches!(err, EngineError::InvalidContractTerm(18)));
}

#[test]
fn empty_path_list_is_rejected() {
    let fixture = Fixture::new();
    let req = pricing_request(Vec::new(), 100.0);
    let err = pricing::price_paths(&fixture.ctx(), &req).expect_err("nothing to price");
    assert!(matches!(err, EngineError::InvalidRequest(_)));
}

#[test]
fn pricing_is_idempotent() {
    let mut fixture = Fixture::new();
    fixture
        .locations
        .get_mut("LON1")
        .unwrap()
        .minimum_prices
        .from_100 = 3100.0;
    let mut req = pricing_request(
        vec![
            primary(2000.0),
            path(
                PathType::Protection,
                vec![segment("NF-001", "NYC4", "LON1", 1500.0, "USD")],
            ),
        ],
        100.0,
    );
    req.protection_required = true;
    req.currency = "GBP".into();

    let first = pricing::price_paths(&fixture.ctx(), &req).expect("priced");
    let second = pricing::price_paths(&fixture.ctx(), &req).expect("priced");
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn minimum_never_exceeds_suggested() {
    let mut fixture = Fixture::new();
    fixture
        .locations
        .get_mut("NYC4")
        .unwrap()
        .minimum_prices
        .from_100 = 4500.0;

    for term in [12, 24, 36] {
        for cost in [10.0, 800.0, 2100.0, 9000.0] {
            let mut seg = segment("NL-001", "NYC4", "LON1", cost, "USD");
            seg.special = true;
            for include_ull in [false, true] {
                let mut req =
                    pricing_request(vec![path(PathType::Primary, vec![seg.clone()])], 100.0);
                req.contract_term = term;
                req.include_ull = include_ull;
                let response = pricing::price_paths(&fixture.ctx(), &req).expect("priced");
                let result = &response.results[0];
                assert!(
                    result.minimum_price <= result.suggested_price + EPS,
                    "term {term} cost {cost} ull {include_ull}: {} > {}",
                    result.minimum_price,
                    result.suggested_price
                );
            }
        }
    }
}

#[test]
fn currency_round_trip_preserves_amounts() {
    let fixture = Fixture::new();
    let table = CurrencyTable::new(&fixture.rates, 72);
    let usd = table.to_usd(123.45, "EUR").unwrap();
    let back = table.from_usd(usd, "EUR").unwrap();
    assert!((back - 123.45).abs() < 1e-9);
    assert_eq!(table.to_usd(50.0, "usd").unwrap(), 50.0);
}

#[test]
fn stale_exchange_rate_still_converts() {
    let mut fixture = Fixture::new();
    fixture.rates.get_mut("EUR").unwrap().updated_at =
        Some(chrono::Utc::now() - chrono::Duration::days(30));
    let table = CurrencyTable::new(&fixture.rates, 72);
    assert!(close(table.from_usd(100.0, "EUR").unwrap(), 90.0));
}

#[test]
fn pricing_config_validation_catches_bad_margins() {
    let mut cfg = pricing_config();
    assert!(cfg.validate().is_ok());

    cfg.terms.get_mut(&12).unwrap().min_margin_pct = 50.0;
    cfg.terms.get_mut(&12).unwrap().suggested_margin_pct = 40.0;
    assert!(matches!(
        cfg.validate(),
        Err(EngineError::InvalidPricingConfig(_))
    ));

    let mut cfg = pricing_config();
    cfg.terms.get_mut(&24).unwrap().nrc_usd = -1.0;
    assert!(cfg.validate().is_err());

    let mut cfg = pricing_config();
    cfg.terms.insert(
        18,
        TermPolicy {
            min_margin_pct: 10.0,
            suggested_margin_pct: 20.0,
            nrc_usd: 0.0,
        },
    );
    assert!(cfg.validate().is_err());

    let mut cfg = pricing_config();
    cfg.protection_path_multiplier = 0.0;
    assert!(cfg.validate().is_err());
}
