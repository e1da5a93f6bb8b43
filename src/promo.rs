use crate::types::{BandwidthTier, PromoRule};

/// First rule in creation order whose source set contains the path's
/// source AND destination set contains the path's destination (direction
/// matters), with a non-zero price for the tier. A rule matching the
/// endpoint sets but carrying a zero tier price is skipped, not an error.
pub fn match_promo<'a>(
    rules: &'a [PromoRule],
    source: &str,
    destination: &str,
    tier: BandwidthTier,
) -> Option<(&'a PromoRule, f64)> {
    rules.iter().find_map(|rule| {
        if !rule.sources.contains(source) || !rule.destinations.contains(destination) {
            return None;
        }
        let price = rule.tier_prices.for_tier(tier);
        if price > 0.0 {
            Some((rule, price))
        } else {
            None
        }
    })
}
