//! 候補価格の集計
//!
//! 付帯サービスを除外し、カテゴリごとに妥当な価格帯の候補だけを残して
//! 中央値を代表価格とする。

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use crate::extract::CompiledRules;
use crate::types::{ScrapeResult, ServiceCandidate, ServiceType};

pub struct PriceAggregator {
    rules: CompiledRules,
}

impl PriceAggregator {
    pub fn new(rules: CompiledRules) -> Self {
        Self { rules }
    }

    /// カテゴリごとの採用価格（除外語・価格帯フィルタ後）
    pub fn accepted(&self, candidates: &[ServiceCandidate]) -> BTreeMap<ServiceType, Vec<Decimal>> {
        let mut buckets: BTreeMap<ServiceType, Vec<Decimal>> = BTreeMap::new();

        for candidate in candidates {
            if self.rules.is_excluded(&candidate.text) {
                debug!(text = %candidate.text, "Excluded ancillary service");
                continue;
            }
            for category in ServiceType::CATEGORIES {
                let belongs = candidate.service_type == category
                    || self.rules.matches_category(category, &candidate.text);
                if !belongs {
                    continue;
                }
                let Some(rule) = self.rules.rules.category(category) else {
                    continue;
                };
                if rule.in_range(candidate.price) {
                    buckets.entry(category).or_default().push(candidate.price);
                }
            }
        }
        buckets
    }

    /// 候補から結果を組み立てる
    pub fn aggregate(&self, source_url: &str, candidates: Vec<ServiceCandidate>) -> ScrapeResult {
        let buckets = self.accepted(&candidates);
        let price = |t: ServiceType| buckets.get(&t).and_then(|prices| median(prices));

        let gel = price(ServiceType::Gel);
        let pedicure = price(ServiceType::Pedicure);
        let acrylic = price(ServiceType::Acrylic);

        let found = [gel, pedicure, acrylic].iter().filter(|p| p.is_some()).count();
        let confidence = found as f64 / ServiceType::CATEGORIES.len() as f64;

        ScrapeResult {
            gel,
            pedicure,
            acrylic,
            success: confidence > 0.0,
            confidence,
            source_url: source_url.to_string(),
            candidates,
        }
    }
}

/// 中央値（整数に四捨五入）。空なら None
pub fn median(prices: &[Decimal]) -> Option<Decimal> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    let value = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / Decimal::TWO
    } else {
        sorted[mid]
    };
    Some(value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
}
