//! 料金抽出パイプライン
//!
//! 描画DOM → 構造解析 → 本文テキストの順に戦略を適用し、
//! (種別, 価格) で重複を除いた候補を返す。

mod explore;
mod patterns;
mod snapshot;
mod strategy;

use std::collections::HashSet;

use rust_decimal::Decimal;
use tracing::debug;

pub use explore::{
    candidate_urls, discover_service_links, flip_scheme, is_excluded_url, is_scrapable_url,
    is_social_url, EXPLORATION_PATHS,
};
pub use patterns::{price_segments, price_tokens, CompiledRules, KeywordMatcher};
pub use snapshot::{DiscoveredLink, PageSnapshot};
pub use strategy::Strategy;

use crate::types::{ServiceCandidate, ServiceType};

/// (種別, 価格) で重複を除く候補集合
///
/// 除外キーワードを含む候補は重複判定に参加せず、別枠で保持する。
#[derive(Debug, Default)]
pub struct CandidateSet {
    seen: HashSet<(ServiceType, Decimal)>,
    candidates: Vec<ServiceCandidate>,
    excluded: Vec<ServiceCandidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新規なら追加して true
    pub fn insert(&mut self, candidate: ServiceCandidate) -> bool {
        // 45 と 45.00 を同一視
        let key = (candidate.service_type, candidate.price.normalize());
        if self.seen.insert(key) {
            self.candidates.push(candidate);
            true
        } else {
            false
        }
    }

    pub fn extend(&mut self, candidates: impl IntoIterator<Item = ServiceCandidate>) -> usize {
        let mut added = 0;
        for candidate in candidates {
            if self.insert(candidate) {
                added += 1;
            }
        }
        added
    }

    /// 除外候補を振り分けて追加し、集計対象として新規に入った数を返す
    pub fn admit(
        &mut self,
        candidates: impl IntoIterator<Item = ServiceCandidate>,
        rules: &CompiledRules,
    ) -> usize {
        let mut added = 0;
        for candidate in candidates {
            if rules.is_excluded(&candidate.text) {
                self.excluded.push(candidate);
            } else if self.insert(candidate) {
                added += 1;
            }
        }
        added
    }

    /// 集計対象の候補数（除外候補を含まない）
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// 候補に含まれる集計カテゴリ数
    pub fn distinct_services(&self) -> usize {
        self.candidates
            .iter()
            .map(|c| c.service_type)
            .filter(|t| *t != ServiceType::Other)
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn as_slice(&self) -> &[ServiceCandidate] {
        &self.candidates
    }

    pub fn excluded(&self) -> &[ServiceCandidate] {
        &self.excluded
    }

    /// 集計対象の候補、続いて除外候補
    pub fn into_vec(self) -> Vec<ServiceCandidate> {
        let mut all = self.candidates;
        all.extend(self.excluded);
        all
    }
}

/// 1ページ分の候補を全戦略で抽出して `set` に追加する
pub fn extract_into(set: &mut CandidateSet, snapshot: &PageSnapshot, rules: &CompiledRules) {
    // テキスト戦略の発動判定はこのページで見つかった件数で行う
    let mut found_on_page = 0;
    for strategy in Strategy::ORDERED {
        if !strategy.should_run(found_on_page) {
            continue;
        }
        let added = set.admit(strategy.propose(snapshot, rules), rules);
        found_on_page += added;
    }
    debug!(
        url = %snapshot.url,
        added = found_on_page,
        total = set.len(),
        "Extraction pass complete"
    );
}

/// 1ページ分の候補を抽出
pub fn extract_candidates(snapshot: &PageSnapshot, rules: &CompiledRules) -> Vec<ServiceCandidate> {
    let mut set = CandidateSet::new();
    extract_into(&mut set, snapshot, rules);
    set.into_vec()
}
