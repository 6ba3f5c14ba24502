//! 3種類の抽出戦略

use scraper::{Html, Selector};
use tracing::debug;

use super::patterns::{has_price, normalize_whitespace, CompiledRules};
use super::snapshot::PageSnapshot;
use crate::types::{ExtractionSource, ServiceCandidate};

/// 要素テキストの長さ範囲（描画・構造戦略）
const ELEMENT_TEXT_MIN: usize = 5;
const ELEMENT_TEXT_MAX: usize = 300;

/// 行の長さ範囲（テキスト戦略）
const LINE_MIN: usize = 10;
const LINE_MAX: usize = 200;

/// 料金表が入っていそうなコンテナ
const STRUCTURAL_SELECTORS: &[&str] = &[
    "tr",
    "li",
    "[class*='service']",
    "[class*='price']",
    "[class*='menu']",
    "[class*='item']",
];

/// 抽出戦略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// 描画済みDOMの要素テキスト
    Rendered,
    /// HTMLパーサー + セレクタ
    Structural,
    /// 本文テキストの行単位
    Raw,
}

impl Strategy {
    /// 実行順
    pub const ORDERED: [Strategy; 3] = [Strategy::Rendered, Strategy::Structural, Strategy::Raw];

    pub fn source(&self) -> ExtractionSource {
        match self {
            Strategy::Rendered => ExtractionSource::Rendered,
            Strategy::Structural => ExtractionSource::Structural,
            Strategy::Raw => ExtractionSource::Raw,
        }
    }

    /// 既存の候補数を見て実行するか決める
    ///
    /// テキスト戦略は先行戦略の候補が3件未満のときだけ動かす。
    pub fn should_run(&self, candidates_so_far: usize) -> bool {
        match self {
            Strategy::Raw => candidates_so_far < 3,
            _ => true,
        }
    }

    pub fn propose(&self, snapshot: &PageSnapshot, rules: &CompiledRules) -> Vec<ServiceCandidate> {
        let candidates = match self {
            Strategy::Rendered => rendered(snapshot, rules),
            Strategy::Structural => structural(snapshot, rules),
            Strategy::Raw => raw(snapshot, rules),
        };
        debug!(
            strategy = ?self,
            url = %snapshot.url,
            count = candidates.len(),
            "Strategy proposed candidates"
        );
        candidates
    }
}

fn element_text_qualifies(text: &str, rules: &CompiledRules) -> bool {
    let len = text.chars().count();
    (ELEMENT_TEXT_MIN..=ELEMENT_TEXT_MAX).contains(&len)
        && has_price(text)
        && rules.has_service_keyword(text)
}

fn rendered(snapshot: &PageSnapshot, rules: &CompiledRules) -> Vec<ServiceCandidate> {
    snapshot
        .rendered_texts
        .iter()
        .map(|t| normalize_whitespace(t))
        .filter(|t| element_text_qualifies(t, rules))
        .flat_map(|t| rules.candidates_from_text(&t, ExtractionSource::Rendered))
        .collect()
}

fn structural(snapshot: &PageSnapshot, rules: &CompiledRules) -> Vec<ServiceCandidate> {
    if snapshot.html.is_empty() {
        return Vec::new();
    }
    let document = Html::parse_document(&snapshot.html);
    let mut out = Vec::new();
    for raw_selector in STRUCTURAL_SELECTORS {
        let Ok(selector) = Selector::parse(raw_selector) else {
            continue;
        };
        for element in document.select(&selector) {
            let text = normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "));
            if element_text_qualifies(&text, rules) {
                out.extend(rules.candidates_from_text(&text, ExtractionSource::Structural));
            }
        }
    }
    out
}

fn raw(snapshot: &PageSnapshot, rules: &CompiledRules) -> Vec<ServiceCandidate> {
    snapshot
        .body_text
        .lines()
        .map(normalize_whitespace)
        .filter(|line| {
            let len = line.chars().count();
            (LINE_MIN..=LINE_MAX).contains(&len)
                && rules.has_category_keyword(line)
                && has_price(line)
        })
        .flat_map(|line| rules.candidates_from_text(&line, ExtractionSource::Raw))
        .collect()
}
