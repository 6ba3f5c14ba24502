//! 価格トークンとキーワードの照合

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::config::PriceRules;
use crate::types::{ExtractionSource, ServiceCandidate, ServiceType};

/// 通貨記号付きの2〜3桁の金額（セント省略可）
static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s?(\d{2,3}(?:\.\d{2})?)\b").expect("valid regex"));

/// 価格区切りの前後に残る記号
const SEGMENT_TRIM: &[char] = &[',', ';', '|', '•', '·', '-', '–', '—', ':', '/', ' '];

/// テキスト中の価格をすべて取り出す（出現順）
pub fn price_tokens(text: &str) -> Vec<(usize, usize, Decimal)> {
    PRICE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let amount = Decimal::from_str(caps.get(1)?.as_str()).ok()?;
            Some((whole.start(), whole.end(), amount))
        })
        .collect()
}

pub fn has_price(text: &str) -> bool {
    PRICE_RE.is_match(text)
}

/// 価格ごとにテキストを区切る
///
/// 先頭の価格より前に文字が無ければ「価格 → 名前」の並びとみなし、
/// 各区間を価格から次の価格の手前までとする。
/// それ以外は「名前 → 価格」の並びで、各区間は直前の価格の直後から当該価格まで。
/// 最後の区間は末尾の説明まで含める。
///
/// "Gel Manicure — $45, Fill $15" は "Gel Manicure — $45" と "Fill $15"、
/// "$45 Gel Manicure · $60 Spa Pedicure" は "$45 Gel Manicure" と "$60 Spa Pedicure" になる。
pub fn price_segments(text: &str) -> Vec<(String, Decimal)> {
    let tokens = price_tokens(text);
    let Some(&(first_start, _, _)) = tokens.first() else {
        return Vec::new();
    };
    let price_first = !text[..first_start].chars().any(char::is_alphanumeric);

    let mut segments = Vec::with_capacity(tokens.len());
    for (i, &(start, end, price)) in tokens.iter().enumerate() {
        let next_start = tokens.get(i + 1).map(|t| t.0);
        let (from, to) = if price_first {
            (start, next_start.unwrap_or(text.len()))
        } else {
            let from = if i == 0 { 0 } else { tokens[i - 1].1 };
            (from, if next_start.is_some() { end } else { text.len() })
        };
        segments.push((text[from..to].trim_matches(SEGMENT_TRIM).to_string(), price));
    }
    segments
}

/// 空白を1つにまとめる
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 語境界つきのキーワード照合（大文字小文字を無視）
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    regex: Option<Regex>,
}

impl KeywordMatcher {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        let mut words: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if words.is_empty() {
            return Self { regex: None };
        }
        // 長い語を優先
        words.sort_by_key(|w| std::cmp::Reverse(w.len()));
        let alternation = words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        let regex = Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).ok();
        Self { regex }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(text))
    }
}

/// コンパイル済みの判定ルール
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub rules: PriceRules,
    service: KeywordMatcher,
    exclusion: KeywordMatcher,
    gel: KeywordMatcher,
    pedicure: KeywordMatcher,
    acrylic: KeywordMatcher,
}

impl CompiledRules {
    pub fn new(rules: &PriceRules) -> Self {
        Self {
            service: KeywordMatcher::new(&rules.service_keywords),
            exclusion: KeywordMatcher::new(&rules.exclusion_keywords),
            gel: KeywordMatcher::new(&rules.gel.keywords),
            pedicure: KeywordMatcher::new(&rules.pedicure.keywords),
            acrylic: KeywordMatcher::new(&rules.acrylic.keywords),
            rules: rules.clone(),
        }
    }

    pub fn has_service_keyword(&self, text: &str) -> bool {
        self.service.is_match(text)
    }

    pub fn is_excluded(&self, text: &str) -> bool {
        self.exclusion.is_match(text)
    }

    pub fn matches_category(&self, service_type: ServiceType, text: &str) -> bool {
        match service_type {
            ServiceType::Gel => self.gel.is_match(text),
            ServiceType::Pedicure => self.pedicure.is_match(text),
            ServiceType::Acrylic => self.acrylic.is_match(text),
            ServiceType::Other => false,
        }
    }

    pub fn has_category_keyword(&self, text: &str) -> bool {
        ServiceType::CATEGORIES
            .iter()
            .any(|t| self.matches_category(*t, text))
    }

    /// テキストからサービス種別を推定
    ///
    /// "Gel Pedicure" のように複数該当する場合は pedicure > acrylic > gel の順。
    pub fn classify(&self, text: &str) -> ServiceType {
        [ServiceType::Pedicure, ServiceType::Acrylic, ServiceType::Gel]
            .into_iter()
            .find(|t| self.matches_category(*t, text))
            .unwrap_or(ServiceType::Other)
    }

    /// 1つのテキストから価格ごとに候補を作る
    ///
    /// 区間に種別語が無ければテキスト全体から推定する。
    pub fn candidates_from_text(
        &self,
        text: &str,
        source: ExtractionSource,
    ) -> Vec<ServiceCandidate> {
        let context_type = self.classify(text);
        price_segments(text)
            .into_iter()
            .map(|(segment, price)| {
                let service_type = match self.classify(&segment) {
                    ServiceType::Other => context_type,
                    t => t,
                };
                ServiceCandidate::new(segment, service_type, price, source)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> CompiledRules {
        CompiledRules::new(&PriceRules::default())
    }

    #[test]
    fn test_price_tokens() {
        let prices: Vec<Decimal> = price_tokens("Gel $45, Pedicure $ 38.50, Deluxe $120")
            .into_iter()
            .map(|(_, _, p)| p)
            .collect();
        assert_eq!(
            prices,
            vec![Decimal::from(45), Decimal::new(3850, 2), Decimal::from(120)]
        );
    }

    #[test]
    fn test_price_tokens_reject_out_of_width() {
        assert!(price_tokens("Nails $5").is_empty());
        assert!(price_tokens("Package $1200").is_empty());
        assert!(price_tokens("Call 555-1234").is_empty());
    }

    #[test]
    fn test_price_segments_split_at_each_price() {
        let segments = price_segments("Gel Manicure — $45, Fill $15");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], ("Gel Manicure — $45".to_string(), Decimal::from(45)));
        assert_eq!(segments[1], ("Fill $15".to_string(), Decimal::from(15)));
    }

    #[test]
    fn test_price_segments_keep_trailing_text() {
        let segments = price_segments("Acrylic $40 refill");
        assert_eq!(segments, vec![("Acrylic $40 refill".to_string(), Decimal::from(40))]);

        let segments = price_segments("Gel $45, Acrylic Full Set $60 (fills extra)");
        assert_eq!(segments[0].0, "Gel $45");
        assert_eq!(segments[1].0, "Acrylic Full Set $60 (fills extra)");
    }

    #[test]
    fn test_price_segments_price_first_layout() {
        let segments = price_segments("$45 Gel Manicure · $60 Spa Pedicure");
        assert_eq!(
            segments,
            vec![
                ("$45 Gel Manicure".to_string(), Decimal::from(45)),
                ("$60 Spa Pedicure".to_string(), Decimal::from(60)),
            ]
        );
        assert!(price_segments("no prices here").is_empty());
    }

    #[test]
    fn test_keyword_matcher_word_boundaries() {
        let m = KeywordMatcher::new(&["gel", "per nail"]);
        assert!(m.is_match("GEL Manicure"));
        assert!(m.is_match("$5 per nail"));
        assert!(!m.is_match("Angel Spa"));
        assert!(!KeywordMatcher::new::<&str>(&[]).is_match("anything"));
    }

    #[test]
    fn test_classify_priority() {
        let r = rules();
        assert_eq!(r.classify("Gel Pedicure"), ServiceType::Pedicure);
        assert_eq!(r.classify("Acrylic full set with gel"), ServiceType::Acrylic);
        assert_eq!(r.classify("Shellac manicure"), ServiceType::Gel);
        assert_eq!(r.classify("Classic manicure"), ServiceType::Other);
    }

    #[test]
    fn test_candidates_inherit_context_type() {
        let r = rules();
        let candidates =
            r.candidates_from_text("Gel Manicure — $45, Fill $15", ExtractionSource::Rendered);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].service_type, ServiceType::Gel);
        assert_eq!(candidates[0].price, Decimal::from(45));
        assert_eq!(candidates[1].service_type, ServiceType::Gel);
        assert!(r.is_excluded(&candidates[1].text));
        assert!(!r.is_excluded(&candidates[0].text));
    }

    #[test]
    fn test_price_first_candidates_credit_following_name() {
        let r = rules();
        let candidates =
            r.candidates_from_text("$45 Gel Manicure · $60 Spa Pedicure", ExtractionSource::Rendered);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].service_type, ServiceType::Gel);
        assert_eq!(candidates[0].price, Decimal::from(45));
        assert_eq!(candidates[1].service_type, ServiceType::Pedicure);
        assert_eq!(candidates[1].price, Decimal::from(60));
    }

    #[test]
    fn test_trailing_exclusion_stays_on_candidate() {
        let r = rules();
        let candidates = r.candidates_from_text("Acrylic $40 refill", ExtractionSource::Rendered);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].service_type, ServiceType::Acrylic);
        assert!(r.is_excluded(&candidates[0].text));
    }

    #[test]
    fn test_exclusion_keywords() {
        let r = rules();
        assert!(r.is_excluded("Acrylic Refill $35"));
        assert!(r.is_excluded("Gel removal $10"));
        assert!(r.is_excluded("Add-on: paraffin $15"));
        assert!(!r.is_excluded("Acrylic Full Set $55"));
    }
}
