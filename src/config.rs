use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ScraperError;
use crate::types::ServiceType;

/// サイト探索の積極度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplorationDepth {
    /// 2カテゴリ見つかれば打ち切り
    #[default]
    Quick,
    /// 3カテゴリすべて見つかるまでパスを巡回
    Thorough,
}

impl ExplorationDepth {
    /// 探索を打ち切るカテゴリ数
    pub fn min_services(&self) -> usize {
        match self {
            ExplorationDepth::Quick => 2,
            ExplorationDepth::Thorough => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub headless: bool,
    pub debug: bool,
    /// 未指定なら CHROME_PATH / CHROMIUM_PATH を参照
    pub chrome_executable: Option<PathBuf>,
    pub concurrency: usize,
    pub max_nav_attempts: u32,
    pub depth: ExplorationDepth,
    pub settle_delay: Duration,
    pub social_settle_delay: Duration,
    pub expansion_settle_delay: Duration,
    pub max_followed_links: usize,
    pub rules: PriceRules,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            headless: true,
            debug: false,
            chrome_executable: None,
            concurrency: 3,
            max_nav_attempts: 3,
            depth: ExplorationDepth::Quick,
            settle_delay: Duration::from_secs(2),
            social_settle_delay: Duration::from_secs(5),
            expansion_settle_delay: Duration::from_millis(1500),
            max_followed_links: 5,
            rules: PriceRules::default(),
        }
    }
}

impl ScraperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_executable = Some(path.into());
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_nav_attempts(mut self, attempts: u32) -> Self {
        self.max_nav_attempts = attempts.max(1);
        self
    }

    pub fn with_depth(mut self, depth: ExplorationDepth) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_rules(mut self, rules: PriceRules) -> Self {
        self.rules = rules;
        self
    }

    /// Chrome 実行ファイルのパスを解決
    pub fn resolve_chrome_executable(&self) -> Option<PathBuf> {
        self.chrome_executable.clone().or_else(|| {
            std::env::var("CHROME_PATH")
                .or_else(|_| std::env::var("CHROMIUM_PATH"))
                .ok()
                .map(PathBuf::from)
        })
    }
}

/// カテゴリごとの妥当価格帯とキーワード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub keywords: Vec<String>,
    pub min_price: Decimal,
    pub max_price: Decimal,
}

impl CategoryRule {
    fn new(keywords: &[&str], min_price: i64, max_price: i64) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            min_price: Decimal::from(min_price),
            max_price: Decimal::from(max_price),
        }
    }

    /// 両端を含む
    pub fn in_range(&self, price: Decimal) -> bool {
        price >= self.min_price && price <= self.max_price
    }
}

/// 価格判定ルール（外部から差し替え可能）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceRules {
    /// いずれかを含むテキストのみ候補とする
    pub service_keywords: Vec<String>,
    /// 付帯サービス（除去・補修・リフィル等）を示す語
    pub exclusion_keywords: Vec<String>,
    pub gel: CategoryRule,
    pub pedicure: CategoryRule,
    pub acrylic: CategoryRule,
}

impl Default for PriceRules {
    fn default() -> Self {
        Self {
            service_keywords: ["gel", "pedicure", "acrylic", "manicure", "nails"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            exclusion_keywords: [
                "removal",
                "remove",
                "soak off",
                "soak-off",
                "repair",
                "refill",
                "fill",
                "fills",
                "fill-in",
                "add-on",
                "add on",
                "addon",
                "per nail",
                "per-nail",
                "each nail",
                "nail art",
                "design",
                "french tip",
                "polish change",
                "kids",
                "child",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
            gel: CategoryRule::new(
                &["gel manicure", "gel polish", "gel color", "gel nails", "shellac", "gel"],
                20,
                90,
            ),
            pedicure: CategoryRule::new(
                &["spa pedicure", "deluxe pedicure", "classic pedicure", "pedicure", "pedi"],
                25,
                140,
            ),
            acrylic: CategoryRule::new(
                &["acrylic full set", "acrylic nails", "full set", "acrylics", "acrylic"],
                35,
                200,
            ),
        }
    }
}

impl PriceRules {
    /// JSON からルールを読み込む（省略したフィールドはデフォルト値）
    pub fn from_json_str(json: &str) -> Result<Self, ScraperError> {
        let rules: PriceRules = serde_json::from_str(json)?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn category(&self, service_type: ServiceType) -> Option<&CategoryRule> {
        match service_type {
            ServiceType::Gel => Some(&self.gel),
            ServiceType::Pedicure => Some(&self.pedicure),
            ServiceType::Acrylic => Some(&self.acrylic),
            ServiceType::Other => None,
        }
    }

    pub fn validate(&self) -> Result<(), ScraperError> {
        if self.service_keywords.is_empty() {
            return Err(ScraperError::Config("service_keywords is empty".into()));
        }
        for service_type in ServiceType::CATEGORIES {
            if let Some(rule) = self.category(service_type) {
                if rule.min_price > rule.max_price {
                    return Err(ScraperError::Config(format!(
                        "{}: min_price {} exceeds max_price {}",
                        service_type.as_str(),
                        rule.min_price,
                        rule.max_price
                    )));
                }
                if rule.keywords.is_empty() {
                    return Err(ScraperError::Config(format!(
                        "{}: keywords is empty",
                        service_type.as_str()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// プラン別の1時間あたりリクエスト上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierLimits {
    pub free: u64,
    pub pro: u64,
    pub enterprise: u64,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            free: 10,
            pro: 100,
            enterprise: 1000,
        }
    }
}

/// データ種別ごとのキャッシュTTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub geocode: Duration,
    pub places: Duration,
    pub place_details: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            geocode: Duration::from_secs(7 * 24 * 3600),
            places: Duration::from_secs(24 * 3600),
            place_details: Duration::from_secs(12 * 3600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ScraperConfig::new()
            .with_headless(false)
            .with_concurrency(0)
            .with_max_nav_attempts(5)
            .with_depth(ExplorationDepth::Thorough)
            .with_chrome_executable("/usr/bin/chromium");

        assert!(!config.headless);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.max_nav_attempts, 5);
        assert_eq!(config.depth.min_services(), 3);
        assert_eq!(
            config.resolve_chrome_executable(),
            Some(PathBuf::from("/usr/bin/chromium"))
        );
    }

    #[test]
    fn test_default_ranges() {
        let rules = PriceRules::default();
        assert!(rules.gel.in_range(Decimal::from(20)));
        assert!(rules.gel.in_range(Decimal::from(90)));
        assert!(!rules.gel.in_range(Decimal::from(91)));
        assert!(!rules.pedicure.in_range(Decimal::from(24)));
        assert!(rules.acrylic.in_range(Decimal::from(200)));
        assert!(rules.validate().is_ok());
    }

    #[test]
    fn test_rules_from_partial_json() {
        let json = r#"{ "gel": { "keywords": ["gel"], "min_price": "15", "max_price": 60 } }"#;
        let rules = PriceRules::from_json_str(json).unwrap();
        assert_eq!(rules.gel.min_price, Decimal::from(15));
        assert_eq!(rules.gel.max_price, Decimal::from(60));
        assert_eq!(rules.pedicure, PriceRules::default().pedicure);
    }

    #[test]
    fn test_rules_reject_inverted_range() {
        let json = r#"{ "acrylic": { "keywords": ["acrylic"], "min_price": 200, "max_price": 35 } }"#;
        let err = PriceRules::from_json_str(json).unwrap_err();
        assert!(matches!(err, ScraperError::Config(_)));
    }

    #[test]
    fn test_default_tier_limits_are_ordered() {
        let limits = TierLimits::default();
        assert!(limits.free < limits.pro);
        assert!(limits.pro < limits.enterprise);
    }
}
