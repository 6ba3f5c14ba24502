//! 料金抽出関連の型定義

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// サービス種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Gel,
    Pedicure,
    Acrylic,
    Other,
}

impl ServiceType {
    /// 集計対象のカテゴリ（Other を除く）
    pub const CATEGORIES: [ServiceType; 3] =
        [ServiceType::Gel, ServiceType::Pedicure, ServiceType::Acrylic];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Gel => "gel",
            ServiceType::Pedicure => "pedicure",
            ServiceType::Acrylic => "acrylic",
            ServiceType::Other => "other",
        }
    }
}

/// 候補を生成した抽出戦略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    Rendered,
    Structural,
    Raw,
}

impl ExtractionSource {
    /// 戦略ごとの固定信頼度
    pub fn confidence_weight(&self) -> f64 {
        match self {
            ExtractionSource::Rendered => 0.8,
            ExtractionSource::Structural => 0.7,
            ExtractionSource::Raw => 0.6,
        }
    }
}

/// 抽出候補（サービス名・価格・種別）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCandidate {
    pub text: String,
    pub service_type: ServiceType,
    pub price: Decimal,
    pub confidence_hint: f64,
    pub extraction_source: ExtractionSource,
}

impl ServiceCandidate {
    pub fn new(
        text: impl Into<String>,
        service_type: ServiceType,
        price: Decimal,
        source: ExtractionSource,
    ) -> Self {
        Self {
            text: text.into(),
            service_type,
            price,
            confidence_hint: source.confidence_weight(),
            extraction_source: source,
        }
    }
}

/// 1店舗分のスクレイプ結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub gel: Option<Decimal>,
    pub pedicure: Option<Decimal>,
    pub acrylic: Option<Decimal>,
    pub success: bool,
    pub confidence: f64,
    pub source_url: String,
    pub candidates: Vec<ServiceCandidate>,
}

impl ScrapeResult {
    /// 信頼度0の失敗結果
    pub fn empty(source_url: impl Into<String>) -> Self {
        Self {
            gel: None,
            pedicure: None,
            acrylic: None,
            success: false,
            confidence: 0.0,
            source_url: source_url.into(),
            candidates: Vec::new(),
        }
    }

    pub fn price_for(&self, service_type: ServiceType) -> Option<Decimal> {
        match service_type {
            ServiceType::Gel => self.gel,
            ServiceType::Pedicure => self.pedicure,
            ServiceType::Acrylic => self.acrylic,
            ServiceType::Other => None,
        }
    }
}

/// バッチ対象（店舗名 + URL）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTarget {
    pub name: String,
    pub url: String,
}

impl BatchTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}
