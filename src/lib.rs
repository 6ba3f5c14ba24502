//! ネイルサロン料金スクレイパー
//!
//! - サロンのWebサイトをヘッドレスブラウザで巡回し、ジェル・ペディキュア・
//!   アクリルの代表価格を抽出
//! - 複数サロンの一括取得（同時実行数を制限）
//! - 周辺検索結果のキャッシュとプラン別レート制限
//!
//! # 1サロンの価格取得
//!
//! ```rust,ignore
//! use salon_price_scraper::{PriceScraper, ScraperConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let scraper = PriceScraper::new(ScraperConfig::new().with_headless(true)).unwrap();
//!
//!     let result = scraper.scrape_prices("https://example-nails.com", "Example Nails").await;
//!     println!("gel={:?} confidence={:.2}", result.gel, result.confidence);
//!
//!     scraper.shutdown().await;
//! }
//! ```
//!
//! # 一括取得
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use salon_price_scraper::{BatchTarget, PriceScraper, ScraperConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let scraper = Arc::new(PriceScraper::new(ScraperConfig::new().with_concurrency(3)).unwrap());
//!
//!     let targets = vec![
//!         BatchTarget::new("Luxe Nails", "https://luxenails.example"),
//!         BatchTarget::new("Polish Bar", "https://polishbar.example"),
//!     ];
//!
//!     // 終了時にブラウザは閉じられる
//!     let results = scraper.batch_scrape(targets).await;
//!     for (name, result) in &results {
//!         println!("{}: {:?}", name, result.pedicure);
//!     }
//! }
//! ```
//!
//! # tower::Service + レート制限
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use salon_price_scraper::{
//!     MemoryRateLimitStore, PriceScraper, PriceScraperService, RateLimiter, ScrapeRequest,
//!     ScraperConfig, Tier, TierLimits,
//! };
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let scraper = Arc::new(PriceScraper::new(ScraperConfig::new()).unwrap());
//!     let limiter = Arc::new(RateLimiter::new(
//!         Arc::new(MemoryRateLimitStore::new()),
//!         TierLimits::default(),
//!     ));
//!     let mut service = PriceScraperService::new(scraper).with_rate_limiter(limiter);
//!
//!     let request = ScrapeRequest::new("Luxe Nails", "https://luxenails.example")
//!         .with_identity("user-42")
//!         .with_tier(Tier::Pro);
//!
//!     match service.call(request).await {
//!         Ok(result) => println!("{:?}", result),
//!         Err(e) => eprintln!("{}", e),
//!     }
//! }
//! ```

pub mod aggregate;
pub mod batch;
pub mod browser;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod extract;
pub mod places;
pub mod rate_limit;
pub mod scrape;
pub mod service;
pub mod traits;
pub mod types;

// 主要な型をリエクスポート
pub use aggregate::{median, PriceAggregator};
pub use batch::batch_scrape;
pub use browser::{BrowserSession, PageGuard};
pub use cache::{Cache, CacheStore, MemoryCacheStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheTtls, CategoryRule, ExplorationDepth, PriceRules, ScraperConfig, TierLimits};
pub use error::ScraperError;
pub use places::{
    Geocoder, LatLng, Place, PlaceDetails, PlaceInfo, PlacesQuery, PlacesSearch, RankedPlace,
};
pub use rate_limit::{MemoryRateLimitStore, RateDecision, RateLimitStore, RateLimiter, Tier};
pub use scrape::PriceScraper;
pub use service::{PriceScraperService, ScrapeRequest};
pub use traits::Scraper;
pub use types::{BatchTarget, ExtractionSource, ScrapeResult, ServiceCandidate, ServiceType};
