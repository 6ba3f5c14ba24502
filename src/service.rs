use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tracing::{info, warn};

use crate::error::ScraperError;
use crate::rate_limit::{RateLimiter, Tier};
use crate::traits::Scraper;
use crate::types::ScrapeResult;

/// 価格取得リクエスト
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub name: String,
    pub url: String,
    /// 未指定ならレート制限をかけない
    pub identity: Option<String>,
    pub tier: Tier,
}

impl ScrapeRequest {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            identity: None,
            tier: Tier::Free,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }
}

/// tower::Serviceを実装した価格取得サービス
#[derive(Clone)]
pub struct PriceScraperService {
    scraper: Arc<dyn Scraper>,
    limiter: Option<Arc<RateLimiter>>,
}

impl PriceScraperService {
    pub fn new(scraper: Arc<dyn Scraper>) -> Self {
        Self {
            scraper,
            limiter: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }
}

impl Service<ScrapeRequest> for PriceScraperService {
    type Response = ScrapeResult;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ScrapeRequest) -> Self::Future {
        info!("価格取得リクエスト受信: name={}, url={}", req.name, req.url);
        let scraper = self.scraper.clone();
        let limiter = self.limiter.clone();

        Box::pin(async move {
            if let (Some(limiter), Some(identity)) = (limiter, req.identity.as_deref()) {
                let decision = limiter.check_and_consume(identity, req.tier).await;
                if !decision.allowed {
                    warn!(
                        identity,
                        limit = decision.limit,
                        reset_at = %decision.reset_at,
                        "Request denied by rate limiter"
                    );
                    return Err(ScraperError::RateLimited {
                        limit: decision.limit,
                        reset_at: decision.reset_at,
                    });
                }
            }

            let result = scraper.scrape_prices(&req.url, &req.name).await;

            info!(
                "価格取得完了: name={}, confidence={:.2}",
                req.name, result.confidence
            );
            Ok(result)
        })
    }
}
