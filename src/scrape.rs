//! サロンサイトの巡回と価格抽出
//!
//! 1サロンにつき1ページを使い、トップ → 候補パス → 関連リンクの順に巡回する。
//! 必要なカテゴリ数が揃った時点で打ち切る。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::aggregate::PriceAggregator;
use crate::batch;
use crate::browser::{expand_content, navigate, BrowserSession};
use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::extract::{
    candidate_urls, discover_service_links, extract_into, is_scrapable_url, is_social_url,
    CandidateSet, CompiledRules, PageSnapshot,
};
use crate::traits::Scraper;
use crate::types::{BatchTarget, ScrapeResult};

/// 候補パス（トップ以外）の遷移試行回数
const SUBPAGE_NAV_ATTEMPTS: u32 = 1;

pub struct PriceScraper {
    config: ScraperConfig,
    session: BrowserSession,
    rules: CompiledRules,
    aggregator: PriceAggregator,
}

impl PriceScraper {
    /// 価格ルールを検証して生成（ブラウザは最初のスクレイプ時に起動）
    pub fn new(config: ScraperConfig) -> Result<Self, ScraperError> {
        config.rules.validate()?;
        let rules = CompiledRules::new(&config.rules);
        Ok(Self {
            session: BrowserSession::new(config.clone()),
            aggregator: PriceAggregator::new(rules.clone()),
            rules,
            config,
        })
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// 1サロンの価格を取得
    pub async fn scrape_prices(&self, url: &str, name: &str) -> ScrapeResult {
        let url = url.trim();
        if !is_scrapable_url(url) {
            info!(name, url, "Skipping unscrapable URL");
            return ScrapeResult::empty(url);
        }

        info!(name, url, "Scraping salon prices...");
        let candidates = match self.collect(url, name).await {
            Ok(set) => set,
            Err(e) => {
                warn!(name, url, error = %e, "Scrape failed");
                CandidateSet::new()
            }
        };

        let result = self.aggregator.aggregate(url, candidates.into_vec());
        info!(
            name,
            url,
            gel = ?result.gel,
            pedicure = ?result.pedicure,
            acrylic = ?result.acrylic,
            confidence = result.confidence,
            candidates = result.candidates.len(),
            "Scrape complete"
        );
        result
    }

    /// 複数サロンをチャンク単位で並行取得し、最後にブラウザを閉じる
    pub async fn batch_scrape(
        self: &Arc<Self>,
        targets: Vec<BatchTarget>,
    ) -> HashMap<String, ScrapeResult> {
        batch::batch_scrape(self.clone(), targets, self.config.concurrency).await
    }

    pub async fn shutdown(&self) {
        self.session.release().await;
    }

    async fn collect(&self, url: &str, name: &str) -> Result<CandidateSet, ScraperError> {
        let page = self.session.new_page().await?;
        let set = self.explore(&page, url, name).await;
        page.close().await;
        Ok(set)
    }

    async fn explore(&self, page: &Page, url: &str, name: &str) -> CandidateSet {
        let mut set = CandidateSet::new();

        // SNSはトップのみ、長めに待つ
        if is_social_url(url) {
            self.visit(
                page,
                url,
                self.config.max_nav_attempts,
                self.config.social_settle_delay,
                &mut set,
            )
            .await;
            return set;
        }

        let min_services = self.config.depth.min_services();
        let targets = candidate_urls(url, self.config.depth);
        let mut home_links = Vec::new();

        for (index, target) in targets.iter().enumerate() {
            let attempts = if index == 0 {
                self.config.max_nav_attempts
            } else {
                SUBPAGE_NAV_ATTEMPTS
            };
            let Some(snapshot) = self
                .visit(page, target, attempts, self.config.settle_delay, &mut set)
                .await
            else {
                if index == 0 {
                    warn!(name, url, "Home page unreachable, giving up on site");
                    return set;
                }
                continue;
            };
            if index == 0 {
                home_links = snapshot.links;
            }
            if set.distinct_services() >= min_services {
                debug!(name, url = %target, "Enough services found, stopping exploration");
                return set;
            }
        }

        let links = discover_service_links(
            &home_links,
            url,
            &targets,
            self.config.max_followed_links,
        );
        if !links.is_empty() {
            info!(name, count = links.len(), "Following service links from home page");
        }
        for link in links {
            self.visit(
                page,
                &link,
                SUBPAGE_NAV_ATTEMPTS,
                self.config.settle_delay,
                &mut set,
            )
            .await;
            if set.distinct_services() >= min_services {
                break;
            }
        }
        set
    }

    /// 1URLを開いて候補を追加する。開けなかった場合は None
    async fn visit(
        &self,
        page: &Page,
        url: &str,
        attempts: u32,
        settle: Duration,
        set: &mut CandidateSet,
    ) -> Option<PageSnapshot> {
        if !navigate(page, url, attempts).await {
            return None;
        }
        sleep(settle).await;
        expand_content(page, self.config.expansion_settle_delay).await;

        // スキーム切り替え後のURLを優先
        let current_url = match page.url().await {
            Ok(Some(current)) => current,
            _ => url.to_string(),
        };

        let snapshot = match PageSnapshot::capture(page, &current_url).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(url = %current_url, error = %e, "Failed to capture page");
                return None;
            }
        };

        let before = set.len();
        extract_into(set, &snapshot, &self.rules);

        if self.config.debug && set.len() == before {
            self.debug_screenshot(page, &current_url).await;
        }
        Some(snapshot)
    }

    async fn debug_screenshot(&self, page: &Page, url: &str) {
        match page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            Ok(screenshot) => {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(&screenshot);
                debug!(url, "No candidates, screenshot: data:image/png;base64,{}", encoded);
            }
            Err(e) => debug!(url, "Screenshot failed: {}", e),
        }
    }
}

#[async_trait]
impl Scraper for PriceScraper {
    async fn scrape_prices(&self, url: &str, name: &str) -> ScrapeResult {
        PriceScraper::scrape_prices(self, url, name).await
    }

    async fn shutdown(&self) {
        PriceScraper::shutdown(self).await
    }
}
