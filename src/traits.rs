use async_trait::async_trait;

use crate::types::ScrapeResult;

#[async_trait]
pub trait Scraper: Send + Sync {
    /// 1サロンの価格を取得（失敗は信頼度0の結果として返す）
    async fn scrape_prices(&self, url: &str, name: &str) -> ScrapeResult;

    /// 共有リソース解放
    async fn shutdown(&self);
}
