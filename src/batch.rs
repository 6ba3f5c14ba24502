//! 複数サロンの一括スクレイプ

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::traits::Scraper;
use crate::types::{BatchTarget, ScrapeResult};

/// `concurrency` 件ずつ並行に取得し、サロン名 → 結果 のマップを返す
///
/// 1件の失敗（パニック含む）は信頼度0の結果になり、他には影響しない。
/// 全件終了後に `shutdown` を1回だけ呼ぶ。同名のターゲットは後勝ち。
pub async fn batch_scrape<S>(
    scraper: Arc<S>,
    targets: Vec<BatchTarget>,
    concurrency: usize,
) -> HashMap<String, ScrapeResult>
where
    S: Scraper + ?Sized + 'static,
{
    let chunk_size = concurrency.max(1);
    let total = targets.len();
    let mut queue: VecDeque<BatchTarget> = targets.into();
    let mut results = HashMap::with_capacity(total);

    info!(total, concurrency = chunk_size, "Starting batch scrape");

    while !queue.is_empty() {
        let take = chunk_size.min(queue.len());
        let chunk: Vec<BatchTarget> = queue.drain(..take).collect();

        let handles = chunk.into_iter().map(|target| {
            let scraper = scraper.clone();
            let task = tokio::spawn({
                let target = target.clone();
                async move { scraper.scrape_prices(&target.url, &target.name).await }
            });
            async move {
                let result = match task.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(name = %target.name, url = %target.url, error = %e, "Scrape task failed");
                        ScrapeResult::empty(target.url.clone())
                    }
                };
                (target.name, result)
            }
        });

        for (name, result) in join_all(handles).await {
            results.insert(name, result);
        }
        info!(
            completed = total - queue.len(),
            total,
            "Batch chunk complete"
        );
    }

    scraper.shutdown().await;
    info!(salons = results.len(), "Batch scrape finished");
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockScraper {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    #[async_trait]
    impl Scraper for MockScraper {
        async fn scrape_prices(&self, url: &str, name: &str) -> ScrapeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if name.starts_with("panic") {
                panic!("scrape blew up");
            }
            let mut result = ScrapeResult::empty(url);
            if name.starts_with("ok") {
                result.gel = Some(Decimal::from(45));
                result.confidence = 1.0 / 3.0;
                result.success = true;
            }
            result
        }

        async fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn targets(names: &[&str]) -> Vec<BatchTarget> {
        names
            .iter()
            .map(|n| BatchTarget::new(*n, format!("https://{n}.test")))
            .collect()
    }

    #[tokio::test]
    async fn test_every_target_gets_a_result() {
        let scraper = Arc::new(MockScraper::default());
        let names = ["ok-a", "ok-b", "bad-c", "ok-d", "bad-e", "ok-f", "ok-g"];
        let results = batch_scrape(scraper.clone(), targets(&names), 3).await;

        let keys: HashSet<&str> = results.keys().map(String::as_str).collect();
        assert_eq!(keys, names.iter().copied().collect::<HashSet<_>>());
        assert!(results["ok-a"].success);
        assert!(!results["bad-c"].success);
        assert_eq!(scraper.calls.load(Ordering::SeqCst), names.len());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let scraper = Arc::new(MockScraper::default());
        let names: Vec<String> = (0..10).map(|i| format!("ok-{i}")).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        batch_scrape(scraper.clone(), targets(&names), 4).await;
        assert!(scraper.max_in_flight.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_concurrency_larger_than_targets() {
        let scraper = Arc::new(MockScraper::default());
        let results = batch_scrape(scraper.clone(), targets(&["ok-a", "ok-b"]), 10).await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_concurrency_runs_sequentially() {
        let scraper = Arc::new(MockScraper::default());
        let results = batch_scrape(scraper.clone(), targets(&["ok-a", "ok-b", "ok-c"]), 0).await;
        assert_eq!(results.len(), 3);
        assert_eq!(scraper.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_called_once() {
        let scraper = Arc::new(MockScraper::default());
        batch_scrape(scraper.clone(), targets(&["ok-a", "ok-b", "ok-c"]), 2).await;
        assert_eq!(scraper.shutdowns.load(Ordering::SeqCst), 1);

        let empty = Arc::new(MockScraper::default());
        let results = batch_scrape(empty.clone(), Vec::new(), 2).await;
        assert!(results.is_empty());
        assert_eq!(empty.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_target_is_isolated() {
        let scraper = Arc::new(MockScraper::default());
        let results = batch_scrape(scraper.clone(), targets(&["ok-a", "panic-b", "ok-c"]), 3).await;
        assert_eq!(results.len(), 3);
        assert!(!results["panic-b"].success);
        assert_eq!(results["panic-b"].confidence, 0.0);
        assert!(results["ok-c"].success);
        assert_eq!(scraper.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_names_collapse() {
        let scraper = Arc::new(MockScraper::default());
        let batch = vec![
            BatchTarget::new("ok-same", "https://one.test"),
            BatchTarget::new("ok-same", "https://two.test"),
        ];
        let results = batch_scrape(scraper.clone(), batch, 1).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results["ok-same"].source_url, "https://two.test");
    }
}
