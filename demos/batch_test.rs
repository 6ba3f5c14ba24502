use std::sync::Arc;
use std::time::Instant;

use salon_price_scraper::{BatchTarget, PriceScraper, ScraperConfig};

#[tokio::main]
async fn main() {
    // ログ設定
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "salon_price_scraper=info".into()),
        )
        .init();

    // "名前|URL" をカンマ区切りで指定
    let raw = std::env::var("SALON_TARGETS").expect("SALON_TARGETS environment variable not set");
    let targets: Vec<BatchTarget> = raw
        .split(',')
        .filter_map(|entry| {
            let (name, url) = entry.split_once('|')?;
            Some(BatchTarget::new(name.trim(), url.trim()))
        })
        .collect();

    let concurrency = std::env::var("CONCURRENCY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3);

    let config = ScraperConfig::new().with_concurrency(concurrency);
    let scraper = Arc::new(PriceScraper::new(config).expect("invalid scraper config"));

    println!("=== Batch Test: {} salons, concurrency {} ===", targets.len(), concurrency);
    let started = Instant::now();
    let results = scraper.batch_scrape(targets).await;

    let mut names: Vec<&String> = results.keys().collect();
    names.sort();
    for name in names {
        let r = &results[name];
        println!(
            "{:<30} gel={:<8} pedicure={:<8} acrylic={:<8} confidence={:.2}",
            name,
            r.gel.map(|p| format!("${}", p)).unwrap_or_else(|| "-".into()),
            r.pedicure.map(|p| format!("${}", p)).unwrap_or_else(|| "-".into()),
            r.acrylic.map(|p| format!("${}", p)).unwrap_or_else(|| "-".into()),
            r.confidence
        );
    }

    let found = results.values().filter(|r| r.success).count();
    println!(
        "成功: {}/{} ({:?})",
        found,
        results.len(),
        started.elapsed()
    );
}
