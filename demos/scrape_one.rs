use salon_price_scraper::{ExplorationDepth, PriceRules, PriceScraper, ScraperConfig};

#[tokio::main]
async fn main() {
    // ログ設定
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "salon_price_scraper=debug".into()),
        )
        .init();

    let url = std::env::var("SALON_URL").expect("SALON_URL environment variable not set");
    let name = std::env::var("SALON_NAME").unwrap_or_else(|_| "Test Salon".to_string());
    let headless = std::env::var("HEADLESS").map(|v| v != "false").unwrap_or(true);

    let mut config = ScraperConfig::new()
        .with_headless(headless)
        .with_debug(std::env::var("SCRAPER_DEBUG").is_ok())
        .with_depth(ExplorationDepth::Thorough);

    // 価格ルールの差し替え（任意）
    if let Ok(path) = std::env::var("PRICE_RULES") {
        let json = std::fs::read_to_string(&path).expect("failed to read PRICE_RULES file");
        config = config.with_rules(PriceRules::from_json_str(&json).expect("invalid price rules"));
    }

    let scraper = PriceScraper::new(config).expect("invalid scraper config");

    println!("=== Salon Price Scraper ===");
    let result = scraper.scrape_prices(&url, &name).await;
    scraper.shutdown().await;

    println!("Gel:      {:?}", result.gel);
    println!("Pedicure: {:?}", result.pedicure);
    println!("Acrylic:  {:?}", result.acrylic);
    println!("Confidence: {:.2} ({} candidates)", result.confidence, result.candidates.len());

    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("エラー: {}", e),
    }
}
