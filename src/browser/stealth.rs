//! 検出回避のためのページ設定値

use chromiumoxide::cdp::browser_protocol::network::ResourceType;
use rand::Rng;

pub const VIEWPORT_WIDTH: i64 = 1920;
pub const VIEWPORT_HEIGHT: i64 = 1080;

pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// デスクトップ向け User-Agent
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

/// 解析・広告・トラッキング系ドメイン
const TRACKING_DOMAINS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "googlesyndication.com",
    "doubleclick.net",
    "googleadservices.com",
    "facebook.net",
    "connect.facebook.net",
    "hotjar.com",
    "segment.io",
    "segment.com",
    "mixpanel.com",
    "amplitude.com",
    "clarity.ms",
    "bing.com/bat",
    "ads-twitter.com",
    "analytics.tiktok.com",
    "scorecardresearch.com",
    "quantserve.com",
    "newrelic.com",
    "nr-data.net",
    "adservice.google.com",
];

/// navigator.webdriver 等の自動化痕跡を隠す
pub const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    window.chrome = window.chrome || { runtime: {} };
"#;

pub fn random_user_agent() -> &'static str {
    let index = rand::rng().random_range(0..USER_AGENTS.len());
    USER_AGENTS[index]
}

pub fn is_tracking_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    TRACKING_DOMAINS.iter().any(|d| lower.contains(d))
}

/// 遮断するリクエストか（画像・メディア・フォント・CSS・トラッカー）
pub fn should_block(resource_type: &ResourceType, url: &str) -> bool {
    matches!(
        resource_type,
        ResourceType::Image | ResourceType::Media | ResourceType::Font | ResourceType::Stylesheet
    ) || is_tracking_url(url)
}
