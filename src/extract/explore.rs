//! サイト内の探索対象URL

use url::Url;

use super::snapshot::DiscoveredLink;
use crate::config::ExplorationDepth;

/// トップページの次に試すパス（先頭はトップページ）
pub const EXPLORATION_PATHS: &[&str] = &[
    "",
    "/services",
    "/pricing",
    "/prices",
    "/menu",
    "/service-menu",
    "/price-list",
    "/nail-services",
    "/our-services",
    "/services-pricing",
];

/// Quick で試すパス数
const QUICK_PATH_COUNT: usize = 6;

/// 料金ページらしいリンクの語彙
const SERVICE_LINK_VOCABULARY: &[&str] =
    &["service", "pricing", "price", "menu", "booking", "book", "rates"];

/// 実店舗サイトではない検索・地図ページ
const EXCLUDED_URL_PATTERNS: &[&str] = &[
    "google.com/maps",
    "google.com/search",
    "maps.google.",
    "goo.gl/maps",
    "maps.app.goo.gl",
    "bing.com/maps",
    "bing.com/search",
    "maps.apple.com",
    "search.yahoo.com",
    "duckduckgo.com/?",
];

/// パス巡回・リンク追跡をしないSNS
const SOCIAL_DOMAINS: &[&str] = &["facebook.com", "instagram.com"];

pub fn is_excluded_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    EXCLUDED_URL_PATTERNS.iter().any(|p| lower.contains(p))
}

/// スクレイプ対象になり得るURLか（空・"#"・非HTTP(S)・除外パターンは対象外）
pub fn is_scrapable_url(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() || url == "#" || is_excluded_url(url) {
        return false;
    }
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

pub fn is_social_url(url: &str) -> bool {
    host_of(url).is_some_and(|host| {
        SOCIAL_DOMAINS
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    })
}

/// http ↔ https を入れ替えたURL
pub fn flip_scheme(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("https://") {
        Some(format!("http://{rest}"))
    } else {
        url.strip_prefix("http://")
            .map(|rest| format!("https://{rest}"))
    }
}

/// 探索するURLの一覧（先頭は入力URLそのもの）
pub fn candidate_urls(url: &str, depth: ExplorationDepth) -> Vec<String> {
    let Ok(parsed) = Url::parse(url) else {
        return vec![url.to_string()];
    };
    let paths = match depth {
        ExplorationDepth::Quick => &EXPLORATION_PATHS[..QUICK_PATH_COUNT],
        ExplorationDepth::Thorough => EXPLORATION_PATHS,
    };

    let mut urls = vec![url.to_string()];
    for path in paths.iter().filter(|p| !p.is_empty()) {
        let mut next = parsed.clone();
        next.set_path(path);
        next.set_query(None);
        next.set_fragment(None);
        let next = next.to_string();
        if !urls.contains(&next) {
            urls.push(next);
        }
    }
    urls
}

fn strip_fragment(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

/// 同一ホスト内の料金・メニューページらしいリンクを最大 `limit` 件
pub fn discover_service_links(
    links: &[DiscoveredLink],
    base_url: &str,
    already_visited: &[String],
    limit: usize,
) -> Vec<String> {
    let Some(base_host) = host_of(base_url) else {
        return Vec::new();
    };

    let mut found: Vec<String> = Vec::new();
    for link in links {
        if found.len() >= limit {
            break;
        }
        let text = link.text.to_lowercase();
        let href = link.href.to_lowercase();
        let relevant = SERVICE_LINK_VOCABULARY
            .iter()
            .any(|w| text.contains(w) || href.contains(w));
        if !relevant || !is_scrapable_url(&link.href) {
            continue;
        }
        if host_of(&link.href).as_deref() != Some(base_host.as_str()) {
            continue;
        }
        let normalized = strip_fragment(&link.href);
        if already_visited.contains(&normalized) || found.contains(&normalized) {
            continue;
        }
        found.push(normalized);
    }
    found
}
