//! 待機条件を切り替えながらのナビゲーション

use std::future::Future;
use std::time::Duration;

use chromiumoxide::Page;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::ScraperError;
use crate::extract::flip_scheme;

const READY_CHECK_INTERVAL_MS: u64 = 250;
const NETWORK_IDLE_CHECK_INTERVAL_MS: u64 = 500;
const REQUIRED_IDLE_CHECKS: u32 = 3;

const NETWORK_IDLE_SCRIPT: &str = r#"
    (() => {
        const entries = performance.getEntriesByType('resource');
        const now = performance.now();
        // 直近500ms以内に開始され、まだ完了していないリクエスト
        const recent = entries.filter(e => (now - e.startTime) < 500 && e.duration === 0);
        return document.readyState !== 'loading' && recent.length === 0;
    })()
"#;

/// ナビゲーション完了とみなす条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    DomContentLoaded,
    NetworkIdle,
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitStrategy {
    pub condition: WaitCondition,
    pub timeout: Duration,
}

/// 試行ごとに順番に使う待機戦略
pub const WAIT_STRATEGIES: [WaitStrategy; 3] = [
    WaitStrategy {
        condition: WaitCondition::DomContentLoaded,
        timeout: Duration::from_secs(15),
    },
    WaitStrategy {
        condition: WaitCondition::NetworkIdle,
        timeout: Duration::from_secs(20),
    },
    WaitStrategy {
        condition: WaitCondition::Load,
        timeout: Duration::from_secs(25),
    },
];

pub fn strategy_for_attempt(attempt: u32) -> WaitStrategy {
    WAIT_STRATEGIES[attempt as usize % WAIT_STRATEGIES.len()]
}

/// 試行前の待ち時間（線形）
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    Duration::from_millis(u64::from(attempt) * 1000)
}

/// `url` を開く。どの試行でも開けなければ false
///
/// "blocked by client" で失敗した試行では、同じ試行内で反対スキームを試す。
pub async fn navigate(page: &Page, url: &str, max_attempts: u32) -> bool {
    navigate_with(url, max_attempts, |target, strategy| async move {
        load(page, &target, strategy).await
    })
    .await
}

/// 試行・スキーム切り替えの制御部分（1回の読み込みは `load_once` に任せる）
async fn navigate_with<F, Fut>(url: &str, max_attempts: u32, mut load_once: F) -> bool
where
    F: FnMut(String, WaitStrategy) -> Fut,
    Fut: Future<Output = Result<(), ScraperError>>,
{
    for attempt in 0..max_attempts {
        if attempt > 0 {
            sleep(backoff_for_attempt(attempt)).await;
        }
        let strategy = strategy_for_attempt(attempt);

        match load_once(url.to_string(), strategy).await {
            Ok(()) => {
                debug!(url, attempt, condition = ?strategy.condition, "Navigation succeeded");
                return true;
            }
            Err(e) if e.is_blocked_by_client() => {
                let Some(alternate) = flip_scheme(url) else {
                    debug!(url, attempt, "Blocked by client: {}", e);
                    continue;
                };
                info!(url, alternate = %alternate, "Blocked by client, trying alternate scheme");
                match load_once(alternate.clone(), strategy).await {
                    Ok(()) => return true,
                    Err(e) => debug!(url = %alternate, attempt, "Alternate scheme failed: {}", e),
                }
            }
            Err(e) => {
                debug!(url, attempt, condition = ?strategy.condition, "Navigation attempt failed: {}", e);
            }
        }
    }

    warn!(url, max_attempts, "Navigation failed after all attempts");
    false
}

async fn load(page: &Page, url: &str, strategy: WaitStrategy) -> Result<(), ScraperError> {
    let navigation = async {
        page.goto(url)
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?;
        wait_for(page, strategy.condition).await;
        Ok(())
    };

    match timeout(strategy.timeout, navigation).await {
        Ok(result) => result,
        Err(_) => Err(ScraperError::Navigation(format!(
            "{:?} not reached within {:?}",
            strategy.condition, strategy.timeout
        ))),
    }
}

/// 条件を満たすまでポーリング（外側のタイムアウトで打ち切られる）
async fn wait_for(page: &Page, condition: WaitCondition) {
    match condition {
        WaitCondition::DomContentLoaded => {
            wait_ready_state(page, &["interactive", "complete"]).await
        }
        WaitCondition::Load => wait_ready_state(page, &["complete"]).await,
        WaitCondition::NetworkIdle => wait_network_idle(page).await,
    }
}

async fn wait_ready_state(page: &Page, accepted: &[&str]) {
    loop {
        match page.evaluate("document.readyState").await {
            Ok(val) => {
                let state = val.into_value::<String>().unwrap_or_default();
                if accepted.contains(&state.as_str()) {
                    return;
                }
            }
            Err(e) => debug!("readyState check error: {}", e),
        }
        sleep(Duration::from_millis(READY_CHECK_INTERVAL_MS)).await;
    }
}

async fn wait_network_idle(page: &Page) {
    let mut idle_count = 0;
    loop {
        match page.evaluate(NETWORK_IDLE_SCRIPT).await {
            Ok(val) => {
                if val.into_value::<bool>().unwrap_or(false) {
                    idle_count += 1;
                    if idle_count >= REQUIRED_IDLE_CHECKS {
                        return;
                    }
                } else {
                    idle_count = 0;
                }
            }
            Err(e) => {
                debug!("Network idle check error: {}", e);
                idle_count = 0;
            }
        }
        sleep(Duration::from_millis(NETWORK_IDLE_CHECK_INTERVAL_MS)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BrowserSession;
    use crate::config::ScraperConfig;
    use std::sync::Mutex;

    #[test]
    fn test_strategies_cycle() {
        assert_eq!(strategy_for_attempt(0).condition, WaitCondition::DomContentLoaded);
        assert_eq!(strategy_for_attempt(1).condition, WaitCondition::NetworkIdle);
        assert_eq!(strategy_for_attempt(2).condition, WaitCondition::Load);
        assert_eq!(strategy_for_attempt(3).condition, WaitCondition::DomContentLoaded);
        assert_eq!(strategy_for_attempt(2).timeout, Duration::from_secs(25));
    }

    /// 呼ばれたURLを記録し、応答を順に返す読み込み
    fn scripted<'a>(
        calls: &'a Mutex<Vec<String>>,
        outcomes: Vec<Result<(), &'static str>>,
    ) -> impl FnMut(String, WaitStrategy) -> std::future::Ready<Result<(), ScraperError>> + 'a {
        let mut outcomes = outcomes.into_iter();
        move |target, _strategy| {
            calls.lock().unwrap().push(target);
            let outcome = outcomes
                .next()
                .unwrap_or(Err("net::ERR_NAME_NOT_RESOLVED"))
                .map_err(|msg| ScraperError::Navigation(msg.to_string()));
            std::future::ready(outcome)
        }
    }

    #[tokio::test]
    async fn test_blocked_url_retried_with_other_scheme() {
        let calls = Mutex::new(Vec::new());
        let ok = navigate_with(
            "https://salon.test/",
            3,
            scripted(&calls, vec![Err("net::ERR_BLOCKED_BY_CLIENT"), Ok(())]),
        )
        .await;
        assert!(ok);
        assert_eq!(
            *calls.lock().unwrap(),
            ["https://salon.test/", "http://salon.test/"]
        );
    }

    #[tokio::test]
    async fn test_blocked_in_both_schemes_returns_false() {
        let calls = Mutex::new(Vec::new());
        let blocked = vec![Err("net::ERR_BLOCKED_BY_CLIENT"); 4];
        let ok = navigate_with("http://salon.test/", 2, scripted(&calls, blocked)).await;
        assert!(!ok);
        assert_eq!(
            *calls.lock().unwrap(),
            [
                "http://salon.test/",
                "https://salon.test/",
                "http://salon.test/",
                "https://salon.test/",
            ]
        );
    }

    #[tokio::test]
    async fn test_other_failures_do_not_flip_scheme() {
        let calls = Mutex::new(Vec::new());
        let ok = navigate_with("https://salon.test/", 2, scripted(&calls, Vec::new())).await;
        assert!(!ok);
        assert_eq!(
            *calls.lock().unwrap(),
            ["https://salon.test/", "https://salon.test/"]
        );
    }

    #[tokio::test]
    #[ignore] // 実ブラウザが必要
    async fn test_live_navigation_to_blocked_tracker_fails() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("salon_price_scraper=debug")
            .try_init();

        let session = BrowserSession::new(ScraperConfig::new());
        let page = session.new_page().await.unwrap();

        // トラッカーはどちらのスキームでも遮断される
        assert!(!navigate(&page, "https://www.googletagmanager.com/gtm.js", 2).await);
        // 解決できないホスト
        assert!(!navigate(&page, "https://salon-price.invalid/", 1).await);

        page.close().await;
        session.release().await;
    }

    #[test]
    fn test_backoff_is_linear() {
        assert_eq!(backoff_for_attempt(0), Duration::ZERO);
        assert_eq!(backoff_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(backoff_for_attempt(2), Duration::from_millis(2000));
    }
}
