//! プラン別のリクエスト数制限
//!
//! 識別子 + 1時間単位のバケットでカウンタを持ち、バケット最初の
//! リクエストで有効期限を設定する。ストアが使えない場合は許可する（fail open）。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{to_chrono, Clock, SystemClock};
use crate::config::TierLimits;
use crate::error::ScraperError;

const WINDOW: Duration = Duration::from_secs(3600);

/// インメモリストアが期限切れウィンドウを掃除する最短間隔
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// 契約プラン
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Enterprise,
}

impl TierLimits {
    pub fn limit_for(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Free => self.free,
            Tier::Pro => self.pro,
            Tier::Enterprise => self.enterprise,
        }
    }
}

/// 判定結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

/// カウンタのバックエンド（原子的な加算と有効期限）
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// 加算後の値を返す
    async fn incr(&self, key: &str) -> Result<u64, ScraperError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), ScraperError>;
}

#[derive(Debug, Clone)]
pub struct RateWindow {
    pub count: u64,
    pub expires_at: Option<DateTime<Utc>>,
}

/// インメモリのカウンタストア
///
/// 期限切れのウィンドウは `incr` のついでに（最短 `PURGE_INTERVAL` ごとに）捨てる。
pub struct MemoryRateLimitStore {
    windows: DashMap<String, RateWindow>,
    clock: Arc<dyn Clock>,
    last_purge: Mutex<DateTime<Utc>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            last_purge: Mutex::new(clock.now()),
            clock,
        }
    }

    /// 期限切れのウィンドウを捨てる
    pub fn purge_expired(&self) {
        self.retain_live(self.clock.now());
    }

    fn retain_live(&self, now: DateTime<Utc>) {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| w.expires_at.map_or(true, |t| t > now));
        let purged = before.saturating_sub(self.windows.len());
        if purged > 0 {
            debug!(purged, remaining = self.windows.len(), "Purged expired rate windows");
        }
    }

    fn purge_if_due(&self, now: DateTime<Utc>) {
        let due = match self.last_purge.lock() {
            Ok(mut last) if now - *last >= to_chrono(PURGE_INTERVAL) => {
                *last = now;
                true
            }
            _ => false,
        };
        if due {
            self.retain_live(now);
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl Default for MemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn incr(&self, key: &str) -> Result<u64, ScraperError> {
        let now = self.clock.now();
        // エントリ参照を握る前に掃除する
        self.purge_if_due(now);
        let mut window = self
            .windows
            .entry(key.to_string())
            .or_insert(RateWindow {
                count: 0,
                expires_at: None,
            });
        if window.expires_at.is_some_and(|t| t <= now) {
            *window = RateWindow {
                count: 0,
                expires_at: None,
            };
        }
        window.count += 1;
        Ok(window.count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), ScraperError> {
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(to_chrono(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if let Some(mut window) = self.windows.get_mut(key) {
            window.expires_at = Some(expires_at);
        }
        Ok(())
    }
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    limits: TierLimits,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, limits: TierLimits) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            limits,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 1リクエスト分を消費して可否を返す
    pub async fn check_and_consume(&self, identity: &str, tier: Tier) -> RateDecision {
        let limit = self.limits.limit_for(tier);
        let window_secs = WINDOW.as_secs() as i64;
        let bucket = self.clock.now().timestamp().div_euclid(window_secs);
        let reset_at = Utc
            .timestamp_opt((bucket + 1) * window_secs, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let key = format!("ratelimit:{identity}:{bucket}");

        match self.consume(&key).await {
            Ok(count) => {
                let allowed = count <= limit;
                if !allowed {
                    debug!(identity, ?tier, count, limit, "Rate limit exceeded");
                }
                RateDecision {
                    allowed,
                    limit,
                    remaining: limit.saturating_sub(count),
                    reset_at,
                }
            }
            Err(e) => {
                warn!(identity, error = %e, "Rate limit store unavailable, allowing request");
                RateDecision {
                    allowed: true,
                    limit,
                    remaining: limit,
                    reset_at,
                }
            }
        }
    }

    async fn consume(&self, key: &str) -> Result<u64, ScraperError> {
        let count = self.store.incr(key).await?;
        if count == 1 {
            self.store.expire(key, WINDOW).await?;
        }
        Ok(count)
    }
}
