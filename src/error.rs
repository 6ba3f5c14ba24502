use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ページ設定エラー: {0}")]
    PageSetup(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("ストアエラー: {0}")]
    Store(String),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("Places検索エラー: {0}")]
    Places(String),

    #[error("レート制限超過: 上限={limit}/時, リセット={reset_at}")]
    RateLimited { limit: u64, reset_at: DateTime<Utc> },

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScraperError {
    /// "blocked by client" 系のナビゲーション失敗か
    ///
    /// リクエスト遮断やブラウザ拡張による遮断は、反対スキームで再試行する価値がある。
    pub fn is_blocked_by_client(&self) -> bool {
        match self {
            ScraperError::Navigation(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("err_blocked_by_client") || msg.contains("blocked by client")
            }
            _ => false,
        }
    }
}
