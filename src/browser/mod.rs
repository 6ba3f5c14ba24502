//! ヘッドレスブラウザ層
//!
//! - `session`: 共有ブラウザの起動・再起動・終了とページ払い出し
//! - `stealth`: UA・ビューポート・リクエスト遮断などの検出回避設定
//! - `navigation`: 待機条件を切り替えながらのリトライ付き遷移
//! - `expand`: 折りたたまれたメニューの展開

mod expand;
mod navigation;
mod session;
mod stealth;

pub use expand::{expand_content, expansion_script, EXPAND_VOCABULARY, MAX_EXPAND_CLICKS};
pub use navigation::{
    backoff_for_attempt, navigate, strategy_for_attempt, WaitCondition, WaitStrategy,
    WAIT_STRATEGIES,
};
pub use session::{BrowserSession, PageGuard};
pub use stealth::{is_tracking_url, random_user_agent, should_block, STEALTH_SCRIPT};
