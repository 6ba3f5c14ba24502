use std::time::Duration;

use chromiumoxide::Page;
use tokio::time::sleep;
use tracing::debug;

/// 折りたたまれたメニューを開くボタンの文言
pub const EXPAND_VOCABULARY: &[&str] = &[
    "see more",
    "see all",
    "show more",
    "show all",
    "load more",
    "view more",
    "view all",
    "view menu",
    "full menu",
    "read more",
    "expand",
];

/// 1回の展開でクリックする最大数
pub const MAX_EXPAND_CLICKS: usize = 3;

/// 可視な展開ボタンを最大 `limit` 個クリックし、その数を返すスクリプト
pub fn expansion_script(limit: usize) -> String {
    let vocabulary = serde_json::to_string(EXPAND_VOCABULARY).unwrap_or_else(|_| "[]".into());
    format!(
        r#"
        (() => {{
            const vocabulary = {vocabulary};
            const limit = {limit};
            const elements = document.querySelectorAll(
                'button, a, summary, [role="button"], [aria-expanded="false"], ' +
                '[class*="more"], [class*="expand"], [class*="toggle"]'
            );
            let clicked = 0;
            for (const el of elements) {{
                if (clicked >= limit) break;
                const label = ((el.innerText || '') + ' ' + (el.getAttribute('aria-label') || ''))
                    .trim().toLowerCase();
                if (!label || label.length > 40) continue;
                if (!vocabulary.some(v => label.includes(v))) continue;
                const rect = el.getBoundingClientRect();
                const style = window.getComputedStyle(el);
                if (rect.width === 0 || rect.height === 0) continue;
                if (style.visibility === 'hidden' || style.display === 'none') continue;
                try {{ el.click(); clicked++; }} catch (_) {{}}
            }}
            return clicked;
        }})()
        "#
    )
}

/// 「もっと見る」系の要素を開いてから `settle` 待つ
///
/// 失敗しても無視する。
pub async fn expand_content(page: &Page, settle: Duration) -> usize {
    let clicked = match page.evaluate(expansion_script(MAX_EXPAND_CLICKS)).await {
        Ok(val) => val.into_value::<usize>().unwrap_or(0),
        Err(e) => {
            debug!("Content expansion failed: {}", e);
            return 0;
        }
    };

    if clicked > 0 {
        debug!(clicked, "Expanded collapsed content");
        sleep(settle).await;
    }
    clicked
}
