//! 読み込み済みページの内容取得

use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ScraperError;

/// 描画済み要素のテキストを集める（5〜300文字、重複除去）
const RENDERED_TEXTS_SCRIPT: &str = r#"
    (() => {
        const skip = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE', 'SVG']);
        const seen = new Set();
        const out = [];
        for (const el of document.querySelectorAll('body *')) {
            if (skip.has(el.tagName)) continue;
            const text = (el.innerText || '').trim();
            if (text.length < 5 || text.length > 300 || seen.has(text)) continue;
            seen.add(text);
            out.push(text);
        }
        return out;
    })()
"#;

const LINKS_SCRIPT: &str = r#"
    (() => {
        const out = [];
        for (const el of document.querySelectorAll('a[href], button, [role="button"]')) {
            const text = (el.innerText || el.getAttribute('aria-label') || '').trim().slice(0, 120);
            const href = el.href || el.getAttribute('data-href') || '';
            if (!href) continue;
            out.push({ text, href: String(href) });
        }
        return out;
    })()
"#;

/// ページ上のリンク（テキスト + href）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredLink {
    pub text: String,
    pub href: String,
}

/// 抽出戦略の入力となるページ内容
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub url: String,
    /// 描画済みDOMの要素テキスト
    pub rendered_texts: Vec<String>,
    pub html: String,
    /// document.body.innerText
    pub body_text: String,
    pub links: Vec<DiscoveredLink>,
}

impl PageSnapshot {
    /// 描画結果なしでHTMLだけから作る
    pub fn from_html(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            ..Default::default()
        }
    }

    /// 現在のページ内容を取得
    pub async fn capture(page: &Page, url: &str) -> Result<Self, ScraperError> {
        let rendered_texts: Vec<String> = page
            .evaluate(RENDERED_TEXTS_SCRIPT)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?
            .into_value()
            .unwrap_or_default();

        let body_text: String = page
            .evaluate("document.body ? document.body.innerText : ''")
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?
            .into_value()
            .unwrap_or_default();

        let links: Vec<DiscoveredLink> = page
            .evaluate(LINKS_SCRIPT)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?
            .into_value()
            .unwrap_or_default();

        let html = page
            .content()
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;

        debug!(
            url = %url,
            rendered = rendered_texts.len(),
            links = links.len(),
            html_len = html.len(),
            "Captured page snapshot"
        );

        Ok(Self {
            url: url.to_string(),
            rendered_texts,
            html,
            body_text,
            links,
        })
    }
}
