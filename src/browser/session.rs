//! 共有ブラウザの所有とページ生成

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::stealth::{
    random_user_agent, should_block, ACCEPT_LANGUAGE, STEALTH_SCRIPT, VIEWPORT_HEIGHT,
    VIEWPORT_WIDTH,
};
use crate::config::ScraperConfig;
use crate::error::ScraperError;

struct LiveBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
    disconnected: Arc<AtomicBool>,
    user_data_dir: PathBuf,
}

impl LiveBrowser {
    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst) && !self.handler_task.is_finished()
    }
}

/// 1つのブラウザプロセスを所有し、ターゲットごとのページを払い出す
///
/// ブラウザは最初の `acquire` / `new_page` で起動し、切断されていれば作り直す。
/// `release` で閉じ、起動時に作ったユーザーデータディレクトリも消す。
pub struct BrowserSession {
    config: ScraperConfig,
    inner: Mutex<Option<LiveBrowser>>,
}

impl BrowserSession {
    pub fn new(config: ScraperConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(None),
        }
    }

    pub async fn is_live(&self) -> bool {
        self.inner
            .lock()
            .await
            .as_ref()
            .is_some_and(LiveBrowser::is_connected)
    }

    /// ブラウザが起動していなければ起動する
    pub async fn acquire(&self) -> Result<(), ScraperError> {
        let mut slot = self.inner.lock().await;
        self.ensure_live(&mut slot).await
    }

    async fn ensure_live(&self, slot: &mut Option<LiveBrowser>) -> Result<(), ScraperError> {
        if slot.as_ref().is_some_and(LiveBrowser::is_connected) {
            return Ok(());
        }
        if let Some(stale) = slot.take() {
            warn!("Browser disconnected, relaunching");
            let LiveBrowser {
                browser,
                handler_task,
                user_data_dir,
                ..
            } = stale;
            handler_task.abort();
            drop(browser);
            remove_user_data_dir(&user_data_dir).await;
        }
        *slot = Some(self.launch().await?);
        Ok(())
    }

    async fn launch(&self) -> Result<LiveBrowser, ScraperError> {
        info!("Launching shared browser...");

        // プロセスごとに独立したユーザーデータディレクトリ
        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("salon-price-{}", unique_id));

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&user_data_dir)
            .window_size(VIEWPORT_WIDTH as u32, VIEWPORT_HEIGHT as u32);

        if let Some(path) = self.config.resolve_chrome_executable() {
            builder = builder.chrome_executable(path);
        }

        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .request_timeout(Duration::from_secs(60))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");

        if self.config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder.build().map_err(ScraperError::BrowserInit)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        let disconnected = Arc::new(AtomicBool::new(false));
        let flag = disconnected.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser event error: {}", e);
                }
            }
            flag.store(true, Ordering::SeqCst);
            debug!("Browser handler stream ended");
        });

        info!("Browser launched");
        Ok(LiveBrowser {
            browser,
            handler_task,
            disconnected,
            user_data_dir,
        })
    }

    /// 起動中ブラウザのユーザーデータディレクトリ
    pub async fn user_data_dir(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .await
            .as_ref()
            .map(|live| live.user_data_dir.clone())
    }

    /// 検出回避設定済みのページを作る（失敗は呼び出し側へ返す）
    pub async fn new_page(&self) -> Result<PageGuard, ScraperError> {
        let page = {
            let mut slot = self.inner.lock().await;
            self.ensure_live(&mut slot).await?;
            let live = slot
                .as_ref()
                .ok_or_else(|| ScraperError::BrowserInit("browser not running".into()))?;
            live.browser
                .new_page("about:blank")
                .await
                .map_err(|e| ScraperError::PageSetup(e.to_string()))?
        };

        match configure_page(&page).await {
            Ok(interceptor) => Ok(PageGuard::new(page, interceptor)),
            Err(e) => {
                if let Err(close_err) = page.close().await {
                    debug!("Failed to close page after setup error: {}", close_err);
                }
                Err(e)
            }
        }
    }

    /// ブラウザを閉じて空にする
    pub async fn release(&self) {
        let Some(mut live) = self.inner.lock().await.take() else {
            return;
        };
        info!("Closing shared browser...");
        if let Err(e) = live.browser.close().await {
            debug!("Browser close failed: {}", e);
        }
        if let Err(e) = live.browser.wait().await {
            debug!("Browser wait failed: {}", e);
        }
        live.handler_task.abort();
        remove_user_data_dir(&live.user_data_dir).await;
        info!("Browser closed");
    }
}

async fn remove_user_data_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "Removed browser user data directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!(dir = %dir.display(), "Failed to remove user data directory: {}", e),
    }
}

async fn configure_page(page: &Page) -> Result<JoinHandle<()>, ScraperError> {
    let user_agent = random_user_agent();
    debug!(user_agent, "Configuring page");

    let ua_params = SetUserAgentOverrideParams::builder()
        .user_agent(user_agent)
        .accept_language(ACCEPT_LANGUAGE)
        .build()
        .map_err(ScraperError::PageSetup)?;
    page.execute(ua_params)
        .await
        .map_err(|e| ScraperError::PageSetup(format!("user agent: {}", e)))?;

    page.execute(SetExtraHttpHeadersParams::new(Headers::new(serde_json::json!({
        "Accept-Language": ACCEPT_LANGUAGE,
    }))))
    .await
    .map_err(|e| ScraperError::PageSetup(format!("headers: {}", e)))?;

    page.execute(SetDeviceMetricsOverrideParams::new(
        VIEWPORT_WIDTH,
        VIEWPORT_HEIGHT,
        1.0,
        false,
    ))
    .await
    .map_err(|e| ScraperError::PageSetup(format!("viewport: {}", e)))?;

    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
        .await
        .map_err(|e| ScraperError::PageSetup(format!("stealth script: {}", e)))?;

    // リクエスト遮断
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| ScraperError::PageSetup(format!("request listener: {}", e)))?;

    let enable = EnableParams::builder()
        .pattern(
            RequestPattern::builder()
                .url_pattern("*")
                .request_stage(RequestStage::Request)
                .build(),
        )
        .build();
    page.execute(enable)
        .await
        .map_err(|e| ScraperError::PageSetup(format!("fetch interception: {}", e)))?;

    let intercept_page = page.clone();
    let interceptor = tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let outcome = if should_block(&event.resource_type, &event.request.url) {
                intercept_page
                    .execute(FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
            } else {
                intercept_page
                    .execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            };
            if let Err(e) = outcome {
                debug!("Request interception reply failed: {}", e);
            }
        }
    });

    Ok(interceptor)
}

/// ページを確実に閉じるためのガード
///
/// `close` で明示的に閉じる。早期リターン等で drop された場合は
/// バックグラウンドタスクで閉じる。
pub struct PageGuard {
    page: Option<Page>,
    interceptor: JoinHandle<()>,
    runtime: tokio::runtime::Handle,
}

impl PageGuard {
    fn new(page: Page, interceptor: JoinHandle<()>) -> Self {
        Self {
            page: Some(page),
            interceptor,
            runtime: tokio::runtime::Handle::current(),
        }
    }

    pub async fn close(mut self) {
        self.interceptor.abort();
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Failed to close page: {}", e);
            }
        }
    }
}

impl Deref for PageGuard {
    type Target = Page;

    fn deref(&self) -> &Self::Target {
        // page は close() で self ごと消費されるまで常に Some
        match self.page.as_ref() {
            Some(page) => page,
            None => unreachable!("PageGuard used after close"),
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.interceptor.abort();
        if let Some(page) = self.page.take() {
            self.runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    debug!("PageGuard drop cleanup failed: {}", e);
                }
            });
        }
    }
}
