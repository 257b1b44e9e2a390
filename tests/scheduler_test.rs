// tests/scheduler_test.rs

use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use webvid_dl::{
    DownloadJobContext,
    automation::{BrowserDriver, MediaOrigin, MediaSource, PageSession},
    classifier::Strategy,
    config::AppConfig,
    downloader::Scheduler,
    error::{AppError, AppResult},
    extractor::{EngineMetadata, ExtractionEngine},
    history::HistorySink,
    models::{HistoryRecord, OutcomeStatus},
    recovery::FailureCategory,
    timing::TimingPolicy,
    vpn::{NordVpnCli, VpnClient, VpnController},
};

/// 按链接中的关键字决定行为的假引擎
#[derive(Default)]
struct FakeEngine {
    metadata_calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    download_delay: Duration,
}

impl FakeEngine {
    fn with_delay(delay: Duration) -> Self {
        Self {
            download_delay: delay,
            ..Self::default()
        }
    }

    fn calls(&self, url: &str) -> usize {
        self.metadata_calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ExtractionEngine for FakeEngine {
    async fn extract_metadata(&self, url: &str, _max_height: u32) -> AppResult<EngineMetadata> {
        let call = {
            let mut calls = self.metadata_calls.lock().unwrap();
            let entry = calls.entry(url.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        if url.contains("missing") {
            return Err(AppError::Extraction("ERROR: HTTP Error 404: Not Found".into()));
        }
        if url.contains("flaky") && call == 1 {
            return Err(AppError::Extraction("ERROR: Connection timed out".into()));
        }
        if url.contains("denied") && call == 1 {
            return Err(AppError::Extraction("ERROR: HTTP Error 403: Forbidden".into()));
        }
        if url.contains("broken") {
            return Err(AppError::Extraction("ERROR: Connection reset by peer".into()));
        }
        let title = url.rsplit('/').next().unwrap_or("clip").replace('.', " ");
        Ok(EngineMetadata {
            title: Some(title),
            height: Some(720),
            ..EngineMetadata::default()
        })
    }

    async fn download_best(&self, _url: &str, output_template: &Path, _max_height: u32) -> AppResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.download_delay.is_zero() {
            tokio::time::sleep(self.download_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let target = output_template.to_string_lossy().replace("%(ext)s", "mp4");
        std::fs::write(target, b"video")?;
        Ok(())
    }
}

/// 页面中只有一个 `<video>` 元素的假会话
struct FakeSession {
    current: Option<String>,
}

#[async_trait]
impl PageSession for FakeSession {
    async fn goto(&mut self, url: &str) -> AppResult<()> {
        self.current = Some(url.to_string());
        Ok(())
    }
    fn current_url(&self) -> Option<String> {
        self.current.clone()
    }
    async fn is_interactable(&mut self, _selector: &str) -> AppResult<bool> {
        Ok(false)
    }
    async fn scroll_into_view(&mut self, _selector: &str) -> AppResult<()> {
        Ok(())
    }
    async fn hover(&mut self, _selector: &str) -> AppResult<()> {
        Ok(())
    }
    async fn click(&mut self, _selector: &str) -> AppResult<()> {
        Ok(())
    }
    async fn fill(&mut self, _selector: &str, _value: &str) -> AppResult<()> {
        Ok(())
    }
    async fn scroll_by(&mut self, _delta_y: i64) -> AppResult<()> {
        Ok(())
    }
    async fn move_pointer(&mut self, _x: u32, _y: u32) -> AppResult<()> {
        Ok(())
    }
    async fn attribute_values(&mut self, _selector: &str, _attribute: &str) -> AppResult<Vec<String>> {
        Ok(Vec::new())
    }
    async fn media_sources(&mut self) -> AppResult<Vec<MediaSource>> {
        Ok(vec![MediaSource::new("/media/episode.mp4", MediaOrigin::VideoElement)])
    }
}

#[derive(Default)]
struct FakeDriver {
    sessions: AtomicUsize,
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn new_session(
        &self,
        _user_agent: &str,
        _headers: &HashMap<String, String>,
    ) -> AppResult<Box<dyn PageSession>> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession { current: None }))
    }
}

struct Harness {
    scheduler: Scheduler,
    context: DownloadJobContext,
    engine: Arc<FakeEngine>,
    driver: Arc<FakeDriver>,
    _dir: tempfile::TempDir,
}

/// 只计数的 VPN 客户端
#[derive(Default)]
struct CountingVpn {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

#[async_trait]
impl VpnClient for CountingVpn {
    async fn connect(&self, _country: &str) -> AppResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> AppResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 把历史记录保存在内存里
#[derive(Default)]
struct MemoryHistory {
    records: Mutex<Vec<HistoryRecord>>,
}

impl HistorySink for MemoryHistory {
    fn record(&self, record: &HistoryRecord) -> AppResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

fn harness(engine: FakeEngine, workers: usize, retries: u32, cancel: CancellationToken) -> Harness {
    harness_with_vpn(engine, workers, retries, cancel, None)
}

fn harness_with_vpn(
    engine: FakeEngine,
    workers: usize,
    retries: u32,
    cancel: CancellationToken,
    vpn_client: Option<Arc<dyn VpnClient>>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig {
        output_dir: dir.path().to_path_buf(),
        max_workers: workers,
        max_retries: retries,
        ..AppConfig::default()
    };
    config.vpn.enabled = vpn_client.is_some();
    let config = Arc::new(config);
    let timing = Arc::new(TimingPolicy::seeded(7).with_scale(0.0));
    let vpn_client =
        vpn_client.unwrap_or_else(|| Arc::new(NordVpnCli::new("nordvpn")) as Arc<dyn VpnClient>);
    let vpn = Arc::new(
        VpnController::new(config.vpn.clone(), vpn_client, timing.clone(), cancel.clone()).unwrap(),
    );
    let engine = Arc::new(engine);
    let driver = Arc::new(FakeDriver::default());
    let context = DownloadJobContext::new(
        config,
        vpn,
        engine.clone(),
        driver.clone(),
        timing,
        cancel,
    );
    Harness {
        scheduler: Scheduler::new(context.clone()).with_progress(false),
        context,
        engine,
        driver,
        _dir: dir,
    }
}

fn urls(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_every_url_yields_one_outcome_within_worker_limit() {
    let h = harness(
        FakeEngine::with_delay(Duration::from_millis(100)),
        2,
        3,
        CancellationToken::new(),
    );
    let input = urls(&[
        "https://cdn.test/a.mp4",
        "https://cdn.test/b.mp4",
        "https://cdn.test/c.mp4",
        "https://cdn.test/d.mp4",
        "https://cdn.test/e.mp4",
        "https://cdn.test/f.mp4",
    ]);

    let outcomes = h.scheduler.run_batch(&input).await;

    assert_eq!(outcomes.len(), input.len());
    let seen: HashSet<&str> = outcomes.iter().map(|o| o.source_url.as_str()).collect();
    assert_eq!(seen, input.iter().map(String::as_str).collect::<HashSet<_>>());
    assert!(outcomes.iter().all(|o| o.succeeded && o.status == OutcomeStatus::Succeeded));
    assert!(outcomes.iter().all(|o| o.strategy == Some(Strategy::Direct) && o.attempts == 1));
    for outcome in &outcomes {
        assert!(outcome.file_path.as_ref().is_some_and(|p| p.is_file()));
    }

    let peak = h.engine.max_in_flight.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "并发峰值 {} 超出限制", peak);
    assert_eq!(h.context.manager.get_stats().success, 6);
    assert!(h.context.manager.did_all_succeed());
}

#[tokio::test]
async fn test_not_found_is_skipped_without_retry() {
    let h = harness(FakeEngine::default(), 2, 3, CancellationToken::new());
    let input = urls(&["https://cdn.test/missing.mp4", "https://cdn.test/fine.mp4"]);

    let outcomes = h.scheduler.run_batch(&input).await;

    let missing = outcomes
        .iter()
        .find(|o| o.source_url.contains("missing"))
        .unwrap();
    assert_eq!(missing.status, OutcomeStatus::Skipped);
    assert!(!missing.succeeded);
    assert_eq!(missing.attempts, 1);
    assert_eq!(missing.failure.as_ref().unwrap().category, FailureCategory::NotFound);
    assert_eq!(h.engine.calls("https://cdn.test/missing.mp4"), 1);

    let stats = h.context.manager.get_stats();
    assert_eq!((stats.success, stats.skipped, stats.failed), (1, 1, 0));
    // 跳过不算失败
    assert!(h.context.manager.did_all_succeed());
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_retried() {
    let h = harness(FakeEngine::default(), 1, 3, CancellationToken::new());
    let input = urls(&["https://cdn.test/flaky.mp4"]);

    let outcomes = h.scheduler.run_batch(&input).await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, OutcomeStatus::Succeeded);
    assert_eq!(outcomes[0].attempts, 2);
    assert_eq!(h.engine.calls("https://cdn.test/flaky.mp4"), 2);
    // 网络超时后的等待为 30 秒
    assert!(outcomes[0].elapsed_seconds >= 30.0);
}

#[tokio::test]
async fn test_retry_budget_exhausted_marks_failed() {
    let h = harness(FakeEngine::default(), 1, 0, CancellationToken::new());
    let input = urls(&["https://cdn.test/broken.mp4"]);

    let outcomes = h.scheduler.run_batch(&input).await;

    assert_eq!(outcomes[0].status, OutcomeStatus::Failed);
    assert_eq!(outcomes[0].attempts, 1);
    assert_eq!(outcomes[0].failure.as_ref().unwrap().category, FailureCategory::NetworkTimeout);
    assert!(!h.context.manager.did_all_succeed());
}

#[tokio::test]
async fn test_page_url_goes_through_automation() {
    let h = harness(FakeEngine::default(), 1, 0, CancellationToken::new());
    let input = urls(&["https://pages.test/watch/42"]);

    let outcomes = h.scheduler.run_batch(&input).await;

    let outcome = &outcomes[0];
    assert_eq!(outcome.strategy, Some(Strategy::BrowserAutomation));
    assert_eq!(outcome.status, OutcomeStatus::Succeeded, "{:?}", outcome.failure);
    assert_eq!(h.driver.sessions.load(Ordering::SeqCst), 1);
    assert_eq!(h.engine.calls("https://pages.test/media/episode.mp4"), 1);
    let descriptor = outcome.descriptor.as_ref().unwrap();
    assert_eq!(descriptor.source_url, "https://pages.test/watch/42");
    assert_eq!(
        descriptor.resolved_media_url.as_deref(),
        Some("https://pages.test/media/episode.mp4")
    );
}

#[tokio::test]
async fn test_cancelled_before_start_aborts_everything() {
    let cancel = CancellationToken::new();
    let h = harness(FakeEngine::default(), 2, 3, cancel.clone());
    cancel.cancel();
    let input = urls(&["https://cdn.test/a.mp4", "https://www.youtube.com/watch?v=1"]);

    let outcomes = h.scheduler.run_batch(&input).await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.status == OutcomeStatus::Aborted));
    assert_eq!(h.engine.calls("https://cdn.test/a.mp4"), 0);
    assert_eq!(h.context.manager.get_stats().aborted, 2);
    assert!(!h.context.manager.did_all_succeed());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_retry_delay_aborts() {
    let cancel = CancellationToken::new();
    let h = harness(FakeEngine::default(), 1, 3, cancel.clone());
    let input = urls(&["https://cdn.test/broken.mp4"]);

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let outcomes = h.scheduler.run_batch(&input).await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, OutcomeStatus::Aborted);
    assert_eq!(h.engine.calls("https://cdn.test/broken.mp4"), 1);
}

#[tokio::test]
async fn test_empty_batch() {
    let h = harness(FakeEngine::default(), 2, 3, CancellationToken::new());
    assert!(h.scheduler.run_batch(&[]).await.is_empty());
    assert_eq!(h.context.manager.get_stats().total, 0);
}

// 确认错误分类没有被调度器改写
#[test]
fn test_extraction_error_categories() {
    use webvid_dl::recovery::Failure;
    let f = Failure::from_error(&AppError::Extraction("ERROR: HTTP Error 404: Not Found".into()));
    assert_eq!(f.category, FailureCategory::NotFound);
    let f = Failure::from_error(&AppError::Extraction("ERROR: Connection reset by peer".into()));
    assert_eq!(f.category, FailureCategory::NetworkTimeout);
}

#[tokio::test]
async fn test_adapter_extract_normalizes_engine_errors() {
    let h = harness(FakeEngine::default(), 1, 0, CancellationToken::new());

    let descriptor = h.context.adapter.extract("https://cdn.test/intro.mp4").await.unwrap();
    assert_eq!(descriptor.source_url, "https://cdn.test/intro.mp4");
    assert_eq!(descriptor.quality_label.as_deref(), Some("720p"));
    assert_eq!(descriptor.title.as_deref(), Some("intro mp4"));

    let failure = h.context.adapter.extract("https://cdn.test/missing.mp4").await.unwrap_err();
    assert_eq!(failure.category, FailureCategory::NotFound);
}

#[tokio::test(start_paused = true)]
async fn test_access_denied_triggers_one_shared_rotation() {
    let vpn_client = Arc::new(CountingVpn::default());
    let h = harness_with_vpn(
        FakeEngine::default(),
        3,
        3,
        CancellationToken::new(),
        Some(vpn_client.clone() as Arc<dyn VpnClient>),
    );
    assert!(h.context.vpn.connect(&[]).await);
    let initial = h.context.vpn.snapshot().current_identity.unwrap();

    let history = Arc::new(MemoryHistory::default());
    let scheduler = Scheduler::new(h.context.clone())
        .with_progress(false)
        .with_history(history.clone() as Arc<dyn HistorySink>);
    let input = urls(&[
        "https://cdn.test/denied-a.mp4",
        "https://cdn.test/denied-b.mp4",
        "https://cdn.test/denied-c.mp4",
    ]);

    let outcomes = scheduler.run_batch(&input).await;

    assert!(outcomes.iter().all(|o| o.status == OutcomeStatus::Succeeded));
    assert!(outcomes.iter().all(|o| o.attempts == 2));
    let state = h.context.vpn.snapshot();
    assert_eq!(state.rotations, 1);
    assert!(state.connected);
    // 初次连接 + 一次轮换
    assert_eq!(vpn_client.connects.load(Ordering::SeqCst), 2);
    assert_eq!(vpn_client.disconnects.load(Ordering::SeqCst), 1);

    let rotated = state.current_identity.unwrap();
    assert_ne!(rotated, initial);
    let records = history.records.lock().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.egress_identity.as_deref() == Some(rotated.as_str())));
}

#[tokio::test(start_paused = true)]
async fn test_adapter_download_reports_elapsed_time() {
    let h = harness(
        FakeEngine::with_delay(Duration::from_secs(3)),
        1,
        0,
        CancellationToken::new(),
    );

    let outcome = h.context.adapter.download("https://cdn.test/clip.mp4").await;

    assert_eq!(outcome.status, OutcomeStatus::Succeeded);
    assert!(outcome.elapsed_seconds >= 3.0);
    assert!(outcome.file_path.as_ref().is_some_and(|p| p.is_file()));
}
