use crate::domain::constants::{DEDUPE_HEADER, NO_DEDUPE_HEADER};
use crate::domain::entities::{ApiResponse, RequestDescriptor};
use crate::domain::value_objects::RequestKey;
use crate::infrastructure::cache::ResponseCache;
use crate::shared::config::DedupConfig;
use crate::shared::error::{AppError, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type SharedResponse = Shared<BoxFuture<'static, Result<ApiResponse>>>;

/// リクエスト記述子からキーを導出する関数
pub type KeyFn = Arc<dyn Fn(&RequestDescriptor) -> RequestKey + Send + Sync>;

struct PendingRequest {
    generation: u64,
    future: SharedResponse,
    cancel: CancellationToken,
    created_at: Instant,
}

struct DedupState {
    pending: HashMap<RequestKey, PendingRequest>,
    cache: Option<ResponseCache<ApiResponse>>,
    next_generation: u64,
}

impl DedupState {
    fn remove_if_current(&mut self, key: &RequestKey, generation: u64) -> bool {
        let current = self
            .pending
            .get(key)
            .map(|pending| pending.generation == generation)
            .unwrap_or(false);
        if current {
            self.pending.remove(key);
        }
        current
    }

    fn evict_oldest(&mut self) -> Option<RequestKey> {
        let oldest = self
            .pending
            .iter()
            .min_by_key(|(_, pending)| pending.created_at)
            .map(|(key, _)| key.clone())?;
        if let Some(pending) = self.pending.remove(&oldest) {
            pending.cancel.cancel();
        }
        Some(oldest)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub pending: usize,
    pub cached: usize,
    /// 実際に executor を呼んだ回数
    pub executed: u64,
    /// 実行中のリクエストに相乗りした回数
    pub joined: u64,
    pub cache_hits: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub stale_cancelled: usize,
    pub cache_purged: usize,
}

/// 同一の読み込みリクエストを一つのネットワーク呼び出しにまとめる
pub struct RequestDeduplicator {
    state: Arc<Mutex<DedupState>>,
    config: DedupConfig,
    key_fn: Option<KeyFn>,
    executed: AtomicU64,
    joined: AtomicU64,
    cache_hits: AtomicU64,
}

impl RequestDeduplicator {
    pub fn new(config: DedupConfig) -> Self {
        let cache = config
            .cache_ttl()
            .map(|ttl| ResponseCache::new(config.max_cached_responses, ttl));
        Self {
            state: Arc::new(Mutex::new(DedupState {
                pending: HashMap::new(),
                cache,
                next_generation: 0,
            })),
            config,
            key_fn: None,
            executed: AtomicU64::new(0),
            joined: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    /// キー導出を差し替える
    pub fn with_key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&RequestDescriptor) -> RequestKey + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    pub fn key_for(&self, request: &RequestDescriptor) -> RequestKey {
        match &self.key_fn {
            Some(key_fn) => key_fn(request),
            None => RequestKey::from_descriptor(request),
        }
    }

    /// GET（読み込み）か強制ヘッダー付きなら対象。無効化ヘッダーが最優先
    pub fn should_deduplicate(&self, request: &RequestDescriptor) -> bool {
        if !self.config.enabled || request.header_flag(NO_DEDUPE_HEADER) {
            return false;
        }
        request.header_flag(DEDUPE_HEADER) || request.method.is_read()
    }

    /// `executor` は同一キーで同時に発行されたリクエストの中で一度だけ呼ばれる
    ///
    /// 制御ヘッダーは `executor` に渡す前に取り除く。
    pub async fn deduplicate<F, Fut>(
        &self,
        mut request: RequestDescriptor,
        executor: F,
    ) -> Result<ApiResponse>
    where
        F: FnOnce(RequestDescriptor, CancellationToken) -> Fut,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        let dedupe = self.should_deduplicate(&request);
        request.remove_header(DEDUPE_HEADER);
        request.remove_header(NO_DEDUPE_HEADER);

        if !dedupe {
            self.executed.fetch_add(1, Ordering::Relaxed);
            return executor(request, CancellationToken::new()).await;
        }

        let key = self.key_for(&request);
        let shared = {
            let mut state = self.lock();

            if let Some(cached) = state.cache.as_mut().and_then(|cache| cache.get(key.as_str())) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "serving request from response cache");
                return Ok(cached);
            }

            if let Some(pending) = state.pending.get(&key) {
                self.joined.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "joining in-flight request");
                pending.future.clone()
            } else {
                while state.pending.len() >= self.config.max_pending.max(1) {
                    match state.evict_oldest() {
                        Some(evicted) => {
                            warn!(key = %evicted, "pending request limit reached, cancelled oldest")
                        }
                        None => break,
                    }
                }

                let generation = state.next_generation;
                state.next_generation += 1;

                let cancel = CancellationToken::new();
                let shared = cancellable(executor(request, cancel.clone()), cancel.clone());
                state.pending.insert(
                    key.clone(),
                    PendingRequest {
                        generation,
                        future: shared.clone(),
                        cancel,
                        created_at: Instant::now(),
                    },
                );
                self.executed.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, generation, "dispatching deduplicated request");

                self.spawn_settlement(key, generation, shared.clone());
                shared
            }
        };

        shared.await
    }

    /// 完了後のキャッシュ登録と猶予期間後の削除。呼び出し側が全員離れても走る
    fn spawn_settlement(&self, key: RequestKey, generation: u64, shared: SharedResponse) {
        let state = Arc::clone(&self.state);
        let grace = self.config.grace_period();

        tokio::spawn(async move {
            let result = shared.await;
            match result {
                Ok(response) => {
                    {
                        let mut state = lock_state(&state);
                        let still_current = state
                            .pending
                            .get(&key)
                            .map(|pending| pending.generation == generation)
                            .unwrap_or(false);
                        if still_current && response.is_success() {
                            if let Some(cache) = state.cache.as_mut() {
                                cache.set(key.as_str().to_string(), response);
                            }
                        }
                    }
                    if !grace.is_zero() {
                        tokio::time::sleep(grace).await;
                    }
                    lock_state(&state).remove_if_current(&key, generation);
                }
                Err(err) => {
                    if lock_state(&state).remove_if_current(&key, generation) {
                        debug!(key = %key, error = %err, "deduplicated request failed");
                    }
                }
            }
        });
    }

    /// 実行中のリクエストを中断し、管理情報をすぐに取り除く
    pub fn cancel_request(&self, request: &RequestDescriptor) -> bool {
        let key = self.key_for(request);
        match self.lock().pending.remove(&key) {
            Some(pending) => {
                pending.cancel.cancel();
                info!(key = %key, "cancelled pending request");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all_requests(&self) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut state = self.lock();
            state.pending.drain().map(|(_, pending)| pending).collect()
        };
        for pending in &drained {
            pending.cancel.cancel();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "cancelled all pending requests");
        }
        drained.len()
    }

    /// 古すぎる実行中リクエストと期限切れキャッシュを掃除する
    pub fn sweep(&self) -> SweepReport {
        let stale_after = self.config.stale_after();
        let now = Instant::now();
        let mut state = self.lock();

        let stale: Vec<RequestKey> = state
            .pending
            .iter()
            .filter(|(_, pending)| now.duration_since(pending.created_at) >= stale_after)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            if let Some(pending) = state.pending.remove(key) {
                pending.cancel.cancel();
                warn!(key = %key, "cancelled stale pending request");
            }
        }

        let cache_purged = state
            .cache
            .as_mut()
            .map(ResponseCache::cleanup_expired)
            .unwrap_or(0);

        SweepReport {
            stale_cancelled: stale.len(),
            cache_purged,
        }
    }

    /// 前方一致するキャッシュ済みレスポンスを破棄する（例: `"GET:/jobs"`）
    pub fn invalidate_cache(&self, prefix: &str) -> usize {
        let removed = self
            .lock()
            .cache
            .as_mut()
            .map(|cache| cache.delete_prefix(prefix))
            .unwrap_or(0);
        if removed > 0 {
            debug!(prefix, removed, "invalidated cached responses");
        }
        removed
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = self.lock().cache.as_mut() {
            cache.clear();
        }
    }

    pub fn is_pending(&self, request: &RequestDescriptor) -> bool {
        let key = self.key_for(request);
        self.lock().pending.contains_key(&key)
    }

    pub fn stats(&self) -> DedupStats {
        let state = self.lock();
        DedupStats {
            pending: state.pending.len(),
            cached: state.cache.as_ref().map(ResponseCache::size).unwrap_or(0),
            executed: self.executed.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.config.cleanup_interval()
    }

    fn lock(&self) -> MutexGuard<'_, DedupState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<DedupState>) -> MutexGuard<'_, DedupState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn cancellable<Fut>(operation: Fut, cancel: CancellationToken) -> SharedResponse
where
    Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
{
    async move {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled("request was cancelled".to_string())),
            result = operation => result,
        }
    }
    .boxed()
    .shared()
}
