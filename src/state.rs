use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Mutex;
use tracing::info;

use crate::application::ports::{AuthGateway, CollectionStore, HttpTransport, KeyValueStore};
use crate::application::services::{
    ApiClient, JobService, OptimisticUpdateManager, RequestDeduplicator, SessionService,
    StorageService, TokenRefreshCoordinator,
};
use crate::domain::entities::SessionData;
use crate::infrastructure::http::{HttpAuthGateway, ReqwestTransport};
use crate::infrastructure::jobs::{DedupSweepJob, PeriodicJob, SessionMonitorJob};
use crate::infrastructure::navigation::WatchNavigator;
use crate::infrastructure::storage::{
    FileKeyValueStore, MemoryKeyValueStore, SqliteCollectionStore,
};
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::config::AppConfig;

/// 外部とつながるポートの実装一式
pub struct AppPorts {
    pub durable: Arc<dyn KeyValueStore>,
    pub session: Arc<dyn KeyValueStore>,
    pub collections: Arc<dyn CollectionStore>,
    pub transport: Arc<dyn HttpTransport>,
    pub gateway: Arc<dyn AuthGateway>,
    pub clock: Arc<dyn Clock>,
}

/// アプリケーション全体の状態を管理する構造体
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<StorageService>,
    pub deduplicator: Arc<RequestDeduplicator>,
    pub optimistic: Arc<OptimisticUpdateManager>,
    pub tokens: Arc<TokenRefreshCoordinator>,
    pub sessions: Arc<SessionService>,
    pub api: ApiClient,
    pub jobs: Arc<JobService>,
    pub navigator: Arc<WatchNavigator>,
    background: Arc<Mutex<Vec<PeriodicJob>>>,
}

impl AppState {
    /// 既定の実装（ファイル + SQLite + reqwest）で組み立てる
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(|err| anyhow::anyhow!("invalid configuration: {err}"))?;

        let durable = FileKeyValueStore::open(config.storage.durable_path())
            .await
            .context("failed to open durable store")?;
        let collections = SqliteCollectionStore::connect(&config.storage.collections_url)
            .await
            .context("failed to open collection store")?;
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(&config.api).context("failed to build transport")?);
        let gateway = Arc::new(HttpAuthGateway::new(
            config.api.base_url.clone(),
            Arc::clone(&transport),
        ));

        let ports = AppPorts {
            durable: Arc::new(durable),
            session: Arc::new(MemoryKeyValueStore::new()),
            collections: Arc::new(collections),
            transport,
            gateway,
            clock: Arc::new(SystemClock),
        };
        Ok(Self::from_ports(config, ports))
    }

    /// 任意のポート実装から組み立てる
    pub fn from_ports(config: AppConfig, ports: AppPorts) -> Self {
        let storage = Arc::new(StorageService::new(
            ports.durable,
            ports.session,
            ports.collections,
        ));
        let navigator = Arc::new(WatchNavigator::new("/"));
        let deduplicator = Arc::new(RequestDeduplicator::new(config.dedup.clone()));
        let optimistic = Arc::new(OptimisticUpdateManager::new(config.optimistic.clone()));
        let tokens = Arc::new(
            TokenRefreshCoordinator::new(
                Arc::clone(&storage),
                Arc::clone(&ports.gateway),
                Arc::clone(&ports.clock),
                config.session.clone(),
            )
            .with_navigator(navigator.clone()),
        );
        let sessions = Arc::new(SessionService::new(
            Arc::clone(&storage),
            ports.gateway,
            Arc::clone(&tokens),
            ports.clock,
            config.session.clone(),
        ));
        let api = ApiClient::new(
            &config.api.base_url,
            ports.transport,
            Arc::clone(&tokens),
            Arc::clone(&deduplicator),
        );
        let jobs = Arc::new(JobService::new(
            api.clone(),
            Arc::clone(&storage),
            Arc::clone(&optimistic),
        ));

        Self {
            config: Arc::new(config),
            storage,
            deduplicator,
            optimistic,
            tokens,
            sessions,
            api,
            jobs,
            navigator,
            background: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 保存済みのセッションと保存済み求人を読み戻す
    pub async fn restore(&self) -> Option<SessionData> {
        let session = self.sessions.restore().await;
        let saved = self.jobs.load_saved_jobs().await;
        info!(restored = session.is_some(), saved_jobs = saved, "state restored");
        session
    }

    /// 重複排除の掃除とセッション監視を開始する。二重起動はしない
    pub async fn start_background_jobs(&self) {
        let mut background = self.background.lock().await;
        if !background.is_empty() {
            return;
        }
        background.push(DedupSweepJob::new(Arc::clone(&self.deduplicator)).start());
        background.push(
            SessionMonitorJob::new(Arc::clone(&self.sessions))
                .start(self.config.session.check_interval()),
        );
        info!(jobs = background.len(), "background jobs started");
    }

    pub async fn background_job_count(&self) -> usize {
        self.background.lock().await.len()
    }

    /// サインアウトし、未確定の楽観的更新と実行中のリクエストを破棄する
    pub async fn sign_out(&self) {
        self.optimistic.clear_all();
        self.deduplicator.cancel_all_requests();
        self.deduplicator.clear_cache();
        self.sessions.sign_out().await;
    }

    pub async fn shutdown(&self) {
        let jobs: Vec<PeriodicJob> = self.background.lock().await.drain(..).collect();
        for job in jobs {
            job.shutdown().await;
        }
        self.deduplicator.cancel_all_requests();
        info!("application state shut down");
    }
}
