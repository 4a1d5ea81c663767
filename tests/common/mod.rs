#![allow(dead_code)]

pub mod fake_backend;

use std::sync::Arc;
use std::time::Duration;

use careerhub_lib::application::ports::KeyValueStore;
use careerhub_lib::infrastructure::http::HttpAuthGateway;
use careerhub_lib::infrastructure::storage::{MemoryCollectionStore, MemoryKeyValueStore};
use careerhub_lib::shared::clock::ManualClock;
use careerhub_lib::{AppConfig, AppPorts, AppState};

pub use fake_backend::{BASE_URL, FakeBackend, RecordedCall};

/// 2026-01-01T00:00:00Z
pub const START_MILLIS: i64 = 1_767_225_600_000;

pub struct TestApp {
    pub state: AppState,
    pub backend: Arc<FakeBackend>,
    pub clock: Arc<ManualClock>,
    pub durable: Arc<dyn KeyValueStore>,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.api.base_url = BASE_URL.to_string();
    config
}

/// 偽バックエンドとメモリストアで組み立てる
pub fn build_app(config: AppConfig, latency: Duration) -> TestApp {
    let backend = FakeBackend::new(latency);
    let clock = Arc::new(ManualClock::new(START_MILLIS));
    let durable: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    let state = assemble(config, backend.clone(), clock.clone(), durable.clone());
    TestApp {
        state,
        backend,
        clock,
        durable,
    }
}

/// 同じ永続ストアと新しいセッションストアで組み直す（ページ再読み込み相当）
pub fn reload(app: &TestApp, config: AppConfig) -> TestApp {
    let state = assemble(
        config,
        app.backend.clone(),
        app.clock.clone(),
        app.durable.clone(),
    );
    TestApp {
        state,
        backend: app.backend.clone(),
        clock: app.clock.clone(),
        durable: app.durable.clone(),
    }
}

fn assemble(
    config: AppConfig,
    backend: Arc<FakeBackend>,
    clock: Arc<ManualClock>,
    durable: Arc<dyn KeyValueStore>,
) -> AppState {
    let gateway = Arc::new(HttpAuthGateway::new(BASE_URL, backend.clone()));
    AppState::from_ports(
        config,
        AppPorts {
            durable,
            session: Arc::new(MemoryKeyValueStore::new()),
            collections: Arc::new(MemoryCollectionStore::new()),
            transport: backend,
            gateway,
            clock,
        },
    )
}
