use tracing::info;

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use shared::{AppConfig, AppError, Result};
pub use state::{AppPorts, AppState};

/// 設定を環境変数から読み込み、全サービスを組み立てる
pub async fn bootstrap() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env();
    let state = AppState::new(config).await?;
    state.restore().await;
    state.start_background_jobs().await;
    info!("careerhub client core ready");
    Ok(state)
}

/// `RUST_LOG` が未設定なら `careerhub_lib=debug,info` で tracing を初期化する
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "careerhub_lib=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
