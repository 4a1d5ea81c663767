use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 一定間隔でタスクを実行するバックグラウンドジョブ
///
/// 最初の実行は一周期後。ハンドルを drop するとループも止まる。
pub struct PeriodicJob {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicJob {
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut task: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let period = period.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(job = name, period_ms = period.as_millis() as u64, "periodic job started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => task().await,
                }
            }
            debug!(job = name, "periodic job stopped");
        });

        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// 停止を要求し、ループの終了を待つ
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!(job = self.name, "periodic job shut down");
    }
}

impl Drop for PeriodicJob {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
