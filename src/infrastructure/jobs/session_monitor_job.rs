use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::periodic::PeriodicJob;
use crate::application::services::session_service::{SessionCheck, SessionService};

/// セッションの期限を定期的に確認し、必要ならリフレッシュまたは破棄する
pub struct SessionMonitorJob {
    sessions: Arc<SessionService>,
}

impl SessionMonitorJob {
    pub fn new(sessions: Arc<SessionService>) -> Self {
        Self { sessions }
    }

    pub async fn run_once(&self) -> SessionCheck {
        let check = self.sessions.check_expiry().await;
        match check {
            SessionCheck::Active { remaining_millis } => {
                debug!(remaining_millis, "session active")
            }
            SessionCheck::Refreshed => info!("session tokens refreshed by monitor"),
            SessionCheck::Expired => info!("session expired by monitor"),
            SessionCheck::NoSession => {}
        }
        check
    }

    pub fn start(self, period: Duration) -> PeriodicJob {
        let job = Arc::new(self);
        PeriodicJob::spawn("session-monitor", period, move || {
            let job = Arc::clone(&job);
            async move {
                job.run_once().await;
            }
        })
    }
}
