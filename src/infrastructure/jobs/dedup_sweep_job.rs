use std::sync::Arc;

use tracing::info;

use super::periodic::PeriodicJob;
use crate::application::services::request_deduplicator::{RequestDeduplicator, SweepReport};

/// 古い実行中リクエストと期限切れキャッシュを定期的に掃除する
pub struct DedupSweepJob {
    deduplicator: Arc<RequestDeduplicator>,
}

impl DedupSweepJob {
    pub fn new(deduplicator: Arc<RequestDeduplicator>) -> Self {
        Self { deduplicator }
    }

    pub fn run_once(&self) -> SweepReport {
        let report = self.deduplicator.sweep();
        if report.stale_cancelled > 0 || report.cache_purged > 0 {
            info!(
                stale_cancelled = report.stale_cancelled,
                cache_purged = report.cache_purged,
                "dedup sweep completed"
            );
        }
        report
    }

    pub fn start(self) -> PeriodicJob {
        let period = self.deduplicator.cleanup_interval();
        let job = Arc::new(self);
        PeriodicJob::spawn("dedup-sweep", period, move || {
            let job = Arc::clone(&job);
            async move {
                job.run_once();
            }
        })
    }
}
