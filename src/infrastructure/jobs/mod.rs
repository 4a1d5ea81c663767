pub mod dedup_sweep_job;
pub mod periodic;
pub mod session_monitor_job;

pub use dedup_sweep_job::DedupSweepJob;
pub use periodic::PeriodicJob;
pub use session_monitor_job::SessionMonitorJob;
