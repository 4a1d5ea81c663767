pub mod api_client;
pub mod job_service;
pub mod optimistic_update_service;
pub mod request_deduplicator;
pub mod session_service;
pub mod storage_service;
pub mod token_refresh;

pub use api_client::ApiClient;
pub use job_service::JobService;
pub use optimistic_update_service::{OptimisticUpdateManager, SubscriptionId, UpdateListener};
pub use request_deduplicator::{DedupStats, KeyFn, RequestDeduplicator, SweepReport};
pub use session_service::{SessionCheck, SessionService};
pub use storage_service::StorageService;
pub use token_refresh::TokenRefreshCoordinator;
