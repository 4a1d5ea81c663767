pub mod job;
pub mod optimistic_update;
pub mod request;
pub mod session;

pub use job::{Job, JobPage};
pub use optimistic_update::{
    OperationKind, OptimisticUpdate, OptimisticUpdateDraft, RollbackAction, UpdateStatus,
};
pub use request::{ApiResponse, HttpMethod, RequestDescriptor};
pub use session::{
    ActivityKind, AuthStateBlob, AuthStatus, SessionData, TokenData, UserProfile,
};
