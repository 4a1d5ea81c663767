pub mod constants;
pub mod entities;
pub mod value_objects;

pub use entities::{
    ActivityKind, ApiResponse, AuthStateBlob, AuthStatus, HttpMethod, Job, JobPage,
    OperationKind, OptimisticUpdate, OptimisticUpdateDraft, RequestDescriptor, SessionData,
    TokenData, UpdateStatus, UserProfile,
};
pub use value_objects::{DeviceId, EntityId, EntityType, OptimisticUpdateId, RequestKey};
