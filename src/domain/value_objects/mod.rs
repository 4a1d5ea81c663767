pub mod device_id;
pub mod entity_id;
pub mod entity_type;
pub mod optimistic_update_id;
pub mod request_key;

pub use device_id::DeviceId;
pub use entity_id::EntityId;
pub use entity_type::EntityType;
pub use optimistic_update_id::OptimisticUpdateId;
pub use request_key::RequestKey;
