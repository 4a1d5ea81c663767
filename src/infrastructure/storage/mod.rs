pub mod collection_store;
pub mod file_store;
pub mod memory_store;

pub use collection_store::{MemoryCollectionStore, SqliteCollectionStore};
pub use file_store::FileKeyValueStore;
pub use memory_store::MemoryKeyValueStore;
