pub mod auth_gateway;
pub mod collection_store;
pub mod http_transport;
pub mod key_value_store;
pub mod navigator;

pub use auth_gateway::{AuthGateway, Credentials, SignInGrant, TokenGrant};
pub use collection_store::CollectionStore;
pub use http_transport::HttpTransport;
pub use key_value_store::{KeyValueStore, StoreScope};
pub use navigator::SignInNavigator;
