pub mod auth_gateway;
pub mod reqwest_transport;

pub use auth_gateway::HttpAuthGateway;
pub use reqwest_transport::ReqwestTransport;
