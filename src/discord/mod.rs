//! Discord adapter: gateway connection and REST client

pub mod gateway;
pub mod rest;
pub mod types;

pub use gateway::{GatewayClient, GatewayConfig, GatewayEvent};
pub use rest::RestClient;
