// Licensed under the MIT License.

//! Top-level wiring for the gateway synchronization subsystem: the admin surface
//! contract, the reverse-mode gateway-client service, and process-wide configuration.

pub mod admin;
pub mod config;
pub mod gateway_client_service;
pub mod service;

pub use admin::AdminGatewayApi;
pub use config::{GatewaySyncConfig, GatewaySyncConfigBuilder};
pub use gateway_client_service::GatewayClientService;
pub use service::GatewaySyncService;
