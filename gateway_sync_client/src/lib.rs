// Licensed under the MIT License.

//! Gateway-side client: the mirror image of the manager's connector. Serves inventory
//! reads, applies forwarded mutations, and reconnects with exponential backoff.

pub mod backoff;
pub mod client;
pub mod config;

pub use backoff::Backoff;
pub use client::GatewayClient;
pub use config::{ClientConfig, ClientConfigBuilder};
