// Licensed under the MIT License.

//! Manager-side per-gateway connector state machine, mirror reconciler, event router
//! and connector registry — the "server side" half of the gateway synchronization
//! subsystem.

pub mod config;
pub mod connector;
pub mod reconciler;
pub mod registry;
pub mod router;

pub use config::{ConnectorConfig, ConnectorConfigBuilder};
pub use connector::GatewayConnector;
pub use reconciler::{BatchReport, MirrorReconciler};
pub use registry::ConnectorRegistry;
pub use router::{EventRouter, RouteDecision};
