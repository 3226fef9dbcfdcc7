// Licensed under the MIT License.

//! Ambient configuration for one manager instance's gateway synchronization subsystem,
//! in the same shape as `CommandInvokerOptionsBuilder`/`ApplicationContextOptionsBuilder`:
//! one `derive_builder`-generated builder with sensible per-field defaults, so an
//! embedder only overrides what it needs to.

use std::time::Duration;

use derive_builder::Builder;
use gateway_sync_client::ClientConfig;
use gateway_sync_connector::ConnectorConfig;

/// Process-wide tunables for the gateway synchronization subsystem. Per-gateway
/// connectors and clients are constructed from the relevant subset of this
/// configuration rather than each gateway carrying its own copy.
#[derive(Clone, Debug, Builder)]
#[builder(setter(into), default)]
pub struct GatewaySyncConfig {
    /// Number of asset ids fetched per inventory-sync batch. Default 20, per §4.4.
    #[builder(default = "20")]
    pub sync_asset_batch_size: usize,
    /// Deadline for the initial index read and each batch read. Default 10s, per §5.
    #[builder(default = "Duration::from_secs(10)")]
    pub batch_read_timeout: Duration,
    /// Deadline for a forwarded write-through request. Default 5s, per §5.
    #[builder(default = "Duration::from_secs(5)")]
    pub write_forward_timeout: Duration,
    /// Initial reconnect backoff for gateway clients. Default 2s, per §4.5.
    #[builder(default = "Duration::from_secs(2)")]
    pub reconnect_initial_backoff: Duration,
    /// Reconnect backoff ceiling for gateway clients. Default 60s, per §4.5.
    #[builder(default = "Duration::from_secs(60)")]
    pub reconnect_max_backoff: Duration,
    /// Bound on the decoded-frame queue between a connection's socket reader task and
    /// the code that consumes it, on both the connector and the client side. Default
    /// 10,000, per §5's backpressure requirement ("unbounded queuing is a defect").
    #[builder(default = "10_000")]
    pub inbound_queue_capacity: usize,
}

impl Default for GatewaySyncConfig {
    fn default() -> Self {
        GatewaySyncConfigBuilder::default()
            .build()
            .expect("statically valid defaults")
    }
}

impl GatewaySyncConfig {
    /// The slice of this configuration the manager-side connector cares about.
    #[must_use]
    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            sync_asset_batch_size: self.sync_asset_batch_size,
            batch_read_timeout: self.batch_read_timeout,
            write_forward_timeout: self.write_forward_timeout,
            inbound_queue_capacity: self.inbound_queue_capacity,
        }
    }

    /// The slice of this configuration a reverse-mode gateway client cares about.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            reconnect_initial_backoff: self.reconnect_initial_backoff,
            reconnect_max_backoff: self.reconnect_max_backoff,
            inbound_queue_capacity: self.inbound_queue_capacity,
        }
    }
}
