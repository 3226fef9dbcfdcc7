// Licensed under the MIT License.

use std::time::Duration;

use derive_builder::Builder;

/// Tunables for one [`GatewayConnector`](crate::connector::GatewayConnector), per the
/// concurrency model's suspension-point timeouts and the sync protocol's batch size.
#[derive(Clone, Debug, Builder)]
#[builder(setter(into), default)]
pub struct ConnectorConfig {
    /// Number of asset ids fetched per `ReadAssetsEvent` during inventory sync.
    #[builder(default = "20")]
    pub sync_asset_batch_size: usize,
    /// Deadline for the initial index read and each subsequent batch read.
    #[builder(default = "Duration::from_secs(10)")]
    pub batch_read_timeout: Duration,
    /// Deadline for a forwarded write-through request to the gateway.
    #[builder(default = "Duration::from_secs(5)")]
    pub write_forward_timeout: Duration,
    /// Bound on the decoded-frame queue between the socket reader task and
    /// [`GatewayConnector::run_connection`](crate::connector::GatewayConnector::run_connection)'s
    /// event loop, and on the raw-frame queue underlying the channel itself.
    #[builder(default = "10_000")]
    pub inbound_queue_capacity: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        ConnectorConfigBuilder::default()
            .build()
            .expect("statically valid defaults")
    }
}
