// Licensed under the MIT License.

use std::time::Duration;

use derive_builder::Builder;

/// Tunables for one [`GatewayClient`](crate::client::GatewayClient).
#[derive(Clone, Debug, Builder)]
#[builder(setter(into), default)]
pub struct ClientConfig {
    #[builder(default = "Duration::from_secs(2)")]
    pub reconnect_initial_backoff: Duration,
    #[builder(default = "Duration::from_secs(60)")]
    pub reconnect_max_backoff: Duration,
    /// Bound on the decoded-frame queue between the socket reader task and the
    /// request/event dispatch loop.
    #[builder(default = "10_000")]
    pub inbound_queue_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfigBuilder::default().build().expect("statically valid defaults")
    }
}
