// Licensed under the MIT License.

//! REST-shaped operations over reverse gateway-client connections and forwarded asset
//! mutations. No HTTP framework sits behind this trait; it is the seam an actual REST
//! layer would plug into, in the same shape as
//! `azure_iot_operations_services::azure_device_registry::client`'s service-client
//! traits rather than hand-rolled HTTP handlers.

use async_trait::async_trait;
use gateway_sync_protocol::error::Result;
use gateway_sync_protocol::model::{Asset, GatewayConnection};

/// Operations the admin REST surface exposes over the gateway synchronization
/// subsystem. `realm` scopes every connection operation, matching how gateway-client
/// configuration is stored per realm.
#[async_trait]
pub trait AdminGatewayApi: Send + Sync {
    /// `POST /gateway/{realm}/connections` — creates or replaces the reverse
    /// gateway-client connection for `realm`.
    async fn create_or_replace_connection(&self, realm: &str, connection: GatewayConnection) -> Result<()>;

    /// `GET /gateway/{realm}/connections` — every connection configured for `realm`.
    /// A realm has at most one connection in this implementation, so the result is
    /// always zero or one entries long.
    async fn list_connections(&self, realm: &str) -> Vec<GatewayConnection>;

    /// `DELETE /gateway/{realm}/connections/{id}` — removes the connection for
    /// `realm`, stopping its client if running. A no-op if none is configured.
    async fn remove_connection(&self, realm: &str) -> Result<()>;

    /// `POST /assets` under a gateway parent — creates `asset` as a child of
    /// `parent_mirrored_id`, forwarded per §4.4. Returns
    /// [`gateway_sync_protocol::GatewaySyncError::GatewayNotConnected`] (surfaced as
    /// HTTP 409 by the real REST layer) if the owning gateway is not connected.
    async fn forward_asset_create(&self, parent_mirrored_id: &str, asset: Asset) -> Result<Asset>;
}
