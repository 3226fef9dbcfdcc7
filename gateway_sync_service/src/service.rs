// Licensed under the MIT License.

//! Top-level wiring for one manager instance: owns the connector registry, the event
//! router, and the reverse-mode gateway-client service, and implements the admin
//! surface over them. Analogous to `ApplicationContext`, the single object an embedder
//! constructs and hands its collaborators to.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gateway_sync_connector::{ConnectorRegistry, EventRouter, RouteDecision};
use gateway_sync_protocol::error::{GatewaySyncError, Result};
use gateway_sync_protocol::id_map::IdMapper;
use gateway_sync_protocol::model::{Asset, GatewayAsset, GatewayConnection};
use gateway_sync_protocol::transport::ChannelEndpoint;
use gateway_sync_store::{AssetStore, EventBus, InMemoryAssetStore, TokenProvider};
use tokio::sync::RwLock;

use crate::admin::AdminGatewayApi;
use crate::config::GatewaySyncConfig;
use crate::gateway_client_service::GatewayClientService;

/// One manager instance's gateway synchronization subsystem: the connector side
/// (inbound gateway connections) and the reverse-client side (outbound connections to
/// another manager's gateway endpoint), wired over a shared asset store.
pub struct GatewaySyncService {
    store: Arc<dyn AssetStore>,
    config: GatewaySyncConfig,
    registry: Arc<ConnectorRegistry>,
    router: EventRouter,
    client_service: Arc<GatewayClientService>,
    connections: RwLock<HashMap<String, GatewayConnection>>,
}

impl GatewaySyncService {
    /// `reverse_store` backs the reverse-mode gateway clients' own local asset store
    /// (what this manager serves when another manager dials it as a gateway); it is
    /// deliberately separate from `store`, the manager-side mirror.
    #[must_use]
    pub fn new(
        store: Arc<dyn AssetStore>,
        bus: Arc<dyn EventBus>,
        reverse_store: Arc<dyn AssetStore>,
        token_provider: Arc<dyn TokenProvider>,
        config: GatewaySyncConfig,
    ) -> Arc<Self> {
        let id_mapper = Arc::new(IdMapper::new());
        let registry = ConnectorRegistry::new(store.clone(), bus, id_mapper);
        let router = EventRouter::new(store.clone(), registry.clone());
        let client_service = GatewayClientService::new(reverse_store, token_provider, config.client_config());
        Arc::new(Self {
            store,
            config,
            registry,
            router,
            client_service,
            connections: RwLock::new(HashMap::new()),
        })
    }

    /// A service backed by a fresh in-memory store for reverse-mode gateway clients,
    /// for embedders that do not run in reverse mode.
    #[must_use]
    pub fn with_default_reverse_store(
        store: Arc<dyn AssetStore>,
        bus: Arc<dyn EventBus>,
        token_provider: Arc<dyn TokenProvider>,
        config: GatewaySyncConfig,
    ) -> Arc<Self> {
        Self::new(store, bus, Arc::new(InMemoryAssetStore::new()), token_provider, config)
    }

    /// Registers a newly-created gateway asset's connector, starting in
    /// `DISCONNECTED`. Idempotent for an already-registered gateway id.
    pub fn register_gateway(&self, gateway: GatewayAsset) {
        self.registry.register(gateway, self.config.connector_config());
    }

    /// Accepts a newly-opened inbound channel for `gateway_id` and drives its
    /// connection lifecycle to completion. The caller (the WebSocket accept loop, an
    /// external collaborator) resolves `gateway_id` from the connection's realm/path
    /// before calling this.
    ///
    /// # Errors
    /// See [`ConnectorRegistry::accept_connection`].
    pub async fn accept_gateway_connection(&self, gateway_id: &str, endpoint: ChannelEndpoint) -> Result<()> {
        self.registry.accept_connection(gateway_id, endpoint).await
    }

    /// Disables a registered gateway's connector.
    ///
    /// # Errors
    /// See [`ConnectorRegistry::disable`].
    pub async fn disable_gateway(&self, gateway_id: &str) -> Result<()> {
        self.registry.disable(gateway_id).await
    }

    /// Re-enables a previously-disabled gateway.
    ///
    /// # Errors
    /// See [`ConnectorRegistry::enable`].
    pub fn enable_gateway(&self, gateway_id: &str) -> Result<()> {
        self.registry.enable(gateway_id)
    }

    /// Tears down a deleted gateway's connector and mirrored subtree.
    ///
    /// # Errors
    /// See [`ConnectorRegistry::delete`].
    pub async fn delete_gateway(&self, gateway_id: &str) -> Result<()> {
        self.registry.delete(gateway_id).await
    }

    /// Routes a local attribute write, forwarding it to the owning gateway's connector
    /// if the target is a mirrored descendant.
    ///
    /// # Errors
    /// See [`EventRouter::route_attribute_write`].
    pub async fn route_attribute_write(
        &self,
        asset_id: &str,
        attribute_name: &str,
        value: Option<serde_json::Value>,
        timestamp: i64,
    ) -> Result<RouteDecision> {
        self.router
            .route_attribute_write(asset_id, attribute_name, value, timestamp)
            .await
    }

    /// Walks `asset_id` and its ancestors, including itself, for the nearest gateway
    /// asset. Unlike [`EventRouter`]'s ancestor-only walk (which must never divert a
    /// write targeting the gateway asset's own attributes), a create forwarded
    /// directly under the gateway asset must resolve to that same gateway.
    async fn owning_gateway_id(&self, asset_id: &str) -> Option<String> {
        let mut current = self.store.get(asset_id).await?;
        loop {
            if current.is_gateway() {
                return Some(current.id().clone());
            }
            let parent_id = current.parent_id().clone()?;
            current = self.store.get(&parent_id).await?;
        }
    }
}

#[async_trait]
impl AdminGatewayApi for GatewaySyncService {
    async fn create_or_replace_connection(&self, realm: &str, connection: GatewayConnection) -> Result<()> {
        self.connections.write().await.insert(realm.to_string(), connection.clone());
        self.client_service.start(connection).await;
        Ok(())
    }

    async fn list_connections(&self, realm: &str) -> Vec<GatewayConnection> {
        self.connections.read().await.get(realm).cloned().into_iter().collect()
    }

    async fn remove_connection(&self, realm: &str) -> Result<()> {
        self.connections.write().await.remove(realm);
        self.client_service.stop(realm).await;
        Ok(())
    }

    async fn forward_asset_create(&self, parent_mirrored_id: &str, asset: Asset) -> Result<Asset> {
        let gateway_id = self
            .owning_gateway_id(parent_mirrored_id)
            .await
            .ok_or_else(|| GatewaySyncError::UnsupportedOperation {
                asset_id: parent_mirrored_id.to_string(),
            })?;
        let connector = self.registry.get(&gateway_id).ok_or_else(|| GatewaySyncError::GatewayNotConnected {
            gateway_id: gateway_id.clone(),
        })?;
        connector.forward_asset_mutation(parent_mirrored_id, asset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_sync_protocol::model::GatewayCredentials;
    use gateway_sync_store::{InMemoryEventBus, StaticTokenProvider};

    fn service() -> Arc<GatewaySyncService> {
        GatewaySyncService::with_default_reverse_store(
            Arc::new(InMemoryAssetStore::new()),
            Arc::new(InMemoryEventBus::new(16)),
            Arc::new(StaticTokenProvider::accepting("tok")),
            GatewaySyncConfig::default(),
        )
    }

    fn gateway(id: &str) -> GatewayAsset {
        GatewayAsset::new(
            id,
            "master",
            GatewayCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
        )
    }

    fn connection(realm: &str) -> GatewayConnection {
        GatewayConnection {
            realm: realm.to_string(),
            host: "manager.example".to_string(),
            port: 443,
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            secure: true,
            disabled: false,
        }
    }

    #[tokio::test]
    async fn create_or_replace_then_list_round_trips() {
        let service = service();
        service.create_or_replace_connection("realmA", connection("realmA")).await.unwrap();
        let listed = service.list_connections("realmA").await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].realm, "realmA");
    }

    #[tokio::test]
    async fn remove_connection_clears_the_listing() {
        let service = service();
        service.create_or_replace_connection("realmA", connection("realmA")).await.unwrap();
        service.remove_connection("realmA").await.unwrap();
        assert!(service.list_connections("realmA").await.is_empty());
    }

    #[tokio::test]
    async fn forward_asset_create_fails_for_unknown_parent() {
        let service = service();
        let err = service
            .forward_asset_create("no-such-asset", Asset::new("room1", 1, "Room 1", "Room", None, "master", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewaySyncError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn forward_asset_create_fails_while_gateway_disconnected() {
        let service = service();
        let gw = gateway("gw000000000000000000000");
        service
            .store
            .put(Asset::new(gw.id.clone(), 1, "gw", "Gateway", None, gw.realm.clone(), 0))
            .await
            .unwrap();
        service.register_gateway(gw.clone());
        let err = service
            .forward_asset_create(&gw.id, Asset::new("room1", 1, "Room 1", "Room", None, gw.realm.clone(), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewaySyncError::GatewayNotConnected { .. }));
    }
}
