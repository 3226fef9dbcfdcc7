// Licensed under the MIT License.

//! Directs local attribute writes whose target is a gateway descendant to that
//! gateway's connector instead of applying them locally, per the event router's
//! component design (§4.7).

use std::sync::Arc;

use gateway_sync_protocol::error::Result;
use gateway_sync_store::AssetStore;

use crate::registry::ConnectorRegistry;

/// What the caller should do with a routed attribute write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// The target is not a gateway descendant; the caller proceeds with its normal
    /// local write path (out of scope here — the asset store is an external
    /// collaborator).
    Local,
    /// The write was forwarded to the named gateway's connector. The caller must not
    /// also apply it locally: the eventual echoed sensor value updates the mirror.
    Diverted { gateway_id: String },
}

/// Consults the asset store's ancestor chain for every local attribute write and
/// diverts it to the owning gateway's connector when appropriate. Diversion is
/// transparent to the submitter.
pub struct EventRouter {
    store: Arc<dyn AssetStore>,
    registry: Arc<ConnectorRegistry>,
}

impl EventRouter {
    #[must_use]
    pub fn new(store: Arc<dyn AssetStore>, registry: Arc<ConnectorRegistry>) -> Self {
        Self { store, registry }
    }

    /// Routes one attribute write. If the target's ancestor chain contains a gateway
    /// asset, forwards it to that gateway's connector and returns
    /// [`RouteDecision::Diverted`]; otherwise returns [`RouteDecision::Local`] and
    /// applies nothing.
    ///
    /// # Errors
    /// Returns [`gateway_sync_protocol::GatewaySyncError::GatewayNotConnected`] if the
    /// owning gateway has no running connector, or whatever
    /// [`crate::connector::GatewayConnector::forward_attribute_write`] returns.
    pub async fn route_attribute_write(
        &self,
        asset_id: &str,
        attribute_name: &str,
        value: Option<serde_json::Value>,
        timestamp: i64,
    ) -> Result<RouteDecision> {
        let Some(gateway_id) = self.find_owning_gateway(asset_id).await else {
            return Ok(RouteDecision::Local);
        };
        let connector = self.registry.get(&gateway_id).ok_or_else(|| {
            gateway_sync_protocol::GatewaySyncError::GatewayNotConnected {
                gateway_id: gateway_id.clone(),
            }
        })?;
        connector
            .forward_attribute_write(asset_id, attribute_name, value, timestamp)
            .await?;
        Ok(RouteDecision::Diverted { gateway_id })
    }

    /// Walks `asset_id`'s ancestor chain (excluding itself) looking for a gateway
    /// asset. A write targeting a gateway asset's own attributes (e.g. `disabled`) is
    /// never diverted — that is a direct operation on the connector, not a forwarded
    /// sensor write.
    async fn find_owning_gateway(&self, asset_id: &str) -> Option<String> {
        let asset = self.store.get(asset_id).await?;
        let mut current_parent_id = asset.parent_id().clone();
        while let Some(parent_id) = current_parent_id {
            let parent = self.store.get(&parent_id).await?;
            if parent.is_gateway() {
                return Some(parent.id().clone());
            }
            current_parent_id = parent.parent_id().clone();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectorConfig;
    use gateway_sync_protocol::id_map::{map_id, IdMapper};
    use gateway_sync_protocol::model::{Asset, GatewayAsset, GatewayCredentials};
    use gateway_sync_store::{InMemoryAssetStore, InMemoryEventBus};

    fn gateway() -> GatewayAsset {
        GatewayAsset::new(
            "gw000000000000000000000",
            "master",
            GatewayCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
        )
    }

    async fn setup() -> (EventRouter, Arc<InMemoryAssetStore>, GatewayAsset) {
        let store = Arc::new(InMemoryAssetStore::new());
        let bus = Arc::new(InMemoryEventBus::new(16));
        let id_mapper = Arc::new(IdMapper::new());
        let gateway = gateway();

        store
            .put(Asset::new(gateway.id.clone(), 1, "gw", "Gateway", None, gateway.realm.clone(), 0))
            .await
            .unwrap();
        let mirrored_room_id = map_id(&gateway.id, "room1");
        id_mapper.map_and_record(&gateway.id, "room1").unwrap();
        store
            .put(Asset::new(
                mirrored_room_id,
                1,
                "Room 1",
                "Room",
                Some(gateway.id.clone()),
                gateway.realm.clone(),
                0,
            ))
            .await
            .unwrap();
        store
            .put(Asset::new("plain-local-asset-0001", 1, "Plain", "Room", None, "master", 0))
            .await
            .unwrap();

        let registry = ConnectorRegistry::new(store.clone(), bus, id_mapper);
        registry.register(gateway.clone(), ConnectorConfig::default());
        let router = EventRouter::new(store.clone(), registry);
        (router, store, gateway)
    }

    #[tokio::test]
    async fn local_asset_is_not_diverted() {
        let (router, _store, _gateway) = setup().await;
        let decision = router
            .route_attribute_write("plain-local-asset-0001", "temperature", None, 0)
            .await
            .unwrap();
        assert_eq!(decision, RouteDecision::Local);
    }

    #[tokio::test]
    async fn mirrored_descendant_is_diverted_but_fails_while_disconnected() {
        let (router, _store, gateway) = setup().await;
        let mirrored_room_id = map_id(&gateway.id, "room1");
        let err = router
            .route_attribute_write(&mirrored_room_id, "temperature", None, 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            gateway_sync_protocol::GatewaySyncError::GatewayNotConnected { .. }
        ));
    }

    #[tokio::test]
    async fn write_to_the_gateway_asset_itself_is_not_diverted() {
        let (router, _store, gateway) = setup().await;
        let decision = router
            .route_attribute_write(&gateway.id, "disabled", None, 0)
            .await
            .unwrap();
        assert_eq!(decision, RouteDecision::Local);
    }
}
