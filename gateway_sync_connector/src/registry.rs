// Licensed under the MIT License.

//! Owns the manager-wide map from gateway asset id to its running
//! [`GatewayConnector`], so the event router and the inbound WebSocket accept loop
//! both resolve connectors through one place rather than each keeping their own.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use gateway_sync_protocol::error::{GatewaySyncError, Result};
use gateway_sync_protocol::id_map::IdMapper;
use gateway_sync_protocol::model::GatewayAsset;
use gateway_sync_protocol::transport::ChannelEndpoint;
use gateway_sync_store::{AssetStore, EventBus};

use crate::config::ConnectorConfig;
use crate::connector::GatewayConnector;

/// Single owner of the manager's per-gateway connector instances: one entry per
/// connected peer, looked up by id on every inbound frame and every outbound
/// forwarding call.
pub struct ConnectorRegistry {
    connectors: RwLock<HashMap<String, Arc<GatewayConnector>>>,
    store: Arc<dyn AssetStore>,
    bus: Arc<dyn EventBus>,
    id_mapper: Arc<IdMapper>,
}

impl ConnectorRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn AssetStore>, bus: Arc<dyn EventBus>, id_mapper: Arc<IdMapper>) -> Arc<Self> {
        Arc::new(Self {
            connectors: RwLock::new(HashMap::new()),
            store,
            bus,
            id_mapper,
        })
    }

    /// Returns the connector for `gateway_id`, if one has been registered.
    #[must_use]
    pub fn get(&self, gateway_id: &str) -> Option<Arc<GatewayConnector>> {
        self.connectors.read().expect("lock poisoned").get(gateway_id).cloned()
    }

    /// Registers a connector for a newly-created gateway asset, starting in
    /// `DISCONNECTED`. Re-registering an already-known gateway id returns the existing
    /// connector unchanged (idempotent, per the lifecycle description in §3).
    pub fn register(&self, gateway: GatewayAsset, config: ConnectorConfig) -> Arc<GatewayConnector> {
        let gateway_id = gateway.id.clone();
        let mut connectors = self.connectors.write().expect("lock poisoned");
        connectors
            .entry(gateway_id)
            .or_insert_with(|| {
                GatewayConnector::new(gateway, self.store.clone(), self.bus.clone(), self.id_mapper.clone(), config)
            })
            .clone()
    }

    /// Accepts a newly-opened channel for `gateway_id` and drives its full connection
    /// lifecycle to completion. Refuses the connection if the gateway is disabled or
    /// unknown.
    ///
    /// # Errors
    /// Returns [`GatewaySyncError::GatewayNotConnected`] if no connector is registered
    /// for `gateway_id` or the gateway is currently disabled, otherwise whatever
    /// [`GatewayConnector::run_connection`] returns.
    pub async fn accept_connection(&self, gateway_id: &str, endpoint: ChannelEndpoint) -> Result<()> {
        let connector = self.get(gateway_id).ok_or_else(|| GatewaySyncError::GatewayNotConnected {
            gateway_id: gateway_id.to_string(),
        })?;
        if connector.is_disabled() {
            return Err(GatewaySyncError::GatewayNotConnected {
                gateway_id: gateway_id.to_string(),
            });
        }
        connector.run_connection(endpoint).await
    }

    /// Disables a registered gateway: its connector severs any live channel and
    /// refuses new connections until [`ConnectorRegistry::enable`] is called.
    ///
    /// # Errors
    /// Returns [`GatewaySyncError::GatewayNotConnected`] if `gateway_id` is unknown.
    pub async fn disable(&self, gateway_id: &str) -> Result<()> {
        let connector = self.get(gateway_id).ok_or_else(|| GatewaySyncError::GatewayNotConnected {
            gateway_id: gateway_id.to_string(),
        })?;
        connector.disable().await;
        Ok(())
    }

    /// Re-enables a previously-disabled gateway.
    ///
    /// # Errors
    /// Returns [`GatewaySyncError::GatewayNotConnected`] if `gateway_id` is unknown.
    pub fn enable(&self, gateway_id: &str) -> Result<()> {
        let connector = self.get(gateway_id).ok_or_else(|| GatewaySyncError::GatewayNotConnected {
            gateway_id: gateway_id.to_string(),
        })?;
        connector.enable();
        Ok(())
    }

    /// Tears down a deleted gateway's connector and its entire mirrored subtree.
    /// Idempotent: deleting an unknown or already-deleted gateway id is a no-op on the
    /// connector map, but the subtree delete is always attempted since the store's own
    /// `delete_subtree` is itself idempotent.
    ///
    /// # Errors
    /// Returns whatever the underlying [`AssetStore::delete_subtree`] call returns.
    pub async fn delete(&self, gateway_id: &str) -> Result<()> {
        let connector = self.connectors.write().expect("lock poisoned").remove(gateway_id);
        if let Some(connector) = connector {
            connector.teardown().await;
        }
        self.store
            .delete_subtree(gateway_id)
            .await
            .map_err(|_| GatewaySyncError::ProtocolViolation {
                reason: format!("failed to delete mirrored subtree for gateway {gateway_id}"),
            })
    }

    /// Every currently-registered gateway id, for admin listing.
    #[must_use]
    pub fn gateway_ids(&self) -> Vec<String> {
        self.connectors.read().expect("lock poisoned").keys().cloned().collect()
    }
}
