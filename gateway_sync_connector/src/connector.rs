// Licensed under the MIT License.

//! The manager-side, per-gateway connector: drives one WebSocket connection's
//! handshake, inventory sync and steady-state forwarding, per the gateway connector
//! state machine (`DISCONNECTED -> CONNECTING -> SYNCING -> CONNECTED`, with
//! `DISABLED`/`ERROR` reachable from any state).

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use gateway_sync_protocol::codec::{
    batch_message_id, encode_event, encode_request_response, MSG_ID_GATEWAY_ASSET_READ,
};
use gateway_sync_protocol::correlator::Correlator;
use gateway_sync_protocol::error::{GatewaySyncError, Result};
use gateway_sync_protocol::id_map::{map_id, IdMapper};
use gateway_sync_protocol::model::{
    Asset, AssetEvent, AssetEventCause, AssetQuery, AttributeEvent, AttributeRef, EventSource, GatewayAsset,
    GatewayDisconnectEvent, GatewayStatus, ReadAssetsEvent, SharedEvent,
};
use gateway_sync_protocol::transport::{ChannelEndpoint, ChannelSender};
use gateway_sync_store::{AssetStore, BusEvent, EventBus};
use tokio::sync::mpsc;

use crate::config::ConnectorConfig;
use crate::reconciler::MirrorReconciler;

/// The per-gateway connector. One instance exists for the lifetime of a gateway asset;
/// [`GatewayConnector::run_connection`] is called once per WebSocket connection that
/// asset's client opens.
pub struct GatewayConnector {
    gateway: RwLock<GatewayAsset>,
    config: ConnectorConfig,
    store: Arc<dyn AssetStore>,
    bus: Arc<dyn EventBus>,
    reconciler: MirrorReconciler,
    id_mapper: Arc<IdMapper>,
    correlator: Arc<Correlator>,
    sender: RwLock<Option<ChannelSender>>,
}

impl GatewayConnector {
    #[must_use]
    pub fn new(
        gateway: GatewayAsset,
        store: Arc<dyn AssetStore>,
        bus: Arc<dyn EventBus>,
        id_mapper: Arc<IdMapper>,
        config: ConnectorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            reconciler: MirrorReconciler::new(store.clone(), id_mapper.clone()),
            gateway: RwLock::new(gateway),
            config,
            store,
            bus,
            id_mapper,
            correlator: Correlator::new(),
            sender: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn gateway_id(&self) -> String {
        self.gateway.read().expect("lock poisoned").id.clone()
    }

    #[must_use]
    pub fn status(&self) -> GatewayStatus {
        self.gateway.read().expect("lock poisoned").status
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.gateway.read().expect("lock poisoned").disabled
    }

    fn set_status(&self, status: GatewayStatus) {
        let gateway_id = self.gateway_id();
        log::info!("gateway {gateway_id} connector transitioning to {status:?}");
        self.gateway.write().expect("lock poisoned").status = status;
    }

    fn snapshot(&self) -> GatewayAsset {
        self.gateway.read().expect("lock poisoned").clone()
    }

    /// Drives one connection's full lifecycle: handshake, inventory sync, then
    /// steady-state event forwarding, until the channel closes or a protocol violation
    /// is detected. Returns once the connection has ended; the caller (the connector
    /// registry's accept loop) decides whether and how a new connection is accepted.
    ///
    /// # Errors
    /// Returns an error describing why the connection ended; this is diagnostic only,
    /// since the connector state machine always leaves itself in a sane state
    /// (`CONNECTING` or `ERROR`) before returning.
    pub async fn run_connection(self: &Arc<Self>, endpoint: ChannelEndpoint) -> Result<()> {
        if self.is_disabled() {
            return Err(GatewaySyncError::GatewayNotConnected {
                gateway_id: self.gateway_id(),
            });
        }

        let (sender, receiver) = endpoint.split();
        *self.sender.write().expect("lock poisoned") = Some(sender.clone());
        self.correlator.fail_all().await; // clears stale pending requests from any prior connection
        self.set_status(GatewayStatus::Connecting);

        let mut event_rx = spawn_reader(receiver, self.correlator.clone(), self.config.inbound_queue_capacity);
        let result = self.drive(&sender, &mut event_rx).await;

        *self.sender.write().expect("lock poisoned") = None;
        self.correlator.fail_all().await;
        if !self.is_disabled() {
            // Per the recovery table: only a protocol violation is terminal enough to
            // move to ERROR. Every other error (disconnect, timeout) is retryable, so
            // the connector goes back to CONNECTING for the registry to redial.
            self.set_status(match &result {
                Err(GatewaySyncError::ProtocolViolation { .. }) => GatewayStatus::Error,
                _ => GatewayStatus::Connecting,
            });
        }
        result
    }

    async fn drive(
        self: &Arc<Self>,
        sender: &ChannelSender,
        event_rx: &mut mpsc::Receiver<Result<SharedEvent>>,
    ) -> Result<()> {
        let index = self.handshake(sender).await?;
        self.set_status(GatewayStatus::Syncing);
        self.sync_inventory(sender, event_rx, index).await?;
        self.set_status(GatewayStatus::Connected);

        while let Some(event) = event_rx.recv().await {
            self.handle_steady_state_event(sender, event?).await;
        }
        Ok(())
    }

    /// Sends the initial whole-index read and awaits the reply.
    async fn handshake(self: &Arc<Self>, sender: &ChannelSender) -> Result<Vec<gateway_sync_protocol::model::Asset>> {
        let reply = self
            .correlator
            .send_with_id(MSG_ID_GATEWAY_ASSET_READ.to_string(), self.config.batch_read_timeout)
            .await;
        let frame = encode_request_response(&gateway_sync_protocol::codec::RequestResponseEnvelope {
            message_id: MSG_ID_GATEWAY_ASSET_READ.to_string(),
            event: SharedEvent::ReadAssets(ReadAssetsEvent {
                query: AssetQuery::initial_index(),
            }),
        })?;
        if !sender.send(frame) {
            return Err(GatewaySyncError::Disconnected);
        }
        match reply.wait().await? {
            SharedEvent::AssetsRead(read) => Ok(read.assets),
            _ => Err(GatewaySyncError::ProtocolViolation {
                reason: "expected AssetsRead in reply to the initial index request".to_string(),
            }),
        }
    }

    /// Runs the full inventory sync: prunes `C \ R`, then fetches and reconciles `R` in
    /// batches, folding in any mid-sync create/update/delete events that interleave
    /// with the batch reads.
    async fn sync_inventory(
        self: &Arc<Self>,
        sender: &ChannelSender,
        event_rx: &mut mpsc::Receiver<Result<SharedEvent>>,
        index: Vec<gateway_sync_protocol::model::Asset>,
    ) -> Result<()> {
        let gateway = self.snapshot();
        let local_ids: HashSet<String> = index.iter().map(|a| a.id().clone()).collect();
        self.prune_removed(&gateway, &local_ids).await;

        let ordered_ids: Vec<String> = index.into_iter().map(|a| a.id().clone()).collect();
        let mut remaining: HashSet<String> = local_ids;
        let mut skip_on_arrival: HashSet<String> = HashSet::new();
        let mut deferred = Vec::new();

        for (batch_index, chunk) in ordered_ids
            .chunks(self.config.sync_asset_batch_size.max(1))
            .enumerate()
        {
            let message_id = batch_message_id(batch_index * self.config.sync_asset_batch_size.max(1));
            let reply = self
                .correlator
                .send_with_id(message_id.clone(), self.config.batch_read_timeout)
                .await;
            let frame = encode_request_response(&gateway_sync_protocol::codec::RequestResponseEnvelope {
                message_id,
                event: SharedEvent::ReadAssets(ReadAssetsEvent {
                    query: AssetQuery::batch(chunk.to_vec()),
                }),
            })?;
            if !sender.send(frame) {
                return Err(GatewaySyncError::Disconnected);
            }

            let assets = {
                tokio::pin! { let reply_wait = reply.wait(); }
                loop {
                    tokio::select! {
                        result = &mut reply_wait => break result?,
                        maybe_event = event_rx.recv() => match maybe_event {
                            Some(Ok(event)) => {
                                self.handle_mid_sync_event(sender, &gateway, event, &mut remaining, &mut skip_on_arrival).await;
                            }
                            Some(Err(err)) => return Err(err),
                            None => return Err(GatewaySyncError::Disconnected),
                        },
                    }
                }
            };
            let SharedEvent::AssetsRead(read) = assets else {
                return Err(GatewaySyncError::ProtocolViolation {
                    reason: "expected AssetsRead in reply to a sync batch request".to_string(),
                });
            };

            for id in chunk {
                remaining.remove(id);
            }
            let mut combined = std::mem::take(&mut deferred);
            combined.extend(
                read.assets
                    .into_iter()
                    .filter(|a| !skip_on_arrival.remove(a.id())),
            );
            let report = self.reconciler.apply_batch(&gateway, combined).await;
            deferred = report.deferred;
            if !report.version_conflicts.is_empty() {
                let retry = self.refetch_conflicted(&gateway, sender, report.version_conflicts).await;
                deferred.extend(retry.deferred);
            }
        }

        // Final convergence pass for any children whose parent was deferred all the
        // way to the end of the index (should only happen for a malformed index).
        while !deferred.is_empty() {
            let report = self
                .reconciler
                .apply_batch(&gateway, std::mem::take(&mut deferred))
                .await;
            if report.applied.is_empty() {
                log::error!(
                    "gateway {}: {} assets never resolved a parent, dropping",
                    gateway.id,
                    report.deferred.len()
                );
                break;
            }
            deferred = report.deferred;
            if !report.version_conflicts.is_empty() {
                let retry = self.refetch_conflicted(&gateway, sender, report.version_conflicts).await;
                deferred.extend(retry.deferred);
            }
        }

        Ok(())
    }

    /// Re-requests assets whose reconciliation lost an optimistic-versioning race and
    /// reconciles the fresh copies, per the "log, refetch on the next round" conflict
    /// policy. `mirrored_ids` are unmapped back to the gateway's local ids before being
    /// requested again; ids this connector never mapped (should not happen) are dropped
    /// with a warning rather than requested.
    async fn refetch_conflicted(
        &self,
        gateway: &GatewayAsset,
        sender: &ChannelSender,
        mirrored_ids: Vec<String>,
    ) -> crate::reconciler::BatchReport {
        let local_ids: Vec<String> = mirrored_ids
            .into_iter()
            .filter_map(|mirrored_id| {
                let local_id = self.id_mapper.unmap_id(&gateway.id, &mirrored_id);
                if local_id.is_none() {
                    log::warn!("gateway {}: no local id for conflicted mirrored asset {mirrored_id}", gateway.id);
                }
                local_id
            })
            .collect();
        if local_ids.is_empty() {
            return crate::reconciler::BatchReport::default();
        }
        let (message_id, reply) = self.correlator.send(self.config.batch_read_timeout).await;
        let Ok(frame) = encode_request_response(&gateway_sync_protocol::codec::RequestResponseEnvelope {
            message_id,
            event: SharedEvent::ReadAssets(ReadAssetsEvent {
                query: AssetQuery::batch(local_ids),
            }),
        }) else {
            return crate::reconciler::BatchReport::default();
        };
        if !sender.send(frame) {
            return crate::reconciler::BatchReport::default();
        }
        match reply.wait().await {
            Ok(SharedEvent::AssetsRead(read)) => self.reconciler.apply_batch(gateway, read.assets).await,
            Ok(_) | Err(_) => {
                log::warn!("gateway {}: version-conflict refetch did not complete, dropping", gateway.id);
                crate::reconciler::BatchReport::default()
            }
        }
    }

    /// Deletes every currently-mirrored id not present in the freshly-read index (`C \
    /// R`), before batch-fetching the index proper.
    async fn prune_removed(&self, gateway: &GatewayAsset, local_ids: &HashSet<String>) {
        let mirrored_ids = self.id_mapper.mirrored_ids(&gateway.id);
        let mut to_delete = HashSet::new();
        let mut forgotten_local_ids = Vec::new();
        for mirrored_id in mirrored_ids {
            let Some(local_id) = self.id_mapper.unmap_id(&gateway.id, &mirrored_id) else {
                continue;
            };
            if !local_ids.contains(&local_id) {
                to_delete.insert(mirrored_id);
                forgotten_local_ids.push(local_id);
            }
        }
        if to_delete.is_empty() {
            return;
        }
        self.reconciler.apply_deletions(&to_delete).await;
        for local_id in forgotten_local_ids {
            self.id_mapper.forget(&gateway.id, &local_id);
        }
    }

    /// Applies a create/update/delete that arrives while a sync batch is in flight.
    async fn handle_mid_sync_event(
        &self,
        sender: &ChannelSender,
        gateway: &GatewayAsset,
        event: SharedEvent,
        remaining: &mut HashSet<String>,
        skip_on_arrival: &mut HashSet<String>,
    ) {
        let SharedEvent::Asset(asset_event) = event else {
            log::debug!("ignoring non-asset event received mid-sync for gateway {}", gateway.id);
            return;
        };
        match asset_event.cause {
            AssetEventCause::Delete => {
                let local_id = asset_event.asset.id().clone();
                if remaining.remove(&local_id) {
                    // Its batch has not arrived yet: when it does, drop it rather than
                    // recreating an asset that is already gone.
                    skip_on_arrival.insert(local_id.clone());
                }
                let mirrored_id = map_id(&gateway.id, &local_id);
                let mut set = HashSet::new();
                set.insert(mirrored_id);
                self.reconciler.apply_deletions(&set).await;
                self.id_mapper.forget(&gateway.id, &local_id);
            }
            AssetEventCause::Create | AssetEventCause::Update => {
                remaining.remove(asset_event.asset.id());
                let report = self.reconciler.apply_batch(gateway, vec![asset_event.asset]).await;
                if !report.version_conflicts.is_empty() {
                    self.refetch_conflicted(gateway, sender, report.version_conflicts).await;
                }
            }
        }
    }

    /// Handles inbound events once the connector has reached `CONNECTED`.
    async fn handle_steady_state_event(self: &Arc<Self>, sender: &ChannelSender, event: SharedEvent) {
        let gateway = self.snapshot();
        match event {
            SharedEvent::Attribute(mut attr_event) => {
                let Ok(mirrored_id) = self
                    .id_mapper
                    .map_and_record(&gateway.id, &attr_event.attribute_ref.asset_id)
                else {
                    log::warn!(
                        "gateway {}: duplicate id mapping forwarding attribute event, dropping",
                        gateway.id
                    );
                    return;
                };
                attr_event.attribute_ref.asset_id = mirrored_id;
                attr_event.source = EventSource::Gateway;
                attr_event.realm = gateway.realm.clone();
                self.bus.publish(BusEvent::Attribute(attr_event)).await;
            }
            SharedEvent::Asset(asset_event) => match asset_event.cause {
                AssetEventCause::Delete => {
                    let mirrored_id = map_id(&gateway.id, asset_event.asset.id());
                    let mut set = HashSet::new();
                    set.insert(mirrored_id);
                    self.reconciler.apply_deletions(&set).await;
                    self.id_mapper.forget(&gateway.id, asset_event.asset.id());
                }
                AssetEventCause::Create | AssetEventCause::Update => {
                    let report = self.reconciler.apply_batch(&gateway, vec![asset_event.asset]).await;
                    if !report.version_conflicts.is_empty() {
                        self.refetch_conflicted(&gateway, sender, report.version_conflicts).await;
                    }
                }
            },
            SharedEvent::GatewayDisconnect(notice) => {
                log::warn!("gateway {} sent an unexpected disconnect notice: {}", gateway.id, notice.reason);
            }
            SharedEvent::ReadAssets(_) | SharedEvent::AssetsRead(_) => {
                log::warn!("gateway {}: unexpected read-assets traffic outside request/response", gateway.id);
            }
            SharedEvent::Unknown => {
                // Dropped by spawn_reader before it reaches this queue; kept here only
                // to make the match exhaustive against future SharedEvent variants.
                log::debug!("gateway {}: unreachable Unknown event in steady state", gateway.id);
            }
        }
    }

    /// Forwards a local attribute write targeting a mirrored asset back to the
    /// gateway, rewriting the mirrored id to its local form. Never applied locally:
    /// the authoritative update arrives later as a steady-state attribute event echoed
    /// back from the gateway.
    ///
    /// # Errors
    /// Returns [`GatewaySyncError::GatewayNotConnected`] if the gateway is not in
    /// `CONNECTED`, or [`GatewaySyncError::UnsupportedOperation`] if `mirrored_asset_id`
    /// has no recorded local mapping under this gateway.
    pub async fn forward_attribute_write(
        &self,
        mirrored_asset_id: &str,
        attribute_name: &str,
        value: Option<serde_json::Value>,
        timestamp: i64,
    ) -> Result<()> {
        let gateway = self.snapshot();
        if gateway.status != GatewayStatus::Connected {
            return Err(GatewaySyncError::GatewayNotConnected { gateway_id: gateway.id });
        }
        let local_id = self
            .id_mapper
            .unmap_id(&gateway.id, mirrored_asset_id)
            .ok_or_else(|| GatewaySyncError::UnsupportedOperation {
                asset_id: mirrored_asset_id.to_string(),
            })?;
        let sender = self
            .sender
            .read()
            .expect("lock poisoned")
            .clone()
            .ok_or(GatewaySyncError::Disconnected)?;
        let frame = encode_event(&SharedEvent::Attribute(AttributeEvent {
            attribute_ref: AttributeRef::new(local_id, attribute_name),
            value,
            timestamp,
            source: EventSource::Client,
            realm: gateway.realm,
            parent_id: None,
        }))?;
        if !sender.send(frame) {
            return Err(GatewaySyncError::Disconnected);
        }
        Ok(())
    }

    /// Forwards a local create targeting a mirrored subtree to the gateway, blocking
    /// until the gateway's echoed [`AssetEvent`] has been applied to the mirror. This
    /// is the only sanctioned way to mutate a mirrored asset; a direct local write
    /// outside this path must be refused by the caller.
    ///
    /// # Errors
    /// Returns [`GatewaySyncError::GatewayNotConnected`] if the gateway is not
    /// `CONNECTED`, [`GatewaySyncError::UnsupportedOperation`] if `mirrored_parent_id`
    /// has no recorded local mapping (and is not the gateway asset itself), or a
    /// [`GatewaySyncError::ProtocolViolation`] if the echoed reply cannot be
    /// reconciled into the mirror.
    pub async fn forward_asset_mutation(&self, mirrored_parent_id: &str, mut asset: Asset) -> Result<Asset> {
        let gateway = self.snapshot();
        if gateway.status != GatewayStatus::Connected {
            return Err(GatewaySyncError::GatewayNotConnected { gateway_id: gateway.id });
        }
        let local_parent_id = if mirrored_parent_id == gateway.id {
            None
        } else {
            Some(
                self.id_mapper
                    .unmap_id(&gateway.id, mirrored_parent_id)
                    .ok_or_else(|| GatewaySyncError::UnsupportedOperation {
                        asset_id: mirrored_parent_id.to_string(),
                    })?,
            )
        };
        asset.set_parent_id(local_parent_id);
        asset.set_realm(gateway.realm.clone());

        let sender = self
            .sender
            .read()
            .expect("lock poisoned")
            .clone()
            .ok_or(GatewaySyncError::Disconnected)?;
        let (message_id, reply) = self.correlator.send(self.config.write_forward_timeout).await;
        let frame = encode_request_response(&gateway_sync_protocol::codec::RequestResponseEnvelope {
            message_id,
            event: SharedEvent::Asset(AssetEvent {
                cause: AssetEventCause::Create,
                asset,
                changed_attributes: vec![],
            }),
        })?;
        if !sender.send(frame) {
            return Err(GatewaySyncError::Disconnected);
        }

        let SharedEvent::Asset(echoed) = reply.wait().await? else {
            return Err(GatewaySyncError::ProtocolViolation {
                reason: "expected an AssetEvent in reply to a forwarded create".to_string(),
            });
        };
        let local_id = echoed.asset.id().clone();
        let report = self.reconciler.apply_batch(&gateway, vec![echoed.asset]).await;
        let mirrored_id = report.applied.into_iter().next().ok_or_else(|| GatewaySyncError::ProtocolViolation {
            reason: format!("forwarded create for {local_id} could not be reconciled into the mirror"),
        })?;
        self.store
            .get(&mirrored_id)
            .await
            .ok_or_else(|| GatewaySyncError::ProtocolViolation {
                reason: format!("mirrored asset {mirrored_id} vanished immediately after being created"),
            })
    }

    /// Sends the disabled-gateway disconnect notice, severs the channel and moves to
    /// `DISABLED`. Reconnection attempts are refused by the connector registry while
    /// the gateway asset remains disabled.
    pub async fn disable(&self) {
        self.gateway.write().expect("lock poisoned").disabled = true;
        if let Some(sender) = self.sender.read().expect("lock poisoned").clone() {
            if let Ok(frame) = encode_event(&SharedEvent::GatewayDisconnect(GatewayDisconnectEvent {
                reason: "gateway disabled".to_string(),
            })) {
                sender.send(frame);
            }
        }
        self.set_status(GatewayStatus::Disabled);
        self.correlator.fail_all().await;
        *self.sender.write().expect("lock poisoned") = None;
    }

    /// Re-enables a previously-disabled gateway, allowing the registry to accept new
    /// connections for it again.
    pub fn enable(&self) {
        self.gateway.write().expect("lock poisoned").disabled = false;
        self.set_status(GatewayStatus::Disconnected);
    }

    /// Tears down this connector's in-memory state ahead of the gateway asset's own
    /// deletion. The mirrored subtree itself is deleted by the caller via
    /// [`AssetStore::delete_subtree`], since that is keyed by mirrored id, not by
    /// connector.
    pub async fn teardown(&self) {
        if let Some(sender) = self.sender.read().expect("lock poisoned").clone() {
            sender.send(
                encode_event(&SharedEvent::GatewayDisconnect(GatewayDisconnectEvent {
                    reason: "gateway deleted".to_string(),
                }))
                .unwrap_or_default(),
            );
        }
        self.correlator.fail_all().await;
        *self.sender.write().expect("lock poisoned") = None;
        self.id_mapper.clear_gateway(&self.gateway_id());
    }
}

/// Spawns the dedicated frame-reading task described by the concurrency model: it owns
/// the [`ChannelReceiver`](gateway_sync_protocol::transport::ChannelReceiver) exclusively,
/// resolves correlator entries for `REQUEST-RESPONSE` replies, and forwards everything
/// else (fire-and-forget events, and replies that do not match a pending request) onto
/// the returned queue for the protocol driver to consume.
///
/// The queue is bounded by `capacity`: a driver that falls behind backs the reader up
/// rather than letting it buffer decoded events without limit. An `eventType` this
/// build doesn't recognize is logged and dropped here rather than forwarded; a frame
/// that fails to decode at all is forwarded as `Err` so the driver can surface the
/// protocol violation and the connector can move to `ERROR`, then the task exits.
fn spawn_reader(
    mut receiver: gateway_sync_protocol::transport::ChannelReceiver,
    correlator: Arc<Correlator>,
    capacity: usize,
) -> mpsc::Receiver<Result<SharedEvent>> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        while let Some(frame) = receiver.recv().await {
            match gateway_sync_protocol::codec::decode(&frame) {
                Ok(gateway_sync_protocol::codec::Frame::Event(SharedEvent::Unknown)) => {
                    log::debug!("ignoring EVENT frame with an unrecognized eventType");
                }
                Ok(gateway_sync_protocol::codec::Frame::Event(event)) => {
                    if tx.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
                Ok(gateway_sync_protocol::codec::Frame::RequestResponse(envelope))
                    if matches!(envelope.event, SharedEvent::Unknown) =>
                {
                    log::debug!("ignoring REQUEST-RESPONSE frame with an unrecognized eventType");
                    correlator.resolve(&envelope.message_id, envelope.event).await;
                }
                Ok(gateway_sync_protocol::codec::Frame::RequestResponse(envelope)) => {
                    if !correlator.resolve(&envelope.message_id, envelope.event.clone()).await
                        && tx.send(Ok(envelope.event)).await.is_err()
                    {
                        break;
                    }
                }
                Err(err) => {
                    log::error!("protocol violation reading channel frame: {err}");
                    let _ = tx.send(Err(err)).await;
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_sync_protocol::model::{Asset, GatewayCredentials};
    use gateway_sync_protocol::transport::duplex_pair;
    use gateway_sync_store::{InMemoryAssetStore, InMemoryEventBus};

    fn gateway_asset() -> GatewayAsset {
        GatewayAsset::new(
            "gw-asset-id-000000000",
            "master",
            GatewayCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
        )
    }

    fn connector() -> (
        Arc<GatewayConnector>,
        Arc<InMemoryAssetStore>,
        Arc<InMemoryEventBus>,
    ) {
        let store = Arc::new(InMemoryAssetStore::new());
        let bus = Arc::new(InMemoryEventBus::new(16));
        let connector = GatewayConnector::new(
            gateway_asset(),
            store.clone(),
            bus.clone(),
            Arc::new(IdMapper::new()),
            ConnectorConfig::default(),
        );
        (connector, store, bus)
    }

    /// Drives the gateway side of the handshake/sync exchange for tests: answers the
    /// initial index read and every subsequent batch read from a fixed inventory.
    async fn serve_gateway_side(
        mut receiver: gateway_sync_protocol::transport::ChannelReceiver,
        sender: ChannelSender,
        inventory: Vec<Asset>,
    ) {
        while let Some(frame) = receiver.recv().await {
            let gateway_sync_protocol::codec::Frame::RequestResponse(envelope) =
                gateway_sync_protocol::codec::decode(&frame).unwrap()
            else {
                continue;
            };
            let reply_event = match envelope.event {
                SharedEvent::ReadAssets(read) => {
                    let assets = match read.query.ids {
                        Some(ids) => inventory
                            .iter()
                            .filter(|a| ids.contains(a.id()))
                            .cloned()
                            .collect(),
                        None => inventory.clone(),
                    };
                    SharedEvent::AssetsRead(gateway_sync_protocol::model::AssetsReadEvent { assets })
                }
                // Echo forwarded asset creates unchanged, as the gateway-side client does.
                asset_event @ SharedEvent::Asset(_) => asset_event,
                _ => continue,
            };
            let reply = encode_request_response(&gateway_sync_protocol::codec::RequestResponseEnvelope {
                message_id: envelope.message_id,
                event: reply_event,
            })
            .unwrap();
            if !sender.send(reply) {
                break;
            }
        }
    }

    #[tokio::test]
    async fn sync_populates_mirror_and_reaches_connected_state() {
        let (connector, store, _bus) = connector();
        let (manager_end, gateway_end) = duplex_pair();
        let (gw_sender, gw_receiver) = gateway_end.split();
        let inventory = vec![Asset::new("room1", 1, "Room 1", "Room", None, "gatewayrealm", 0)];
        tokio::spawn(serve_gateway_side(gw_receiver, gw_sender, inventory));

        let connector_clone = connector.clone();
        let handle = tokio::spawn(async move { connector_clone.run_connection(manager_end).await });

        // Poll until CONNECTED or the task ends, bounded by the test harness timeout.
        for _ in 0..200 {
            if connector.status() == GatewayStatus::Connected {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(connector.status(), GatewayStatus::Connected);
        let mirrored_id = map_id(&connector.gateway_id(), "room1");
        assert!(store.get(&mirrored_id).await.is_some());
        handle.abort();
    }

    #[tokio::test]
    async fn disable_moves_to_disabled_and_drops_sender() {
        let (connector, _store, _bus) = connector();
        let (manager_end, _gateway_end) = duplex_pair();
        *connector.sender.write().unwrap() = Some(manager_end.sender.clone());
        connector.disable().await;
        assert_eq!(connector.status(), GatewayStatus::Disabled);
        assert!(connector.is_disabled());
    }

    #[tokio::test]
    async fn forward_attribute_write_fails_when_not_connected() {
        let (connector, _store, _bus) = connector();
        let err = connector
            .forward_attribute_write("some-mirrored-id", "temperature", None, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewaySyncError::GatewayNotConnected { .. }));
    }

    #[tokio::test]
    async fn forward_asset_mutation_fails_when_not_connected() {
        let (connector, _store, _bus) = connector();
        let err = connector
            .forward_asset_mutation(
                &connector.gateway_id(),
                Asset::new("room1", 1, "Room 1", "Room", None, "gatewayrealm", 0),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewaySyncError::GatewayNotConnected { .. }));
    }

    #[tokio::test]
    async fn forward_asset_mutation_mirrors_the_echoed_create() {
        let (connector, store, _bus) = connector();
        let (manager_end, gateway_end) = duplex_pair();
        tokio::spawn(serve_gateway_side(
            gateway_end.receiver,
            gateway_end.sender.clone(),
            vec![],
        ));

        let connector_clone = connector.clone();
        let handle = tokio::spawn(async move { connector_clone.run_connection(manager_end).await });
        for _ in 0..200 {
            if connector.status() == GatewayStatus::Connected {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(connector.status(), GatewayStatus::Connected);

        let gateway_id = connector.gateway_id();
        let result = connector
            .forward_asset_mutation(&gateway_id, Asset::new("room1", 1, "Room 1", "Room", None, "gatewayrealm", 0))
            .await;
        handle.abort();
        let mirrored = result.unwrap();
        assert_eq!(mirrored.parent_id().as_deref(), Some(gateway_id.as_str()));
        assert!(store.get(mirrored.id()).await.is_some());
    }
}
