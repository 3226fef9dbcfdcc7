// Licensed under the MIT License.

//! The gateway-side client: the mirror image of the manager's connector (§4.5). Serves
//! inventory read requests from the local asset store, applies and echoes
//! manager-forwarded asset mutations and attribute writes, and pushes
//! locally-originated events as they happen.

use std::sync::{Arc, RwLock};

use gateway_sync_protocol::codec::{self, encode_event, encode_request_response, Frame, RequestResponseEnvelope};
use gateway_sync_protocol::error::{GatewaySyncError, Result};
use gateway_sync_protocol::model::{
    Asset, AssetEvent, AssetEventCause, AssetQuery, AssetsReadEvent, AttributeEvent, GatewayConnection, GatewayStatus,
    SharedEvent,
};
use gateway_sync_protocol::transport::{bridge_websocket, ChannelEndpoint, ChannelSender};
use gateway_sync_store::{AssetStore, TokenProvider};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::config::ClientConfig;

/// A decoded inbound frame, tagged with whether it demands a reply. Unlike the
/// connector's reader (which only ever awaits replies to requests *it* made), the
/// client must answer requests the manager makes of it, so the message id of an
/// inbound request has to survive past decoding.
enum Inbound {
    Event(SharedEvent),
    Request { message_id: String, event: SharedEvent },
}

/// Drives one gateway's connection to its manager, reconnecting with backoff on
/// failure. One instance exists for the lifetime of the gateway process (or, in
/// reverse mode, for the lifetime of one configured [`GatewayConnection`]).
pub struct GatewayClient {
    connection: GatewayConnection,
    store: Arc<dyn AssetStore>,
    token_provider: Arc<dyn TokenProvider>,
    backoff: Backoff,
    inbound_queue_capacity: usize,
    state: RwLock<GatewayStatus>,
    sender: RwLock<Option<ChannelSender>>,
}

impl GatewayClient {
    #[must_use]
    pub fn new(
        connection: GatewayConnection,
        store: Arc<dyn AssetStore>,
        token_provider: Arc<dyn TokenProvider>,
        config: ClientConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            connection,
            store,
            token_provider,
            backoff: Backoff::new(config.reconnect_initial_backoff, config.reconnect_max_backoff),
            inbound_queue_capacity: config.inbound_queue_capacity,
            state: RwLock::new(GatewayStatus::Disconnected),
            sender: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn status(&self) -> GatewayStatus {
        *self.state.read().expect("lock poisoned")
    }

    fn set_status(&self, status: GatewayStatus) {
        log::info!("gateway client for realm {} transitioning to {status:?}", self.connection.realm);
        *self.state.write().expect("lock poisoned") = status;
    }

    /// Runs the reconnect loop until `cancel` fires. Every connection attempt that
    /// fails (auth, dial, or a protocol error mid-connection) is retried after an
    /// exponentially growing delay; a clean run that reaches `CONNECTED` resets the
    /// attempt counter once the channel eventually drops.
    pub async fn run(self: &Arc<Self>, cancel: CancellationToken) {
        let mut attempt = 0u32;
        while !cancel.is_cancelled() {
            self.set_status(GatewayStatus::Connecting);
            match self.connect_and_serve(&cancel).await {
                Ok(()) => attempt = 0,
                Err(err) => {
                    log::warn!("gateway client connection attempt failed: {err}");
                    attempt += 1;
                }
            }
            if cancel.is_cancelled() || self.connection.disabled {
                break;
            }
            self.set_status(GatewayStatus::Connecting);
            let delay = self.backoff.delay(attempt.saturating_sub(1));
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => break,
            }
        }
        self.set_status(GatewayStatus::Disabled);
    }

    /// Dials the manager's WebSocket endpoint, authenticates, and serves the
    /// connection until it drops.
    async fn connect_and_serve(self: &Arc<Self>, cancel: &CancellationToken) -> Result<()> {
        let token = self
            .token_provider
            .fetch_token(
                &self.connection.token_endpoint(),
                &self.connection.client_id,
                &self.connection.client_secret,
            )
            .await
            .map_err(|_| GatewaySyncError::AuthFailed {
                gateway_id: self.connection.realm.clone(),
            })?;

        let url = self.connection.websocket_url();
        let mut request =
            tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(url.as_str()).map_err(
                |err| GatewaySyncError::ProtocolViolation {
                    reason: format!("malformed websocket request for {url}: {err}"),
                },
            )?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {token}")
                .parse()
                .map_err(|_| GatewaySyncError::AuthFailed {
                    gateway_id: self.connection.realm.clone(),
                })?,
        );
        let (ws, _response) =
            tokio_tungstenite::connect_async(request)
                .await
                .map_err(|err| GatewaySyncError::ProtocolViolation {
                    reason: format!("failed to connect to {url}: {err}"),
                })?;
        let endpoint = bridge_websocket(ws, self.inbound_queue_capacity);
        self.serve_connection(endpoint, cancel).await
    }

    /// Serves one already-open channel: answers inventory reads and forwarded
    /// mutations until the channel drops or `cancel` fires. Split out from
    /// [`GatewayClient::connect_and_serve`] so tests can drive it over an in-process
    /// [`ChannelEndpoint`] without a real socket.
    pub async fn serve_connection(self: &Arc<Self>, endpoint: ChannelEndpoint, cancel: &CancellationToken) -> Result<()> {
        let (sender, receiver) = endpoint.split();
        *self.sender.write().expect("lock poisoned") = Some(sender.clone());
        self.set_status(GatewayStatus::Syncing);

        let mut inbound_rx = spawn_reader(receiver, self.inbound_queue_capacity);
        let result = loop {
            tokio::select! {
                maybe_inbound = inbound_rx.recv() => {
                    match maybe_inbound {
                        Some(Inbound::Request { message_id, event }) => {
                            if let Err(err) = self.handle_request(&sender, message_id, event).await {
                                break Err(err);
                            }
                            self.set_status(GatewayStatus::Connected);
                        }
                        Some(Inbound::Event(event)) => {
                            if self.handle_event(&sender, event).await {
                                break Ok(());
                            }
                        }
                        None => break Ok(()),
                    }
                }
                () = cancel.cancelled() => break Ok(()),
            }
        };

        *self.sender.write().expect("lock poisoned") = None;
        result
    }

    async fn handle_request(&self, sender: &ChannelSender, message_id: String, event: SharedEvent) -> Result<()> {
        let reply_event = match event {
            SharedEvent::ReadAssets(read) => {
                let assets = self.query_local_store(&read.query).await;
                SharedEvent::AssetsRead(AssetsReadEvent { assets })
            }
            SharedEvent::Asset(asset_event) => SharedEvent::Asset(self.apply_asset_mutation(asset_event).await),
            other => {
                log::warn!("unexpected request-response event kind: {other:?}");
                return Ok(());
            }
        };
        let frame = encode_request_response(&RequestResponseEnvelope {
            message_id,
            event: reply_event,
        })?;
        if !sender.send(frame) {
            return Err(GatewaySyncError::Disconnected);
        }
        Ok(())
    }

    /// Handles a fire-and-forget inbound event. Returns `true` if the connection
    /// should end (the manager asked to disconnect).
    async fn handle_event(&self, sender: &ChannelSender, event: SharedEvent) -> bool {
        match event {
            SharedEvent::Attribute(attr_event) => {
                self.apply_attribute_write(sender, attr_event).await;
                false
            }
            SharedEvent::GatewayDisconnect(notice) => {
                log::info!("manager requested disconnect: {}", notice.reason);
                true
            }
            other => {
                log::debug!("ignoring unexpected event on the fire-and-forget path: {other:?}");
                false
            }
        }
    }

    async fn query_local_store(&self, query: &AssetQuery) -> Vec<Asset> {
        let mut assets = match &query.ids {
            Some(ids) => {
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(asset) = self.store.get(id).await {
                        out.push(asset);
                    }
                }
                out
            }
            None => self.store.all().await,
        };
        if query.select.exclude_attributes == Some(true) {
            for asset in &mut assets {
                asset.attributes_mut().clear();
            }
        }
        assets
    }

    /// Applies an inbound create/update/delete, per the tie-break rules in §4.4 (which
    /// apply symmetrically here): a create for an id already present becomes an
    /// update; an update for an absent id becomes a create; a delete for an absent id
    /// is a no-op. Returns the resulting [`AssetEvent`] to echo back to the manager.
    async fn apply_asset_mutation(&self, incoming: AssetEvent) -> AssetEvent {
        match incoming.cause {
            AssetEventCause::Delete => {
                let _ = self.store.delete_one(incoming.asset.id()).await;
                incoming
            }
            AssetEventCause::Create | AssetEventCause::Update => {
                let mut asset = incoming.asset;
                let existing = self.store.get(asset.id()).await;
                match (&existing, incoming.cause) {
                    (Some(_), AssetEventCause::Create) => {
                        log::warn!("create for existing asset {}, treating as update", asset.id());
                    }
                    (None, AssetEventCause::Update) => {
                        log::warn!("update for absent asset {}, treating as create", asset.id());
                    }
                    _ => {}
                }
                if let Some(existing) = existing {
                    asset.set_version(existing.version() + 1);
                }
                let _ = self.store.put(asset.clone()).await;
                AssetEvent {
                    cause: incoming.cause,
                    asset,
                    changed_attributes: incoming.changed_attributes,
                }
            }
        }
    }

    /// Applies a manager-forwarded attribute write to the local store and echoes the
    /// resulting value back as a sensor-sourced attribute event.
    async fn apply_attribute_write(&self, sender: &ChannelSender, event: AttributeEvent) {
        let Some(mut asset) = self.store.get(&event.attribute_ref.asset_id).await else {
            log::warn!(
                "forwarded attribute write for unknown local asset {}",
                event.attribute_ref.asset_id
            );
            return;
        };
        let version = *asset.version();
        asset.set_version(version + 1);
        if let Some(attribute) = asset.attributes_mut().get_mut(&event.attribute_ref.attribute_name) {
            attribute.value = event.value.clone();
            attribute.timestamp = event.timestamp;
        }
        if self.store.put(asset).await.is_err() {
            return;
        }
        if let Ok(frame) = encode_event(&SharedEvent::Attribute(AttributeEvent {
            source: gateway_sync_protocol::model::EventSource::Gateway,
            ..event
        })) {
            sender.send(frame);
        }
    }

    /// Sends a locally-originated attribute change to the manager, if currently
    /// connected. Called by the (out-of-scope) device-protocol layer whenever a local
    /// sensor value changes.
    #[must_use]
    pub fn push_attribute_event(&self, event: AttributeEvent) -> bool {
        let Some(sender) = self.sender.read().expect("lock poisoned").clone() else {
            return false;
        };
        match encode_event(&SharedEvent::Attribute(event)) {
            Ok(frame) => sender.send(frame),
            Err(_) => false,
        }
    }

    /// Sends a locally-originated asset create/update/delete to the manager, if
    /// currently connected.
    #[must_use]
    pub fn push_asset_event(&self, event: AssetEvent) -> bool {
        let Some(sender) = self.sender.read().expect("lock poisoned").clone() else {
            return false;
        };
        match encode_event(&SharedEvent::Asset(event)) {
            Ok(frame) => sender.send(frame),
            Err(_) => false,
        }
    }
}

/// Bounded by `capacity`: a reader that decodes faster than [`GatewayClient::serve_connection`]
/// consumes backs up here rather than growing without limit.
fn spawn_reader(
    mut receiver: gateway_sync_protocol::transport::ChannelReceiver,
    capacity: usize,
) -> mpsc::Receiver<Inbound> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        while let Some(frame) = receiver.recv().await {
            match codec::decode(&frame) {
                Ok(Frame::Event(SharedEvent::Unknown)) => {
                    log::debug!("ignoring EVENT frame with an unrecognized eventType");
                }
                Ok(Frame::RequestResponse(envelope)) if matches!(envelope.event, SharedEvent::Unknown) => {
                    log::debug!("ignoring REQUEST-RESPONSE frame with an unrecognized eventType");
                }
                Ok(Frame::Event(event)) => {
                    if tx.send(Inbound::Event(event)).await.is_err() {
                        break;
                    }
                }
                Ok(Frame::RequestResponse(envelope)) => {
                    if tx
                        .send(Inbound::Request {
                            message_id: envelope.message_id,
                            event: envelope.event,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(err) => {
                    log::error!("protocol violation reading channel frame: {err}");
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
    use gateway_sync_protocol::model::{Attribute, EventSource, ValueType};
    use gateway_sync_protocol::transport::duplex_pair;
    use gateway_sync_store::{InMemoryAssetStore, StaticTokenProvider};

    fn connection() -> GatewayConnection {
        GatewayConnection {
            realm: "master".to_string(),
            host: "manager.example".to_string(),
            port: 443,
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            secure: true,
            disabled: false,
        }
    }

    fn client_with_store(store: Arc<InMemoryAssetStore>) -> Arc<GatewayClient> {
        GatewayClient::new(
            connection(),
            store,
            Arc::new(StaticTokenProvider::accepting("tok")),
            ClientConfig::default(),
        )
    }

    #[tokio::test]
    async fn serves_initial_index_from_local_store() {
        let store = Arc::new(InMemoryAssetStore::new());
        store
            .put(Asset::new("room1", 1, "Room 1", "Room", None, "gatewayrealm", 0))
            .await
            .unwrap();
        let client = client_with_store(store);

        let (manager_end, gateway_end) = duplex_pair();
        let cancel = CancellationToken::new();
        let client_clone = client.clone();
        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move { client_clone.serve_connection(gateway_end, &cancel_clone).await });

        let (manager_sender, mut manager_receiver) = manager_end.split();
        let frame = encode_request_response(&RequestResponseEnvelope {
            message_id: gateway_sync_protocol::codec::MSG_ID_GATEWAY_ASSET_READ.to_string(),
            event: SharedEvent::ReadAssets(gateway_sync_protocol::model::ReadAssetsEvent {
                query: AssetQuery::initial_index(),
            }),
        })
        .unwrap();
        manager_sender.send(frame);

        let reply_frame = manager_receiver.recv().await.unwrap();
        let Frame::RequestResponse(envelope) = codec::decode(&reply_frame).unwrap() else {
            panic!("expected a request-response reply");
        };
        let SharedEvent::AssetsRead(read) = envelope.event else {
            panic!("expected AssetsRead");
        };
        assert_eq!(read.assets.len(), 1);
        assert_eq!(read.assets[0].id(), "room1");

        cancel.cancel();
        handle.abort();
    }

    #[tokio::test]
    async fn create_for_existing_id_is_treated_as_update() {
        let store = Arc::new(InMemoryAssetStore::new());
        store
            .put(Asset::new("room1", 1, "Room 1", "Room", None, "gatewayrealm", 0))
            .await
            .unwrap();
        let client = client_with_store(store.clone());
        let result = client
            .apply_asset_mutation(AssetEvent {
                cause: AssetEventCause::Create,
                asset: Asset::new("room1", 1, "Room 1 Renamed", "Room", None, "gatewayrealm", 0),
                changed_attributes: vec![],
            })
            .await;
        assert_eq!(*result.asset.version(), 2);
        assert_eq!(store.get("room1").await.unwrap().name(), "Room 1 Renamed");
    }

    #[tokio::test]
    async fn delete_for_absent_id_is_a_noop() {
        let store = Arc::new(InMemoryAssetStore::new());
        let client = client_with_store(store);
        client
            .apply_asset_mutation(AssetEvent {
                cause: AssetEventCause::Delete,
                asset: Asset::new("missing", 1, "x", "Room", None, "gatewayrealm", 0),
                changed_attributes: vec![],
            })
            .await;
    }

    #[tokio::test]
    async fn push_attribute_event_fails_when_disconnected() {
        let store = Arc::new(InMemoryAssetStore::new());
        let client = client_with_store(store);
        let sent = client.push_attribute_event(AttributeEvent {
            attribute_ref: gateway_sync_protocol::model::AttributeRef::new("room1", "temperature"),
            value: Some(serde_json::json!(21.0)),
            timestamp: 0,
            source: EventSource::Sensor,
            realm: "master".to_string(),
            parent_id: None,
        });
        assert!(!sent);
    }

    #[tokio::test]
    async fn attribute_write_updates_local_attribute_and_bumps_version() {
        let store = Arc::new(InMemoryAssetStore::new());
        let mut asset = Asset::new("room1", 1, "Room 1", "Room", None, "gatewayrealm", 0);
        asset
            .attributes_mut()
            .insert("temperature".to_string(), Attribute::new("temperature", ValueType::Number));
        store.put(asset).await.unwrap();
        let client = client_with_store(store.clone());
        let (endpoint, _peer) = duplex_pair();
        let (sender, _receiver) = endpoint.split();

        client
            .apply_attribute_write(
                &sender,
                AttributeEvent {
                    attribute_ref: gateway_sync_protocol::model::AttributeRef::new("room1", "temperature"),
                    value: Some(serde_json::json!(22.5)),
                    timestamp: 123,
                    source: EventSource::Client,
                    realm: "master".to_string(),
                    parent_id: None,
                },
            )
            .await;

        let updated = store.get("room1").await.unwrap();
        assert_eq!(*updated.version(), 2);
        assert_eq!(
            updated.attributes().get("temperature").unwrap().value,
            Some(serde_json::json!(22.5))
        );
    }
}
