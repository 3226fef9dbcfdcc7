// Licensed under the MIT License.

//! Exercises the admin surface end-to-end: a connected gateway, then a forwarded
//! create under it through [`AdminGatewayApi::forward_asset_create`].

use std::sync::Arc;
use std::time::Duration;

use gateway_sync_protocol::codec::{self, encode_request_response, Frame, RequestResponseEnvelope};
use gateway_sync_protocol::model::{Asset, AssetsReadEvent, GatewayAsset, GatewayCredentials, SharedEvent};
use gateway_sync_protocol::transport::duplex_pair;
use gateway_sync_service::{AdminGatewayApi, GatewaySyncConfig, GatewaySyncService};
use gateway_sync_store::{InMemoryAssetStore, InMemoryEventBus, StaticTokenProvider};

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

/// Answers the initial index read with an empty inventory, then echoes every
/// forwarded asset create request unchanged, as a real gateway client would.
async fn serve_gateway_side(
    mut receiver: gateway_sync_protocol::transport::ChannelReceiver,
    sender: gateway_sync_protocol::transport::ChannelSender,
) {
    while let Some(frame) = receiver.recv().await {
        let Frame::RequestResponse(envelope) = codec::decode(&frame).unwrap() else {
            continue;
        };
        let reply_event = match envelope.event {
            SharedEvent::ReadAssets(_) => SharedEvent::AssetsRead(AssetsReadEvent { assets: vec![] }),
            asset_event @ SharedEvent::Asset(_) => asset_event,
            _ => continue,
        };
        let reply = encode_request_response(&RequestResponseEnvelope {
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
async fn forward_asset_create_mirrors_the_gateways_echo() {
    let store = Arc::new(InMemoryAssetStore::new());
    let bus = Arc::new(InMemoryEventBus::new(16));
    let service = GatewaySyncService::with_default_reverse_store(
        store.clone(),
        bus,
        Arc::new(StaticTokenProvider::accepting("tok")),
        GatewaySyncConfig::default(),
    );

    let gw = gateway("gw-admin-test-0000000");
    store
        .put(Asset::new(gw.id.clone(), 1, "gw", "Gateway", None, gw.realm.clone(), 0))
        .await
        .unwrap();
    service.register_gateway(gw.clone());

    let (manager_end, gateway_end) = duplex_pair();
    let (gw_sender, gw_receiver) = gateway_end.split();
    tokio::spawn(serve_gateway_side(gw_receiver, gw_sender));

    let service_clone = service.clone();
    let gw_id = gw.id.clone();
    let run_handle = tokio::spawn(async move { service_clone.accept_gateway_connection(&gw_id, manager_end).await });

    // The connector reaches CONNECTED asynchronously once the handshake/sync exchange
    // above completes; retry the forward until it stops seeing GATEWAY_NOT_CONNECTED.
    let mut attempts = 0;
    let created = loop {
        let new_asset = Asset::new("room-new", 1, "New Room", "Room", None, "ignored", 0);
        match service.forward_asset_create(&gw.id, new_asset).await {
            Ok(asset) => break asset,
            Err(_) if attempts < 200 => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Err(err) => panic!("forward_asset_create never succeeded: {err}"),
        }
    };
    assert_eq!(created.name(), "New Room");
    assert_eq!(created.parent_id().as_deref(), Some(gw.id.as_str()));
    assert!(store.get(created.id()).await.is_some());

    run_handle.abort();
}
