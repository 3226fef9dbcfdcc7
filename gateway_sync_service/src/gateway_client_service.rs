// Licensed under the MIT License.

//! The reverse-mode gateway-client service: this manager instance dials out to
//! another manager's gateway endpoint, one [`GatewayClient`] per configured realm, with
//! at most one active connection per realm at a time. Modeled on the way
//! `azure_iot_operations_connector::deployment_artifacts::ConnectorWatcherService`
//! manages one worker per configured asset endpoint: a `RwLock`-guarded table of
//! running handles, started and stopped by realm.

use std::collections::HashMap;
use std::sync::Arc;

use gateway_sync_client::{ClientConfig, GatewayClient};
use gateway_sync_protocol::model::GatewayConnection;
use gateway_sync_store::{AssetStore, TokenProvider};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct RunningConnection {
    client: Arc<GatewayClient>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the set of reverse gateway-client connections configured on this manager
/// instance, one per realm. Starting a connection for a realm that already has one
/// running stops the old one first, matching the "at most one active connection per
/// realm" rule.
pub struct GatewayClientService {
    store: Arc<dyn AssetStore>,
    token_provider: Arc<dyn TokenProvider>,
    config: ClientConfig,
    connections: RwLock<HashMap<String, RunningConnection>>,
}

impl GatewayClientService {
    #[must_use]
    pub fn new(store: Arc<dyn AssetStore>, token_provider: Arc<dyn TokenProvider>, config: ClientConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            token_provider,
            config,
            connections: RwLock::new(HashMap::new()),
        })
    }

    /// Starts (or restarts, if already running) the client connection for
    /// `connection.realm`. A `disabled` connection is recorded but not run.
    pub async fn start(self: &Arc<Self>, connection: GatewayConnection) {
        let realm = connection.realm.clone();
        self.stop(&realm).await;
        if connection.disabled {
            return;
        }

        let client = GatewayClient::new(connection, self.store.clone(), self.token_provider.clone(), self.config.clone());
        let cancel = CancellationToken::new();
        let run_client = client.clone();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { run_client.run(run_cancel).await });

        self.connections.write().await.insert(
            realm,
            RunningConnection {
                client,
                cancel,
                handle,
            },
        );
    }

    /// Stops the running connection for `realm`, if any. A no-op if none is running.
    pub async fn stop(&self, realm: &str) {
        if let Some(running) = self.connections.write().await.remove(realm) {
            running.cancel.cancel();
            running.handle.abort();
        }
    }

    /// The client handle for `realm`, if a connection is currently configured (running
    /// or disabled-but-recorded).
    pub async fn client(&self, realm: &str) -> Option<Arc<GatewayClient>> {
        self.connections.read().await.get(realm).map(|running| running.client.clone())
    }

    /// All realms with a connection currently recorded.
    pub async fn realms(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }
}
