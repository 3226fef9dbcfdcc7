// Licensed under the MIT License.

//! The identity provider: mints OAuth2 client-credentials per gateway. Treated as an
//! external collaborator.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use gateway_sync_protocol::model::GatewayCredentials;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityProviderError {
    #[error("no client registered for gateway {0}")]
    NotFound(String),
}

/// Issues and revokes per-gateway OAuth2 client-credentials.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Mints a fresh client id/secret pair for `gateway_id`, replacing any previously
    /// issued credentials.
    async fn mint_credentials(&self, gateway_id: &str) -> GatewayCredentials;

    /// Validates a client-credentials presentation, returning the gateway id it
    /// belongs to.
    ///
    /// # Errors
    /// Returns [`IdentityProviderError::NotFound`] if no client matches.
    async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, IdentityProviderError>;

    /// Revokes the identity-provider client associated with `gateway_id`, e.g. when
    /// its gateway asset is deleted.
    ///
    /// # Errors
    /// Returns [`IdentityProviderError::NotFound`] if no client was registered.
    async fn remove_client(&self, gateway_id: &str) -> Result<(), IdentityProviderError>;
}

struct Registered {
    gateway_id: String,
    secret: String,
}

/// An in-memory [`IdentityProvider`] for tests and example binaries.
#[derive(Default)]
pub struct InMemoryIdentityProvider {
    clients: RwLock<HashMap<String, Registered>>,
}

impl InMemoryIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn mint_credentials(&self, gateway_id: &str) -> GatewayCredentials {
        let client_id = format!("gw-{}", Uuid::new_v4());
        let client_secret = Uuid::new_v4().to_string();
        self.clients.write().expect("lock poisoned").insert(
            client_id.clone(),
            Registered {
                gateway_id: gateway_id.to_string(),
                secret: client_secret.clone(),
            },
        );
        GatewayCredentials {
            client_id,
            client_secret,
        }
    }

    async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, IdentityProviderError> {
        self.clients
            .read()
            .expect("lock poisoned")
            .get(client_id)
            .filter(|registered| registered.secret == client_secret)
            .map(|registered| registered.gateway_id.clone())
            .ok_or_else(|| IdentityProviderError::NotFound(client_id.to_string()))
    }

    async fn remove_client(&self, gateway_id: &str) -> Result<(), IdentityProviderError> {
        let mut clients = self.clients.write().expect("lock poisoned");
        let before = clients.len();
        clients.retain(|_, registered| registered.gateway_id != gateway_id);
        if clients.len() == before {
            return Err(IdentityProviderError::NotFound(gateway_id.to_string()));
        }
        Ok(())
    }
}
