// Licensed under the MIT License.

use serde::{Deserialize, Serialize};

use super::attribute::GatewayStatus;

/// Credentials minted for a gateway asset when it is created, used by the gateway
/// client to authenticate against the manager's OAuth2 token endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GatewayCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// The distinguished asset type representing a remote gateway, as described in the
/// data model. Carries the subset of a full [`Asset`](super::asset::Asset) this
/// subsystem actually reads and writes; the rest of the asset's fields live in the
/// asset store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GatewayAsset {
    pub id: String,
    pub realm: String,
    pub credentials: GatewayCredentials,
    pub status: GatewayStatus,
    pub disabled: bool,
}

impl GatewayAsset {
    #[must_use]
    pub fn new(id: impl Into<String>, realm: impl Into<String>, credentials: GatewayCredentials) -> Self {
        Self {
            id: id.into(),
            realm: realm.into(),
            credentials,
            status: GatewayStatus::Disconnected,
            disabled: false,
        }
    }
}

/// A configured reverse gateway-client connection: lets this manager instance act as a
/// client of another manager's gateway endpoint for one realm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GatewayConnection {
    pub realm: String,
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub client_secret: String,
    pub secure: bool,
    pub disabled: bool,
}

impl GatewayConnection {
    #[must_use]
    pub fn websocket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!(
            "{scheme}://{}:{}/websocket/events?Auth-Realm={}",
            self.host, self.port, self.realm
        )
    }

    #[must_use]
    pub fn token_endpoint(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!(
            "{scheme}://{}:{}/auth/realms/{}/protocol/openid-connect/token",
            self.host, self.port, self.realm
        )
    }
}
