// Licensed under the MIT License.

use serde::{Deserialize, Serialize};

use super::asset::Asset;
use super::query::AssetQuery;

/// `(assetId, attributeName)` — the addressable unit for attribute events.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeRef {
    #[serde(rename = "assetId")]
    pub asset_id: String,
    #[serde(rename = "attributeName")]
    pub attribute_name: String,
}

impl AttributeRef {
    #[must_use]
    pub fn new(asset_id: impl Into<String>, attribute_name: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            attribute_name: attribute_name.into(),
        }
    }
}

/// Where an [`AttributeEvent`] originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSource {
    Client,
    Internal,
    Sensor,
    Gateway,
    AttributeLinking,
}

/// `(ref, value, timestamp, source, realm, parentId)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeEvent {
    #[serde(rename = "ref")]
    pub attribute_ref: AttributeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "t")]
    pub timestamp: i64,
    pub source: EventSource,
    pub realm: String,
    #[serde(default, rename = "parentId")]
    pub parent_id: Option<String>,
}

/// The kind of change an [`AssetEvent`] reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetEventCause {
    Create,
    Update,
    Delete,
}

/// `(cause, asset, changedAttributes[])`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetEvent {
    pub cause: AssetEventCause,
    pub asset: Asset,
    #[serde(default, rename = "updatedProperties")]
    pub changed_attributes: Vec<String>,
}

/// A reply to a `gateway-disconnect` notification or a plain notice that the peer is
/// closing the channel, e.g. because the gateway asset was disabled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GatewayDisconnectEvent {
    pub reason: String,
}

/// A request to read assets from the gateway's local store, used both for the initial
/// index fetch and for subsequent batch fetches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadAssetsEvent {
    pub query: AssetQuery,
}

/// The gateway's reply to a [`ReadAssetsEvent`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetsReadEvent {
    pub assets: Vec<Asset>,
}

/// The tagged union of events that can travel in either an `EVENT:` frame or the
/// `event` field of a `REQUEST-RESPONSE:` envelope. The discriminator is the
/// `eventType` field, matched explicitly by the codec rather than through any runtime
/// class registry.
///
/// [`SharedEvent::Unknown`] absorbs any `eventType` this build doesn't recognize, so a
/// newer peer introducing an event kind doesn't fail decoding outright: the frame still
/// parses, and the caller logs and drops it rather than treating it as malformed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "kebab-case")]
pub enum SharedEvent {
    Attribute(AttributeEvent),
    Asset(AssetEvent),
    #[serde(rename = "gateway-disconnect")]
    GatewayDisconnect(GatewayDisconnectEvent),
    ReadAssets(ReadAssetsEvent),
    AssetsRead(AssetsReadEvent),
    #[serde(other)]
    Unknown,
}
