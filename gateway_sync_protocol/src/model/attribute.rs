// Licensed under the MIT License.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The type of value an [`Attribute`] carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueType {
    Boolean,
    Number,
    String,
    GeoPoint,
}

/// A single entry of attribute metadata, e.g. `AGENT_LINK` or `UNIT_TYPE`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaItem {
    /// A boolean flag, e.g. `READ_ONLY` or `ACCESS_PUBLIC_READ`.
    Flag(bool),
    /// A string-valued entry, e.g. `UNIT_TYPE` or `AGENT_LINK`.
    Text(String),
    /// An arbitrary JSON entry for metadata this model does not special-case.
    Json(serde_json::Value),
}

/// A named, typed value on an [`Asset`](super::asset::Asset), with metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Milliseconds since the Unix epoch, the unit the wire protocol uses.
    pub timestamp: i64,
    #[serde(default)]
    pub meta: HashMap<String, MetaItem>,
}

impl Attribute {
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            value: None,
            timestamp: 0,
            meta: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: serde_json::Value, timestamp: i64) -> Self {
        self.value = Some(value);
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        matches!(self.meta.get("READ_ONLY"), Some(MetaItem::Flag(true)))
    }
}

/// Well-known gateway asset attribute names, used to read/write gateway status and
/// credentials without stringly-typed call sites scattered through the connector.
pub mod gateway_attrs {
    pub const CLIENT_ID: &str = "clientId";
    pub const CLIENT_SECRET: &str = "clientSecret";
    pub const STATUS: &str = "status";
    pub const DISABLED: &str = "disabled";
}

/// The lifecycle status of a gateway asset's connector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayStatus {
    Disconnected,
    Connecting,
    Syncing,
    Connected,
    Disabled,
    Error,
}

impl Default for GatewayStatus {
    fn default() -> Self {
        Self::Disconnected
    }
}
