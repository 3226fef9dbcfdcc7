// Licensed under the MIT License.

use std::collections::HashMap;

use derive_getters::Getters;
use serde::{Deserialize, Serialize};

use super::attribute::Attribute;

/// A node in an asset tree. Assets form a rooted forest per [`realm`](Asset::realm);
/// cycles are forbidden by construction (a single `parent_id` field, enforced acyclic
/// at the store level).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Getters)]
pub struct Asset {
    /// Opaque, 22-character high-entropy id.
    id: String,
    /// Monotone per-asset version, used to detect stale writes during reconciliation.
    version: u64,
    name: String,
    #[serde(rename = "type")]
    asset_type: String,
    #[serde(default, rename = "parentId")]
    parent_id: Option<String>,
    realm: String,
    #[serde(rename = "createdAt")]
    created_at: i64,
    /// Root-to-node id list. Derivable from the tree; carried on the wire when the
    /// read query does not set `excludePath`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<Vec<String>>,
    #[serde(default)]
    attributes: HashMap<String, Attribute>,
}

impl Asset {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        version: u64,
        name: impl Into<String>,
        asset_type: impl Into<String>,
        parent_id: Option<String>,
        realm: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            version,
            name: name.into(),
            asset_type: asset_type.into(),
            parent_id,
            realm: realm.into(),
            created_at,
            path: None,
            attributes: HashMap::new(),
        }
    }

    pub fn attributes_mut(&mut self) -> &mut HashMap<String, Attribute> {
        &mut self.attributes
    }

    pub fn set_parent_id(&mut self, parent_id: Option<String>) {
        self.parent_id = parent_id;
    }

    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub fn set_realm(&mut self, realm: impl Into<String>) {
        self.realm = realm.into();
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// `true` if this asset's type marks it as a gateway asset.
    #[must_use]
    pub fn is_gateway(&self) -> bool {
        self.asset_type == "Gateway"
    }
}
