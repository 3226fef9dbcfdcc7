// Licensed under the MIT License.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Selects which parts of an [`Asset`](super::asset::Asset) a read request returns.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Builder)]
#[builder(setter(into, strip_option), default)]
pub struct AssetQuerySelect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_attributes: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_path: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_parent_info: Option<bool>,
}

/// The asset query object used in read requests, as described in the external
/// interfaces contract: `{recursive?, ids?, parents?, select, tenant?}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Builder)]
#[builder(setter(into, strip_option), default)]
pub struct AssetQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<String>>,
    #[serde(default)]
    pub select: AssetQuerySelect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

impl AssetQuery {
    /// The query used for the initial handshake index fetch: ids and versions only.
    #[must_use]
    pub fn initial_index() -> Self {
        Self {
            recursive: Some(true),
            select: AssetQuerySelect {
                exclude_attributes: Some(true),
                exclude_path: Some(true),
                exclude_parent_info: Some(true),
            },
            ..Default::default()
        }
    }

    /// The query used for a single sync batch of the given ids.
    #[must_use]
    pub fn batch(ids: Vec<String>) -> Self {
        Self {
            ids: Some(ids),
            select: AssetQuerySelect {
                exclude_path: Some(true),
                exclude_parent_info: Some(true),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
