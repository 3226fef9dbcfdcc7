// Licensed under the MIT License.

//! The asset/attribute/event data model shared by every layer of the gateway
//! synchronization subsystem.

mod asset;
mod attribute;
mod event;
mod gateway;
mod query;

pub use asset::Asset;
pub use attribute::{gateway_attrs, Attribute, GatewayStatus, MetaItem, ValueType};
pub use event::{
    AssetEvent, AssetEventCause, AssetsReadEvent, AttributeEvent, AttributeRef,
    EventSource, GatewayDisconnectEvent, ReadAssetsEvent, SharedEvent,
};
pub use gateway::{GatewayAsset, GatewayConnection, GatewayCredentials};
pub use query::{AssetQuery, AssetQueryBuilder, AssetQuerySelect, AssetQuerySelectBuilder};
