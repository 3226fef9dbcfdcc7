// Licensed under the MIT License.

//! Trait boundaries for the collaborators the gateway synchronization subsystem
//! treats as external: the asset store, the identity provider, the event bus, and
//! OAuth2 token issuance. Each trait ships an in-memory reference implementation used
//! by the rest of the workspace's test suites; none of them is meant for production
//! use on its own.

pub mod asset_store;
pub mod event_bus;
pub mod identity_provider;
pub mod token_provider;

pub use asset_store::{AssetStore, AssetStoreError, InMemoryAssetStore};
pub use event_bus::{BusEvent, EventBus, InMemoryEventBus};
pub use identity_provider::{IdentityProvider, IdentityProviderError, InMemoryIdentityProvider};
pub use token_provider::{HttpTokenProvider, StaticTokenProvider, TokenError, TokenProvider};
