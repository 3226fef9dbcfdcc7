// Licensed under the MIT License.

//! The asset store: a CRUD/query service over persisted asset entities. Treated as an
//! external collaborator — this crate only defines the seam the rest of the workspace
//! programs against, plus an in-memory reference implementation used by tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use gateway_sync_protocol::model::Asset;
use thiserror::Error;

/// Errors the asset store can report back to a caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetStoreError {
    #[error("asset {0} not found")]
    NotFound(String),
    /// The optimistic-versioning write lost a race: the stored version has moved on
    /// since the caller last read it.
    #[error("version conflict on asset {asset_id}: expected {expected}, found {found}")]
    VersionConflict {
        asset_id: String,
        expected: u64,
        found: u64,
    },
    #[error("creating asset {0} would introduce a cycle")]
    WouldCycle(String),
}

/// A CRUD/query service over persisted asset entities, scoped per realm. Concurrent
/// writers to the same asset are detected by version mismatch; the loser retries or
/// fails, per the optimistic-versioning contract in the concurrency model.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn get(&self, asset_id: &str) -> Option<Asset>;

    /// All assets directly or transitively parented under `root_id`, including
    /// `root_id` itself if it exists.
    async fn children_of(&self, root_id: &str) -> Vec<Asset>;

    /// Creates `asset` if its id is unused, otherwise updates it in place.
    ///
    /// # Errors
    /// Returns [`AssetStoreError::VersionConflict`] if `asset`'s version is not newer
    /// than the currently stored version for an existing id, or
    /// [`AssetStoreError::WouldCycle`] if `asset`'s parent chain would cycle back to
    /// itself.
    async fn put(&self, asset: Asset) -> Result<(), AssetStoreError>;

    /// Deletes the asset and, recursively, every descendant. A delete for an absent id
    /// is a no-op, per the component design's delete tie-break. Used for whole-gateway
    /// teardown, where the entire mirrored subtree is known to be going away together.
    async fn delete_subtree(&self, asset_id: &str) -> Result<(), AssetStoreError>;

    /// Deletes exactly `asset_id`, without touching any descendant. A delete for an
    /// absent id is a no-op. Used by the reconciler, which computes its own
    /// children-before-parent deletion order across a precise id set rather than
    /// relying on cascading subtree deletion.
    async fn delete_one(&self, asset_id: &str) -> Result<(), AssetStoreError>;

    /// Every asset currently held, in no particular order. Used by the gateway client
    /// to serve the manager's whole-inventory index read, where (unlike the manager's
    /// per-gateway mirror) there is no single known root to start a `children_of` walk
    /// from.
    async fn all(&self) -> Vec<Asset>;
}

/// An in-memory [`AssetStore`], used by the rest of the workspace's test suites and by
/// the example binaries. Not suitable for production use — no persistence, no
/// cross-process coordination.
#[derive(Default)]
pub struct InMemoryAssetStore {
    assets: RwLock<HashMap<String, Asset>>,
}

impl InMemoryAssetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn would_cycle(assets: &HashMap<String, Asset>, asset: &Asset) -> bool {
        let mut current = asset.parent_id().clone();
        let mut hops = 0usize;
        while let Some(parent_id) = current {
            if parent_id == *asset.id() {
                return true;
            }
            current = assets.get(&parent_id).and_then(|a| a.parent_id().clone());
            hops += 1;
            if hops > assets.len() + 1 {
                // Already cyclic among existing assets; treat as a cycle rather than
                // loop forever.
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn get(&self, asset_id: &str) -> Option<Asset> {
        self.assets.read().expect("lock poisoned").get(asset_id).cloned()
    }

    async fn children_of(&self, root_id: &str) -> Vec<Asset> {
        let assets = self.assets.read().expect("lock poisoned");
        let Some(root) = assets.get(root_id) else {
            return Vec::new();
        };
        let mut result = vec![root.clone()];
        let mut frontier = vec![root_id.to_string()];
        while let Some(parent) = frontier.pop() {
            for asset in assets.values() {
                if asset.parent_id().as_deref() == Some(parent.as_str()) {
                    result.push(asset.clone());
                    frontier.push(asset.id().clone());
                }
            }
        }
        result
    }

    async fn put(&self, asset: Asset) -> Result<(), AssetStoreError> {
        let mut assets = self.assets.write().expect("lock poisoned");
        if Self::would_cycle(&assets, &asset) {
            return Err(AssetStoreError::WouldCycle(asset.id().clone()));
        }
        if let Some(existing) = assets.get(asset.id()) {
            if asset.version() < existing.version() {
                return Err(AssetStoreError::VersionConflict {
                    asset_id: asset.id().clone(),
                    expected: existing.version(),
                    found: *asset.version(),
                });
            }
            if asset.version() == existing.version() {
                // Reapplying the same version is idempotent: the store already holds
                // this exact state, so there is nothing to mutate.
                return Ok(());
            }
        }
        assets.insert(asset.id().clone(), asset);
        Ok(())
    }

    async fn delete_subtree(&self, asset_id: &str) -> Result<(), AssetStoreError> {
        let mut assets = self.assets.write().expect("lock poisoned");
        let mut to_delete = vec![asset_id.to_string()];
        let mut frontier = vec![asset_id.to_string()];
        while let Some(parent) = frontier.pop() {
            let children: Vec<String> = assets
                .values()
                .filter(|a| a.parent_id().as_deref() == Some(parent.as_str()))
                .map(|a| a.id().clone())
                .collect();
            frontier.extend(children.iter().cloned());
            to_delete.extend(children);
        }
        for id in to_delete {
            assets.remove(&id);
        }
        Ok(())
    }

    async fn delete_one(&self, asset_id: &str) -> Result<(), AssetStoreError> {
        self.assets.write().expect("lock poisoned").remove(asset_id);
        Ok(())
    }

    async fn all(&self) -> Vec<Asset> {
        self.assets.read().expect("lock poisoned").values().cloned().collect()
    }
}
