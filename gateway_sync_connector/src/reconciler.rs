// Licensed under the MIT License.

//! Applies the set-difference of remote vs. mirrored inventory into the manager's
//! asset store, preserving parent/child ordering. This is the only component allowed
//! to set the gateway-descendant parent edge (I2).

use std::collections::HashSet;
use std::sync::Arc;

use gateway_sync_protocol::id_map::IdMapper;
use gateway_sync_protocol::model::{Asset, GatewayAsset};
use gateway_sync_store::{AssetStore, AssetStoreError};

/// The outcome of applying one batch of gateway-reported assets to the mirror.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Mirrored ids created or updated this round.
    pub applied: Vec<String>,
    /// Local assets whose mirrored parent has not materialized yet (the parent is
    /// neither already in the store nor in this same batch). Carry these into the
    /// next batch, per the component design's "child is queued" rule.
    pub deferred: Vec<Asset>,
    /// Mirrored ids the store reported a version conflict for; the reconciler does
    /// not retry these itself — the connector refetches them on the next round.
    pub version_conflicts: Vec<String>,
}

/// Pure(-ish — the only side effect is the store mutation) function of
/// `(currentMirror, incomingAssets, incomingDeletions) -> storeMutations`.
pub struct MirrorReconciler {
    store: Arc<dyn AssetStore>,
    id_mapper: Arc<IdMapper>,
}

impl MirrorReconciler {
    #[must_use]
    pub fn new(store: Arc<dyn AssetStore>, id_mapper: Arc<IdMapper>) -> Self {
        Self { store, id_mapper }
    }

    /// Applies one batch of locally-reported gateway assets (plus anything deferred
    /// from a previous round) to the mirror, in parent-before-child order.
    pub async fn apply_batch(
        &self,
        gateway: &GatewayAsset,
        mut pending: Vec<Asset>,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        loop {
            let mut made_progress = false;
            let mut still_pending = Vec::new();
            for local in pending {
                match self.mirrored_parent_ready(gateway, &local).await {
                    Some(mirrored_parent_id) => {
                        made_progress = true;
                        match self.upsert_one(gateway, &local, mirrored_parent_id).await {
                            Ok(mirrored_id) => report.applied.push(mirrored_id),
                            Err(AssetStoreError::VersionConflict { asset_id, .. }) => {
                                log::warn!(
                                    "version conflict reconciling {asset_id} under gateway {}; will refetch",
                                    gateway.id
                                );
                                report.version_conflicts.push(asset_id);
                            }
                            Err(err) => {
                                log::error!(
                                    "failed to reconcile asset {} under gateway {}: {err}",
                                    local.id(),
                                    gateway.id
                                );
                            }
                        }
                    }
                    None => still_pending.push(local),
                }
            }
            pending = still_pending;
            if !made_progress || pending.is_empty() {
                break;
            }
        }
        report.deferred = pending;
        report
    }

    /// `Some(mirrored_parent_id)` if `local`'s parent already exists in the mirror (or
    /// `local` is a root, whose mirrored parent is the gateway asset itself), `None`
    /// if the parent has not materialized yet and `local` must be deferred.
    async fn mirrored_parent_ready(&self, gateway: &GatewayAsset, local: &Asset) -> Option<String> {
        match local.parent_id() {
            None => Some(gateway.id.clone()),
            Some(local_parent_id) => {
                let mirrored_parent_id = self
                    .id_mapper
                    .map_and_record(&gateway.id, local_parent_id)
                    .ok()?;
                if self.store.get(&mirrored_parent_id).await.is_some() {
                    Some(mirrored_parent_id)
                } else {
                    None
                }
            }
        }
    }

    /// Creates or updates the mirror for one local asset. Realm is always overridden
    /// to the gateway's realm, never trusted from the gateway, per the connector's
    /// tie-break rules.
    async fn upsert_one(
        &self,
        gateway: &GatewayAsset,
        local: &Asset,
        mirrored_parent_id: String,
    ) -> Result<String, AssetStoreError> {
        let mirrored_id = self
            .id_mapper
            .map_and_record(&gateway.id, local.id())
            .map_err(|_| AssetStoreError::WouldCycle(local.id().clone()))?;
        let mut mirror = local.clone();
        mirror.set_id(mirrored_id.clone());
        mirror.set_parent_id(Some(mirrored_parent_id));
        mirror.set_realm(gateway.realm.clone());
        self.store.put(mirror).await?;
        Ok(mirrored_id)
    }

    /// Deletes every mirrored id in `mirrored_ids_to_delete`, children before parents,
    /// per the component design's deletion tie-break. A delete for an id that is not
    /// present is a no-op (handled by [`AssetStore::delete_one`]).
    pub async fn apply_deletions(&self, mirrored_ids_to_delete: &HashSet<String>) {
        let mut remaining: HashSet<String> = mirrored_ids_to_delete.clone();
        while !remaining.is_empty() {
            let mut leaves = Vec::new();
            for id in &remaining {
                let has_remaining_child = {
                    let mut any = false;
                    for other in &remaining {
                        if other == id {
                            continue;
                        }
                        if let Some(asset) = self.store.get(other).await {
                            if asset.parent_id().as_deref() == Some(id.as_str()) {
                                any = true;
                                break;
                            }
                        }
                    }
                    any
                };
                if !has_remaining_child {
                    leaves.push(id.clone());
                }
            }
            if leaves.is_empty() {
                // No leaf found among the remaining set: break any accidental cycle by
                // deleting the rest in arbitrary order rather than looping forever.
                leaves = remaining.iter().cloned().collect();
            }
            for id in &leaves {
                if let Err(err) = self.store.delete_one(id).await {
                    log::error!("failed to delete mirrored asset {id}: {err}");
                }
                remaining.remove(id);
            }
        }
    }

    /// Computes the mirrored id set currently present under `gateway_id`, by
    /// unmapping every asset in the store's subtree for the gateway back to its local
    /// id. Used by the connector to compute `C \ R` during inventory sync.
    #[must_use]
    pub fn id_mapper(&self) -> &Arc<IdMapper> {
        &self.id_mapper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_sync_protocol::id_map::map_id;
    use gateway_sync_protocol::model::GatewayCredentials;
    use gateway_sync_store::InMemoryAssetStore;

    fn gateway() -> GatewayAsset {
        GatewayAsset::new(
            "gateway1gateway1gwid1",
            "master",
            GatewayCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
        )
    }

    fn local_asset(id: &str, version: u64, parent: Option<&str>) -> Asset {
        Asset::new(id, version, id, "Room", parent.map(str::to_string), "gatewayrealm", 0)
    }

    fn reconciler() -> (MirrorReconciler, Arc<InMemoryAssetStore>) {
        let store = Arc::new(InMemoryAssetStore::new());
        let reconciler = MirrorReconciler::new(store.clone(), Arc::new(IdMapper::new()));
        (reconciler, store)
    }

    #[tokio::test]
    async fn applies_root_assets_directly_under_gateway() {
        let (reconciler, store) = reconciler();
        let gateway = gateway();
        store.put(gateway_root_asset(&gateway)).await.unwrap();
        let report = reconciler
            .apply_batch(&gateway, vec![local_asset("room1", 1, None)])
            .await;
        assert_eq!(report.applied.len(), 1);
        assert!(report.deferred.is_empty());
        let mirrored = store.get(&report.applied[0]).await.unwrap();
        assert_eq!(mirrored.parent_id().as_deref(), Some(gateway.id.as_str()));
        assert_eq!(mirrored.realm(), &gateway.realm);
    }

    #[tokio::test]
    async fn child_before_parent_in_same_batch_is_still_resolved() {
        let (reconciler, store) = reconciler();
        let gateway = gateway();
        store.put(gateway_root_asset(&gateway)).await.unwrap();
        // Room sent before its Building parent, within the same batch.
        let report = reconciler
            .apply_batch(
                &gateway,
                vec![
                    local_asset("room1", 1, Some("building1")),
                    local_asset("building1", 1, None),
                ],
            )
            .await;
        assert_eq!(report.applied.len(), 2);
        assert!(report.deferred.is_empty());
    }

    #[tokio::test]
    async fn defers_child_whose_parent_has_not_arrived_yet() {
        let (reconciler, store) = reconciler();
        let gateway = gateway();
        store.put(gateway_root_asset(&gateway)).await.unwrap();
        let report = reconciler
            .apply_batch(&gateway, vec![local_asset("room1", 1, Some("building1"))])
            .await;
        assert!(report.applied.is_empty());
        assert_eq!(report.deferred.len(), 1);

        // Building arrives in the next batch; room should be retried alongside it.
        let mut next_batch = report.deferred;
        next_batch.push(local_asset("building1", 1, None));
        let report2 = reconciler.apply_batch(&gateway, next_batch).await;
        assert_eq!(report2.applied.len(), 2);
    }

    #[tokio::test]
    async fn reapplying_same_index_is_idempotent() {
        let (reconciler, store) = reconciler();
        let gateway = gateway();
        store.put(gateway_root_asset(&gateway)).await.unwrap();
        let assets = vec![local_asset("room1", 1, None)];
        reconciler.apply_batch(&gateway, assets.clone()).await;
        let before = store.get(&map_id(&gateway.id, "room1")).await.unwrap();
        reconciler.apply_batch(&gateway, assets).await;
        let after = store.get(&map_id(&gateway.id, "room1")).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn deletions_remove_children_before_parents() {
        let (reconciler, store) = reconciler();
        let gateway = gateway();
        store.put(gateway_root_asset(&gateway)).await.unwrap();
        let report = reconciler
            .apply_batch(
                &gateway,
                vec![
                    local_asset("building1", 1, None),
                    local_asset("room1", 1, Some("building1")),
                ],
            )
            .await;
        assert_eq!(report.applied.len(), 2);

        let mut to_delete = HashSet::new();
        to_delete.insert(map_id(&gateway.id, "building1"));
        to_delete.insert(map_id(&gateway.id, "room1"));
        reconciler.apply_deletions(&to_delete).await;
        assert!(store.get(&map_id(&gateway.id, "building1")).await.is_none());
        assert!(store.get(&map_id(&gateway.id, "room1")).await.is_none());
    }

    #[tokio::test]
    async fn delete_of_absent_id_is_a_noop() {
        let (reconciler, _store) = reconciler();
        let mut to_delete = HashSet::new();
        to_delete.insert("does-not-exist-id-xx".to_string());
        reconciler.apply_deletions(&to_delete).await;
    }

    fn gateway_root_asset(gateway: &GatewayAsset) -> Asset {
        Asset::new(gateway.id.clone(), 1, "gw", "Gateway", None, gateway.realm.clone(), 0)
    }
}
