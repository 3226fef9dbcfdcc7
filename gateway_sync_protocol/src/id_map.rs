// Licensed under the MIT License.

//! Deterministic two-way mapping between a gateway-local asset id and its mirrored id
//! in the manager, per `mapId`/`unmapId` in the component design.

use std::collections::HashMap;
use std::sync::RwLock;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{GatewaySyncError, Result};

/// Length, in characters, of every asset id in this system.
pub const ASSET_ID_LEN: usize = 22;

const BASE62_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Fixed at deployment and never changed afterward: changing it would invalidate
/// every previously-computed mirrored id.
const HMAC_KEY: &[u8] = b"gateway-sync-id-mapper-v1";

fn base62_encode(bytes: &[u8], len: usize) -> String {
    // Treat the digest as a big base-256 number and repeatedly reduce it mod 62. The
    // digest is far longer than needed for `len` output characters, so truncating the
    // *output* rather than the input keeps the full digest's entropy in play.
    let mut digits = bytes.to_vec();
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let mut remainder: u32 = 0;
        for byte in &mut digits {
            let acc = (remainder << 8) | u32::from(*byte);
            *byte = (acc / 62) as u8;
            remainder = acc % 62;
        }
        out.push(BASE62_ALPHABET[remainder as usize]);
    }
    out.reverse();
    String::from_utf8(out).expect("base62 alphabet is ASCII")
}

/// `mapId(G, L)`: a deterministic 22-character id derived from a keyed hash of
/// `gateway_id || local_id`. Collisions across gateways are statistically
/// impossible; the mapping is pure for the lifetime of the manager.
#[must_use]
pub fn map_id(gateway_id: &str, local_id: &str) -> String {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(HMAC_KEY)
        .expect("HMAC accepts keys of any length");
    mac.update(gateway_id.as_bytes());
    mac.update(b"\0");
    mac.update(local_id.as_bytes());
    let digest = mac.finalize().into_bytes();
    base62_encode(&digest, ASSET_ID_LEN)
}

/// Per-gateway reverse table populated at mirror creation time, since the hash itself
/// is not reversible. Guarded by an `RwLock` so lookups (the common case, on every
/// steady-state write-through) don't serialize behind each other.
#[derive(Default)]
pub struct IdMapper {
    /// gateway id -> (mirrored id -> local id)
    reverse: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl IdMapper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the mirrored id for `local_id` under `gateway_id` and records the
    /// reverse mapping so `unmap_id` can later recover `local_id`.
    ///
    /// # Errors
    /// Returns [`GatewaySyncError::DuplicateMapping`] if a *different* local id is
    /// already recorded for the resulting mirrored id under this gateway.
    pub fn map_and_record(&self, gateway_id: &str, local_id: &str) -> Result<String> {
        let mirrored_id = map_id(gateway_id, local_id);
        let mut reverse = self.reverse.write().expect("id mapper lock poisoned");
        let gateway_table = reverse.entry(gateway_id.to_string()).or_default();
        match gateway_table.get(&mirrored_id) {
            Some(existing) if existing != local_id => {
                return Err(GatewaySyncError::DuplicateMapping {
                    mirrored_id: mirrored_id.clone(),
                })
            }
            _ => {
                gateway_table.insert(mirrored_id.clone(), local_id.to_string());
            }
        }
        Ok(mirrored_id)
    }

    /// `unmapId(G, M)`: returns the local id that produced `mirrored_id`, if this
    /// mapper has recorded it.
    #[must_use]
    pub fn unmap_id(&self, gateway_id: &str, mirrored_id: &str) -> Option<String> {
        self.reverse
            .read()
            .expect("id mapper lock poisoned")
            .get(gateway_id)
            .and_then(|table| table.get(mirrored_id))
            .cloned()
    }

    /// Removes every mapping recorded for `gateway_id`, e.g. when its mirrored subtree
    /// is torn down on gateway deletion.
    pub fn clear_gateway(&self, gateway_id: &str) {
        self.reverse
            .write()
            .expect("id mapper lock poisoned")
            .remove(gateway_id);
    }

    /// Removes the single mapping for `local_id` under `gateway_id`, e.g. once the
    /// reconciler has deleted that asset from the mirror. A no-op if no such mapping is
    /// recorded.
    pub fn forget(&self, gateway_id: &str, local_id: &str) {
        let mirrored_id = map_id(gateway_id, local_id);
        if let Some(table) = self
            .reverse
            .write()
            .expect("id mapper lock poisoned")
            .get_mut(gateway_id)
        {
            table.remove(&mirrored_id);
        }
    }

    /// All mirrored ids currently recorded for `gateway_id`.
    #[must_use]
    pub fn mirrored_ids(&self, gateway_id: &str) -> Vec<String> {
        self.reverse
            .read()
            .expect("id mapper lock poisoned")
            .get(gateway_id)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_id_is_pure() {
        let a = map_id("gw1", "local1");
        let b = map_id("gw1", "local1");
        assert_eq!(a, b);
        assert_eq!(a.len(), ASSET_ID_LEN);
    }

    #[test]
    fn map_id_differs_by_gateway() {
        let a = map_id("gw1", "local1");
        let b = map_id("gw2", "local1");
        assert_ne!(a, b);
    }

    #[test]
    fn round_trip_through_mapper() {
        let mapper = IdMapper::new();
        let mirrored = mapper.map_and_record("gw1", "local1").unwrap();
        assert_eq!(mapper.unmap_id("gw1", &mirrored).as_deref(), Some("local1"));
    }

    #[test]
    fn unmap_unknown_id_is_none() {
        let mapper = IdMapper::new();
        assert_eq!(mapper.unmap_id("gw1", "nope"), None);
    }

    #[test]
    fn remapping_same_pair_is_idempotent() {
        let mapper = IdMapper::new();
        let a = mapper.map_and_record("gw1", "local1").unwrap();
        let b = mapper.map_and_record("gw1", "local1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn clear_gateway_drops_reverse_entries() {
        let mapper = IdMapper::new();
        let mirrored = mapper.map_and_record("gw1", "local1").unwrap();
        mapper.clear_gateway("gw1");
        assert_eq!(mapper.unmap_id("gw1", &mirrored), None);
    }
}
