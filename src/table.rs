//! The weak attachment table.
//!
//! Maps a carrier identity to that carrier's [`AttributeMap`] without keeping
//! the carrier alive. Shared carriers are remembered only through a weak
//! pointer; their entry is dead as soon as the last strong reference goes
//! away, and dead entries are swept lazily.
//!
//! # Layout
//!
//! The table is split into a power-of-two number of shards, each an
//! independent lock around a hash map. A carrier always lives in the shard
//! picked by the top bits of its key's hash, so two carriers only contend
//! when they share a shard, and no lock ever spans shards.
//!
//! # Creation races
//!
//! A lookup first tries the read lock. On a miss the new map is allocated
//! with no lock held and offered to the shard under the write lock; if
//! another thread got there first, its map wins and ours is discarded.
//!
//! # Reclamation
//!
//! Each shard remembers a sweep threshold. When an insertion finds the shard
//! at or above it, dead entries are extracted first and the threshold is
//! reset to twice the surviving size (never below the configured minimum),
//! which keeps sweeping amortised O(1) per insertion.
//! [`WeakTable::purge`] sweeps every shard on demand. Extracted entries are
//! dropped only after the shard lock has been released.
//!
//! While an entry exists, its weak pointer keeps the carrier's allocation
//! (not its contents) in place, so the address key cannot be handed to a
//! different carrier until the entry is gone.
//!
//! A property value holding a strong reference to its own carrier keeps
//! that carrier alive, and with it the entry. Such cycles are only broken by
//! [`WeakTable::remove`] or by dropping the table.

use alloc::{boxed::Box, vec::Vec};
use core::hash::BuildHasher;

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use triomphe::Arc;

use crate::{
    attribute_map::AttributeMap,
    carrier::{CarrierIdentity, CarrierKey, Liveness},
    lock::Lock,
};

struct Entry {
    liveness: Liveness,
    map: Arc<AttributeMap>,
}

struct Shard {
    entries: HashMap<CarrierKey, Entry, FxBuildHasher>,
    sweep_at: usize,
}

impl Shard {
    fn new(sweep_threshold: usize) -> Self {
        Self {
            entries: HashMap::default(),
            sweep_at: sweep_threshold,
        }
    }

    fn lookup(&self, key: &CarrierKey) -> Option<Arc<AttributeMap>> {
        self.entries
            .get(key)
            .filter(|entry| entry.liveness.is_alive())
            .map(|entry| Arc::clone(&entry.map))
    }

    fn sweep(&mut self, sweep_threshold: usize, reclaimed: &mut Vec<Entry>) {
        reclaimed.extend(
            self.entries
                .extract_if(|_, entry| !entry.liveness.is_alive())
                .map(|(_, entry)| entry),
        );
        self.sweep_at = (self.entries.len() * 2).max(sweep_threshold);
    }

    fn get_or_insert(
        &mut self,
        key: CarrierKey,
        liveness: Liveness,
        created: &Arc<AttributeMap>,
        sweep_threshold: usize,
        reclaimed: &mut Vec<Entry>,
    ) -> Arc<AttributeMap> {
        if let Some(entry) = self.entries.get_mut(&key) {
            if entry.liveness.is_alive() {
                return Arc::clone(&entry.map);
            }
            let stale = core::mem::replace(
                entry,
                Entry {
                    liveness,
                    map: Arc::clone(created),
                },
            );
            reclaimed.push(stale);
            return Arc::clone(created);
        }

        if self.entries.len() >= self.sweep_at {
            self.sweep(sweep_threshold, reclaimed);
        }
        self.entries.insert(
            key,
            Entry {
                liveness,
                map: Arc::clone(created),
            },
        );
        Arc::clone(created)
    }
}

/// Sharded, weakly keyed map from carriers to their attribute maps.
pub(crate) struct WeakTable {
    shards: Box<[Lock<Shard>]>,
    shard_bits: u32,
    sweep_threshold: usize,
    hasher: FxBuildHasher,
}

impl WeakTable {
    /// `shards` must be a power of two; `sweep_threshold` at least one.
    pub(crate) fn new(shards: usize, sweep_threshold: usize) -> Self {
        debug_assert!(shards.is_power_of_two());
        debug_assert!(sweep_threshold > 0);
        Self {
            shards: (0..shards)
                .map(|_| Lock::new(Shard::new(sweep_threshold)))
                .collect(),
            shard_bits: shards.trailing_zeros(),
            sweep_threshold,
            hasher: FxBuildHasher,
        }
    }

    fn shard(&self, key: &CarrierKey) -> (usize, &Lock<Shard>) {
        let index = match self.shard_bits {
            0 => 0,
            bits => (self.hasher.hash_one(key) >> (u64::BITS - bits)) as usize,
        };
        (index, &self.shards[index])
    }

    /// Returns the carrier's map, creating it on first access.
    pub(crate) fn get_or_create(&self, identity: CarrierIdentity) -> Arc<AttributeMap> {
        let (index, shard) = self.shard(identity.key());
        if let Some(map) = shard.read().lookup(identity.key()) {
            return map;
        }

        let created = Arc::new(AttributeMap::new());
        let (key, liveness) = identity.into_parts();
        let mut reclaimed = Vec::new();
        let map = shard.write().get_or_insert(
            key,
            liveness,
            &created,
            self.sweep_threshold,
            &mut reclaimed,
        );

        if Arc::ptr_eq(&map, &created) {
            tracing::trace!(shard = index, "attribute map created");
        }
        if !reclaimed.is_empty() {
            tracing::debug!(
                shard = index,
                reclaimed = reclaimed.len(),
                "swept dead carriers"
            );
        }
        map
    }

    /// Returns the carrier's map if it has one, without creating it.
    pub(crate) fn get(&self, identity: &CarrierIdentity) -> Option<Arc<AttributeMap>> {
        let (_, shard) = self.shard(identity.key());
        shard.read().lookup(identity.key())
    }

    /// Removes the carrier's map, returning it if the carrier had one.
    pub(crate) fn remove(&self, identity: &CarrierIdentity) -> Option<Arc<AttributeMap>> {
        let (_, shard) = self.shard(identity.key());
        let entry = shard.write().entries.remove(identity.key())?;
        entry.liveness.is_alive().then_some(entry.map)
    }

    /// Sweeps every shard, returning the number of dead entries reclaimed.
    pub(crate) fn purge(&self) -> usize {
        let mut total = 0;
        for (index, shard) in self.shards.iter().enumerate() {
            let mut reclaimed = Vec::new();
            shard.write().sweep(self.sweep_threshold, &mut reclaimed);
            if !reclaimed.is_empty() {
                tracing::debug!(
                    shard = index,
                    reclaimed = reclaimed.len(),
                    "swept dead carriers"
                );
            }
            total += reclaimed.len();
        }
        total
    }

    /// Number of live carriers with a map.
    pub(crate) fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .read()
                    .entries
                    .values()
                    .filter(|entry| entry.liveness.is_alive())
                    .count()
            })
            .sum()
    }

    pub(crate) fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

#[cfg(test)]
mod tests {
    use alloc::{string::String, sync::Arc as StdArc};

    use super::*;
    use crate::carrier::Carrier;

    static_assertions::assert_impl_all!(WeakTable: Send, Sync);

    #[test]
    fn test_same_carrier_same_map() {
        let table = WeakTable::new(4, 8);
        let carrier = StdArc::new(String::from("carrier"));

        let first = table.get_or_create(carrier.identity());
        let second = table.get_or_create(StdArc::clone(&carrier).identity());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_distinct_carriers_distinct_maps() {
        let table = WeakTable::new(1, 8);
        let a = StdArc::new(0_u8);
        let b = StdArc::new(0_u8);

        let map_a = table.get_or_create(a.identity());
        let map_b = table.get_or_create(b.identity());
        assert!(!Arc::ptr_eq(&map_a, &map_b));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_get_does_not_create() {
        let table = WeakTable::new(2, 8);
        let carrier = StdArc::new(());
        assert!(table.get(&carrier.identity()).is_none());
        table.get_or_create(carrier.identity());
        assert!(table.get(&carrier.identity()).is_some());
    }

    #[test]
    fn test_purge_reclaims_dead_carriers() {
        let table = WeakTable::new(2, 8);
        let alive = StdArc::new(1_u32);
        let dead = StdArc::new(2_u32);

        let map = table.get_or_create(dead.identity());
        map.insert("value", 2_u32.into());
        drop(map);
        table.get_or_create(alive.identity());

        drop(dead);
        assert_eq!(table.len(), 1);
        assert_eq!(table.purge(), 1);
        assert_eq!(table.purge(), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insertions_sweep_lazily() {
        let table = WeakTable::new(1, 4);
        for _ in 0..16 {
            let carrier = StdArc::new(0_u64);
            table.get_or_create(carrier.identity());
        }
        let total: usize = table.shards.iter().map(|s| s.read().entries.len()).sum();
        assert!(total <= 4, "dead entries accumulated: {total}");
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_remove() {
        let table = WeakTable::new(2, 8);
        let carrier = StdArc::new(());
        let map = table.get_or_create(carrier.identity());
        map.insert("x", 1_i32.into());

        let removed = table.remove(&carrier.identity()).unwrap();
        assert!(Arc::ptr_eq(&removed, &map));
        assert!(table.remove(&carrier.identity()).is_none());

        let fresh = table.get_or_create(carrier.identity());
        assert!(!Arc::ptr_eq(&fresh, &map));
        assert!(fresh.get("x").is_none());
    }

    #[test]
    fn test_value_carriers_are_pinned() {
        let table = WeakTable::new(4, 1);
        let map = table.get_or_create(13_i32.identity());
        map.insert("x", 1_i32.into());

        assert_eq!(table.purge(), 0);
        let again = table.get_or_create(13_i32.identity());
        assert!(Arc::ptr_eq(&map, &again));
    }

    #[test]
    fn test_single_shard_table() {
        let table = WeakTable::new(1, 1);
        assert_eq!(table.shard_count(), 1);
        let carrier = StdArc::new(());
        table.get_or_create(carrier.identity());
        assert_eq!(table.len(), 1);
    }
}
