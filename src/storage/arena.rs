//! Generation-tagged arena of backends
//!
//! Every backend lives in an arena slot. Handles refer to backends by
//! [`BackendKey`] (slot index + generation); releasing or reshaping a backend
//! bumps the slot generation, so keys held by views stop resolving and report
//! [`Error::StaleView`] instead of reaching freed memory.
//!
//! Each entry also carries a view count (diagnostics only, it never blocks
//! a release) and a write version used to detect writes through aliases.

use super::StorageBackend;
use crate::error::{Error, Result};

/// Key of an arena entry: slot index plus the generation it was issued for
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BackendKey {
    index: u32,
    generation: u32,
}

impl BackendKey {
    /// Slot index
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation the key was issued for
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Entry<T> {
    value: T,
    views: usize,
    version: u64,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

/// Slot arena with generation checks
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

/// The arena type holding matrix storage
pub type BackendArena = Arena<StorageBackend>;

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<T> Arena<T> {
    /// Empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no entries are live
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Store a value and return its key
    pub fn insert(&mut self, value: T) -> BackendKey {
        let entry = Entry {
            value,
            views: 0,
            version: 0,
        };
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return BackendKey {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        BackendKey {
            index,
            generation: 0,
        }
    }

    fn entry(&self, key: BackendKey) -> Result<&Entry<T>> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(Error::StaleView)
    }

    fn entry_mut(&mut self, key: BackendKey) -> Result<&mut Entry<T>> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(Error::StaleView)
    }

    /// Whether `key` still resolves
    #[inline]
    pub fn contains(&self, key: BackendKey) -> bool {
        self.entry(key).is_ok()
    }

    /// Borrow the value behind `key`
    pub fn get(&self, key: BackendKey) -> Result<&T> {
        self.entry(key).map(|e| &e.value)
    }

    /// Mutably borrow the value behind `key`
    pub fn get_mut(&mut self, key: BackendKey) -> Result<&mut T> {
        self.entry_mut(key).map(|e| &mut e.value)
    }

    /// Remove the entry; every outstanding key to it becomes stale
    ///
    /// Returns `None` when the key was already stale.
    pub fn remove(&mut self, key: BackendKey) -> Option<T> {
        self.entry(key).ok()?;
        let slot = &mut self.slots[key.index as usize];
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.live -= 1;
        Some(entry.value)
    }

    /// Invalidate all outstanding keys but keep the value under a new key
    ///
    /// Used when the value is reshaped in place: old views must not read it
    /// with their stale extents.
    pub fn reissue(&mut self, key: BackendKey) -> Result<BackendKey> {
        let entry = self.entry_mut(key)?;
        entry.views = 0;
        entry.version += 1;
        let slot = &mut self.slots[key.index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        Ok(BackendKey {
            index: key.index,
            generation: slot.generation,
        })
    }

    /// Replace the value under a new key, invalidating old keys
    ///
    /// The replaced value is returned so the caller decides when to drop it.
    pub fn replace(&mut self, key: BackendKey, value: T) -> Result<(BackendKey, T)> {
        let new_key = self.reissue(key)?;
        let entry = self.entry_mut(new_key)?;
        let old = std::mem::replace(&mut entry.value, value);
        Ok((new_key, old))
    }

    /// Record a new view of the entry
    pub fn add_view(&mut self, key: BackendKey) -> Result<()> {
        self.entry_mut(key)?.views += 1;
        Ok(())
    }

    /// Record that a view was dropped; stale keys are ignored
    pub fn drop_view(&mut self, key: BackendKey) {
        if let Ok(entry) = self.entry_mut(key) {
            entry.views = entry.views.saturating_sub(1);
        }
    }

    /// Views currently recorded against the entry (0 for stale keys)
    pub fn num_views(&self, key: BackendKey) -> usize {
        self.entry(key).map_or(0, |e| e.views)
    }

    /// Write version of the entry
    pub fn version(&self, key: BackendKey) -> Result<u64> {
        self.entry(key).map(|e| e.version)
    }

    /// Record a write to the entry
    pub fn bump_version(&mut self, key: BackendKey) -> Result<u64> {
        let entry = self.entry_mut(key)?;
        entry.version += 1;
        Ok(entry.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_after_remove() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        assert_eq!(*arena.get(a).unwrap(), "a");
        assert_eq!(arena.remove(a), Some("a"));
        assert!(matches!(arena.get(a), Err(Error::StaleView)));
        assert_eq!(arena.remove(a), None);

        // slot reuse issues a fresh generation
        let b = arena.insert("b");
        assert_eq!(b.index(), a.index());
        assert_ne!(b.generation(), a.generation());
        assert!(arena.get(a).is_err());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_reissue_keeps_value() {
        let mut arena = Arena::new();
        let k = arena.insert(7u32);
        arena.add_view(k).unwrap();
        let k2 = arena.reissue(k).unwrap();
        assert!(!arena.contains(k));
        assert_eq!(*arena.get(k2).unwrap(), 7);
        assert_eq!(arena.num_views(k2), 0);
        // dropping a stale view does not touch the new entry
        arena.add_view(k2).unwrap();
        arena.drop_view(k);
        assert_eq!(arena.num_views(k2), 1);
    }

    #[test]
    fn test_versions() {
        let mut arena = Arena::new();
        let k = arena.insert(());
        assert_eq!(arena.version(k).unwrap(), 0);
        arena.bump_version(k).unwrap();
        assert_eq!(arena.version(k).unwrap(), 1);
        let (k2, _) = arena.replace(k, ()).unwrap();
        assert_eq!(arena.version(k2).unwrap(), 2);
    }
}
