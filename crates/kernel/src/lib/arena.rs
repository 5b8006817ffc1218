// Stable-id arena with refcount-guarded removal
//
// Backs the thread table, the process table, and per-process thread-id
// lists. Slots are generational: a handle carries the generation it was
// minted with and can never resolve once the slot is recycled. `remove`
// marks the slot pending-free; the value is dropped only when the last
// outstanding reference is released, so holders of an `ArenaRef` (or a
// leaked reference) can never observe a reused slot.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ops::Deref;
use spin::Mutex;

/// Generational slot handle. Packs to a u64 for storage in registers and
/// thread-local blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Handle {
    slot: u32,
    gen: u32,
}

impl Handle {
    pub fn slot(&self) -> usize {
        self.slot as usize
    }

    pub fn pack(&self) -> u64 {
        ((self.gen as u64) << 32) | self.slot as u64
    }

    pub fn unpack(raw: u64) -> Self {
        Self {
            slot: raw as u32,
            gen: (raw >> 32) as u32,
        }
    }
}

impl core::fmt::Display for Handle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.slot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Empty,
    Live,
    PendingFree,
}

struct Slot<T> {
    gen: u32,
    refs: u32,
    state: SlotState,
    value: Option<Arc<T>>,
}

struct ArenaInner<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

pub struct Arena<T> {
    inner: Mutex<ArenaInner<T>>,
}

impl<T> Arena<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(ArenaInner {
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    /// Insert a value, returning its stable handle.
    pub fn insert(&self, value: T) -> Handle {
        let mut inner = self.inner.lock();
        inner.live += 1;
        if let Some(slot) = inner.free.pop() {
            let s = &mut inner.slots[slot as usize];
            s.state = SlotState::Live;
            s.refs = 0;
            s.value = Some(Arc::new(value));
            Handle { slot, gen: s.gen }
        } else {
            let slot = inner.slots.len() as u32;
            inner.slots.push(Slot {
                gen: 0,
                refs: 0,
                state: SlotState::Live,
                value: Some(Arc::new(value)),
            });
            Handle { slot, gen: 0 }
        }
    }

    /// Take a counted reference to a live element. Fails on stale
    /// generations and pending-free slots.
    pub fn get(&self, handle: Handle) -> Option<ArenaRef<'_, T>> {
        let mut inner = self.inner.lock();
        let slot = inner.slots.get_mut(handle.slot())?;
        if slot.state != SlotState::Live || slot.gen != handle.gen {
            return None;
        }
        let value = slot.value.as_ref().cloned()?;
        slot.refs += 1;
        Some(ArenaRef {
            arena: self,
            handle,
            value,
        })
    }

    /// Reference whatever live element currently occupies `slot`.
    pub fn get_slot(&self, slot: usize) -> Option<ArenaRef<'_, T>> {
        let handle = {
            let inner = self.inner.lock();
            let s = inner.slots.get(slot)?;
            if s.state != SlotState::Live {
                return None;
            }
            Handle {
                slot: slot as u32,
                gen: s.gen,
            }
        };
        self.get(handle)
    }

    /// Release one counted reference. Stale handles are ignored; the slot
    /// is reclaimed when the refcount of a pending-free slot hits zero.
    pub fn unref(&self, handle: Handle) {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.slots.get_mut(handle.slot()) else {
            return;
        };
        if slot.gen != handle.gen || slot.state == SlotState::Empty || slot.refs == 0 {
            return;
        }
        slot.refs -= 1;
        if slot.refs == 0 && slot.state == SlotState::PendingFree {
            slot.value = None;
            slot.state = SlotState::Empty;
            slot.gen = slot.gen.wrapping_add(1);
            inner.free.push(handle.slot() as u32);
        }
    }

    /// Mark an element for removal. The value drops now if nothing holds a
    /// reference, otherwise when the last reference is released.
    pub fn remove(&self, handle: Handle) -> bool {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.slots.get_mut(handle.slot()) else {
            return false;
        };
        if slot.state != SlotState::Live || slot.gen != handle.gen {
            return false;
        }
        inner.live -= 1;
        let slot = &mut inner.slots[handle.slot()];
        if slot.refs == 0 {
            slot.value = None;
            slot.state = SlotState::Empty;
            slot.gen = slot.gen.wrapping_add(1);
            let idx = handle.slot() as u32;
            inner.free.push(idx);
        } else {
            slot.state = SlotState::PendingFree;
        }
        true
    }

    /// Number of slots ever allocated, including holes. The bound for
    /// slot-index scans.
    pub fn slot_count(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Number of live elements.
    pub fn live_count(&self) -> usize {
        self.inner.lock().live
    }

    pub fn contains(&self, handle: Handle) -> bool {
        let inner = self.inner.lock();
        inner
            .slots
            .get(handle.slot())
            .map(|s| s.state == SlotState::Live && s.gen == handle.gen)
            .unwrap_or(false)
    }
}

/// Counted reference into an arena slot. Releases the count on drop.
pub struct ArenaRef<'a, T> {
    arena: &'a Arena<T>,
    handle: Handle,
    value: Arc<T>,
}

impl<'a, T> ArenaRef<'a, T> {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Drop the guard while keeping the slot reference counted. The caller
    /// owns one manual `unref`.
    pub fn leak(self) -> Handle {
        let handle = self.handle;
        let mut this = core::mem::ManuallyDrop::new(self);
        // Drop the Arc clone but skip Drop::drop (which would unref).
        unsafe { core::ptr::drop_in_place(&mut this.value) };
        handle
    }
}

impl<'a, T> Deref for ArenaRef<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<'a, T> Drop for ArenaRef<'a, T> {
    fn drop(&mut self) {
        self.arena.unref(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_reclaimed() {
        let arena: Arena<u32> = Arena::new();
        let a = arena.insert(10);
        let b = arena.insert(20);
        assert_eq!(a.slot(), 0);
        assert_eq!(b.slot(), 1);
        assert_eq!(*arena.get(a).unwrap(), 10);
        assert_eq!(arena.live_count(), 2);

        assert!(arena.remove(a));
        assert!(arena.get(a).is_none());
        assert_eq!(arena.live_count(), 1);

        // Slot is reused with a fresh generation; the old handle stays dead.
        let c = arena.insert(30);
        assert_eq!(c.slot(), 0);
        assert_ne!(c, a);
        assert!(arena.get(a).is_none());
        assert_eq!(*arena.get(c).unwrap(), 30);
    }

    #[test]
    fn pending_free_waits_for_last_ref() {
        let arena: Arena<u32> = Arena::new();
        let h = arena.insert(7);
        let guard = arena.get(h).unwrap();

        assert!(arena.remove(h));
        // Removed but still referenced: the value stays readable through
        // the existing guard, while new lookups fail.
        assert!(arena.get(h).is_none());
        assert_eq!(*guard, 7);

        drop(guard);
        // Now reclaimed; the slot can be reused.
        let h2 = arena.insert(8);
        assert_eq!(h2.slot(), h.slot());
        assert!(arena.get(h).is_none());
    }

    #[test]
    fn leaked_refs_require_manual_unref() {
        let arena: Arena<u32> = Arena::new();
        let h = arena.insert(5);
        let leaked = arena.get(h).unwrap().leak();
        assert_eq!(leaked, h);

        assert!(arena.remove(h));
        // Still held by the leaked count.
        let fresh = arena.insert(6);
        assert_ne!(fresh.slot(), h.slot());

        arena.unref(h);
        let reused = arena.insert(9);
        assert_eq!(reused.slot(), h.slot());
    }

    #[test]
    fn stale_unref_is_ignored() {
        let arena: Arena<u32> = Arena::new();
        let h = arena.insert(1);
        arena.remove(h);
        let h2 = arena.insert(2);
        assert_eq!(h2.slot(), h.slot());

        // Unref through the stale handle must not disturb the new tenant.
        arena.unref(h);
        assert_eq!(*arena.get(h2).unwrap(), 2);
    }

    #[test]
    fn handle_packing_round_trips() {
        let arena: Arena<u32> = Arena::new();
        let h = arena.insert(1);
        arena.remove(h);
        let h2 = arena.insert(2);
        assert_eq!(Handle::unpack(h2.pack()), h2);
        assert_ne!(h.pack(), h2.pack());
    }

    #[test]
    fn get_slot_matches_current_tenant() {
        let arena: Arena<u32> = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        assert_eq!(arena.get_slot(a.slot()).unwrap().handle(), a);
        arena.remove(a);
        assert!(arena.get_slot(a.slot()).is_none());
        assert_eq!(*arena.get_slot(b.slot()).unwrap(), 2);
    }
}
