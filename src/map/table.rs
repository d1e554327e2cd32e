//! Weak-keyed, linear-probe table for per-thread bindings.
//!
//! This module provides [`LocalMap`], the open-addressed hash table that
//! backs every thread's bindings. The table is owned by — and only ever
//! reachable from — the thread it belongs to, so no operation takes a lock.
//!
//! # Layout
//!
//! Slots are selected by masking a key's identifier with `len - 1`
//! (lengths are always powers of two) and collisions are resolved by linear
//! probing with wraparound. Entries hold their key weakly: a key dropped by
//! the application leaves a *stale* entry behind, which the table reclaims
//! opportunistically as walks pass over it. No tombstones are used; instead,
//! stale slots are overwritten in place or expunged together with a rehash
//! of their run.
//!
//! # Runs
//!
//! A *run* is a maximal sequence of non-empty slots between two empty slots
//! (with wraparound). Every probe terminates at the first empty slot of its
//! run, so reclamation must re-probe the remainder of a run whenever a slot
//! inside it is emptied:
//!
//! ```text
//!          home(b)
//!             │
//! ┌───┬───┬───┬───┬───┬───┐
//! │   │ a │ † │ b │   │ … │    † = stale entry
//! └───┴───┴───┴───┴───┴───┘
//!       └── run ──┘
//! ```
//!
//! Expunging `†` empties its slot; `b` is then re-probed from `home(b)` and
//! moves left, keeping it reachable.

use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::mem;
use std::sync::Arc;

use crate::consts::INITIAL_CAPACITY;
use crate::key::BoxedValue;
use crate::key::KeyCore;
use crate::key::KeyId;
use crate::map::entry::Entry;

// -----------------------------------------------------------------------------
// Slot State
// -----------------------------------------------------------------------------

/// Observed state of a table slot during a probe.
enum Slot {
  /// The slot holds no entry.
  Empty,
  /// The slot holds an entry whose key is still reachable.
  Live(KeyId),
  /// The slot holds an entry whose key has been dropped.
  Stale,
}

// -----------------------------------------------------------------------------
// Local Map
// -----------------------------------------------------------------------------

/// Open-addressed table of weak-keyed bindings for a single thread.
///
/// Maps are created lazily on a thread's first write and destroyed with the
/// thread. `size` counts non-empty slots — stale entries included until they
/// are expunged — and `threshold` is maintained at `2 * len / 3`.
pub(crate) struct LocalMap {
  table: Box<[Option<Entry>]>,
  size: usize,
  threshold: usize,
}

impl LocalMap {
  /// Creates a new map containing the single binding `(key, value)`.
  pub(crate) fn new(key: &Arc<dyn KeyCore>, value: BoxedValue) -> Self {
    let mut this: Self = Self {
      table: Self::alloc_table(INITIAL_CAPACITY),
      size: 0,
      threshold: Self::threshold_for(INITIAL_CAPACITY),
    };

    let index: usize = key.key_id().slot(INITIAL_CAPACITY);

    this.table[index] = Some(Entry::new(key, value));
    this.size = 1;
    this
  }

  /// Creates a child map seeded from `parent`.
  ///
  /// The child has the same length and threshold. Live parent entries are
  /// passed through their key's fork hook and installed by probing forward
  /// from their home slot; stale parent entries are skipped.
  pub(crate) fn inherit(parent: &LocalMap) -> Self {
    let len: usize = parent.table.len();

    let mut child: Self = Self {
      table: Self::alloc_table(len),
      size: 0,
      threshold: Self::threshold_for(len),
    };

    for slot in parent.table.iter() {
      let Some(entry) = slot else { continue };
      let Some(key) = entry.key() else { continue };

      match key.fork_value(entry.value()) {
        Ok(value) => {
          let mut dest: usize = entry.id().slot(len);

          while child.table[dest].is_some() {
            dest = Self::next_index(dest, len);
          }

          child.table[dest] = Some(Entry::sibling(entry, value));
          child.size += 1;
        }
        Err(error) => {
          tracing::error!(%error, "binding skipped while seeding child thread");
        }
      }
    }

    child
  }

  /// Returns the number of non-empty slots, stale entries included.
  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.size
  }

  /// Returns the value bound to `id`, reclaiming stale slots encountered
  /// along the probe.
  pub(crate) fn get(&mut self, id: KeyId) -> Option<&BoxedValue> {
    let index: usize = self.lookup(id)?;

    self.table[index].as_ref().map(Entry::value)
  }

  /// Binds `value` to `key`, creating or updating the entry.
  pub(crate) fn set(&mut self, key: &Arc<dyn KeyCore>, value: BoxedValue) {
    // No direct-hit fast path: creating a fresh binding is at least as
    // common as replacing one, so the fast path would miss more than it
    // hits.
    let id: KeyId = key.key_id();
    let len: usize = self.table.len();
    let mut index: usize = id.slot(len);

    loop {
      match self.probe(index) {
        Slot::Empty => break,
        Slot::Live(found) if found == id => {
          let Some(entry) = self.table[index].as_mut() else {
            unreachable!()
          };

          entry.set_value(value);
          return;
        }
        Slot::Live(_) => index = Self::next_index(index, len),
        Slot::Stale => {
          self.replace_stale(key, value, index);
          return;
        }
      }
    }

    self.table[index] = Some(Entry::new(key, value));
    self.size += 1;

    let size: usize = self.size;

    if !self.clean_some_slots(index, size) && size >= self.threshold {
      self.rehash();
    }
  }

  /// Deletes the binding for `id`, if present.
  pub(crate) fn remove(&mut self, id: KeyId) {
    let len: usize = self.table.len();
    let mut index: usize = id.slot(len);

    loop {
      match self.probe(index) {
        Slot::Empty => return,
        Slot::Live(found) if found == id => {
          // Dropping the entry severs the key linkage and frees the value;
          // the expunge fixes up the rest of the run.
          let _ignore: usize = self.expunge(index);
          return;
        }
        Slot::Live(_) | Slot::Stale => index = Self::next_index(index, len),
      }
    }
  }

  /// Returns the slot index of the live entry for `id`.
  fn lookup(&mut self, id: KeyId) -> Option<usize> {
    let index: usize = id.slot(self.table.len());

    match self.probe(index) {
      Slot::Live(found) if found == id => Some(index),
      Slot::Empty => None,
      _ => self.lookup_after_miss(id, index),
    }
  }

  /// Continues a lookup that missed its home slot.
  fn lookup_after_miss(&mut self, id: KeyId, index: usize) -> Option<usize> {
    let len: usize = self.table.len();
    let mut index: usize = index;

    loop {
      match self.probe(index) {
        Slot::Empty => break None,
        Slot::Live(found) if found == id => break Some(index),
        Slot::Live(_) => index = Self::next_index(index, len),
        Slot::Stale => {
          // The expunge may rehash a live entry — including the probed key —
          // into this slot; re-read it instead of advancing.
          let _ignore: usize = self.expunge(index);
        }
      }
    }
  }

  /// Establishes `(key, value)` at the stale slot found while probing for
  /// `key`, and expunges every stale entry in the containing run.
  fn replace_stale(&mut self, key: &Arc<dyn KeyCore>, value: BoxedValue, stale_slot: usize) {
    let id: KeyId = key.key_id();
    let len: usize = self.table.len();

    // Keys tend to be dropped in batches, so the whole run is reclaimed at
    // once: scan backwards for the earliest stale slot in this half of the
    // run before touching anything.
    let mut slot_to_expunge: usize = stale_slot;
    let mut index: usize = Self::prev_index(stale_slot, len);

    loop {
      match self.probe(index) {
        Slot::Empty => break,
        Slot::Stale => slot_to_expunge = index,
        Slot::Live(_) => {}
      }

      index = Self::prev_index(index, len);
    }

    // Scan forward for either the key or the trailing empty slot of the run,
    // whichever comes first.
    let mut index: usize = Self::next_index(stale_slot, len);

    loop {
      match self.probe(index) {
        Slot::Empty => break,
        Slot::Live(found) if found == id => {
          // Swap the live entry into the stale slot so it sits at the
          // earliest position in its probe sequence, keeping lookups
          // bounded as garbage accumulates.
          let Some(entry) = self.table[index].as_mut() else {
            unreachable!()
          };

          entry.set_value(value);
          self.table.swap(index, stale_slot);

          if slot_to_expunge == stale_slot {
            slot_to_expunge = index;
          }

          let next: usize = self.expunge(slot_to_expunge);
          let _ignore: bool = self.clean_some_slots(next, len);

          return;
        }
        Slot::Stale if slot_to_expunge == stale_slot => slot_to_expunge = index,
        Slot::Live(_) | Slot::Stale => {}
      }

      index = Self::next_index(index, len);
    }

    // Key absent: the stale slot itself takes the fresh binding.
    self.table[stale_slot] = Some(Entry::new(key, value));

    if slot_to_expunge != stale_slot {
      let next: usize = self.expunge(slot_to_expunge);
      let _ignore: bool = self.clean_some_slots(next, len);
    }
  }

  /// Empties the slot at `stale_slot` and repairs the remainder of its run.
  ///
  /// Stale entries after `stale_slot` are dropped; live entries are
  /// re-probed from their home slot so that no live entry ends up separated
  /// from its home by an empty slot. Returns the index of the trailing
  /// empty slot.
  fn expunge(&mut self, stale_slot: usize) -> usize {
    let len: usize = self.table.len();

    self.table[stale_slot] = None;
    self.size -= 1;

    let mut index: usize = Self::next_index(stale_slot, len);

    loop {
      match self.probe(index) {
        Slot::Empty => break index,
        Slot::Stale => {
          self.table[index] = None;
          self.size -= 1;
        }
        Slot::Live(id) => {
          let home: usize = id.slot(len);

          if home != index {
            let entry: Option<Entry> = self.table[index].take();

            // Several slots in this run may already have been emptied, so
            // probe all the way to the first empty slot.
            let mut dest: usize = home;

            while self.table[dest].is_some() {
              dest = Self::next_index(dest, len);
            }

            self.table[dest] = entry;
          }
        }
      }

      index = Self::next_index(index, len);
    }
  }

  /// Heuristically scans slots after `index` for stale entries.
  ///
  /// `log2(n)` slots are inspected; finding a stale entry resets the scan
  /// budget to `log2(len)` and expunges the run. This bounds the amortized
  /// cost folded into each insertion while still reclaiming whole clusters
  /// of garbage once one member is seen. Returns whether any entry was
  /// removed.
  fn clean_some_slots(&mut self, index: usize, n: usize) -> bool {
    let len: usize = self.table.len();
    let mut index: usize = index;
    let mut n: usize = n;
    let mut removed: bool = false;

    loop {
      index = Self::next_index(index, len);

      if matches!(self.probe(index), Slot::Stale) {
        n = len;
        removed = true;
        index = self.expunge(index);
      }

      n >>= 1;

      if n == 0 {
        break removed;
      }
    }
  }

  /// Re-packs the table, doubling it if still near capacity.
  fn rehash(&mut self) {
    self.expunge_all();

    // Doubling uses a lowered trigger: the full expunge may have dropped
    // size just below the threshold, and resizing on the next insertion
    // anyway avoids hovering there.
    if self.size >= self.threshold - self.threshold / 4 {
      self.resize();
    }
  }

  /// Expunges every stale entry in the table.
  fn expunge_all(&mut self) {
    for index in 0..self.table.len() {
      if matches!(self.probe(index), Slot::Stale) {
        let _ignore: usize = self.expunge(index);
      }
    }
  }

  /// Doubles the table, re-inserting live entries and dropping stale ones.
  fn resize(&mut self) {
    let old_len: usize = self.table.len();
    let new_len: usize = old_len * 2;

    let old: Box<[Option<Entry>]> = mem::replace(&mut self.table, Self::alloc_table(new_len));
    let mut count: usize = 0;

    for slot in old.into_vec() {
      let Some(entry) = slot else { continue };

      if entry.is_stale() {
        continue;
      }

      let mut dest: usize = entry.id().slot(new_len);

      while self.table[dest].is_some() {
        dest = Self::next_index(dest, new_len);
      }

      self.table[dest] = Some(entry);
      count += 1;
    }

    self.size = count;
    self.threshold = Self::threshold_for(new_len);

    tracing::trace!(old_len, new_len, size = count, "binding table resized");
  }

  /// Reports the state of the slot at `index`.
  #[inline]
  fn probe(&self, index: usize) -> Slot {
    match &self.table[index] {
      None => Slot::Empty,
      Some(entry) if entry.is_stale() => Slot::Stale,
      Some(entry) => Slot::Live(entry.id()),
    }
  }

  /// Allocates an empty table of `len` slots.
  fn alloc_table(len: usize) -> Box<[Option<Entry>]> {
    Vec::from_iter((0..len).map(|_| None)).into_boxed_slice()
  }

  /// Increments `index` modulo `len`.
  #[inline]
  const fn next_index(index: usize, len: usize) -> usize {
    if index + 1 < len { index + 1 } else { 0 }
  }

  /// Decrements `index` modulo `len`.
  #[inline]
  const fn prev_index(index: usize, len: usize) -> usize {
    if index > 0 { index - 1 } else { len - 1 }
  }

  /// Returns the resize threshold for a table of `len` slots.
  ///
  /// Maintains a worst-case load factor of 2/3.
  #[inline]
  const fn threshold_for(len: usize) -> usize {
    len * 2 / 3
  }
}

#[cfg(test)]
impl LocalMap {
  pub(crate) fn capacity(&self) -> usize {
    self.table.len()
  }

  pub(crate) fn threshold(&self) -> usize {
    self.threshold
  }

  pub(crate) fn slots(&self) -> impl Iterator<Item = &Option<Entry>> {
    self.table.iter()
  }
}

impl Debug for LocalMap {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("LocalMap")
      .field("size", &self.size)
      .field("capacity", &self.table.len())
      .field("threshold", &self.threshold)
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
