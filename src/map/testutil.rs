//! Shared fixtures for table tests.

use std::collections::HashSet;
use std::sync::Arc;

use crate::consts::INITIAL_CAPACITY;
use crate::error::LocalError;
use crate::key::BoxedValue;
use crate::key::KeyCore;
use crate::key::KeyId;
use crate::map::table::LocalMap;

/// A key with a caller-chosen identifier and no fork hook.
struct TestKey {
  id: KeyId,
}

impl KeyCore for TestKey {
  fn key_id(&self) -> KeyId {
    self.id
  }
}

/// A key with a caller-chosen identifier that forks `i32` values by
/// incrementing them.
struct ForkKey {
  id: KeyId,
}

impl KeyCore for ForkKey {
  fn key_id(&self) -> KeyId {
    self.id
  }

  fn fork_value(&self, parent: &BoxedValue) -> Result<BoxedValue, LocalError> {
    let Some(value) = parent.downcast_ref::<i32>() else {
      unreachable!()
    };

    Ok(Box::new(value + 1))
  }
}

pub(crate) fn key(bits: u32) -> Arc<dyn KeyCore> {
  Arc::new(TestKey {
    id: KeyId::from_bits(bits),
  })
}

pub(crate) fn fork_key(bits: u32) -> Arc<dyn KeyCore> {
  Arc::new(ForkKey {
    id: KeyId::from_bits(bits),
  })
}

pub(crate) fn boxed(value: i32) -> BoxedValue {
  Box::new(value)
}

pub(crate) fn read(map: &mut LocalMap, key: &Arc<dyn KeyCore>) -> Option<i32> {
  map
    .get(key.key_id())
    .and_then(|value| value.downcast_ref::<i32>())
    .copied()
}

impl LocalMap {
  /// Asserts every structural invariant of the table.
  ///
  /// - The length is a power of two and at least the initial capacity.
  /// - The threshold tracks `2 * len / 3`.
  /// - `size` counts exactly the non-empty slots.
  /// - No two live entries share an identifier.
  /// - Probing from a live entry's home slot never crosses an empty slot
  ///   before reaching the entry.
  pub(crate) fn assert_invariants(&self) {
    let len: usize = self.capacity();

    assert!(len.is_power_of_two());
    assert!(len >= INITIAL_CAPACITY);
    assert_eq!(self.threshold(), len * 2 / 3);

    let occupied: Vec<bool> = self.slots().map(Option::is_some).collect();
    let count: usize = occupied.iter().filter(|slot| **slot).count();

    assert_eq!(self.len(), count, "size does not match occupied slots");

    let mut live: HashSet<u32> = HashSet::new();

    for (index, slot) in self.slots().enumerate() {
      let Some(entry) = slot else { continue };

      if entry.is_stale() {
        continue;
      }

      assert!(
        live.insert(entry.id().into_bits()),
        "two live entries share an identifier",
      );

      let mut probe: usize = entry.id().slot(len);

      while probe != index {
        assert!(occupied[probe], "probe sequence crosses an empty slot");
        probe = (probe + 1) & (len - 1);
      }
    }
  }
}
