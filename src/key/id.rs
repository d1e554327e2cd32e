use crossbeam_utils::CachePadded;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use crate::consts::ID_INCREMENT;

/// A process-unique identifier for a per-thread binding key.
///
/// Identifiers double as precomputed hash codes: they are dispensed with a
/// golden-ratio stride (see [`ID_INCREMENT`]), so the low bits of an
/// identifier index directly into a power-of-two table with near-optimal
/// dispersion and no secondary mixing step.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[repr(transparent)]
pub(crate) struct KeyId {
  inner: u32,
}

impl KeyId {
  /// Returns the home slot for this identifier in a table of length `len`.
  ///
  /// `len` must be a power of two.
  #[inline]
  pub(crate) fn slot(self, len: usize) -> usize {
    debug_assert!(len.is_power_of_two());
    self.inner as usize & (len - 1)
  }

  #[cfg(test)]
  pub(crate) const fn from_bits(inner: u32) -> Self {
    Self { inner }
  }

  #[cfg(test)]
  pub(crate) const fn into_bits(self) -> u32 {
    self.inner
  }
}

/// Dispenses the next key identifier.
///
/// The shared counter advances by [`ID_INCREMENT`] and wraps on overflow;
/// identifiers are write-once and require no ordering beyond atomicity.
pub(crate) fn next_key_id() -> KeyId {
  static NEXT: CachePadded<AtomicU32> = CachePadded::new(AtomicU32::new(0));

  KeyId {
    inner: NEXT.fetch_add(ID_INCREMENT, Ordering::Relaxed),
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use std::collections::HashSet;
  use std::thread;

  use crate::consts::ID_INCREMENT;
  use crate::key::id::KeyId;
  use crate::key::id::next_key_id;

  #[test]
  fn test_stride() {
    let a: KeyId = next_key_id();
    let b: KeyId = next_key_id();

    assert_eq!(b.into_bits(), a.into_bits().wrapping_add(ID_INCREMENT));
  }

  #[test]
  fn test_slot_masks_low_bits() {
    let id: KeyId = KeyId::from_bits(0xDEAD_BEEF);

    assert_eq!(id.slot(16), 0xF);
    assert_eq!(id.slot(32), 0x0F);
    assert_eq!(id.slot(1 << 16), 0xBEEF);
  }

  #[test]
  fn test_unique_across_threads() {
    let threads: Vec<_> = (0..8)
      .map(|_| thread::spawn(|| Vec::from_iter((0..256).map(|_| next_key_id().into_bits()))))
      .collect();

    let mut seen: HashSet<u32> = HashSet::new();

    for handle in threads {
      for id in handle.join().unwrap() {
        assert!(seen.insert(id), "duplicate key identifier dispensed");
      }
    }
  }
}
