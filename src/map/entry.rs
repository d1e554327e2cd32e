use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::sync::Arc;
use std::sync::Weak;

use crate::key::BoxedValue;
use crate::key::KeyCore;
use crate::key::KeyId;

/// A single table slot payload: a weakly-held key plus a strongly-held value.
///
/// The weak linkage is the crux of the design: the key may vanish while the
/// entry is still in the table. Such entries are *stale* and are reclaimed
/// opportunistically by table walks. The identifier is cached at construction
/// (identity is write-once) so probing never has to upgrade the weak
/// reference.
pub(crate) struct Entry {
  id: KeyId,
  key: Weak<dyn KeyCore>,
  value: BoxedValue,
}

impl Entry {
  /// Creates a new entry bound to `key`.
  #[inline]
  pub(crate) fn new(key: &Arc<dyn KeyCore>, value: BoxedValue) -> Self {
    Self {
      id: key.key_id(),
      key: Arc::downgrade(key),
      value,
    }
  }

  /// Creates an entry sharing the weak key linkage of `other`.
  ///
  /// Used when seeding a child table from a parent entry.
  #[inline]
  pub(crate) fn sibling(other: &Entry, value: BoxedValue) -> Self {
    Self {
      id: other.id,
      key: Weak::clone(&other.key),
      value,
    }
  }

  /// Returns the cached identifier of this entry's key.
  #[inline]
  pub(crate) const fn id(&self) -> KeyId {
    self.id
  }

  /// Returns `true` if the key is no longer strongly reachable.
  ///
  /// Strong counts never resurrect, so a stale entry stays stale.
  #[inline]
  pub(crate) fn is_stale(&self) -> bool {
    self.key.strong_count() == 0
  }

  /// Resolves the weak key linkage.
  #[inline]
  pub(crate) fn key(&self) -> Option<Arc<dyn KeyCore>> {
    self.key.upgrade()
  }

  /// Returns a reference to the bound value.
  #[inline]
  pub(crate) fn value(&self) -> &BoxedValue {
    &self.value
  }

  /// Replaces the bound value.
  #[inline]
  pub(crate) fn set_value(&mut self, value: BoxedValue) {
    self.value = value;
  }
}

impl Debug for Entry {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Entry")
      .field("id", &self.id)
      .field("stale", &self.is_stale())
      .finish_non_exhaustive()
  }
}
