use std::any::Any;

use crate::error::LocalError;
use crate::key::id::KeyId;

/// A type-erased binding value.
///
/// Tables are type-erased internally; the typed key recovers `T` at its own
/// boundary via downcast. Values must be `Send` because inherited tables are
/// constructed on the parent thread and moved into the child.
pub(crate) type BoxedValue = Box<dyn Any + Send>;

/// The identity core shared by every binding key.
///
/// Public key types own an `Arc` of a concrete core and erase it to
/// `Arc<dyn KeyCore>` at the table seam; tables hold only `Weak` references
/// to it, so a key's lifetime is bounded by application handles, never by
/// the tables that bound it.
pub(crate) trait KeyCore: Send + Sync {
  /// Returns the process-unique identifier of this key.
  fn key_id(&self) -> KeyId;

  /// Produces a child thread's value from a parent thread's value.
  ///
  /// Invoked while seeding a child table at spawn. Keys that do not opt
  /// into inheritance refuse.
  fn fork_value(&self, _parent: &BoxedValue) -> Result<BoxedValue, LocalError> {
    Err(LocalError::InheritanceNotSupported)
  }
}
