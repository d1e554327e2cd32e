//! Thread attachment and spawn-time inheritance.
//!
//! Every thread owns up to two lazily created binding tables: one for plain
//! [`Local`] variables and one for [`Inheritable`] variables. Both live in
//! `thread_local!` slots, are only ever touched by their owning thread, and
//! are torn down by the thread-local destructor on thread exit.
//!
//! Child threads spawned through [`spawn`] or [`Builder`] are seeded from
//! the parent's inheritable table: the child table is built on the parent
//! thread (running each variable's fork hook) and installed in the child
//! before any user code runs.
//!
//! [`Local`]: crate::Local
//! [`Inheritable`]: crate::Inheritable

use std::cell::RefCell;
use std::io::Result as IoResult;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::key::BoxedValue;
use crate::key::KeyCore;
use crate::key::KeyId;
use crate::map::LocalMap;

thread_local! {
  static LOCALS: RefCell<Option<LocalMap>> = const { RefCell::new(None) };
  static INHERITED: RefCell<Option<LocalMap>> = const { RefCell::new(None) };
}

// -----------------------------------------------------------------------------
// Binding Operations
// -----------------------------------------------------------------------------

/// Selects which of the calling thread's tables an operation targets.
#[derive(Clone, Copy, Debug)]
pub(crate) enum MapKind {
  /// The table backing plain [`Local`] variables.
  ///
  /// [`Local`]: crate::Local
  Plain,
  /// The table backing [`Inheritable`] variables.
  ///
  /// [`Inheritable`]: crate::Inheritable
  Inherited,
}

fn with_map<R>(kind: MapKind, f: impl FnOnce(&mut Option<LocalMap>) -> R) -> R {
  match kind {
    MapKind::Plain => LOCALS.with(|cell| f(&mut cell.borrow_mut())),
    MapKind::Inherited => INHERITED.with(|cell| f(&mut cell.borrow_mut())),
  }
}

/// Reads the calling thread's binding for `key`, initializing it if absent.
///
/// `init` runs outside any table borrow: a panicking producer leaves the
/// table untouched, and a producer may itself read or write bindings.
pub(crate) fn read<R>(
  kind: MapKind,
  key: &Arc<dyn KeyCore>,
  init: &dyn Fn() -> BoxedValue,
  apply: &mut dyn FnMut(&BoxedValue) -> R,
) -> R {
  let id: KeyId = key.key_id();

  let hit: Option<R> = with_map(kind, |slot| {
    let map: &mut LocalMap = slot.as_mut()?;
    let value: &BoxedValue = map.get(id)?;

    Some(apply(value))
  });

  if let Some(output) = hit {
    return output;
  }

  let value: BoxedValue = init();

  with_map(kind, |slot| {
    if let Some(map) = slot.as_mut() {
      map.set(key, value);
    } else {
      *slot = Some(LocalMap::new(key, value));
    }

    let Some(map) = slot.as_mut() else { unreachable!() };
    let Some(stored) = map.get(id) else { unreachable!() };

    apply(stored)
  })
}

/// Binds `value` to `key` for the calling thread, creating the table on
/// first write.
pub(crate) fn bind(kind: MapKind, key: &Arc<dyn KeyCore>, value: BoxedValue) {
  with_map(kind, |slot| {
    if let Some(map) = slot.as_mut() {
      map.set(key, value);
    } else {
      *slot = Some(LocalMap::new(key, value));
    }
  });
}

/// Deletes the calling thread's binding for `id`, if any.
pub(crate) fn unbind(kind: MapKind, id: KeyId) {
  with_map(kind, |slot| {
    if let Some(map) = slot.as_mut() {
      map.remove(id);
    }
  });
}

// -----------------------------------------------------------------------------
// Spawning
// -----------------------------------------------------------------------------

/// Spawns a thread inheriting the parent's [`Inheritable`] bindings.
///
/// Equivalent to `Builder::new().spawn(f)`, panicking if the OS refuses to
/// create the thread — the same contract as [`std::thread::spawn`].
///
/// [`Inheritable`]: crate::Inheritable
pub fn spawn<F, T>(f: F) -> JoinHandle<T>
where
  F: FnOnce() -> T + Send + 'static,
  T: Send + 'static,
{
  match Builder::new().spawn(f) {
    Ok(handle) => handle,
    Err(error) => panic!("failed to spawn thread: {error}"),
  }
}

/// Configures and spawns threads that inherit per-thread bindings.
///
/// A thin wrapper over [`std::thread::Builder`] that seeds the child's
/// inheritable table at spawn time.
#[derive(Debug)]
pub struct Builder {
  inner: std::thread::Builder,
}

impl Builder {
  /// Creates a new builder with default configuration.
  #[inline]
  pub fn new() -> Self {
    Self {
      inner: std::thread::Builder::new(),
    }
  }

  /// Names the thread to be spawned.
  #[inline]
  pub fn name(self, name: String) -> Self {
    Self {
      inner: self.inner.name(name),
    }
  }

  /// Sets the stack size of the thread to be spawned.
  #[inline]
  pub fn stack_size(self, size: usize) -> Self {
    Self {
      inner: self.inner.stack_size(size),
    }
  }

  /// Spawns a thread running `f`, seeded with the parent's inheritable
  /// bindings.
  ///
  /// The child table is constructed here, on the parent thread — each
  /// inheritable variable's fork hook observes the parent's binding as of
  /// this call — and installed in the child before `f` runs.
  ///
  /// # Errors
  ///
  /// Returns the underlying [`std::io::Error`] if the OS fails to create
  /// the thread.
  pub fn spawn<F, T>(self, f: F) -> IoResult<JoinHandle<T>>
  where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
  {
    let seed: Option<LocalMap> = INHERITED.with(|cell| {
      cell.borrow().as_ref().map(LocalMap::inherit)
    });

    if let Some(map) = seed.as_ref() {
      tracing::debug!(bindings = map.len(), "seeding spawned thread");
    }

    self.inner.spawn(move || {
      if let Some(map) = seed {
        INHERITED.with(|cell| *cell.borrow_mut() = Some(map));
      }

      f()
    })
  }
}

impl Default for Builder {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use crate::key::KeyCore;
  use crate::map::testutil::boxed;
  use crate::map::testutil::key;
  use crate::thread::MapKind;
  use crate::thread::bind;
  use crate::thread::read;
  use crate::thread::unbind;

  fn read_i32(kind: MapKind, k: &Arc<dyn KeyCore>, fallback: i32) -> i32 {
    let init = move || -> crate::key::BoxedValue { boxed(fallback) };

    let mut apply = |value: &crate::key::BoxedValue| -> i32 {
      *value.downcast_ref::<i32>().unwrap()
    };

    read(kind, k, &init, &mut apply)
  }

  #[test]
  fn test_read_initializes_absent_binding() {
    let k: Arc<dyn KeyCore> = key(100);

    assert_eq!(read_i32(MapKind::Plain, &k, 55), 55);
    assert_eq!(read_i32(MapKind::Plain, &k, 77), 55);
  }

  #[test]
  fn test_bind_then_read() {
    let k: Arc<dyn KeyCore> = key(200);

    bind(MapKind::Plain, &k, boxed(9));

    assert_eq!(read_i32(MapKind::Plain, &k, 0), 9);
  }

  #[test]
  fn test_unbind_restores_initialization() {
    let k: Arc<dyn KeyCore> = key(300);

    bind(MapKind::Plain, &k, boxed(1));
    unbind(MapKind::Plain, k.key_id());

    assert_eq!(read_i32(MapKind::Plain, &k, 2), 2);
  }

  #[test]
  fn test_unbind_without_map_is_noop() {
    let k: Arc<dyn KeyCore> = key(400);

    unbind(MapKind::Inherited, k.key_id());
  }

  #[test]
  fn test_kinds_are_disjoint() {
    let k: Arc<dyn KeyCore> = key(500);

    bind(MapKind::Plain, &k, boxed(1));
    bind(MapKind::Inherited, &k, boxed(2));

    assert_eq!(read_i32(MapKind::Plain, &k, 0), 1);
    assert_eq!(read_i32(MapKind::Inherited, &k, 0), 2);
  }
}
