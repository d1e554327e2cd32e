use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::sync::Arc;

use crate::error::LocalError;
use crate::key::BoxedValue;
use crate::key::KeyCore;
use crate::key::KeyId;
use crate::key::next_key_id;
use crate::thread;
use crate::thread::MapKind;

/// A per-thread variable whose bindings flow from parent to child threads.
///
/// Threads spawned through [`spawn`] or [`Builder`] receive a binding for
/// every `Inheritable` the parent has bound, derived by the variable's fork
/// hook before the child runs any user code. By default the hook clones the
/// parent's value; [`with_fork`] installs a custom derivation:
///
/// ```
/// use threadvar::Inheritable;
///
/// let depth: Inheritable<u32> = Inheritable::with_fork(|| 0, |parent| parent + 1);
///
/// depth.set(1);
///
/// let child: u32 = threadvar::spawn({
///   let depth: Inheritable<u32> = depth.clone();
///   move || depth.get()
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(child, 2);
/// assert_eq!(depth.get(), 1);
/// ```
///
/// After the spawn, parent and child bindings are fully independent.
/// Plain [`Local`] variables never cross into child threads.
///
/// [`spawn`]: crate::spawn
/// [`Builder`]: crate::Builder
/// [`Local`]: crate::Local
/// [`with_fork`]: Self::with_fork
pub struct Inheritable<T> {
  core: Arc<InheritableCore<T>>,
}

impl<T> Inheritable<T>
where
  T: Clone + Default + Send + 'static,
{
  /// Creates a new inheritable variable whose bindings start at
  /// `T::default()` and fork by cloning.
  pub fn new() -> Self {
    Self::with_initial(T::default)
  }
}

impl<T> Inheritable<T>
where
  T: Clone + Send + 'static,
{
  /// Creates a new inheritable variable with the given initial-value
  /// producer, forking by cloning.
  pub fn with_initial<F>(producer: F) -> Self
  where
    F: Fn() -> T + Send + Sync + 'static,
  {
    Self::with_fork(producer, T::clone)
  }
}

impl<T> Inheritable<T>
where
  T: Send + 'static,
{
  /// Creates a new inheritable variable with the given initial-value
  /// producer and fork hook.
  ///
  /// `fork` runs on the parent thread at spawn time, once per spawned
  /// child, observing the parent's binding at that moment.
  pub fn with_fork<F, G>(producer: F, fork: G) -> Self
  where
    F: Fn() -> T + Send + Sync + 'static,
    G: Fn(&T) -> T + Send + Sync + 'static,
  {
    Self {
      core: Arc::new(InheritableCore {
        id: next_key_id(),
        init: Box::new(producer),
        fork: Box::new(fork),
      }),
    }
  }

  /// Returns a clone of the calling thread's binding, initializing it
  /// first if absent.
  pub fn get(&self) -> T
  where
    T: Clone,
  {
    self.with(T::clone)
  }

  /// Calls `f` with a reference to the calling thread's binding,
  /// initializing it first if absent.
  ///
  /// See [`Local::with`] for the borrow restriction.
  ///
  /// [`Local::with`]: crate::Local::with
  pub fn with<F, R>(&self, f: F) -> R
  where
    F: FnOnce(&T) -> R,
  {
    let mut f: Option<F> = Some(f);

    let init = || -> BoxedValue { Box::new((self.core.init)()) };

    let mut apply = |value: &BoxedValue| -> R {
      let Some(f) = f.take() else { unreachable!() };
      let Some(value) = value.downcast_ref::<T>() else {
        unreachable!()
      };

      f(value)
    };

    thread::read(MapKind::Inherited, &self.erased(), &init, &mut apply)
  }

  /// Binds `value` for the calling thread, replacing any current binding.
  pub fn set(&self, value: T) {
    thread::bind(MapKind::Inherited, &self.erased(), Box::new(value));
  }

  /// Deletes the calling thread's binding.
  pub fn remove(&self) {
    thread::unbind(MapKind::Inherited, self.core.id);
  }

  #[inline]
  fn erased(&self) -> Arc<dyn KeyCore> {
    let core: Arc<dyn KeyCore> = self.core.clone();
    core
  }
}

impl<T> Clone for Inheritable<T> {
  /// Returns a handle sharing this variable's identity.
  #[inline]
  fn clone(&self) -> Self {
    Self {
      core: Arc::clone(&self.core),
    }
  }
}

impl<T> Default for Inheritable<T>
where
  T: Clone + Default + Send + 'static,
{
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Debug for Inheritable<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_tuple("Inheritable").field(&self.core.id).finish()
  }
}

// -----------------------------------------------------------------------------
// Inheritable Core
// -----------------------------------------------------------------------------

/// The identity every clone of an [`Inheritable`] shares.
struct InheritableCore<T> {
  id: KeyId,
  init: Box<dyn Fn() -> T + Send + Sync>,
  fork: Box<dyn Fn(&T) -> T + Send + Sync>,
}

impl<T> KeyCore for InheritableCore<T>
where
  T: Send + 'static,
{
  #[inline]
  fn key_id(&self) -> KeyId {
    self.id
  }

  fn fork_value(&self, parent: &BoxedValue) -> Result<BoxedValue, LocalError> {
    // Entries keyed by this core always hold a `T`.
    let Some(value) = parent.downcast_ref::<T>() else {
      unreachable!()
    };

    Ok(Box::new((self.fork)(value)))
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use crate::key::BoxedValue;
  use crate::key::Inheritable;
  use crate::key::KeyCore;
  use crate::key::Local;

  #[test]
  fn test_round_trip() {
    let tag: Inheritable<String> = Inheritable::with_initial(|| String::from("root"));

    assert_eq!(tag.get(), "root");

    tag.set(String::from("leaf"));

    assert_eq!(tag.get(), "leaf");

    tag.remove();

    assert_eq!(tag.get(), "root");
  }

  #[test]
  fn test_fork_hook_default_clones() {
    let tag: Inheritable<i32> = Inheritable::with_initial(|| 5);
    let core: Arc<dyn KeyCore> = tag.core.clone();

    let parent: BoxedValue = Box::new(17);
    let child: BoxedValue = core.fork_value(&parent).unwrap();

    assert_eq!(child.downcast_ref::<i32>(), Some(&17));
  }

  #[test]
  fn test_fork_hook_custom() {
    let tag: Inheritable<i32> = Inheritable::with_fork(|| 0, |parent| parent * 2);
    let core: Arc<dyn KeyCore> = tag.core.clone();

    let parent: BoxedValue = Box::new(21);
    let child: BoxedValue = core.fork_value(&parent).unwrap();

    assert_eq!(child.downcast_ref::<i32>(), Some(&42));
  }

  #[test]
  fn test_separate_map_from_plain_locals() {
    // An inheritable and a plain variable never observe each other even
    // when bound on the same thread.
    let plain: Local<i32> = Local::with_initial(|| 1);
    let inherited: Inheritable<i32> = Inheritable::with_initial(|| 2);

    plain.set(10);
    inherited.set(20);

    assert_eq!(plain.get(), 10);
    assert_eq!(inherited.get(), 20);

    plain.remove();

    assert_eq!(inherited.get(), 20);
  }
}
