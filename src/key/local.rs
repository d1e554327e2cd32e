use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::sync::Arc;

use crate::key::BoxedValue;
use crate::key::KeyCore;
use crate::key::KeyId;
use crate::key::next_key_id;
use crate::thread;
use crate::thread::MapKind;

/// A variable with a private, independently initialized binding per thread.
///
/// Each thread that touches a `Local` (via [`get`], [`with`], or [`set`])
/// observes its own binding; nothing a thread stores is visible to any
/// other thread. Handles are cheap to clone and share identity, so a
/// `Local` is typically created once and distributed — commonly from a
/// `static` initializer:
///
/// ```
/// use std::sync::LazyLock;
/// use threadvar::Local;
///
/// static REQUEST_DEPTH: LazyLock<Local<u32>> = LazyLock::new(Local::new);
///
/// REQUEST_DEPTH.set(3);
/// assert_eq!(REQUEST_DEPTH.get(), 3);
/// ```
///
/// # Lifetime
///
/// Per-thread tables hold their keys weakly: dropping every handle of a
/// `Local` lets each thread reclaim the slot — and drop the bound value —
/// the next time a table walk passes over it. A binding never pins its key
/// alive.
///
/// # Initial values
///
/// The first read in a thread produces the initial value ([`Default`] for
/// [`new`], the supplied producer for [`with_initial`]). The producer runs
/// at most once per continuous binding: [`remove`] followed by a read runs
/// it again, while [`set`] before the first read suppresses it entirely.
///
/// [`get`]: Self::get
/// [`with`]: Self::with
/// [`set`]: Self::set
/// [`remove`]: Self::remove
/// [`new`]: Self::new
/// [`with_initial`]: Self::with_initial
pub struct Local<T> {
  core: Arc<LocalCore<T>>,
}

impl<T> Local<T>
where
  T: Default + Send + 'static,
{
  /// Creates a new per-thread variable whose bindings start at
  /// `T::default()`.
  pub fn new() -> Self {
    Self::with_initial(T::default)
  }
}

impl<T> Local<T>
where
  T: Send + 'static,
{
  /// Creates a new per-thread variable whose bindings start at the value
  /// returned by `producer`.
  ///
  /// The producer runs on whichever thread first reads the variable, and
  /// must be re-entrant if the variable is shared across threads.
  pub fn with_initial<F>(producer: F) -> Self
  where
    F: Fn() -> T + Send + Sync + 'static,
  {
    Self {
      core: Arc::new(LocalCore {
        id: next_key_id(),
        init: Box::new(producer),
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
  /// The closure runs while the thread's table is borrowed: reading or
  /// writing other per-thread variables from inside it panics. The initial
  /// value producer is *not* subject to this restriction.
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

    thread::read(MapKind::Plain, &self.erased(), &init, &mut apply)
  }

  /// Binds `value` for the calling thread, replacing any current binding.
  pub fn set(&self, value: T) {
    thread::bind(MapKind::Plain, &self.erased(), Box::new(value));
  }

  /// Deletes the calling thread's binding.
  ///
  /// A subsequent read re-initializes. Removing an absent binding is a
  /// no-op.
  pub fn remove(&self) {
    thread::unbind(MapKind::Plain, self.core.id);
  }

  #[inline]
  fn erased(&self) -> Arc<dyn KeyCore> {
    let core: Arc<dyn KeyCore> = self.core.clone();
    core
  }
}

impl<T> Clone for Local<T> {
  /// Returns a handle sharing this variable's identity.
  #[inline]
  fn clone(&self) -> Self {
    Self {
      core: Arc::clone(&self.core),
    }
  }
}

impl<T> Default for Local<T>
where
  T: Default + Send + 'static,
{
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Debug for Local<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_tuple("Local").field(&self.core.id).finish()
  }
}

// -----------------------------------------------------------------------------
// Local Core
// -----------------------------------------------------------------------------

/// The identity every clone of a [`Local`] shares.
struct LocalCore<T> {
  id: KeyId,
  init: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T> KeyCore for LocalCore<T>
where
  T: Send + 'static,
{
  #[inline]
  fn key_id(&self) -> KeyId {
    self.id
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
