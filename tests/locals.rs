//! End-to-end behavior of per-thread bindings across real threads.

use std::sync::Arc;
use std::sync::Barrier;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;

use threadvar::Builder;
use threadvar::Inheritable;
use threadvar::Local;

#[test]
fn basic_bind() {
  let local: Local<i32> = Local::with_initial(|| 42);

  assert_eq!(local.get(), 42);

  local.set(7);

  assert_eq!(local.get(), 7);

  local.remove();

  assert_eq!(local.get(), 42);
}

#[test]
fn bindings_are_isolated_between_threads() {
  let local: Local<i32> = Local::with_initial(|| -1);

  local.set(10);

  let seen: i32 = thread::spawn({
    let local: Local<i32> = local.clone();
    move || {
      let before: i32 = local.get();
      local.set(20);
      before
    }
  })
  .join()
  .unwrap();

  assert_eq!(seen, -1);
  assert_eq!(local.get(), 10);
}

#[test]
fn concurrent_independence() {
  let local: Local<usize> = Local::with_initial(|| usize::MAX);
  let barrier: Arc<Barrier> = Arc::new(Barrier::new(4));

  let threads: Vec<_> = (0..4)
    .map(|index| {
      let local: Local<usize> = local.clone();
      let barrier: Arc<Barrier> = Arc::clone(&barrier);

      thread::spawn(move || {
        local.set(index);
        barrier.wait();
        local.get()
      })
    })
    .collect();

  for (index, handle) in threads.into_iter().enumerate() {
    assert_eq!(handle.join().unwrap(), index);
  }
}

#[test]
fn remove_is_idempotent() {
  let local: Local<i32> = Local::with_initial(|| 3);

  local.set(4);
  local.remove();
  local.remove();

  assert_eq!(local.get(), 3);
}

#[test]
fn reinitialization_runs_producer_once() {
  let calls: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

  let local: Local<usize> = Local::with_initial({
    let calls: Arc<AtomicUsize> = Arc::clone(&calls);
    move || calls.fetch_add(1, Ordering::Relaxed)
  });

  assert_eq!(local.get(), 0);

  local.remove();

  assert_eq!(local.get(), 1);
  assert_eq!(local.get(), 1);
  assert_eq!(calls.load(Ordering::Relaxed), 2);
}

#[test]
fn inheritable_bindings_flow_to_children() {
  let depth: Inheritable<u32> = Inheritable::with_fork(|| 0, |parent| parent + 1);
  let plain: Local<u32> = Local::with_initial(|| 7);

  depth.set(10);
  plain.set(100);

  let (child_depth, child_plain) = threadvar::spawn({
    let depth: Inheritable<u32> = depth.clone();
    let plain: Local<u32> = plain.clone();

    move || (depth.get(), plain.get())
  })
  .join()
  .unwrap();

  // The inheritable binding crossed through its fork hook; the plain one
  // did not cross at all and re-initialized in the child.
  assert_eq!(child_depth, 11);
  assert_eq!(child_plain, 7);
  assert_eq!(depth.get(), 10);
  assert_eq!(plain.get(), 100);
}

#[test]
fn inheritance_chains_through_generations() {
  let depth: Inheritable<u32> = Inheritable::with_fork(|| 0, |parent| parent + 1);

  depth.set(1);

  let (child, grandchild) = threadvar::spawn({
    let depth: Inheritable<u32> = depth.clone();

    move || {
      let here: u32 = depth.get();

      let below: u32 = threadvar::spawn({
        let depth: Inheritable<u32> = depth.clone();
        move || depth.get()
      })
      .join()
      .unwrap();

      (here, below)
    }
  })
  .join()
  .unwrap();

  assert_eq!(child, 2);
  assert_eq!(grandchild, 3);
}

#[test]
fn unbound_parent_seeds_nothing() {
  let depth: Inheritable<u32> = Inheritable::with_fork(|| 5, |parent| parent + 1);

  let child: u32 = threadvar::spawn({
    let depth: Inheritable<u32> = depth.clone();
    move || depth.get()
  })
  .join()
  .unwrap();

  assert_eq!(child, 5);
}

#[test]
fn child_bindings_do_not_leak_back() {
  let depth: Inheritable<u32> = Inheritable::with_fork(|| 0, |parent| parent + 1);

  depth.set(5);

  let child: u32 = threadvar::spawn({
    let depth: Inheritable<u32> = depth.clone();

    move || {
      depth.set(99);
      depth.get()
    }
  })
  .join()
  .unwrap();

  assert_eq!(child, 99);
  assert_eq!(depth.get(), 5);
}

#[test]
fn inheritance_observes_spawn_time_value() {
  let tag: Inheritable<String> = Inheritable::with_initial(String::new);

  tag.set(String::from("before"));

  let handle = threadvar::spawn({
    let tag: Inheritable<String> = tag.clone();
    move || tag.get()
  });

  tag.set(String::from("after"));

  assert_eq!(handle.join().unwrap(), "before");
}

#[test]
fn builder_preserves_thread_name() {
  let handle = Builder::new()
    .name(String::from("seeded-worker"))
    .spawn(|| thread::current().name().map(String::from))
    .unwrap();

  assert_eq!(handle.join().unwrap().as_deref(), Some("seeded-worker"));
}

#[test]
fn dropped_variable_releases_bound_values() {
  let probe: Arc<()> = Arc::new(());

  let local: Local<Arc<()>> = Local::with_initial(|| Arc::new(()));

  local.set(Arc::clone(&probe));

  assert_eq!(Arc::strong_count(&probe), 2);

  drop(local);

  // The stale slot survives until table maintenance passes over it; enough
  // fresh bindings force a full reclamation pass deterministically.
  let churn: Vec<Local<usize>> = (0..32).map(|_| Local::with_initial(|| 0)).collect();

  for (index, slot) in churn.iter().enumerate() {
    slot.set(index);
  }

  assert_eq!(Arc::strong_count(&probe), 1);
}
