use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use std::hint::black_box;

use threadvar::Inheritable;
use threadvar::Local;

fn bench_get_hit(c: &mut Criterion) {
  let local: Local<u64> = Local::with_initial(|| 1);

  local.set(42);

  c.bench_function("local_get_hit", |b| {
    b.iter(|| black_box(local.get()));
  });
}

fn bench_set_overwrite(c: &mut Criterion) {
  let local: Local<u64> = Local::with_initial(|| 0);
  let mut next: u64 = 0;

  local.set(0);

  c.bench_function("local_set_overwrite", |b| {
    b.iter(|| {
      next = next.wrapping_add(1);
      local.set(black_box(next));
    });
  });
}

fn bench_bind_drop_churn(c: &mut Criterion) {
  // Every iteration leaves a stale slot behind for later table walks to
  // reclaim, so this measures steady-state garbage turnover.
  c.bench_function("local_bind_drop_churn", |b| {
    b.iter(|| {
      let local: Local<u64> = Local::with_initial(|| 0);

      local.set(black_box(7));
    });
  });
}

fn bench_spawn_inherit(c: &mut Criterion) {
  let tag: Inheritable<u64> = Inheritable::with_initial(|| 0);

  tag.set(17);

  c.bench_function("spawn_with_inherited_binding", |b| {
    b.iter(|| {
      threadvar::spawn({
        let tag: Inheritable<u64> = tag.clone();
        move || black_box(tag.get())
      })
      .join()
      .unwrap()
    });
  });
}

criterion_group!(
  benches,
  bench_get_hit,
  bench_set_overwrite,
  bench_bind_drop_churn,
  bench_spawn_inherit,
);
criterion_main!(benches);
