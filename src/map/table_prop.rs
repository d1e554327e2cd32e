//! Model-based tests for [`LocalMap`].
//!
//! Random operation sequences run against a [`hashbrown::HashMap`] oracle:
//! the table must agree with the oracle on every lookup for keys that are
//! still reachable, and must hold its structural invariants after every
//! step. Dropping a key's last handle models the application letting go of
//! a binding; the oracle forgets it immediately, while the table reclaims
//! the stale entry opportunistically.
//!
//! [`LocalMap`]: crate::map::table::LocalMap

use hashbrown::HashMap;
use proptest::prelude::Strategy;
use proptest::prelude::any;
use proptest::prop_oneof;
use proptest::proptest;
use std::sync::Arc;

use crate::key::KeyCore;
use crate::map::table::LocalMap;
use crate::map::testutil::boxed;
use crate::map::testutil::key;
use crate::map::testutil::read;

/// Number of distinct keys in the model pool.
const POOL: usize = 12;

/// Keys per home slot; the pool spans `POOL / FAN` home slots so probing,
/// displacement, and run reclamation are all exercised constantly.
const FAN: usize = 3;

#[derive(Clone, Debug)]
enum Op {
  Set(usize, i32),
  Get(usize),
  Remove(usize),
  Drop(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
  prop_oneof![
    (0..POOL, any::<i32>()).prop_map(|(index, value)| Op::Set(index, value)),
    (0..POOL).prop_map(Op::Get),
    (0..POOL).prop_map(Op::Remove),
    (0..POOL).prop_map(Op::Drop),
  ]
}

/// Identifier for pool slot `index`: `FAN` keys share each home slot, and
/// the high stride keeps families colliding at any table length reachable
/// within a test run.
fn pool_bits(index: usize) -> u32 {
  (index / FAN) as u32 + (index % FAN) as u32 * (1 << 20)
}

proptest! {
  /// Invariant: the table agrees with a plain hash map on every operation
  /// over reachable keys, and the probe-sequence, sizing, and identity
  /// invariants hold after every step.
  #[test]
  fn model_matches_oracle(ops in proptest::collection::vec(op_strategy(), 1..256)) {
    let mut keys: Vec<Option<Arc<dyn KeyCore>>> =
      Vec::from_iter((0..POOL).map(|index| Some(key(pool_bits(index)))));

    let mut map: Option<LocalMap> = None;
    let mut oracle: HashMap<u32, i32> = HashMap::new();

    for op in ops {
      match op {
        Op::Set(index, value) => {
          let Some(k) = keys[index].as_ref() else { continue };

          match map.as_mut() {
            Some(map) => map.set(k, boxed(value)),
            None => map = Some(LocalMap::new(k, boxed(value))),
          }

          oracle.insert(pool_bits(index), value);
        }
        Op::Get(index) => {
          let Some(k) = keys[index].as_ref() else { continue };

          let found: Option<i32> = map.as_mut().and_then(|map| read(map, k));

          assert_eq!(found, oracle.get(&pool_bits(index)).copied());
        }
        Op::Remove(index) => {
          let Some(k) = keys[index].as_ref() else { continue };

          if let Some(map) = map.as_mut() {
            map.remove(k.key_id());
          }

          oracle.remove(&pool_bits(index));
        }
        Op::Drop(index) => {
          keys[index] = None;
          oracle.remove(&pool_bits(index));
        }
      }

      if let Some(map) = map.as_ref() {
        map.assert_invariants();
      }
    }

    // Every surviving key still agrees with the oracle.
    for (index, slot) in keys.iter().enumerate() {
      let Some(k) = slot.as_ref() else { continue };

      let found: Option<i32> = map.as_mut().and_then(|map| read(map, k));

      assert_eq!(found, oracle.get(&pool_bits(index)).copied());
    }
  }
}
