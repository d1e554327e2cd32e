//! Binding keys: identity, initial-value policy, and inheritance hooks.

mod core;
mod id;
mod inheritable;
mod local;

pub(crate) use self::core::BoxedValue;
pub(crate) use self::core::KeyCore;
pub(crate) use self::id::KeyId;
pub(crate) use self::id::next_key_id;

pub use self::inheritable::Inheritable;
pub use self::local::Local;
