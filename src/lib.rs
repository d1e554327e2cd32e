//! Threadvar - per-thread variable bindings.
//!
//! A [`Local`] gives every thread that touches it a private, independently
//! initialized binding; an [`Inheritable`] additionally flows into threads
//! spawned through [`spawn`] or [`Builder`]. Bindings are stored in a
//! weak-keyed table owned by each thread, so dropping the last handle of a
//! variable releases its values in every thread without coordination.
//!
//! ```
//! use threadvar::Local;
//!
//! let depth: Local<u32> = Local::with_initial(|| 0);
//!
//! depth.set(3);
//!
//! let other: u32 = std::thread::spawn({
//!   let depth: Local<u32> = depth.clone();
//!   move || depth.get()
//! })
//! .join()
//! .unwrap();
//!
//! assert_eq!(depth.get(), 3);
//! assert_eq!(other, 0);
//! ```

mod error;
mod key;
mod map;
mod thread;

pub mod consts;

pub use crate::error::LocalError;
pub use crate::key::Inheritable;
pub use crate::key::Local;
pub use crate::thread::Builder;
pub use crate::thread::spawn;
