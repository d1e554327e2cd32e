//! Tuning constants and default values.
//!
//! This module defines the fundamental sizing and hashing parameters for the
//! per-thread binding tables. These values are load-bearing: the probing and
//! reclamation logic assumes power-of-two table lengths and the exact
//! identifier stride below.

// -----------------------------------------------------------------------------
// Key Identity
// -----------------------------------------------------------------------------

/// The difference between successively dispensed key identifiers.
///
/// This is the closest odd integer to `2^32 / φ` (the golden ratio), which
/// turns implicitly sequential identifiers into near-optimally spread
/// multiplicative hash values for power-of-two-sized tables: taking the low
/// `log2(len)` bits of identifiers generated with this stride disperses
/// consecutively created keys across distinct slots.
pub const ID_INCREMENT: u32 = 0x61C8_8647;

// -----------------------------------------------------------------------------
// Table Sizing
// -----------------------------------------------------------------------------

/// Initial capacity of a per-thread binding table.
///
/// Must be a power of two. Tables double on resize, so every table length
/// is a power of two and slot selection reduces to a bit mask.
pub const INITIAL_CAPACITY: usize = 16;
