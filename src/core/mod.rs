//! Core deterministic primitives.
//!
//! Everything the engine draws at random (first-round seating, deck order)
//! comes from a seeded RNG, and every snapshot can be fingerprinted.

pub mod rng;
pub mod hash;

// Re-export core types
pub use rng::DeterministicRng;
pub use hash::{compute_state_hash, StateHash, StateHasher};
