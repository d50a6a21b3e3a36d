//! # Power Grid Game Server
//!
//! Authoritative turn, phase and auction engine for a Power Grid style table.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      POWER GRID SERVER                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                 │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG          │
//! │  └── hash.rs     - State hashing for verification           │
//! │                                                             │
//! │  game/           - Game logic (deterministic)               │
//! │  ├── phase.rs    - Phase cycle and transition table         │
//! │  ├── order.rs    - Player order by cities and plants        │
//! │  ├── auction.rs  - Power plant auction state                │
//! │  ├── state.rs    - The match engine                         │
//! │  ├── market.rs   - Power plant market                       │
//! │  ├── board.rs    - City network and build costs             │
//! │  ├── resources.rs - Fuel price buckets                      │
//! │  └── bot.rs      - Scripted players                         │
//! │                                                             │
//! │  network/        - Networking (non-deterministic)           │
//! │  ├── server.rs   - WebSocket server                         │
//! │  ├── protocol.rs - Message types                            │
//! │  ├── session.rs  - Match session management                 │
//! │  └── auth.rs     - Player tokens                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are deterministic:
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from seeded Xorshift128+
//!
//! Given the same match id, roster and action sequence, a match reaches
//! the same state hash on every run.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use core::hash::StateHash;
pub use game::phase::Phase;
pub use game::player::PlayerId;
pub use game::state::{ActionError, MatchConfig, MatchState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
