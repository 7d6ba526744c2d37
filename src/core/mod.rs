//! Core deterministic primitives.
//!
//! Seeded randomness shared by the built-in question bank.

pub mod rng;

pub use rng::{DeterministicRng, derive_round_seed};
