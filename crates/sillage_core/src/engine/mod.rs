//! Protocol generation and fiscal audit engine.
//!
//! # Responsibility
//! - Pure scoring, matching and pricing functions over the catalog.
//! - The combinatorial generator and the inventory synchronization pass.
//! - Query helpers over an in-memory protocol list.
//!
//! # Invariants
//! - Nothing in this module touches storage; callers persist results.

pub mod compatibility;
pub mod fiscal;
pub mod generator;
pub mod matcher;
pub mod search;
pub mod sync;
