//! Domain model for per-user character progress.
//!
//! # Responsibility
//! - Define the canonical types shared by store, state machine and selector.
//! - Keep quiz-kind and mastery vocabulary in one place.
//!
//! # Invariants
//! - A character is mastered iff all three quiz kinds have been passed.
//! - Mastery is monotonic: no type in this module models a demotion path.

pub mod progress;
