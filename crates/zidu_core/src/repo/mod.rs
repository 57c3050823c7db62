//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the Character Store contract used by all services.
//! - Isolate SQLite and blob-encoding details from service orchestration.
//!
//! # Invariants
//! - Every query is scoped by exact user equality; the legacy sentinel is
//!   reachable only through the dedicated legacy operations.
//! - Blobs decode through a strict versioned schema; malformed or
//!   legacy-shaped data fails loudly instead of being coerced.

pub mod progress_store;
