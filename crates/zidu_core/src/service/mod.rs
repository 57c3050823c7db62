//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate Character Store access into the engine's operations:
//!   outcome recording, quiz-session building and the legacy migration gate.
//! - Keep request-layer callers decoupled from storage details.

pub mod migration_gate;
pub mod progress_service;
pub mod quiz_service;
