//! Per-user character progress and quiz-scheduling engine for the zidu
//! reading aid. This crate is the single source of truth for progress
//! invariants: pass bookkeeping, mastery promotion, review injection and
//! the one-time legacy data migration.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::progress::{
    validate_character, ArticleEntry, CharInfo, CharRecord, CharValidationError, MasteredInfo,
    MasteryStatus, PassSet, QuizKind, UserId, UserIdError, ALL_QUIZ_KINDS, ARTICLE_HISTORY_CAP,
    LEGACY_SENTINEL,
};
pub use repo::progress_store::{
    LegacyClaim, LogicalKey, ProgressStore, SqliteProgressStore, StoreError, StoreResult,
    UserProgress, ALL_LOGICAL_KEYS,
};
pub use service::migration_gate::{MigrationError, MigrationGate, MigrationReport};
pub use service::progress_service::{Outcome, ProgressError, ProgressService};
pub use service::quiz_service::{QuizService, QuizSession, QuizSlot, REVIEW_RATIO};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
