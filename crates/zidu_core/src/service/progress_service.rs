//! Progress state machine: quiz outcomes and character promotion.
//!
//! # Responsibility
//! - Apply one quiz-outcome event to a character's record and decide
//!   promotion from `studying` to `mastered`.
//! - Register tapped characters and scanned articles.
//!
//! # Invariants
//! - A miss never revokes a prior pass and never changes status.
//! - Promotion happens exactly once, only when the pass set covers all
//!   three quiz kinds while the character is still `studying`.
//! - There is no demotion path; `mastered_at` is never restamped.
//! - Inputs are validated before any store read or write.

use crate::model::progress::{
    validate_character, ArticleEntry, CharInfo, CharRecord, CharValidationError, MasteredInfo,
    MasteryStatus, PassSet, QuizKind, UserId, ARTICLE_HISTORY_CAP,
};
use crate::repo::progress_store::{ProgressStore, StoreError, UserProgress};
use chrono::{DateTime, Utc};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ProgressResult<T> = Result<T, ProgressError>;

#[derive(Debug)]
pub enum ProgressError {
    /// Quiz kind outside pinyin/flashcard/writing; rejected before any
    /// state mutation.
    InvalidQuizKind(String),
    Validation(CharValidationError),
    Store(StoreError),
}

impl Display for ProgressError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuizKind(value) => {
                write!(f, "unknown quiz kind `{value}`; expected pinyin|flashcard|writing")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProgressError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidQuizKind(_) => None,
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<CharValidationError> for ProgressError {
    fn from(value: CharValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for ProgressError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Result of one recorded quiz outcome, consumed by the request layer to
/// drive the promotion toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub status: MasteryStatus,
    /// `true` exactly once per character lifetime, at the promoting answer.
    pub promoted: bool,
}

/// Use-case service for the progress state machine.
pub struct ProgressService<S: ProgressStore> {
    store: S,
}

impl<S: ProgressStore> ProgressService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Records one quiz answer for `character`.
    ///
    /// `kind` is the wire name supplied by the request layer; anything
    /// outside the three known kinds fails with `InvalidQuizKind` before
    /// the store is touched. A character without a record gets one in
    /// `studying` state with an empty pass set.
    pub fn record_outcome(
        &self,
        user: &UserId,
        character: &str,
        kind: &str,
        passed: bool,
    ) -> ProgressResult<Outcome> {
        let kind = QuizKind::parse(kind)
            .ok_or_else(|| ProgressError::InvalidQuizKind(kind.to_string()))?;
        validate_character(character)?;

        let mut progress = self.store.load_progress(user)?;
        let created = !progress.unknown.contains_key(character)
            && !progress.mastered.contains(character);
        let outcome = apply_outcome(&mut progress, character, kind, passed, Utc::now());

        // quizProgress changes on record creation even for a miss; the
        // other keys only move when a record is created or promoted.
        self.store.save_quiz_progress(user, &progress.quiz_progress)?;
        if created && !outcome.promoted {
            self.store.save_unknown(user, &progress.unknown)?;
        }
        if outcome.promoted {
            self.store.save_unknown(user, &progress.unknown)?;
            self.store.save_mastered(user, &progress.mastered)?;
            self.store.save_mastered_data(user, &progress.mastered_data)?;
            info!(
                "event=char_promoted module=progress status=ok character={character} kind={kind}"
            );
        }

        Ok(outcome)
    }

    /// Registers a character the reader tapped, with its externally
    /// supplied annotation. A no-op for already-mastered characters;
    /// otherwise the annotation is created or refreshed.
    pub fn track_character(
        &self,
        user: &UserId,
        character: &str,
        info: CharInfo,
    ) -> ProgressResult<()> {
        validate_character(character)?;

        let mut progress = self.store.load_progress(user)?;
        if progress.mastered.contains(character) {
            return Ok(());
        }

        progress.unknown.insert(character.to_string(), info);
        self.store.save_unknown(user, &progress.unknown)?;
        Ok(())
    }

    /// Prepends a scanned article to the user's history. The store evicts
    /// entries past the cap of [`ARTICLE_HISTORY_CAP`].
    pub fn push_article(&self, user: &UserId, text: impl Into<String>) -> ProgressResult<()> {
        let mut history = self.store.load_article_history(user)?;
        history.insert(
            0,
            ArticleEntry {
                text: text.into(),
                added_at: Utc::now(),
            },
        );
        history.truncate(ARTICLE_HISTORY_CAP);
        self.store.save_article_history(user, &history)?;
        Ok(())
    }

    /// Assembles the per-character read models for the UI: studying
    /// characters first, then mastered, each sorted by character.
    pub fn list_records(&self, user: &UserId) -> ProgressResult<Vec<CharRecord>> {
        let progress = self.store.load_progress(user)?;
        let mut records = Vec::new();

        for (character, info) in &progress.unknown {
            records.push(CharRecord {
                character: character.clone(),
                pinyin: info.pinyin.clone(),
                meanings: info.meanings.clone(),
                status: MasteryStatus::Studying,
                passed: passes_of(&progress, character),
                mastered_at: None,
            });
        }

        for character in &progress.mastered {
            let data = progress.mastered_data.get(character);
            records.push(CharRecord {
                character: character.clone(),
                pinyin: data.map(|d| d.pinyin.clone()).unwrap_or_default(),
                meanings: data.map(|d| d.meanings.clone()).unwrap_or_default(),
                status: MasteryStatus::Mastered,
                passed: passes_of(&progress, character),
                mastered_at: data.map(|d| d.mastered_at),
            });
        }

        Ok(records)
    }
}

fn passes_of(progress: &UserProgress, character: &str) -> PassSet {
    progress
        .quiz_progress
        .get(character)
        .copied()
        .unwrap_or_default()
}

fn status_of(progress: &UserProgress, character: &str) -> MasteryStatus {
    if progress.mastered.contains(character) {
        MasteryStatus::Mastered
    } else {
        MasteryStatus::Studying
    }
}

/// Pure state transition for one quiz outcome. Mutates `progress` in place
/// and reports the resulting status plus whether this answer promoted.
fn apply_outcome(
    progress: &mut UserProgress,
    character: &str,
    kind: QuizKind,
    passed: bool,
    now: DateTime<Utc>,
) -> Outcome {
    // Step 1: ensure a record exists (studying, empty pass set).
    let already_mastered = progress.mastered.contains(character);
    if !already_mastered && !progress.unknown.contains_key(character) {
        progress
            .unknown
            .insert(character.to_string(), CharInfo::default());
    }
    let passes = progress
        .quiz_progress
        .entry(character.to_string())
        .or_default();

    // Step 2: a miss never revokes earned progress.
    if !passed {
        return Outcome {
            status: status_of(progress, character),
            promoted: false,
        };
    }

    // Step 3: bookkeeping applies to mastered characters too (review
    // answers), but never re-promotes or restamps.
    passes.insert(kind);
    if already_mastered || !passes.is_full() {
        return Outcome {
            status: status_of(progress, character),
            promoted: false,
        };
    }

    // Step 4: full coverage while studying is the sole promotion trigger.
    let info = progress.unknown.remove(character).unwrap_or_default();
    progress.mastered.insert(character.to_string());
    progress
        .mastered_data
        .insert(character.to_string(), MasteredInfo::from_info(info, now));

    Outcome {
        status: MasteryStatus::Mastered,
        promoted: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(
        progress: &mut UserProgress,
        character: &str,
        kind: QuizKind,
        passed: bool,
    ) -> Outcome {
        apply_outcome(progress, character, kind, passed, Utc::now())
    }

    #[test]
    fn miss_on_unseen_character_creates_studying_record() {
        let mut progress = UserProgress::default();
        let result = outcome(&mut progress, "学", QuizKind::Pinyin, false);

        assert_eq!(result.status, MasteryStatus::Studying);
        assert!(!result.promoted);
        assert!(progress.unknown.contains_key("学"));
        assert!(progress.quiz_progress["学"].is_empty());
    }

    #[test]
    fn promotion_requires_all_three_kinds() {
        let mut progress = UserProgress::default();

        assert!(!outcome(&mut progress, "学", QuizKind::Pinyin, true).promoted);
        assert!(!outcome(&mut progress, "学", QuizKind::Flashcard, true).promoted);

        let third = outcome(&mut progress, "学", QuizKind::Writing, true);
        assert!(third.promoted);
        assert_eq!(third.status, MasteryStatus::Mastered);
        assert!(!progress.unknown.contains_key("学"));
        assert!(progress.mastered.contains("学"));
        // Pass set is retained after promotion, not cleared.
        assert!(progress.quiz_progress["学"].is_full());
    }

    #[test]
    fn mastered_review_answer_never_repromotes_or_restamps() {
        let mut progress = UserProgress::default();
        for kind in [QuizKind::Pinyin, QuizKind::Flashcard, QuizKind::Writing] {
            outcome(&mut progress, "好", kind, true);
        }
        let stamped = progress.mastered_data["好"].mastered_at;

        let review = outcome(&mut progress, "好", QuizKind::Writing, true);
        assert!(!review.promoted);
        assert_eq!(review.status, MasteryStatus::Mastered);
        assert_eq!(progress.mastered_data["好"].mastered_at, stamped);
    }

    #[test]
    fn miss_never_revokes_a_pass_or_status() {
        let mut progress = UserProgress::default();
        for kind in [QuizKind::Pinyin, QuizKind::Flashcard, QuizKind::Writing] {
            outcome(&mut progress, "字", kind, true);
        }

        let miss = outcome(&mut progress, "字", QuizKind::Pinyin, false);
        assert_eq!(miss.status, MasteryStatus::Mastered);
        assert!(progress.quiz_progress["字"].is_full());
        assert!(progress.mastered.contains("字"));
    }

    #[test]
    fn promotion_carries_tracked_annotation_into_mastered_data() {
        let mut progress = UserProgress::default();
        progress.unknown.insert(
            "好".to_string(),
            CharInfo {
                pinyin: "hǎo".to_string(),
                meanings: vec!["good".to_string()],
            },
        );

        for kind in [QuizKind::Pinyin, QuizKind::Flashcard, QuizKind::Writing] {
            outcome(&mut progress, "好", kind, true);
        }

        assert_eq!(progress.mastered_data["好"].pinyin, "hǎo");
        assert_eq!(progress.mastered_data["好"].meanings, vec!["good"]);
    }
}
