//! Quiz pool selector with weighted review injection.
//!
//! # Responsibility
//! - Build the ordered set of characters offered in one quiz session.
//! - Re-inject mastered characters at a fixed rate for spaced review.
//!
//! # Invariants
//! - Pure read + sampling: the store is never mutated.
//! - Within one session a character repeats only after both pools are
//!   exhausted, and the session reports `has_repeats` when that happens.
//! - Sampling uses a caller-supplied RNG, so sessions are reproducible
//!   under a seeded generator.

use crate::model::progress::UserId;
use crate::repo::progress_store::{ProgressStore, StoreResult};
use rand::Rng;
use uuid::Uuid;

/// Probability that a slot draws from the mastered pool when both pools
/// are non-empty. Frequent enough to counter forgetting, infrequent
/// enough that review does not dominate new-material practice.
pub const REVIEW_RATIO: f64 = 0.25;

/// One offered character. `is_review` marks mastered characters so the
/// presentation layer can badge them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSlot {
    pub character: String,
    pub is_review: bool,
}

/// One quiz session, ordered as presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSession {
    pub id: Uuid,
    pub slots: Vec<QuizSlot>,
    /// `true` when the requested size exceeded the distinct supply and
    /// characters were re-offered instead of truncating the session.
    pub has_repeats: bool,
}

impl QuizSession {
    fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            slots: Vec::new(),
            has_repeats: false,
        }
    }
}

/// Use-case service for building quiz sessions.
pub struct QuizService<S: ProgressStore> {
    store: S,
}

impl<S: ProgressStore> QuizService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Builds a session with the process-wide RNG.
    pub fn build_session(&self, user: &UserId, size: usize) -> StoreResult<QuizSession> {
        self.build_session_with(user, size, &mut rand::thread_rng())
    }

    /// Builds a session with a caller-supplied RNG. A user with no
    /// characters gets an empty session; that is a normal state, not an
    /// error.
    pub fn build_session_with(
        &self,
        user: &UserId,
        size: usize,
        rng: &mut impl Rng,
    ) -> StoreResult<QuizSession> {
        let progress = self.store.load_progress(user)?;

        let studying: Vec<&str> = progress
            .unknown
            .keys()
            .filter(|character| !progress.mastered.contains(character.as_str()))
            .map(String::as_str)
            .collect();
        let mastered: Vec<&str> = progress.mastered.iter().map(String::as_str).collect();

        if studying.is_empty() && mastered.is_empty() {
            return Ok(QuizSession::empty());
        }

        let mut session = QuizSession::empty();
        let mut remaining_studying = studying.clone();
        let mut remaining_mastered = mastered.clone();

        while session.slots.len() < size {
            if remaining_studying.is_empty() && remaining_mastered.is_empty() {
                // Distinct supply exhausted: refill and keep going rather
                // than silently truncating below the requested size.
                remaining_studying = studying.clone();
                remaining_mastered = mastered.clone();
                session.has_repeats = true;
            }

            let draw_mastered = if remaining_mastered.is_empty() {
                false
            } else if remaining_studying.is_empty() {
                true
            } else {
                rng.gen_bool(REVIEW_RATIO)
            };

            let pool = if draw_mastered {
                &mut remaining_mastered
            } else {
                &mut remaining_studying
            };
            let index = rng.gen_range(0..pool.len());
            let character = pool.swap_remove(index);

            session.slots.push(QuizSlot {
                character: character.to_string(),
                is_review: draw_mastered,
            });
        }

        Ok(session)
    }
}
