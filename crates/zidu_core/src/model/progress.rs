//! Character progress domain types.
//!
//! # Responsibility
//! - Define user identity, quiz kinds, pass bookkeeping and mastery state.
//! - Provide the parse/format mappings used at the request boundary.
//!
//! # Invariants
//! - `UserId` never holds the legacy sentinel (`"main"`) or an empty string.
//! - `PassSet::is_full()` is the sole promotion condition.
//! - A mastered character keeps its pass set; it is never cleared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage namespace reserved for pre-multi-user data awaiting migration.
pub const LEGACY_SENTINEL: &str = "main";

/// Maximum number of retained article history entries per user.
pub const ARTICLE_HISTORY_CAP: usize = 10;

/// Verified user identity (an email address or equivalent opaque id).
///
/// Construction is the only validation point: the authentication layer is
/// trusted for verification, but the legacy sentinel must never be usable
/// as a caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

#[derive(Debug, PartialEq, Eq)]
pub enum UserIdError {
    Empty,
    Reserved,
}

impl Display for UserIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "user id cannot be empty"),
            Self::Reserved => write!(f, "user id `{LEGACY_SENTINEL}` is reserved for legacy data"),
        }
    }
}

impl Error for UserIdError {}

impl UserId {
    /// Creates a user id, rejecting empty input and the legacy sentinel.
    pub fn new(value: impl Into<String>) -> Result<Self, UserIdError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(UserIdError::Empty);
        }
        if trimmed == LEGACY_SENTINEL {
            return Err(UserIdError::Reserved);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Practice modality for one quiz answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizKind {
    /// Type the tone-marked romanization.
    Pinyin,
    /// Recognize the character from its meaning.
    Flashcard,
    /// Produce the character by writing it.
    Writing,
}

/// All quiz kinds, in canonical order. Full coverage of this set promotes.
pub const ALL_QUIZ_KINDS: [QuizKind; 3] = [QuizKind::Pinyin, QuizKind::Flashcard, QuizKind::Writing];

impl QuizKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pinyin => "pinyin",
            Self::Flashcard => "flashcard",
            Self::Writing => "writing",
        }
    }

    /// Parses the wire name used by the request layer.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pinyin" => Some(Self::Pinyin),
            "flashcard" => Some(Self::Flashcard),
            "writing" => Some(Self::Writing),
            _ => None,
        }
    }
}

impl Display for QuizKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which quiz kinds a character has passed since it last entered `studying`.
///
/// Serialized as three named booleans so stored blobs stay self-describing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PassSet {
    pub pinyin: bool,
    pub flashcard: bool,
    pub writing: bool,
}

impl PassSet {
    pub fn contains(&self, kind: QuizKind) -> bool {
        match kind {
            QuizKind::Pinyin => self.pinyin,
            QuizKind::Flashcard => self.flashcard,
            QuizKind::Writing => self.writing,
        }
    }

    /// Marks a kind as passed. Returns `true` when the kind was newly added.
    pub fn insert(&mut self, kind: QuizKind) -> bool {
        let slot = match kind {
            QuizKind::Pinyin => &mut self.pinyin,
            QuizKind::Flashcard => &mut self.flashcard,
            QuizKind::Writing => &mut self.writing,
        };
        let added = !*slot;
        *slot = true;
        added
    }

    /// Full coverage of all three quiz kinds.
    pub fn is_full(&self) -> bool {
        self.pinyin && self.flashcard && self.writing
    }

    pub fn is_empty(&self) -> bool {
        !(self.pinyin || self.flashcard || self.writing)
    }

    /// Kinds passed so far, in canonical order.
    pub fn kinds(&self) -> Vec<QuizKind> {
        ALL_QUIZ_KINDS
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .collect()
    }
}

/// Lifecycle state of one character for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryStatus {
    Studying,
    Mastered,
}

impl MasteryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Studying => "studying",
            Self::Mastered => "mastered",
        }
    }
}

impl Display for MasteryStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Externally supplied annotation for a character. Stored opaquely; the
/// dictionary layer owns correctness of both fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CharInfo {
    /// Tone-marked romanization, e.g. `hǎo`.
    pub pinyin: String,
    /// Ordered gloss strings.
    pub meanings: Vec<String>,
}

/// Annotation plus promotion timestamp for a mastered character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasteredInfo {
    pub pinyin: String,
    pub meanings: Vec<String>,
    pub mastered_at: DateTime<Utc>,
}

impl MasteredInfo {
    pub fn from_info(info: CharInfo, mastered_at: DateTime<Utc>) -> Self {
        Self {
            pinyin: info.pinyin,
            meanings: info.meanings,
            mastered_at,
        }
    }

    pub fn info(&self) -> CharInfo {
        CharInfo {
            pinyin: self.pinyin.clone(),
            meanings: self.meanings.clone(),
        }
    }
}

/// Assembled read model for one character: what the UI renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharRecord {
    pub character: String,
    pub pinyin: String,
    pub meanings: Vec<String>,
    pub status: MasteryStatus,
    pub passed: PassSet,
    /// Present iff `status == Mastered`.
    pub mastered_at: Option<DateTime<Utc>>,
}

/// One scanned article, most-recent-first in the history list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArticleEntry {
    pub text: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CharValidationError {
    Empty,
    NotSingleCharacter(String),
}

impl Display for CharValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "character cannot be empty"),
            Self::NotSingleCharacter(value) => {
                write!(f, "expected a single character, got `{value}`")
            }
        }
    }
}

impl Error for CharValidationError {}

/// Validates that a progress key is exactly one logographic character.
///
/// CJK ideographs, including the extension planes, are single code points;
/// multi-character strings indicate a request-layer bug and are rejected.
pub fn validate_character(character: &str) -> Result<(), CharValidationError> {
    let mut chars = character.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Err(CharValidationError::Empty),
        (Some(_), None) => Ok(()),
        (Some(_), Some(_)) => Err(CharValidationError::NotSingleCharacter(
            character.to_string(),
        )),
    }
}
