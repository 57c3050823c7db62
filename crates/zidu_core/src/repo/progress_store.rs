//! Character Store contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist one versioned JSON blob per (user, logical key).
//! - Decode each logical key into its typed payload, strictly.
//! - Expose the legacy-row operations the migration gate runs on.
//!
//! # Invariants
//! - An absent user yields empty defaults for every key; `NotFound` is not
//!   an error (first-time user).
//! - Each `put` is a single upsert statement, so a concurrent reader never
//!   observes a partially written blob.
//! - Article history is capped at [`ARTICLE_HISTORY_CAP`] on every write,
//!   evicting the oldest entries.

use crate::db::DbError;
use crate::model::progress::{
    ArticleEntry, CharInfo, MasteredInfo, PassSet, UserId, ARTICLE_HISTORY_CAP, LEGACY_SENTINEL,
};
use log::warn;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Version stamped into every stored blob envelope.
const BLOB_VERSION: u32 = 1;

pub type StoreResult<T> = Result<T, StoreError>;

/// Character Store error surface. `InvalidData` covers malformed blobs,
/// unsupported envelope versions and unexpected row keys; it is surfaced
/// to the caller unchanged, never silently repaired.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    InvalidData { key: String, message: String },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData { key, message } => {
                write!(f, "invalid stored data under `{key}`: {message}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData { .. } => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// The five durable per-user keys. Wire names are kept verbatim from the
/// original single-user layout so legacy rows migrate without rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogicalKey {
    UnknownChars,
    MasteredChars,
    MasteredCharData,
    ArticleHistory,
    QuizProgress,
}

pub const ALL_LOGICAL_KEYS: [LogicalKey; 5] = [
    LogicalKey::UnknownChars,
    LogicalKey::MasteredChars,
    LogicalKey::MasteredCharData,
    LogicalKey::ArticleHistory,
    LogicalKey::QuizProgress,
];

impl LogicalKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownChars => "unknownChars",
            Self::MasteredChars => "masteredChars",
            Self::MasteredCharData => "masteredCharData",
            Self::ArticleHistory => "articleHistory",
            Self::QuizProgress => "quizProgress",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unknownChars" => Some(Self::UnknownChars),
            "masteredChars" => Some(Self::MasteredChars),
            "masteredCharData" => Some(Self::MasteredCharData),
            "articleHistory" => Some(Self::ArticleHistory),
            "quizProgress" => Some(Self::QuizProgress),
            _ => None,
        }
    }
}

impl Display for LogicalKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// All quiz-relevant state for one user, assembled from four logical keys.
/// Absent keys come back as empty collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProgress {
    /// Studying characters with their external annotation.
    pub unknown: BTreeMap<String, CharInfo>,
    /// Mastered characters.
    pub mastered: BTreeSet<String>,
    /// Annotation plus promotion timestamp for mastered characters.
    pub mastered_data: BTreeMap<String, MasteredInfo>,
    /// Pass bookkeeping, retained across promotion.
    pub quiz_progress: BTreeMap<String, PassSet>,
}

/// Outcome of one legacy-claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyClaim {
    /// No legacy rows exist; nothing to do.
    Nothing,
    /// Legacy rows were moved under the claiming user.
    Claimed(Vec<LogicalKey>),
    /// The claiming user already owns a row for this key; rolled back.
    Conflict(LogicalKey),
}

/// Character Store contract: all durable per-user progress access.
pub trait ProgressStore {
    fn load_progress(&self, user: &UserId) -> StoreResult<UserProgress>;
    fn save_unknown(&self, user: &UserId, unknown: &BTreeMap<String, CharInfo>)
        -> StoreResult<()>;
    fn save_mastered(&self, user: &UserId, mastered: &BTreeSet<String>) -> StoreResult<()>;
    fn save_mastered_data(
        &self,
        user: &UserId,
        data: &BTreeMap<String, MasteredInfo>,
    ) -> StoreResult<()>;
    fn save_quiz_progress(
        &self,
        user: &UserId,
        progress: &BTreeMap<String, PassSet>,
    ) -> StoreResult<()>;
    fn load_article_history(&self, user: &UserId) -> StoreResult<Vec<ArticleEntry>>;
    /// Saves the history list, enforcing the cap (oldest entries evicted).
    fn save_article_history(&self, user: &UserId, entries: &[ArticleEntry]) -> StoreResult<()>;
    /// Byte length of each present logical key. Read-only health surface.
    fn blob_sizes(&self, user: &UserId) -> StoreResult<Vec<(LogicalKey, u64)>>;
    /// Logical keys still parked under the legacy sentinel.
    fn legacy_pending(&self) -> StoreResult<Vec<LogicalKey>>;
    /// Atomically moves every legacy row under `user` and removes the
    /// sentinel rows. First committed claim wins; later claims see
    /// [`LegacyClaim::Nothing`].
    fn take_legacy(&self, user: &UserId) -> StoreResult<LegacyClaim>;
}

/// Strict envelope wrapped around every stored payload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    version: u32,
    data: serde_json::Value,
}

fn encode_blob<T: Serialize>(key: LogicalKey, payload: &T) -> StoreResult<String> {
    let data = serde_json::to_value(payload).map_err(|err| StoreError::InvalidData {
        key: key.as_str().to_string(),
        message: format!("encode failed: {err}"),
    })?;
    let envelope = Envelope {
        version: BLOB_VERSION,
        data,
    };
    serde_json::to_string(&envelope).map_err(|err| StoreError::InvalidData {
        key: key.as_str().to_string(),
        message: format!("encode failed: {err}"),
    })
}

fn decode_blob<T: DeserializeOwned>(key: LogicalKey, raw: &str) -> StoreResult<T> {
    let invalid = |message: String| StoreError::InvalidData {
        key: key.as_str().to_string(),
        message,
    };

    let envelope: Envelope =
        serde_json::from_str(raw).map_err(|err| invalid(format!("not a blob envelope: {err}")))?;

    if envelope.version != BLOB_VERSION {
        return Err(invalid(format!(
            "unsupported blob version {} (expected {BLOB_VERSION})",
            envelope.version
        )));
    }

    serde_json::from_value(envelope.data).map_err(|err| invalid(format!("bad payload: {err}")))
}

/// SQLite-backed Character Store.
pub struct SqliteProgressStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProgressStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn get_blob(&self, user: &str, key: LogicalKey) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM user_blobs WHERE user = ?1 AND key = ?2;",
                params![user, key.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put_blob(&self, user: &str, key: LogicalKey, value: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO user_blobs (user, key, value, updated_at)
             VALUES (?1, ?2, ?3, strftime('%s', 'now') * 1000)
             ON CONFLICT (user, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![user, key.as_str(), value],
        )?;
        Ok(())
    }

    fn load_key<T: DeserializeOwned + Default>(
        &self,
        user: &str,
        key: LogicalKey,
    ) -> StoreResult<T> {
        match self.get_blob(user, key)? {
            Some(raw) => decode_blob(key, &raw).map_err(|err| {
                warn!("event=blob_decode module=repo status=error key={key}");
                err
            }),
            None => Ok(T::default()),
        }
    }

    fn save_key<T: Serialize>(&self, user: &str, key: LogicalKey, payload: &T) -> StoreResult<()> {
        let blob = encode_blob(key, payload)?;
        self.put_blob(user, key, &blob)
    }
}

impl ProgressStore for SqliteProgressStore<'_> {
    fn load_progress(&self, user: &UserId) -> StoreResult<UserProgress> {
        Ok(UserProgress {
            unknown: self.load_key(user.as_str(), LogicalKey::UnknownChars)?,
            mastered: self.load_key(user.as_str(), LogicalKey::MasteredChars)?,
            mastered_data: self.load_key(user.as_str(), LogicalKey::MasteredCharData)?,
            quiz_progress: self.load_key(user.as_str(), LogicalKey::QuizProgress)?,
        })
    }

    fn save_unknown(
        &self,
        user: &UserId,
        unknown: &BTreeMap<String, CharInfo>,
    ) -> StoreResult<()> {
        self.save_key(user.as_str(), LogicalKey::UnknownChars, unknown)
    }

    fn save_mastered(&self, user: &UserId, mastered: &BTreeSet<String>) -> StoreResult<()> {
        self.save_key(user.as_str(), LogicalKey::MasteredChars, mastered)
    }

    fn save_mastered_data(
        &self,
        user: &UserId,
        data: &BTreeMap<String, MasteredInfo>,
    ) -> StoreResult<()> {
        self.save_key(user.as_str(), LogicalKey::MasteredCharData, data)
    }

    fn save_quiz_progress(
        &self,
        user: &UserId,
        progress: &BTreeMap<String, PassSet>,
    ) -> StoreResult<()> {
        self.save_key(user.as_str(), LogicalKey::QuizProgress, progress)
    }

    fn load_article_history(&self, user: &UserId) -> StoreResult<Vec<ArticleEntry>> {
        self.load_key(user.as_str(), LogicalKey::ArticleHistory)
    }

    fn save_article_history(&self, user: &UserId, entries: &[ArticleEntry]) -> StoreResult<()> {
        let capped = &entries[..entries.len().min(ARTICLE_HISTORY_CAP)];
        self.save_key(user.as_str(), LogicalKey::ArticleHistory, &capped)
    }

    fn blob_sizes(&self, user: &UserId) -> StoreResult<Vec<(LogicalKey, u64)>> {
        // CAST to BLOB so length() reports bytes, not characters.
        let mut stmt = self.conn.prepare(
            "SELECT key, length(CAST(value AS BLOB)) FROM user_blobs WHERE user = ?1 ORDER BY key;",
        )?;
        let mut rows = stmt.query(params![user.as_str()])?;

        let mut sizes = Vec::new();
        while let Some(row) = rows.next()? {
            let key_text: String = row.get(0)?;
            let key = LogicalKey::parse(&key_text).ok_or_else(|| StoreError::InvalidData {
                key: key_text.clone(),
                message: "unexpected logical key in user_blobs".to_string(),
            })?;
            let bytes: i64 = row.get(1)?;
            sizes.push((key, bytes.max(0) as u64));
        }
        Ok(sizes)
    }

    fn legacy_pending(&self) -> StoreResult<Vec<LogicalKey>> {
        legacy_keys(self.conn)
    }

    fn take_legacy(&self, user: &UserId) -> StoreResult<LegacyClaim> {
        // IMMEDIATE takes the write lock before the legacy rows are read,
        // so racing claimants serialize on the busy timeout: the loser
        // begins after the winner committed, reads zero legacy rows and
        // returns a clean no-op instead of a lock-upgrade error.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let keys = legacy_keys(&tx)?;
        if keys.is_empty() {
            return Ok(LegacyClaim::Nothing);
        }

        // Never clobber data the user already owns; roll back instead.
        for key in &keys {
            let occupied = tx
                .query_row(
                    "SELECT 1 FROM user_blobs WHERE user = ?1 AND key = ?2;",
                    params![user.as_str(), key.as_str()],
                    |_| Ok(()),
                )
                .optional()?;
            if occupied.is_some() {
                return Ok(LegacyClaim::Conflict(*key));
            }
        }

        tx.execute(
            "UPDATE user_blobs
             SET user = ?1,
                 updated_at = strftime('%s', 'now') * 1000
             WHERE user = ?2;",
            params![user.as_str(), LEGACY_SENTINEL],
        )?;
        tx.commit()?;

        Ok(LegacyClaim::Claimed(keys))
    }
}

fn legacy_keys(conn: &Connection) -> StoreResult<Vec<LogicalKey>> {
    let mut stmt =
        conn.prepare("SELECT key FROM user_blobs WHERE user = ?1 ORDER BY key;")?;
    let mut rows = stmt.query(params![LEGACY_SENTINEL])?;

    let mut keys = Vec::new();
    while let Some(row) = rows.next()? {
        let key_text: String = row.get(0)?;
        let key = LogicalKey::parse(&key_text).ok_or_else(|| StoreError::InvalidData {
            key: key_text.clone(),
            message: "unexpected logical key under legacy sentinel".to_string(),
        })?;
        keys.push(key);
    }
    Ok(keys)
}
