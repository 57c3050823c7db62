//! One-time migration of legacy single-user data to the multi-user layout.
//!
//! # Responsibility
//! - Detect legacy rows (stored under the `main` sentinel) at startup.
//! - Hand the whole legacy dataset to exactly one user at first login.
//!
//! # Invariants
//! - "Needed" is derived purely from row presence, never from an
//!   in-memory flag, so a partially applied migration resumes after a
//!   restart.
//! - Legacy data is invisible to authenticated users until claimed; it is
//!   parked, not lost.
//! - Racing claimants resolve to one winner; legacy data is never split
//!   across users and never clobbers data a user already owns.

use crate::model::progress::UserId;
use crate::repo::progress_store::{LegacyClaim, LogicalKey, ProgressStore, StoreError};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type MigrationResult<T> = Result<T, MigrationError>;

#[derive(Debug)]
pub enum MigrationError {
    Store(StoreError),
    /// The claiming user already owns a row for a legacy key; the claim
    /// was rolled back in full.
    Conflict { user: UserId, key: LogicalKey },
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Conflict { user, key } => write!(
                f,
                "legacy migration conflict: user `{user}` already owns `{key}`"
            ),
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Conflict { .. } => None,
        }
    }
}

impl From<StoreError> for MigrationError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Report of one gate invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: bool,
    pub assigned_to: Option<UserId>,
}

impl MigrationReport {
    fn noop() -> Self {
        Self {
            migrated: false,
            assigned_to: None,
        }
    }
}

/// Startup gate for the legacy single-user dataset.
pub struct MigrationGate<S: ProgressStore> {
    store: S,
}

impl<S: ProgressStore> MigrationGate<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Runs at process startup, before any per-user read or write. With no
    /// authenticated user available yet this can only report whether
    /// legacy data is parked; the actual handover happens in [`claim`]
    /// on the next successful login.
    ///
    /// Once the legacy rows are gone, repeated invocations are no-ops.
    ///
    /// [`claim`]: MigrationGate::claim
    pub fn migrate_if_needed(&self) -> MigrationResult<MigrationReport> {
        let pending = self.store.legacy_pending()?;
        if pending.is_empty() {
            return Ok(MigrationReport::noop());
        }

        info!(
            "event=legacy_pending module=migration status=ok keys={}",
            pending.len()
        );
        Ok(MigrationReport::noop())
    }

    /// Assigns parked legacy data to `user`. Called by the request layer
    /// on each successful login; a no-op once the data has an owner.
    pub fn claim(&self, user: &UserId) -> MigrationResult<MigrationReport> {
        match self.store.take_legacy(user)? {
            LegacyClaim::Nothing => Ok(MigrationReport::noop()),
            LegacyClaim::Claimed(keys) => {
                info!(
                    "event=legacy_claimed module=migration status=ok user={user} keys={}",
                    keys.len()
                );
                Ok(MigrationReport {
                    migrated: true,
                    assigned_to: Some(user.clone()),
                })
            }
            LegacyClaim::Conflict(key) => {
                warn!("event=legacy_claim module=migration status=conflict key={key}");
                Err(MigrationError::Conflict {
                    user: user.clone(),
                    key,
                })
            }
        }
    }
}
