//! Username and id collisions between local and remote users
//!
//! Detection is a pure function over two user lists. Picking a replacement
//! username is delegated to a [`UsernameResolver`], so a terminal prompt, a
//! TUI dialog or a test double can all drive the same algorithm.

use std::fmt;

use async_trait::async_trait;

use crate::models::{EntityId, SyncEntity, User};

/// A local user that cannot be pushed as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityConflict {
    /// Same id on both sides but different usernames
    Id { local: User, remote: User },
    /// Different ids claiming the same username (case-insensitive)
    Username { local: User, remote: User },
}

impl IdentityConflict {
    pub const fn local(&self) -> &User {
        match self {
            Self::Id { local, .. } | Self::Username { local, .. } => local,
        }
    }
}

/// Compare pending local users against the remote users.
///
/// Each local user yields at most one conflict; an id clash wins over a
/// username clash because re-keying changes which remote row it would meet.
pub fn detect_identity_conflicts(local: &[User], remote: &[User]) -> Vec<IdentityConflict> {
    let mut conflicts = Vec::new();

    for candidate in local {
        let same_id = remote.iter().find(|other| other.id() == candidate.id());
        if let Some(other) = same_id {
            if !other.has_username(&candidate.username) {
                conflicts.push(IdentityConflict::Id {
                    local: candidate.clone(),
                    remote: other.clone(),
                });
                continue;
            }
        }

        let same_name = remote
            .iter()
            .find(|other| other.id() != candidate.id() && other.has_username(&candidate.username));
        if let Some(other) = same_name {
            conflicts.push(IdentityConflict::Username {
                local: candidate.clone(),
                remote: other.clone(),
            });
        }
    }

    conflicts
}

/// Why a proposed replacement username was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsernameRejection {
    Empty,
    Invalid(String),
    TakenRemotely,
    TakenLocally,
    /// The remote store could not be asked
    Unverified,
}

impl fmt::Display for UsernameRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("username cannot be empty"),
            Self::Invalid(reason) => f.write_str(reason),
            Self::TakenRemotely => f.write_str("username is already taken on the server"),
            Self::TakenLocally => f.write_str("username conflicts with another local account"),
            Self::Unverified => f.write_str("could not check the server, please try again"),
        }
    }
}

/// Supplies replacement usernames for local accounts that collide remotely.
#[async_trait]
pub trait UsernameResolver: Send + Sync {
    /// Propose a new name for `local`, whose name is held by `taken_by`.
    ///
    /// `rejection` carries the reason the previous proposal was refused.
    /// Returning `None` gives up; the account stays unsynced.
    async fn propose_username(
        &self,
        local: &User,
        taken_by: &User,
        rejection: Option<&UsernameRejection>,
    ) -> Option<String>;
}

/// How one detected conflict ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolution {
    Rekeyed {
        username: String,
        old_id: EntityId,
        new_id: EntityId,
    },
    Renamed {
        user_id: EntityId,
        from: String,
        to: String,
    },
    Abandoned {
        user_id: EntityId,
        username: String,
    },
}

/// Outcome of one identity-conflict pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityReport {
    /// False when the remote store could not be consulted
    pub remote_checked: bool,
    pub resolutions: Vec<ConflictResolution>,
}

impl IdentityReport {
    /// No conflict was left unresolved
    pub fn is_clear(&self) -> bool {
        !self
            .resolutions
            .iter()
            .any(|resolution| matches!(resolution, ConflictResolution::Abandoned { .. }))
    }
}
