//! Player Roster
//!
//! Participants of a single game, kept in join order.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

// =============================================================================
// ACCOUNT ID
// =============================================================================

/// Identifier of an external account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl AccountId {
    /// Create from a raw id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// PARTICIPANT
// =============================================================================

/// An account's membership and score within one game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Account this participant belongs to
    pub account_id: AccountId,

    /// Display name snapshotted at join time
    pub display_name: String,

    /// Accumulated score
    pub score: i64,

    /// When the account joined
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Create a participant with a zero score.
    pub fn new(account_id: AccountId, display_name: impl Into<String>, joined_at: DateTime<Utc>) -> Self {
        Self {
            account_id,
            display_name: display_name.into(),
            score: 0,
            joined_at,
        }
    }

    /// Add a score delta.
    pub fn add_score(&mut self, delta: i64) {
        self.score = self.score.saturating_add(delta);
    }
}

// =============================================================================
// ROSTER
// =============================================================================

/// Ordered collection of participants with unique account ids.
///
/// Insertion order is preserved so iteration, ranking tie-breaks and
/// snapshots are deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    participants: Vec<Participant>,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a participant. Returns false if the account is already present.
    pub fn add(&mut self, participant: Participant) -> bool {
        if self.contains(&participant.account_id) {
            return false;
        }
        self.participants.push(participant);
        true
    }

    /// Remove a participant. Returns whether anyone was removed.
    pub fn remove(&mut self, account_id: &AccountId) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.account_id != *account_id);
        self.participants.len() != before
    }

    /// Find a participant by account.
    pub fn get(&self, account_id: &AccountId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.account_id == *account_id)
    }

    /// Find a participant mutably by account.
    pub fn get_mut(&mut self, account_id: &AccountId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.account_id == *account_id)
    }

    /// Check membership.
    pub fn contains(&self, account_id: &AccountId) -> bool {
        self.get(account_id).is_some()
    }

    /// Iterate in join order.
    pub fn iter(&self) -> std::slice::Iter<'_, Participant> {
        self.participants.iter()
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Whether nobody has joined.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Sum of all participant scores.
    pub fn total_score(&self) -> i64 {
        self.participants.iter().map(|p| p.score).sum()
    }

    /// Snapshot of `(account, display name, score)` in join order.
    pub fn scores(&self) -> Vec<(AccountId, String, i64)> {
        self.participants
            .iter()
            .map(|p| (p.account_id, p.display_name.clone(), p.score))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Roster {
    type Item = &'a Participant;
    type IntoIter = std::slice::Iter<'a, Participant>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
