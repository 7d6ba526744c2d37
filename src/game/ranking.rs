//! Ranking Calculator
//!
//! Standard competition ranking ("1224"): equal scores share a rank and the
//! next lower score is ranked one past the number of entries ahead of it.

use serde::{Serialize, Deserialize};

use crate::game::roster::{AccountId, Participant};

/// One row of a scoreboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// Account of the participant
    pub account_id: AccountId,
    /// Display name at join time
    pub display_name: String,
    /// Current score
    pub score: i64,
    /// 1-based rank, shared on ties
    pub rank: u32,
}

/// Rank participants by score, highest first.
///
/// The sort is stable, so participants with equal scores stay in roster order.
pub fn compute_ranking<'a, I>(participants: I) -> Vec<RankingEntry>
where
    I: IntoIterator<Item = &'a Participant>,
{
    let mut sorted: Vec<&Participant> = participants.into_iter().collect();
    sorted.sort_by(|a, b| b.score.cmp(&a.score));

    let mut entries: Vec<RankingEntry> = Vec::with_capacity(sorted.len());
    for (position, participant) in sorted.into_iter().enumerate() {
        let rank = match entries.last() {
            Some(prev) if prev.score == participant.score => prev.rank,
            _ => position as u32 + 1,
        };
        entries.push(RankingEntry {
            account_id: participant.account_id,
            display_name: participant.display_name.clone(),
            score: participant.score,
            rank,
        });
    }
    entries
}

/// Entries holding first place.
pub fn winners(ranking: &[RankingEntry]) -> Vec<RankingEntry> {
    ranking.iter().filter(|e| e.rank == 1).cloned().collect()
}
