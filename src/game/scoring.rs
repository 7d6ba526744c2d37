//! Answer Scoring Policy
//!
//! Turns a submitted answer into a non-negative score delta. Scorers are
//! pure: the same context always yields the same delta.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Serialize, Deserialize};

/// Points for a correct answer under the default policy.
pub const DEFAULT_CORRECT_POINTS: u32 = 10;

/// Everything a scorer may look at.
#[derive(Clone, Copy, Debug)]
pub struct ScoringContext<'a> {
    /// Correct answer of the open round
    pub correct: &'a str,
    /// Answer submitted by the player
    pub submitted: &'a str,
    /// Time since the round opened, if known
    pub elapsed: Option<Duration>,
    /// Countdown configured for the game
    pub countdown: Duration,
}

/// Pluggable scoring policy.
pub trait AnswerScorer: Send + Sync {
    /// Score delta for one submission.
    fn score(&self, ctx: &ScoringContext<'_>) -> u32;
}

/// Case-sensitive, byte-exact match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExactMatch {
    /// Points for a correct answer
    pub points: u32,
}

impl Default for ExactMatch {
    fn default() -> Self {
        Self { points: DEFAULT_CORRECT_POINTS }
    }
}

impl AnswerScorer for ExactMatch {
    fn score(&self, ctx: &ScoringContext<'_>) -> u32 {
        if ctx.submitted == ctx.correct {
            self.points
        } else {
            0
        }
    }
}

/// Whitespace- and case-insensitive match.
///
/// Surrounding whitespace is trimmed and inner whitespace runs collapse to a
/// single space before a case-insensitive comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NormalizedMatch {
    /// Points for a correct answer
    pub points: u32,
}

impl Default for NormalizedMatch {
    fn default() -> Self {
        Self { points: DEFAULT_CORRECT_POINTS }
    }
}

/// Normalize an answer for comparison.
pub fn normalize_answer(answer: &str) -> String {
    answer
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl AnswerScorer for NormalizedMatch {
    fn score(&self, ctx: &ScoringContext<'_>) -> u32 {
        if normalize_answer(ctx.submitted) == normalize_answer(ctx.correct) {
            self.points
        } else {
            0
        }
    }
}

/// Correct answers earn more the faster they arrive.
///
/// Points fall linearly from `max_points` at zero elapsed time to
/// `min_points` when the countdown runs out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWeighted {
    /// Points for an instant correct answer
    pub max_points: u32,
    /// Floor for a late correct answer
    pub min_points: u32,
    /// Compare normalized answers instead of exact ones
    pub normalized: bool,
}

impl Default for TimeWeighted {
    fn default() -> Self {
        Self {
            max_points: 100,
            min_points: DEFAULT_CORRECT_POINTS,
            normalized: false,
        }
    }
}

impl AnswerScorer for TimeWeighted {
    fn score(&self, ctx: &ScoringContext<'_>) -> u32 {
        let correct = if self.normalized {
            normalize_answer(ctx.submitted) == normalize_answer(ctx.correct)
        } else {
            ctx.submitted == ctx.correct
        };
        if !correct {
            return 0;
        }

        let Some(elapsed) = ctx.elapsed else {
            return self.max_points;
        };
        let countdown_ms = ctx.countdown.as_millis();
        if countdown_ms == 0 || elapsed >= ctx.countdown {
            return self.min_points;
        }

        let remaining_ms = countdown_ms - elapsed.as_millis();
        let span = u128::from(self.max_points.saturating_sub(self.min_points));
        let bonus = span * remaining_ms / countdown_ms;
        self.min_points.saturating_add(bonus as u32)
    }
}

// =============================================================================
// SCORING MODE (configuration)
// =============================================================================

/// Scoring policy selectable from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// [`ExactMatch`]
    #[default]
    Exact,
    /// [`NormalizedMatch`]
    Normalized,
    /// [`TimeWeighted`] over exact matching
    TimeWeighted,
    /// [`TimeWeighted`] over normalized matching
    TimeWeightedNormalized,
}

impl ScoringMode {
    /// Build the scorer for this mode.
    pub fn scorer(self, points: u32) -> Box<dyn AnswerScorer> {
        match self {
            ScoringMode::Exact => Box::new(ExactMatch { points }),
            ScoringMode::Normalized => Box::new(NormalizedMatch { points }),
            ScoringMode::TimeWeighted | ScoringMode::TimeWeightedNormalized => {
                Box::new(TimeWeighted {
                    max_points: points.saturating_mul(10),
                    min_points: points,
                    normalized: self == ScoringMode::TimeWeightedNormalized,
                })
            }
        }
    }
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScoringMode::Exact => "exact",
            ScoringMode::Normalized => "normalized",
            ScoringMode::TimeWeighted => "time_weighted",
            ScoringMode::TimeWeightedNormalized => "time_weighted_normalized",
        };
        f.write_str(name)
    }
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(ScoringMode::Exact),
            "normalized" => Ok(ScoringMode::Normalized),
            "time_weighted" | "timed" => Ok(ScoringMode::TimeWeighted),
            "time_weighted_normalized" => Ok(ScoringMode::TimeWeightedNormalized),
            other => Err(format!("unknown scoring mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(correct: &'a str, submitted: &'a str, elapsed_ms: Option<u64>) -> ScoringContext<'a> {
        ScoringContext {
            correct,
            submitted,
            elapsed: elapsed_ms.map(Duration::from_millis),
            countdown: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_exact_match_is_case_sensitive() {
        let scorer = ExactMatch::default();
        assert_eq!(scorer.score(&ctx("Paris", "Paris", None)), 10);
        assert_eq!(scorer.score(&ctx("Paris", "paris", None)), 0);
        assert_eq!(scorer.score(&ctx("Paris", " Paris", None)), 0);
        assert_eq!(scorer.score(&ctx("Paris", "Lyon", None)), 0);
    }

    #[test]
    fn test_normalized_match() {
        let scorer = NormalizedMatch { points: 5 };
        assert_eq!(scorer.score(&ctx("Paris", "  paris ", None)), 5);
        assert_eq!(scorer.score(&ctx("New York", "new   YORK", None)), 5);
        assert_eq!(scorer.score(&ctx("New York", "NewYork", None)), 0);
    }

    #[test]
    fn test_normalize_answer() {
        assert_eq!(normalize_answer("  São\tPaulo  "), "são paulo");
        assert_eq!(normalize_answer(""), "");
    }

    #[test]
    fn test_time_weighted_decays_linearly() {
        let scorer = TimeWeighted { max_points: 100, min_points: 10, normalized: false };

        assert_eq!(scorer.score(&ctx("Paris", "Paris", Some(0))), 100);
        assert_eq!(scorer.score(&ctx("Paris", "Paris", Some(5_000))), 55);
        assert_eq!(scorer.score(&ctx("Paris", "Paris", Some(10_000))), 10);
        assert_eq!(scorer.score(&ctx("Paris", "Paris", Some(60_000))), 10);
        assert_eq!(scorer.score(&ctx("Paris", "Paris", None)), 100);
        assert_eq!(scorer.score(&ctx("Paris", "Lyon", Some(0))), 0);
    }

    #[test]
    fn test_scorers_are_deterministic() {
        let scorer = TimeWeighted::default();
        let c = ctx("Paris", "Paris", Some(1_234));
        assert_eq!(scorer.score(&c), scorer.score(&c));
    }

    #[test]
    fn test_scoring_mode_parse_and_build() {
        assert_eq!("exact".parse::<ScoringMode>().unwrap(), ScoringMode::Exact);
        assert_eq!("Normalized".parse::<ScoringMode>().unwrap(), ScoringMode::Normalized);
        assert_eq!("time_weighted".parse::<ScoringMode>().unwrap(), ScoringMode::TimeWeighted);
        assert!("fuzzy".parse::<ScoringMode>().is_err());

        let scorer = ScoringMode::Normalized.scorer(7);
        assert_eq!(scorer.score(&ctx("Paris", "PARIS", None)), 7);
    }

    #[test]
    fn test_time_weighted_normalized_mode() {
        let mode: ScoringMode = "time_weighted_normalized".parse().unwrap();
        assert_eq!(mode, ScoringMode::TimeWeightedNormalized);
        assert_eq!(mode.to_string(), "time_weighted_normalized");

        let scorer = mode.scorer(10);
        assert_eq!(scorer.score(&ctx("New York", " new york", Some(0))), 100);
        assert_eq!(scorer.score(&ctx("New York", "new york", Some(10_000))), 10);
        assert_eq!(scorer.score(&ctx("New York", "Boston", Some(0))), 0);

        let exact = ScoringMode::TimeWeighted.scorer(10);
        assert_eq!(exact.score(&ctx("New York", "new york", Some(0))), 0);
    }
}
