//! Which phase follows which.

use crate::dao::models::{GamePhase, RoundType};

/// Phase a machine task drives a game into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Open a question; `next_round` forces the next round type.
    Question {
        /// Move on to the next round type.
        next_round: bool,
    },
    /// Open the vote.
    Voting,
    /// Reveal the most voted player.
    Reveal,
    /// Intermediate scoreboard.
    Scoring,
    /// Final scoreboard, then the game ends.
    Winner,
}

impl Step {
    /// Persisted phase this step leads to.
    pub fn phase(&self) -> GamePhase {
        match self {
            Step::Question { .. } => GamePhase::Question,
            Step::Voting => GamePhase::Voting,
            Step::Reveal => GamePhase::Reveal,
            Step::Scoring => GamePhase::Scoring,
            Step::Winner => GamePhase::Winner,
        }
    }

    /// Step re-entering a stored phase after a restart. Transitions are
    /// idempotent, so this only rebroadcasts and rearms the timer.
    pub fn resume(phase: GamePhase) -> Self {
        match phase {
            GamePhase::Question => Step::Question { next_round: false },
            GamePhase::Voting => Step::Voting,
            GamePhase::Reveal => Step::Reveal,
            GamePhase::Scoring => Step::Scoring,
            GamePhase::Winner => Step::Winner,
        }
    }

    /// Step following a completed question or vote; `None` for the phases
    /// whose successor depends on their outcome.
    pub fn after(&self) -> Option<Step> {
        match self {
            Step::Question { .. } => Some(Step::Voting),
            Step::Voting => Some(Step::Reveal),
            Step::Scoring => Some(Step::Question { next_round: true }),
            Step::Reveal | Step::Winner => None,
        }
    }
}

/// Where a game goes once the reveal screen is over.
///
/// Finding the fibber or finishing the last round of a type ends that type:
/// the last type ends the game, the others show the scoreboard. Otherwise the
/// next round of the same type starts.
pub fn after_reveal(
    round_type: RoundType,
    round_number: i32,
    max_rounds: i32,
    fibber_found: bool,
) -> Step {
    let type_finished = round_number >= max_rounds || fibber_found;
    match (type_finished, round_type) {
        (true, RoundType::MostLikely) => Step::Winner,
        (true, _) => Step::Scoring,
        (false, _) => Step::Question { next_round: false },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfound_fibber_plays_the_next_round() {
        assert_eq!(
            after_reveal(RoundType::FreeForm, 1, 3, false),
            Step::Question { next_round: false }
        );
    }

    #[test]
    fn final_round_shows_the_scoreboard() {
        assert_eq!(after_reveal(RoundType::FreeForm, 3, 3, false), Step::Scoring);
        assert_eq!(
            after_reveal(RoundType::MultipleChoice, 3, 3, false),
            Step::Scoring
        );
    }

    #[test]
    fn found_fibber_ends_the_round_type_early() {
        assert_eq!(after_reveal(RoundType::FreeForm, 1, 3, true), Step::Scoring);
        assert_eq!(after_reveal(RoundType::MostLikely, 1, 3, true), Step::Winner);
    }

    #[test]
    fn last_round_type_goes_straight_to_the_winner() {
        assert_eq!(after_reveal(RoundType::MostLikely, 3, 3, false), Step::Winner);
        assert_eq!(
            after_reveal(RoundType::MostLikely, 2, 3, false),
            Step::Question { next_round: false }
        );
    }

    #[test]
    fn scoring_moves_to_the_next_round_type() {
        assert_eq!(
            Step::Scoring.after(),
            Some(Step::Question { next_round: true })
        );
        assert_eq!(Step::resume(GamePhase::Voting), Step::Voting);
        assert_eq!(Step::resume(GamePhase::Question).phase(), GamePhase::Question);
    }
}
