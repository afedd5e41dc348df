//! Pure scoring and vote tallying rules.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{config::ScoringConfig, dao::models::VoteEntity};

/// Number of votes received per target.
pub fn vote_counts(votes: &[VoteEntity]) -> HashMap<Uuid, u32> {
    let mut counts = HashMap::new();
    for vote in votes {
        *counts.entry(vote.target_player_id).or_insert(0) += 1;
    }
    counts
}

/// The single player with the most votes; `None` on ties or when nobody voted.
pub fn top_voted(votes: &[VoteEntity]) -> Option<Uuid> {
    let counts = vote_counts(votes);
    let best = counts.values().copied().max().filter(|best| *best > 0)?;
    let mut leaders = counts.iter().filter(|(_, count)| **count == best);
    let (leader, _) = leaders.next()?;
    leaders.next().is_none().then_some(*leader)
}

/// Points earned by each player in one round.
///
/// Every normal player who voted for the fibber earns `guess_fibber_points`.
/// The fibber earns `fibber_evade_points` unless a strict majority of the
/// normal voters found them. Every player in `players` gets an entry.
pub fn score_round(
    players: &[Uuid],
    fibber: Uuid,
    votes: &[VoteEntity],
    scoring: &ScoringConfig,
) -> Vec<(Uuid, i32)> {
    let normal_votes: Vec<&VoteEntity> = votes.iter().filter(|v| v.voter_id != fibber).collect();
    let caught_by = normal_votes
        .iter()
        .filter(|v| v.target_player_id == fibber)
        .count();
    let fibber_evaded = 2 * caught_by <= normal_votes.len();

    players
        .iter()
        .map(|player| {
            let points = if *player == fibber {
                if fibber_evaded {
                    scoring.fibber_evade_points
                } else {
                    0
                }
            } else if normal_votes
                .iter()
                .any(|v| v.voter_id == *player && v.target_player_id == fibber)
            {
                scoring.guess_fibber_points
            } else {
                0
            };
            (*player, points)
        })
        .collect()
}

/// Competition ranks ("1224") for totals already sorted best first.
pub fn competition_ranks(sorted_totals: &[i32]) -> Vec<u32> {
    let mut ranks = Vec::with_capacity(sorted_totals.len());
    for (index, total) in sorted_totals.iter().enumerate() {
        let rank = match index {
            0 => 1,
            _ if sorted_totals[index - 1] == *total => ranks[index - 1],
            _ => index as u32 + 1,
        };
        ranks.push(rank);
    }
    ranks
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;

    fn vote(voter: Uuid, target: Uuid) -> VoteEntity {
        VoteEntity {
            id: Uuid::now_v7(),
            round_id: Uuid::nil(),
            voter_id: voter,
            target_player_id: target,
            is_ready: false,
            submitted_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn points(scores: &[(Uuid, i32)], player: Uuid) -> i32 {
        scores.iter().find(|(id, _)| *id == player).map(|(_, p)| *p).unwrap()
    }

    #[test]
    fn fibber_caught_by_every_normal_player() {
        let (f, n1, n2) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let votes = [vote(n1, f), vote(n2, f)];
        let scores = score_round(&[f, n1, n2], f, &votes, &ScoringConfig::default());
        assert_eq!(points(&scores, n1), 100);
        assert_eq!(points(&scores, n2), 100);
        assert_eq!(points(&scores, f), 0);
    }

    #[test]
    fn fibber_evades_a_split_vote() {
        let (f, n1, n2) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let votes = [vote(n1, f), vote(n2, n1)];
        let scores = score_round(&[f, n1, n2], f, &votes, &ScoringConfig::default());
        assert_eq!(points(&scores, n1), 100);
        assert_eq!(points(&scores, n2), 0);
        assert_eq!(points(&scores, f), 150);
    }

    #[test]
    fn fibber_vote_does_not_count_towards_capture() {
        let (f, n1, n2) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let votes = [vote(f, n1), vote(n1, n2), vote(n2, n1)];
        let scores = score_round(&[f, n1, n2], f, &votes, &ScoringConfig::default());
        assert_eq!(points(&scores, f), 150);
        assert_eq!(points(&scores, n1) + points(&scores, n2), 0);
    }

    #[test]
    fn ties_have_no_top_voted_player() {
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        assert_eq!(top_voted(&[vote(a, b), vote(b, a)]), None);
        assert_eq!(top_voted(&[vote(a, b), vote(c, b), vote(b, a)]), Some(b));
        assert_eq!(top_voted(&[]), None);
    }

    #[test]
    fn ranks_share_places_on_ties() {
        assert_eq!(competition_ranks(&[300, 150, 150, 0]), vec![1, 2, 2, 4]);
        assert!(competition_ranks(&[]).is_empty());
    }
}
