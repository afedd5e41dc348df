//! Phase snapshots returned by the services.
//!
//! A snapshot holds everything needed to render the phase for every player of
//! a room; [`view_for`](LobbySnapshot::view_for) projects it for one viewer.
//! Snapshots never read the clock, so rendering the same snapshot twice gives
//! the same bytes.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    dao::models::{PlayerEntity, PlayerRole, RoundType},
    dto::views::{
        LobbyPlayer, LobbyView, QuestionView, RevealView, ScoreLine, ScoreboardView, View,
        VotingPlayer, VotingView,
    },
    services::avatar,
};

/// Players needed before a game may start.
pub const MIN_PLAYERS: usize = 2;

/// Lobby of a CREATED room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbySnapshot {
    /// Room primary key.
    pub room_id: Uuid,
    /// Join code.
    pub room_code: String,
    /// Host player.
    pub host_player_id: Uuid,
    /// Members in join order.
    pub players: Vec<PlayerEntity>,
}

impl LobbySnapshot {
    /// Members to notify.
    pub fn player_ids(&self) -> Vec<Uuid> {
        self.players.iter().map(|p| p.id).collect()
    }

    /// Enough players and all of them ready.
    pub fn can_start(&self) -> bool {
        self.players.len() >= MIN_PLAYERS && self.players.iter().all(|p| p.is_ready)
    }

    /// Lobby as seen by `viewer`.
    pub fn view_for(&self, viewer: Uuid) -> View {
        let is_host = viewer == self.host_player_id;
        View::Lobby(LobbyView {
            room_code: self.room_code.clone(),
            players: self
                .players
                .iter()
                .map(|p| LobbyPlayer {
                    nickname: p.nickname.clone(),
                    avatar: avatar::as_text(&p.avatar),
                    is_ready: p.is_ready,
                    is_host: p.id == self.host_player_id,
                })
                .collect(),
            is_host,
            is_ready: self
                .players
                .iter()
                .any(|p| p.id == viewer && p.is_ready),
            can_start: is_host && self.can_start(),
        })
    }
}

/// What one player sees while answering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSeat {
    /// Player.
    pub player_id: Uuid,
    /// Display name.
    pub nickname: String,
    /// Role this round.
    pub role: PlayerRole,
    /// Question text in the player's locale.
    pub question: String,
    /// Current answer.
    pub answer: Option<String>,
    /// Answer locked.
    pub is_answer_ready: bool,
}

/// QUESTION phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSnapshot {
    /// Join code.
    pub room_code: String,
    /// Game.
    pub game_state_id: Uuid,
    /// Round being answered.
    pub round_id: Uuid,
    /// Round type.
    pub round_type: RoundType,
    /// Round within its type.
    pub round_number: i32,
    /// End of the answering window.
    pub deadline: OffsetDateTime,
    /// Allowed answers, empty for free text.
    pub answer_options: Vec<String>,
    /// Every member.
    pub seats: Vec<QuestionSeat>,
}

impl QuestionSnapshot {
    /// Members to notify.
    pub fn player_ids(&self) -> Vec<Uuid> {
        self.seats.iter().map(|s| s.player_id).collect()
    }

    /// Player holding the fibber role.
    pub fn fibber(&self) -> Option<Uuid> {
        self.seats
            .iter()
            .find(|s| s.role == PlayerRole::Fibber)
            .map(|s| s.player_id)
    }

    /// Question screen as seen by `viewer`; `None` if they are not seated.
    pub fn view_for(&self, viewer: Uuid) -> Option<View> {
        let seat = self.seats.iter().find(|s| s.player_id == viewer)?;
        Some(View::Question(QuestionView {
            room_code: self.room_code.clone(),
            round_type: self.round_type,
            round_number: self.round_number,
            role: seat.role,
            question: seat.question.clone(),
            answer_options: self.answer_options.clone(),
            current_answer: seat.answer.clone(),
            is_answer_ready: seat.is_answer_ready,
            deadline: self.deadline,
        }))
    }
}

/// One candidate of the voting screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingSeat {
    /// Player.
    pub player_id: Uuid,
    /// Display name.
    pub nickname: String,
    /// Avatar bytes.
    pub avatar: Vec<u8>,
    /// Answer they gave this round.
    pub answer: Option<String>,
    /// Normal question in this player's locale.
    pub question: String,
    /// Votes received.
    pub votes: u32,
    /// Player this seat voted for.
    pub voted_for: Option<Uuid>,
    /// Vote locked.
    pub is_vote_ready: bool,
}

/// VOTING phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingSnapshot {
    /// Join code.
    pub room_code: String,
    /// Game.
    pub game_state_id: Uuid,
    /// Round voted on.
    pub round_id: Uuid,
    /// Round type.
    pub round_type: RoundType,
    /// Round within its type.
    pub round_number: i32,
    /// End of the voting window.
    pub deadline: OffsetDateTime,
    /// Every member in join order.
    pub seats: Vec<VotingSeat>,
}

impl VotingSnapshot {
    /// Members to notify.
    pub fn player_ids(&self) -> Vec<Uuid> {
        self.seats.iter().map(|s| s.player_id).collect()
    }

    /// Voting screen as seen by `viewer`; `None` if they are not seated.
    pub fn view_for(&self, viewer: Uuid) -> Option<View> {
        let own = self.seats.iter().find(|s| s.player_id == viewer)?;
        let voted_for = own.voted_for.and_then(|target| {
            self.seats
                .iter()
                .find(|s| s.player_id == target)
                .map(|s| s.nickname.clone())
        });
        Some(View::Voting(VotingView {
            room_code: self.room_code.clone(),
            round_type: self.round_type,
            round_number: self.round_number,
            question: own.question.clone(),
            players: self
                .seats
                .iter()
                .map(|s| VotingPlayer {
                    nickname: s.nickname.clone(),
                    avatar: avatar::as_text(&s.avatar),
                    answer: s.answer.clone(),
                    votes: s.votes,
                    is_self: s.player_id == viewer,
                })
                .collect(),
            voted_for,
            is_vote_ready: own.is_vote_ready,
            deadline: self.deadline,
        }))
    }
}

/// The player the room voted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotedFor {
    /// Player.
    pub player_id: Uuid,
    /// Display name.
    pub nickname: String,
    /// Avatar bytes.
    pub avatar: Vec<u8>,
    /// Their role this round.
    pub role: PlayerRole,
}

/// REVEAL phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealSnapshot {
    /// Join code.
    pub room_code: String,
    /// Game.
    pub game_state_id: Uuid,
    /// Round type.
    pub round_type: RoundType,
    /// Round within its type.
    pub round_number: i32,
    /// End of the reveal screen.
    pub deadline: OffsetDateTime,
    /// Members to notify.
    pub player_ids: Vec<Uuid>,
    /// Unique most voted player, if any.
    pub voted_for: Option<VotedFor>,
}

impl RevealSnapshot {
    /// A unique most voted player exists.
    pub fn should_reveal(&self) -> bool {
        self.voted_for.is_some()
    }

    /// The revealed player is the fibber.
    pub fn fibber_found(&self) -> bool {
        self.voted_for
            .as_ref()
            .is_some_and(|v| v.role == PlayerRole::Fibber)
    }

    /// Reveal screen; identical for every viewer.
    pub fn view(&self) -> View {
        View::RevealRole(RevealView {
            room_code: self.room_code.clone(),
            round_type: self.round_type,
            round_number: self.round_number,
            voted_for_player_nickname: self.voted_for.as_ref().map(|v| v.nickname.clone()),
            voted_for_player_avatar: self
                .voted_for
                .as_ref()
                .map(|v| avatar::as_text(&v.avatar)),
            voted_for_player_role: self.voted_for.as_ref().map(|v| v.role),
            should_reveal: self.should_reveal(),
            deadline: self.deadline,
        })
    }
}

/// One scoreboard line before ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    /// Player.
    pub player_id: Uuid,
    /// Display name.
    pub nickname: String,
    /// Avatar bytes.
    pub avatar: Vec<u8>,
    /// Points earned during the current round type.
    pub points_this_round: i32,
    /// Game total.
    pub total: i32,
}

/// SCORING or WINNER phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreboardSnapshot {
    /// Join code.
    pub room_code: String,
    /// Game.
    pub game_state_id: Uuid,
    /// Round type just played.
    pub round_type: RoundType,
    /// End of the screen.
    pub deadline: OffsetDateTime,
    /// Lines sorted by total, best first.
    pub entries: Vec<ScoreEntry>,
}

impl ScoreboardSnapshot {
    /// Members to notify.
    pub fn player_ids(&self) -> Vec<Uuid> {
        self.entries.iter().map(|e| e.player_id).collect()
    }

    fn board(&self) -> ScoreboardView {
        let totals: Vec<i32> = self.entries.iter().map(|e| e.total).collect();
        let ranks = crate::services::scoring::competition_ranks(&totals);
        ScoreboardView {
            room_code: self.room_code.clone(),
            round_type: self.round_type,
            players: self
                .entries
                .iter()
                .zip(ranks)
                .map(|(e, rank)| ScoreLine {
                    nickname: e.nickname.clone(),
                    avatar: avatar::as_text(&e.avatar),
                    points_this_round: e.points_this_round,
                    total: e.total,
                    rank,
                })
                .collect(),
            deadline: self.deadline,
        }
    }

    /// Intermediate scoreboard.
    pub fn scoring_view(&self) -> View {
        View::Scoring(self.board())
    }

    /// Final scoreboard.
    pub fn winner_view(&self) -> View {
        View::Winner(self.board())
    }
}

/// Snapshot of whichever phase a game is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseSnapshot {
    /// QUESTION.
    Question(QuestionSnapshot),
    /// VOTING.
    Voting(VotingSnapshot),
    /// REVEAL_ROLE.
    Reveal(RevealSnapshot),
    /// SCORING.
    Scoring(ScoreboardSnapshot),
    /// WINNER.
    Winner(ScoreboardSnapshot),
}

impl PhaseSnapshot {
    /// Members to notify.
    pub fn player_ids(&self) -> Vec<Uuid> {
        match self {
            PhaseSnapshot::Question(s) => s.player_ids(),
            PhaseSnapshot::Voting(s) => s.player_ids(),
            PhaseSnapshot::Reveal(s) => s.player_ids.clone(),
            PhaseSnapshot::Scoring(s) | PhaseSnapshot::Winner(s) => s.player_ids(),
        }
    }

    /// End of the phase.
    pub fn deadline(&self) -> OffsetDateTime {
        match self {
            PhaseSnapshot::Question(s) => s.deadline,
            PhaseSnapshot::Voting(s) => s.deadline,
            PhaseSnapshot::Reveal(s) => s.deadline,
            PhaseSnapshot::Scoring(s) | PhaseSnapshot::Winner(s) => s.deadline,
        }
    }

    /// Phase screen as seen by `viewer`.
    pub fn view_for(&self, viewer: Uuid) -> Option<View> {
        match self {
            PhaseSnapshot::Question(s) => s.view_for(viewer),
            PhaseSnapshot::Voting(s) => s.view_for(viewer),
            PhaseSnapshot::Reveal(s) => Some(s.view()),
            PhaseSnapshot::Scoring(s) => Some(s.scoring_view()),
            PhaseSnapshot::Winner(s) => Some(s.winner_view()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(nickname: &str, is_ready: bool) -> PlayerEntity {
        PlayerEntity {
            id: Uuid::now_v7(),
            nickname: nickname.into(),
            avatar: b"<svg/>".to_vec(),
            locale: None,
            is_ready,
            disconnected_at: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn only_the_host_sees_can_start() {
        let host = player("host", true);
        let guest = player("guest", true);
        let lobby = LobbySnapshot {
            room_id: Uuid::now_v7(),
            room_code: "ABCDE".into(),
            host_player_id: host.id,
            players: vec![host.clone(), guest.clone()],
        };

        let View::Lobby(host_view) = lobby.view_for(host.id) else {
            panic!("expected lobby view");
        };
        let View::Lobby(guest_view) = lobby.view_for(guest.id) else {
            panic!("expected lobby view");
        };
        assert!(host_view.is_host && host_view.can_start);
        assert!(!guest_view.is_host && !guest_view.can_start);
        assert!(guest_view.is_ready);
    }

    #[test]
    fn single_player_lobby_cannot_start() {
        let host = player("host", true);
        let lobby = LobbySnapshot {
            room_id: Uuid::now_v7(),
            room_code: "ABCDE".into(),
            host_player_id: host.id,
            players: vec![host],
        };
        assert!(!lobby.can_start());
    }

    #[test]
    fn reveal_without_leader_hides_everything() {
        let reveal = RevealSnapshot {
            room_code: "ABCDE".into(),
            game_state_id: Uuid::now_v7(),
            round_type: RoundType::FreeForm,
            round_number: 1,
            deadline: OffsetDateTime::UNIX_EPOCH,
            player_ids: vec![],
            voted_for: None,
        };
        assert!(!reveal.should_reveal());
        assert!(!reveal.fibber_found());
    }
}
