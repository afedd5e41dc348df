mod common;

use std::time::Duration;

use common::{Client, Harness, ready_lobby};
use fibbing_it_back::{
    dao::models::{PlayerRole, RoundType},
    error::ServiceError,
    services::{
        lobby_service, reconnect,
        round_service::{self, QuestionOutcome},
        snapshots::QuestionSnapshot,
    },
};
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

struct Game {
    harness: Harness,
    players: Vec<Client>,
    question: QuestionSnapshot,
}

impl Game {
    fn id(&self) -> Uuid {
        self.question.game_state_id
    }

    fn fibber(&self) -> Uuid {
        self.question.fibber().unwrap()
    }

    fn normals(&self) -> Vec<Uuid> {
        self.players
            .iter()
            .map(|p| p.id)
            .filter(|id| *id != self.fibber())
            .collect()
    }

    fn nickname(&self, player_id: Uuid) -> String {
        self.question
            .seats
            .iter()
            .find(|s| s.player_id == player_id)
            .unwrap()
            .nickname
            .clone()
    }
}

/// Game started through the service, without a phase task.
async fn started(guests: usize) -> Game {
    let harness = Harness::new().await;
    let (code, host, others) = ready_lobby(&harness, guests).await;
    let deadline = OffsetDateTime::now_utc() + Duration::from_secs(60);
    let question = lobby_service::start_game(&harness.state, host.id, code, deadline)
        .await
        .unwrap();
    let mut players = vec![host];
    players.extend(others);
    Game {
        harness,
        players,
        question,
    }
}

fn soon() -> OffsetDateTime {
    OffsetDateTime::now_utc() + Duration::from_secs(60)
}

#[tokio::test]
async fn first_round_deals_one_fibber() {
    let game = started(2).await;
    let question = &game.question;

    assert_eq!(question.round_type, RoundType::FreeForm);
    assert_eq!(question.round_number, 1);
    assert!(question.answer_options.is_empty());
    let fibbers = question
        .seats
        .iter()
        .filter(|s| s.role == PlayerRole::Fibber)
        .count();
    assert_eq!(fibbers, 1);

    let normal_questions: Vec<&str> = question
        .seats
        .iter()
        .filter(|s| s.role == PlayerRole::Normal)
        .map(|s| s.question.as_str())
        .collect();
    assert!(normal_questions.windows(2).all(|w| w[0] == w[1]));
    let fibber_seat = question.seats.iter().find(|s| s.role == PlayerRole::Fibber).unwrap();
    assert_ne!(fibber_seat.question, normal_questions[0]);
}

#[tokio::test]
async fn answers_are_replaced_not_duplicated() {
    let game = started(1).await;
    let player = game.players[1].id;

    round_service::submit_answer(&game.harness.state, player, "pizza".into(), OffsetDateTime::now_utc())
        .await
        .unwrap();
    let question = round_service::submit_answer(
        &game.harness.state,
        player,
        "  tacos ".into(),
        OffsetDateTime::now_utc(),
    )
    .await
    .unwrap();

    let seat = question.seats.iter().find(|s| s.player_id == player).unwrap();
    assert_eq!(seat.answer.as_deref(), Some("tacos"));
    assert_eq!(game.harness.store.row_counts().await.answers, 1);
}

#[tokio::test]
async fn answers_after_the_deadline_are_rejected() {
    let game = started(1).await;
    let player = game.players[0].id;
    let deadline = game.question.deadline;

    round_service::submit_answer(&game.harness.state, player, "on time".into(), deadline)
        .await
        .unwrap();
    let err = round_service::submit_answer(
        &game.harness.state,
        player,
        "late".into(),
        deadline + Duration::from_secs(1),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn blank_answers_are_invalid() {
    let game = started(1).await;
    let err = round_service::submit_answer(
        &game.harness.state,
        game.players[0].id,
        "   ".into(),
        OffsetDateTime::now_utc(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
}

#[tokio::test]
async fn locked_answers_cannot_change_until_unlocked() {
    let game = started(1).await;
    let state = &game.harness.state;
    let player = game.players[0].id;
    let now = OffsetDateTime::now_utc;

    let err = round_service::toggle_answer_is_ready(state, player, now())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("submit an answer first"));

    round_service::submit_answer(state, player, "first".into(), now())
        .await
        .unwrap();
    let toggled = round_service::toggle_answer_is_ready(state, player, now())
        .await
        .unwrap();
    assert!(!toggled.all_ready);

    let err = round_service::submit_answer(state, player, "second".into(), now())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");

    round_service::toggle_answer_is_ready(state, player, now())
        .await
        .unwrap();
    round_service::submit_answer(state, player, "second".into(), now())
        .await
        .unwrap();
}

#[tokio::test]
async fn last_ready_answer_reports_everyone_ready() {
    let game = started(2).await;
    let state = &game.harness.state;
    let mut last = None;
    for player in &game.players {
        round_service::submit_answer(state, player.id, "ok".into(), OffsetDateTime::now_utc())
            .await
            .unwrap();
        last = Some(
            round_service::toggle_answer_is_ready(state, player.id, OffsetDateTime::now_utc())
                .await
                .unwrap(),
        );
    }
    assert!(last.unwrap().all_ready);
}

#[tokio::test]
async fn votes_are_checked_and_counted_once() {
    let game = started(2).await;
    let state = &game.harness.state;
    let (voter, target) = (game.players[1].id, game.players[2].id);

    let err = round_service::submit_vote(state, voter, game.nickname(target), OffsetDateTime::now_utc())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");

    let voting = round_service::update_state_to_voting(state, game.id(), soon())
        .await
        .unwrap();
    let again = round_service::update_state_to_voting(state, game.id(), soon() + Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(voting.deadline, again.deadline);

    let err = round_service::submit_vote(state, voter, game.nickname(voter), OffsetDateTime::now_utc())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");

    let err = round_service::submit_vote(state, voter, "nobody".into(), OffsetDateTime::now_utc())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    let tally = round_service::submit_vote(state, voter, game.nickname(target), OffsetDateTime::now_utc())
        .await
        .unwrap();
    let target_seat = tally.seats.iter().find(|s| s.player_id == target).unwrap();
    assert_eq!(target_seat.votes, 1);

    let err = round_service::submit_vote(state, voter, game.nickname(target), OffsetDateTime::now_utc())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");
    assert_eq!(game.harness.store.row_counts().await.votes, 1);

    let err = round_service::submit_vote(
        state,
        target,
        game.nickname(voter),
        voting.deadline + Duration::from_secs(1),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");
}

#[tokio::test]
async fn caught_fibber_scores_nothing_and_finders_score() {
    let game = started(2).await;
    let state = &game.harness.state;
    let fibber = game.fibber();
    let normals = game.normals();

    round_service::update_state_to_voting(state, game.id(), soon())
        .await
        .unwrap();
    for voter in &normals {
        round_service::submit_vote(state, *voter, game.nickname(fibber), OffsetDateTime::now_utc())
            .await
            .unwrap();
    }
    round_service::submit_vote(state, fibber, game.nickname(normals[0]), OffsetDateTime::now_utc())
        .await
        .unwrap();

    let reveal = round_service::update_state_to_reveal(state, game.id(), soon())
        .await
        .unwrap();
    assert!(reveal.should_reveal());
    assert!(reveal.fibber_found());

    let board = round_service::update_state_to_score(state, game.id(), soon())
        .await
        .unwrap();
    let points = |player: Uuid| board.entries.iter().find(|e| e.player_id == player).unwrap().total;
    let guess = state.config().rules.scoring.guess_fibber_points;
    assert_eq!(points(fibber), 0);
    for normal in &normals {
        assert_eq!(points(*normal), guess);
    }
    let sum: i32 = board.entries.iter().map(|e| e.total).sum();
    assert_eq!(sum, guess * normals.len() as i32);
    assert_eq!(board.entries[0].total, guess);
}

#[tokio::test]
async fn unfound_fibber_evades() {
    let game = started(2).await;
    let state = &game.harness.state;

    round_service::update_state_to_voting(state, game.id(), soon())
        .await
        .unwrap();
    let reveal = round_service::update_state_to_reveal(state, game.id(), soon())
        .await
        .unwrap();
    assert!(!reveal.should_reveal());
    assert!(!reveal.fibber_found());

    let board = round_service::update_state_to_score(state, game.id(), soon())
        .await
        .unwrap();
    let evade = state.config().rules.scoring.fibber_evade_points;
    assert_eq!(board.entries[0].player_id, game.fibber());
    assert_eq!(board.entries[0].total, evade);
    assert_eq!(board.entries.iter().map(|e| e.total).sum::<i32>(), evade);
    assert_eq!(game.harness.store.row_counts().await.scores, game.players.len());
}

#[tokio::test]
async fn next_round_type_uses_multiple_choice_options() {
    let game = started(1).await;
    let state = &game.harness.state;
    round_service::update_state_to_voting(state, game.id(), soon())
        .await
        .unwrap();
    round_service::update_state_to_reveal(state, game.id(), soon())
        .await
        .unwrap();
    round_service::update_state_to_score(state, game.id(), soon())
        .await
        .unwrap();

    let QuestionOutcome::Question(question) =
        round_service::update_state_to_question(state, game.id(), soon(), true)
            .await
            .unwrap()
    else {
        panic!("game ended early");
    };
    assert_eq!(question.round_type, RoundType::MultipleChoice);
    assert_eq!(question.round_number, 1);
    assert_eq!(question.answer_options, round_service::MULTIPLE_CHOICE_OPTIONS);

    let player = game.players[0].id;
    let err = round_service::submit_answer(state, player, "Maybe".into(), OffsetDateTime::now_utc())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
    round_service::submit_answer(state, player, "Agree".into(), OffsetDateTime::now_utc())
        .await
        .unwrap();
}

#[tokio::test]
async fn phases_cannot_be_skipped() {
    let game = started(1).await;
    let err = round_service::update_state_to_reveal(&game.harness.state, game.id(), soon())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");
    let err = round_service::update_state_to_winner(&game.harness.state, game.id(), soon())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");
}

#[tokio::test]
async fn reconnection_restores_the_current_phase() {
    let game = started(1).await;
    let state = &game.harness.state;
    let player = game.players[1].id;

    let first = reconnect::payload(state, player).await.unwrap();
    let second = reconnect::payload(state, player).await.unwrap();
    assert_eq!(first, second);
    let view: Value = serde_json::from_slice(&first).unwrap();
    assert_eq!(view["message_type"], "question");
    assert_eq!(view["round_type"], "free_form");

    let voting = round_service::update_state_to_voting(state, game.id(), soon())
        .await
        .unwrap();
    let stored = round_service::get_phase_snapshot(state, game.id()).await.unwrap();
    assert_eq!(stored.deadline(), voting.deadline);

    let view: Value = serde_json::from_slice(&reconnect::payload(state, player).await.unwrap()).unwrap();
    assert_eq!(view["message_type"], "voting");
    let deadline = voting.deadline.format(&Rfc3339).unwrap();
    assert_eq!(view["deadline"], deadline.as_str());
}

#[tokio::test]
async fn abandoned_games_report_an_inactive_room() {
    let game = started(1).await;
    let state = &game.harness.state;
    let room = fibbing_it_back::services::player_service::get_room_state(state, game.players[0].id)
        .await
        .unwrap();

    assert_eq!(round_service::abandon_room(state, room.id).await.unwrap(), Some(game.id()));
    let view: Value =
        serde_json::from_slice(&reconnect::payload(state, game.players[0].id).await.unwrap()).unwrap();
    assert_eq!(view["message_type"], "error");
    assert_eq!(view["code"], "ROOM_NOT_ACTIVE");
}
