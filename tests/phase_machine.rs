mod common;

use std::{collections::BTreeSet, time::Duration};

use common::{Client, Harness, ready_lobby, shape};
use fibbing_it_back::{
    config::{AppConfig, PhaseTimings},
    dao::models::RoomState,
    services::{player_service, reconnect, round_service},
    state::recovery,
};
use serde_json::{Value, json};

const PHASE: Duration = Duration::from_millis(50);

/// Start a two player game and collect the host's views up to the winner screen.
async fn play_without_votes(harness: &Harness) -> (Client, Vec<Value>) {
    let (code, mut host, _guests) = ready_lobby(harness, 1).await;
    host.drain().await;
    host.send("start_game", json!({"room_code": code}))
        .await
        .unwrap();

    let mut views = Vec::new();
    loop {
        let view = host.next_view().await;
        let done = view["message_type"] == "winner";
        views.push(view);
        if done {
            break;
        }
    }
    (host, views)
}

fn message_types(views: &[Value]) -> Vec<&str> {
    views
        .iter()
        .map(|v| v["message_type"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn silent_game_walks_every_round_type_to_the_winner() {
    let harness = Harness::fast(PHASE).await;
    let (_host, views) = play_without_votes(&harness).await;

    assert_eq!(
        message_types(&views),
        vec![
            "question",
            "voting",
            "reveal_role",
            "scoring",
            "question",
            "voting",
            "reveal_role",
            "scoring",
            "question",
            "voting",
            "reveal_role",
            "winner",
        ]
    );
    let round_types: Vec<&str> = views
        .iter()
        .filter(|v| v["message_type"] == "question")
        .map(|v| v["round_type"].as_str().unwrap())
        .collect();
    assert_eq!(round_types, vec!["free_form", "multiple_choice", "most_likely"]);
    assert!(views
        .iter()
        .filter(|v| v["message_type"] == "reveal_role")
        .all(|v| v["should_reveal"] == false));
}

#[tokio::test]
async fn unfound_fibber_collects_every_evade_bonus() {
    let harness = Harness::fast(PHASE).await;
    let (_host, views) = play_without_votes(&harness).await;
    let evade = harness.state.config().rules.scoring.fibber_evade_points;

    let winner = views.last().unwrap();
    let totals: Vec<i64> = winner["players"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["total"].as_i64().unwrap())
        .collect();
    assert_eq!(totals.iter().sum::<i64>(), 3 * i64::from(evade));
    assert!(totals.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(harness.store.row_counts().await.scores, 2 * 3);
}

#[tokio::test]
async fn identical_games_produce_identically_shaped_views() {
    let first = Harness::fast(PHASE).await;
    let second = Harness::fast(PHASE).await;
    let (_, a) = play_without_votes(&first).await;
    let (_, b) = play_without_votes(&second).await;

    let shapes = |views: &[Value]| -> Vec<BTreeSet<String>> { views.iter().map(shape).collect() };
    assert_eq!(shapes(&a), shapes(&b));
}

#[tokio::test]
async fn finished_rooms_are_no_longer_active() {
    let harness = Harness::fast(PHASE).await;
    let (host, _views) = play_without_votes(&harness).await;
    assert!(harness.state.machines().wait(Duration::from_secs(2)).await);

    let room = player_service::get_room_state(&harness.state, host.id)
        .await
        .unwrap();
    assert_eq!(room.state, RoomState::Finished);

    let view: Value =
        serde_json::from_slice(&reconnect::payload(&harness.state, host.id).await.unwrap()).unwrap();
    assert_eq!(view["message_type"], "error");
    assert_eq!(view["code"], "ROOM_NOT_ACTIVE");
}

#[tokio::test]
async fn everyone_ready_skips_the_rest_of_the_question_timer() {
    let mut config = AppConfig::default();
    config.timings = PhaseTimings::uniform(Duration::from_secs(30));
    let harness = Harness::with_config(config).await;
    let (code, mut host, guests) = ready_lobby(&harness, 2).await;
    host.drain().await;
    host.send("start_game", json!({"room_code": code}))
        .await
        .unwrap();
    host.next_of("question").await;

    for player in std::iter::once(&host).chain(guests.iter()) {
        player
            .send("submit_answer", json!({"answer": "pancakes"}))
            .await
            .unwrap();
        player
            .send("toggle_answer_is_ready", Value::Null)
            .await
            .unwrap();
    }

    let voting = tokio::time::timeout(Duration::from_secs(2), host.next_of("voting"))
        .await
        .expect("voting started early");
    assert_eq!(voting["players"].as_array().unwrap().len(), 3);

    harness.state.machines().cancel_all();
    assert!(harness.state.machines().wait(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn cancelled_games_stop_advancing() {
    let harness = Harness::fast(PHASE).await;
    let (code, mut host, _guests) = ready_lobby(&harness, 1).await;
    host.drain().await;
    host.send("start_game", json!({"room_code": code}))
        .await
        .unwrap();
    host.next_of("question").await;

    harness.state.machines().cancel_all();
    assert!(harness.state.machines().wait(Duration::from_secs(2)).await);
    host.drain().await;
    assert!(host.is_quiet(PHASE * 4).await);

    let room = player_service::get_room_state(&harness.state, host.id)
        .await
        .unwrap();
    assert_eq!(room.state, RoomState::Playing);
}

#[tokio::test]
async fn interrupted_games_resume_at_their_stored_deadline() {
    let mut config = AppConfig::default();
    config.timings = PhaseTimings::uniform(Duration::from_secs(30));
    let harness = Harness::with_config(config).await;
    let (code, mut host, _guests) = ready_lobby(&harness, 1).await;
    host.drain().await;
    host.send("start_game", json!({"room_code": code}))
        .await
        .unwrap();
    let before = host.next_of("question").await;

    harness.state.machines().cancel_all();
    assert!(harness.state.machines().wait(Duration::from_secs(2)).await);
    host.drain().await;

    let games = round_service::active_games(&harness.state).await.unwrap();
    assert_eq!(games.len(), 1);
    let game_state_id = games[0].game_state_id;
    assert!(!harness.state.machines().is_running(game_state_id));

    assert_eq!(recovery::resume_games(&harness.state).await, 1);
    assert!(harness.state.machines().is_running(game_state_id));

    let after = host.next_of("question").await;
    assert_eq!(after["deadline"], before["deadline"]);
    assert_eq!(after["round_number"], before["round_number"]);

    assert_eq!(recovery::resume_games(&harness.state).await, 0);

    harness.state.machines().cancel_all();
    assert!(harness.state.machines().wait(Duration::from_secs(2)).await);
}
