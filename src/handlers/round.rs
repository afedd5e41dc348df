//! Messages sent while a round is being played.
//!
//! Answers are private, so answering only refreshes the sender's screen.
//! Votes are public and update everybody's tally. When the last member
//! locks in, the phase task is restarted at the next phase.

use time::OffsetDateTime;

use super::{HandlerContext, HandlerError};
use crate::{
    dto::ws::{EmptyRequest, SubmitAnswerRequest, SubmitVoteRequest},
    services::{
        broadcast, round_service,
        snapshots::{PhaseSnapshot, QuestionSnapshot},
    },
    state::{phase::Step, state_machine},
};

async fn refresh_sender(ctx: &HandlerContext, question: &QuestionSnapshot) {
    if let Some(view) = question.view_for(ctx.player_id) {
        broadcast::send_view(&ctx.state, ctx.player_id, &view).await;
    }
}

/// `submit_answer`
pub async fn submit_answer(
    ctx: HandlerContext,
    request: SubmitAnswerRequest,
) -> Result<(), HandlerError> {
    let question = round_service::submit_answer(
        &ctx.state,
        ctx.player_id,
        request.answer,
        OffsetDateTime::now_utc(),
    )
    .await?;
    refresh_sender(&ctx, &question).await;
    Ok(())
}

/// `toggle_answer_is_ready`
pub async fn toggle_answer_is_ready(
    ctx: HandlerContext,
    _request: EmptyRequest,
) -> Result<(), HandlerError> {
    let toggled = round_service::toggle_answer_is_ready(
        &ctx.state,
        ctx.player_id,
        OffsetDateTime::now_utc(),
    )
    .await?;
    refresh_sender(&ctx, &toggled.snapshot).await;
    if toggled.all_ready {
        state_machine::start(&ctx.state, toggled.snapshot.game_state_id, Step::Voting);
    }
    Ok(())
}

/// `submit_vote`
pub async fn submit_vote(
    ctx: HandlerContext,
    request: SubmitVoteRequest,
) -> Result<(), HandlerError> {
    let voting = round_service::submit_vote(
        &ctx.state,
        ctx.player_id,
        request.voted_player_nickname,
        OffsetDateTime::now_utc(),
    )
    .await?;
    broadcast::phase(&ctx.state, &PhaseSnapshot::Voting(voting)).await;
    Ok(())
}

/// `toggle_voting_is_ready`
pub async fn toggle_voting_is_ready(
    ctx: HandlerContext,
    _request: EmptyRequest,
) -> Result<(), HandlerError> {
    let toggled = round_service::toggle_voting_is_ready(
        &ctx.state,
        ctx.player_id,
        OffsetDateTime::now_utc(),
    )
    .await?;
    let game_state_id = toggled.snapshot.game_state_id;
    if toggled.all_ready {
        state_machine::start(&ctx.state, game_state_id, Step::Reveal);
    } else {
        broadcast::phase(&ctx.state, &PhaseSnapshot::Voting(toggled.snapshot)).await;
    }
    Ok(())
}
