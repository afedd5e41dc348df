//! Timer driven phase progression, one task per running game.
//!
//! A phase task moves its game into a phase, broadcasts the snapshot, sleeps
//! until the phase deadline and spawns the task of the next phase. Every start
//! bumps a per-game generation; a task whose generation is no longer current
//! never spawns a successor.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::{sync::watch, time::timeout};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::{
        broadcast,
        round_service::{self, QuestionOutcome},
        snapshots::PhaseSnapshot,
    },
    state::{
        SharedState,
        phase::{Step, after_reveal},
    },
};

struct Machine {
    generation: u64,
    cancel: watch::Sender<bool>,
}

/// Registry of the phase tasks of this process.
pub struct PhaseMachines {
    machines: DashMap<Uuid, Machine>,
    generations: AtomicU64,
    running: watch::Sender<usize>,
}

impl Default for PhaseMachines {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseMachines {
    /// Registry without machines.
    pub fn new() -> Self {
        let (running, _rx) = watch::channel(0);
        Self {
            machines: DashMap::new(),
            generations: AtomicU64::new(0),
            running,
        }
    }

    /// Whether a machine is registered for the game.
    pub fn is_running(&self, game_state_id: Uuid) -> bool {
        self.machines.contains_key(&game_state_id)
    }

    /// Cancel the game's task without starting another one.
    pub fn stop(&self, game_state_id: Uuid) {
        if let Some((_, machine)) = self.machines.remove(&game_state_id) {
            let _ = machine.cancel.send(true);
            debug!(%game_state_id, "phase machine stopped");
        }
    }

    /// Cancel every task; used on shutdown.
    pub fn cancel_all(&self) {
        let ids: Vec<Uuid> = self.machines.iter().map(|entry| *entry.key()).collect();
        for game_state_id in ids {
            self.stop(game_state_id);
        }
    }

    /// Wait until no phase task is running. Returns `false` on timeout.
    pub async fn wait(&self, limit: Duration) -> bool {
        let mut running = self.running.subscribe();
        timeout(limit, running.wait_for(|count| *count == 0))
            .await
            .is_ok()
    }

    fn register(&self, game_state_id: Uuid) -> (u64, watch::Receiver<bool>) {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let (cancel, cancelled) = watch::channel(false);
        if let Some(previous) = self.machines.insert(game_state_id, Machine { generation, cancel }) {
            let _ = previous.cancel.send(true);
        }
        (generation, cancelled)
    }

    fn is_current(&self, game_state_id: Uuid, generation: u64) -> bool {
        self.machines
            .get(&game_state_id)
            .is_some_and(|machine| machine.generation == generation)
    }

    fn retire(&self, game_state_id: Uuid, generation: u64) {
        self.machines
            .remove_if(&game_state_id, |_, machine| machine.generation == generation);
    }
}

/// Keeps the running task count accurate however the task ends.
struct RunningGuard(SharedState);

impl RunningGuard {
    fn enter(state: &SharedState) -> Self {
        state.machines().running.send_modify(|count| *count += 1);
        Self(state.clone())
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0
            .machines()
            .running
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// Drive the game into `step` on a fresh task, cancelling its current task.
pub fn start(state: &SharedState, game_state_id: Uuid, step: Step) {
    let (generation, cancelled) = state.machines().register(game_state_id);
    let guard = RunningGuard::enter(state);
    let span = info_span!("phase", %game_state_id, phase = %step.phase(), generation);
    tokio::spawn(
        run_phase(state.clone(), game_state_id, generation, step, cancelled, guard).instrument(span),
    );
}

enum Entered {
    Phase {
        snapshot: PhaseSnapshot,
        next: Option<Step>,
    },
    Skip(Step),
}

async fn run_phase(
    state: SharedState,
    game_state_id: Uuid,
    generation: u64,
    step: Step,
    mut cancelled: watch::Receiver<bool>,
    _guard: RunningGuard,
) {
    let duration = state.config().timings.for_phase(step.phase());
    let deadline = OffsetDateTime::now_utc() + duration;

    let (snapshot, next) = match enter(&state, game_state_id, step, deadline).await {
        Ok(Entered::Phase { snapshot, next }) => (snapshot, next),
        Ok(Entered::Skip(next)) => {
            if state.machines().is_current(game_state_id, generation) {
                start(&state, game_state_id, next);
            }
            return;
        }
        Err(err) => {
            error!(error = %err, code = err.code(), "phase transition failed; game progression stopped");
            state.machines().retire(game_state_id, generation);
            return;
        }
    };

    if !state.machines().is_current(game_state_id, generation) {
        debug!("superseded before broadcasting");
        return;
    }
    broadcast::phase(&state, &snapshot).await;

    let remaining = snapshot.deadline() - OffsetDateTime::now_utc();
    let remaining = Duration::try_from(remaining).unwrap_or(Duration::ZERO);
    tokio::select! {
        _ = tokio::time::sleep(remaining) => {}
        _ = cancelled.wait_for(|cancelled| *cancelled) => {
            debug!("phase cancelled");
            return;
        }
    }
    if !state.machines().is_current(game_state_id, generation) {
        return;
    }

    match next {
        Some(next) => start(&state, game_state_id, next),
        None => {
            state.machines().retire(game_state_id, generation);
            match round_service::finish_game(&state, game_state_id).await {
                Ok(()) => info!("game progression complete"),
                Err(err) => warn!(error = %err, "failed to finish game"),
            }
        }
    }
}

async fn enter(
    state: &SharedState,
    game_state_id: Uuid,
    step: Step,
    deadline: OffsetDateTime,
) -> Result<Entered, ServiceError> {
    let entered = match step {
        Step::Question { next_round } => {
            match round_service::update_state_to_question(state, game_state_id, deadline, next_round)
                .await?
            {
                QuestionOutcome::Question(question) => Entered::Phase {
                    snapshot: PhaseSnapshot::Question(question),
                    next: step.after(),
                },
                QuestionOutcome::GameCompleted => Entered::Skip(Step::Winner),
            }
        }
        Step::Voting => Entered::Phase {
            snapshot: PhaseSnapshot::Voting(
                round_service::update_state_to_voting(state, game_state_id, deadline).await?,
            ),
            next: step.after(),
        },
        Step::Reveal => {
            let reveal =
                round_service::update_state_to_reveal(state, game_state_id, deadline).await?;
            let next = after_reveal(
                reveal.round_type,
                reveal.round_number,
                state.config().rules.max_rounds,
                reveal.fibber_found(),
            );
            Entered::Phase {
                snapshot: PhaseSnapshot::Reveal(reveal),
                next: Some(next),
            }
        }
        Step::Scoring => Entered::Phase {
            snapshot: PhaseSnapshot::Scoring(
                round_service::update_state_to_score(state, game_state_id, deadline).await?,
            ),
            next: step.after(),
        },
        Step::Winner => Entered::Phase {
            snapshot: PhaseSnapshot::Winner(
                round_service::update_state_to_winner(state, game_state_id, deadline).await?,
            ),
            next: None,
        },
    };
    Ok(entered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_again_cancels_the_previous_task() {
        let machines = PhaseMachines::new();
        let game = Uuid::now_v7();

        let (first, first_cancelled) = machines.register(game);
        let (second, second_cancelled) = machines.register(game);

        assert!(second > first);
        assert!(*first_cancelled.borrow());
        assert!(!*second_cancelled.borrow());
        assert!(!machines.is_current(game, first));
        assert!(machines.is_current(game, second));
    }

    #[test]
    fn stale_generations_cannot_retire_the_current_machine() {
        let machines = PhaseMachines::new();
        let game = Uuid::now_v7();
        let (first, _) = machines.register(game);
        let (_second, _) = machines.register(game);

        machines.retire(game, first);
        assert!(machines.is_running(game));
    }

    #[test]
    fn stop_and_cancel_all_signal_the_tasks() {
        let machines = PhaseMachines::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let (_, a_cancelled) = machines.register(a);
        let (_, b_cancelled) = machines.register(b);

        machines.stop(a);
        assert!(*a_cancelled.borrow());
        assert!(!machines.is_running(a));

        machines.cancel_all();
        assert!(*b_cancelled.borrow());
        assert!(!machines.is_running(b));
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_idle() {
        let machines = PhaseMachines::new();
        assert!(machines.wait(Duration::from_millis(10)).await);
    }
}
