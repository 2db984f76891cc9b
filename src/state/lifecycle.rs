//! Round lifecycle operations applied to a battle draft: start, close, advance, abandon,
//! answers and votes.

use std::time::{Duration, SystemTime};

use serde::Serialize;
use utoipa::ToSchema;

use crate::state::{
    battle::{BattleDraft, BattleOutcome, BattleSession, ParticipantId, RoundAnswer},
    rejection::Rejection,
    resolver::settle_vote,
    state_machine::{CloseReason, FinishReason, InvalidTransition, SessionEvent, SessionPhase},
};

/// Result of an answer submission that was not refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// The answer was recorded.
    Recorded,
    /// The participant already answered this round; the first answer stands.
    Duplicate,
}

/// Result of a vote that was not refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BallotOutcome {
    /// The ballot was counted and the vote stays open.
    Recorded,
    /// The ballot was the last one expected; the vote closed.
    Closed {
        /// Whether the vote passed.
        passed: bool,
    },
    /// Late or repeated ballot.
    Ignored,
}

fn phase_violation(err: InvalidTransition) -> Rejection {
    Rejection::PhaseViolation { phase: err.from }
}

fn require_standing(draft: &BattleDraft, participant: &ParticipantId) -> Result<(), Rejection> {
    let standing = draft.session.includes(participant)
        && draft.participant(participant).is_some_and(|p| !p.is_fallen());
    if standing {
        Ok(())
    } else {
        Err(Rejection::InvalidTargetState(format!(
            "{participant} is not a living participant of this battle"
        )))
    }
}

/// Open round 0.
pub fn start(session: &mut BattleSession, now: SystemTime, round_duration: Duration) -> Result<(), Rejection> {
    session.apply(SessionEvent::StartBattle).map_err(phase_violation)?;
    session.current_round_index = 0;
    session.clear_round_state();
    session.round_deadline = Some(now + round_duration);
    Ok(())
}

/// Stop accepting submissions for `round`.
pub fn close_round(session: &mut BattleSession, round: u32, reason: CloseReason) -> Result<(), Rejection> {
    if round != session.current_round_index {
        return Err(Rejection::StaleRoundResolution { round });
    }
    session
        .apply(SessionEvent::CloseRound(reason))
        .map_err(phase_violation)?;
    session.round_deadline = None;
    Ok(())
}

/// Leave `ShowingResults`: end the battle when it is decided, otherwise open the next round.
///
/// Returns the finish reason when the battle ended.
pub fn advance(
    draft: &mut BattleDraft,
    now: SystemTime,
    round_duration: Duration,
) -> Result<Option<FinishReason>, Rejection> {
    if draft.session.phase != SessionPhase::ShowingResults {
        return Err(Rejection::PhaseViolation {
            phase: draft.session.phase,
        });
    }

    let finish = if draft.session.boss_health == 0 {
        Some((FinishReason::BossDefeated, BattleOutcome::Victory))
    } else if draft.all_defeated() {
        Some((FinishReason::PartyDefeated, BattleOutcome::Defeat))
    } else if draft.template.is_last_round(draft.session.current_round_index) {
        Some((FinishReason::QuestionsExhausted, BattleOutcome::Completed))
    } else {
        None
    };

    let session = &mut draft.session;
    match finish {
        Some((reason, outcome)) => {
            session.apply(SessionEvent::Finish(reason)).map_err(phase_violation)?;
            session.clear_round_state();
            session.notices.clear();
            session.outcome = Some(outcome);
            Ok(Some(reason))
        }
        None => {
            session.apply(SessionEvent::NextRound).map_err(phase_violation)?;
            session.current_round_index += 1;
            session.clear_round_state();
            session.round_deadline = Some(now + round_duration);
            Ok(None)
        }
    }
}

/// End the battle without resolving anything still pending.
pub fn abandon(session: &mut BattleSession) -> Result<(), Rejection> {
    session.apply(SessionEvent::Abandon).map_err(phase_violation)?;
    session.clear_round_state();
    session.notices.clear();
    session.outcome = Some(BattleOutcome::Abandoned);
    Ok(())
}

/// Record the first answer of `participant` for the current round.
pub fn submit_answer(
    draft: &mut BattleDraft,
    participant: ParticipantId,
    choice: usize,
    now: SystemTime,
) -> Result<AnswerOutcome, Rejection> {
    if !draft.session.submissions_open(now) {
        return Err(Rejection::PhaseViolation {
            phase: draft.session.phase,
        });
    }
    require_standing(draft, &participant)?;
    if draft.session.answer_of(&participant).is_some() {
        return Ok(AnswerOutcome::Duplicate);
    }

    let question = draft
        .current_question()
        .ok_or_else(|| Rejection::InvalidTargetState("no question is being asked".into()))?;
    if choice >= question.answers.len() {
        return Err(Rejection::InvalidTargetState(format!(
            "choice {choice} does not exist"
        )));
    }
    let correct = question.is_correct(choice);

    draft.session.answers_this_round.push(RoundAnswer {
        participant,
        choice,
        correct,
        submitted_at: now,
    });
    Ok(AnswerOutcome::Recorded)
}

/// Count a ballot on the pending divination vote, closing it once everyone voted.
pub fn cast_ballot(
    draft: &mut BattleDraft,
    participant: ParticipantId,
    approve: bool,
    now: SystemTime,
    notice_expiry: SystemTime,
) -> Result<BallotOutcome, Rejection> {
    if draft.session.vote.is_none() || !draft.session.phase.accepts_submissions() {
        return Err(Rejection::PhaseViolation {
            phase: draft.session.phase,
        });
    }
    require_standing(draft, &participant)?;

    let Some(vote) = draft.session.vote.as_mut() else {
        return Ok(BallotOutcome::Ignored);
    };
    if now > vote.deadline || vote.has_voted(&participant) {
        return Ok(BallotOutcome::Ignored);
    }
    if approve {
        vote.yes.insert(participant);
    } else {
        vote.no.insert(participant);
    }

    if vote.is_complete() {
        let passed = settle_vote(&mut draft.session, notice_expiry).unwrap_or(false);
        return Ok(BallotOutcome::Closed { passed });
    }
    Ok(BallotOutcome::Recorded)
}

/// Settle the vote of `round` once its window elapsed. Returns whether it passed.
pub fn expire_vote(session: &mut BattleSession, round: u32, notice_expiry: SystemTime) -> Option<bool> {
    let belongs = session.vote.as_ref().is_some_and(|vote| vote.round == round);
    if !belongs || session.phase != SessionPhase::InProgress {
        return None;
    }
    settle_vote(session, notice_expiry)
}
