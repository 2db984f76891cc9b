use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// High-level phases a battle session moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Session created, participants gathered, no round opened yet.
    Waiting,
    /// A round is open: answers and power activations are accepted until the deadline.
    InProgress,
    /// The round is closed to submissions and awaits resolution.
    RoundEnding,
    /// The round outcome has been committed and is on display.
    ShowingResults,
    /// Terminal phase; the session is read-only.
    Ended,
}

/// Why an open round stopped accepting submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The round deadline elapsed.
    DeadlineExpired,
    /// The session owner closed the round early.
    Forced,
}

/// Why a battle reached its natural end after a resolved round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The final question of the template has been resolved.
    QuestionsExhausted,
    /// Every participant has fallen.
    PartyDefeated,
    /// The shared boss health pool reached zero.
    BossDefeated,
}

/// Events that can be applied to the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Open the first round.
    StartBattle,
    /// Stop accepting submissions for the current round.
    CloseRound(CloseReason),
    /// The round resolver committed the round outcome.
    ResultsCommitted,
    /// Open the next round after results were shown.
    NextRound,
    /// End the battle after results were shown.
    Finish(FinishReason),
    /// Owner-driven abandon path, valid from any non-terminal phase.
    Abandon,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the session was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

impl SessionPhase {
    /// Compute the phase reached by applying `event`, if the transition is legal.
    pub fn next(self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self, event) {
            (SessionPhase::Waiting, SessionEvent::StartBattle) => SessionPhase::InProgress,
            (SessionPhase::InProgress, SessionEvent::CloseRound(_)) => SessionPhase::RoundEnding,
            (SessionPhase::RoundEnding, SessionEvent::ResultsCommitted) => {
                SessionPhase::ShowingResults
            }
            (SessionPhase::ShowingResults, SessionEvent::NextRound) => SessionPhase::InProgress,
            (SessionPhase::ShowingResults, SessionEvent::Finish(_)) => SessionPhase::Ended,
            (from, SessionEvent::Abandon) if from != SessionPhase::Ended => SessionPhase::Ended,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }

    /// Whether answers and power activations may be submitted in this phase.
    pub fn accepts_submissions(self) -> bool {
        matches!(self, SessionPhase::InProgress)
    }

    /// Whether the session has reached its terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Ended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(phase: SessionPhase, event: SessionEvent) -> SessionPhase {
        phase.next(event).unwrap()
    }

    #[test]
    fn full_happy_path_through_battle() {
        let mut phase = SessionPhase::Waiting;

        phase = apply(phase, SessionEvent::StartBattle);
        assert_eq!(phase, SessionPhase::InProgress);
        phase = apply(phase, SessionEvent::CloseRound(CloseReason::DeadlineExpired));
        assert_eq!(phase, SessionPhase::RoundEnding);
        phase = apply(phase, SessionEvent::ResultsCommitted);
        assert_eq!(phase, SessionPhase::ShowingResults);
        phase = apply(phase, SessionEvent::NextRound);
        assert_eq!(phase, SessionPhase::InProgress);
        phase = apply(phase, SessionEvent::CloseRound(CloseReason::Forced));
        phase = apply(phase, SessionEvent::ResultsCommitted);
        phase = apply(phase, SessionEvent::Finish(FinishReason::QuestionsExhausted));
        assert_eq!(phase, SessionPhase::Ended);
    }

    #[test]
    fn abandon_is_valid_from_every_live_phase() {
        for phase in [
            SessionPhase::Waiting,
            SessionPhase::InProgress,
            SessionPhase::RoundEnding,
            SessionPhase::ShowingResults,
        ] {
            assert_eq!(apply(phase, SessionEvent::Abandon), SessionPhase::Ended);
        }
    }

    #[test]
    fn ended_accepts_no_transitions() {
        for event in [
            SessionEvent::StartBattle,
            SessionEvent::CloseRound(CloseReason::Forced),
            SessionEvent::ResultsCommitted,
            SessionEvent::NextRound,
            SessionEvent::Finish(FinishReason::BossDefeated),
            SessionEvent::Abandon,
        ] {
            let err = SessionPhase::Ended.next(event).unwrap_err();
            assert_eq!(err.from, SessionPhase::Ended);
            assert_eq!(err.event, event);
        }
    }

    #[test]
    fn results_cannot_be_committed_twice() {
        let err = SessionPhase::ShowingResults
            .next(SessionEvent::ResultsCommitted)
            .unwrap_err();
        assert_eq!(err.from, SessionPhase::ShowingResults);
    }

    #[test]
    fn only_in_progress_accepts_submissions() {
        assert!(SessionPhase::InProgress.accepts_submissions());
        assert!(!SessionPhase::RoundEnding.accepts_submissions());
        assert!(!SessionPhase::Waiting.accepts_submissions());
        assert!(!SessionPhase::ShowingResults.accepts_submissions());
        assert!(!SessionPhase::Ended.accepts_submissions());
    }

    #[test]
    fn finishing_requires_results_on_display() {
        let err = SessionPhase::InProgress
            .next(SessionEvent::Finish(FinishReason::PartyDefeated))
            .unwrap_err();
        assert_eq!(err.from, SessionPhase::InProgress);
    }
}
