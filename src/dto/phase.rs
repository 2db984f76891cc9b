use serde::Serialize;
use utoipa::ToSchema;

use crate::state::state_machine::SessionPhase;

/// Session phase as exposed to clients (REST/SSE).
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisiblePhase {
    /// Roster gathered, battle not started.
    Waiting,
    /// Round open for answers and powers.
    InProgress,
    /// Round closed, resolution pending.
    RoundEnding,
    /// Round outcome on display.
    ShowingResults,
    /// Battle over.
    Ended,
}

impl From<SessionPhase> for VisiblePhase {
    fn from(value: SessionPhase) -> Self {
        match value {
            SessionPhase::Waiting => VisiblePhase::Waiting,
            SessionPhase::InProgress => VisiblePhase::InProgress,
            SessionPhase::RoundEnding => VisiblePhase::RoundEnding,
            SessionPhase::ShowingResults => VisiblePhase::ShowingResults,
            SessionPhase::Ended => VisiblePhase::Ended,
        }
    }
}
