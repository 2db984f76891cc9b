use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::state_machine::SessionPhase;

/// Reasons the engine refuses a request. Rejections are local to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The session is not in a phase accepting this request.
    #[error("not allowed while the session is {phase:?}")]
    PhaseViolation {
        /// Phase observed when the request was evaluated.
        phase: SessionPhase,
    },
    /// The caster already used a power this round.
    #[error("a power was already used this round")]
    AlreadyActedThisRound,
    /// The caster cannot pay the cost.
    #[error("not enough mana: {required} required, {available} available")]
    InsufficientResource {
        /// Catalog cost.
        required: u32,
        /// Caster mana at evaluation time.
        available: u32,
    },
    /// Target count, identity or health does not suit the power.
    #[error("invalid target: {0}")]
    InvalidTargetState(String),
    /// The per-session cap of the power is reached.
    #[error("use cap of {cap} reached for this session")]
    UseCapExceeded {
        /// Configured cap.
        cap: u32,
    },
    /// The round was already resolved or is not the current one.
    #[error("round {round} was already resolved")]
    StaleRoundResolution {
        /// Round index targeted by the resolution.
        round: u32,
    },
}

/// Machine-readable rejection code exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCode {
    /// See [`Rejection::PhaseViolation`].
    PhaseViolation,
    /// See [`Rejection::AlreadyActedThisRound`].
    AlreadyActedThisRound,
    /// See [`Rejection::InsufficientResource`].
    InsufficientResource,
    /// See [`Rejection::InvalidTargetState`].
    InvalidTargetState,
    /// See [`Rejection::UseCapExceeded`].
    UseCapExceeded,
    /// See [`Rejection::StaleRoundResolution`].
    StaleRoundResolution,
}

impl Rejection {
    /// Stable code for this rejection.
    pub fn code(&self) -> RejectionCode {
        match self {
            Rejection::PhaseViolation { .. } => RejectionCode::PhaseViolation,
            Rejection::AlreadyActedThisRound => RejectionCode::AlreadyActedThisRound,
            Rejection::InsufficientResource { .. } => RejectionCode::InsufficientResource,
            Rejection::InvalidTargetState(_) => RejectionCode::InvalidTargetState,
            Rejection::UseCapExceeded { .. } => RejectionCode::UseCapExceeded,
            Rejection::StaleRoundResolution { .. } => RejectionCode::StaleRoundResolution,
        }
    }

    /// Phase and staleness rejections are reported as ignored rather than refused.
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            Rejection::PhaseViolation { .. } | Rejection::StaleRoundResolution { .. }
        )
    }
}
