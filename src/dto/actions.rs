//! Request and response payloads of the participant channels and lifecycle operations.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    services::battle_service::{Acted, ActionOutcome},
    state::{
        battle::RoundBreakdown,
        lifecycle::{AnswerOutcome, BallotOutcome},
        powers::{ActivationRequest, Power},
        rejection::RejectionCode,
        state_machine::FinishReason,
    },
};

/// Power activation submitted by a participant.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ActivationInput {
    pub caster_id: Uuid,
    pub power: Power,
    /// Cost the client believes the power has; the catalog cost applies regardless.
    #[serde(default)]
    pub declared_cost: Option<u32>,
    #[serde(default)]
    #[validate(length(max = 3, message = "no power takes more than three targets"))]
    pub targets: Vec<Uuid>,
}

impl From<ActivationInput> for ActivationRequest {
    fn from(input: ActivationInput) -> Self {
        ActivationRequest {
            caster: input.caster_id,
            power: input.power,
            declared_cost: input.declared_cost,
            targets: input.targets,
        }
    }
}

/// Answer to the current question.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AnswerInput {
    pub participant_id: Uuid,
    pub choice: usize,
}

/// Ballot on the open divination vote.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VoteInput {
    pub participant_id: Uuid,
    pub approve: bool,
}

/// How the engine treated a request.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Accepted,
    Rejected,
    Ignored,
}

/// Common part of every action response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<RejectionCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Session version after the request.
    pub version: u64,
}

impl ActionResponse {
    /// Summarise an outcome, returning the applied value alongside.
    pub fn split<T: Clone>(acted: &Acted<T>) -> (Self, Option<T>) {
        let version = acted.session.version;
        match &acted.outcome {
            ActionOutcome::Applied(value) => (
                Self {
                    status: ActionStatus::Accepted,
                    code: None,
                    reason: None,
                    version,
                },
                Some(value.clone()),
            ),
            ActionOutcome::Rejected(rejection) => (
                Self {
                    status: ActionStatus::Rejected,
                    code: Some(rejection.code()),
                    reason: Some(rejection.to_string()),
                    version,
                },
                None,
            ),
            ActionOutcome::Ignored(rejection) => (
                Self {
                    status: ActionStatus::Ignored,
                    code: Some(rejection.code()),
                    reason: Some(rejection.to_string()),
                    version,
                },
                None,
            ),
        }
    }
}

impl From<&Acted<()>> for ActionResponse {
    fn from(acted: &Acted<()>) -> Self {
        ActionResponse::split(acted).0
    }
}

/// Response to an answer submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerResponse {
    #[serde(flatten)]
    pub action: ActionResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<AnswerOutcome>,
}

impl From<&Acted<AnswerOutcome>> for AnswerResponse {
    fn from(acted: &Acted<AnswerOutcome>) -> Self {
        let (action, outcome) = ActionResponse::split(acted);
        Self { action, outcome }
    }
}

/// Response to a ballot.
#[derive(Debug, Serialize, ToSchema)]
pub struct VoteResponse {
    #[serde(flatten)]
    pub action: ActionResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<BallotOutcome>,
}

impl From<&Acted<BallotOutcome>> for VoteResponse {
    fn from(acted: &Acted<BallotOutcome>) -> Self {
        let (action, outcome) = ActionResponse::split(acted);
        Self { action, outcome }
    }
}

/// Response to closing a round.
#[derive(Debug, Serialize, ToSchema)]
pub struct CloseRoundResponse {
    #[serde(flatten)]
    pub action: ActionResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<RoundBreakdown>,
}

impl From<&Acted<RoundBreakdown>> for CloseRoundResponse {
    fn from(acted: &Acted<RoundBreakdown>) -> Self {
        let (action, breakdown) = ActionResponse::split(acted);
        Self { action, breakdown }
    }
}

/// Response to advancing past the results.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdvanceResponse {
    #[serde(flatten)]
    pub action: ActionResponse,
    /// Set when the battle ended instead of opening a new round.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<FinishReason>,
}

impl From<&Acted<Option<FinishReason>>> for AdvanceResponse {
    fn from(acted: &Acted<Option<FinishReason>>) -> Self {
        let (action, finished) = ActionResponse::split(acted);
        Self {
            action,
            finished: finished.flatten(),
        }
    }
}
