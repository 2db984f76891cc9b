//! Client-facing projection of the battle session document.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::SessionEntity,
    dto::{format_system_time, phase::VisiblePhase},
    state::{
        battle::{BattleOutcome, BattleSession, BattleTemplate, NoticeKind, RoundBreakdown, VoteState},
        powers::Power,
        state_machine::SessionPhase,
    },
};

/// Payload creating a new battle in the waiting phase.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    /// Caller allowed to start, close, advance and abandon the battle.
    pub owner_id: Uuid,
    pub template_id: Uuid,
    /// Roster in join order.
    #[validate(length(min = 1, message = "a battle needs at least one participant"))]
    pub participant_ids: Vec<Uuid>,
}

/// Identifies the caller of a lifecycle operation.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LifecycleRequest {
    /// Must match the session owner.
    pub requested_by: Uuid,
}

/// Selects whose targeted notices are included in a session view.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ViewerQuery {
    /// Participant viewing the session; public notices only when omitted.
    pub participant_id: Option<Uuid>,
}

/// One answer option of the current question.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    pub index: usize,
    pub text: String,
    /// Eliminated by a power this round.
    pub removed: bool,
}

/// Question currently played.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub prompt: String,
    pub answers: Vec<AnswerOption>,
    /// Revealed once the round is resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<usize>,
    pub damage: u32,
}

/// Round standing of a roster member.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct ParticipantStatus {
    pub id: Uuid,
    pub answered: bool,
    /// Power used this round.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<Power>,
    pub defeated: bool,
    pub empowered: bool,
}

/// Open group divination vote.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct VoteView {
    pub caster: Uuid,
    pub yes: usize,
    pub no: usize,
    pub eligible: u32,
    pub deadline: String,
}

impl From<&VoteState> for VoteView {
    fn from(vote: &VoteState) -> Self {
        Self {
            caster: vote.caster,
            yes: vote.yes.len(),
            no: vote.no.len(),
            eligible: vote.eligible,
            deadline: format_system_time(vote.deadline),
        }
    }
}

/// Notice visible to the viewer.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct NoticeView {
    pub id: Uuid,
    pub kind: NoticeKind,
    pub message: String,
    /// Whether only the viewer receives this notice.
    pub targeted: bool,
    pub expires_at: String,
}

/// Running damage totals.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
pub struct DamageView {
    pub total: u32,
    pub base: u32,
    pub power: u32,
}

/// Shared boss health pool.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
pub struct BossView {
    pub health: u32,
    pub max_health: u32,
}

/// Session document as served over REST and SSE.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub template_id: Uuid,
    /// Optimistic concurrency version, bumped on every commit.
    pub version: u64,
    pub updated_at: String,
    pub phase: VisiblePhase,
    pub round: u32,
    pub total_rounds: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_deadline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    pub boss: BossView,
    pub participants: Vec<ParticipantStatus>,
    /// Delayed strikes waiting for round close.
    pub queued_strikes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<VoteView>,
    pub divination_uses: u32,
    pub damage: DamageView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_round: Option<RoundBreakdown>,
    pub notices: Vec<NoticeView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<BattleOutcome>,
}

impl SessionView {
    /// Project a stored session for `viewer`, hiding notices targeted at anyone else.
    pub fn build(entity: &SessionEntity, template: &BattleTemplate, viewer: Option<Uuid>) -> Self {
        let session = &entity.session;
        Self {
            id: session.id,
            owner_id: session.owner_id,
            template_id: session.template_id,
            version: entity.version,
            updated_at: format_system_time(entity.updated_at),
            phase: session.phase.into(),
            round: session.current_round_index,
            total_rounds: template.questions.len(),
            round_deadline: session.round_deadline.map(format_system_time),
            question: question_view(session, template),
            boss: BossView {
                health: session.boss_health,
                max_health: session.boss_max_health,
            },
            participants: session
                .participants
                .iter()
                .map(|id| ParticipantStatus {
                    id: *id,
                    answered: session.answer_of(id).is_some(),
                    power: session.activation_of(id).map(|record| record.power),
                    defeated: session.defeated.contains(id),
                    empowered: session.empowered.contains(id),
                })
                .collect(),
            queued_strikes: session.queued_effects.len(),
            vote: session.vote.as_ref().map(VoteView::from),
            divination_uses: session.divination_uses,
            damage: DamageView {
                total: session.counters.total(),
                base: session.counters.base(),
                power: session.counters.power(),
            },
            last_round: session.last_round.clone(),
            notices: session
                .notices
                .iter()
                .filter(|notice| notice.recipient.is_none() || notice.recipient == viewer)
                .map(|notice| NoticeView {
                    id: notice.id,
                    kind: notice.kind,
                    message: notice.message.clone(),
                    targeted: notice.recipient.is_some(),
                    expires_at: format_system_time(notice.expires_at),
                })
                .collect(),
            outcome: session.outcome,
        }
    }
}

fn question_view(session: &BattleSession, template: &BattleTemplate) -> Option<QuestionView> {
    if session.phase == SessionPhase::Waiting {
        return None;
    }
    let question = template.question(session.current_round_index)?;
    let resolved = session.last_resolved_round == Some(session.current_round_index);
    Some(QuestionView {
        prompt: question.prompt.clone(),
        answers: question
            .answers
            .iter()
            .enumerate()
            .map(|(index, text)| AnswerOption {
                index,
                text: text.clone(),
                removed: session.removed_answers.contains(&index),
            })
            .collect(),
        correct_index: resolved.then_some(question.correct_index),
        damage: question.damage,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::state::{
        battle::fixtures::{at, in_progress, participant, template},
        powers::Power,
    };

    fn entity(session: BattleSession) -> SessionEntity {
        SessionEntity {
            session,
            version: 3,
            updated_at: at(10),
        }
    }

    #[test]
    fn targeted_notices_reach_only_their_recipient() {
        let aria = participant("Aria", 1, 20, 50);
        let bram = participant("Bram", 1, 20, 50);
        let (aria_id, bram_id) = (aria.id, bram.id);
        let mut draft = in_progress(vec![aria, bram], template(2, 4));
        draft
            .session
            .push_notice(NoticeKind::PowerUsed, "Aria used a power".into(), None, at(20));
        draft.session.push_notice(
            NoticeKind::Rejected,
            "divination cap reached".into(),
            Some(aria_id),
            at(20),
        );
        let entity = entity(draft.session);

        let for_aria = SessionView::build(&entity, &draft.template, Some(aria_id));
        let for_bram = SessionView::build(&entity, &draft.template, Some(bram_id));
        let public = SessionView::build(&entity, &draft.template, None);

        assert_eq!(for_aria.notices.len(), 2);
        assert!(for_aria.notices.iter().any(|n| n.targeted));
        assert_eq!(for_bram.notices.len(), 1);
        assert_eq!(public.notices.len(), 1);
    }

    #[test]
    fn correct_answer_stays_hidden_until_resolution() {
        let aria = participant("Aria", 1, 20, 50);
        let mut draft = in_progress(vec![aria], template(2, 4));
        draft.session.removed_answers.push(2);
        let view = SessionView::build(&entity(draft.session.clone()), &draft.template, None);

        let question = view.question.unwrap();
        assert_eq!(question.correct_index, None);
        assert!(question.answers[2].removed);
        assert_eq!(view.phase, VisiblePhase::InProgress);
        assert_eq!(view.round_deadline, Some(format_system_time(at(100))));

        draft.session.last_resolved_round = Some(0);
        draft.session.phase = SessionPhase::ShowingResults;
        let view = SessionView::build(&entity(draft.session), &draft.template, None);
        assert_eq!(view.question.unwrap().correct_index, Some(1));
    }

    #[test]
    fn roster_status_reflects_round_activity() {
        let aria = participant("Aria", 1, 20, 50);
        let bram = participant("Bram", 1, 0, 50);
        let (aria_id, bram_id) = (aria.id, bram.id);
        let mut draft = in_progress(vec![aria, bram], template(1, 4));
        draft.session.defeated.insert(bram_id);
        draft.session.activations_this_round.push(crate::state::battle::ActivationRecord {
            participant: aria_id,
            power: Power::DelayedStrike,
        });
        draft.session.round_deadline = Some(at(10) + Duration::from_secs(30));

        let view = SessionView::build(&entity(draft.session), &draft.template, None);
        assert_eq!(view.version, 3);
        assert_eq!(view.total_rounds, 1);
        assert_eq!(view.participants[0].power, Some(Power::DelayedStrike));
        assert!(!view.participants[0].defeated);
        assert!(view.participants[1].defeated);
        assert_eq!(view.boss.health, view.boss.max_health);
    }
}
