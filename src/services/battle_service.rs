//! Battle lifecycle operations and the optimistic commit loop they all go through.

use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, SystemTime},
};

use indexmap::IndexMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{
        models::{CommitBatch, CommitOutcome, SessionEntity, VersionedWrite},
        session_store::SessionStore,
    },
    error::ServiceError,
    services::scheduler::{TaskKey, TaskKind},
    state::{
        SharedState,
        battle::{BattleDraft, BattleSession, BattleTemplate, ParticipantId, RoundBreakdown},
        lifecycle::{self, AnswerOutcome, BallotOutcome},
        rejection::Rejection,
        resolver,
        state_machine::{CloseReason, FinishReason, SessionPhase},
    },
};

/// What happened to a request the engine evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome<T> {
    /// The request took effect.
    Applied(T),
    /// The request was refused for a reason the requester can act on.
    Rejected(Rejection),
    /// The request arrived in the wrong phase or too late and was dropped.
    Ignored(Rejection),
}

impl<T> From<Result<T, Rejection>> for ActionOutcome<T> {
    fn from(result: Result<T, Rejection>) -> Self {
        match result {
            Ok(value) => ActionOutcome::Applied(value),
            Err(rejection) if rejection.is_ignorable() => ActionOutcome::Ignored(rejection),
            Err(rejection) => ActionOutcome::Rejected(rejection),
        }
    }
}

impl<T> ActionOutcome<T> {
    /// Value of an applied request.
    pub fn applied(&self) -> Option<&T> {
        match self {
            ActionOutcome::Applied(value) => Some(value),
            _ => None,
        }
    }
}

/// Outcome of an operation together with the session as it stands afterwards.
#[derive(Debug, Clone)]
pub struct Acted<T> {
    /// Outcome of the request.
    pub outcome: ActionOutcome<T>,
    /// Latest committed session.
    pub session: Arc<SessionEntity>,
}

/// Parameters of a new battle.
#[derive(Debug, Clone)]
pub struct NewBattle {
    /// Participant or operator allowed to drive the lifecycle.
    pub owner_id: Uuid,
    /// Template providing questions and boss health.
    pub template_id: Uuid,
    /// Roster, in join order.
    pub participant_ids: Vec<ParticipantId>,
}

struct LoadedBattle {
    entity: SessionEntity,
    versions: IndexMap<ParticipantId, u64>,
    draft: BattleDraft,
}

/// Fetch a template through the in-process cache.
pub(crate) async fn load_template(
    state: &SharedState,
    store: &Arc<dyn SessionStore>,
    id: Uuid,
) -> Result<Arc<BattleTemplate>, ServiceError> {
    if let Some(template) = state.template_cache().get(&id) {
        return Ok(Arc::clone(template.value()));
    }
    let template = store
        .find_template(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("template `{id}` not found")))?;
    let template = Arc::new(template);
    state.template_cache().insert(id, Arc::clone(&template));
    Ok(template)
}

async fn load_battle(
    state: &SharedState,
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
) -> Result<LoadedBattle, ServiceError> {
    let entity = store
        .find_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))?;
    let template = load_template(state, store, entity.session.template_id).await?;
    let mut stored: IndexMap<_, _> = store
        .find_participants(entity.session.participants.clone())
        .await?
        .into_iter()
        .map(|p| (p.participant.id, p))
        .collect();

    let mut versions = IndexMap::new();
    let mut participants = IndexMap::new();
    for id in &entity.session.participants {
        if let Some(p) = stored.swap_remove(id) {
            versions.insert(*id, p.version);
            participants.insert(*id, p.participant);
        }
    }

    let mut draft = BattleDraft {
        session: entity.session.clone(),
        participants,
        template,
    };
    draft.sync_defeated();
    Ok(LoadedBattle {
        entity,
        versions,
        draft,
    })
}

/// Read, apply `work` to a draft and commit it with compare-and-swap, re-reading on conflict.
///
/// `work` runs again from a fresh read after each conflict. A draft `work` left untouched
/// is not written.
pub(crate) async fn run_battle_op<T, F>(
    state: &SharedState,
    session_id: Uuid,
    mut work: F,
) -> Result<(T, Arc<SessionEntity>), ServiceError>
where
    F: FnMut(&mut BattleDraft, SystemTime) -> Result<T, ServiceError>,
{
    let store = state.require_session_store().await?;
    let attempts = state.rules().commit_attempts;

    for attempt in 1..=attempts {
        let LoadedBattle {
            entity,
            versions,
            mut draft,
        } = load_battle(state, &store, session_id).await?;
        let original = draft.clone();
        let now = SystemTime::now();
        let value = work(&mut draft, now)?;

        if draft == original {
            return Ok((value, Arc::new(entity)));
        }

        let participants = draft
            .participants
            .values()
            .filter(|p| original.participants.get(&p.id) != Some(*p))
            .filter_map(|p| {
                versions.get(&p.id).map(|version| VersionedWrite {
                    expected_version: *version,
                    document: p.clone(),
                })
            })
            .collect();
        let batch = CommitBatch {
            session: VersionedWrite {
                expected_version: entity.version,
                document: draft.session,
            },
            participants,
            updated_at: now,
        };

        match store.commit(batch).await? {
            CommitOutcome::Committed(committed) => {
                schedule_follow_ups(state, &entity.session, &committed.session);
                return Ok((value, committed));
            }
            CommitOutcome::Conflict => {
                debug!(session_id = %session_id, attempt, "commit conflict; re-reading session");
            }
        }
    }

    Err(ServiceError::Conflict(session_id.to_string()))
}

fn delay_until(instant: SystemTime) -> Duration {
    instant
        .duration_since(SystemTime::now())
        .unwrap_or_default()
}

/// Align the scheduled tasks of a session with what the last commit changed.
fn schedule_follow_ups(state: &SharedState, before: &BattleSession, after: &BattleSession) {
    let scheduler = state.scheduler();
    let session_id = after.id;
    let key = |kind| TaskKey { session_id, kind };

    if after.phase.is_terminal() {
        scheduler.cancel_session(session_id);
        return;
    }

    let known: HashSet<_> = before.notices.iter().map(|notice| notice.id).collect();
    for notice in after.notices.iter().filter(|n| !known.contains(&n.id)) {
        let task_state = Arc::clone(state);
        let notice_id = notice.id;
        scheduler.schedule(
            key(TaskKind::ClearNotice(notice_id)),
            delay_until(notice.expires_at),
            async move {
                if let Err(err) = clear_notice(&task_state, session_id, notice_id).await {
                    debug!(session_id = %session_id, error = %err, "notice clearing failed");
                }
            },
        );
    }

    let vote_of = |session: &BattleSession| {
        session
            .vote
            .as_ref()
            .map(|vote| (vote.round, vote.caster, vote.deadline))
    };
    let (old_vote, new_vote) = (vote_of(before), vote_of(after));
    if old_vote != new_vote {
        if let Some((round, _, deadline)) = new_vote {
            let task_state = Arc::clone(state);
            scheduler.schedule(key(TaskKind::CloseVote(round)), delay_until(deadline), async move {
                if let Err(err) = expire_vote(&task_state, session_id, round).await {
                    debug!(session_id = %session_id, error = %err, "vote expiry failed");
                }
            });
        } else if let Some((round, _, _)) = old_vote {
            scheduler.cancel(&key(TaskKind::CloseVote(round)));
        }
    }

    let round_opened = after.phase == SessionPhase::InProgress
        && (before.phase != SessionPhase::InProgress
            || before.current_round_index != after.current_round_index);
    if round_opened {
        if let Some(deadline) = after.round_deadline {
            let round = after.current_round_index;
            let task_state = Arc::clone(state);
            scheduler.schedule(key(TaskKind::CloseRound(round)), delay_until(deadline), async move {
                if let Err(err) = close_and_resolve(&task_state, session_id, Some(round), None, CloseReason::DeadlineExpired).await {
                    debug!(session_id = %session_id, round, error = %err, "deadline close failed");
                }
            });
        }
    } else if before.phase == SessionPhase::InProgress && after.phase != SessionPhase::InProgress {
        scheduler.cancel(&key(TaskKind::CloseRound(before.current_round_index)));
    }
}

fn authorize(session: &BattleSession, requested_by: Option<Uuid>) -> Result<(), ServiceError> {
    match requested_by {
        Some(caller) if caller != session.owner_id => Err(ServiceError::Unauthorized(format!(
            "only the owner of session `{}` may drive it",
            session.id
        ))),
        _ => Ok(()),
    }
}

fn log_outcome<T>(session_id: Uuid, operation: &'static str, outcome: &ActionOutcome<T>) {
    match outcome {
        ActionOutcome::Applied(_) => debug!(session_id = %session_id, operation, "applied"),
        ActionOutcome::Rejected(rejection) => {
            info!(session_id = %session_id, operation, code = ?rejection.code(), reason = %rejection, "rejected")
        }
        ActionOutcome::Ignored(rejection) => {
            debug!(session_id = %session_id, operation, reason = %rejection, "ignored")
        }
    }
}

async fn act<T, F>(
    state: &SharedState,
    session_id: Uuid,
    operation: &'static str,
    work: F,
) -> Result<Acted<T>, ServiceError>
where
    F: FnMut(&mut BattleDraft, SystemTime) -> Result<Result<T, Rejection>, ServiceError>,
{
    let (result, session) = run_battle_op(state, session_id, work).await?;
    let outcome = ActionOutcome::from(result);
    log_outcome(session_id, operation, &outcome);
    Ok(Acted { outcome, session })
}

/// Create a waiting battle for an existing template and roster.
pub async fn create_session(
    state: &SharedState,
    request: NewBattle,
) -> Result<Arc<SessionEntity>, ServiceError> {
    let store = state.require_session_store().await?;
    let NewBattle {
        owner_id,
        template_id,
        participant_ids,
    } = request;

    if participant_ids.is_empty() {
        return Err(ServiceError::InvalidInput(
            "a battle requires at least one participant".into(),
        ));
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = participant_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(ServiceError::InvalidInput(format!(
            "participant `{duplicate}` is listed twice"
        )));
    }

    let template = load_template(state, &store, template_id).await?;
    if template.questions.is_empty() {
        return Err(ServiceError::InvalidInput(format!(
            "template `{template_id}` has no questions"
        )));
    }

    let mut found: IndexMap<_, _> = store
        .find_participants(participant_ids.clone())
        .await?
        .into_iter()
        .map(|p| (p.participant.id, p.participant))
        .collect();
    let roster = participant_ids
        .iter()
        .map(|id| {
            found
                .swap_remove(id)
                .ok_or_else(|| ServiceError::NotFound(format!("participant `{id}` not found")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let session = BattleSession::new(owner_id, &template, &roster, SystemTime::now());
    let entity = store.insert_session(session).await?;
    info!(session_id = %entity.id(), template_id = %template_id, participants = roster.len(), "battle created");
    Ok(Arc::new(entity))
}

/// Latest committed state of a session.
pub async fn get_session(state: &SharedState, session_id: Uuid) -> Result<SessionEntity, ServiceError> {
    let store = state.require_session_store().await?;
    store
        .find_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))
}

/// Open the first round.
pub async fn start(
    state: &SharedState,
    session_id: Uuid,
    requested_by: Option<Uuid>,
) -> Result<Acted<()>, ServiceError> {
    let round_duration = state.rules().round_duration;
    act(state, session_id, "start", |draft, now| {
        authorize(&draft.session, requested_by)?;
        Ok(lifecycle::start(&mut draft.session, now, round_duration))
    })
    .await
}

/// Close the current round early and resolve it.
pub async fn close_round(
    state: &SharedState,
    session_id: Uuid,
    requested_by: Option<Uuid>,
) -> Result<Acted<RoundBreakdown>, ServiceError> {
    close_and_resolve(state, session_id, None, requested_by, CloseReason::Forced).await
}

/// Close `round` (the current one when `None`) if still open, then resolve it.
///
/// A session already waiting in `RoundEnding` is resolved without closing again.
async fn close_and_resolve(
    state: &SharedState,
    session_id: Uuid,
    round: Option<u32>,
    requested_by: Option<Uuid>,
    reason: CloseReason,
) -> Result<Acted<RoundBreakdown>, ServiceError> {
    let closed = act(state, session_id, "close_round", |draft, _| {
        authorize(&draft.session, requested_by)?;
        let session = &mut draft.session;
        let round = round.unwrap_or(session.current_round_index);
        if session.phase == SessionPhase::RoundEnding && session.current_round_index == round {
            return Ok(Ok(round));
        }
        Ok(lifecycle::close_round(session, round, reason).map(|()| round))
    })
    .await?;

    let round = match closed.outcome {
        ActionOutcome::Applied(round) => round,
        ActionOutcome::Rejected(rejection) => {
            return Ok(Acted {
                outcome: ActionOutcome::Rejected(rejection),
                session: closed.session,
            });
        }
        ActionOutcome::Ignored(rejection) => {
            return Ok(Acted {
                outcome: ActionOutcome::Ignored(rejection),
                session: closed.session,
            });
        }
    };

    let notice_display = state.rules().notice_display;
    act(state, session_id, "resolve_round", |draft, now| {
        Ok(resolver::resolve_round(draft, round, now + notice_display))
    })
    .await
}

/// Move past the results: open the next round or end the battle.
pub async fn advance(
    state: &SharedState,
    session_id: Uuid,
    requested_by: Option<Uuid>,
) -> Result<Acted<Option<FinishReason>>, ServiceError> {
    let round_duration = state.rules().round_duration;
    let acted = act(state, session_id, "advance", |draft, now| {
        authorize(&draft.session, requested_by)?;
        Ok(lifecycle::advance(draft, now, round_duration))
    })
    .await?;
    if let Some(Some(reason)) = acted.outcome.applied() {
        info!(session_id = %session_id, reason = ?reason, "battle finished");
    }
    Ok(acted)
}

/// End the battle, discarding queued strikes and votes and cancelling scheduled work.
pub async fn abandon(
    state: &SharedState,
    session_id: Uuid,
    requested_by: Option<Uuid>,
) -> Result<Acted<()>, ServiceError> {
    let acted = act(state, session_id, "abandon", |draft, _| {
        authorize(&draft.session, requested_by)?;
        Ok(lifecycle::abandon(&mut draft.session))
    })
    .await?;
    if acted.outcome.applied().is_some() {
        info!(session_id = %session_id, "battle abandoned");
    }
    Ok(acted)
}

/// Record an answer for the current round.
pub async fn submit_answer(
    state: &SharedState,
    session_id: Uuid,
    participant: ParticipantId,
    choice: usize,
) -> Result<Acted<AnswerOutcome>, ServiceError> {
    act(state, session_id, "answer", |draft, now| {
        Ok(lifecycle::submit_answer(draft, participant, choice, now))
    })
    .await
}

/// Count a ballot on the open divination vote.
pub async fn cast_vote(
    state: &SharedState,
    session_id: Uuid,
    participant: ParticipantId,
    approve: bool,
) -> Result<Acted<BallotOutcome>, ServiceError> {
    let notice_display = state.rules().notice_display;
    act(state, session_id, "vote", |draft, now| {
        Ok(lifecycle::cast_ballot(draft, participant, approve, now, now + notice_display))
    })
    .await
}

async fn expire_vote(state: &SharedState, session_id: Uuid, round: u32) -> Result<(), ServiceError> {
    let notice_display = state.rules().notice_display;
    let (passed, _) = run_battle_op(state, session_id, |draft, now| {
        Ok(lifecycle::expire_vote(&mut draft.session, round, now + notice_display))
    })
    .await?;
    if let Some(passed) = passed {
        info!(session_id = %session_id, round, passed, "divination vote expired");
    }
    Ok(())
}

async fn clear_notice(state: &SharedState, session_id: Uuid, notice_id: Uuid) -> Result<(), ServiceError> {
    run_battle_op(state, session_id, |draft, _| {
        Ok(draft.session.clear_notice(notice_id))
    })
    .await?;
    Ok(())
}
