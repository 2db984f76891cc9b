use tracing::info;
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::battle_service::{Acted, ActionOutcome, run_battle_op},
    state::{
        SharedState,
        dice::{Dice, ThreadDice},
        powers::{self, ActivationRequest, PowerContext},
    },
};

/// Validate a power activation and apply it atomically with the mana debit.
pub async fn activate(
    state: &SharedState,
    session_id: Uuid,
    request: ActivationRequest,
) -> Result<Acted<()>, ServiceError> {
    activate_with(state, session_id, request, || ThreadDice).await
}

/// [`activate`] drawing from dice built by `roll_dice`, once per commit attempt.
pub(crate) async fn activate_with<D, M>(
    state: &SharedState,
    session_id: Uuid,
    request: ActivationRequest,
    mut roll_dice: M,
) -> Result<Acted<()>, ServiceError>
where
    D: Dice,
    M: FnMut() -> D,
{
    let rules = state.rules().clone();
    let (result, session) = run_battle_op(state, session_id, |draft, now| {
        let mut dice = roll_dice();
        let mut ctx = PowerContext {
            now,
            rules: &rules,
            dice: &mut dice,
        };
        Ok(powers::activate(draft, &request, &mut ctx))
    })
    .await?;

    let outcome = ActionOutcome::from(result);
    match &outcome {
        ActionOutcome::Applied(()) => info!(
            session_id = %session_id,
            participant_id = %request.caster,
            power = %request.power,
            round = session.session.current_round_index,
            "power activated"
        ),
        ActionOutcome::Rejected(rejection) | ActionOutcome::Ignored(rejection) => info!(
            session_id = %session_id,
            participant_id = %request.caster,
            power = %request.power,
            code = ?rejection.code(),
            reason = %rejection,
            "power activation refused"
        ),
    }

    Ok(Acted { outcome, session })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        services::battle_service::{self, tests::arena},
        state::{dice::ScriptedDice, powers::Power, rejection::Rejection},
    };

    fn request(caster: Uuid, power: Power, targets: Vec<Uuid>) -> ActivationRequest {
        ActivationRequest {
            caster,
            power,
            declared_cost: None,
            targets,
        }
    }

    #[tokio::test]
    async fn second_power_in_a_round_is_refused() {
        let arena = arena(&[3], 2, 1).await;
        let (state, id) = (&arena.state, arena.session_id);
        let caster = arena.roster[0].id;
        battle_service::start(state, id, None).await.unwrap();

        let first = activate(state, id, request(caster, Power::DelayedStrike, vec![])).await.unwrap();
        let second = activate(state, id, request(caster, Power::EliminateAnswer, vec![])).await.unwrap();

        assert_eq!(first.outcome, ActionOutcome::Applied(()));
        assert_eq!(second.outcome, ActionOutcome::Rejected(Rejection::AlreadyActedThisRound));
        assert_eq!(second.session.session.queued_effects.len(), 1);
        assert!(second.session.session.removed_answers.is_empty());
    }

    #[tokio::test]
    async fn activation_before_start_is_ignored() {
        let arena = arena(&[1], 2, 1).await;
        let acted = activate(
            &arena.state,
            arena.session_id,
            request(arena.roster[0].id, Power::DelayedStrike, vec![]),
        )
        .await
        .unwrap();
        assert!(matches!(acted.outcome, ActionOutcome::Ignored(Rejection::PhaseViolation { .. })));
        assert_eq!(acted.session.version, 1);
    }

    #[tokio::test]
    async fn heal_writes_target_participants() {
        let arena = arena(&[2, 1, 1], 2, 1).await;
        let (state, id) = (&arena.state, arena.session_id);
        battle_service::start(state, id, None).await.unwrap();
        let targets = vec![arena.roster[1].id, arena.roster[2].id];

        let acted = activate(state, id, request(arena.roster[0].id, Power::SplitHeal, targets.clone()))
            .await
            .unwrap();

        assert_eq!(acted.outcome, ActionOutcome::Applied(()));
        let store = state.require_session_store().await.unwrap();
        let healed = store.find_participants(targets).await.unwrap();
        let gained: u32 = healed.iter().map(|p| p.participant.health - 20).sum();
        assert!((4..=10).contains(&gained));
        assert!(healed.iter().all(|p| p.version == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn cap_notice_reaches_caster_then_clears() {
        let arena = arena(&[1, 1, 1, 1], 3, 1).await;
        let (state, id) = (&arena.state, arena.session_id);
        battle_service::start(state, id, None).await.unwrap();

        for caster in &arena.roster[..2] {
            let acted = activate(state, id, request(caster.id, Power::GroupDivination, vec![])).await.unwrap();
            assert_eq!(acted.outcome, ActionOutcome::Applied(()));
            // let the vote run out so the next divination can open its own
            tokio::time::sleep(Duration::from_secs(11)).await;
        }
        let third = arena.roster[2].id;
        let acted = activate(state, id, request(third, Power::GroupDivination, vec![])).await.unwrap();

        assert_eq!(acted.outcome, ActionOutcome::Rejected(Rejection::UseCapExceeded { cap: 2 }));
        let notice = acted.session.session.notices.iter().find(|n| n.recipient == Some(third));
        assert!(notice.is_some());

        tokio::time::sleep(Duration::from_secs(6)).await;
        let session = battle_service::get_session(state, id).await.unwrap();
        assert!(session.session.notices.iter().all(|n| n.recipient != Some(third)));
    }

    #[tokio::test]
    async fn landed_strike_counts_as_power_damage_at_round_close() {
        let arena = arena(&[4, 1], 2, 3).await;
        let (state, id) = (&arena.state, arena.session_id);
        let caster = arena.roster[0].id;
        battle_service::start(state, id, None).await.unwrap();

        let acted = activate_with(state, id, request(caster, Power::DelayedStrike, vec![]), || {
            ScriptedDice::new([7], [])
        })
        .await
        .unwrap();
        assert_eq!(acted.outcome, ActionOutcome::Applied(()));
        for p in &arena.roster {
            battle_service::submit_answer(state, id, p.id, 1).await.unwrap();
        }

        let closed = battle_service::close_round(state, id, None).await.unwrap();

        let breakdown = closed.outcome.applied().unwrap();
        assert_eq!(breakdown.base_damage, 2);
        assert_eq!(breakdown.power_damage, 11);
        assert_eq!(breakdown.total_damage, 13);
        let counters = closed.session.session.counters;
        assert_eq!(counters.power(), 11);
        assert_eq!(counters.total(), counters.base() + 11);
        assert_eq!(closed.session.session.boss_health, 87);
    }

    #[tokio::test]
    async fn revive_scales_to_huge_health_pools() {
        let arena = arena(&[1, 1], 2, 1).await;
        let (state, id) = (&arena.state, arena.session_id);
        let store = state.require_session_store().await.unwrap();
        let mut giant = arena.roster[1].clone();
        giant.max_health = 1_000_000_000;
        giant.health = 0;
        store.save_participant(giant.clone()).await.unwrap();
        battle_service::start(state, id, None).await.unwrap();

        let acted = activate(state, id, request(arena.roster[0].id, Power::Revive, vec![giant.id]))
            .await
            .unwrap();

        assert_eq!(acted.outcome, ActionOutcome::Applied(()));
        assert!(!acted.session.session.defeated.contains(&giant.id));
        let stored = store.find_participants(vec![giant.id]).await.unwrap();
        assert_eq!(stored[0].participant.health, 100_000_000);
    }
}
