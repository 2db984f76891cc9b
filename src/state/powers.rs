//! Power catalog, activation intake and the per-power effect handlers.

use std::{collections::BTreeSet, fmt, time::SystemTime};

use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::{
    config::BattleRules,
    state::{
        battle::{ActivationRecord, BattleDraft, NoticeKind, ParticipantId, QueuedEffect, VoteState},
        dice::Dice,
        rejection::Rejection,
        resolver::settle_vote,
    },
};

/// Closed set of powers a participant may cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Power {
    /// Hide one incorrect option of the current question.
    EliminateAnswer,
    /// Queue 2d6 + level damage that lands if the caster answers correctly.
    DelayedStrike,
    /// Bring a fallen participant back.
    Revive,
    /// Heal two participants from a shared uneven pool.
    SplitHeal,
    /// Raise health and max health of three participants.
    TripleEmpower,
    /// Deal immediate damage and open a vote to skip the base damage.
    GroupDivination,
}

/// Catalog entry of a power.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerSpec {
    /// Mana cost, authoritative over any cost declared by clients.
    pub cost: u32,
    /// Exact number of targets.
    pub arity: usize,
}

impl Power {
    /// Catalog entry of this power.
    pub fn spec(self) -> PowerSpec {
        let (cost, arity) = match self {
            Power::EliminateAnswer => (10, 0),
            Power::DelayedStrike => (15, 0),
            Power::Revive => (25, 1),
            Power::SplitHeal => (20, 2),
            Power::TripleEmpower => (30, 3),
            Power::GroupDivination => (20, 0),
        };
        PowerSpec { cost, arity }
    }

    /// Wire name of this power.
    pub fn name(self) -> &'static str {
        match self {
            Power::EliminateAnswer => "eliminate_answer",
            Power::DelayedStrike => "delayed_strike",
            Power::Revive => "revive",
            Power::SplitHeal => "split_heal",
            Power::TripleEmpower => "triple_empower",
            Power::GroupDivination => "group_divination",
        }
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ephemeral activation request, consumed by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationRequest {
    /// Participant casting the power.
    pub caster: ParticipantId,
    /// Requested power.
    pub power: Power,
    /// Cost the client believes it pays; informational only.
    pub declared_cost: Option<u32>,
    /// Targets, in the order given by the client.
    pub targets: Vec<ParticipantId>,
}

/// Everything a handler needs besides the draft.
pub struct PowerContext<'a> {
    /// Evaluation time.
    pub now: SystemTime,
    /// Rules in effect.
    pub rules: &'a BattleRules,
    /// Randomness source.
    pub dice: &'a mut dyn Dice,
}

impl PowerContext<'_> {
    fn notice_expiry(&self) -> SystemTime {
        self.now + self.rules.notice_display
    }
}

/// Validate and apply an activation to `draft`.
///
/// Effects are all-or-nothing: on rejection the draft is left as it was, except that a
/// [`Rejection::UseCapExceeded`] leaves a notice addressed to the caster.
pub fn activate(
    draft: &mut BattleDraft,
    request: &ActivationRequest,
    ctx: &mut PowerContext<'_>,
) -> Result<(), Rejection> {
    let mut scratch = draft.clone();
    match apply_activation(&mut scratch, request, ctx) {
        Ok(()) => {
            *draft = scratch;
            Ok(())
        }
        Err(rejection) => {
            if matches!(rejection, Rejection::UseCapExceeded { .. }) {
                let expiry = ctx.notice_expiry();
                draft.session.push_notice(
                    NoticeKind::Rejected,
                    format!("{} cannot be used again in this battle", request.power),
                    Some(request.caster),
                    expiry,
                );
            }
            Err(rejection)
        }
    }
}

fn apply_activation(
    draft: &mut BattleDraft,
    request: &ActivationRequest,
    ctx: &mut PowerContext<'_>,
) -> Result<(), Rejection> {
    let session = &draft.session;
    if !session.submissions_open(ctx.now) {
        return Err(Rejection::PhaseViolation {
            phase: session.phase,
        });
    }

    let caster = request.caster;
    let standing = session.includes(&caster)
        && draft.participant(&caster).is_some_and(|p| !p.is_fallen());
    if !standing {
        return Err(Rejection::InvalidTargetState(
            "caster must be a living participant of this battle".into(),
        ));
    }

    if session.activation_of(&caster).is_some() {
        return Err(Rejection::AlreadyActedThisRound);
    }

    let spec = request.power.spec();
    if let Some(declared) = request.declared_cost {
        if declared != spec.cost {
            debug!(
                participant_id = %caster,
                power = %request.power,
                declared,
                cost = spec.cost,
                "declared cost differs from catalog; using catalog cost"
            );
        }
    }

    let available = draft.participant(&caster).map_or(0, |p| p.mana);
    if available < spec.cost {
        return Err(Rejection::InsufficientResource {
            required: spec.cost,
            available,
        });
    }

    if request.targets.len() != spec.arity {
        return Err(Rejection::InvalidTargetState(format!(
            "{} takes {} target(s), got {}",
            request.power,
            spec.arity,
            request.targets.len()
        )));
    }
    let distinct: BTreeSet<_> = request.targets.iter().collect();
    if distinct.len() != request.targets.len() {
        return Err(Rejection::InvalidTargetState("targets must be distinct".into()));
    }
    if let Some(stranger) = request.targets.iter().find(|t| !draft.session.includes(t)) {
        return Err(Rejection::InvalidTargetState(format!(
            "{stranger} is not part of this battle"
        )));
    }

    let message = match request.power {
        Power::EliminateAnswer => eliminate_answer(draft, caster, ctx)?,
        Power::DelayedStrike => delayed_strike(draft, caster, ctx)?,
        Power::Revive => revive(draft, caster, &request.targets, ctx)?,
        Power::SplitHeal => split_heal(draft, caster, &request.targets, ctx)?,
        Power::TripleEmpower => triple_empower(draft, caster, &request.targets, ctx)?,
        Power::GroupDivination => group_divination(draft, caster, ctx)?,
    };

    if let Some(participant) = draft.participant_mut(&caster) {
        participant.mana -= spec.cost;
    }
    draft.session.activations_this_round.push(ActivationRecord {
        participant: caster,
        power: request.power,
    });
    let expiry = ctx.notice_expiry();
    let kind = match request.power {
        Power::GroupDivination => NoticeKind::VoteOpened,
        _ => NoticeKind::PowerUsed,
    };
    draft.session.push_notice(kind, message, None, expiry);

    if request.power == Power::GroupDivination {
        let complete = draft.session.vote.as_ref().is_some_and(VoteState::is_complete);
        if complete {
            settle_vote(&mut draft.session, expiry);
        }
    }
    Ok(())
}

fn require_living(draft: &BattleDraft, targets: &[ParticipantId]) -> Result<(), Rejection> {
    match targets
        .iter()
        .find(|t| draft.participant(t).is_none_or(|p| p.is_fallen()))
    {
        Some(fallen) => Err(Rejection::InvalidTargetState(format!(
            "{} has fallen",
            draft.display_name(fallen)
        ))),
        None => Ok(()),
    }
}

fn eliminate_answer(
    draft: &mut BattleDraft,
    caster: ParticipantId,
    ctx: &mut PowerContext<'_>,
) -> Result<String, Rejection> {
    let question = draft
        .current_question()
        .ok_or_else(|| Rejection::InvalidTargetState("no question is being asked".into()))?;
    let visible_wrong: Vec<usize> = (0..question.answers.len())
        .filter(|index| *index != question.correct_index)
        .filter(|index| !draft.session.removed_answers.contains(index))
        .collect();
    if visible_wrong.is_empty() {
        return Err(Rejection::InvalidTargetState(
            "no incorrect answer is left to remove".into(),
        ));
    }

    let removed = visible_wrong[ctx.dice.pick(visible_wrong.len())];
    draft.session.removed_answers.push(removed);
    Ok(format!(
        "{} removed an incorrect answer",
        draft.display_name(&caster)
    ))
}

fn delayed_strike(
    draft: &mut BattleDraft,
    caster: ParticipantId,
    ctx: &mut PowerContext<'_>,
) -> Result<String, Rejection> {
    let level = draft.participant(&caster).map_or(0, |p| p.level);
    let damage = ctx.dice.roll(2, 6) + level;
    draft.session.queued_effects.push(QueuedEffect {
        caster,
        damage,
        round: draft.session.current_round_index,
    });
    Ok(format!(
        "{} readies a delayed strike",
        draft.display_name(&caster)
    ))
}

fn revive(
    draft: &mut BattleDraft,
    caster: ParticipantId,
    targets: &[ParticipantId],
    ctx: &mut PowerContext<'_>,
) -> Result<String, Rejection> {
    let target = targets[0];
    let max_health = match draft.participant(&target) {
        Some(p) if p.is_fallen() => p.max_health,
        Some(_) => {
            return Err(Rejection::InvalidTargetState(format!(
                "{} has not fallen",
                draft.display_name(&target)
            )));
        }
        None => {
            return Err(Rejection::InvalidTargetState(format!(
                "{target} has no participant record"
            )));
        }
    };

    let health = (u64::from(max_health) * u64::from(ctx.rules.revive_percent)).div_ceil(100);
    draft.revive_participant(&target, u32::try_from(health).unwrap_or(max_health));
    Ok(format!(
        "{} revived {}",
        draft.display_name(&caster),
        draft.display_name(&target)
    ))
}

fn split_heal(
    draft: &mut BattleDraft,
    caster: ParticipantId,
    targets: &[ParticipantId],
    ctx: &mut PowerContext<'_>,
) -> Result<String, Rejection> {
    require_living(draft, targets)?;
    let level = draft.participant(&caster).map_or(0, |p| p.level);
    let pool = ctx.dice.roll(2, 4) + level;

    let half = (pool.saturating_sub(1) / 2) as usize;
    let minor = if half == 0 {
        0
    } else {
        1 + ctx.dice.pick(half) as u32
    };
    let major = pool - minor;
    let major_index = ctx.dice.pick(2);

    let mut healed = [0u32; 2];
    for (index, target) in targets.iter().enumerate() {
        let share = if index == major_index { major } else { minor };
        if let Some(participant) = draft.participant_mut(target) {
            healed[index] = participant.heal(share);
        }
    }

    Ok(format!(
        "{} healed {} for {} and {} for {}",
        draft.display_name(&caster),
        draft.display_name(&targets[0]),
        healed[0],
        draft.display_name(&targets[1]),
        healed[1]
    ))
}

fn triple_empower(
    draft: &mut BattleDraft,
    caster: ParticipantId,
    targets: &[ParticipantId],
    ctx: &mut PowerContext<'_>,
) -> Result<String, Rejection> {
    require_living(draft, targets)?;
    let level = draft.participant(&caster).map_or(0, |p| p.level);
    let pool = ctx.dice.roll(1, 6) + level;

    let count = targets.len();
    let base = pool / count as u32;
    let remainder = pool as usize % count;
    let mut order: Vec<usize> = (0..count).collect();
    for i in 0..remainder {
        let j = i + ctx.dice.pick(count - i);
        order.swap(i, j);
    }

    let mut bonuses = vec![base; count];
    for index in &order[..remainder] {
        bonuses[*index] += 1;
    }

    for (target, bonus) in targets.iter().zip(&bonuses) {
        if let Some(participant) = draft.participant_mut(target) {
            participant.max_health = participant.max_health.saturating_add(*bonus);
            participant.health = participant.health.saturating_add(*bonus);
        }
        draft.session.empowered.insert(*target);
    }

    Ok(format!(
        "{} empowered {} allies for {} total health",
        draft.display_name(&caster),
        count,
        pool
    ))
}

fn group_divination(
    draft: &mut BattleDraft,
    caster: ParticipantId,
    ctx: &mut PowerContext<'_>,
) -> Result<String, Rejection> {
    let cap = ctx.rules.divination_cap;
    if draft.session.divination_uses >= cap {
        return Err(Rejection::UseCapExceeded { cap });
    }
    if draft.session.vote.is_some() {
        return Err(Rejection::InvalidTargetState(
            "a divination vote is already open".into(),
        ));
    }

    let level = draft.participant(&caster).map_or(0, |p| p.level);
    let damage = ctx.dice.roll(1, 4) + level;
    let eligible = draft.living().count() as u32;

    let session = &mut draft.session;
    session.divination_uses += 1;
    session.counters.record(0, damage);
    session.power_damage_this_round = session.power_damage_this_round.saturating_add(damage);
    session.boss_health = session.boss_health.saturating_sub(damage);
    session.vote = Some(VoteState {
        caster,
        yes: BTreeSet::from([caster]),
        no: BTreeSet::new(),
        deadline: ctx.now + ctx.rules.vote_window,
        eligible,
        round: session.current_round_index,
    });

    Ok(format!(
        "{} divined {} damage and calls a vote to skip the base damage",
        draft.display_name(&caster),
        damage
    ))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::state::{
        battle::{Participant, fixtures::*},
        dice::ScriptedDice,
        state_machine::{CloseReason, SessionEvent, SessionPhase},
    };

    fn run(
        draft: &mut BattleDraft,
        request: ActivationRequest,
        dice: &mut ScriptedDice,
    ) -> Result<(), Rejection> {
        let rules = BattleRules::default();
        let mut ctx = PowerContext {
            now: at(10),
            rules: &rules,
            dice,
        };
        activate(draft, &request, &mut ctx)
    }

    fn cast(caster: &Participant, power: Power, targets: Vec<Uuid>) -> ActivationRequest {
        ActivationRequest {
            caster: caster.id,
            power,
            declared_cost: None,
            targets,
        }
    }

    const CATALOG: [Power; 6] = [
        Power::EliminateAnswer,
        Power::DelayedStrike,
        Power::Revive,
        Power::SplitHeal,
        Power::TripleEmpower,
        Power::GroupDivination,
    ];

    #[test]
    fn catalog_costs_and_arity() {
        let costs: Vec<_> = CATALOG.iter().map(|p| p.spec().cost).collect();
        assert_eq!(costs, vec![10, 15, 25, 20, 30, 20]);
        assert_eq!(Power::TripleEmpower.spec().arity, 3);
        assert_eq!(
            serde_json::to_string(&Power::GroupDivination).unwrap(),
            format!("\"{}\"", Power::GroupDivination.name())
        );
    }

    #[test]
    fn delayed_strike_queues_level_plus_roll() {
        let a = participant("A", 4, 10, 50);
        let mut draft = in_progress(vec![a.clone()], template(2, 1));

        run(&mut draft, cast(&a, Power::DelayedStrike, vec![]), &mut ScriptedDice::new([7], [])).unwrap();

        assert_eq!(draft.session.queued_effects[0].damage, 11);
        assert_eq!(draft.participant(&a.id).unwrap().mana, 35);
        assert_eq!(draft.session.activation_of(&a.id).unwrap().power, Power::DelayedStrike);
        assert_eq!(draft.session.notices.len(), 1);
        assert_eq!(draft.session.notices[0].expires_at, at(15));
    }

    #[test]
    fn revive_restores_ten_percent_rounded_up() {
        let c = participant("C", 1, 10, 50);
        let mut b = participant("B", 1, 0, 0);
        b.max_health = 25;
        let mut draft = in_progress(vec![c.clone(), b.clone()], template(2, 1));
        assert!(draft.session.defeated.contains(&b.id));

        run(&mut draft, cast(&c, Power::Revive, vec![b.id]), &mut ScriptedDice::default()).unwrap();

        assert_eq!(draft.participant(&b.id).unwrap().health, 3);
        assert!(!draft.session.defeated.contains(&b.id));
    }

    #[test]
    fn revive_of_huge_health_pool_does_not_overflow() {
        let c = participant("C", 1, 10, 50);
        let mut b = participant("B", 1, 0, 0);
        b.max_health = 1_000_000_000;
        let mut draft = in_progress(vec![c.clone(), b.clone()], template(2, 1));

        run(&mut draft, cast(&c, Power::Revive, vec![b.id]), &mut ScriptedDice::default()).unwrap();

        assert_eq!(draft.participant(&b.id).unwrap().health, 100_000_000);
    }

    #[test]
    fn empower_saturates_at_the_health_ceiling() {
        let c = participant("C", 2, 30, 100);
        let mut targets: Vec<_> = (0..3).map(|i| participant(&format!("t{i}"), 1, 10, 0)).collect();
        targets[0].max_health = u32::MAX;
        targets[0].health = u32::MAX - 1;
        let ids: Vec<_> = targets.iter().map(|t| t.id).collect();
        let mut roster = vec![c.clone()];
        roster.extend(targets);
        let mut draft = in_progress(roster, template(2, 1));

        run(&mut draft, cast(&c, Power::TripleEmpower, ids.clone()), &mut ScriptedDice::new([6], [2, 0])).unwrap();

        let giant = draft.participant(&ids[0]).unwrap();
        assert_eq!(giant.max_health, u32::MAX);
        assert_eq!(giant.health, u32::MAX);
    }

    #[test]
    fn revive_rejects_living_target() {
        let c = participant("C", 1, 10, 50);
        let b = participant("B", 1, 10, 0);
        let mut draft = in_progress(vec![c.clone(), b.clone()], template(2, 1));
        let before = draft.clone();

        let err = run(&mut draft, cast(&c, Power::Revive, vec![b.id]), &mut ScriptedDice::default()).unwrap_err();

        assert!(matches!(err, Rejection::InvalidTargetState(_)));
        assert_eq!(draft, before);
    }

    #[test]
    fn second_power_in_round_is_rejected_and_first_remains() {
        let d = participant("D", 2, 10, 100);
        let mut draft = in_progress(vec![d.clone()], template(2, 1));
        run(&mut draft, cast(&d, Power::DelayedStrike, vec![]), &mut ScriptedDice::new([6], [])).unwrap();

        let err = run(&mut draft, cast(&d, Power::EliminateAnswer, vec![]), &mut ScriptedDice::default()).unwrap_err();

        assert_eq!(err, Rejection::AlreadyActedThisRound);
        assert_eq!(draft.session.queued_effects.len(), 1);
        assert!(draft.session.removed_answers.is_empty());
        assert_eq!(draft.participant(&d.id).unwrap().mana, 85);
    }

    #[test]
    fn insufficient_mana_mutates_nothing() {
        let poor = participant("P", 1, 10, 9);
        let mut draft = in_progress(vec![poor.clone()], template(2, 1));
        let before = draft.clone();

        let err = run(&mut draft, cast(&poor, Power::EliminateAnswer, vec![]), &mut ScriptedDice::default()).unwrap_err();

        assert_eq!(err, Rejection::InsufficientResource { required: 10, available: 9 });
        assert_eq!(draft, before);
    }

    #[test]
    fn arity_and_distinct_targets_are_enforced() {
        let c = participant("C", 1, 10, 100);
        let t = participant("T", 1, 10, 0);
        let mut draft = in_progress(vec![c.clone(), t.clone()], template(2, 1));

        let wrong_count = run(&mut draft, cast(&c, Power::SplitHeal, vec![t.id]), &mut ScriptedDice::default());
        let duplicate = run(&mut draft, cast(&c, Power::SplitHeal, vec![t.id, t.id]), &mut ScriptedDice::default());
        let stranger = run(&mut draft, cast(&c, Power::SplitHeal, vec![t.id, Uuid::new_v4()]), &mut ScriptedDice::default());

        for result in [wrong_count, duplicate, stranger] {
            assert!(matches!(result, Err(Rejection::InvalidTargetState(_))));
        }
        assert!(draft.session.activations_this_round.is_empty());
    }

    #[test]
    fn activation_outside_open_round_is_a_phase_violation() {
        let c = participant("C", 1, 10, 100);
        let mut draft = in_progress(vec![c.clone()], template(2, 1));
        draft.session.apply(SessionEvent::CloseRound(CloseReason::Forced)).unwrap();

        let err = run(&mut draft, cast(&c, Power::DelayedStrike, vec![]), &mut ScriptedDice::default()).unwrap_err();

        assert_eq!(err, Rejection::PhaseViolation { phase: SessionPhase::RoundEnding });
    }

    #[test]
    fn fallen_caster_cannot_act() {
        let fallen = participant("F", 1, 0, 100);
        let other = participant("O", 1, 10, 100);
        let mut draft = in_progress(vec![fallen.clone(), other], template(2, 1));

        let err = run(&mut draft, cast(&fallen, Power::DelayedStrike, vec![]), &mut ScriptedDice::default()).unwrap_err();

        assert!(matches!(err, Rejection::InvalidTargetState(_)));
    }

    #[test]
    fn split_heal_is_uneven_and_capped() {
        let c = participant("C", 1, 30, 100);
        let mut low = participant("L", 1, 10, 0);
        low.max_health = 30;
        let mut high = participant("H", 1, 29, 0);
        high.max_health = 30;
        let mut draft = in_progress(vec![c.clone(), low.clone(), high.clone()], template(2, 1));

        // pool 6 + 1 = 7: minor = 1 + pick(3) = 3, major = 4 goes to target index 1.
        run(
            &mut draft,
            cast(&c, Power::SplitHeal, vec![low.id, high.id]),
            &mut ScriptedDice::new([6], [2, 1]),
        )
        .unwrap();

        assert_eq!(draft.participant(&low.id).unwrap().health, 13);
        assert_eq!(draft.participant(&high.id).unwrap().health, 30);
    }

    #[test]
    fn split_heal_rejects_fallen_target() {
        let c = participant("C", 1, 30, 100);
        let fallen = participant("F", 1, 0, 0);
        let other = participant("O", 1, 5, 0);
        let mut draft = in_progress(vec![c.clone(), fallen.clone(), other.clone()], template(2, 1));

        let err = run(&mut draft, cast(&c, Power::SplitHeal, vec![fallen.id, other.id]), &mut ScriptedDice::default()).unwrap_err();

        assert!(matches!(err, Rejection::InvalidTargetState(_)));
    }

    #[test]
    fn triple_empower_spreads_remainder_to_distinct_targets() {
        let c = participant("C", 2, 30, 100);
        let targets: Vec<_> = (0..3).map(|i| participant(&format!("t{i}"), 1, 10, 0)).collect();
        let ids: Vec<_> = targets.iter().map(|t| t.id).collect();
        let mut roster = vec![c.clone()];
        roster.extend(targets);
        let mut draft = in_progress(roster, template(2, 1));

        // pool 6 + 2 = 8: base 2 each, remainder 2 to distinct recipients.
        run(&mut draft, cast(&c, Power::TripleEmpower, ids.clone()), &mut ScriptedDice::new([6], [2, 0])).unwrap();

        let bonuses: Vec<u32> = ids
            .iter()
            .map(|id| draft.participant(id).unwrap().max_health - 30)
            .collect();
        assert_eq!(bonuses.iter().sum::<u32>(), 8);
        assert_eq!(bonuses.iter().filter(|b| **b == 3).count(), 2);
        assert_eq!(bonuses.iter().filter(|b| **b == 2).count(), 1);
        for id in &ids {
            let p = draft.participant(id).unwrap();
            assert_eq!(p.health, 10 + (p.max_health - 30));
            assert!(draft.session.empowered.contains(id));
        }
    }

    #[test]
    fn eliminate_answer_removes_visible_incorrect_options_until_none_remain() {
        let casters: Vec<_> = (0..4).map(|i| participant(&format!("c{i}"), 1, 10, 100)).collect();
        let mut draft = in_progress(casters.clone(), template(2, 1));

        for caster in &casters[..3] {
            run(&mut draft, cast(caster, Power::EliminateAnswer, vec![]), &mut ScriptedDice::default()).unwrap();
        }
        let mut removed = draft.session.removed_answers.clone();
        removed.sort();
        assert_eq!(removed, vec![0, 2, 3]);

        let err = run(&mut draft, cast(&casters[3], Power::EliminateAnswer, vec![]), &mut ScriptedDice::default()).unwrap_err();
        assert!(matches!(err, Rejection::InvalidTargetState(_)));
        assert_eq!(draft.participant(&casters[3].id).unwrap().mana, 100);
    }

    #[test]
    fn divination_deals_damage_and_opens_vote() {
        let roster: Vec<_> = (0..3).map(|i| participant(&format!("p{i}"), 3, 10, 100)).collect();
        let mut draft = in_progress(roster.clone(), template(2, 1));

        run(&mut draft, cast(&roster[0], Power::GroupDivination, vec![]), &mut ScriptedDice::new([2], [])).unwrap();

        let session = &draft.session;
        assert_eq!(session.counters.power(), 5);
        assert_eq!(session.counters.total(), 5);
        assert_eq!(session.boss_health, 95);
        let vote = session.vote.as_ref().unwrap();
        assert!(vote.yes.contains(&roster[0].id));
        assert_eq!(vote.eligible, 3);
        assert_eq!(vote.deadline, at(20));
        assert_eq!(session.notices.last().unwrap().kind, NoticeKind::VoteOpened);
    }

    #[test]
    fn third_divination_is_rejected_with_targeted_notice() {
        let roster: Vec<_> = (0..3).map(|i| participant(&format!("p{i}"), 1, 10, 100)).collect();
        let mut draft = in_progress(roster.clone(), template(3, 1));

        for caster in &roster[..2] {
            run(&mut draft, cast(caster, Power::GroupDivination, vec![]), &mut ScriptedDice::default()).unwrap();
            draft.session.vote = None;
        }
        let notices_before = draft.session.notices.len();

        let err = run(&mut draft, cast(&roster[2], Power::GroupDivination, vec![]), &mut ScriptedDice::default()).unwrap_err();

        assert_eq!(err, Rejection::UseCapExceeded { cap: 2 });
        assert_eq!(draft.session.divination_uses, 2);
        assert_eq!(draft.participant(&roster[2].id).unwrap().mana, 100);
        assert!(draft.session.activation_of(&roster[2].id).is_none());
        assert_eq!(draft.session.notices.len(), notices_before + 1);
        let notice = draft.session.notices.last().unwrap();
        assert_eq!(notice.kind, NoticeKind::Rejected);
        assert_eq!(notice.recipient, Some(roster[2].id));
    }

    #[test]
    fn lone_divination_settles_its_vote_at_once() {
        let solo = participant("S", 1, 10, 100);
        let mut draft = in_progress(vec![solo.clone()], template(2, 1));

        run(&mut draft, cast(&solo, Power::GroupDivination, vec![]), &mut ScriptedDice::default()).unwrap();

        assert!(draft.session.vote.is_none());
        assert!(draft.session.skip_base_damage);
    }
}
