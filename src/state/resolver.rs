//! Round resolution: turns the answers, strikes and votes of a closed round into damage.

use std::time::SystemTime;

use tracing::debug;

use crate::state::{
    battle::{BattleDraft, BattleSession, NoticeKind, RoundBreakdown},
    rejection::Rejection,
    state_machine::{SessionEvent, SessionPhase},
};

/// Close the pending vote, if any. Returns whether it passed.
///
/// A passed vote only skips the base damage of the round it was opened in.
pub fn settle_vote(session: &mut BattleSession, expires_at: SystemTime) -> Option<bool> {
    let vote = session.vote.take()?;
    let passed = vote.passed();
    if passed && vote.round == session.current_round_index {
        session.skip_base_damage = true;
    }

    let message = if passed {
        format!(
            "The divination vote passed ({} of {}): base damage is skipped this round",
            vote.yes.len(),
            vote.eligible
        )
    } else {
        format!(
            "The divination vote failed ({} of {})",
            vote.yes.len(),
            vote.eligible
        )
    };
    session.push_notice(NoticeKind::VoteResolved, message, None, expires_at);
    Some(passed)
}

/// Resolve `round` from `RoundEnding` and move the session to `ShowingResults`.
///
/// Resolving a round twice, or a round other than the current one, is rejected with
/// [`Rejection::StaleRoundResolution`] and leaves the draft untouched.
pub fn resolve_round(
    draft: &mut BattleDraft,
    round: u32,
    notice_expiry: SystemTime,
) -> Result<RoundBreakdown, Rejection> {
    if draft.session.last_resolved_round == Some(round) || round != draft.session.current_round_index {
        return Err(Rejection::StaleRoundResolution { round });
    }
    if draft.session.phase != SessionPhase::RoundEnding {
        return Err(Rejection::PhaseViolation {
            phase: draft.session.phase,
        });
    }

    settle_vote(&mut draft.session, notice_expiry);
    let incorrect_damage = draft.current_question().map_or(0, |question| question.damage);

    let (correct, incorrect): (Vec<_>, Vec<_>) = draft
        .session
        .answers_this_round
        .iter()
        .partition(|answer| answer.correct);
    let correct: Vec<_> = correct.into_iter().map(|answer| answer.participant).collect();
    let incorrect: Vec<_> = incorrect.into_iter().map(|answer| answer.participant).collect();

    let base_skipped = draft.session.skip_base_damage;
    let base_damage = if base_skipped { 0 } else { correct.len() as u32 };

    let mut newly_defeated = Vec::new();
    for participant in &incorrect {
        if draft.damage_participant(participant, incorrect_damage) {
            newly_defeated.push(*participant);
        }
    }

    let mut strike_damage = 0u32;
    let queued = std::mem::take(&mut draft.session.queued_effects);
    for effect in queued {
        let name = draft.display_name(&effect.caster);
        if correct.contains(&effect.caster) {
            strike_damage = strike_damage.saturating_add(effect.damage);
            draft.session.push_notice(
                NoticeKind::StrikeLanded,
                format!("{name}'s delayed strike struck true for {} damage", effect.damage),
                None,
                notice_expiry,
            );
        } else {
            draft.session.push_notice(
                NoticeKind::StrikeFizzled,
                format!("{name}'s delayed strike fizzled"),
                None,
                notice_expiry,
            );
        }
    }

    let session = &mut draft.session;
    session.counters.record(base_damage, strike_damage);
    session.boss_health = session
        .boss_health
        .saturating_sub(base_damage.saturating_add(strike_damage));

    let power_damage = session.power_damage_this_round.saturating_add(strike_damage);
    let breakdown = RoundBreakdown {
        round,
        base_damage,
        power_damage,
        total_damage: base_damage.saturating_add(power_damage),
        base_skipped,
        correct,
        incorrect,
        newly_defeated,
    };

    session.clear_round_state();
    session.last_round = Some(breakdown.clone());
    session.last_resolved_round = Some(round);
    session
        .apply(SessionEvent::ResultsCommitted)
        .map_err(|err| Rejection::PhaseViolation { phase: err.from })?;

    debug!(
        session_id = %session.id,
        round,
        base = breakdown.base_damage,
        power = breakdown.power_damage,
        "round resolved"
    );
    Ok(breakdown)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use uuid::Uuid;

    use super::*;
    use crate::state::{
        battle::{QueuedEffect, RoundAnswer, VoteState, fixtures::*},
        state_machine::CloseReason,
    };

    fn answer(draft: &mut BattleDraft, participant: Uuid, correct: bool) {
        draft.session.answers_this_round.push(RoundAnswer {
            participant,
            choice: if correct { 1 } else { 0 },
            correct,
            submitted_at: at(10),
        });
    }

    fn close(draft: &mut BattleDraft) {
        draft
            .session
            .apply(SessionEvent::CloseRound(CloseReason::Forced))
            .unwrap();
    }

    #[test]
    fn three_correct_one_incorrect() {
        let roster: Vec<_> = (0..4)
            .map(|i| participant(&format!("p{i}"), 1, 10, 0))
            .collect();
        let ids: Vec<_> = roster.iter().map(|p| p.id).collect();
        let mut draft = in_progress(roster, template(3, 3));
        for id in &ids[..3] {
            answer(&mut draft, *id, true);
        }
        answer(&mut draft, ids[3], false);
        close(&mut draft);

        let breakdown = resolve_round(&mut draft, 0, at(200)).unwrap();

        assert_eq!(breakdown.base_damage, 3);
        assert_eq!(breakdown.incorrect, vec![ids[3]]);
        assert_eq!(draft.participant(&ids[3]).unwrap().health, 7);
        assert_eq!(draft.participant(&ids[0]).unwrap().health, 10);
        assert_eq!(draft.session.counters.total(), 3);
        assert_eq!(draft.session.boss_health, 97);
        assert_eq!(draft.session.phase, SessionPhase::ShowingResults);
    }

    #[test]
    fn incorrect_damage_floors_at_zero_and_defeats() {
        let weak = participant("weak", 1, 2, 0);
        let id = weak.id;
        let mut draft = in_progress(vec![weak], template(2, 3));
        answer(&mut draft, id, false);
        close(&mut draft);

        let breakdown = resolve_round(&mut draft, 0, at(200)).unwrap();

        assert_eq!(draft.participant(&id).unwrap().health, 0);
        assert!(draft.session.defeated.contains(&id));
        assert_eq!(breakdown.newly_defeated, vec![id]);
    }

    #[test]
    fn strike_lands_only_for_correct_casters() {
        let lander = participant("A", 4, 10, 0);
        let misser = participant("B", 4, 10, 0);
        let (a, b) = (lander.id, misser.id);
        let mut draft = in_progress(vec![lander, misser], template(2, 1));
        draft.session.queued_effects = vec![
            QueuedEffect { caster: a, damage: 11, round: 0 },
            QueuedEffect { caster: b, damage: 9, round: 0 },
        ];
        answer(&mut draft, a, true);
        answer(&mut draft, b, false);
        close(&mut draft);

        let breakdown = resolve_round(&mut draft, 0, at(200)).unwrap();

        assert_eq!(breakdown.power_damage, 11);
        assert_eq!(breakdown.total_damage, breakdown.base_damage + 11);
        assert!(draft.session.queued_effects.is_empty());
        let kinds: Vec<_> = draft.session.notices.iter().map(|n| n.kind).collect();
        assert!(kinds.contains(&NoticeKind::StrikeLanded));
        assert!(kinds.contains(&NoticeKind::StrikeFizzled));
        assert_eq!(
            draft.session.counters.total(),
            draft.session.counters.base() + draft.session.counters.power()
        );
    }

    #[test]
    fn resolving_twice_is_stale_and_changes_nothing() {
        let hero = participant("A", 1, 10, 0);
        let id = hero.id;
        let mut draft = in_progress(vec![hero], template(2, 1));
        answer(&mut draft, id, true);
        close(&mut draft);
        resolve_round(&mut draft, 0, at(200)).unwrap();
        let snapshot = draft.clone();

        let err = resolve_round(&mut draft, 0, at(300)).unwrap_err();

        assert_eq!(err, Rejection::StaleRoundResolution { round: 0 });
        assert_eq!(draft, snapshot);
    }

    #[test]
    fn resolution_requires_round_ending() {
        let mut draft = in_progress(vec![participant("A", 1, 10, 0)], template(2, 1));
        let err = resolve_round(&mut draft, 0, at(200)).unwrap_err();
        assert_eq!(
            err,
            Rejection::PhaseViolation {
                phase: SessionPhase::InProgress
            }
        );
    }

    #[test]
    fn passed_vote_skips_base_damage_only() {
        let roster: Vec<_> = (0..3).map(|i| participant(&format!("p{i}"), 1, 10, 0)).collect();
        let ids: Vec<_> = roster.iter().map(|p| p.id).collect();
        let mut draft = in_progress(roster, template(2, 1));
        draft.session.power_damage_this_round = 4;
        draft.session.counters.record(0, 4);
        draft.session.vote = Some(VoteState {
            caster: ids[0],
            yes: BTreeSet::from([ids[0], ids[1]]),
            no: BTreeSet::new(),
            deadline: at(50),
            eligible: 3,
            round: 0,
        });
        for id in &ids {
            answer(&mut draft, *id, true);
        }
        close(&mut draft);

        let breakdown = resolve_round(&mut draft, 0, at(200)).unwrap();

        assert!(breakdown.base_skipped);
        assert_eq!(breakdown.base_damage, 0);
        assert_eq!(breakdown.power_damage, 4);
        assert_eq!(breakdown.total_damage, 4);
        assert!(draft.session.vote.is_none());
        assert!(!draft.session.skip_base_damage);
        assert_eq!(draft.session.counters.total(), 4);
    }

    #[test]
    fn failed_vote_keeps_base_damage() {
        let caster = Uuid::new_v4();
        let mut draft = in_progress(vec![participant("A", 1, 10, 0)], template(2, 1));
        draft.session.vote = Some(VoteState {
            caster,
            yes: BTreeSet::from([caster]),
            no: BTreeSet::from([Uuid::new_v4()]),
            deadline: at(50),
            eligible: 2,
            round: 0,
        });

        assert_eq!(settle_vote(&mut draft.session, at(60)), Some(false));
        assert!(!draft.session.skip_base_damage);
        assert_eq!(settle_vote(&mut draft.session, at(60)), None);
    }
}
