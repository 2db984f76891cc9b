use std::{collections::BTreeSet, sync::Arc, time::SystemTime};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    powers::Power,
    state_machine::{InvalidTransition, SessionEvent, SessionPhase},
};

/// Identifier of a participant as issued by the roster subsystem.
pub type ParticipantId = Uuid;

/// Resource sheet of a participant, owned by the roster and mutated only through commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Roster identifier.
    pub id: ParticipantId,
    /// Display name used in notices.
    pub name: String,
    /// Level, used to scale power effects.
    pub level: u32,
    /// Current health, never above `max_health`.
    pub health: u32,
    /// Health ceiling.
    pub max_health: u32,
    /// Current mana, never above `max_mana`.
    pub mana: u32,
    /// Mana ceiling.
    pub max_mana: u32,
}

impl Participant {
    /// A participant at zero health is fallen and needs a revival to act again.
    pub fn is_fallen(&self) -> bool {
        self.health == 0
    }

    /// Apply damage floored at zero. Returns `true` when this hit made the participant fall.
    pub fn take_damage(&mut self, amount: u32) -> bool {
        let was_standing = self.health > 0;
        self.health = self.health.saturating_sub(amount);
        was_standing && self.health == 0
    }

    /// Restore health up to the ceiling, returning the amount actually applied.
    pub fn heal(&mut self, amount: u32) -> u32 {
        let before = self.health;
        self.health = self.health.saturating_add(amount).min(self.max_health);
        self.health - before
    }
}

/// One question of a battle template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Question text.
    pub prompt: String,
    /// Answer options, addressed by index.
    pub answers: Vec<String>,
    /// Index of the correct option inside `answers`.
    pub correct_index: usize,
    /// Health lost by every participant who answers incorrectly.
    pub damage: u32,
}

impl Question {
    /// Whether `choice` designates the correct option.
    pub fn is_correct(&self, choice: usize) -> bool {
        choice == self.correct_index
    }
}

/// Read-only battle definition: ordered questions and the shared boss pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleTemplate {
    /// Template identifier.
    pub id: Uuid,
    /// Display name of the battle.
    pub name: String,
    /// Health of the shared target the group damages.
    pub boss_health: u32,
    /// Questions asked in order, one per round.
    pub questions: Vec<Question>,
}

impl BattleTemplate {
    /// Question asked during round `index`, if the template has one.
    pub fn question(&self, index: u32) -> Option<&Question> {
        self.questions.get(index as usize)
    }

    /// Whether `index` designates the final question.
    pub fn is_last_round(&self, index: u32) -> bool {
        index as usize + 1 >= self.questions.len()
    }
}

/// Delayed strike waiting for the caster's answer to be graded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedEffect {
    /// Participant who cast the strike.
    pub caster: ParticipantId,
    /// Damage dealt if the caster answers correctly.
    pub damage: u32,
    /// Round the strike was queued in.
    pub round: u32,
}

/// The single power a participant used during the current round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    /// Caster.
    pub participant: ParticipantId,
    /// Power that consumed the caster's slot.
    pub power: Power,
}

/// Answer recorded for the current round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundAnswer {
    /// Participant who answered.
    pub participant: ParticipantId,
    /// Chosen option index.
    pub choice: usize,
    /// Graded at submission against the template.
    pub correct: bool,
    /// Submission time.
    pub submitted_at: SystemTime,
}

/// Pending group vote opened by a divination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteState {
    /// Participant who opened the vote.
    pub caster: ParticipantId,
    /// Participants who voted yes (the caster is pre-counted).
    pub yes: BTreeSet<ParticipantId>,
    /// Participants who voted no.
    pub no: BTreeSet<ParticipantId>,
    /// Votes received after this instant are ignored.
    pub deadline: SystemTime,
    /// Living participants when the vote opened.
    pub eligible: u32,
    /// Round the vote belongs to.
    pub round: u32,
}

impl VoteState {
    /// A strict majority of the eligible voters said yes.
    pub fn passed(&self) -> bool {
        self.yes.len() as u32 * 2 > self.eligible
    }

    /// Every eligible voter has cast a ballot.
    pub fn is_complete(&self) -> bool {
        (self.yes.len() + self.no.len()) as u32 >= self.eligible
    }

    /// Whether `participant` already voted.
    pub fn has_voted(&self, participant: &ParticipantId) -> bool {
        self.yes.contains(participant) || self.no.contains(participant)
    }
}

/// Category of a transient notice, used by clients to pick a presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// A power was cast.
    PowerUsed,
    /// A delayed strike landed at round close.
    StrikeLanded,
    /// A delayed strike fizzled because its caster answered incorrectly.
    StrikeFizzled,
    /// A group vote opened.
    VoteOpened,
    /// A group vote closed.
    VoteResolved,
    /// A request was refused; always targeted.
    Rejected,
}

/// Short-lived message attached to the session document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientNotice {
    /// Identifier used to clear the notice once its display window elapsed.
    pub id: Uuid,
    /// Presentation category.
    pub kind: NoticeKind,
    /// Human readable text.
    pub message: String,
    /// `None` for public notices, otherwise the only participant meant to see it.
    pub recipient: Option<ParticipantId>,
    /// Instant after which the notice is cleared.
    pub expires_at: SystemTime,
}

/// Running damage totals; `total == base + power` holds by construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageCounters {
    total: u32,
    base: u32,
    power: u32,
}

impl DamageCounters {
    /// Add base and power damage together.
    pub fn record(&mut self, base: u32, power: u32) {
        self.base = self.base.saturating_add(base);
        self.power = self.power.saturating_add(power);
        self.total = self.base.saturating_add(self.power);
    }

    /// Total damage dealt.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Damage from correct answers.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Damage from powers.
    pub fn power(&self) -> u32 {
        self.power
    }
}

/// Breakdown of a resolved round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoundBreakdown {
    /// Round index.
    pub round: u32,
    /// Damage from correct answers (zero when skipped by a vote).
    pub base_damage: u32,
    /// Damage from powers resolved this round, including divination damage.
    pub power_damage: u32,
    /// `base_damage + power_damage`.
    pub total_damage: u32,
    /// Whether a passed divination vote skipped the base damage.
    pub base_skipped: bool,
    /// Participants who answered correctly.
    #[schema(value_type = Vec<Uuid>)]
    pub correct: Vec<ParticipantId>,
    /// Participants who answered incorrectly.
    #[schema(value_type = Vec<Uuid>)]
    pub incorrect: Vec<ParticipantId>,
    /// Participants who fell this round.
    #[schema(value_type = Vec<Uuid>)]
    pub newly_defeated: Vec<ParticipantId>,
}

/// How a finished battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BattleOutcome {
    /// The boss pool reached zero.
    Victory,
    /// Every participant fell.
    Defeat,
    /// All questions were played without a decisive result.
    Completed,
    /// The owner abandoned the battle.
    Abandoned,
}

/// Shared session document of one live battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleSession {
    /// Session identifier.
    pub id: Uuid,
    /// Participant allowed to drive the lifecycle (start, close, advance, abandon).
    pub owner_id: Uuid,
    /// Template the questions come from.
    pub template_id: Uuid,
    /// Roster of the battle, in join order.
    pub participants: Vec<ParticipantId>,
    /// Current phase.
    pub phase: SessionPhase,
    /// Index of the round being played; never decreases.
    pub current_round_index: u32,
    /// Present only while a round is in progress.
    pub round_deadline: Option<SystemTime>,
    /// Delayed strikes resolved at round close.
    pub queued_effects: Vec<QueuedEffect>,
    /// At most one entry per participant.
    pub activations_this_round: Vec<ActivationRecord>,
    /// At most one entry per participant.
    pub answers_this_round: Vec<RoundAnswer>,
    /// Participants at zero health.
    pub defeated: BTreeSet<ParticipantId>,
    /// Participants carrying the empower buff.
    pub empowered: BTreeSet<ParticipantId>,
    /// Pending group vote.
    pub vote: Option<VoteState>,
    /// Set when a divination vote passed; zeroes the base damage of the current round.
    pub skip_base_damage: bool,
    /// Power damage already dealt during the current round (divinations).
    pub power_damage_this_round: u32,
    /// Transient notices currently on display.
    pub notices: Vec<TransientNotice>,
    /// Running damage totals.
    pub counters: DamageCounters,
    /// Breakdown of the most recently resolved round.
    pub last_round: Option<RoundBreakdown>,
    /// Highest round index already resolved.
    pub last_resolved_round: Option<u32>,
    /// Option indices eliminated from the current question.
    pub removed_answers: Vec<usize>,
    /// Successful group divination casts so far.
    pub divination_uses: u32,
    /// Remaining health of the shared boss.
    pub boss_health: u32,
    /// Starting health of the shared boss.
    pub boss_max_health: u32,
    /// Set once the session ended.
    pub outcome: Option<BattleOutcome>,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

impl BattleSession {
    /// Create a waiting session for `roster`, marking already fallen participants as defeated.
    pub fn new(owner_id: Uuid, template: &BattleTemplate, roster: &[Participant], now: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            template_id: template.id,
            participants: roster.iter().map(|p| p.id).collect(),
            phase: SessionPhase::Waiting,
            current_round_index: 0,
            round_deadline: None,
            queued_effects: Vec::new(),
            activations_this_round: Vec::new(),
            answers_this_round: Vec::new(),
            defeated: roster.iter().filter(|p| p.is_fallen()).map(|p| p.id).collect(),
            empowered: BTreeSet::new(),
            vote: None,
            skip_base_damage: false,
            power_damage_this_round: 0,
            notices: Vec::new(),
            counters: DamageCounters::default(),
            last_round: None,
            last_resolved_round: None,
            removed_answers: Vec::new(),
            divination_uses: 0,
            boss_health: template.boss_health,
            boss_max_health: template.boss_health,
            outcome: None,
            created_at: now,
        }
    }

    /// Apply a state machine event to the session phase.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = self.phase.next(event)?;
        self.phase = next;
        Ok(next)
    }

    /// Whether `participant` is on the session roster.
    pub fn includes(&self, participant: &ParticipantId) -> bool {
        self.participants.contains(participant)
    }

    /// The activation recorded for `participant` this round.
    pub fn activation_of(&self, participant: &ParticipantId) -> Option<&ActivationRecord> {
        self.activations_this_round
            .iter()
            .find(|record| record.participant == *participant)
    }

    /// The answer recorded for `participant` this round.
    pub fn answer_of(&self, participant: &ParticipantId) -> Option<&RoundAnswer> {
        self.answers_this_round
            .iter()
            .find(|answer| answer.participant == *participant)
    }

    /// Whether answers and activations are currently accepted.
    pub fn submissions_open(&self, now: SystemTime) -> bool {
        self.phase.accepts_submissions() && self.round_deadline.is_none_or(|deadline| now <= deadline)
    }

    /// Attach a notice and return its identifier.
    pub fn push_notice(
        &mut self,
        kind: NoticeKind,
        message: String,
        recipient: Option<ParticipantId>,
        expires_at: SystemTime,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.notices.push(TransientNotice {
            id,
            kind,
            message,
            recipient,
            expires_at,
        });
        id
    }

    /// Remove a notice, returning whether it was still present.
    pub fn clear_notice(&mut self, id: Uuid) -> bool {
        let before = self.notices.len();
        self.notices.retain(|notice| notice.id != id);
        self.notices.len() != before
    }

    /// Forget everything scoped to the current round.
    pub fn clear_round_state(&mut self) {
        self.round_deadline = None;
        self.queued_effects.clear();
        self.activations_this_round.clear();
        self.answers_this_round.clear();
        self.vote = None;
        self.skip_base_damage = false;
        self.power_damage_this_round = 0;
        self.removed_answers.clear();
    }
}

/// Working copy of a session and its roster, mutated by the engine and committed atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleDraft {
    /// Session document being edited.
    pub session: BattleSession,
    /// Roster resource sheets keyed by participant, in roster order.
    pub participants: IndexMap<ParticipantId, Participant>,
    /// Template backing the session.
    pub template: Arc<BattleTemplate>,
}

impl BattleDraft {
    /// Resource sheet of `id`, if it belongs to the roster.
    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(id)
    }

    /// Mutable resource sheet of `id`.
    pub fn participant_mut(&mut self, id: &ParticipantId) -> Option<&mut Participant> {
        self.participants.get_mut(id)
    }

    /// Name used in notices, falling back to the identifier.
    pub fn display_name(&self, id: &ParticipantId) -> String {
        self.participants
            .get(id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Question of the current round.
    pub fn current_question(&self) -> Option<&Question> {
        self.template.question(self.session.current_round_index)
    }

    /// Participants still standing, in roster order.
    pub fn living(&self) -> impl Iterator<Item = &Participant> {
        self.session
            .participants
            .iter()
            .filter_map(|id| self.participants.get(id))
            .filter(|p| !p.is_fallen())
    }

    /// Whether nobody on the roster is standing.
    pub fn all_defeated(&self) -> bool {
        self.living().next().is_none()
    }

    /// Damage a participant and keep the defeated set in sync. Returns `true` if they fell.
    pub fn damage_participant(&mut self, id: &ParticipantId, amount: u32) -> bool {
        let Some(participant) = self.participants.get_mut(id) else {
            return false;
        };
        let fell = participant.take_damage(amount);
        if participant.is_fallen() {
            self.session.defeated.insert(*id);
        }
        fell
    }

    /// Rebuild the defeated set from the resource sheets, which may change outside the battle.
    pub fn sync_defeated(&mut self) {
        for (id, participant) in &self.participants {
            if participant.is_fallen() {
                self.session.defeated.insert(*id);
            } else {
                self.session.defeated.remove(id);
            }
        }
    }

    /// Bring a fallen participant back to `health` and drop them from the defeated set.
    pub fn revive_participant(&mut self, id: &ParticipantId, health: u32) {
        if let Some(participant) = self.participants.get_mut(id) {
            participant.health = health.clamp(1, participant.max_health.max(1));
            self.session.defeated.remove(id);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn counters_keep_total_equal_to_base_plus_power() {
        let mut counters = DamageCounters::default();
        counters.record(3, 0);
        counters.record(0, 11);
        counters.record(2, 5);
        assert_eq!(counters.base(), 5);
        assert_eq!(counters.power(), 16);
        assert_eq!(counters.total(), counters.base() + counters.power());
    }

    #[test]
    fn damage_floors_at_zero_and_marks_defeat() {
        let hero = participant("Ada", 2, 2, 0);
        let id = hero.id;
        let mut draft = in_progress(vec![hero], template(1, 3));

        assert!(draft.damage_participant(&id, 3));
        assert_eq!(draft.participant(&id).unwrap().health, 0);
        assert!(draft.session.defeated.contains(&id));
        assert!(!draft.damage_participant(&id, 3));
        assert!(draft.all_defeated());
    }

    #[test]
    fn defeated_set_follows_resource_sheets() {
        let hurt = participant("Gil", 1, 5, 0);
        let fallen = participant("Hal", 1, 0, 0);
        let (hurt_id, fallen_id) = (hurt.id, fallen.id);
        let mut draft = in_progress(vec![hurt, fallen], template(1, 1));

        draft.participant_mut(&hurt_id).unwrap().health = 0;
        draft.participant_mut(&fallen_id).unwrap().health = 12;
        draft.sync_defeated();

        assert_eq!(draft.session.defeated, BTreeSet::from([hurt_id]));
    }

    #[test]
    fn heal_is_capped_at_max_health() {
        let mut hero = participant("Bo", 1, 25, 0);
        assert_eq!(hero.heal(10), 5);
        assert_eq!(hero.health, hero.max_health);
    }

    #[test]
    fn new_session_marks_fallen_roster_members() {
        let standing = participant("Cy", 1, 10, 0);
        let fallen = participant("Di", 1, 0, 0);
        let session = BattleSession::new(Uuid::new_v4(), &template(2, 1), &[standing.clone(), fallen.clone()], at(0));

        assert!(session.defeated.contains(&fallen.id));
        assert!(!session.defeated.contains(&standing.id));
        assert_eq!(session.phase, SessionPhase::Waiting);
        assert_eq!(session.boss_health, 100);
    }

    #[test]
    fn submissions_close_after_deadline() {
        let draft = in_progress(vec![participant("Ed", 1, 10, 0)], template(1, 1));
        assert!(draft.session.submissions_open(at(100)));
        assert!(!draft.session.submissions_open(at(101)));
    }

    #[test]
    fn notices_are_cleared_by_id() {
        let mut draft = in_progress(vec![participant("Fay", 1, 10, 0)], template(1, 1));
        let id = draft
            .session
            .push_notice(NoticeKind::PowerUsed, "hello".into(), None, at(5));
        assert!(draft.session.clear_notice(id));
        assert!(!draft.session.clear_notice(id));
    }

    #[test]
    fn vote_majority_counts_eligible_voters() {
        let caster = Uuid::new_v4();
        let mut vote = VoteState {
            caster,
            yes: BTreeSet::from([caster]),
            no: BTreeSet::new(),
            deadline: at(10),
            eligible: 4,
            round: 0,
        };
        assert!(!vote.passed());
        vote.yes.insert(Uuid::new_v4());
        assert!(!vote.passed());
        vote.yes.insert(Uuid::new_v4());
        assert!(vote.passed());
        assert!(!vote.is_complete());
        vote.no.insert(Uuid::new_v4());
        assert!(vote.is_complete());
    }
}
