//! Seed payloads for the participant and template collaborators.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::ParticipantEntity,
    dto::validation::{validate_display_name, validate_within_max},
    state::battle::{BattleTemplate, Participant, Question},
};

/// Resource sheet of a participant as written by the roster subsystem.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ParticipantInput {
    pub name: String,
    pub level: u32,
    pub health: u32,
    pub max_health: u32,
    pub mana: u32,
    pub max_mana: u32,
}

impl Validate for ParticipantInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_display_name(&self.name) {
            errors.add("name", e);
        }
        if self.max_health == 0 {
            errors.add("max_health", validator::ValidationError::new("max_health_zero"));
        }
        if let Err(e) = validate_within_max(self.health, self.max_health) {
            errors.add("health", e);
        }
        if let Err(e) = validate_within_max(self.mana, self.max_mana) {
            errors.add("mana", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl ParticipantInput {
    /// Attach the identifier taken from the request path.
    pub fn into_participant(self, id: Uuid) -> Participant {
        Participant {
            id,
            name: self.name,
            level: self.level,
            health: self.health,
            max_health: self.max_health,
            mana: self.mana,
            max_mana: self.max_mana,
        }
    }
}

/// Stored participant with its version.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantView {
    pub id: Uuid,
    pub name: String,
    pub level: u32,
    pub health: u32,
    pub max_health: u32,
    pub mana: u32,
    pub max_mana: u32,
    pub fallen: bool,
    pub version: u64,
}

impl From<ParticipantEntity> for ParticipantView {
    fn from(entity: ParticipantEntity) -> Self {
        let fallen = entity.participant.is_fallen();
        let Participant {
            id,
            name,
            level,
            health,
            max_health,
            mana,
            max_mana,
        } = entity.participant;
        Self {
            id,
            name,
            level,
            health,
            max_health,
            mana,
            max_mana,
            fallen,
            version: entity.version,
        }
    }
}

/// Question of a battle template.
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct QuestionInput {
    #[validate(length(min = 1))]
    pub prompt: String,
    #[validate(length(min = 2, message = "a question needs at least two answers"))]
    pub answers: Vec<String>,
    pub correct_index: usize,
    /// Health lost by each participant who answers incorrectly.
    pub damage: u32,
}

/// Battle template as written by the authoring subsystem.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct TemplateInput {
    #[validate(custom(function = "validate_display_name"))]
    pub name: String,
    #[validate(range(min = 1))]
    pub boss_health: u32,
    #[validate(length(min = 1), nested)]
    pub questions: Vec<QuestionInput>,
}

impl TemplateInput {
    /// Check what field attributes cannot: every `correct_index` points at an answer.
    pub fn validate_all(&self) -> Result<(), ValidationErrors> {
        self.validate()?;
        let mut errors = ValidationErrors::new();
        for question in &self.questions {
            if question.correct_index >= question.answers.len() {
                let mut err = validator::ValidationError::new("correct_index_out_of_range");
                err.message = Some(
                    format!(
                        "correct_index {} is out of range for {} answers",
                        question.correct_index,
                        question.answers.len()
                    )
                    .into(),
                );
                errors.add("questions", err);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Attach the identifier taken from the request path.
    pub fn into_template(self, id: Uuid) -> BattleTemplate {
        BattleTemplate {
            id,
            name: self.name,
            boss_health: self.boss_health,
            questions: self
                .questions
                .into_iter()
                .map(|q| Question {
                    prompt: q.prompt,
                    answers: q.answers,
                    correct_index: q.correct_index,
                    damage: q.damage,
                })
                .collect(),
        }
    }
}

/// Short description of a stored template.
#[derive(Debug, Serialize, ToSchema)]
pub struct TemplateSummary {
    pub id: Uuid,
    pub name: String,
    pub boss_health: u32,
    pub rounds: usize,
}

impl From<&BattleTemplate> for TemplateSummary {
    fn from(template: &BattleTemplate) -> Self {
        Self {
            id: template.id,
            name: template.name.clone(),
            boss_health: template.boss_health,
            rounds: template.questions.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(answers: usize, correct_index: usize) -> QuestionInput {
        QuestionInput {
            prompt: "Which door?".into(),
            answers: (0..answers).map(|i| format!("door {i}")).collect(),
            correct_index,
            damage: 5,
        }
    }

    #[test]
    fn participant_above_max_is_invalid() {
        let input = ParticipantInput {
            name: "Aria".into(),
            level: 2,
            health: 31,
            max_health: 30,
            mana: 10,
            max_mana: 100,
        };
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("health"));
        assert!(!errors.field_errors().contains_key("mana"));
    }

    #[test]
    fn template_rejects_out_of_range_correct_index() {
        let input = TemplateInput {
            name: "Crypt".into(),
            boss_health: 50,
            questions: vec![question(3, 1), question(2, 2)],
        };
        assert!(input.validate().is_ok());
        assert!(input.validate_all().is_err());
    }

    #[test]
    fn template_requires_two_answers_and_a_boss() {
        let input = TemplateInput {
            name: "Crypt".into(),
            boss_health: 0,
            questions: vec![question(1, 0)],
        };
        let errors = input.validate().unwrap_err();
        assert!(errors.errors().contains_key("boss_health"));
        assert!(errors.errors().contains_key("questions"));
    }
}
