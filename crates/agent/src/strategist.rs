//! Tactic selection.
//!
//! The ordered decision table is authoritative. The model call only supplies
//! per-turn signals (intent, cost objection, off-topic) plus an advisory
//! tactic and directive; memory plus those signals decide the tactic.
//!
//! Priority, first match wins:
//! 1. low sophistication or confusion: educate
//! 2. organization or pain unknown: investigate that field
//! 3. price/appointment intent without confirmed budget: anchor-price
//! 4. budget confirmed: allow-meeting
//! 5. cost objection: value-proposition
//!
//! then off-topic: reject, unknown stack: investigate it, declined budget:
//! value-proposition, otherwise anchor-price.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tera::Context;
use tracing::{info, warn};

use leadgate_core::config::{PipelineConfig, StrategistMode};
use leadgate_core::domain::lead::{LeadField, LeadMemory, PurchaseIntent, Sophistication};
use leadgate_core::domain::strategy::{DecisionSource, StrategyDecision, Tactic};

use crate::conversation::ConversationTurn;
use crate::llm::{ChatMessage, Gateway, StageKind};
use crate::prompts::{field_label, PromptError, PromptLibrary, STRATEGIST_SYSTEM};
use crate::stage::{StageError, StrategistStage};

const GENERIC_FIELD_LABEL: &str = "más detalles sobre su operación";

/// Per-turn signals returned by the strategist's structured call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TurnAssessment {
    #[serde(alias = "intencion", deserialize_with = "loose_intent")]
    pub intent: Option<PurchaseIntent>,
    #[serde(alias = "objection", alias = "objecion_costo", deserialize_with = "loose_bool")]
    pub cost_objection: bool,
    #[serde(alias = "fuera_de_tema", deserialize_with = "loose_bool")]
    pub off_topic: bool,
    #[serde(alias = "tactica", deserialize_with = "loose_text")]
    pub tactic: Option<String>,
    #[serde(alias = "directives", alias = "directiva", deserialize_with = "loose_text")]
    pub directive: Option<String>,
}

impl TurnAssessment {
    pub fn proposed_tactic(&self) -> Option<Tactic> {
        self.tactic.as_deref().and_then(|tactic| tactic.parse().ok())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    pub tactic: Tactic,
    pub target: Option<LeadField>,
}

impl Selection {
    fn plain(tactic: Tactic) -> Self {
        Self { tactic, target: None }
    }

    fn investigate(field: LeadField) -> Self {
        Self { tactic: Tactic::Investigate, target: Some(field) }
    }
}

pub struct DecisionTable {
    prompts: Arc<PromptLibrary>,
    price_floor: Decimal,
    currency: String,
}

impl DecisionTable {
    pub fn new(prompts: Arc<PromptLibrary>, pipeline: &PipelineConfig) -> Self {
        Self {
            prompts,
            price_floor: pipeline.price_floor,
            currency: pipeline.currency.clone(),
        }
    }

    pub fn select(memory: &LeadMemory, assessment: &TurnAssessment) -> Selection {
        let next = Self::select_informed(memory, assessment);
        if needs_education(memory) {
            let target = (next.tactic == Tactic::Investigate).then_some(next.target).flatten();
            return Selection { tactic: Tactic::Educate, target };
        }
        next
    }

    /// Rules 2 onward, for a lead who does not need educating first.
    fn select_informed(memory: &LeadMemory, assessment: &TurnAssessment) -> Selection {
        if let Some(field) = first_missing(memory, &[LeadField::Organization, LeadField::Pain]) {
            return Selection::investigate(field);
        }

        let intent = assessment.intent.or(memory.intent);
        if intent.is_some_and(|intent| intent.is_commercial()) && !memory.budget_is_confirmed() {
            return Selection::plain(Tactic::AnchorPrice);
        }

        if memory.budget_is_confirmed() {
            return Selection::plain(Tactic::AllowMeeting);
        }

        if assessment.cost_objection {
            return Selection::plain(Tactic::ValueProposition);
        }

        if assessment.off_topic {
            return Selection::plain(Tactic::Reject);
        }

        if memory.is_missing(LeadField::TechStack) {
            return Selection::investigate(LeadField::TechStack);
        }

        if memory.budget_confirmed == Some(false) {
            return Selection::plain(Tactic::ValueProposition);
        }

        Selection::plain(Tactic::AnchorPrice)
    }

    /// Table decision. The model's directive is kept as a nuance only when
    /// its proposed tactic agrees with the table.
    pub fn decide(
        &self,
        memory: &LeadMemory,
        assessment: &TurnAssessment,
    ) -> Result<StrategyDecision, PromptError> {
        let selection = Self::select(memory, assessment);
        let agrees = assessment.proposed_tactic() == Some(selection.tactic);
        let note = if agrees { assessment.directive.as_deref() } else { None };

        let directive = self.directive(memory, assessment, selection, note)?;
        Ok(self.finish(selection, directive, DecisionSource::Rules))
    }

    /// Trusts the model's proposed tactic; the table only fills gaps.
    pub fn decide_as_proposed(
        &self,
        memory: &LeadMemory,
        assessment: &TurnAssessment,
    ) -> Result<StrategyDecision, PromptError> {
        let table = Self::select(memory, assessment);
        let Some(tactic) = assessment.proposed_tactic() else {
            return self.decide(memory, assessment);
        };

        let target = match tactic {
            Tactic::Investigate => table.target.or_else(|| first_missing(memory, &ALL_FIELDS)),
            _ => None,
        };
        let selection = Selection { tactic, target };
        let directive =
            self.directive(memory, assessment, selection, assessment.directive.as_deref())?;
        Ok(self.finish(selection, directive, DecisionSource::Model))
    }

    /// Degraded decision after a gateway failure, with an apology.
    pub fn fallback(&self, memory: &LeadMemory) -> Result<StrategyDecision, PromptError> {
        let educate = needs_education(memory);
        let target = if educate { None } else { first_missing(memory, &ALL_FIELDS) };

        let mut context = self.base_context(memory);
        context.insert("educate", &educate);
        context.insert("field_label", target.map_or(GENERIC_FIELD_LABEL, field_label));
        let directive = self.prompts.render("directive/fallback", &context)?;

        let tactic = if educate { Tactic::Educate } else { Tactic::Investigate };
        Ok(self.finish(Selection { tactic, target }, directive, DecisionSource::Fallback))
    }

    fn directive(
        &self,
        memory: &LeadMemory,
        assessment: &TurnAssessment,
        selection: Selection,
        note: Option<&str>,
    ) -> Result<String, PromptError> {
        let mut context = self.base_context(memory);
        context.insert("field_label", selection.target.map_or(GENERIC_FIELD_LABEL, field_label));

        let follow_up = if selection.tactic == Tactic::Educate {
            let next = Self::select_informed(memory, assessment);
            match next.tactic {
                Tactic::Investigate | Tactic::AnchorPrice | Tactic::ValueProposition => {
                    let mut next_context = context.clone();
                    next_context.insert(
                        "field_label",
                        next.target.map_or(GENERIC_FIELD_LABEL, field_label),
                    );
                    self.prompts.directive(next.tactic, &next_context)?
                }
                _ => String::new(),
            }
        } else {
            String::new()
        };
        context.insert("follow_up", &follow_up);

        let mut directive = self.prompts.directive(selection.tactic, &context)?;
        if let Some(note) = note.map(str::trim).filter(|note| !note.is_empty()) {
            directive.push_str("\nMatiz sugerido: ");
            directive.push_str(note);
        }
        Ok(directive)
    }

    fn base_context(&self, memory: &LeadMemory) -> Context {
        let mut context = Context::new();
        context.insert("price_floor", &self.price_floor.normalize().to_string());
        context.insert("currency", &self.currency);
        context.insert("organization", memory.organization.as_deref().unwrap_or("su empresa"));
        context.insert("pain", memory.pain.as_deref().unwrap_or("su reto operativo"));
        context.insert("follow_up", "");
        context.insert("field_label", GENERIC_FIELD_LABEL);
        context
    }

    fn finish(
        &self,
        selection: Selection,
        directive: String,
        source: DecisionSource,
    ) -> StrategyDecision {
        let decision = StrategyDecision::new(selection.tactic, directive, source);
        match selection.target {
            Some(field) => decision.with_target(field),
            None => decision,
        }
    }
}

const ALL_FIELDS: [LeadField; 3] = [LeadField::Organization, LeadField::Pain, LeadField::TechStack];

fn needs_education(memory: &LeadMemory) -> bool {
    memory.sophistication == Some(Sophistication::Low) || memory.confused == Some(true)
}

fn first_missing(memory: &LeadMemory, fields: &[LeadField]) -> Option<LeadField> {
    fields.iter().copied().find(|field| memory.is_missing(*field))
}

pub struct LlmStrategist {
    gateway: Gateway,
    prompts: Arc<PromptLibrary>,
    table: DecisionTable,
    mode: StrategistMode,
}

impl LlmStrategist {
    pub fn new(gateway: Gateway, prompts: Arc<PromptLibrary>, pipeline: &PipelineConfig) -> Self {
        Self {
            gateway,
            table: DecisionTable::new(prompts.clone(), pipeline),
            prompts,
            mode: pipeline.strategist_mode,
        }
    }

    fn messages(
        &self,
        memory: &LeadMemory,
        recent: &[ConversationTurn],
        message: &str,
    ) -> Result<Vec<ChatMessage>, StageError> {
        let memory_json = serde_json::to_string(memory).map_err(|e| StageError::Internal {
            stage: StageKind::Strategist,
            message: format!("could not encode memory: {e}"),
        })?;

        let mut context = self.table.base_context(memory);
        context.insert("memory", &memory_json);
        let system = self
            .prompts
            .render(STRATEGIST_SYSTEM, &context)
            .map_err(|source| StageError::Prompt { stage: StageKind::Strategist, source })?;

        let mut messages = Vec::with_capacity(recent.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(recent.iter().map(ConversationTurn::to_message));
        messages.push(ChatMessage::user(message));
        Ok(messages)
    }
}

#[async_trait]
impl StrategistStage for LlmStrategist {
    async fn decide(
        &self,
        memory: &LeadMemory,
        recent: &[ConversationTurn],
        message: &str,
    ) -> Result<StrategyDecision, StageError> {
        let messages = self.messages(memory, recent, message)?;
        let to_stage_error = |source| StageError::Prompt { stage: StageKind::Strategist, source };

        let assessment =
            match self.gateway.structured::<TurnAssessment>(StageKind::Strategist, messages).await {
                Ok(assessment) => assessment,
                Err(error) => {
                    warn!(
                        event_name = "pipeline.strategist.degraded",
                        error = %error,
                        "strategist call failed; using fallback tactic"
                    );
                    return self.table.fallback(memory).map_err(to_stage_error);
                }
            };

        let decision = match self.mode {
            StrategistMode::Rules => self.table.decide(memory, &assessment),
            StrategistMode::Model => self.table.decide_as_proposed(memory, &assessment),
        }
        .map_err(to_stage_error)?;

        info!(
            event_name = "pipeline.strategist.decided",
            tactic = %decision.tactic,
            proposed = assessment.tactic.as_deref().unwrap_or("none"),
            source = ?decision.source,
            "tactic selected"
        );
        Ok(decision)
    }
}

fn loose_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(flag)) => flag,
        Some(Value::String(text)) => {
            matches!(text.trim().to_lowercase().as_str(), "true" | "yes" | "si" | "sí")
        }
        _ => false,
    })
}

fn loose_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let text = match value {
        Some(Value::String(text)) => text,
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        _ => return Ok(None),
    };
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

fn loose_intent<'de, D>(deserializer: D) -> Result<Option<PurchaseIntent>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value.as_ref().and_then(Value::as_str).map(|text| text.trim().to_lowercase()) {
        Some(code) => match code.as_str() {
            "info" | "informacion" | "información" => Some(PurchaseIntent::Info),
            "appointment" | "cita" | "reunion" | "reunión" => Some(PurchaseIntent::Appointment),
            "price" | "precio" => Some(PurchaseIntent::Price),
            _ => None,
        },
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use leadgate_core::config::AppConfig;
    use leadgate_core::domain::lead::{LeadField, LeadMemory, PurchaseIntent, Sophistication};
    use leadgate_core::domain::strategy::{DecisionSource, Tactic};
    use serde_json::json;

    use super::{DecisionTable, Selection, TurnAssessment};
    use crate::prompts::PromptLibrary;

    fn table() -> DecisionTable {
        DecisionTable::new(
            Arc::new(PromptLibrary::new().expect("prompts")),
            &AppConfig::default().pipeline,
        )
    }

    fn known(budget: Option<bool>) -> LeadMemory {
        LeadMemory {
            organization: Some("Acme".to_string()),
            pain: Some("stock loss".to_string()),
            budget_confirmed: budget,
            ..LeadMemory::default()
        }
    }

    fn asking(intent: PurchaseIntent) -> TurnAssessment {
        TurnAssessment { intent: Some(intent), ..TurnAssessment::default() }
    }

    #[test]
    fn low_sophistication_is_educated_first() {
        let memory =
            LeadMemory { sophistication: Some(Sophistication::Low), ..LeadMemory::default() };
        let selection = DecisionTable::select(&memory, &TurnAssessment::default());

        assert_eq!(selection.tactic, Tactic::Educate);
        assert_eq!(selection.target, Some(LeadField::Organization));
    }

    #[test]
    fn missing_organization_is_asked_before_pain() {
        let selection = DecisionTable::select(&LeadMemory::default(), &TurnAssessment::default());
        assert_eq!(selection, Selection::investigate(LeadField::Organization));

        let memory = LeadMemory { organization: Some("Acme".to_string()), ..LeadMemory::default() };
        let selection = DecisionTable::select(&memory, &asking(PurchaseIntent::Price));
        assert_eq!(selection, Selection::investigate(LeadField::Pain));
    }

    #[test]
    fn commercial_intent_without_confirmed_budget_anchors_price() {
        for budget in [None, Some(false)] {
            for intent in [PurchaseIntent::Price, PurchaseIntent::Appointment] {
                let selection = DecisionTable::select(&known(budget), &asking(intent));
                assert_eq!(selection.tactic, Tactic::AnchorPrice, "{budget:?} {intent:?}");
            }
        }
    }

    #[test]
    fn confirmed_budget_allows_meeting_even_when_asking_to_schedule() {
        let selection =
            DecisionTable::select(&known(Some(true)), &asking(PurchaseIntent::Appointment));
        assert_eq!(selection.tactic, Tactic::AllowMeeting);
    }

    #[test]
    fn cost_objection_gets_value_proposition() {
        let assessment = TurnAssessment { cost_objection: true, ..TurnAssessment::default() };
        let selection = DecisionTable::select(&known(None), &assessment);
        assert_eq!(selection.tactic, Tactic::ValueProposition);
    }

    #[test]
    fn fallthrough_rules_apply_in_order() {
        let off_topic = TurnAssessment { off_topic: true, ..TurnAssessment::default() };
        assert_eq!(DecisionTable::select(&known(None), &off_topic).tactic, Tactic::Reject);

        assert_eq!(
            DecisionTable::select(&known(None), &TurnAssessment::default()),
            Selection::investigate(LeadField::TechStack)
        );

        let mut memory = known(Some(false));
        memory.tech_stack = Some("SAP".to_string());
        assert_eq!(
            DecisionTable::select(&memory, &TurnAssessment::default()).tactic,
            Tactic::ValueProposition
        );

        memory.budget_confirmed = None;
        assert_eq!(
            DecisionTable::select(&memory, &TurnAssessment::default()).tactic,
            Tactic::AnchorPrice
        );
    }

    #[test]
    fn remembered_intent_counts_when_turn_has_none() {
        let mut memory = known(None);
        memory.intent = Some(PurchaseIntent::Price);
        assert_eq!(
            DecisionTable::select(&memory, &TurnAssessment::default()).tactic,
            Tactic::AnchorPrice
        );
    }

    #[test]
    fn anchor_directive_carries_configured_floor() {
        let decision =
            table().decide(&known(None), &asking(PurchaseIntent::Price)).expect("decide");

        assert_eq!(decision.tactic, Tactic::AnchorPrice);
        assert_eq!(decision.source, DecisionSource::Rules);
        assert!(decision.directive.contains("1500 USD"));
        assert!(decision.directive.contains("desorden"));
    }

    #[test]
    fn disagreeing_model_proposal_is_ignored_in_rules_mode() {
        let assessment = TurnAssessment {
            tactic: Some("allow-meeting".to_string()),
            directive: Some("agenda ya".to_string()),
            ..TurnAssessment::default()
        };
        let decision = table().decide(&LeadMemory::default(), &assessment).expect("decide");

        assert_eq!(decision.tactic, Tactic::Investigate);
        assert_eq!(decision.target_field, Some(LeadField::Organization));
        assert!(!decision.directive.contains("agenda ya"));
    }

    #[test]
    fn model_mode_trusts_the_proposed_tactic() {
        let assessment = TurnAssessment {
            tactic: Some("allow_meeting".to_string()),
            ..TurnAssessment::default()
        };
        let decision = table().decide_as_proposed(&known(None), &assessment).expect("decide");

        assert_eq!(decision.tactic, Tactic::AllowMeeting);
        assert_eq!(decision.source, DecisionSource::Model);
    }

    #[test]
    fn educate_directive_appends_the_follow_up() {
        let memory = LeadMemory { confused: Some(true), ..known(None) };
        let decision = table().decide(&memory, &asking(PurchaseIntent::Price)).expect("decide");

        assert_eq!(decision.tactic, Tactic::Educate);
        assert!(decision.directive.contains("analogía"));
        assert!(decision.directive.contains("1500 USD"));
    }

    #[test]
    fn fallback_prefers_education_for_confused_leads() {
        let confused = LeadMemory { confused: Some(true), ..LeadMemory::default() };
        let decision = table().fallback(&confused).expect("fallback");
        assert_eq!(decision.tactic, Tactic::Educate);
        assert_eq!(decision.source, DecisionSource::Fallback);
        assert!(decision.directive.contains("disculpa"));

        let decision = table().fallback(&LeadMemory::default()).expect("fallback");
        assert_eq!(decision.tactic, Tactic::Investigate);
        assert_eq!(decision.target_field, Some(LeadField::Organization));
    }

    #[test]
    fn assessment_decoding_is_lenient() {
        let assessment: TurnAssessment = serde_json::from_value(json!({
            "intencion": "PRECIO",
            "cost_objection": "sí",
            "tactic": "anchor_price",
            "directives": ["Menciona el piso", "sin cifra final"]
        }))
        .expect("decode");

        assert_eq!(assessment.intent, Some(PurchaseIntent::Price));
        assert!(assessment.cost_objection);
        assert!(!assessment.off_topic);
        assert_eq!(assessment.proposed_tactic(), Some(Tactic::AnchorPrice));
        assert_eq!(assessment.directive.as_deref(), Some("Menciona el piso sin cifra final"));
    }
}
