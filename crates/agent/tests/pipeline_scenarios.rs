use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use leadgate_agent::conversation::ConversationTurn;
use leadgate_agent::llm::{
    CompletionRequest, GatewayError, LlmClient, Role, StageKind, UnconfiguredClient,
};
use leadgate_agent::runtime::{rescue_reply, Orchestrator, PipelineOutcome, TurnRequest};
use leadgate_agent::stage::{StageError, StrategistStage, VoiceStage};
use leadgate_agent::voice::HIGH_LOAD_REPLY;
use leadgate_core::audit::InMemoryAuditSink;
use leadgate_core::config::{AppConfig, StrategistMode};
use leadgate_core::domain::lead::{LeadField, LeadMemory, Sophistication, DECLINED_PLACEHOLDER};
use leadgate_core::domain::record::RecordTag;
use leadgate_core::domain::strategy::{AuditAction, StrategyDecision, Tactic};
use leadgate_db::{InMemoryLeadLog, LeadLog};

/// Answers each stage from a fixed script. The voice stage echoes its system
/// prompt so tests can see which directive reached it.
struct ScriptedClient {
    replies: HashMap<StageKind, &'static str>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    fn new(profiler: &'static str, strategist: &'static str) -> Arc<Self> {
        let replies = HashMap::from([
            (StageKind::Profiler, profiler),
            (StageKind::Strategist, strategist),
        ]);
        Arc::new(Self { replies, calls: Mutex::new(Vec::new()) })
    }

    fn calls_for(&self, stage: StageKind) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|call| call.stage == stage).count())
            .unwrap_or(0)
    }

    /// Non-system messages of the first request issued by `stage`.
    fn conversation_for(&self, stage: StageKind) -> Vec<(Role, String)> {
        self.calls
            .lock()
            .ok()
            .and_then(|calls| calls.iter().find(|call| call.stage == stage).cloned())
            .map(|call| {
                call.messages
                    .into_iter()
                    .filter(|message| message.role != Role::System)
                    .map(|message| (message.role, message.content))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        match request.stage {
            StageKind::Voice => Ok(request.messages[0].content.clone()),
            stage => self
                .replies
                .get(&stage)
                .map(|reply| reply.to_string())
                .ok_or(GatewayError::EmptyOutput),
        }
    }
}

struct FailingStrategist;

#[async_trait]
impl StrategistStage for FailingStrategist {
    async fn decide(
        &self,
        _memory: &LeadMemory,
        _recent: &[ConversationTurn],
        _message: &str,
    ) -> Result<StrategyDecision, StageError> {
        Err(StageError::Internal {
            stage: StageKind::Strategist,
            message: "decision table unavailable".to_string(),
        })
    }
}

struct FailingVoice;

#[async_trait]
impl VoiceStage for FailingVoice {
    async fn draft(&self, _message: &str, _directive: &str) -> Result<String, StageError> {
        Err(StageError::Internal {
            stage: StageKind::Voice,
            message: "reply channel closed".to_string(),
        })
    }
}

struct Harness {
    orchestrator: Orchestrator,
    log: Arc<InMemoryLeadLog>,
    audit: Arc<InMemoryAuditSink>,
}

impl Harness {
    fn new(client: Arc<dyn LlmClient>) -> Self {
        Self::with_config(client, AppConfig::default())
    }

    fn with_config(client: Arc<dyn LlmClient>, config: AppConfig) -> Self {
        let log = Arc::new(InMemoryLeadLog::default());
        let audit = Arc::new(InMemoryAuditSink::default());
        let orchestrator = Orchestrator::from_config(&config, client, log.clone(), audit.clone())
            .expect("orchestrator");
        Self { orchestrator, log, audit }
    }

    async fn turn(&self, memory: LeadMemory, message: &str) -> PipelineOutcome {
        self.turn_with_history(memory, Vec::new(), message).await
    }

    async fn turn_with_history(
        &self,
        memory: LeadMemory,
        history: Vec<ConversationTurn>,
        message: &str,
    ) -> PipelineOutcome {
        let outcome = self
            .orchestrator
            .handle(TurnRequest {
                message: message.to_string(),
                history,
                memory,
                correlation_id: "req-test".to_string(),
            })
            .await;
        self.orchestrator.recorder().drain(Duration::from_secs(1)).await;
        outcome
    }
}

fn acme(budget: Option<bool>) -> LeadMemory {
    LeadMemory {
        organization: Some("Acme".to_string()),
        pain: Some("stock loss".to_string()),
        budget_confirmed: budget,
        ..LeadMemory::default()
    }
}

#[tokio::test]
async fn scenario_a_new_lead_is_investigated() {
    let client = ScriptedClient::new(
        r#"{"organization": "empresa de logística", "pain": "inventarios perdidos", "sophistication": "high"}"#,
        r#"{"intent": "info", "tactic": "investigate"}"#,
    );
    let harness = Harness::new(client.clone());

    let outcome = harness
        .turn(LeadMemory::default(), "Hola, tengo una empresa de logística con inventarios perdidos")
        .await;

    assert_eq!(outcome.memory.organization.as_deref(), Some("empresa de logística"));
    assert_eq!(outcome.memory.pain.as_deref(), Some("inventarios perdidos"));
    assert_eq!(outcome.tactic, Some(Tactic::Investigate));
    assert_eq!(outcome.memory.pending_ask, Some(LeadField::TechStack));
    assert_eq!(outcome.signal.action, AuditAction::Continue);
    assert_eq!(client.calls_for(StageKind::Voice), 1);
    assert!(harness.log.records().await.is_empty());
}

#[tokio::test]
async fn scenario_a_unsophisticated_lead_is_educated() {
    let client = ScriptedClient::new(
        r#"{"organization": "empresa de logística", "pain": "inventarios perdidos", "sophistication": "low"}"#,
        r#"{"intent": "info"}"#,
    );
    let harness = Harness::new(client);

    let outcome = harness
        .turn(LeadMemory::default(), "Hola, tengo una empresa de logística con inventarios perdidos")
        .await;

    assert_eq!(outcome.memory.sophistication, Some(Sophistication::Low));
    assert_eq!(outcome.tactic, Some(Tactic::Educate));
    assert_eq!(outcome.signal.action, AuditAction::Continue);
}

#[tokio::test]
async fn scenario_b_price_question_anchors_without_final_figure() {
    let client = ScriptedClient::new("{}", r#"{"intent": "price", "tactic": "anchor-price"}"#);
    let harness = Harness::new(client);

    let outcome = harness.turn(acme(None), "¿Cuánto cuesta?").await;

    assert_eq!(outcome.tactic, Some(Tactic::AnchorPrice));
    assert!(outcome.reply.contains("1500 USD"), "reply: {}", outcome.reply);
    assert!(outcome.reply.contains("desorden"));
    assert!(outcome.reply.contains("No des un precio final fijo"));
    assert_eq!(outcome.signal.action, AuditAction::Continue);
}

#[tokio::test]
async fn scenario_c_confirmed_budget_unlocks_and_qualifies() {
    let client = ScriptedClient::new(
        r#"{"budget_confirmed": true}"#,
        r#"{"intent": "appointment", "tactic": "allow-meeting"}"#,
    );
    let harness = Harness::new(client);

    let outcome = harness.turn(acme(Some(true)), "Sí, adelante").await;

    assert_eq!(outcome.tactic, Some(Tactic::AllowMeeting));
    assert_eq!(outcome.signal.action, AuditAction::UnlockScheduling);
    assert!(outcome.memory.qualified_at.is_some());
    assert_eq!(harness.log.count_tagged(RecordTag::Qualified).await, 1);
    assert!(harness.audit.events_of_type("pipeline.gate.downgraded").is_empty());
}

#[tokio::test]
async fn scenario_d_gate_vetoes_meeting_without_confirmation() {
    let mut config = AppConfig::default();
    config.pipeline.strategist_mode = StrategistMode::Model;
    let client = ScriptedClient::new(
        r#"{"intent": "appointment"}"#,
        r#"{"intent": "appointment", "tactic": "allow-meeting", "directive": "agenda ya"}"#,
    );
    let harness = Harness::with_config(client, config);

    let outcome = harness.turn(acme(None), "Sí, agendemos").await;

    assert_eq!(outcome.tactic, Some(Tactic::AnchorPrice));
    assert_eq!(outcome.signal.action, AuditAction::Continue);
    assert!(outcome.reply.contains("confirmación explícita"));
    assert_eq!(harness.log.count_tagged(RecordTag::Qualified).await, 0);
    assert_eq!(harness.audit.events_of_type("pipeline.gate.downgraded").len(), 1);
}

#[tokio::test]
async fn scenario_d_rules_mode_anchors_before_the_gate() {
    let client = ScriptedClient::new(
        r#"{"intent": "appointment"}"#,
        r#"{"intent": "appointment", "tactic": "allow-meeting"}"#,
    );
    let harness = Harness::new(client);

    let outcome = harness.turn(acme(None), "Sí, agendemos").await;

    assert_eq!(outcome.tactic, Some(Tactic::AnchorPrice));
    assert_eq!(outcome.signal.action, AuditAction::Continue);
}

#[tokio::test]
async fn contact_is_persisted_even_when_strategist_fails() {
    let client = ScriptedClient::new("{}", "{}");
    let harness = Harness::new(client);
    let orchestrator = harness.orchestrator.with_strategist(Arc::new(FailingStrategist));
    let harness = Harness { orchestrator, ..harness };

    let outcome = harness
        .turn(LeadMemory::default(), "Soy Ana, mi correo es ana@norte.mx y mi tel 555-201-3344")
        .await;

    assert!(outcome.rescued());
    assert_eq!(outcome.signal.action, AuditAction::Continue);
    assert_eq!(outcome.reply, rescue_reply("board@evangelista.co"));
    assert_eq!(
        outcome.memory.contact.as_deref(),
        Some("email: ana@norte.mx | tel: 555-201-3344")
    );

    let records = harness.log.records().await;
    let tags = records.iter().map(|record| record.tag).collect::<Vec<_>>();
    assert!(tags.contains(&RecordTag::RescuedContact));
    assert!(tags.contains(&RecordTag::SystemFailure));
}

#[tokio::test]
async fn contact_is_persisted_even_when_every_gateway_call_fails() {
    let harness = Harness::new(Arc::new(UnconfiguredClient));

    let outcome = harness.turn(LeadMemory::default(), "llámenme al 5512345678").await;

    assert_eq!(outcome.reply, HIGH_LOAD_REPLY);
    assert_eq!(harness.log.count_tagged(RecordTag::RescuedContact).await, 1);
    assert_eq!(outcome.memory.contact.as_deref(), Some("tel: 5512345678"));
}

#[tokio::test]
async fn strategist_failure_is_contained_and_logged_with_raw_message() {
    let client = ScriptedClient::new(r#"{"organization": "Acme"}"#, "{}");
    let harness = Harness::new(client);
    let orchestrator = harness.orchestrator.with_strategist(Arc::new(FailingStrategist));
    let harness = Harness { orchestrator, ..harness };

    let outcome = harness.turn(LeadMemory::default(), "Necesito ordenar mis inventarios").await;

    assert_eq!(outcome.signal.action, AuditAction::Continue);
    assert_eq!(outcome.memory, LeadMemory::default(), "rescue returns the pre-pipeline snapshot");

    let failures = harness.log.recent(10, Some(RecordTag::SystemFailure)).await.expect("recent");
    assert_eq!(failures.len(), 1);
    assert!(failures[0].pain_and_contact.contains("Necesito ordenar mis inventarios"));
    assert_eq!(harness.audit.events_of_type("pipeline.rescue.triggered").len(), 1);
}

#[tokio::test]
async fn voice_failure_after_qualification_keeps_qualified_marker() {
    let client = ScriptedClient::new("{}", r#"{"tactic": "allow-meeting"}"#);
    let harness = Harness::new(client);
    let orchestrator = harness.orchestrator.with_voice(Arc::new(FailingVoice));
    let harness = Harness { orchestrator, ..harness };

    let first = harness.turn(acme(Some(true)), "Sí, adelante").await;

    assert!(first.rescued());
    assert_eq!(first.signal.action, AuditAction::Continue);
    assert!(first.memory.qualified_at.is_some());
    assert_eq!(harness.log.count_tagged(RecordTag::Qualified).await, 1);

    let second = harness.turn(first.memory.clone(), "¿Siguen ahí?").await;

    assert!(second.rescued());
    assert_eq!(second.memory.qualified_at, first.memory.qualified_at);
    assert_eq!(harness.log.count_tagged(RecordTag::Qualified).await, 1);
    assert_eq!(harness.log.count_tagged(RecordTag::SystemFailure).await, 2);
}

#[tokio::test]
async fn widget_history_reaches_stages_without_repeating_the_message() {
    let client = ScriptedClient::new(r#"{"tech_stack": "SAP y Excel"}"#, r#"{"intent": "info"}"#);
    let harness = Harness::new(client.clone());
    let history: Vec<ConversationTurn> = serde_json::from_value(serde_json::json!([
        {"role": "model", "parts": ["¿Qué sistemas usan hoy?"]},
        {"role": "user", "parts": ["SAP y Excel"]}
    ]))
    .expect("decode history");

    let outcome = harness.turn_with_history(acme(None), history, "SAP y Excel").await;

    assert_eq!(outcome.memory.tech_stack.as_deref(), Some("SAP y Excel"));
    assert_eq!(
        client.conversation_for(StageKind::Profiler),
        vec![
            (Role::Assistant, "¿Qué sistemas usan hoy?".to_string()),
            (Role::User, "SAP y Excel".to_string()),
        ]
    );
    assert_eq!(
        client.conversation_for(StageKind::Strategist),
        vec![
            (Role::Assistant, "¿Qué sistemas usan hoy?".to_string()),
            (Role::User, "SAP y Excel".to_string()),
        ]
    );
}

#[tokio::test]
async fn declined_field_is_not_asked_twice() {
    let client = ScriptedClient::new("{}", r#"{"intent": "info"}"#);
    let harness = Harness::new(client);

    let first = harness.turn(LeadMemory::default(), "Hola").await;
    assert_eq!(first.tactic, Some(Tactic::Investigate));
    assert_eq!(first.memory.pending_ask, Some(LeadField::Organization));

    let second = harness.turn(first.memory, "prefiero no decirlo").await;
    assert_eq!(second.memory.organization.as_deref(), Some(DECLINED_PLACEHOLDER));
    assert_eq!(second.tactic, Some(Tactic::Investigate));
    assert_eq!(second.memory.pending_ask, Some(LeadField::Pain));
}

#[tokio::test]
async fn qualified_row_is_written_once_but_unlock_repeats() {
    let client = ScriptedClient::new("{}", r#"{"tactic": "allow-meeting"}"#);
    let harness = Harness::new(client);

    let first = harness.turn(acme(Some(true)), "Sí, adelante").await;
    let second = harness.turn(first.memory.clone(), "¿Qué horarios tienen?").await;

    assert_eq!(first.signal.action, AuditAction::UnlockScheduling);
    assert_eq!(second.signal.action, AuditAction::UnlockScheduling);
    assert_eq!(second.memory.qualified_at, first.memory.qualified_at);
    assert_eq!(harness.log.count_tagged(RecordTag::Qualified).await, 1);
}

#[tokio::test]
async fn stub_mode_degrades_without_rescue() {
    let harness = Harness::new(Arc::new(UnconfiguredClient));

    let outcome = harness.turn(acme(None), "¿Cuánto cuesta?").await;

    assert!(!harness.orchestrator.inference_live());
    assert_eq!(outcome.reply, HIGH_LOAD_REPLY);
    assert_eq!(outcome.signal.action, AuditAction::Continue);
    assert!(!outcome.rescued());
    assert_eq!(harness.log.count_tagged(RecordTag::SystemFailure).await, 0);
}
