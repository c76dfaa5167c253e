use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, info_span, warn, Instrument};

use leadgate_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use leadgate_core::config::AppConfig;
use leadgate_core::contact::ContactExtractor;
use leadgate_core::domain::lead::LeadMemory;
use leadgate_core::domain::record::{LeadRecord, RecordTag};
use leadgate_core::domain::strategy::{AuditSignal, Tactic};
use leadgate_db::LeadLog;

use crate::conversation::{self, ConversationTurn, TurnRole};
use crate::guardrails::{GateVerdict, SafetyGate};
use crate::llm::{Gateway, LlmClient};
use crate::profiler::LlmProfiler;
use crate::prompts::{PromptError, PromptLibrary};
use crate::recorder::LeadRecorder;
use crate::stage::{ProfilerStage, StageError, StrategistStage, VoiceStage};
use crate::strategist::LlmStrategist;
use crate::voice::LlmVoice;

#[derive(Clone, Debug)]
pub struct TurnRequest {
    pub message: String,
    pub history: Vec<ConversationTurn>,
    pub memory: LeadMemory,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineOutcome {
    pub reply: String,
    pub signal: AuditSignal,
    pub memory: LeadMemory,
    /// Final, post-gate tactic. `None` when the turn was rescued.
    pub tactic: Option<Tactic>,
}

impl PipelineOutcome {
    pub fn rescued(&self) -> bool {
        self.tactic.is_none()
    }
}

/// Runs one conversational turn through contact rescue, profiler,
/// strategist, safety gate and voice. Never returns an error: any stage
/// failure it cannot absorb resolves through the rescue protocol.
pub struct Orchestrator {
    contacts: ContactExtractor,
    profiler: Arc<dyn ProfilerStage>,
    strategist: Arc<dyn StrategistStage>,
    gate: SafetyGate,
    voice: Arc<dyn VoiceStage>,
    recorder: Arc<LeadRecorder>,
    audit: Arc<dyn AuditSink>,
    history_window: usize,
    contact_channel: String,
    inference_live: bool,
}

impl Orchestrator {
    pub fn from_config(
        config: &AppConfig,
        client: Arc<dyn LlmClient>,
        log: Arc<dyn LeadLog>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, PromptError> {
        let prompts = Arc::new(PromptLibrary::new()?);
        let gateway = Gateway::new(client, &config.llm);
        let recorder = Arc::new(LeadRecorder::new(
            log,
            Duration::from_secs(config.lead_log.timeout_secs),
        ));

        Ok(Self {
            contacts: ContactExtractor::new(),
            profiler: Arc::new(LlmProfiler::new(gateway.clone(), prompts.clone())),
            strategist: Arc::new(LlmStrategist::new(
                gateway.clone(),
                prompts.clone(),
                &config.pipeline,
            )),
            gate: SafetyGate::new(&config.pipeline),
            voice: Arc::new(LlmVoice::new(gateway.clone(), prompts)),
            recorder,
            audit,
            history_window: config.pipeline.history_window,
            contact_channel: config.pipeline.contact_channel.clone(),
            inference_live: gateway.is_live(),
        })
    }

    pub fn with_profiler(mut self, profiler: Arc<dyn ProfilerStage>) -> Self {
        self.profiler = profiler;
        self
    }

    pub fn with_strategist(mut self, strategist: Arc<dyn StrategistStage>) -> Self {
        self.strategist = strategist;
        self
    }

    pub fn with_voice(mut self, voice: Arc<dyn VoiceStage>) -> Self {
        self.voice = voice;
        self
    }

    pub fn recorder(&self) -> Arc<LeadRecorder> {
        self.recorder.clone()
    }

    pub fn inference_live(&self) -> bool {
        self.inference_live
    }

    pub async fn handle(&self, request: TurnRequest) -> PipelineOutcome {
        let span = info_span!("pipeline.turn", correlation_id = %request.correlation_id);
        self.run_turn(request).instrument(span).await
    }

    async fn run_turn(&self, request: TurnRequest) -> PipelineOutcome {
        let mut memory = request.memory.clone();

        let found = self.contacts.extract(&request.message);
        if !found.is_empty() {
            memory.append_contact(&found);
            self.recorder.record(LeadRecord::from_memory(
                &memory,
                RecordTag::RescuedContact,
                &request.correlation_id,
            ));
            self.audit.emit(
                AuditEvent::new(
                    &request.correlation_id,
                    "pipeline.contact.rescued",
                    AuditCategory::Persistence,
                    "contact-extractor",
                    AuditOutcome::Success,
                )
                .with_metadata("contact", found.summary()),
            );
        }

        let mut snapshot = memory.clone();
        match self.run_stages(memory, &request, &mut snapshot).await {
            Ok(outcome) => outcome,
            Err(failure) => self.rescue(snapshot, &request, failure),
        }
    }

    async fn run_stages(
        &self,
        memory: LeadMemory,
        request: &TurnRequest,
        snapshot: &mut LeadMemory,
    ) -> Result<PipelineOutcome, StageError> {
        let history = conversation::prior_turns(&request.history, &request.message);
        let prior = history
            .iter()
            .rev()
            .find(|turn| turn.role == TurnRole::Assistant && !turn.content.is_empty());
        let mut memory = self.profiler.profile(memory, &request.message, prior).await?;

        let recent = conversation::window(history, self.history_window);
        let mut decision = self.strategist.decide(&memory, &recent, &request.message).await?;

        let verdict = self.gate.enforce(&mut decision, &memory);
        if let GateVerdict::Downgrade { reason_code, from, to } = &verdict {
            warn!(
                event_name = "pipeline.gate.downgraded",
                reason_code = %reason_code,
                from = %from,
                to = %to,
                "allow-meeting vetoed without confirmed budget"
            );
            self.audit.emit(
                AuditEvent::new(
                    &request.correlation_id,
                    "pipeline.gate.downgraded",
                    AuditCategory::Gate,
                    "safety-gate",
                    AuditOutcome::Corrected,
                )
                .with_metadata("reason_code", *reason_code)
                .with_metadata("from", from.as_str())
                .with_metadata("to", to.as_str()),
            );
        }

        if let Some(field) = decision.target_field {
            memory.note_ask(field);
        }

        let signal = AuditSignal::derive(&decision, &memory);
        if signal.unlocks_scheduling() && memory.qualified_at.is_none() {
            memory.qualified_at = Some(Utc::now());
            snapshot.qualified_at = memory.qualified_at;
            self.recorder.record(LeadRecord::from_memory(
                &memory,
                RecordTag::Qualified,
                &request.correlation_id,
            ));
            self.audit.emit(
                AuditEvent::new(
                    &request.correlation_id,
                    "pipeline.lead.qualified",
                    AuditCategory::Persistence,
                    "orchestrator",
                    AuditOutcome::Success,
                )
                .with_metadata("score", signal.score.to_string()),
            );
        }

        let reply = self.voice.draft(&request.message, &decision.directive).await?;

        info!(
            event_name = "pipeline.turn.completed",
            tactic = %decision.tactic,
            action = ?signal.action,
            score = signal.score,
            "turn completed"
        );

        Ok(PipelineOutcome { reply, signal, memory, tactic: Some(decision.tactic) })
    }

    fn rescue(
        &self,
        snapshot: LeadMemory,
        request: &TurnRequest,
        failure: StageError,
    ) -> PipelineOutcome {
        error!(
            event_name = "pipeline.rescue.triggered",
            stage = %failure.stage(),
            error = %failure,
            "stage failure; lead preserved for manual follow-up"
        );

        self.recorder.record(
            LeadRecord::from_memory(&snapshot, RecordTag::SystemFailure, &request.correlation_id)
                .with_raw_message(&request.message),
        );
        self.audit.emit(
            AuditEvent::new(
                &request.correlation_id,
                "pipeline.rescue.triggered",
                AuditCategory::System,
                "orchestrator",
                AuditOutcome::Failed,
            )
            .with_metadata("stage", failure.stage().as_str())
            .with_metadata("error", failure.to_string()),
        );

        PipelineOutcome {
            reply: rescue_reply(&self.contact_channel),
            signal: AuditSignal::hold(&snapshot),
            memory: snapshot,
            tactic: None,
        }
    }
}

pub fn rescue_reply(contact_channel: &str) -> String {
    format!(
        "Tuvimos un inconveniente técnico y no queremos perder su solicitud. Por favor \
         compártanos su correo o teléfono, o escríbanos directamente a {contact_channel} y el \
         equipo le contactará a la brevedad."
    )
}
