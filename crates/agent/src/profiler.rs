use std::sync::Arc;

use async_trait::async_trait;
use tera::Context;
use tracing::{debug, info, warn};

use leadgate_core::domain::lead::{LeadExtraction, LeadMemory};

use crate::conversation::{ConversationTurn, TurnRole};
use crate::llm::{ChatMessage, Gateway, StageKind};
use crate::prompts::{PromptLibrary, PROFILER_SYSTEM};
use crate::stage::{ProfilerStage, StageError};

/// Extracts structured lead fields from the latest message and merges them
/// into memory. A gateway failure leaves memory untouched.
pub struct LlmProfiler {
    gateway: Gateway,
    prompts: Arc<PromptLibrary>,
}

impl LlmProfiler {
    pub fn new(gateway: Gateway, prompts: Arc<PromptLibrary>) -> Self {
        Self { gateway, prompts }
    }

    fn messages(
        &self,
        memory: &LeadMemory,
        message: &str,
        prior: Option<&ConversationTurn>,
    ) -> Result<Vec<ChatMessage>, StageError> {
        let memory_json = serde_json::to_string(memory).map_err(|e| StageError::Internal {
            stage: StageKind::Profiler,
            message: format!("could not encode memory: {e}"),
        })?;

        let mut context = Context::new();
        context.insert("memory", &memory_json);
        let system = self
            .prompts
            .render(PROFILER_SYSTEM, &context)
            .map_err(|source| StageError::Prompt { stage: StageKind::Profiler, source })?;

        let mut messages = vec![ChatMessage::system(system)];
        if let Some(turn) = prior.filter(|turn| turn.role == TurnRole::Assistant) {
            messages.push(turn.to_message());
        }
        messages.push(ChatMessage::user(message));
        Ok(messages)
    }
}

#[async_trait]
impl ProfilerStage for LlmProfiler {
    async fn profile(
        &self,
        mut memory: LeadMemory,
        message: &str,
        prior: Option<&ConversationTurn>,
    ) -> Result<LeadMemory, StageError> {
        let messages = self.messages(&memory, message, prior)?;

        let extraction =
            match self.gateway.structured::<LeadExtraction>(StageKind::Profiler, messages).await {
                Ok(extraction) => extraction,
                Err(error) => {
                    warn!(
                        event_name = "pipeline.profiler.degraded",
                        error = %error,
                        "profiler extraction failed; memory left unchanged"
                    );
                    return Ok(memory);
                }
            };

        debug!(event_name = "pipeline.profiler.extracted", extraction = ?extraction, "extracted");
        memory.merge(extraction);

        if let Some(field) = memory.settle_pending_ask() {
            info!(
                event_name = "pipeline.profiler.ask_declined",
                field = %field,
                "unanswered ask replaced with placeholder"
            );
        }

        Ok(memory)
    }
}
