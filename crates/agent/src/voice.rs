use std::sync::Arc;

use async_trait::async_trait;
use tera::Context;
use tracing::warn;

use crate::llm::{ChatMessage, Gateway, StageKind};
use crate::prompts::{PromptLibrary, VOICE_SYSTEM};
use crate::stage::{StageError, VoiceStage};

pub const HIGH_LOAD_REPLY: &str = "En este momento estamos atendiendo una demanda muy alta. \
    Le pedimos una disculpa: en unos minutos podremos continuar con su solicitud.";

pub struct LlmVoice {
    gateway: Gateway,
    prompts: Arc<PromptLibrary>,
}

impl LlmVoice {
    pub fn new(gateway: Gateway, prompts: Arc<PromptLibrary>) -> Self {
        Self { gateway, prompts }
    }
}

#[async_trait]
impl VoiceStage for LlmVoice {
    async fn draft(&self, message: &str, directive: &str) -> Result<String, StageError> {
        let mut context = Context::new();
        context.insert("directive", directive);
        let system = self
            .prompts
            .render(VOICE_SYSTEM, &context)
            .map_err(|source| StageError::Prompt { stage: StageKind::Voice, source })?;

        let messages = vec![ChatMessage::system(system), ChatMessage::user(message)];
        match self.gateway.text(StageKind::Voice, messages).await {
            Ok(reply) => Ok(reply),
            Err(error) => {
                warn!(
                    event_name = "pipeline.voice.degraded",
                    error = %error,
                    "voice call failed; returning high-load reply"
                );
                Ok(HIGH_LOAD_REPLY.to_string())
            }
        }
    }
}
