use async_trait::async_trait;
use thiserror::Error;

use leadgate_core::domain::lead::LeadMemory;
use leadgate_core::domain::strategy::StrategyDecision;

use crate::conversation::ConversationTurn;
use crate::llm::StageKind;
use crate::prompts::PromptError;

/// A failure a stage could not absorb. Any of these triggers the rescue
/// protocol in the orchestrator.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{stage} could not render its prompt: {source}")]
    Prompt {
        stage: StageKind,
        #[source]
        source: PromptError,
    },
    #[error("{stage} failed: {message}")]
    Internal { stage: StageKind, message: String },
}

impl StageError {
    pub fn stage(&self) -> StageKind {
        match self {
            Self::Prompt { stage, .. } | Self::Internal { stage, .. } => *stage,
        }
    }
}

#[async_trait]
pub trait ProfilerStage: Send + Sync {
    /// Merges whatever the latest message reveals into `memory`.
    async fn profile(
        &self,
        memory: LeadMemory,
        message: &str,
        prior: Option<&ConversationTurn>,
    ) -> Result<LeadMemory, StageError>;
}

#[async_trait]
pub trait StrategistStage: Send + Sync {
    async fn decide(
        &self,
        memory: &LeadMemory,
        recent: &[ConversationTurn],
        message: &str,
    ) -> Result<StrategyDecision, StageError>;
}

#[async_trait]
pub trait VoiceStage: Send + Sync {
    /// Drafts the user-facing reply. Receives the directive, never the tactic.
    async fn draft(&self, message: &str, directive: &str) -> Result<String, StageError>;
}
