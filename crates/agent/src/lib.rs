//! Lead qualification pipeline.
//!
//! One turn runs, in order:
//! 1. **Contact rescue** - email/phone identifiers are appended to memory and
//!    persisted before anything else can fail.
//! 2. **Profiler** (`profiler`) - structured extraction merged into memory.
//! 3. **Strategist** (`strategist`) - ordered decision table picks a tactic.
//! 4. **Safety gate** (`guardrails`) - `allow-meeting` requires a confirmed budget.
//! 5. **Voice** (`voice`) - drafts the reply from the directive alone.
//!
//! Any failure a stage cannot absorb resolves through the rescue protocol in
//! `runtime`: the raw message is persisted and the caller gets a fixed reply.
//!
//! # Safety Principle
//!
//! The model never unlocks scheduling on its own. The gate runs after every
//! strategist decision and is not configurable.

pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod profiler;
pub mod prompts;
pub mod recorder;
pub mod runtime;
pub mod stage;
pub mod strategist;
pub mod voice;

pub use conversation::ConversationTurn;
pub use llm::{GatewayError, LlmClient, OpenAiCompatClient, UnconfiguredClient};
pub use runtime::{Orchestrator, PipelineOutcome, TurnRequest};
