//! Backend Gateway - the remote tutoring service, seen from the client.
//!
//! Every call is independent: the client resends the full learner context
//! each time and holds no connection state between calls.

pub mod backend_target;
pub mod http_gateway;
pub mod wire;

pub use backend_target::BackendTarget;
pub use http_gateway::HttpGateway;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Sender;
use crate::profile::{Persona, Profile};
use crate::quiz::{AnswerGrade, QuizQuestion};
use crate::utils::TextUtils;

pub const NETWORK_ERROR_TEXT: &str = "Network or server error. Please try again.";
pub const BACKEND_ERROR_TEXT: &str = "Sorry, there was an error with the AI service.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Transport failure, including request timeout.
    #[error("network error: {0}")]
    Network(String),
    /// Non-success HTTP status.
    #[error("backend returned {status}")]
    Backend { status: u16, detail: Option<String> },
    /// Body could not be read or failed validation.
    #[error("invalid backend response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Text shown in the transcript for this failure.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Backend { detail: Some(detail), .. } => detail.clone(),
            GatewayError::Backend { detail: None, .. } => BACKEND_ERROR_TEXT.to_string(),
            GatewayError::Network(_) | GatewayError::Decode(_) => NETWORK_ERROR_TEXT.to_string(),
        }
    }

    pub fn outcome_label(&self) -> &'static str {
        match self {
            GatewayError::Network(_) => "network_error",
            GatewayError::Backend { .. } => "backend_error",
            GatewayError::Decode(_) => "decode_error",
        }
    }
}

/// Learner context sent with every tutoring call.
#[derive(Debug, Clone)]
pub struct LearnerContext {
    pub session_id: String,
    pub profile: Profile,
    /// Live difficulty; may differ from `profile.difficulty_level`.
    pub difficulty: u8,
    pub xp: u32,
    pub persona: Persona,
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub explain: bool,
    pub context: LearnerContext,
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub image: Bytes,
    pub file_name: String,
    pub context: LearnerContext,
}

#[derive(Debug, Clone)]
pub struct QuizAnswerRequest {
    pub question: String,
    pub answer: String,
    pub context: LearnerContext,
}

#[derive(Debug, Clone)]
pub struct FlagRequest {
    pub message: String,
    pub reason: String,
    pub sender: Sender,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatAnalytics {
    pub difficulty_level: Option<u8>,
    pub xp_earned: Option<u32>,
    pub message_length: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatReply {
    pub reply: String,
    /// Running XP total as computed by the backend.
    pub xp: Option<u32>,
    pub difficulty_level: Option<u8>,
    pub analytics: Option<ChatAnalytics>,
    pub fact_warning: Option<String>,
    /// Explicit verdict; older backends omit it.
    pub correct: Option<bool>,
}

impl ChatReply {
    pub fn text(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            ..Self::default()
        }
    }

    /// The explicit verdict when present, else the legacy reply scan for
    /// "correct" (which also matches "incorrect").
    pub fn is_correct(&self) -> bool {
        self.correct
            .unwrap_or_else(|| TextUtils::contains_ignore_case(&self.reply, "correct"))
    }
}

#[async_trait]
pub trait BackendGateway: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, GatewayError>;
    async fn quiz(&self, context: &LearnerContext) -> Result<Vec<QuizQuestion>, GatewayError>;
    async fn quiz_answer(&self, request: &QuizAnswerRequest) -> Result<AnswerGrade, GatewayError>;
    async fn image(&self, request: &ImageRequest) -> Result<ChatReply, GatewayError>;
    async fn flag(&self, request: &FlagRequest) -> Result<(), GatewayError>;
}
