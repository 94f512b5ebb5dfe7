//! JSON bodies exchanged with the backend.
//!
//! The backend speaks snake_case; [`WireProfile::from_context`] is the only
//! place the in-process profile is translated to that shape.

use serde::{Deserialize, Serialize};

use super::{ChatAnalytics, ChatReply, GatewayError, LearnerContext};
use crate::gamification::MAX_XP_GAIN_PER_REPLY;
use crate::profile::{clamp_difficulty, AgeGroup, Subject};
use crate::quiz::{AnswerGrade, QuizQuestion};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WireProfile {
    pub age_group: AgeGroup,
    pub subject: Subject,
    pub difficulty_level: u8,
}

impl WireProfile {
    pub fn from_context(context: &LearnerContext) -> Self {
        Self {
            age_group: context.profile.age_group,
            subject: context.profile.subject,
            difficulty_level: context.difficulty,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WireChatRequest<'a> {
    pub message: &'a str,
    pub session_id: &'a str,
    pub profile: WireProfile,
    pub xp: u32,
    pub explain: bool,
    pub persona: &'a str,
    pub language: &'a str,
}

#[derive(Debug, Serialize)]
pub struct WireQuizRequest<'a> {
    pub session_id: &'a str,
    pub profile: WireProfile,
    pub language: &'a str,
}

#[derive(Debug, Serialize)]
pub struct WireQuizAnswerRequest<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    pub session_id: &'a str,
    pub profile: WireProfile,
}

#[derive(Debug, Serialize)]
pub struct WireFlagRequest<'a> {
    pub message: &'a str,
    pub reason: &'a str,
    pub sender: &'a str,
    pub session_id: &'a str,
}

#[derive(Debug, Deserialize, Default)]
pub struct WireAnalytics {
    pub difficulty_level: Option<i64>,
    pub xp_earned: Option<i64>,
    pub message_length: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct WireChatResponse {
    pub reply: String,
    pub xp: Option<i64>,
    pub difficulty_level: Option<i64>,
    pub analytics: Option<WireAnalytics>,
    #[serde(alias = "factWarning")]
    pub fact_warning: Option<String>,
    pub correct: Option<bool>,
}

impl WireChatResponse {
    /// Validate against the XP the request carried. Negative totals are
    /// dropped; totals more than [`MAX_XP_GAIN_PER_REPLY`] above `sent_xp`
    /// reject the whole reply.
    pub fn into_reply(self, sent_xp: u32) -> Result<ChatReply, GatewayError> {
        let xp = self.xp.and_then(|xp| u32::try_from(xp).ok());
        let limit = u64::from(sent_xp) + u64::from(MAX_XP_GAIN_PER_REPLY);
        if let Some(reported) = xp.filter(|xp| u64::from(*xp) > limit) {
            return Err(GatewayError::Decode(format!(
                "reported xp {} exceeds {} for a request sent with {}",
                reported, limit, sent_xp
            )));
        }
        Ok(ChatReply {
            reply: self.reply,
            xp,
            difficulty_level: self.difficulty_level.map(clamp_difficulty),
            analytics: self.analytics.map(|a| ChatAnalytics {
                difficulty_level: a.difficulty_level.map(clamp_difficulty),
                xp_earned: a.xp_earned.and_then(|v| u32::try_from(v).ok()),
                message_length: a.message_length.and_then(|v| u32::try_from(v).ok()),
            }),
            fact_warning: self.fact_warning.filter(|w| !w.trim().is_empty()),
            correct: self.correct,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct WireQuizResponse {
    pub questions: Vec<QuizQuestion>,
}

impl WireQuizResponse {
    pub fn validate(self) -> Result<Vec<QuizQuestion>, GatewayError> {
        if self.questions.is_empty() {
            return Err(GatewayError::Decode("quiz contains no questions".into()));
        }
        if let Some(bad) = self.questions.iter().find(|q| q.choices.is_empty()) {
            return Err(GatewayError::Decode(format!(
                "question has no choices: {}",
                bad.question
            )));
        }
        Ok(self.questions)
    }
}

#[derive(Debug, Deserialize)]
pub struct WireAnswerGrade {
    pub feedback: String,
    pub correct: bool,
    #[serde(alias = "correctAnswer")]
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
}

impl From<WireAnswerGrade> for AnswerGrade {
    fn from(wire: WireAnswerGrade) -> Self {
        AnswerGrade {
            feedback: wire.feedback,
            correct: wire.correct,
            correct_answer: wire.correct_answer,
            explanation: wire.explanation,
        }
    }
}

/// FastAPI-style error body. `detail` may be a string or structured.
#[derive(Debug, Deserialize)]
pub struct WireErrorBody {
    pub detail: Option<serde_json::Value>,
}

impl WireErrorBody {
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            serde_json::Value::String(_) | serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
