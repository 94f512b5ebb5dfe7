//! Controller-owned state and the view model handed to the display layer.

use serde::Serialize;
use thiserror::Error;

use super::timer::QuizTimer;
use crate::gamification::{streak_milestones, GamificationState};
use crate::gateway::ChatAnalytics;
use crate::message::Message;
use crate::profile::Profile;
use crate::quiz::{MissedQuestions, QuizQuestion, QuizRecord, QuizReview, QuizRun, TopicStats};

pub const OFFLINE_QUIZ_TEXT: &str =
    "You're offline and no quiz has been saved yet. Connect to the internet to start a quiz.";
pub const FLAG_SUCCESS_TEXT: &str = "Message flagged for review. Thank you!";
pub const FLAG_FAILURE_TEXT: &str = "Could not flag message. Please try again later.";

/// Rejected preconditions. Backend failures never surface here; they
/// become transcript messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("another request is still in flight")]
    Busy,
    #[error("no quiz question is awaiting an answer")]
    NoActiveQuiz,
    #[error("a quiz is already in progress")]
    QuizAlreadyActive,
    #[error("no message at index {0}")]
    NoSuchMessage(usize),
    #[error("no flag confirmation is open")]
    NoPendingFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub kind: ToastKind,
    pub text: String,
}

impl Toast {
    pub fn success(text: impl Into<String>) -> Self {
        Self { kind: ToastKind::Success, text: text.into() }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self { kind: ToastKind::Failure, text: text.into() }
    }
}

/// Transient feedback for the answer just graded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerFeedback {
    pub question: String,
    pub answer: String,
    pub feedback: String,
    pub correct: bool,
    pub correct_answer: String,
    pub explanation: String,
}

#[derive(Debug)]
pub(crate) struct ActiveQuiz {
    pub run: QuizRun,
    pub last_feedback: Option<AnswerFeedback>,
    pub timer: Option<QuizTimer>,
}

impl ActiveQuiz {
    /// Freeze the run. The timer is dropped, and with it the countdown.
    pub fn finish(self) -> QuizReview {
        let ActiveQuiz { run, timer, .. } = self;
        drop(timer);
        run.into_review()
    }
}

#[derive(Debug, Default)]
pub(crate) enum QuizPhase {
    #[default]
    Idle,
    Active(ActiveQuiz),
    Review(QuizReview),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    Idle,
    AwaitingAnswer,
    Grading,
    Complete,
}

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub messages: Vec<Message>,
    pub quiz_history: Vec<QuizRecord>,
    pub gamification: GamificationState,
    /// Live difficulty. Backend responses win once the session has started.
    pub difficulty: u8,
    /// Set once a backend reply has supplied a difficulty.
    pub difficulty_from_backend: bool,
    pub questions_asked: u32,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
    pub analytics: Vec<ChatAnalytics>,
    pub fact_warning: Option<String>,
    pub quiz: QuizPhase,
    pub topic_stats: TopicStats,
    pub missed_questions: MissedQuestions,
    pub pending_flag: Option<usize>,
    pub last_toast: Option<Toast>,
}

impl SessionState {
    pub fn active_quiz(&self) -> Option<&ActiveQuiz> {
        match &self.quiz {
            QuizPhase::Active(active) => Some(active),
            _ => None,
        }
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_from_user())
    }
}

/// Everything the display layer renders, captured at one instant.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub session_id: String,
    pub profile: Profile,
    pub messages: Vec<Message>,
    pub gamification: GamificationState,
    pub streak_milestones: Vec<u32>,
    pub difficulty: u8,
    pub busy: bool,
    pub offline: bool,
    pub questions_asked: u32,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
    pub analytics: Vec<ChatAnalytics>,
    pub fact_warning: Option<String>,
    pub quiz_status: QuizStatus,
    pub quiz_run: Option<QuizRun>,
    pub last_feedback: Option<AnswerFeedback>,
    pub review: Option<QuizReview>,
    pub quiz_history: Vec<QuizRecord>,
    pub topic_stats: TopicStats,
    pub missed_questions: MissedQuestions,
    pub pending_flag: Option<usize>,
    pub last_toast: Option<Toast>,
}

impl SessionView {
    pub(crate) fn capture(
        session_id: &str,
        profile: &Profile,
        state: &SessionState,
        grading: bool,
        busy: bool,
        offline: bool,
    ) -> Self {
        let (quiz_status, quiz_run, last_feedback, review) = match &state.quiz {
            QuizPhase::Idle => (QuizStatus::Idle, None, None, None),
            QuizPhase::Active(active) => (
                if grading { QuizStatus::Grading } else { QuizStatus::AwaitingAnswer },
                Some(active.run.clone()),
                active.last_feedback.clone(),
                None,
            ),
            QuizPhase::Review(review) => (QuizStatus::Complete, None, None, Some(review.clone())),
        };
        Self {
            session_id: session_id.to_string(),
            profile: profile.clone(),
            messages: state.messages.clone(),
            streak_milestones: streak_milestones(state.gamification.streak_days),
            gamification: state.gamification.clone(),
            difficulty: state.difficulty,
            busy,
            offline,
            questions_asked: state.questions_asked,
            correct_answers: state.correct_answers,
            incorrect_answers: state.incorrect_answers,
            analytics: state.analytics.clone(),
            fact_warning: state.fact_warning.clone(),
            quiz_status,
            quiz_run,
            last_feedback,
            review,
            quiz_history: state.quiz_history.clone(),
            topic_stats: state.topic_stats.clone(),
            missed_questions: state.missed_questions.clone(),
            pending_flag: state.pending_flag,
            last_toast: state.last_toast.clone(),
        }
    }

    pub fn current_question(&self) -> Option<&QuizQuestion> {
        self.quiz_run.as_ref().and_then(|run| run.current_question())
    }

    pub fn time_remaining_seconds(&self) -> Option<u32> {
        self.quiz_run.as_ref().map(|run| run.time_remaining_seconds)
    }

    pub fn xp(&self) -> u32 {
        self.gamification.xp
    }

    pub fn level(&self) -> u32 {
        self.gamification.level
    }
}
