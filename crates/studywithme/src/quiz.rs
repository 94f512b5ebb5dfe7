//! Quiz run bookkeeping: the index-aligned answer ledger, the frozen review,
//! per-topic tallies and the missed-question counter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::utils::TextUtils;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub choices: Vec<String>,
}

/// Backend verdict for one quiz answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerGrade {
    pub feedback: String,
    pub correct: bool,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Counting(u32),
    Expired,
}

/// Live state of one quiz. `answers`, `feedback`, `correct_answers`,
/// `explanations` and `graded_correct` always have length `current_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizRun {
    pub run_id: u64,
    pub questions: Vec<QuizQuestion>,
    pub current_index: usize,
    pub answers: Vec<String>,
    pub feedback: Vec<String>,
    pub correct_answers: Vec<String>,
    pub explanations: Vec<String>,
    pub graded_correct: Vec<bool>,
    /// Answers the backend graded correct.
    pub score: u32,
    pub time_remaining_seconds: u32,
    pub active: bool,
}

impl QuizRun {
    pub fn new(run_id: u64, questions: Vec<QuizQuestion>, seconds_per_question: u32) -> Self {
        Self {
            run_id,
            questions,
            current_index: 0,
            answers: Vec::new(),
            feedback: Vec::new(),
            correct_answers: Vec::new(),
            explanations: Vec::new(),
            graded_correct: Vec::new(),
            score: 0,
            time_remaining_seconds: seconds_per_question,
            active: true,
        }
    }

    pub fn current_question(&self) -> Option<&QuizQuestion> {
        self.questions.get(self.current_index)
    }

    pub fn is_finished(&self) -> bool {
        self.current_index >= self.questions.len()
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    /// Append one graded answer and move to the next question.
    pub fn record(&mut self, answer: &str, grade: &AnswerGrade, seconds_per_question: u32) {
        self.answers.push(answer.to_string());
        self.feedback.push(grade.feedback.clone());
        self.correct_answers.push(grade.correct_answer.clone());
        self.explanations.push(grade.explanation.clone());
        self.graded_correct.push(grade.correct);
        if grade.correct {
            self.score += 1;
        }
        self.current_index += 1;
        self.time_remaining_seconds = seconds_per_question;
        debug_assert!(self.is_aligned());
    }

    pub fn is_aligned(&self) -> bool {
        let n = self.current_index;
        self.answers.len() == n
            && self.feedback.len() == n
            && self.correct_answers.len() == n
            && self.explanations.len() == n
            && self.graded_correct.len() == n
    }

    /// One second elapses. Never counts below zero.
    pub fn tick(&mut self) -> TickOutcome {
        self.time_remaining_seconds = self.time_remaining_seconds.saturating_sub(1);
        if self.time_remaining_seconds == 0 {
            TickOutcome::Expired
        } else {
            TickOutcome::Counting(self.time_remaining_seconds)
        }
    }

    pub fn reset_timer(&mut self, seconds_per_question: u32) {
        self.time_remaining_seconds = seconds_per_question;
    }

    pub fn into_review(mut self) -> QuizReview {
        self.active = false;
        let score = self
            .answers
            .iter()
            .zip(&self.correct_answers)
            .filter(|(given, expected)| TextUtils::answers_match(given, expected))
            .count() as u32;
        QuizReview {
            total: self.questions.len() as u32,
            questions: self.questions,
            answers: self.answers,
            feedback: self.feedback,
            correct_answers: self.correct_answers,
            explanations: self.explanations,
            score,
        }
    }
}

/// Immutable snapshot of a completed quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizReview {
    pub questions: Vec<QuizQuestion>,
    pub answers: Vec<String>,
    pub feedback: Vec<String>,
    pub correct_answers: Vec<String>,
    pub explanations: Vec<String>,
    /// Answers equal to the expected answer, trimmed and case-insensitive.
    pub score: u32,
    pub total: u32,
}

impl QuizReview {
    pub fn record(&self) -> QuizRecord {
        QuizRecord {
            score: self.score,
            total: self.total,
        }
    }
}

/// Entry of the persisted quiz history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizRecord {
    pub score: u32,
    pub total: u32,
}

impl QuizRecord {
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.score as f32 * 100.0 / self.total as f32
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopicTally {
    pub correct: u32,
    pub total: u32,
}

impl TopicTally {
    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f32 / self.total as f32
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopicStats(BTreeMap<String, TopicTally>);

impl TopicStats {
    pub fn record(&mut self, topic: &str, correct: bool) {
        let tally = self.0.entry(topic.to_string()).or_default();
        tally.total += 1;
        if correct {
            tally.correct += 1;
        }
    }

    pub fn get(&self, topic: &str) -> Option<&TopicTally> {
        self.0.get(topic)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TopicTally)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Miss counts keyed by exact question text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MissedQuestions(BTreeMap<String, u32>);

impl MissedQuestions {
    pub fn record_miss(&mut self, question: &str) {
        *self.0.entry(question.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, question: &str) -> u32 {
        self.0.get(question).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Highest miss counts first; ties in question order.
    pub fn most_missed(&self, limit: usize) -> Vec<(String, u32)> {
        let mut entries: Vec<(String, u32)> =
            self.0.iter().map(|(q, c)| (q.clone(), *c)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(limit);
        entries
    }
}
