//! Student and educator summaries derived from the session view and
//! persisted history. Nothing here is stored.

use serde::Serialize;

use crate::history_store::HistoryRecord;
use crate::message::Sender;
use crate::quiz::{MissedQuestions, QuizRecord, TopicStats, TopicTally};
use crate::session::SessionView;

pub const MASTERY_ACCURACY: f32 = 0.8;
pub const MASTERY_MIN_ANSWERS: u32 = 5;
pub const STREAK_ACHIEVEMENT_DAYS: u32 = 3;
pub const DEFAULT_MOST_MISSED: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Achievement {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub unlocked: bool,
    /// 0..=100
    pub progress: u8,
}

impl Achievement {
    fn new(id: &'static str, title: &'static str, description: &'static str, progress: f32) -> Self {
        let progress = (progress.clamp(0.0, 1.0) * 100.0).round() as u8;
        Self { id, title, description, unlocked: progress >= 100, progress }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummary {
    pub total_quizzes: usize,
    pub average_score: f32,
    pub streak_days: u32,
    pub xp: u32,
    pub level: u32,
    pub badges: Vec<String>,
    pub topics_mastered: Vec<String>,
    pub achievements: Vec<Achievement>,
}

impl StudentSummary {
    pub fn build(view: &SessionView) -> Self {
        let topics_mastered: Vec<String> = view
            .topic_stats
            .iter()
            .filter(|(_, tally)| is_mastered(tally))
            .map(|(topic, _)| topic.clone())
            .collect();

        let best_mastery = view
            .topic_stats
            .iter()
            .map(|(_, tally)| mastery_progress(tally))
            .fold(0.0_f32, f32::max);

        let achievements = vec![
            Achievement::new(
                "first_quiz",
                "First Steps",
                "Complete your first quiz",
                view.quiz_history.len() as f32,
            ),
            Achievement::new(
                "streak_3",
                "On Fire!",
                "Maintain a 3-day streak",
                view.gamification.streak_days as f32 / STREAK_ACHIEVEMENT_DAYS as f32,
            ),
            Achievement::new("master_topic", "Topic Master", "Master any topic", best_mastery),
        ];

        Self {
            total_quizzes: view.quiz_history.len(),
            average_score: average_percent(&view.quiz_history),
            streak_days: view.gamification.streak_days,
            xp: view.gamification.xp,
            level: view.gamification.level,
            badges: view.gamification.badges.clone(),
            topics_mastered,
            achievements,
        }
    }

    pub fn achievement(&self, id: &str) -> Option<&Achievement> {
        self.achievements.iter().find(|a| a.id == id)
    }
}

fn is_mastered(tally: &TopicTally) -> bool {
    tally.total >= MASTERY_MIN_ANSWERS && tally.accuracy() >= MASTERY_ACCURACY
}

/// Both conditions must be met, so progress is the weaker of the two.
fn mastery_progress(tally: &TopicTally) -> f32 {
    let volume = tally.total as f32 / MASTERY_MIN_ANSWERS as f32;
    let accuracy = tally.accuracy() / MASTERY_ACCURACY;
    volume.min(accuracy).min(1.0)
}

fn average_percent(history: &[QuizRecord]) -> f32 {
    if history.is_empty() {
        return 0.0;
    }
    history.iter().map(QuizRecord::percent).sum::<f32>() / history.len() as f32
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EducatorSummary {
    pub quiz_history: Vec<QuizRecord>,
    pub user_messages: usize,
    pub bot_messages: usize,
    pub flagged_messages: usize,
    pub average_score: f32,
    pub most_missed: Vec<(String, u32)>,
    pub topic_accuracy: Vec<(String, f32)>,
}

impl EducatorSummary {
    pub fn build(history: &HistoryRecord, missed: &MissedQuestions, topic_stats: &TopicStats, limit: usize) -> Self {
        let user_messages = history.messages.iter().filter(|m| m.sender == Sender::User).count();
        Self {
            quiz_history: history.quiz_history.clone(),
            user_messages,
            bot_messages: history.messages.len() - user_messages,
            flagged_messages: history.messages.iter().filter(|m| m.flagged).count(),
            average_score: average_percent(&history.quiz_history),
            most_missed: missed.most_missed(limit),
            topic_accuracy: topic_stats
                .iter()
                .map(|(topic, tally)| (topic.clone(), tally.accuracy()))
                .collect(),
        }
    }
}
