//! XP, levels, badges and daily streaks.
//!
//! Everything here is a pure state transition; persistence of the streak is
//! handled by [`crate::history_store::SessionHistoryStore`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const LEVEL_UP_XP: u32 = 100;
pub const CORRECT_ANSWER_XP: u32 = 20;
pub const STREAK_MILESTONES: [u32; 3] = [7, 14, 30];
/// Largest XP rise a single backend reply may report over the XP it was sent.
pub const MAX_XP_GAIN_PER_REPLY: u32 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamificationState {
    /// Always in `[0, LEVEL_UP_XP)`.
    pub xp: u32,
    pub level: u32,
    /// Insertion-ordered, no duplicates.
    pub badges: Vec<String>,
    pub streak_days: u32,
    pub last_active_date: Option<NaiveDate>,
}

impl Default for GamificationState {
    fn default() -> Self {
        Self {
            xp: 0,
            level: 1,
            badges: Vec::new(),
            streak_days: 0,
            last_active_date: None,
        }
    }
}

/// Persisted shape of the streak, `{streak, lastActiveDate}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StreakRecord {
    pub streak: u32,
    pub last_active_date: Option<NaiveDate>,
}

impl GamificationState {
    pub fn with_streak(record: StreakRecord) -> Self {
        Self {
            streak_days: record.streak,
            last_active_date: record.last_active_date,
            ..Self::default()
        }
    }

    pub fn streak_record(&self) -> StreakRecord {
        StreakRecord {
            streak: self.streak_days,
            last_active_date: self.last_active_date,
        }
    }

    pub fn has_badge(&self, badge: &str) -> bool {
        self.badges.iter().any(|b| b == badge)
    }

    fn award(&mut self, badge: String) {
        if !self.has_badge(&badge) {
            self.badges.push(badge);
        }
    }

    fn roll_over(&mut self) {
        let gained = self.xp / LEVEL_UP_XP;
        self.xp %= LEVEL_UP_XP;
        let reached = self.level.saturating_add(gained);
        for level in self.level + 1..=reached {
            self.award(level_badge(level));
        }
        self.level = reached;
    }
}

pub fn level_badge(level: u32) -> String {
    format!("Level {} Achieved", level)
}

/// +20 XP; crossing 100 levels up once and keeps the remainder.
pub fn apply_correct_answer(state: &GamificationState) -> GamificationState {
    let mut next = state.clone();
    next.xp += CORRECT_ANSWER_XP;
    if next.xp >= LEVEL_UP_XP {
        next.xp -= LEVEL_UP_XP;
        next.level += 1;
        next.award(level_badge(next.level));
    }
    next
}

/// Adopt a running XP total reported by the backend. Totals of several
/// hundred roll over level by level, each level earning its badge. The
/// total is capped at [`MAX_XP_GAIN_PER_REPLY`] above the current XP.
pub fn absorb_reported_xp(state: &GamificationState, reported: u32) -> GamificationState {
    let mut next = state.clone();
    next.xp = reported.min(state.xp.saturating_add(MAX_XP_GAIN_PER_REPLY));
    next.roll_over();
    next
}

pub fn apply_daily_activity(state: &GamificationState, today: NaiveDate) -> GamificationState {
    let mut next = state.clone();
    match state.last_active_date {
        Some(last) if last == today => return next,
        Some(last) if (today - last).num_days() == 1 => next.streak_days += 1,
        _ => next.streak_days = 1,
    }
    next.last_active_date = Some(today);
    next
}

/// Streak milestones reached so far. Derived for display, never stored.
pub fn streak_milestones(streak_days: u32) -> Vec<u32> {
    STREAK_MILESTONES
        .iter()
        .copied()
        .filter(|m| streak_days >= *m)
        .collect()
}

/// Fill of the level progress bar, 0.0..1.0.
pub fn level_progress(state: &GamificationState) -> f32 {
    state.xp as f32 / LEVEL_UP_XP as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_correct_answer_adds_xp() {
        let next = apply_correct_answer(&GamificationState::default());
        assert_eq!(next.xp, 20);
        assert_eq!(next.level, 1);
        assert!(next.badges.is_empty());
    }

    #[test]
    fn test_level_up_keeps_remainder_and_awards_badge() {
        let state = GamificationState { xp: 90, ..Default::default() };
        let next = apply_correct_answer(&state);
        assert_eq!(next.xp, 10);
        assert_eq!(next.level, 2);
        assert_eq!(next.badges, vec!["Level 2 Achieved".to_string()]);
    }

    #[test]
    fn test_level_badge_not_duplicated() {
        let state = GamificationState {
            xp: 80,
            level: 1,
            badges: vec!["Level 2 Achieved".to_string()],
            ..Default::default()
        };
        let next = apply_correct_answer(&state);
        assert_eq!(next.level, 2);
        assert_eq!(next.badges.len(), 1);
    }

    #[test]
    fn test_absorb_reported_xp_rolls_over() {
        let next = absorb_reported_xp(&GamificationState::default(), 250);
        assert_eq!(next.xp, 50);
        assert_eq!(next.level, 3);
        assert_eq!(next.badges, vec![level_badge(2), level_badge(3)]);
    }

    #[test]
    fn test_huge_reported_xp_is_capped() {
        let state = GamificationState { xp: 40, ..Default::default() };
        let next = absorb_reported_xp(&state, 4_000_000_000);
        assert_eq!(next.level, 11);
        assert_eq!(next.xp, 40);
        assert_eq!(next.badges.len(), 10);
        assert_eq!(next.badges.last(), Some(&level_badge(11)));
    }

    #[test]
    fn test_rollover_skips_badges_already_held() {
        let state = GamificationState {
            level: 2,
            badges: vec![level_badge(2), level_badge(3)],
            ..Default::default()
        };
        let next = absorb_reported_xp(&state, 310);
        assert_eq!((next.level, next.xp), (5, 10));
        assert_eq!(next.badges, vec![level_badge(2), level_badge(3), level_badge(4), level_badge(5)]);
    }

    #[test]
    fn test_streak_consecutive_day_increments() {
        let state = GamificationState {
            streak_days: 3,
            last_active_date: Some(date("2024-01-01")),
            ..Default::default()
        };
        let next = apply_daily_activity(&state, date("2024-01-02"));
        assert_eq!(next.streak_days, 4);
        assert_eq!(next.last_active_date, Some(date("2024-01-02")));
    }

    #[test]
    fn test_streak_gap_resets() {
        let state = GamificationState {
            streak_days: 9,
            last_active_date: Some(date("2024-01-01")),
            ..Default::default()
        };
        let next = apply_daily_activity(&state, date("2024-01-05"));
        assert_eq!(next.streak_days, 1);
        assert_eq!(next.last_active_date, Some(date("2024-01-05")));
    }

    #[test]
    fn test_streak_same_day_no_change() {
        let state = GamificationState {
            streak_days: 2,
            last_active_date: Some(date("2024-01-01")),
            ..Default::default()
        };
        assert_eq!(apply_daily_activity(&state, date("2024-01-01")), state);
    }

    #[test]
    fn test_streak_first_activity_starts_at_one() {
        let next = apply_daily_activity(&GamificationState::default(), date("2024-03-10"));
        assert_eq!(next.streak_days, 1);
    }

    #[test]
    fn test_streak_milestones_are_derived() {
        assert!(streak_milestones(6).is_empty());
        assert_eq!(streak_milestones(14), vec![7, 14]);
        assert_eq!(streak_milestones(45), vec![7, 14, 30]);
    }

    #[test]
    fn test_streak_record_json_shape() {
        let record = StreakRecord { streak: 2, last_active_date: Some(date("2024-01-02")) };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"streak":2,"lastActiveDate":"2024-01-02"}"#);
    }

    proptest! {
        #[test]
        fn prop_xp_stays_bounded_and_badges_unique(steps in 0usize..200) {
            let mut state = GamificationState::default();
            for _ in 0..steps {
                let next = apply_correct_answer(&state);
                prop_assert!(next.level >= state.level);
                state = next;
                prop_assert!(state.xp < LEVEL_UP_XP);
            }
            let mut seen = std::collections::HashSet::new();
            for badge in &state.badges {
                prop_assert!(seen.insert(badge.clone()));
            }
        }
    }
}
