//! Durable transcript, quiz history, streak and prefetched quiz.
//!
//! Reads never fail: a missing or unparseable record is treated as absent.
//! Writes are full replacements; the last writer wins.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::gamification::StreakRecord;
use crate::message::Message;
use crate::quiz::{QuizQuestion, QuizRecord};
use crate::storage::{LocalStorage, HISTORY_KEY, QUIZ_CACHE_KEY, STREAK_KEY};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub quiz_history: Vec<QuizRecord>,
}

#[derive(Clone)]
pub struct SessionHistoryStore {
    storage: Arc<dyn LocalStorage>,
}

impl SessionHistoryStore {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    pub fn load(&self) -> HistoryRecord {
        self.read(HISTORY_KEY).unwrap_or_default()
    }

    pub fn save(&self, messages: &[Message], quiz_history: &[QuizRecord]) {
        let record = HistoryRecord {
            messages: messages.to_vec(),
            quiz_history: quiz_history.to_vec(),
        };
        self.write(HISTORY_KEY, &record);
    }

    pub fn clear(&self) {
        if let Err(e) = self.storage.remove_item(HISTORY_KEY) {
            warn!("Failed to clear stored history: {}", e);
        }
    }

    pub fn load_streak(&self) -> StreakRecord {
        self.read(STREAK_KEY).unwrap_or_default()
    }

    pub fn save_streak(&self, record: &StreakRecord) {
        self.write(STREAK_KEY, record);
    }

    pub fn load_quiz_cache(&self) -> Option<Vec<QuizQuestion>> {
        self.read::<Vec<QuizQuestion>>(QUIZ_CACHE_KEY)
            .filter(|questions| !questions.is_empty())
    }

    pub fn save_quiz_cache(&self, questions: &[QuizQuestion]) {
        self.write(QUIZ_CACHE_KEY, &questions);
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.storage.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read {}: {}", key, e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring corrupt record under {}: {}", key, e);
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize {}: {}", key, e);
                return;
            }
        };
        match self.storage.set_item(key, &json) {
            Ok(()) => debug!("Saved {}", key),
            Err(e) => warn!("Failed to save {}: {}", key, e),
        }
    }
}
