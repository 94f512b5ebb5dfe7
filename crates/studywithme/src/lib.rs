// studywithme/src/lib.rs

pub mod config;
pub mod dashboard;
pub mod gamification;
pub mod gateway;
pub mod history_store;
pub mod message;
pub mod metrics;
pub mod profile;
pub mod quiz;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod utils;

// Public API exports
pub use config::Config;
pub use dashboard::{Achievement, EducatorSummary, StudentSummary};
pub use gamification::GamificationState;
pub use gateway::{BackendGateway, BackendTarget, GatewayError, HttpGateway};
pub use history_store::SessionHistoryStore;
pub use message::{Message, MessageKind, Sender};
pub use profile::{AgeGroup, Persona, Profile, Subject};
pub use quiz::{QuizQuestion, QuizRecord, QuizReview, QuizRun};
pub use session::{QuizStatus, SessionController, SessionError, SessionSettings, SessionView, Toast};
pub use storage::{InMemoryLocalStorage, LocalStorage, SqliteLocalStorage};
