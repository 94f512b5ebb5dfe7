//! Session Controller and the state it owns.

pub mod controller;
pub mod guard;
pub mod state;
pub mod timer;

pub use controller::{SessionController, SessionSettings, DEFAULT_SECONDS_PER_QUESTION};
pub use guard::Operation;
pub use state::{AnswerFeedback, QuizStatus, SessionError, SessionView, Toast, ToastKind};
