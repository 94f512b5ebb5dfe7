//! Session Controller: the single authority over what the learner sees.
//!
//! UI events come in through the async methods below, each backend
//! round-trip goes through the [`BackendGateway`], and results are applied to
//! the gamification ledger and the history store before the change counter
//! is bumped for re-rendering.

use bytes::Bytes;
use chrono::{Local, NaiveDate};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::guard::{InFlight, Operation};
use super::state::{
    ActiveQuiz, AnswerFeedback, QuizPhase, SessionError, SessionState, SessionView, Toast,
    FLAG_FAILURE_TEXT, FLAG_SUCCESS_TEXT, OFFLINE_QUIZ_TEXT,
};
use super::timer::{QuizTimer, TICK_PERIOD};
use crate::gamification::{absorb_reported_xp, apply_correct_answer, apply_daily_activity, GamificationState};
use crate::gateway::{
    BackendGateway, ChatReply, ChatRequest, FlagRequest, ImageRequest, LearnerContext,
    QuizAnswerRequest,
};
use crate::history_store::SessionHistoryStore;
use crate::message::Message;
use crate::metrics;
use crate::profile::{clamp_difficulty, Persona, Profile};
use crate::quiz::{QuizQuestion, QuizRun, TickOutcome};

pub const DEFAULT_SECONDS_PER_QUESTION: u32 = 20;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub seconds_per_question: u32,
    pub persona: Persona,
    pub language: String,
    /// Countdown step; one second outside of tests.
    pub tick_period: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            seconds_per_question: DEFAULT_SECONDS_PER_QUESTION,
            persona: Persona::default(),
            language: "en".to_string(),
            tick_period: TICK_PERIOD,
        }
    }
}

pub(crate) struct ControllerInner {
    session_id: String,
    profile: Profile,
    settings: SessionSettings,
    gateway: Arc<dyn BackendGateway>,
    history: SessionHistoryStore,
    state: RwLock<SessionState>,
    in_flight: InFlight,
    offline: AtomicBool,
    next_run_id: AtomicU64,
    changes: watch::Sender<u64>,
}

#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    /// Build a controller over previously persisted history. Does not touch
    /// the streak; see [`SessionController::open`].
    pub fn new(
        profile: Profile,
        settings: SessionSettings,
        gateway: Arc<dyn BackendGateway>,
        history: SessionHistoryStore,
    ) -> Self {
        let stored = history.load();
        let streak = history.load_streak();
        let state = SessionState {
            messages: stored.messages,
            quiz_history: stored.quiz_history,
            gamification: GamificationState::with_streak(streak),
            difficulty: profile.difficulty_level,
            ..SessionState::default()
        };
        let session_id = Uuid::new_v4().to_string();
        info!(
            "Session {} opened: {} / {} at difficulty {} ({} stored messages)",
            session_id,
            profile.age_group,
            profile.subject,
            profile.difficulty_level,
            state.messages.len()
        );
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(ControllerInner {
                session_id,
                profile,
                settings,
                gateway,
                history,
                state: RwLock::new(state),
                in_flight: InFlight::default(),
                offline: AtomicBool::new(false),
                next_run_id: AtomicU64::new(1),
                changes,
            }),
        }
    }

    /// [`SessionController::new`] followed by crediting today's activity.
    pub async fn open(
        profile: Profile,
        settings: SessionSettings,
        gateway: Arc<dyn BackendGateway>,
        history: SessionHistoryStore,
    ) -> Self {
        let controller = Self::new(profile, settings, gateway, history);
        controller.record_daily_activity(Local::now().date_naive()).await;
        controller
    }

    pub(crate) fn inner(&self) -> &Arc<ControllerInner> {
        &self.inner
    }

    pub(crate) fn upgrade(weak: &Weak<ControllerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn profile(&self) -> &Profile {
        &self.inner.profile
    }

    pub fn is_busy(&self) -> bool {
        self.inner.in_flight.is_busy()
    }

    pub fn is_offline(&self) -> bool {
        self.inner.offline.load(Ordering::Acquire)
    }

    /// Change counter, bumped after every state mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    pub async fn snapshot(&self) -> SessionView {
        let state = self.inner.state.read().await;
        let op = self.inner.in_flight.current();
        SessionView::capture(
            &self.inner.session_id,
            &self.inner.profile,
            &state,
            op == Some(Operation::QuizAnswer),
            self.inner.in_flight.is_busy(),
            self.is_offline(),
        )
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|version| *version += 1);
    }

    /// Write-through of the transcript and quiz history. Runs while the
    /// caller holds the state write lock so the store sees saves in the same
    /// order as the mutations; each save is a single small upsert.
    fn persist(&self, state: &SessionState) {
        self.inner.history.save(&state.messages, &state.quiz_history);
    }

    fn learner_context(&self, state: &SessionState) -> LearnerContext {
        LearnerContext {
            session_id: self.inner.session_id.clone(),
            profile: self.inner.profile.clone(),
            difficulty: state.difficulty,
            xp: state.gamification.xp,
            persona: self.inner.settings.persona,
            language: self.inner.settings.language.clone(),
        }
    }

    // ===== Chat =====

    /// Send a chat message. Blank text is ignored. An explain request
    /// re-asks without adding a user bubble or counting a question.
    pub async fn submit_message(&self, text: &str, explain: bool) -> Result<(), SessionError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let guard = self
            .inner
            .in_flight
            .try_begin(Operation::Chat)
            .ok_or(SessionError::Busy)?;

        let context = {
            let mut state = self.inner.state.write().await;
            if !explain {
                state.messages.push(Message::user(text));
                state.questions_asked += 1;
                self.persist(&state);
            }
            self.learner_context(&state)
        };
        self.notify();

        debug!("Sending chat message ({} chars, explain: {})", text.len(), explain);
        let request = ChatRequest { message: text.to_string(), explain, context };
        let result = self.inner.gateway.chat(&request).await;

        {
            let mut state = self.inner.state.write().await;
            match result {
                Ok(reply) => apply_reply(&mut state, reply, explain, true),
                Err(e) => state.messages.push(Message::bot(e.user_message())),
            }
            self.persist(&state);
        }
        drop(guard);
        self.notify();
        Ok(())
    }

    /// Ask the tutor to explain the learner's last message again.
    pub async fn explain_last(&self) -> Result<(), SessionError> {
        let last = {
            let state = self.inner.state.read().await;
            state.last_user_message().map(|m| m.text.clone())
        };
        match last {
            Some(text) => self.submit_message(&text, true).await,
            None => Ok(()),
        }
    }

    pub async fn submit_image(&self, image: Bytes, file_name: &str) -> Result<(), SessionError> {
        if image.is_empty() {
            return Ok(());
        }
        let guard = self
            .inner
            .in_flight
            .try_begin(Operation::Image)
            .ok_or(SessionError::Busy)?;

        let context = {
            let mut state = self.inner.state.write().await;
            state.messages.push(Message::user(format!("[image] {}", file_name)));
            self.persist(&state);
            self.learner_context(&state)
        };
        self.notify();

        let request = ImageRequest { image, file_name: file_name.to_string(), context };
        let result = self.inner.gateway.image(&request).await;

        {
            let mut state = self.inner.state.write().await;
            match result {
                Ok(reply) => apply_reply(&mut state, reply, false, false),
                Err(e) => state.messages.push(Message::bot(e.user_message())),
            }
            self.persist(&state);
        }
        drop(guard);
        self.notify();
        Ok(())
    }

    // ===== Quiz =====

    /// Fetch a quiz (or use the prefetched one when offline) and start the
    /// countdown for its first question.
    pub async fn start_quiz(&self) -> Result<(), SessionError> {
        let guard = self
            .inner
            .in_flight
            .try_begin(Operation::QuizStart)
            .ok_or(SessionError::Busy)?;

        let context = {
            let state = self.inner.state.read().await;
            if state.active_quiz().is_some() {
                return Err(SessionError::QuizAlreadyActive);
            }
            self.learner_context(&state)
        };
        self.notify();

        let questions = if self.is_offline() {
            match self.inner.history.load_quiz_cache() {
                Some(questions) => {
                    info!("Offline: starting quiz from cache ({} questions)", questions.len());
                    questions
                }
                None => {
                    warn!("Offline with no cached quiz; quiz not started");
                    self.push_bot_message(Message::bot(OFFLINE_QUIZ_TEXT)).await;
                    drop(guard);
                    self.notify();
                    return Ok(());
                }
            }
        } else {
            match self.inner.gateway.quiz(&context).await {
                Ok(questions) => {
                    self.inner.history.save_quiz_cache(&questions);
                    questions
                }
                Err(e) => {
                    self.push_bot_message(Message::bot(e.user_message())).await;
                    drop(guard);
                    self.notify();
                    return Ok(());
                }
            }
        };

        self.activate_quiz(questions).await;
        drop(guard);
        self.notify();
        Ok(())
    }

    async fn activate_quiz(&self, questions: Vec<QuizQuestion>) {
        let run_id = self.inner.next_run_id.fetch_add(1, Ordering::Relaxed);
        let seconds = self.inner.settings.seconds_per_question;
        let total = questions.len();
        let mut state = self.inner.state.write().await;
        state.quiz = QuizPhase::Active(ActiveQuiz {
            run: QuizRun::new(run_id, questions, seconds),
            last_feedback: None,
            timer: Some(QuizTimer::start(self, run_id, self.inner.settings.tick_period)),
        });
        info!("Quiz run {} started with {} questions", run_id, total);
    }

    async fn push_bot_message(&self, message: Message) {
        let mut state = self.inner.state.write().await;
        state.messages.push(message);
        self.persist(&state);
    }

    /// Grade the answer to the current question. An empty answer is what
    /// the timer submits on expiry.
    pub async fn submit_quiz_answer(&self, answer: &str) -> Result<(), SessionError> {
        let guard = self
            .inner
            .in_flight
            .try_begin(Operation::QuizAnswer)
            .ok_or(SessionError::Busy)?;

        let (run_id, question, context) = {
            let state = self.inner.state.read().await;
            let active = state.active_quiz().ok_or(SessionError::NoActiveQuiz)?;
            let question = active
                .run
                .current_question()
                .ok_or(SessionError::NoActiveQuiz)?
                .question
                .clone();
            (active.run.run_id, question, self.learner_context(&state))
        };
        self.notify();

        let request = QuizAnswerRequest {
            question: question.clone(),
            answer: answer.to_string(),
            context,
        };
        let result = self.inner.gateway.quiz_answer(&request).await;

        let seconds = self.inner.settings.seconds_per_question;
        let topic = self.inner.profile.subject.as_str();
        {
            let mut locked = self.inner.state.write().await;
            let state = &mut *locked;
            let active = match &mut state.quiz {
                QuizPhase::Active(active) if active.run.run_id == run_id => active,
                _ => {
                    debug!("Discarding grade for quiz run {} which is no longer active", run_id);
                    return Ok(());
                }
            };

            match result {
                Ok(grade) => {
                    active.run.record(answer, &grade, seconds);
                    active.last_feedback = Some(AnswerFeedback {
                        question: question.clone(),
                        answer: answer.to_string(),
                        feedback: grade.feedback.clone(),
                        correct: grade.correct,
                        correct_answer: grade.correct_answer.clone(),
                        explanation: grade.explanation.clone(),
                    });
                    let finished = active.run.is_finished();

                    state.topic_stats.record(topic, grade.correct);
                    if grade.correct {
                        state.correct_answers += 1;
                        state.gamification = apply_correct_answer(&state.gamification);
                    } else {
                        state.incorrect_answers += 1;
                        state.missed_questions.record_miss(&question);
                    }

                    if finished {
                        if let QuizPhase::Active(active) = std::mem::take(&mut state.quiz) {
                            let review = active.finish();
                            info!("Quiz run {} complete: {}/{}", run_id, review.score, review.total);
                            state.quiz_history.push(review.record());
                            state.quiz = QuizPhase::Review(review);
                            metrics::inc_quiz_completed();
                        }
                    }
                }
                Err(e) => {
                    active.run.reset_timer(seconds);
                    state.messages.push(Message::bot(e.user_message()));
                }
            }
            self.persist(state);
        }
        drop(guard);
        self.notify();
        Ok(())
    }

    /// Advance the countdown of the active quiz by one step.
    pub async fn tick(&self) {
        self.tick_run(None).await;
    }

    pub(crate) async fn is_current_run(&self, run_id: u64) -> bool {
        let state = self.inner.state.read().await;
        state.active_quiz().map(|a| a.run.run_id) == Some(run_id)
    }

    /// Returns false when there is no matching active quiz.
    pub(crate) async fn tick_run(&self, run_id: Option<u64>) -> bool {
        let expired = {
            let mut state = self.inner.state.write().await;
            let active = match &mut state.quiz {
                QuizPhase::Active(active) => active,
                _ => return false,
            };
            if run_id.is_some_and(|id| id != active.run.run_id) {
                return false;
            }
            match active.run.tick() {
                TickOutcome::Counting(_) => false,
                TickOutcome::Expired => true,
            }
        };
        self.notify();

        if expired {
            debug!("Question timer expired; submitting empty answer");
            match self.submit_quiz_answer("").await {
                Ok(()) => {}
                Err(SessionError::Busy) => debug!("Timer expired while another request is in flight"),
                Err(e) => debug!("Timer auto-submit skipped: {}", e),
            }
        }
        true
    }

    /// Drop the active quiz without recording it.
    pub async fn abandon_quiz(&self) -> Result<(), SessionError> {
        {
            let mut state = self.inner.state.write().await;
            if state.active_quiz().is_none() {
                return Err(SessionError::NoActiveQuiz);
            }
            state.quiz = QuizPhase::Idle;
        }
        info!("Quiz abandoned");
        self.notify();
        Ok(())
    }

    /// Leave review mode.
    pub async fn dismiss_review(&self) {
        {
            let mut state = self.inner.state.write().await;
            if matches!(state.quiz, QuizPhase::Review(_)) {
                state.quiz = QuizPhase::Idle;
            }
        }
        self.notify();
    }

    /// Store a quiz for offline use without starting it.
    pub async fn prefetch_quiz(&self) -> Result<bool, SessionError> {
        if self.is_offline() {
            return Ok(false);
        }
        let _guard = self
            .inner
            .in_flight
            .try_begin(Operation::QuizStart)
            .ok_or(SessionError::Busy)?;
        let context = {
            let state = self.inner.state.read().await;
            self.learner_context(&state)
        };
        match self.inner.gateway.quiz(&context).await {
            Ok(questions) => {
                self.inner.history.save_quiz_cache(&questions);
                info!("Prefetched {} quiz questions for offline use", questions.len());
                Ok(true)
            }
            Err(e) => {
                warn!("Quiz prefetch failed: {}", e);
                Ok(false)
            }
        }
    }

    // ===== Flagging =====

    pub async fn open_flag(&self, index: usize) -> Result<(), SessionError> {
        {
            let mut state = self.inner.state.write().await;
            if index >= state.messages.len() {
                return Err(SessionError::NoSuchMessage(index));
            }
            state.pending_flag = Some(index);
        }
        self.notify();
        Ok(())
    }

    pub async fn cancel_flag(&self) {
        self.inner.state.write().await.pending_flag = None;
        self.notify();
    }

    /// Mark the pending message flagged and report it. Always yields a
    /// toast; the backend outcome only picks its wording.
    pub async fn confirm_flag(&self, reason: &str) -> Result<Toast, SessionError> {
        let request = {
            let mut state = self.inner.state.write().await;
            let index = state.pending_flag.take().ok_or(SessionError::NoPendingFlag)?;
            let message = state
                .messages
                .get_mut(index)
                .ok_or(SessionError::NoSuchMessage(index))?;
            message.flagged = true;
            let request = FlagRequest {
                message: message.text.clone(),
                reason: reason.to_string(),
                sender: message.sender,
                session_id: self.inner.session_id.clone(),
            };
            self.persist(&state);
            request
        };
        let reporting = self.inner.in_flight.begin_flag();
        self.notify();

        let toast = match self.inner.gateway.flag(&request).await {
            Ok(()) => {
                info!("Message flagged: {}", request.reason);
                Toast::success(FLAG_SUCCESS_TEXT)
            }
            Err(e) => {
                warn!("Flag request failed: {}", e);
                Toast::failure(FLAG_FAILURE_TEXT)
            }
        };
        self.inner.state.write().await.last_toast = Some(toast.clone());
        drop(reporting);
        self.notify();
        Ok(toast)
    }

    pub async fn flag_message(&self, index: usize, reason: &str) -> Result<Toast, SessionError> {
        self.open_flag(index).await?;
        self.confirm_flag(reason).await
    }

    // ===== History, streak, connectivity =====

    /// Irreversibly empty the transcript and quiz history, in memory and on disk.
    pub async fn clear_history(&self) {
        {
            let mut state = self.inner.state.write().await;
            state.messages.clear();
            state.quiz_history.clear();
            state.pending_flag = None;
            self.inner.history.clear();
        }
        info!("History cleared");
        self.notify();
    }

    /// Learner-chosen difficulty (the onboarding slider). Ignored once the
    /// backend has adjusted difficulty; returns whether it was applied.
    pub async fn set_difficulty(&self, level: u8) -> bool {
        let applied = {
            let mut state = self.inner.state.write().await;
            if state.difficulty_from_backend {
                false
            } else {
                state.difficulty = clamp_difficulty(i64::from(level));
                true
            }
        };
        if applied {
            self.notify();
        } else {
            debug!("Ignoring difficulty {}: backend difficulty takes precedence", level);
        }
        applied
    }

    pub async fn record_daily_activity(&self, today: NaiveDate) {
        {
            let mut state = self.inner.state.write().await;
            let next = apply_daily_activity(&state.gamification, today);
            if next != state.gamification {
                info!("Streak now {} day(s)", next.streak_days);
                self.inner.history.save_streak(&next.streak_record());
                state.gamification = next;
            }
        }
        self.notify();
    }

    pub fn set_offline(&self, offline: bool) {
        let previous = self.inner.offline.swap(offline, Ordering::AcqRel);
        if previous != offline {
            info!("Connectivity changed: {}", if offline { "offline" } else { "online" });
            self.notify();
        }
    }

    /// Mirror an online/offline signal (`true` = offline) until either side
    /// goes away.
    pub fn follow_connectivity(&self, mut offline: watch::Receiver<bool>) -> JoinHandle<()> {
        self.set_offline(*offline.borrow_and_update());
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while offline.changed().await.is_ok() {
                let value = *offline.borrow_and_update();
                match SessionController::upgrade(&weak) {
                    Some(controller) => controller.set_offline(value),
                    None => break,
                }
            }
        })
    }
}

/// Apply a tutor reply: transcript, backend-reported XP and difficulty,
/// analytics, and (for chat) the correctness signal.
fn apply_reply(state: &mut SessionState, reply: ChatReply, explain: bool, score: bool) {
    let correct = reply.is_correct();
    let message = if explain {
        Message::explanation(reply.reply)
    } else {
        Message::bot(reply.reply)
    };
    state.messages.push(message);

    if let Some(xp) = reply.xp {
        state.gamification = absorb_reported_xp(&state.gamification, xp);
    }
    if let Some(level) = reply.difficulty_level {
        if level != state.difficulty {
            debug!("Difficulty adjusted by backend: {} -> {}", state.difficulty, level);
        }
        state.difficulty = level;
        state.difficulty_from_backend = true;
    }
    if let Some(analytics) = reply.analytics {
        state.analytics.push(analytics);
    }
    state.fact_warning = reply.fact_warning;

    if score {
        if correct {
            state.correct_answers += 1;
            state.gamification = apply_correct_answer(&state.gamification);
        } else {
            state.incorrect_answers += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, NETWORK_ERROR_TEXT};
    use crate::message::MessageKind;
    use crate::profile::{AgeGroup, Subject};
    use crate::quiz::AnswerGrade;
    use crate::session::state::{QuizStatus, ToastKind};
    use crate::storage::InMemoryLocalStorage;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::Notify;
    use tokio_test::{assert_err, assert_ok};

    /// Backend double answering from queues; an empty queue is a network error.
    #[derive(Default)]
    struct ScriptedGateway {
        chat: Mutex<VecDeque<Result<ChatReply, GatewayError>>>,
        quizzes: Mutex<VecDeque<Result<Vec<QuizQuestion>, GatewayError>>>,
        grades: Mutex<VecDeque<Result<AnswerGrade, GatewayError>>>,
        flag_fails: AtomicBool,
        answers: Mutex<Vec<String>>,
        chat_requests: Mutex<Vec<ChatRequest>>,
        hold: AtomicBool,
        hold_flags: AtomicBool,
        release: Notify,
    }

    impl ScriptedGateway {
        fn reply(self, reply: ChatReply) -> Self {
            self.chat.lock().unwrap().push_back(Ok(reply));
            self
        }

        fn chat_error(self, error: GatewayError) -> Self {
            self.chat.lock().unwrap().push_back(Err(error));
            self
        }

        fn quiz(self, questions: Vec<QuizQuestion>) -> Self {
            self.quizzes.lock().unwrap().push_back(Ok(questions));
            self
        }

        fn grade(self, grade: Result<AnswerGrade, GatewayError>) -> Self {
            self.grades.lock().unwrap().push_back(grade);
            self
        }

        fn held(self) -> Self {
            self.hold.store(true, Ordering::SeqCst);
            self
        }

        fn held_flags(self) -> Self {
            self.hold_flags.store(true, Ordering::SeqCst);
            self
        }

        async fn maybe_hold(&self) {
            if self.hold.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
        }

        fn missing() -> GatewayError {
            GatewayError::Network("no scripted reply".into())
        }
    }

    #[async_trait]
    impl BackendGateway for ScriptedGateway {
        async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, GatewayError> {
            self.chat_requests.lock().unwrap().push(request.clone());
            self.maybe_hold().await;
            self.chat.lock().unwrap().pop_front().unwrap_or_else(|| Err(Self::missing()))
        }

        async fn quiz(&self, _context: &LearnerContext) -> Result<Vec<QuizQuestion>, GatewayError> {
            self.quizzes.lock().unwrap().pop_front().unwrap_or_else(|| Err(Self::missing()))
        }

        async fn quiz_answer(&self, request: &QuizAnswerRequest) -> Result<AnswerGrade, GatewayError> {
            self.answers.lock().unwrap().push(request.answer.clone());
            self.maybe_hold().await;
            self.grades.lock().unwrap().pop_front().unwrap_or_else(|| Err(Self::missing()))
        }

        async fn image(&self, _request: &ImageRequest) -> Result<ChatReply, GatewayError> {
            self.chat.lock().unwrap().pop_front().unwrap_or_else(|| Err(Self::missing()))
        }

        async fn flag(&self, _request: &FlagRequest) -> Result<(), GatewayError> {
            if self.hold_flags.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
            if self.flag_fails.load(Ordering::SeqCst) {
                Err(GatewayError::Backend { status: 500, detail: None })
            } else {
                Ok(())
            }
        }
    }

    fn question(text: &str) -> QuizQuestion {
        QuizQuestion { question: text.into(), choices: vec![] }
    }

    fn grade(correct: bool, correct_answer: &str) -> Result<AnswerGrade, GatewayError> {
        Ok(AnswerGrade {
            feedback: if correct { "Well done".into() } else { "Not this time".into() },
            correct,
            correct_answer: correct_answer.into(),
            explanation: format!("The answer is {}", correct_answer),
        })
    }

    /// Settings whose background timer never fires during a test.
    fn manual_settings() -> SessionSettings {
        SessionSettings { tick_period: Duration::from_secs(3600), ..SessionSettings::default() }
    }

    fn controller_with(
        gateway: ScriptedGateway,
        settings: SessionSettings,
    ) -> (SessionController, Arc<ScriptedGateway>, SessionHistoryStore) {
        let gateway = Arc::new(gateway);
        let history = SessionHistoryStore::new(Arc::new(InMemoryLocalStorage::new()));
        let profile = Profile::new(AgeGroup::Teen, Subject::Math, 3).unwrap();
        let controller = SessionController::new(profile, settings, gateway.clone(), history.clone());
        (controller, gateway, history)
    }

    fn controller(gateway: ScriptedGateway) -> (SessionController, Arc<ScriptedGateway>, SessionHistoryStore) {
        controller_with(gateway, manual_settings())
    }

    async fn wait_until_busy(controller: &SessionController) {
        while !controller.is_busy() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_correct_reply_awards_xp() {
        let (c, _, history) = controller(ScriptedGateway::default().reply(ChatReply::text("That's correct!")));
        c.submit_message("2+2=4?", false).await.unwrap();

        let view = c.snapshot().await;
        assert_eq!(view.messages.len(), 2);
        assert_eq!(view.messages[0], Message::user("2+2=4?"));
        assert_eq!(view.messages[1], Message::bot("That's correct!"));
        assert_eq!(view.questions_asked, 1);
        assert_eq!(view.correct_answers, 1);
        assert_eq!(view.xp(), 20);
        assert_eq!(history.load().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_other_reply_counts_incorrect() {
        let (c, _, _) = controller(ScriptedGateway::default().reply(ChatReply::text("Not quite right")));
        c.submit_message("2+2=5?", false).await.unwrap();

        let view = c.snapshot().await;
        assert_eq!(view.incorrect_answers, 1);
        assert_eq!(view.correct_answers, 0);
        assert_eq!(view.xp(), 0);
    }

    #[tokio::test]
    async fn test_explicit_verdict_beats_reply_text() {
        let reply = ChatReply { correct: Some(false), ..ChatReply::text("That is incorrect") };
        let (c, _, _) = controller(ScriptedGateway::default().reply(reply));
        c.submit_message("x", false).await.unwrap();
        assert_eq!(c.snapshot().await.incorrect_answers, 1);
    }

    #[tokio::test]
    async fn test_backend_xp_and_difficulty_are_adopted() {
        let reply = ChatReply {
            xp: Some(250),
            difficulty_level: Some(7),
            fact_warning: Some("Check this claim".into()),
            correct: Some(false),
            ..ChatReply::text("Hmm")
        };
        let (c, gateway, _) = controller(ScriptedGateway::default().reply(reply).reply(ChatReply::text("ok")));
        c.submit_message("first", false).await.unwrap();

        let view = c.snapshot().await;
        assert_eq!(view.level(), 3);
        assert_eq!(view.xp(), 50);
        assert!(view.gamification.has_badge("Level 3 Achieved"));
        assert_eq!(view.difficulty, 7);
        assert_eq!(view.fact_warning.as_deref(), Some("Check this claim"));

        c.submit_message("second", false).await.unwrap();
        let requests = gateway.chat_requests.lock().unwrap();
        assert_eq!(requests[1].context.difficulty, 7);
        assert_eq!(requests[1].context.xp, 50);
    }

    #[tokio::test]
    async fn test_learner_difficulty_only_until_backend_adjusts() {
        let reply = ChatReply { difficulty_level: Some(6), ..ChatReply::text("ok") };
        let (c, _, _) = controller(ScriptedGateway::default().reply(reply));
        assert!(c.set_difficulty(12).await);
        assert_eq!(c.snapshot().await.difficulty, 10);

        c.submit_message("harder please", false).await.unwrap();
        assert!(!c.set_difficulty(2).await);
        assert_eq!(c.snapshot().await.difficulty, 6);
    }

    #[tokio::test]
    async fn test_backend_error_detail_becomes_bot_message() {
        let (c, _, _) = controller(
            ScriptedGateway::default()
                .chat_error(GatewayError::Backend { status: 503, detail: Some("Model overloaded".into()) })
                .chat_error(GatewayError::Network("refused".into())),
        );
        c.submit_message("a", false).await.unwrap();
        c.submit_message("b", false).await.unwrap();

        let view = c.snapshot().await;
        assert_eq!(view.messages[1].text, "Model overloaded");
        assert_eq!(view.messages[3].text, NETWORK_ERROR_TEXT);
        assert!(!view.busy);
    }

    #[tokio::test]
    async fn test_blank_message_is_ignored() {
        let (c, gateway, _) = controller(ScriptedGateway::default());
        c.submit_message("   ", false).await.unwrap();
        assert!(c.snapshot().await.messages.is_empty());
        assert!(gateway.chat_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_explain_last_adds_explanation_only() {
        let (c, gateway, _) = controller(
            ScriptedGateway::default()
                .reply(ChatReply::text("Photosynthesis makes sugar"))
                .reply(ChatReply::text("Plants use light to make food")),
        );
        c.submit_message("What is photosynthesis?", false).await.unwrap();
        c.explain_last().await.unwrap();

        let view = c.snapshot().await;
        assert_eq!(view.messages.len(), 3);
        assert_eq!(view.messages[2].kind, MessageKind::Explanation);
        assert_eq!(view.questions_asked, 1);
        let requests = gateway.chat_requests.lock().unwrap();
        assert!(requests[1].explain);
        assert_eq!(requests[1].message, "What is photosynthesis?");
    }

    #[tokio::test]
    async fn test_image_adds_placeholder_and_reply() {
        let (c, _, _) = controller(ScriptedGateway::default().reply(ChatReply::text("A correct triangle")));
        c.submit_image(Bytes::from_static(b"\x89PNG"), "shape.png").await.unwrap();

        let view = c.snapshot().await;
        assert_eq!(view.messages[0].text, "[image] shape.png");
        assert_eq!(view.messages[1].text, "A correct triangle");
        assert_eq!(view.correct_answers, 0);
    }

    #[tokio::test]
    async fn test_second_request_rejected_while_busy() {
        let (c, gateway, _) = controller(ScriptedGateway::default().reply(ChatReply::text("done")).held());
        let first = tokio::spawn({
            let c = c.clone();
            async move { c.submit_message("one", false).await }
        });
        wait_until_busy(&c).await;

        assert_eq!(c.submit_message("two", false).await, Err(SessionError::Busy));
        assert_eq!(c.start_quiz().await, Err(SessionError::Busy));

        gateway.release.notify_one();
        first.await.unwrap().unwrap();
        let view = c.snapshot().await;
        assert_eq!(view.messages.len(), 2);
        assert!(!view.busy);
    }

    #[tokio::test]
    async fn test_offline_without_cache_explains_and_stays_idle() {
        let (c, _, _) = controller(ScriptedGateway::default());
        c.set_offline(true);
        c.start_quiz().await.unwrap();

        let view = c.snapshot().await;
        assert_eq!(view.messages, vec![Message::bot(OFFLINE_QUIZ_TEXT)]);
        assert_eq!(view.quiz_status, QuizStatus::Idle);
    }

    #[tokio::test]
    async fn test_offline_uses_prefetched_quiz() {
        let (c, _, _) = controller(ScriptedGateway::default().quiz(vec![question("Q1"), question("Q2")]));
        assert!(c.prefetch_quiz().await.unwrap());
        c.set_offline(true);
        assert!(!c.prefetch_quiz().await.unwrap());

        c.start_quiz().await.unwrap();
        let view = c.snapshot().await;
        assert_eq!(view.quiz_status, QuizStatus::AwaitingAnswer);
        assert_eq!(view.current_question().unwrap().question, "Q1");
    }

    #[tokio::test]
    async fn test_quiz_run_to_review() {
        let (c, _, _) = controller(
            ScriptedGateway::default()
                .quiz(vec![question("2+2?"), question("Capital of France?")])
                .grade(grade(true, "4"))
                .grade(grade(false, "Paris")),
        );
        assert_ok!(c.start_quiz().await);
        assert_eq!(c.start_quiz().await, Err(SessionError::QuizAlreadyActive));

        c.submit_quiz_answer(" 4 ").await.unwrap();
        let view = c.snapshot().await;
        let run = view.quiz_run.as_ref().unwrap();
        assert_eq!(run.current_index, 1);
        assert!(run.is_aligned());
        assert!(view.last_feedback.as_ref().unwrap().correct);
        assert_eq!(view.xp(), 20);

        c.submit_quiz_answer("Lyon").await.unwrap();
        let view = c.snapshot().await;
        assert_eq!(view.quiz_status, QuizStatus::Complete);
        let review = view.review.unwrap();
        assert_eq!(review.answers, vec![" 4 ".to_string(), "Lyon".to_string()]);
        assert_eq!((review.score, review.total), (1, 2));
        assert_eq!(view.quiz_history.len(), 1);
        assert_eq!(view.missed_questions.count("Capital of France?"), 1);
        let tally = view.topic_stats.get("math").unwrap();
        assert_eq!((tally.correct, tally.total), (1, 2));

        assert_eq!(c.submit_quiz_answer("late").await, Err(SessionError::NoActiveQuiz));
        c.dismiss_review().await;
        assert_eq!(c.snapshot().await.quiz_status, QuizStatus::Idle);
    }

    #[tokio::test]
    async fn test_answer_without_quiz_is_rejected() {
        let (c, _, _) = controller(ScriptedGateway::default());
        assert_eq!(c.submit_quiz_answer("4").await, Err(SessionError::NoActiveQuiz));
    }

    #[tokio::test]
    async fn test_expiry_submits_empty_answer_and_resets() {
        let (c, gateway, _) = controller(
            ScriptedGateway::default()
                .quiz(vec![question("Q1"), question("Q2")])
                .grade(grade(false, "x")),
        );
        c.start_quiz().await.unwrap();
        for _ in 0..19 {
            c.tick().await;
        }
        assert_eq!(c.snapshot().await.time_remaining_seconds(), Some(1));
        assert!(gateway.answers.lock().unwrap().is_empty());

        c.tick().await;
        let view = c.snapshot().await;
        assert_eq!(*gateway.answers.lock().unwrap(), vec![String::new()]);
        assert_eq!(view.time_remaining_seconds(), Some(20));
        assert_eq!(view.quiz_run.unwrap().answers, vec![String::new()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_runs_on_its_own() {
        let settings = SessionSettings { tick_period: Duration::from_secs(1), ..SessionSettings::default() };
        let (c, gateway, _) = controller_with(
            ScriptedGateway::default().quiz(vec![question("Q1")]).grade(grade(false, "x")),
            settings,
        );
        c.start_quiz().await.unwrap();

        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(c.snapshot().await.time_remaining_seconds(), Some(15));

        tokio::time::sleep(Duration::from_secs(30)).await;
        let view = c.snapshot().await;
        assert_eq!(view.quiz_status, QuizStatus::Complete);
        assert_eq!(view.review.unwrap().answers, vec![String::new()]);
        assert_eq!(gateway.answers.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_grading_keeps_question_and_resets_timer() {
        let (c, _, _) = controller(
            ScriptedGateway::default()
                .quiz(vec![question("Q1")])
                .grade(Err(GatewayError::Network("reset".into()))),
        );
        c.start_quiz().await.unwrap();
        for _ in 0..5 {
            c.tick().await;
        }
        c.submit_quiz_answer("guess").await.unwrap();

        let view = c.snapshot().await;
        let run = view.quiz_run.as_ref().unwrap();
        assert_eq!(run.current_index, 0);
        assert!(run.answers.is_empty());
        assert_eq!(run.time_remaining_seconds, 20);
        assert_eq!(view.messages.last().unwrap().text, NETWORK_ERROR_TEXT);
    }

    #[tokio::test]
    async fn test_grade_for_abandoned_run_is_discarded() {
        let (c, gateway, _) = controller(
            ScriptedGateway::default()
                .quiz(vec![question("Q1")])
                .grade(grade(true, "4"))
                .held(),
        );
        c.start_quiz().await.unwrap();
        let pending = tokio::spawn({
            let c = c.clone();
            async move { c.submit_quiz_answer("4").await }
        });
        wait_until_busy(&c).await;
        assert_eq!(c.snapshot().await.quiz_status, QuizStatus::Grading);

        assert_ok!(c.abandon_quiz().await);
        assert_err!(c.abandon_quiz().await);
        gateway.release.notify_one();
        pending.await.unwrap().unwrap();

        let view = c.snapshot().await;
        assert_eq!(view.quiz_status, QuizStatus::Idle);
        assert!(view.quiz_history.is_empty());
        assert_eq!(view.xp(), 0);
    }

    #[tokio::test]
    async fn test_flag_toasts() {
        let (c, gateway, history) = controller(ScriptedGateway::default().reply(ChatReply::text("2+2=5")));
        c.submit_message("2+2?", false).await.unwrap();

        let toast = c.flag_message(1, "wrong maths").await.unwrap();
        assert_eq!(toast, Toast::success(FLAG_SUCCESS_TEXT));
        assert!(history.load().messages[1].flagged);

        gateway.flag_fails.store(true, Ordering::SeqCst);
        let toast = c.flag_message(0, "oops").await.unwrap();
        assert_eq!(toast.kind, ToastKind::Failure);
        assert_eq!(toast.text, FLAG_FAILURE_TEXT);
        let view = c.snapshot().await;
        assert!(view.messages[0].flagged);
        assert_eq!(view.last_toast, Some(toast));
    }

    #[tokio::test]
    async fn test_flag_dialog_preconditions() {
        let (c, _, _) = controller(ScriptedGateway::default());
        assert_eq!(c.open_flag(0).await, Err(SessionError::NoSuchMessage(0)));
        assert_eq!(c.confirm_flag("x").await, Err(SessionError::NoPendingFlag));

        c.push_bot_message(Message::bot("hello")).await;
        assert_ok!(c.open_flag(0).await);
        assert_eq!(c.snapshot().await.pending_flag, Some(0));
        c.cancel_flag().await;
        assert_eq!(c.snapshot().await.pending_flag, None);
        assert!(!c.snapshot().await.messages[0].flagged);
    }

    #[tokio::test]
    async fn test_outstanding_flag_report_shows_busy() {
        let (c, gateway, _) = controller(
            ScriptedGateway::default()
                .reply(ChatReply::text("2+2=5"))
                .reply(ChatReply::text("ok"))
                .held_flags(),
        );
        c.submit_message("2+2?", false).await.unwrap();

        let flagging = tokio::spawn({
            let c = c.clone();
            async move { c.flag_message(1, "wrong maths").await }
        });
        wait_until_busy(&c).await;
        let view = c.snapshot().await;
        assert!(view.busy);
        assert_eq!(view.quiz_status, QuizStatus::Idle);
        assert!(view.messages[1].flagged);
        assert_ok!(c.submit_message("next", false).await);

        gateway.release.notify_one();
        let toast = flagging.await.unwrap().unwrap();
        assert_eq!(toast.kind, ToastKind::Success);
        assert!(!c.snapshot().await.busy);
    }

    #[tokio::test]
    async fn test_store_follows_interleaved_chat_and_flag() {
        let (c, gateway, history) = controller(
            ScriptedGateway::default()
                .reply(ChatReply::text("first"))
                .reply(ChatReply::text("second")),
        );
        c.submit_message("a", false).await.unwrap();

        gateway.hold.store(true, Ordering::SeqCst);
        let chatting = tokio::spawn({
            let c = c.clone();
            async move { c.submit_message("b", false).await }
        });
        wait_until_busy(&c).await;
        c.flag_message(1, "unsure").await.unwrap();
        gateway.release.notify_one();
        chatting.await.unwrap().unwrap();

        let view = c.snapshot().await;
        assert_eq!(view.messages.len(), 4);
        assert!(view.messages[1].flagged);
        assert_eq!(history.load().messages, view.messages);
    }

    #[tokio::test]
    async fn test_clear_history_empties_transcript_and_store() {
        let (c, _, history) = controller(ScriptedGateway::default().reply(ChatReply::text("hi")));
        c.submit_message("hello", false).await.unwrap();
        c.clear_history().await;

        assert!(c.snapshot().await.messages.is_empty());
        assert_eq!(history.load(), Default::default());
    }

    #[tokio::test]
    async fn test_history_is_restored_on_open() {
        let storage = Arc::new(InMemoryLocalStorage::new());
        let history = SessionHistoryStore::new(storage.clone());
        history.save(&[Message::user("earlier")], &[]);

        let c = SessionController::new(
            Profile::default(),
            manual_settings(),
            Arc::new(ScriptedGateway::default()),
            SessionHistoryStore::new(storage),
        );
        assert_eq!(c.snapshot().await.messages, vec![Message::user("earlier")]);
    }

    #[tokio::test]
    async fn test_daily_activity_extends_and_persists_streak() {
        let (c, _, history) = controller(ScriptedGateway::default());
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        c.record_daily_activity(day).await;
        c.record_daily_activity(day).await;
        c.record_daily_activity(day.succ_opt().unwrap()).await;

        assert_eq!(c.snapshot().await.gamification.streak_days, 2);
        assert_eq!(history.load_streak().streak, 2);
    }

    #[tokio::test]
    async fn test_follow_connectivity_and_change_counter() {
        let (c, _, _) = controller(ScriptedGateway::default());
        let mut changes = c.subscribe();
        let (tx, rx) = watch::channel(false);
        let _listener = c.follow_connectivity(rx);

        tx.send(true).unwrap();
        for _ in 0..10 {
            if c.is_offline() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(c.is_offline());
        assert!(c.snapshot().await.offline);
        assert!(changes.has_changed().unwrap());
        changes.borrow_and_update();
        assert!(!changes.has_changed().unwrap());
    }
}
