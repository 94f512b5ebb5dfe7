// studywithme/src/main.rs

#[cfg(feature = "cli")]
mod cli {
    use std::sync::Arc;

    use clap::{Parser, Subcommand};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tracing::debug;

    use studywithme::dashboard::DEFAULT_MOST_MISSED;
    use studywithme::gamification::level_progress;
    use studywithme::utils::TextUtils;
    use studywithme::{
        metrics, AgeGroup, BackendTarget, Config, EducatorSummary, HttpGateway,
        Message, MessageKind, Persona, Profile, QuizStatus, Sender, SessionController,
        SessionError, SessionHistoryStore, SessionView, SqliteLocalStorage, StudentSummary,
        Subject,
    };

    #[derive(Parser, Debug)]
    #[command(name = "studywithme", about = "AI tutoring session in the terminal")]
    pub struct Cli {
        #[arg(long, global = true, default_value = "adult")]
        age_group: AgeGroup,
        #[arg(long, global = true, default_value = "math")]
        subject: Subject,
        #[arg(long, global = true, default_value_t = 1)]
        difficulty: u8,
        /// Overrides STUDYWITHME_PERSONA
        #[arg(long, global = true)]
        persona: Option<Persona>,
        /// Overrides STUDYWITHME_LANGUAGE
        #[arg(long, global = true)]
        language: Option<String>,
        #[command(subcommand)]
        command: Command,
    }

    #[derive(Subcommand, Debug)]
    enum Command {
        /// Chat with the tutor (/explain, /flag <n> <reason>, /quit)
        Chat,
        /// Take a timed quiz
        Quiz,
        /// Print the stored transcript and quiz history
        History,
        /// Delete the stored transcript and quiz history
        Clear,
        /// Progress summary for the learner and their educator
        Dashboard,
    }

    pub async fn run(cli: Cli) -> anyhow::Result<()> {
        let cfg = Config::from_env()?;
        cfg.print_config();
        metrics::init_metrics()?;

        let mut settings = cfg.session_settings();
        if let Some(persona) = cli.persona {
            settings.persona = persona;
        }
        if let Some(language) = cli.language {
            settings.language = language;
        }
        let profile = Profile::new(cli.age_group, cli.subject, cli.difficulty)?;

        let storage = SqliteLocalStorage::open(&cfg.storage_path())?;
        let history = SessionHistoryStore::new(Arc::new(storage));
        let gateway = HttpGateway::new(BackendTarget::new(cfg.backend_url.clone()), cfg.request_timeout())?;
        let controller = SessionController::open(profile, settings, Arc::new(gateway), history.clone()).await;

        match cli.command {
            Command::Chat => chat(&controller).await?,
            Command::Quiz => quiz(&controller).await?,
            Command::History => print_history(&controller.snapshot().await),
            Command::Clear => {
                controller.clear_history().await;
                println!("History cleared.");
            }
            Command::Dashboard => {
                let view = controller.snapshot().await;
                print_student(&StudentSummary::build(&view), &view);
                print_educator(&EducatorSummary::build(
                    &history.load(),
                    &view.missed_questions,
                    &view.topic_stats,
                    DEFAULT_MOST_MISSED,
                ));
            }
        }

        debug!("{}", metrics::gather_text()?);
        Ok(())
    }

    async fn chat(controller: &SessionController) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut shown = controller.snapshot().await.messages.len();
        println!("Ask a question. /explain re-explains, /flag <n> <reason> reports a message, /quit leaves.");

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            let result = match line {
                "/quit" => break,
                "/explain" => controller.explain_last().await,
                _ if line.starts_with("/flag") => flag(controller, line).await,
                _ => controller.submit_message(line, false).await,
            };
            if let Err(e) = result {
                println!("! {}", e);
            }

            let view = controller.snapshot().await;
            for (index, message) in view.messages.iter().enumerate().skip(shown) {
                print_message(index, message);
            }
            shown = view.messages.len();
            if let Some(warning) = &view.fact_warning {
                println!("  (fact check: {})", warning);
            }
            println!("  [level {} | {} xp | difficulty {}]", view.level(), view.xp(), view.difficulty);
        }
        Ok(())
    }

    async fn flag(controller: &SessionController, line: &str) -> Result<(), SessionError> {
        let mut parts = line.splitn(3, ' ').skip(1);
        let index = match parts.next().and_then(|n| n.parse::<usize>().ok()) {
            Some(index) => index,
            None => {
                println!("usage: /flag <message number> <reason>");
                return Ok(());
            }
        };
        let reason = parts.next().unwrap_or("inappropriate");
        let toast = controller.flag_message(index, reason).await?;
        println!("* {}", toast.text);
        Ok(())
    }

    async fn quiz(controller: &SessionController) -> anyhow::Result<()> {
        let mut changes = controller.subscribe();
        let before = controller.snapshot().await.messages.len();
        if let Err(e) = controller.start_quiz().await {
            println!("! {}", e);
            return Ok(());
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut shown_question = None;
        let mut shown_messages = before;
        loop {
            let view = controller.snapshot().await;
            for message in view.messages.iter().skip(shown_messages) {
                println!("{}", message.text);
            }
            shown_messages = view.messages.len();

            match view.quiz_status {
                QuizStatus::Idle => return Ok(()),
                QuizStatus::Complete => {
                    print_review(&view);
                    controller.dismiss_review().await;
                    return Ok(());
                }
                QuizStatus::Grading => {}
                QuizStatus::AwaitingAnswer => {
                    let run = view.quiz_run.as_ref();
                    let index = run.map(|r| r.current_index);
                    if index != shown_question {
                        if let Some(feedback) = &view.last_feedback {
                            println!("{} {}", if feedback.correct { "✓" } else { "✗" }, feedback.feedback);
                        }
                        if let (Some(q), Some(run)) = (view.current_question(), run) {
                            println!("\nQ{}/{}: {}", run.current_index + 1, run.total(), q.question);
                            for (i, choice) in q.choices.iter().enumerate() {
                                println!("  {}) {}", i + 1, choice);
                            }
                        }
                        shown_question = index;
                    }
                    if let Some(seconds) = view.time_remaining_seconds() {
                        if seconds <= 5 {
                            println!("  {}s left", seconds);
                        }
                    }
                }
            }

            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        controller.abandon_quiz().await.ok();
                        return Ok(());
                    };
                    let answer = choice_or_text(&view, line.trim());
                    if let Err(e) = controller.submit_quiz_answer(&answer).await {
                        println!("! {}", e);
                    }
                }
            }
        }
    }

    /// A bare number picks that choice; anything else is the answer text.
    fn choice_or_text(view: &SessionView, input: &str) -> String {
        input
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| view.current_question().and_then(|q| q.choices.get(i)))
            .cloned()
            .unwrap_or_else(|| input.to_string())
    }

    fn print_message(index: usize, message: &Message) {
        let who = match (message.sender, message.kind) {
            (Sender::User, _) => "you",
            (Sender::Bot, MessageKind::Explanation) => "tutor (explanation)",
            (Sender::Bot, MessageKind::Normal) => "tutor",
        };
        let flag = if message.flagged { " [flagged]" } else { "" };
        println!("[{}] {}{}: {}", index, who, flag, message.text);
    }

    fn print_review(view: &SessionView) {
        let Some(review) = &view.review else { return };
        println!("\nQuiz complete: {}/{}", review.score, review.total);
        for (i, question) in review.questions.iter().enumerate() {
            println!("{}. {}", i + 1, question.question);
            println!("   your answer: {}", review.answers.get(i).map(String::as_str).unwrap_or(""));
            println!("   correct:     {}", review.correct_answers.get(i).map(String::as_str).unwrap_or(""));
            if let Some(explanation) = review.explanations.get(i).filter(|e| !e.is_empty()) {
                println!("   {}", explanation);
            }
        }
    }

    fn print_history(view: &SessionView) {
        if view.messages.is_empty() && view.quiz_history.is_empty() {
            println!("No history yet.");
            return;
        }
        for (index, message) in view.messages.iter().enumerate() {
            print_message(index, message);
        }
        for (i, record) in view.quiz_history.iter().enumerate() {
            println!("Quiz {}: {}/{} ({:.0}%)", i + 1, record.score, record.total, record.percent());
        }
    }

    fn print_student(summary: &StudentSummary, view: &SessionView) {
        println!("== Student ==");
        println!(
            "Level {} ({} xp, {:.0}% to next) | streak {} day(s) | milestones {:?}",
            summary.level,
            summary.xp,
            level_progress(&view.gamification) * 100.0,
            summary.streak_days,
            view.streak_milestones
        );
        println!("Quizzes: {} | average {:.0}%", summary.total_quizzes, summary.average_score);
        if !summary.badges.is_empty() {
            println!("Badges: {}", summary.badges.join(", "));
        }
        if !summary.topics_mastered.is_empty() {
            println!("Mastered: {}", summary.topics_mastered.join(", "));
        }
        for a in &summary.achievements {
            println!("  {} {} - {} ({}%)", if a.unlocked { "★" } else { "☆" }, a.title, a.description, a.progress);
        }
    }

    const MISSED_QUESTION_WIDTH: usize = 60;

    fn print_educator(summary: &EducatorSummary) {
        println!("== Educator ==");
        println!(
            "Messages: {} from learner, {} from tutor, {} flagged",
            summary.user_messages, summary.bot_messages, summary.flagged_messages
        );
        println!("Average quiz score: {:.0}% over {} quizzes", summary.average_score, summary.quiz_history.len());
        for (question, count) in &summary.most_missed {
            println!("  missed {}x: {}", count, TextUtils::truncate_with_ellipsis(question, MISSED_QUESTION_WIDTH));
        }
        for (topic, accuracy) in &summary.topic_accuracy {
            println!("  {}: {:.0}% correct", topic, accuracy * 100.0);
        }
    }
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    studywithme::telemetry::init_tracing();
    cli::run(cli::Cli::parse()).await
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
