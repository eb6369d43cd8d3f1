use std::sync::Arc;

use chrono::Utc;

use crate::analysis::PerformanceAnalyzer;
use crate::error::{QuizError, ServiceError, ServiceErrorKind};
use crate::inflight::{InFlight, Role};
use crate::model::{Book, EvaluationReport, Quiz};
use crate::parse::parse_quiz;
use crate::progress::{
    AttemptStats, BookProgressReport, ProgressAggregator, ProgressReport, ProgressReporter,
};
use crate::prompt;
use crate::provider::GenerationProvider;
use crate::sanitize::sanitize;
use crate::scoring;
use crate::store::{BookStore, ProgressStore, QuizStore, UserStore};

const RESPONSE_SAMPLE_CHARS: usize = 500;

#[derive(Clone)]
pub struct Stores {
    pub books: Arc<dyn BookStore>,
    pub quizzes: Arc<dyn QuizStore>,
    pub progress: Arc<dyn ProgressStore>,
    pub users: Arc<dyn UserStore>,
}

impl Stores {
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: BookStore + QuizStore + ProgressStore + UserStore + 'static,
    {
        Self {
            books: store.clone(),
            quizzes: store.clone(),
            progress: store.clone(),
            users: store,
        }
    }
}

#[derive(Clone)]
pub struct QuizService {
    provider: Arc<dyn GenerationProvider>,
    stores: Stores,
    inflight: Arc<InFlight<String, Result<Quiz, QuizError>>>,
    analyzer: PerformanceAnalyzer,
    aggregator: ProgressAggregator,
    reporter: ProgressReporter,
}

impl QuizService {
    pub fn new(provider: Arc<dyn GenerationProvider>, stores: Stores) -> Self {
        Self {
            analyzer: PerformanceAnalyzer::new(Arc::clone(&provider)),
            aggregator: ProgressAggregator::new(Arc::clone(&stores.progress)),
            reporter: ProgressReporter::new(
                Arc::clone(&stores.progress),
                Arc::clone(&stores.books),
                Arc::clone(&stores.users),
            ),
            inflight: Arc::new(InFlight::new()),
            provider,
            stores,
        }
    }

    pub async fn create_book(&self, title: &str, text_content: &str) -> Result<Book, QuizError> {
        let book = Book::new(title, text_content);
        self.stores
            .books
            .create_book(&book)
            .await
            .map_err(QuizError::storage)?;
        tracing::info!(book_id = %book.id, chars = book.text_content.chars().count(), "book created");
        Ok(book)
    }

    /// Returns the stored book, creating it from `title`/`text_content` when absent.
    pub async fn ensure_book(
        &self,
        book_id: &str,
        title: &str,
        text_content: &str,
    ) -> Result<Book, QuizError> {
        if let Some(book) = self
            .stores
            .books
            .get_book(book_id)
            .await
            .map_err(QuizError::storage)?
        {
            return Ok(book);
        }
        let book = Book::with_id(book_id, title, text_content);
        self.stores
            .books
            .create_book(&book)
            .await
            .map_err(QuizError::storage)?;
        Ok(book)
    }

    pub async fn generate_quiz(&self, book_id: &str, book_text: &str) -> Result<Quiz, QuizError> {
        let provider = Arc::clone(&self.provider);
        let quizzes = Arc::clone(&self.stores.quizzes);
        let owned_id = book_id.to_owned();
        let owned_text = book_text.to_owned();

        let (result, role) = self
            .inflight
            .run_with_role(book_id.to_owned(), move || {
                run_generation(provider, quizzes, owned_id, owned_text)
            })
            .await;
        if role == Role::Follower {
            tracing::debug!(book_id, "joined in-flight quiz generation");
        }
        result.unwrap_or_else(|err| {
            tracing::error!(book_id, error = %err, "quiz generation task failed");
            Err(ServiceError::new(ServiceErrorKind::Unavailable, err.to_string()).into())
        })
    }

    pub async fn generate_quiz_for_book(&self, book_id: &str) -> Result<Quiz, QuizError> {
        let book = self
            .stores
            .books
            .get_book(book_id)
            .await
            .map_err(QuizError::storage)?
            .ok_or_else(|| QuizError::BookNotFound(book_id.to_owned()))?;
        self.generate_quiz(&book.id, &book.text_content).await
    }

    /// Grades one submission. A quiz can be graded once; later submissions
    /// fail with [`QuizError::AlreadyGraded`].
    pub async fn evaluate_quiz(
        &self,
        quiz_id: &str,
        answers: &[String],
        user_id: &str,
    ) -> Result<EvaluationReport, QuizError> {
        let quiz = self.get_quiz(quiz_id).await?;
        if quiz.is_graded() {
            return Err(QuizError::AlreadyGraded(quiz_id.to_owned()));
        }

        let grade = scoring::grade(&quiz.questions, answers);
        let claimed = self
            .stores
            .quizzes
            .mark_quiz_graded(quiz_id, grade.score, Utc::now())
            .await
            .map_err(QuizError::storage)?;
        if !claimed {
            return Err(QuizError::AlreadyGraded(quiz_id.to_owned()));
        }
        tracing::info!(
            quiz_id,
            user_id,
            score = grade.score,
            correct = grade.correct_answers,
            total = grade.total_questions,
            "quiz graded"
        );

        let analysis = self.analyzer.analyze(&quiz.questions, answers, &grade).await;

        let attempt = AttemptStats {
            score: grade.score,
            correct_mcqs: grade.correct_mcqs,
            total_mcqs: grade.total_mcqs,
        };
        let progress_error = match self
            .aggregator
            .record(user_id, &quiz.book_id, &attempt, &analysis)
            .await
        {
            Ok(_) => None,
            Err(err) => {
                tracing::error!(quiz_id, user_id, book_id = %quiz.book_id, ?err, "progress update failed");
                Some(format!("{err:#}"))
            }
        };

        Ok(EvaluationReport {
            score: grade.score,
            total_questions: grade.total_questions,
            correct_answers: grade.correct_answers,
            results: grade.results,
            analysis,
            progress_error,
        })
    }

    pub async fn get_quiz(&self, quiz_id: &str) -> Result<Quiz, QuizError> {
        self.stores
            .quizzes
            .get_quiz(quiz_id)
            .await
            .map_err(QuizError::storage)?
            .ok_or_else(|| QuizError::QuizNotFound(quiz_id.to_owned()))
    }

    pub async fn list_quizzes(&self, book_id: &str) -> Result<Vec<Quiz>, QuizError> {
        self.stores
            .quizzes
            .list_quizzes_for_book(book_id)
            .await
            .map_err(QuizError::storage)
    }

    pub async fn progress_report(&self, user_id: &str) -> Result<ProgressReport, QuizError> {
        self.reporter
            .user_report(user_id)
            .await
            .map_err(QuizError::storage)
    }

    pub async fn book_progress(
        &self,
        user_id: &str,
        book_id: &str,
    ) -> Result<BookProgressReport, QuizError> {
        self.reporter
            .book_report(user_id, book_id)
            .await
            .map_err(QuizError::storage)?
            .ok_or_else(|| QuizError::ProgressNotFound(book_id.to_owned()))
    }
}

async fn run_generation(
    provider: Arc<dyn GenerationProvider>,
    quizzes: Arc<dyn QuizStore>,
    book_id: String,
    book_text: String,
) -> Result<Quiz, QuizError> {
    let prompt = prompt::quiz_prompt(&book_text);
    tracing::info!(book_id = %book_id, prompt_chars = prompt.chars().count(), "generating quiz");

    let raw = provider.generate_content(&prompt).await.map_err(|err| {
        tracing::error!(book_id = %book_id, kind = ?err.kind, error = %err, "quiz generation failed");
        QuizError::ServiceUnavailable(err)
    })?;
    tracing::debug!(book_id = %book_id, len = raw.len(), "quiz response received");

    let questions = sanitize(&raw)
        .and_then(|candidate| parse_quiz(&candidate))
        .map_err(|err| {
            tracing::error!(
                book_id = %book_id,
                error = %err,
                sample = prompt::truncate_chars(&raw, RESPONSE_SAMPLE_CHARS),
                "quiz response could not be parsed"
            );
            QuizError::MalformedOutput(err)
        })?;

    let quiz = Quiz::new(book_id, questions);
    quizzes.create_quiz(&quiz).await.map_err(QuizError::storage)?;
    tracing::info!(quiz_id = %quiz.id, book_id = %quiz.book_id, questions = quiz.questions.len(), "quiz saved");
    Ok(quiz)
}
