use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{Book, Progress, Quiz, User};

#[async_trait]
pub trait BookStore: Send + Sync {
    async fn create_book(&self, book: &Book) -> anyhow::Result<()>;
    async fn get_book(&self, book_id: &str) -> anyhow::Result<Option<Book>>;
}

#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn create_quiz(&self, quiz: &Quiz) -> anyhow::Result<()>;
    async fn get_quiz(&self, quiz_id: &str) -> anyhow::Result<Option<Quiz>>;
    /// Newest first.
    async fn list_quizzes_for_book(&self, book_id: &str) -> anyhow::Result<Vec<Quiz>>;
    /// `Ok(false)` when the quiz was already graded.
    async fn mark_quiz_graded(
        &self,
        quiz_id: &str,
        score: f64,
        completed_at: DateTime<Utc>,
    ) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get_progress(&self, user_id: &str, book_id: &str) -> anyhow::Result<Option<Progress>>;
    async fn list_progress(&self, user_id: &str) -> anyhow::Result<Vec<Progress>>;
    /// Optimistic write keyed by `(user_id, book_id)`. Succeeds only when the
    /// stored version equals `expected` (`None`: no record may exist yet).
    async fn put_progress_if_version(
        &self,
        progress: &Progress,
        expected: Option<u64>,
    ) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn put_user(&self, user: &User) -> anyhow::Result<()>;
    async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<User>>;
}
