use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{Book, Progress, Quiz, User};
use crate::store::{BookStore, ProgressStore, QuizStore, UserStore};

/// Process-local store for tests and throwaway runs. Nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    books: HashMap<String, Book>,
    quizzes: HashMap<String, Quiz>,
    progress: BTreeMap<(String, String), Progress>,
    users: HashMap<String, User>,
}

impl MemoryStore {
    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> anyhow::Result<R> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(f(&mut inner))
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn create_book(&self, book: &Book) -> anyhow::Result<()> {
        self.with_inner(|inner| {
            inner.books.insert(book.id.clone(), book.clone());
        })
    }

    async fn get_book(&self, book_id: &str) -> anyhow::Result<Option<Book>> {
        self.with_inner(|inner| inner.books.get(book_id).cloned())
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn create_quiz(&self, quiz: &Quiz) -> anyhow::Result<()> {
        self.with_inner(|inner| {
            inner.quizzes.insert(quiz.id.clone(), quiz.clone());
        })
    }

    async fn get_quiz(&self, quiz_id: &str) -> anyhow::Result<Option<Quiz>> {
        self.with_inner(|inner| inner.quizzes.get(quiz_id).cloned())
    }

    async fn list_quizzes_for_book(&self, book_id: &str) -> anyhow::Result<Vec<Quiz>> {
        let mut quizzes = self.with_inner(|inner| {
            inner
                .quizzes
                .values()
                .filter(|quiz| quiz.book_id == book_id)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        quizzes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(quizzes)
    }

    async fn mark_quiz_graded(
        &self,
        quiz_id: &str,
        score: f64,
        completed_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        self.with_inner(|inner| -> anyhow::Result<bool> {
            let quiz = inner
                .quizzes
                .get_mut(quiz_id)
                .ok_or_else(|| anyhow::anyhow!("quiz not found: {quiz_id}"))?;
            if quiz.is_graded() {
                return Ok(false);
            }
            quiz.score = Some(score);
            quiz.completed_at = Some(completed_at);
            Ok(true)
        })?
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn get_progress(&self, user_id: &str, book_id: &str) -> anyhow::Result<Option<Progress>> {
        self.with_inner(|inner| {
            inner
                .progress
                .get(&(user_id.to_owned(), book_id.to_owned()))
                .cloned()
        })
    }

    async fn list_progress(&self, user_id: &str) -> anyhow::Result<Vec<Progress>> {
        self.with_inner(|inner| {
            inner
                .progress
                .values()
                .filter(|p| p.user_id == user_id)
                .cloned()
                .collect()
        })
    }

    async fn put_progress_if_version(
        &self,
        progress: &Progress,
        expected: Option<u64>,
    ) -> anyhow::Result<bool> {
        self.with_inner(|inner| {
            let key = (progress.user_id.clone(), progress.book_id.clone());
            if inner.progress.get(&key).map(|p| p.version) != expected {
                return false;
            }
            inner.progress.insert(key, progress.clone());
            true
        })
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn put_user(&self, user: &User) -> anyhow::Result<()> {
        self.with_inner(|inner| {
            inner.users.insert(user.id.clone(), user.clone());
        })
    }

    async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        self.with_inner(|inner| inner.users.get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grading_a_missing_quiz_is_an_error() {
        let store = MemoryStore::default();
        assert!(store.mark_quiz_graded("nope", 10.0, Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn stale_progress_version_is_rejected() -> anyhow::Result<()> {
        let store = MemoryStore::default();
        let mut progress = Progress::new("u1", "b1");
        progress.version = 1;
        assert!(store.put_progress_if_version(&progress, None).await?);

        progress.version = 2;
        assert!(!store.put_progress_if_version(&progress, Some(0)).await?);
        assert!(store.put_progress_if_version(&progress, Some(1)).await?);
        assert_eq!(store.list_progress("u1").await?.len(), 1);
        assert!(store.list_progress("u2").await?.is_empty());
        Ok(())
    }
}
