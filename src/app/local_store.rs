use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::sync::Mutex;

use crate::model::{Book, Progress, Quiz, User};
use crate::store::{BookStore, ProgressStore, QuizStore, UserStore};

/// JSON documents on the local filesystem:
///
/// ```text
/// <base>/books/<book_id>.json
/// <base>/quizzes/<quiz_id>.json
/// <base>/progress/<user_id>/<book_id>.json
/// <base>/users/<user_id>.json
/// ```
#[derive(Debug, Clone)]
pub struct LocalFsStore {
    base_dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl LocalFsStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn books_dir(&self) -> PathBuf {
        self.base_dir.join("books")
    }

    fn quizzes_dir(&self) -> PathBuf {
        self.base_dir.join("quizzes")
    }

    fn users_dir(&self) -> PathBuf {
        self.base_dir.join("users")
    }

    fn user_progress_dir(&self, user_id: &str) -> Option<PathBuf> {
        let stem = file_stem(user_id)?;
        Some(self.base_dir.join("progress").join(stem))
    }

    fn progress_path(&self, user_id: &str, book_id: &str) -> Option<PathBuf> {
        doc_path(self.user_progress_dir(user_id)?, book_id)
    }
}

const MAX_STEM_LEN: usize = 200;

/// Maps an id to a file name stem that stays inside its directory.
///
/// Ids made of `[A-Za-z0-9_-]` are used verbatim. Anything else (emails,
/// dots, slashes, the empty id) becomes `~` plus the hex of its bytes; `~`
/// never appears in a verbatim stem, so the two forms cannot collide.
fn file_stem(id: &str) -> Option<String> {
    let plain = !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    let stem = if plain {
        id.to_owned()
    } else {
        format!("~{}", hex::encode(id))
    };
    (stem.len() <= MAX_STEM_LEN).then_some(stem)
}

fn doc_path(dir: PathBuf, id: &str) -> Option<PathBuf> {
    let stem = file_stem(id)?;
    Some(dir.join(format!("{stem}.json")))
}

fn require_doc_path(dir: PathBuf, id: &str) -> anyhow::Result<PathBuf> {
    doc_path(dir, id).ok_or_else(|| anyhow::anyhow!("id too long: {id:?}"))
}

#[async_trait]
impl BookStore for LocalFsStore {
    async fn create_book(&self, book: &Book) -> anyhow::Result<()> {
        let path = require_doc_path(self.books_dir(), &book.id)?;
        write_json_atomic(&path, book)
            .await
            .with_context(|| format!("write book: {}", path.display()))
    }

    async fn get_book(&self, book_id: &str) -> anyhow::Result<Option<Book>> {
        let Some(path) = doc_path(self.books_dir(), book_id) else {
            return Ok(None);
        };
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }
}

#[async_trait]
impl QuizStore for LocalFsStore {
    async fn create_quiz(&self, quiz: &Quiz) -> anyhow::Result<()> {
        let path = require_doc_path(self.quizzes_dir(), &quiz.id)?;
        write_json_atomic(&path, quiz)
            .await
            .with_context(|| format!("write quiz: {}", path.display()))
    }

    async fn get_quiz(&self, quiz_id: &str) -> anyhow::Result<Option<Quiz>> {
        let Some(path) = doc_path(self.quizzes_dir(), quiz_id) else {
            return Ok(None);
        };
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn list_quizzes_for_book(&self, book_id: &str) -> anyhow::Result<Vec<Quiz>> {
        let mut quizzes: Vec<Quiz> = read_json_dir(&self.quizzes_dir())
            .await
            .context("list quizzes")?
            .into_iter()
            .filter(|quiz: &Quiz| quiz.book_id == book_id)
            .collect();
        quizzes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(quizzes)
    }

    async fn mark_quiz_graded(
        &self,
        quiz_id: &str,
        score: f64,
        completed_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let path = require_doc_path(self.quizzes_dir(), quiz_id)?;
        let _guard = self.write_lock.lock().await;

        let mut quiz: Quiz = read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?
            .ok_or_else(|| anyhow::anyhow!("quiz not found: {quiz_id}"))?;
        if quiz.is_graded() {
            return Ok(false);
        }
        quiz.score = Some(score);
        quiz.completed_at = Some(completed_at);
        write_json_atomic(&path, &quiz)
            .await
            .with_context(|| format!("write quiz: {}", path.display()))?;
        Ok(true)
    }
}

#[async_trait]
impl ProgressStore for LocalFsStore {
    async fn get_progress(&self, user_id: &str, book_id: &str) -> anyhow::Result<Option<Progress>> {
        let Some(path) = self.progress_path(user_id, book_id) else {
            return Ok(None);
        };
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn list_progress(&self, user_id: &str) -> anyhow::Result<Vec<Progress>> {
        let Some(dir) = self.user_progress_dir(user_id) else {
            return Ok(Vec::new());
        };
        let mut records: Vec<Progress> = read_json_dir(&dir).await.context("list progress")?;
        records.sort_by(|a, b| a.book_id.cmp(&b.book_id));
        Ok(records)
    }

    async fn put_progress_if_version(
        &self,
        progress: &Progress,
        expected: Option<u64>,
    ) -> anyhow::Result<bool> {
        let path = self
            .progress_path(&progress.user_id, &progress.book_id)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "progress key too long: user={:?} book={:?}",
                    progress.user_id,
                    progress.book_id
                )
            })?;
        let _guard = self.write_lock.lock().await;

        let current: Option<Progress> = read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?;
        if current.map(|p| p.version) != expected {
            return Ok(false);
        }
        write_json_atomic(&path, progress)
            .await
            .with_context(|| format!("write progress: {}", path.display()))?;
        Ok(true)
    }
}

#[async_trait]
impl UserStore for LocalFsStore {
    async fn put_user(&self, user: &User) -> anyhow::Result<()> {
        let path = require_doc_path(self.users_dir(), &user.id)?;
        write_json_atomic(&path, user)
            .await
            .with_context(|| format!("write user: {}", path.display()))
    }

    async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        let Some(path) = doc_path(self.users_dir(), user_id) else {
            return Ok(None);
        };
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

async fn read_json_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> anyhow::Result<Vec<T>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        if let Some(value) = read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?
        {
            out.push(value);
        }
    }
    Ok(out)
}

async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
