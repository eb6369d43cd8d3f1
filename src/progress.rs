use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Analysis, Progress};
use crate::store::{BookStore, ProgressStore, UserStore};

const DEFAULT_MAX_ATTEMPTS: usize = 5;
const UNKNOWN_BOOK_TITLE: &str = "Unknown Book";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptStats {
    pub score: f64,
    pub correct_mcqs: u32,
    pub total_mcqs: u32,
}

/// Counters only grow; the qualitative fields are replaced by the latest analysis.
pub fn apply_attempt(
    progress: &mut Progress,
    attempt: &AttemptStats,
    analysis: &Analysis,
    now: DateTime<Utc>,
) {
    progress.total_quizzes += 1;
    progress.total_score += attempt.score;
    progress.average_score = progress.total_score / f64::from(progress.total_quizzes);
    progress.correct_mcqs += attempt.correct_mcqs;
    progress.total_mcqs += attempt.total_mcqs;
    progress.strengths = analysis.strengths.clone();
    progress.weaknesses = analysis.weaknesses.clone();
    progress.recommendations = analysis.recommendations.clone();
    progress.last_activity = Some(now);
    progress.last_analysis = Some(now);
}

#[derive(Clone)]
pub struct ProgressAggregator {
    store: Arc<dyn ProgressStore>,
    max_attempts: usize,
}

impl ProgressAggregator {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Read-modify-write of the `(user_id, book_id)` record, retried when a
    /// concurrent writer bumped the version in between.
    pub async fn record(
        &self,
        user_id: &str,
        book_id: &str,
        attempt: &AttemptStats,
        analysis: &Analysis,
    ) -> anyhow::Result<Progress> {
        for attempt_no in 1..=self.max_attempts {
            let current = self
                .store
                .get_progress(user_id, book_id)
                .await
                .context("load progress")?;
            let expected = current.as_ref().map(|p| p.version);
            let mut progress = current.unwrap_or_else(|| Progress::new(user_id, book_id));

            apply_attempt(&mut progress, attempt, analysis, Utc::now());
            progress.version = expected.map_or(1, |v| v + 1);

            if self
                .store
                .put_progress_if_version(&progress, expected)
                .await
                .context("save progress")?
            {
                tracing::debug!(
                    user_id,
                    book_id,
                    total_quizzes = progress.total_quizzes,
                    version = progress.version,
                    "progress updated"
                );
                return Ok(progress);
            }
            tracing::debug!(user_id, book_id, attempt_no, "progress version conflict; retrying");
        }
        anyhow::bail!(
            "progress update for user {user_id} book {book_id} kept conflicting after {} attempts",
            self.max_attempts
        )
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_stats: Option<UserStats>,
    pub quiz_performance: QuizPerformance,
    pub learning_insights: LearningInsights,
    pub detailed_progress: Vec<BookProgressSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub name: String,
    pub email: String,
    pub total_uploaded_books: usize,
    pub uploaded_books: Vec<BookRef>,
    pub total_completed_books: usize,
    pub completed_books: Vec<BookRef>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BookRef {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizPerformance {
    pub total_quizzes: u32,
    #[serde(rename = "totalMCQsAttempted")]
    pub total_mcqs_attempted: u32,
    #[serde(rename = "correctMCQs")]
    pub correct_mcqs: u32,
    #[serde(rename = "correctMCQsPercentage")]
    pub correct_mcqs_percentage: f64,
    pub overall_average_score: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LearningInsights {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct McqStats {
    pub total: u32,
    pub correct: u32,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookProgressSummary {
    pub book_id: String,
    pub book_title: String,
    pub total_quizzes: u32,
    pub average_score: f64,
    pub mcq_stats: McqStats,
    pub last_activity: Option<DateTime<Utc>>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookProgressReport {
    pub book_id: String,
    pub book_title: String,
    pub total_quizzes: u32,
    pub average_score: f64,
    pub mcq_stats: McqStats,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
    pub last_activity: Option<DateTime<Utc>>,
    pub last_analysis: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ProgressReporter {
    progress: Arc<dyn ProgressStore>,
    books: Arc<dyn BookStore>,
    users: Arc<dyn UserStore>,
}

impl ProgressReporter {
    pub fn new(
        progress: Arc<dyn ProgressStore>,
        books: Arc<dyn BookStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            progress,
            books,
            users,
        }
    }

    pub async fn user_report(&self, user_id: &str) -> anyhow::Result<ProgressReport> {
        let records = self
            .progress
            .list_progress(user_id)
            .await
            .context("list progress")?;

        let user_stats = match self.users.get_user(user_id).await.context("load user")? {
            Some(user) => {
                let uploaded_books = self.book_refs(&user.uploaded_books).await?;
                let completed_books = self.book_refs(&user.completed_books).await?;
                Some(UserStats {
                    name: user.name,
                    email: user.email,
                    total_uploaded_books: uploaded_books.len(),
                    uploaded_books,
                    total_completed_books: completed_books.len(),
                    completed_books,
                })
            }
            None => None,
        };

        let mut detailed_progress = Vec::with_capacity(records.len());
        for record in &records {
            let book_title = self.book_title(&record.book_id).await?;
            detailed_progress.push(BookProgressSummary {
                book_id: record.book_id.clone(),
                book_title,
                total_quizzes: record.total_quizzes,
                average_score: round2(record.average_score),
                mcq_stats: mcq_stats(record),
                last_activity: record.last_activity,
                strengths: record.strengths.clone(),
                weaknesses: record.weaknesses.clone(),
            });
        }

        Ok(ProgressReport {
            user_stats,
            quiz_performance: rollup(&records),
            learning_insights: LearningInsights {
                strengths: union(records.iter().map(|r| &r.strengths)),
                weaknesses: union(records.iter().map(|r| &r.weaknesses)),
                recommendations: union(records.iter().map(|r| &r.recommendations)),
            },
            detailed_progress,
        })
    }

    /// `Ok(None)` when the user has no graded attempt for the book.
    pub async fn book_report(
        &self,
        user_id: &str,
        book_id: &str,
    ) -> anyhow::Result<Option<BookProgressReport>> {
        let Some(record) = self
            .progress
            .get_progress(user_id, book_id)
            .await
            .context("load progress")?
        else {
            return Ok(None);
        };
        let book_title = self.book_title(book_id).await?;
        Ok(Some(BookProgressReport {
            book_id: record.book_id.clone(),
            book_title,
            total_quizzes: record.total_quizzes,
            average_score: round2(record.average_score),
            mcq_stats: mcq_stats(&record),
            strengths: record.strengths,
            weaknesses: record.weaknesses,
            recommendations: record.recommendations,
            last_activity: record.last_activity,
            last_analysis: record.last_analysis,
        }))
    }

    async fn book_title(&self, book_id: &str) -> anyhow::Result<String> {
        let book = self.books.get_book(book_id).await.context("load book")?;
        Ok(book.map_or_else(|| UNKNOWN_BOOK_TITLE.to_owned(), |b| b.title))
    }

    async fn book_refs(&self, ids: &[String]) -> anyhow::Result<Vec<BookRef>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(BookRef {
                id: id.clone(),
                title: self.book_title(id).await?,
            });
        }
        Ok(out)
    }
}

pub fn rollup(records: &[Progress]) -> QuizPerformance {
    let total_mcqs: u32 = records.iter().map(|r| r.total_mcqs).sum();
    let correct_mcqs: u32 = records.iter().map(|r| r.correct_mcqs).sum();
    let total_quizzes: u32 = records.iter().map(|r| r.total_quizzes).sum();
    let total_score: f64 = records.iter().map(|r| r.total_score).sum();

    QuizPerformance {
        total_quizzes,
        total_mcqs_attempted: total_mcqs,
        correct_mcqs,
        correct_mcqs_percentage: round2(percentage(correct_mcqs, total_mcqs)),
        overall_average_score: if total_quizzes > 0 {
            round2(total_score / f64::from(total_quizzes))
        } else {
            0.0
        },
    }
}

fn mcq_stats(record: &Progress) -> McqStats {
    McqStats {
        total: record.total_mcqs,
        correct: record.correct_mcqs,
        percentage: round2(percentage(record.correct_mcqs, record.total_mcqs)),
    }
}

fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        f64::from(part) / f64::from(whole) * 100.0
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn union<'a>(lists: impl Iterator<Item = &'a Vec<String>>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in lists.flatten() {
        if seen.insert(item.as_str()) {
            out.push(item.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::memory_store::MemoryStore;
    use crate::model::{Book, User};

    fn analysis(tag: &str) -> Analysis {
        Analysis {
            strengths: vec![format!("{tag} strength"), "shared".to_owned()],
            weaknesses: vec![format!("{tag} weakness")],
            recommendations: vec!["practice".to_owned()],
            key_insights: vec!["insight".to_owned()],
        }
    }

    fn attempt(score: f64) -> AttemptStats {
        AttemptStats {
            score,
            correct_mcqs: 1,
            total_mcqs: 2,
        }
    }

    #[tokio::test]
    async fn three_attempts_accumulate() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::default());
        let aggregator = ProgressAggregator::new(store.clone());

        for score in [100.0, 0.0, 50.0] {
            aggregator.record("u1", "b1", &attempt(score), &analysis("x")).await?;
        }

        let progress = store.get_progress("u1", "b1").await?.expect("record exists");
        assert_eq!(progress.total_quizzes, 3);
        assert_eq!(progress.total_score, 150.0);
        assert_eq!(progress.average_score, 50.0);
        assert_eq!(progress.correct_mcqs, 3);
        assert_eq!(progress.total_mcqs, 6);
        assert_eq!(progress.version, 3);
        assert!(progress.last_activity.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn latest_analysis_replaces_previous() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::default());
        let aggregator = ProgressAggregator::new(store.clone());
        aggregator.record("u1", "b1", &attempt(10.0), &analysis("old")).await?;
        let progress = aggregator.record("u1", "b1", &attempt(20.0), &analysis("new")).await?;
        assert_eq!(progress.weaknesses, vec!["new weakness".to_owned()]);
        assert!(!progress.strengths.iter().any(|s| s.starts_with("old")));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_writers_never_lose_an_attempt() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::default());
        let aggregator = ProgressAggregator::new(store.clone()).with_max_attempts(50);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let aggregator = aggregator.clone();
            handles.push(tokio::spawn(async move {
                aggregator.record("u1", "b1", &attempt(50.0), &analysis("c")).await
            }));
        }
        for handle in handles {
            handle.await??;
        }

        let progress = store.get_progress("u1", "b1").await?.expect("record exists");
        assert_eq!(progress.total_quizzes, 8);
        assert_eq!(progress.total_score, 400.0);
        Ok(())
    }

    #[test]
    fn rollup_rounds_and_handles_empty() {
        let empty = rollup(&[]);
        assert_eq!(empty.correct_mcqs_percentage, 0.0);
        assert_eq!(empty.overall_average_score, 0.0);

        let mut a = Progress::new("u1", "b1");
        a.total_quizzes = 2;
        a.total_score = 100.0;
        a.correct_mcqs = 1;
        a.total_mcqs = 3;
        let mut b = Progress::new("u1", "b2");
        b.total_quizzes = 1;
        b.total_score = 0.0;

        let perf = rollup(&[a, b]);
        assert_eq!(perf.total_quizzes, 3);
        assert_eq!(perf.correct_mcqs_percentage, 33.33);
        assert_eq!(perf.overall_average_score, 33.33);
    }

    #[tokio::test]
    async fn user_report_resolves_titles_and_dedupes_insights() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::default());
        store.create_book(&Book::with_id("b1", "Biology", "text")).await?;
        store
            .put_user(&User {
                id: "u1".to_owned(),
                name: "Ada".to_owned(),
                email: "ada@example.com".to_owned(),
                uploaded_books: vec!["b1".to_owned(), "gone".to_owned()],
                completed_books: Vec::new(),
            })
            .await?;

        let aggregator = ProgressAggregator::new(store.clone());
        aggregator.record("u1", "b1", &attempt(80.0), &analysis("bio")).await?;
        aggregator.record("u1", "b2", &attempt(40.0), &analysis("chem")).await?;

        let reporter = ProgressReporter::new(store.clone(), store.clone(), store.clone());
        let report = reporter.user_report("u1").await?;

        assert_eq!(report.quiz_performance.total_quizzes, 2);
        assert_eq!(report.quiz_performance.overall_average_score, 60.0);
        assert_eq!(
            report.learning_insights.strengths,
            vec![
                "bio strength".to_owned(),
                "shared".to_owned(),
                "chem strength".to_owned()
            ]
        );
        assert_eq!(report.learning_insights.recommendations, vec!["practice".to_owned()]);

        let titles: Vec<_> = report
            .detailed_progress
            .iter()
            .map(|p| p.book_title.as_str())
            .collect();
        assert_eq!(titles, vec!["Biology", UNKNOWN_BOOK_TITLE]);

        let stats = report.user_stats.expect("user exists");
        assert_eq!(stats.total_uploaded_books, 2);
        assert_eq!(stats.uploaded_books[1].title, UNKNOWN_BOOK_TITLE);
        Ok(())
    }

    #[tokio::test]
    async fn book_report_is_none_without_attempts() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::default());
        let reporter = ProgressReporter::new(store.clone(), store.clone(), store.clone());
        assert!(reporter.book_report("u1", "b1").await?.is_none());

        let report = reporter.user_report("nobody").await?;
        assert!(report.user_stats.is_none());
        assert!(report.detailed_progress.is_empty());
        Ok(())
    }

    #[test]
    fn report_uses_dashboard_field_names() -> anyhow::Result<()> {
        let value = serde_json::to_value(rollup(&[]))?;
        assert!(value.get("totalMCQsAttempted").is_some());
        assert!(value.get("correctMCQsPercentage").is_some());
        assert!(value.get("overallAverageScore").is_some());
        Ok(())
    }
}
