use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_ID: &str = "default-user";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Mcq,
    Saq,
    Laq,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mcq => "mcq",
            Self::Saq => "saq",
            Self::Laq => "laq",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mcq" => Some(Self::Mcq),
            "saq" => Some(Self::Saq),
            "laq" => Some(Self::Laq),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(rename = "question")]
    pub question_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    pub book_id: String,
    pub questions: Vec<Question>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Quiz {
    pub fn new(book_id: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            book_id: book_id.into(),
            questions,
            score: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_graded(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub text_content: String,
    pub upload_date: DateTime<Utc>,
}

impl Book {
    pub fn new(title: impl Into<String>, text_content: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), title, text_content)
    }

    pub fn with_id(
        id: impl Into<String>,
        title: impl Into<String>,
        text_content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            text_content: text_content.into(),
            upload_date: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub uploaded_books: Vec<String>,
    #[serde(default)]
    pub completed_books: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradedResult {
    #[serde(rename = "question")]
    pub question_text: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub explanation: String,
    pub is_correct: bool,
    #[serde(rename = "type")]
    pub kind: QuestionType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
    pub key_insights: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub total_quizzes: u32,
    pub total_score: f64,
    pub average_score: f64,
    #[serde(rename = "correctMCQs")]
    pub correct_mcqs: u32,
    #[serde(rename = "totalMCQs")]
    pub total_mcqs: u32,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_analysis: Option<DateTime<Utc>>,
    /// Bumped on every write; used for optimistic concurrency.
    #[serde(default)]
    pub version: u64,
}

impl Progress {
    pub fn new(user_id: impl Into<String>, book_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            book_id: book_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    pub score: f64,
    pub results: Vec<GradedResult>,
    pub total_questions: usize,
    pub correct_answers: usize,
    pub analysis: Analysis,
    /// Set when the quiz was graded but the progress record could not be updated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_error: Option<String>,
}
