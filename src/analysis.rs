use std::sync::Arc;

use anyhow::Context as _;
use serde_json::Value;

use crate::error::ParseError;
use crate::model::{Analysis, Question, QuestionType};
use crate::parse::parse_strict;
use crate::prompt;
use crate::provider::GenerationProvider;
use crate::sanitize::sanitize;
use crate::scoring::{Grade, answer_at, is_unanswered};

const FALLBACK_STRENGTH: &str = "Demonstrated some understanding of the material";
const FALLBACK_WEAKNESS: &str = "Areas for improvement identified";
const FALLBACK_RECOMMENDATION: &str = "Review the material and practice more";
const FALLBACK_INSIGHT: &str = "Keep practicing to improve";

#[derive(Clone)]
pub struct PerformanceAnalyzer {
    provider: Arc<dyn GenerationProvider>,
}

impl PerformanceAnalyzer {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }

    pub async fn analyze(&self, questions: &[Question], answers: &[String], grade: &Grade) -> Analysis {
        match self.analyze_with_provider(grade).await {
            Ok(analysis) => analysis,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "AI analysis failed; using rule-based analysis");
                basic_analysis(questions, answers, grade.score)
            }
        }
    }

    async fn analyze_with_provider(&self, grade: &Grade) -> anyhow::Result<Analysis> {
        let prompt =
            prompt::analysis_prompt(&grade.results, grade.score).context("build analysis prompt")?;
        let raw = self
            .provider
            .generate_content(&prompt)
            .await
            .context("request analysis")?;
        tracing::debug!(len = raw.len(), "analysis response received");
        let analysis = parse_analysis(&raw).context("parse analysis")?;
        Ok(analysis)
    }
}

pub fn parse_analysis(raw: &str) -> Result<Analysis, ParseError> {
    let candidate = sanitize(raw)?;
    let value: Value = parse_strict(&candidate)
        .map_err(|err| ParseError::InvalidAnalysis(format!("decode json: {err}")))?;
    validate_analysis(&value)
}

fn validate_analysis(value: &Value) -> Result<Analysis, ParseError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ParseError::InvalidAnalysis("not a JSON object".to_owned()))?;

    let field = |names: &[&str]| names.iter().find_map(|name| obj.get(*name));
    let strengths = field(&["strengths"]);
    let weaknesses = field(&["weaknesses"]);
    let recommendations = field(&["recommendations"]);
    let key_insights = field(&["keyInsights", "key_insights"]);

    if strengths.is_none()
        && weaknesses.is_none()
        && recommendations.is_none()
        && key_insights.is_none()
    {
        return Err(ParseError::InvalidAnalysis(
            "none of strengths, weaknesses, recommendations, keyInsights present".to_owned(),
        ));
    }

    Ok(Analysis {
        strengths: string_list(strengths, FALLBACK_STRENGTH),
        weaknesses: string_list(weaknesses, FALLBACK_WEAKNESS),
        recommendations: string_list(recommendations, FALLBACK_RECOMMENDATION),
        key_insights: string_list(key_insights, FALLBACK_INSIGHT),
    })
}

fn string_list(value: Option<&Value>, fallback: &str) -> Vec<String> {
    let items: Vec<String> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(other) => scalar_text(other).into_iter().collect(),
        None => Vec::new(),
    };
    let items: Vec<String> = items
        .into_iter()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect();

    if items.is_empty() {
        vec![fallback.to_owned()]
    } else {
        items
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn basic_analysis(questions: &[Question], answers: &[String], score: f64) -> Analysis {
    let incorrect_mcqs = questions
        .iter()
        .enumerate()
        .filter(|(idx, q)| q.kind == QuestionType::Mcq && answer_at(answers, *idx) != q.correct_answer)
        .count();
    let unanswered = (0..questions.len())
        .filter(|idx| is_unanswered(answer_at(answers, *idx)))
        .count();

    let strength = if score >= 70.0 {
        "Good conceptual understanding"
    } else if score >= 50.0 {
        "Basic understanding of concepts"
    } else {
        "Willingness to learn and improve"
    };

    let mut weaknesses = Vec::new();
    if incorrect_mcqs > 0 {
        weaknesses.push("Multiple Choice Questions".to_owned());
    }
    if unanswered > 0 {
        weaknesses.push("Question completion".to_owned());
    }
    if weaknesses.is_empty() {
        weaknesses.push("No major weaknesses identified".to_owned());
    }

    Analysis {
        strengths: vec![strength.to_owned()],
        weaknesses,
        recommendations: vec![
            "Review incorrect answers carefully".to_owned(),
            "Practice more questions to improve accuracy".to_owned(),
            "Focus on understanding the explanations".to_owned(),
        ],
        key_insights: vec![
            format!("Scored {score}% on this quiz"),
            if incorrect_mcqs > 0 {
                format!("Missed {incorrect_mcqs} multiple choice questions")
            } else {
                "All multiple choice questions correct".to_owned()
            },
            if unanswered > 0 {
                format!("{unanswered} questions were not answered")
            } else {
                "All questions were attempted".to_owned()
            },
        ],
    }
}
