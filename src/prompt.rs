use serde::Serialize;

use crate::model::{GradedResult, QuestionType};

/// Book text beyond this many characters is ignored when prompting.
pub const MAX_BOOK_CHARS: usize = 3000;

pub const BOOK_TEXT_BEGIN: &str = "BEGIN_TEXTBOOK_CONTENT";
pub const BOOK_TEXT_END: &str = "END_TEXTBOOK_CONTENT";
pub const PERFORMANCE_BEGIN: &str = "BEGIN_QUIZ_PERFORMANCE_JSON";
pub const PERFORMANCE_END: &str = "END_QUIZ_PERFORMANCE_JSON";

/// Returns the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Renders the quiz generation prompt: 3 mcq, 2 saq, 1 laq.
pub fn quiz_prompt(book_text: &str) -> String {
    let limited = truncate_chars(book_text, MAX_BOOK_CHARS);
    format!(
        "IMPORTANT: You MUST return ONLY valid JSON format. Do not include any other text, explanations, or markdown.\n\
\n\
Create a comprehensive quiz based on the following textbook content. Generate:\n\
- 3 Multiple Choice Questions (MCQs) with 4 options each\n\
- 2 Short Answer Questions (SAQs)\n\
- 1 Long Answer Question (LAQ)\n\
\n\
For each question, provide:\n\
- Clear question text\n\
- For MCQs: 4 options labeled A, B, C, D\n\
- Correct answer (for MCQs: the letter A, B, C or D)\n\
- Detailed explanation\n\
\n\
Textbook Content:\n\
{BOOK_TEXT_BEGIN}\n\
{limited}\n\
{BOOK_TEXT_END}\n\
\n\
Return ONLY valid JSON in this exact format:\n\
{{\n\
  \"questions\": [\n\
    {{\n\
      \"type\": \"mcq\",\n\
      \"question\": \"Question text?\",\n\
      \"options\": [\"Option A\", \"Option B\", \"Option C\", \"Option D\"],\n\
      \"correctAnswer\": \"A\",\n\
      \"explanation\": \"Detailed explanation...\"\n\
    }},\n\
    {{\n\
      \"type\": \"saq\",\n\
      \"question\": \"Question text?\",\n\
      \"correctAnswer\": \"Model answer...\",\n\
      \"explanation\": \"Detailed explanation...\"\n\
    }}\n\
  ]\n\
}}\n\
\n\
CRITICAL: Return ONLY the JSON object, no additional text, no markdown formatting, no thinking process.\n"
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuestionSummary<'a> {
    question: &'a str,
    #[serde(rename = "type")]
    kind: QuestionType,
    correct_answer: &'a str,
    user_answer: &'a str,
    is_correct: bool,
}

/// Renders the performance analysis prompt for a graded attempt.
pub fn analysis_prompt(results: &[GradedResult], score: f64) -> Result<String, serde_json::Error> {
    let summary = results
        .iter()
        .map(|r| QuestionSummary {
            question: &r.question_text,
            kind: r.kind,
            correct_answer: &r.correct_answer,
            user_answer: if r.user_answer.trim().is_empty() {
                "Not answered"
            } else {
                &r.user_answer
            },
            is_correct: r.is_correct,
        })
        .collect::<Vec<_>>();
    let summary_json = serde_json::to_string_pretty(&summary)?;

    Ok(format!(
        "CRITICAL: You MUST return ONLY valid JSON format. Do not include any thinking process, explanations, or markdown.\n\
\n\
Analyze this quiz performance and provide insights about the student's strengths and weaknesses.\n\
\n\
QUIZ PERFORMANCE DATA:\n\
{PERFORMANCE_BEGIN}\n\
{summary_json}\n\
{PERFORMANCE_END}\n\
\n\
OVERALL SCORE: {score}%\n\
\n\
Return JSON in this exact format (all fields must be arrays of strings):\n\
{{\n\
  \"strengths\": [\"Specific strength area 1\", \"Specific strength area 2\"],\n\
  \"weaknesses\": [\"Specific weakness area 1 with explanation\"],\n\
  \"recommendations\": [\"Specific study recommendation 1\"],\n\
  \"keyInsights\": [\"Key insight about learning patterns\"]\n\
}}\n\
\n\
IMPORTANT: No thinking process, no <think> tags, no additional text. ONLY the JSON object.\n"
    ))
}
