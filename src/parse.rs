use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ParseError;
use crate::model::{Question, QuestionType};

pub const MCQ_OPTION_COUNT: usize = 4;
const MCQ_LABELS: [&str; MCQ_OPTION_COUNT] = ["A", "B", "C", "D"];

pub fn parse_strict<T: DeserializeOwned>(candidate: &str) -> Result<T, serde_json::Error> {
    match serde_json::from_str(candidate) {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::debug!(error = %err, "direct json decode failed; retrying after repair");
            serde_json::from_str(&repair(candidate))
        }
    }
}

pub fn parse_quiz(candidate: &str) -> Result<Vec<Question>, ParseError> {
    let value: Value = parse_strict(candidate)
        .map_err(|err| ParseError::InvalidQuizFormat(format!("decode json: {err}")))?;

    let questions = value
        .get("questions")
        .ok_or_else(|| invalid("missing `questions` field"))?
        .as_array()
        .ok_or_else(|| invalid("`questions` is not an array"))?;
    if questions.is_empty() {
        return Err(invalid("`questions` is empty"));
    }

    questions
        .iter()
        .enumerate()
        .map(|(idx, item)| question_from_value(idx, item))
        .collect()
}

fn invalid(detail: impl Into<String>) -> ParseError {
    ParseError::InvalidQuizFormat(detail.into())
}

fn question_from_value(idx: usize, item: &Value) -> Result<Question, ParseError> {
    let obj = item
        .as_object()
        .ok_or_else(|| invalid(format!("question {idx} is not an object")))?;

    let field = |name: &str| -> Result<String, ParseError> {
        obj.get(name)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid(format!("question {idx} is missing `{name}`")))
    };

    let raw_type = field("type")?;
    let kind = QuestionType::parse(&raw_type)
        .ok_or_else(|| invalid(format!("question {idx} has unknown type {raw_type:?}")))?;
    let question_text = field("question")?;
    let correct_answer = field("correctAnswer")?;
    let explanation = obj
        .get("explanation")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_owned())
        .ok_or_else(|| invalid(format!("question {idx} is missing `explanation`")))?;

    let (options, correct_answer) = match kind {
        QuestionType::Mcq => {
            let options = mcq_options(idx, obj.get("options"))?;
            let letter = normalize_mcq_answer(&correct_answer, &options).ok_or_else(|| {
                invalid(format!(
                    "question {idx} has correctAnswer {correct_answer:?}; expected one of A, B, C, D"
                ))
            })?;
            (options, letter)
        }
        QuestionType::Saq | QuestionType::Laq => (Vec::new(), correct_answer),
    };

    Ok(Question {
        kind,
        question_text,
        options,
        correct_answer,
        explanation,
    })
}

fn mcq_options(idx: usize, raw: Option<&Value>) -> Result<Vec<String>, ParseError> {
    let items = raw
        .and_then(Value::as_array)
        .ok_or_else(|| invalid(format!("mcq question {idx} is missing `options`")))?;
    if items.len() != MCQ_OPTION_COUNT {
        return Err(invalid(format!(
            "mcq question {idx} has {} options; expected {MCQ_OPTION_COUNT}",
            items.len()
        )));
    }
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.trim().to_owned())
                .ok_or_else(|| invalid(format!("mcq question {idx} has a non-string option")))
        })
        .collect()
}

/// Maps `"a"`, `"B)"`, `"C. text"`, `"Option D"` or an option's exact text to its letter.
fn normalize_mcq_answer(raw: &str, options: &[String]) -> Option<String> {
    let trimmed = raw.trim();
    let unprefixed = match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("option ") => trimmed[7..].trim_start(),
        _ => trimmed,
    };

    let mut chars = unprefixed.chars();
    if let Some(first) = chars.next() {
        let letter = first.to_ascii_uppercase().to_string();
        let terminated = match chars.next() {
            None => true,
            Some(next) => matches!(next, ')' | '.' | ':' | ' '),
        };
        if terminated && MCQ_LABELS.contains(&letter.as_str()) {
            return Some(letter);
        }
    }

    options
        .iter()
        .position(|option| option.eq_ignore_ascii_case(trimmed))
        .map(|pos| MCQ_LABELS[pos].to_owned())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prev {
    Start,
    Open,
    Comma,
    Colon,
    Value,
}

/// Heuristic repair of near-JSON.
///
/// String-aware single pass: single-quoted strings become double-quoted,
/// bare identifier keys are quoted, trailing and doubled commas are dropped,
/// missing commas between adjacent values (`}{`, `"a" "b"`) are inserted, and
/// raw control characters inside strings are escaped.
pub fn repair(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut prev = Prev::Start;
    let mut pending_comma: Option<usize> = None;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                separate_values(&mut out, prev);
                i = copy_string(&chars, i, &mut out);
                prev = Prev::Value;
            }
            '{' | '[' => {
                separate_values(&mut out, prev);
                out.push(c);
                prev = Prev::Open;
                i += 1;
            }
            '}' | ']' => {
                if prev == Prev::Comma
                    && let Some(pos) = pending_comma.take()
                {
                    out.remove(pos);
                }
                out.push(c);
                prev = Prev::Value;
                i += 1;
            }
            ',' => {
                if matches!(prev, Prev::Value | Prev::Colon) {
                    pending_comma = Some(out.len());
                    out.push(',');
                    prev = Prev::Comma;
                }
                i += 1;
            }
            ':' => {
                out.push(':');
                prev = Prev::Colon;
                i += 1;
            }
            c if c.is_whitespace() => {
                out.push(c);
                i += 1;
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let is_key = chars[i..]
                    .iter()
                    .find(|ch| !ch.is_whitespace())
                    .is_some_and(|ch| *ch == ':');
                separate_values(&mut out, prev);
                if is_key || !matches!(word.as_str(), "true" | "false" | "null") {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                } else {
                    out.push_str(&word);
                }
                prev = Prev::Value;
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || matches!(chars[i], '-' | '+' | '.' | 'e' | 'E'))
                {
                    i += 1;
                }
                separate_values(&mut out, prev);
                out.extend(chars[start..i].iter());
                prev = Prev::Value;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }

    out
}

fn separate_values(out: &mut String, prev: Prev) {
    if prev == Prev::Value {
        out.push(',');
    }
}

// Returns the index just past the closing quote.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    out.push('"');
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                match chars.get(i + 1) {
                    Some('\'') => out.push('\''),
                    Some(next) => {
                        out.push('\\');
                        out.push(*next);
                    }
                    None => out.push_str("\\\\"),
                }
                i += 2;
            }
            c if c == quote => {
                out.push('"');
                return i + 1;
            }
            '"' => {
                out.push_str("\\\"");
                i += 1;
            }
            '\n' => {
                out.push_str("\\n");
                i += 1;
            }
            '\r' => {
                out.push_str("\\r");
                i += 1;
            }
            '\t' => {
                out.push_str("\\t");
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out.push('"');
    i
}
