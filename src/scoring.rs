use crate::model::{GradedResult, Question, QuestionType};

#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub results: Vec<GradedResult>,
    pub correct_answers: usize,
    pub total_questions: usize,
    pub correct_mcqs: u32,
    pub total_mcqs: u32,
    pub score: f64,
}

pub fn answer_at(answers: &[String], idx: usize) -> &str {
    answers.get(idx).map(String::as_str).unwrap_or("")
}

/// MCQs must match the letter exactly (case-sensitive). Free-text questions
/// count as correct whenever something non-blank was written; there is no
/// content grading for them.
pub fn is_correct(question: &Question, answer: &str) -> bool {
    match question.kind {
        QuestionType::Mcq => answer == question.correct_answer,
        QuestionType::Saq | QuestionType::Laq => !answer.trim().is_empty(),
    }
}

pub fn is_unanswered(answer: &str) -> bool {
    answer.trim().is_empty()
}

pub fn grade(questions: &[Question], answers: &[String]) -> Grade {
    let mut results = Vec::with_capacity(questions.len());
    let mut correct_answers = 0usize;
    let mut correct_mcqs = 0u32;
    let mut total_mcqs = 0u32;

    for (idx, question) in questions.iter().enumerate() {
        let answer = answer_at(answers, idx);
        let correct = is_correct(question, answer);

        if question.kind == QuestionType::Mcq {
            total_mcqs += 1;
            if correct {
                correct_mcqs += 1;
            }
        }
        if correct {
            correct_answers += 1;
        }

        results.push(GradedResult {
            question_text: question.question_text.clone(),
            user_answer: answer.to_owned(),
            correct_answer: question.correct_answer.clone(),
            explanation: question.explanation.clone(),
            is_correct: correct,
            kind: question.kind,
        });
    }

    let total_questions = questions.len();
    let score = if total_questions == 0 {
        0.0
    } else {
        correct_answers as f64 / total_questions as f64 * 100.0
    };

    Grade {
        results,
        correct_answers,
        total_questions,
        correct_mcqs,
        total_mcqs,
        score,
    }
}
