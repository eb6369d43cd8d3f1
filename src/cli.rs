use clap::{Args, Parser, Subcommand};

use crate::model::DEFAULT_USER_ID;
use crate::provider::Engine;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Quiz {
        #[command(subcommand)]
        command: QuizCommand,
    },
    /// Print the per-user rollup, or one book's progress with `--book-id`.
    Progress(ProgressArgs),
    /// Print the quiz-generation prompt for a text file without calling a provider.
    Prompt(PromptArgs),
}

#[derive(Debug, Subcommand)]
pub enum QuizCommand {
    /// Generate a quiz for a book and print it as JSON.
    Generate(QuizGenerateArgs),
    /// Grade answers for a quiz and print the evaluation report.
    Submit(QuizSubmitArgs),
}

#[derive(Debug, Args)]
pub struct QuizGenerateArgs {
    /// Book id. The book is created from `--text` if it does not exist yet.
    #[arg(long)]
    pub book_id: String,

    /// Plain-text book content.
    #[arg(long)]
    pub text: String,

    /// Title used when the book is created (defaults to the file stem).
    #[arg(long)]
    pub title: Option<String>,

    /// Data directory (books/quizzes/progress/users).
    #[arg(long, default_value = "workspace-app")]
    pub data_dir: String,

    /// Generation engine (overrides STUDYQUIZ_ENGINE).
    #[arg(long, value_enum)]
    pub engine: Option<Engine>,
}

#[derive(Debug, Args)]
pub struct QuizSubmitArgs {
    #[arg(long)]
    pub quiz_id: String,

    /// Comma-separated answers in question order; empty items are unanswered.
    #[arg(long, value_delimiter = ',', conflicts_with = "answers_file")]
    pub answers: Vec<String>,

    /// JSON array of answers (`null` for unanswered).
    #[arg(long)]
    pub answers_file: Option<String>,

    #[arg(long, default_value = DEFAULT_USER_ID)]
    pub user_id: String,

    #[arg(long, default_value = "workspace-app")]
    pub data_dir: String,

    /// Generation engine used for the performance analysis.
    #[arg(long, value_enum)]
    pub engine: Option<Engine>,
}

#[derive(Debug, Args)]
pub struct ProgressArgs {
    #[arg(long, default_value = DEFAULT_USER_ID)]
    pub user_id: String,

    #[arg(long)]
    pub book_id: Option<String>,

    #[arg(long, default_value = "workspace-app")]
    pub data_dir: String,
}

#[derive(Debug, Args)]
pub struct PromptArgs {
    /// Plain-text book content.
    #[arg(long)]
    pub text: String,
}
