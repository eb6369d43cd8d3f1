use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use crate::app::local_store::LocalFsStore;
use crate::app::service::{QuizService, Stores};
use crate::cli::{ProgressArgs, PromptArgs, QuizGenerateArgs, QuizSubmitArgs};
use crate::progress::ProgressReporter;
use crate::provider::{self, Engine, ProviderConfig};

pub async fn quiz_generate(args: QuizGenerateArgs) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(&args.text)
        .await
        .with_context(|| format!("read text: {}", args.text))?;
    if text.trim().is_empty() {
        anyhow::bail!("text file is empty: {}", args.text);
    }
    let title = args.title.clone().unwrap_or_else(|| file_stem(&args.text));

    let service = build_service(&args.data_dir, args.engine)?;
    let book = service.ensure_book(&args.book_id, &title, &text).await?;
    let quiz = service.generate_quiz(&book.id, &book.text_content).await?;
    print_json(&quiz)
}

pub async fn quiz_submit(args: QuizSubmitArgs) -> anyhow::Result<()> {
    let answers = match &args.answers_file {
        Some(path) => read_answers_file(path).await?,
        None => args.answers.clone(),
    };

    let service = build_service(&args.data_dir, args.engine)?;
    let report = service
        .evaluate_quiz(&args.quiz_id, &answers, &args.user_id)
        .await?;
    if let Some(err) = &report.progress_error {
        tracing::warn!(error = %err, "quiz graded but progress was not updated");
    }
    print_json(&report)
}

pub async fn progress(args: ProgressArgs) -> anyhow::Result<()> {
    let store = Arc::new(LocalFsStore::new(&args.data_dir));
    let reporter = ProgressReporter::new(store.clone(), store.clone(), store);

    match &args.book_id {
        Some(book_id) => {
            let report = reporter
                .book_report(&args.user_id, book_id)
                .await?
                .ok_or_else(|| {
                    anyhow::anyhow!("no progress for user {} and book {book_id}", args.user_id)
                })?;
            print_json(&report)
        }
        None => print_json(&reporter.user_report(&args.user_id).await?),
    }
}

pub fn prompt(args: PromptArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.text)
        .with_context(|| format!("read text: {}", args.text))?;
    println!("{}", crate::prompt::quiz_prompt(&text));
    Ok(())
}

fn build_service(data_dir: &str, engine: Option<Engine>) -> anyhow::Result<QuizService> {
    let mut config = ProviderConfig::from_env().context("load provider config")?;
    if let Some(engine) = engine {
        config.engine = engine;
    }
    let provider = provider::from_config(&config)?;
    let store = Arc::new(LocalFsStore::new(data_dir));
    Ok(QuizService::new(provider, Stores::shared(store)))
}

async fn read_answers_file(path: &str) -> anyhow::Result<Vec<String>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read answers: {path}"))?;
    let answers: Vec<Option<String>> =
        serde_json::from_str(&raw).with_context(|| format!("parse answers json: {path}"))?;
    Ok(answers.into_iter().map(Option::unwrap_or_default).collect())
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "Untitled".to_owned())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{out}");
    Ok(())
}
