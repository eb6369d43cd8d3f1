use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use studyquiz::cli::{Cli, Command, QuizCommand};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    studyquiz::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Quiz {
            command: QuizCommand::Generate(args),
        } => {
            studyquiz::commands::quiz_generate(args)
                .await
                .context("quiz generate")?;
        }
        Command::Quiz {
            command: QuizCommand::Submit(args),
        } => {
            studyquiz::commands::quiz_submit(args)
                .await
                .context("quiz submit")?;
        }
        Command::Progress(args) => {
            studyquiz::commands::progress(args).await.context("progress")?;
        }
        Command::Prompt(args) => {
            studyquiz::commands::prompt(args).context("prompt")?;
        }
    }

    Ok(())
}
