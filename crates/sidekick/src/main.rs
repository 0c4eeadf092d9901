//! An interactive Sidekick in the terminal.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use sidekick::{Config, DEFAULT_SESSION_CRITERIA, Reply, SessionBuilder};
use tokio::io::{self, AsyncBufReadExt};

const BAR_CHAR: &str = "▎";

/// Chat with a sidekick whose answers are checked by an evaluator model.
#[derive(Parser, Debug)]
#[command(name = "sidekick")]
#[command(version, about, long_about = None)]
struct Args {
    /// What a good answer must achieve
    #[arg(short = 'c', long, default_value = DEFAULT_SESSION_CRITERIA)]
    success_criteria: String,

    /// Give up on a message after this many rejected answers
    #[arg(long)]
    max_evaluations: Option<usize>,

    /// Read environment variables from this file instead of `.env`
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Worker model (overrides OPENAI_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Evaluator model (overrides SIDEKICK_EVALUATOR_MODEL)
    #[arg(long)]
    evaluator_model: Option<String>,

    /// Base URL of the OpenAI-compatible API (overrides OPENAI_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let mut config = Config::from_env(args.env_file.as_deref())
        .context("failed to load configuration")?;

    if args.model.is_some() {
        config.model = args.model;
    }
    if args.evaluator_model.is_some() {
        config.evaluator_model = args.evaluator_model;
    }
    if args.base_url.is_some() {
        config.base_url = args.base_url;
    }
    debug!("{config:?}");

    let mut builder = SessionBuilder::from_config(&config)
        .with_success_criteria(args.success_criteria);
    if let Some(max) = args.max_evaluations {
        builder = builder.with_max_evaluations(max);
    }
    let mut session = builder.build();

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")?
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let mut lines = io::BufReader::new(io::stdin()).lines();

    println!(
        "{} {}",
        "Sidekick".bright_cyan().bold(),
        format!("(success criterion: {})", session.success_criteria()).dimmed()
    );
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(progress_style.clone());
        progress_bar.set_message("🤔 Thinking...");
        progress_bar.enable_steady_tick(Duration::from_millis(100));

        let result = session.send_message(line).await;
        progress_bar.finish_and_clear();

        match result {
            Ok(reply) => print_reply(&reply),
            Err(err) => {
                error!("superstep failed: {err}");
                eprintln!("{}{}", BAR_CHAR.bright_red(), err.bright_red());
            }
        }
        println!();
    }

    Ok(())
}

fn print_reply(reply: &Reply) {
    println!("{}🤖 {}", BAR_CHAR.bright_cyan(), reply.answer.bright_white());
    let bar = if reply.success_criteria_met {
        BAR_CHAR.bright_green().to_string()
    } else {
        BAR_CHAR.bright_yellow().to_string()
    };
    println!("{bar}{}", reply.feedback.dimmed());
}
