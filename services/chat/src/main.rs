//! Terminal client for the mentor relay.
//!
//! Reads one message per line from stdin and streams the mentor's reply to
//! stdout as it arrives. `/progress` prints the course progress and `/quit`
//! exits.

use anyhow::{Context, ensure};
use clap::Parser;
use mentor_chat::{
    cli::Args,
    conversation::{Conversation, TurnError},
    stores::HttpStores,
    transport::HttpRelay,
};
use mentor_core::{course, scheduler::Scheduler, store::ProgressStore, turn::ContextKey};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

async fn print_progress(stores: &HttpStores, user: &str) -> anyhow::Result<()> {
    let records = stores
        .list(user)
        .await
        .context("Could not load progress")?;
    let completed: Vec<u32> = records
        .iter()
        .filter(|r| r.completed)
        .map(|r| r.lesson)
        .collect();

    for module in course::modules() {
        println!(
            "  {:<14} {:>3}%",
            module.name,
            course::module_progress(&completed, module.id)
        );
    }
    println!("  {:<14} {:>3}%", "TOTAL", course::total_progress(&completed));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    ensure!(
        args.lesson <= args.course_size,
        "lesson {} is outside the course (1..={})",
        args.lesson,
        args.course_size
    );
    let detector = Arc::new(args.detector().context("Invalid completion pattern")?);

    let http = reqwest::Client::new();
    let stores = Arc::new(HttpStores::new(http.clone(), &args.relay_url));
    let relay = Arc::new(HttpRelay::new(http, &args.relay_url));
    let scheduler = Scheduler::new(stores.clone(), stores.clone());
    let context = ContextKey::new(args.user.clone(), args.lesson);

    let mut conversation =
        Conversation::resume(context, relay, detector, scheduler, stores.as_ref())
            .await
            .context("Could not load the conversation history")?;
    info!(context = %conversation.context(), turns = conversation.history().len(), "Conversation loaded");

    if let Some(lesson) = course::lesson_by_day(args.lesson) {
        println!("Dia {}: {}", lesson.day, lesson.title);
    }
    for turn in conversation.history() {
        println!("[{}] {}", turn.role, turn.content);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "/quit" => break,
            "/progress" => {
                if let Err(e) = print_progress(&stores, &args.user).await {
                    warn!(error = ?e, "Progress lookup failed");
                    println!("Could not load progress, try again.");
                }
                continue;
            }
            _ => {}
        }

        let mut shown = 0;
        let result = conversation
            .submit_turn(&line, |partial| {
                let mut out = std::io::stdout();
                let _ = write!(out, "{}", &partial[shown..]);
                let _ = out.flush();
                shown = partial.len();
            })
            .await;
        println!();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(TurnError::EmptyInput) => continue,
            Err(e @ TurnError::Unavailable) => {
                println!("{e}");
                continue;
            }
        };

        if !outcome.message.is_complete() {
            println!("(the reply was cut short)");
        }
        if let Some(lesson) = outcome.completed_lesson {
            println!("Lesson {lesson} completed.");
        }
        if !outcome.persistence.is_clean() {
            println!("Some of this conversation could not be saved.");
        }
        if let Some(lesson) = outcome.persistence.pending_progress() {
            if conversation
                .scheduler()
                .retry_progress(&args.user, lesson)
                .await
                .is_err()
            {
                println!("Progress for lesson {lesson} is not saved yet.");
            }
        }
    }

    Ok(())
}
